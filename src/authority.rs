//! The credential and token authority the HTTP layer talks to.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{Claims, IssuedToken, TokenIssuer, TokenValidator};
use crate::config::AuthConfig;
use crate::db::{StoreError, UserStore};
use crate::error::AuthError;
use crate::models::{NewUser, PublicUser, ResetCode, Role, UserCredential, UserFilter};
use crate::password;
use crate::recovery;
use crate::registration::{IdentityPolicy, RegistrationGate};

// Verified against when the identity is unknown, so both failure paths pay
// for one bcrypt run.
const TIMING_DUMMY_PASSWORD: &str = "timing-equalization-placeholder";

#[derive(Debug)]
pub struct LoginOutcome {
    pub token: IssuedToken,
    pub user: PublicUser,
}

pub struct Authority {
    store: Arc<dyn UserStore>,
    issuer: TokenIssuer,
    validator: TokenValidator,
    gate: RegistrationGate,
    bcrypt_cost: u32,
    reset_code_lifetime: Duration,
    reset_code_in_response: bool,
    dummy_hash: String,
}

impl Authority {
    pub fn new(config: &AuthConfig, store: Arc<dyn UserStore>) -> Result<Self, AuthError> {
        let dummy_hash = password::hash_password(TIMING_DUMMY_PASSWORD, config.bcrypt_cost)?;

        Ok(Self {
            issuer: TokenIssuer::new(config),
            validator: TokenValidator::new(config),
            gate: RegistrationGate::new(config, store.clone()),
            bcrypt_cost: config.bcrypt_cost,
            reset_code_lifetime: config.reset_code_lifetime,
            reset_code_in_response: config.reset_code_in_response,
            store,
            dummy_hash,
        })
    }

    pub async fn register(
        &self,
        request: NewUser,
        now: DateTime<Utc>,
    ) -> Result<PublicUser, AuthError> {
        self.gate.register(request, now).await
    }

    /// Check credentials and issue a token.
    ///
    /// Unknown identities and wrong passwords both come back as
    /// `InvalidCredentials`.
    pub async fn login(
        &self,
        identity: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<LoginOutcome, AuthError> {
        let identity = IdentityPolicy::canonicalize(identity);
        let user = self.store.find_by_identity(&identity).await?;

        let Some(user) = user else {
            let dummy = self.dummy_hash.clone();
            password::verify_blocking(password.to_owned(), dummy).await?;
            warn!(event = "auth.failed", identity = %identity, "Login for unknown identity");
            return Err(AuthError::InvalidCredentials);
        };

        let stored_hash = user.password_hash.clone();
        if !password::verify_blocking(password.to_owned(), stored_hash).await? {
            warn!(event = "auth.failed", identity = %identity, "Login with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        if !user.is_active {
            warn!(event = "auth.inactive", identity = %identity, "Login for inactive account");
            return Err(AuthError::InactiveAccount);
        }

        let token = self.issuer.issue(&user.identity, user.role, now)?;
        info!(
            event = "auth.success",
            user_id = %user.id,
            identity = %user.identity,
            "User authenticated"
        );

        Ok(LoginOutcome {
            token,
            user: user.to_public(),
        })
    }

    pub fn authenticate(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AuthError> {
        self.validator.validate(token, now)
    }

    /// Load the account a validated token speaks for.
    pub async fn current_user(&self, claims: &Claims) -> Result<PublicUser, AuthError> {
        Ok(self.load_active(&claims.sub).await?.to_public())
    }

    pub async fn change_password(
        &self,
        identity: &str,
        current_password: &str,
        new_password: &str,
        now: DateTime<Utc>,
    ) -> Result<PublicUser, AuthError> {
        let user = self.load_active(identity).await?;

        let current = current_password.to_owned();
        let stored_hash = user.password_hash.clone();
        if !password::verify_blocking(current, stored_hash).await? {
            warn!(
                event = "password.change_failed",
                identity = %identity,
                "Wrong current password"
            );
            return Err(AuthError::InvalidCredentials);
        }

        self.store_new_password(&user, new_password, now).await?;
        info!(
            event = "password.changed",
            user_id = %user.id,
            identity = %user.identity,
            "Password changed"
        );
        Ok(user.to_public())
    }

    /// Start a password reset: store a fresh code for an active account.
    ///
    /// Returns the code only when codes are handed back in responses. Unknown
    /// and inactive identities succeed silently with `None`.
    pub async fn request_reset_code(
        &self,
        identity: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, AuthError> {
        let identity = IdentityPolicy::canonicalize(identity);
        let user = match self.store.find_by_identity(&identity).await? {
            Some(user) if user.is_active => user,
            _ => {
                info!(
                    event = "password.reset_ignored",
                    identity = %identity,
                    "Reset requested for unknown or inactive identity"
                );
                return Ok(None);
            }
        };

        let reset = ResetCode {
            code: recovery::reset_code(),
            expires_at: now + self.reset_code_lifetime,
        };
        self.store
            .set_reset_code(&user.identity, Some(&reset))
            .await?;
        info!(
            event = "password.reset_requested",
            user_id = %user.id,
            expires_at = %reset.expires_at,
            "Reset code issued"
        );

        Ok(self.reset_code_in_response.then_some(reset.code))
    }

    /// Finish a password reset with the code from [`Authority::request_reset_code`].
    ///
    /// A used or expired code is discarded.
    pub async fn reset_password(
        &self,
        identity: &str,
        code: &str,
        new_password: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let identity = IdentityPolicy::canonicalize(identity);
        let user = self
            .store
            .find_by_identity(&identity)
            .await?
            .ok_or(AuthError::InvalidResetCode)?;

        if !user.is_active {
            return Err(AuthError::InactiveAccount);
        }

        let Some(reset) = user.reset_code.as_ref() else {
            return Err(AuthError::InvalidResetCode);
        };
        if reset.code != code.trim() {
            warn!(
                event = "password.reset_failed",
                identity = %identity,
                "Wrong reset code"
            );
            return Err(AuthError::InvalidResetCode);
        }
        if now >= reset.expires_at {
            self.store.set_reset_code(&user.identity, None).await?;
            return Err(AuthError::ResetCodeExpired);
        }

        self.store_new_password(&user, new_password, now).await?;
        info!(
            event = "password.reset",
            user_id = %user.id,
            identity = %user.identity,
            "Password reset with code"
        );
        Ok(())
    }

    /// The active administrator behind `claims`.
    ///
    /// Both the token's role and the stored role must be `ADMIN`.
    pub async fn require_admin(&self, claims: &Claims) -> Result<UserCredential, AuthError> {
        if claims.role != Role::Admin {
            warn!(
                event = "auth.forbidden",
                identity = %claims.sub,
                role = %claims.role,
                "Administrator route refused"
            );
            return Err(AuthError::Forbidden);
        }

        let admin = self.load_active(&claims.sub).await?;
        if admin.role != Role::Admin {
            warn!(
                event = "auth.forbidden",
                identity = %claims.sub,
                role = %admin.role,
                "Token role no longer matches the account"
            );
            return Err(AuthError::Forbidden);
        }
        Ok(admin)
    }

    pub async fn list_users(
        &self,
        actor: &Claims,
        filter: &UserFilter,
    ) -> Result<Vec<PublicUser>, AuthError> {
        self.require_admin(actor).await?;
        if !(1..=UserFilter::MAX_LIMIT).contains(&filter.limit) {
            return Err(AuthError::InvalidParameter(format!(
                "limit must be between 1 and {}",
                UserFilter::MAX_LIMIT
            )));
        }

        let users = self.store.list(filter).await?;
        Ok(users.iter().map(UserCredential::to_public).collect())
    }

    pub async fn get_user(&self, actor: &Claims, id: Uuid) -> Result<PublicUser, AuthError> {
        self.require_admin(actor).await?;
        Ok(self.load_by_id(id).await?.to_public())
    }

    /// Flip the active flag of another account.
    pub async fn toggle_status(
        &self,
        actor: &Claims,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<PublicUser, AuthError> {
        let admin = self.require_admin(actor).await?;
        let user = self.load_by_id(id).await?;

        let updated = self
            .store
            .set_active(user.id, !user.is_active, now)
            .await
            .map_err(not_found_as_user)?;
        info!(
            event = "user.status_changed",
            admin = %admin.identity,
            user_id = %updated.id,
            identity = %updated.identity,
            is_active = updated.is_active,
            "User status changed"
        );
        Ok(updated.to_public())
    }

    /// Replace another account's password with a generated one, returned once.
    pub async fn issue_temporary_password(
        &self,
        actor: &Claims,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(PublicUser, String), AuthError> {
        let admin = self.require_admin(actor).await?;
        let user = self.load_by_id(id).await?;

        let min_len = self.gate.password_policy().min_length;
        let temporary = recovery::temporary_password(min_len);
        self.store_new_password(&user, &temporary, now).await?;
        info!(
            event = "password.temporary_issued",
            admin = %admin.identity,
            user_id = %user.id,
            identity = %user.identity,
            "Temporary password issued"
        );
        Ok((user.to_public(), temporary))
    }

    /// `"connected"` or `"error"`, for the health endpoints.
    pub async fn database_status(&self) -> &'static str {
        match self.store.ping().await {
            Ok(()) => "connected",
            Err(e) => {
                warn!(event = "health.database", error = %e, "User store ping failed");
                "error"
            }
        }
    }

    async fn store_new_password(
        &self,
        user: &UserCredential,
        new_password: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        self.gate.password_policy().validate(new_password)?;
        let plaintext = new_password.to_owned();
        let hash = password::hash_blocking(plaintext, self.bcrypt_cost).await?;
        self.store
            .update_password_hash(&user.identity, &hash, now)
            .await?;
        Ok(())
    }

    async fn load_active(&self, identity: &str) -> Result<UserCredential, AuthError> {
        let user = self
            .store
            .find_by_identity(identity)
            .await?
            .ok_or(AuthError::IdentityNotFound)?;

        if !user.is_active {
            return Err(AuthError::InactiveAccount);
        }
        Ok(user)
    }

    async fn load_by_id(&self, id: Uuid) -> Result<UserCredential, AuthError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }
}

fn not_found_as_user(err: StoreError) -> AuthError {
    match err {
        StoreError::NotFound => AuthError::UserNotFound,
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryUserStore;

    const SECRET: &str = "authority-test-secret-0123456789ab";

    fn authority() -> (Authority, Arc<MemoryUserStore>) {
        let store = Arc::new(MemoryUserStore::new());
        let config = AuthConfig::new(SECRET).unwrap().with_bcrypt_cost(4);
        (Authority::new(&config, store.clone()).unwrap(), store)
    }

    fn new_user(identity: &str, password: &str) -> NewUser {
        NewUser {
            identity: identity.into(),
            password: password.into(),
            name: None,
            role: None,
        }
    }

    fn with_role(identity: &str, role: Role) -> NewUser {
        NewUser {
            role: Some(role),
            ..new_user(identity, "Secr3t!")
        }
    }

    async fn claims_for(authority: &Authority, identity: &str) -> Claims {
        authority
            .login(identity, "Secr3t!", Utc::now())
            .await
            .unwrap()
            .token
            .claims
    }

    fn stored(identity: &str, password: &str, role: Role, is_active: bool) -> UserCredential {
        let now = Utc::now();
        UserCredential {
            id: Uuid::new_v4(),
            identity: identity.into(),
            name: "Stored".into(),
            password_hash: password::hash_password(password, 4).unwrap(),
            role,
            is_active,
            reset_code: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn register_login_validate_scenario() {
        let (authority, _) = authority();
        let now = Utc::now();

        authority
            .register(new_user("alice@example.com", "Secr3t!"), now)
            .await
            .unwrap();
        let err = authority
            .register(new_user("alice@example.com", "Secr3t!"), now)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::DuplicateIdentity));

        let outcome = authority
            .login("alice@example.com", "Secr3t!", now)
            .await
            .unwrap();
        assert_eq!(outcome.user.identity, "alice@example.com");

        let claims = authority.authenticate(&outcome.token.token, now).unwrap();
        assert_eq!(claims.sub, "alice@example.com");

        let err = authority
            .login("alice@example.com", "wrong", now)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn unknown_identity_is_indistinguishable_from_wrong_password() {
        let (authority, _) = authority();
        let now = Utc::now();
        authority
            .register(new_user("alice@example.com", "Secr3t!"), now)
            .await
            .unwrap();

        let unknown = authority
            .login("nobody@example.com", "Secr3t!", now)
            .await
            .unwrap_err();
        let wrong = authority
            .login("alice@example.com", "Secr3t?", now)
            .await
            .unwrap_err();
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn login_normalizes_identity() {
        let (authority, _) = authority();
        let now = Utc::now();
        authority
            .register(new_user("alice@example.com", "Secr3t!"), now)
            .await
            .unwrap();
        assert!(authority
            .login("  ALICE@example.com", "Secr3t!", now)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn corrupt_hash_is_not_reported_as_bad_password() {
        let (authority, store) = authority();
        let mut broken = stored("broken@example.com", "x", Role::Admin, true);
        broken.password_hash = "plaintext-oops".into();
        store.insert(&broken).await.unwrap();

        let err = authority
            .login("broken@example.com", "whatever", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::CorruptCredential));
    }

    #[tokio::test]
    async fn inactive_account_cannot_log_in() {
        let (authority, store) = authority();
        let now = Utc::now();
        store
            .insert(&stored("idle@example.com", "Secr3t!", Role::Tendero, false))
            .await
            .unwrap();

        let err = authority
            .login("idle@example.com", "Secr3t!", now)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InactiveAccount));
        // Wrong password still reads as bad credentials.
        let err = authority
            .login("idle@example.com", "nope!!", now)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn token_carries_role_and_lifetime() {
        let (authority, _) = authority();
        let now = Utc::now();
        authority
            .register(with_role("seller@example.com", Role::Vendedor), now)
            .await
            .unwrap();

        let outcome = authority
            .login("seller@example.com", "Secr3t!", now)
            .await
            .unwrap();
        assert_eq!(outcome.token.claims.role, Role::Vendedor);
        assert_eq!(outcome.token.expires_in, 86_400);

        let later = now + Duration::seconds(86_401);
        assert!(matches!(
            authority.authenticate(&outcome.token.token, later),
            Err(AuthError::TokenExpired)
        ));
    }

    #[tokio::test]
    async fn current_user_requires_existing_account() {
        let (authority, _) = authority();
        let now = Utc::now();
        authority
            .register(new_user("alice@example.com", "Secr3t!"), now)
            .await
            .unwrap();

        let claims = claims_for(&authority, "alice@example.com").await;
        let me = authority.current_user(&claims).await.unwrap();
        assert_eq!(me.identity, "alice@example.com");

        let ghost = Claims {
            sub: "ghost@example.com".into(),
            ..claims
        };
        assert!(matches!(
            authority.current_user(&ghost).await,
            Err(AuthError::IdentityNotFound)
        ));
    }

    #[tokio::test]
    async fn change_password_replaces_hash() {
        let (authority, _) = authority();
        let now = Utc::now();
        authority
            .register(new_user("alice@example.com", "Secr3t!"), now)
            .await
            .unwrap();

        let err = authority
            .change_password("alice@example.com", "not-it", "N3w-pass", now)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        let err = authority
            .change_password("alice@example.com", "Secr3t!", "123", now)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidPassword(_)));

        authority
            .change_password("alice@example.com", "Secr3t!", "N3w-pass", now)
            .await
            .unwrap();
        assert!(authority
            .login("alice@example.com", "Secr3t!", now)
            .await
            .is_err());
        assert!(authority
            .login("alice@example.com", "N3w-pass", now)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn memory_store_reports_connected() {
        let (authority, _) = authority();
        assert_eq!(authority.database_status().await, "connected");
    }

    #[tokio::test]
    async fn admin_routes_need_admin_role() {
        let (authority, store) = authority();
        let now = Utc::now();
        authority
            .register(with_role("boss@example.com", Role::Admin), now)
            .await
            .unwrap();
        authority
            .register(with_role("shop@example.com", Role::Tendero), now)
            .await
            .unwrap();

        let boss = claims_for(&authority, "boss@example.com").await;
        let shop = claims_for(&authority, "shop@example.com").await;

        let admin = authority.require_admin(&boss).await.unwrap();
        assert_eq!(admin.identity, "boss@example.com");
        assert!(matches!(
            authority.require_admin(&shop).await,
            Err(AuthError::Forbidden)
        ));

        // A forged ADMIN claim for a non-admin account is still refused.
        let forged = Claims {
            role: Role::Admin,
            ..shop.clone()
        };
        assert!(matches!(
            authority.require_admin(&forged).await,
            Err(AuthError::Forbidden)
        ));

        let filter = UserFilter::default();
        assert!(matches!(
            authority.list_users(&shop, &filter).await,
            Err(AuthError::Forbidden)
        ));

        // A deactivated administrator loses access too.
        let boss_id = admin.id;
        store.set_active(boss_id, false, now).await.unwrap();
        assert!(matches!(
            authority.require_admin(&boss).await,
            Err(AuthError::InactiveAccount)
        ));
    }

    #[tokio::test]
    async fn list_and_get_users() {
        let (authority, _) = authority();
        let now = Utc::now();
        authority
            .register(with_role("boss@example.com", Role::Admin), now)
            .await
            .unwrap();
        let seller = authority
            .register(
                with_role("seller@example.com", Role::Vendedor),
                now + Duration::seconds(1),
            )
            .await
            .unwrap();
        let boss = claims_for(&authority, "boss@example.com").await;

        let all = authority
            .list_users(&boss, &UserFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].identity, "boss@example.com");

        let sellers = UserFilter {
            role: Some(Role::Vendedor),
            ..UserFilter::default()
        };
        let found = authority.list_users(&boss, &sellers).await.unwrap();
        assert_eq!(found, vec![seller.clone()]);

        let oversized = UserFilter {
            limit: 101,
            ..UserFilter::default()
        };
        assert!(matches!(
            authority.list_users(&boss, &oversized).await,
            Err(AuthError::InvalidParameter(_))
        ));

        let fetched = authority.get_user(&boss, seller.id).await.unwrap();
        assert_eq!(fetched, seller);
        assert!(matches!(
            authority.get_user(&boss, Uuid::new_v4()).await,
            Err(AuthError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn toggle_status_blocks_and_restores_login() {
        let (authority, _) = authority();
        let now = Utc::now();
        authority
            .register(with_role("boss@example.com", Role::Admin), now)
            .await
            .unwrap();
        let shop = authority
            .register(with_role("shop@example.com", Role::Tendero), now)
            .await
            .unwrap();
        let boss = claims_for(&authority, "boss@example.com").await;

        let toggled = authority.toggle_status(&boss, shop.id, now).await.unwrap();
        assert!(!toggled.is_active);
        assert!(matches!(
            authority.login("shop@example.com", "Secr3t!", now).await,
            Err(AuthError::InactiveAccount)
        ));

        let toggled = authority.toggle_status(&boss, shop.id, now).await.unwrap();
        assert!(toggled.is_active);
        assert!(authority
            .login("shop@example.com", "Secr3t!", now)
            .await
            .is_ok());

        assert!(matches!(
            authority.toggle_status(&boss, Uuid::new_v4(), now).await,
            Err(AuthError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn temporary_password_replaces_old_one() {
        let (authority, _) = authority();
        let now = Utc::now();
        authority
            .register(with_role("boss@example.com", Role::Admin), now)
            .await
            .unwrap();
        let shop = authority
            .register(with_role("shop@example.com", Role::Tendero), now)
            .await
            .unwrap();
        let boss = claims_for(&authority, "boss@example.com").await;

        let (user, temporary) = authority
            .issue_temporary_password(&boss, shop.id, now)
            .await
            .unwrap();
        assert_eq!(user.id, shop.id);
        assert_eq!(temporary.len(), recovery::TEMPORARY_PASSWORD_LEN);

        assert!(authority
            .login("shop@example.com", "Secr3t!", now)
            .await
            .is_err());
        assert!(authority
            .login("shop@example.com", &temporary, now)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn reset_code_flow() {
        let (authority, store) = authority();
        let now = Utc::now();
        authority
            .register(new_user("alice@example.com", "Secr3t!"), now)
            .await
            .unwrap();

        let code = authority
            .request_reset_code(" Alice@Example.com", now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(code.len(), recovery::RESET_CODE_DIGITS);

        let wrong = if code == "000000" { "111111" } else { "000000" };
        assert!(matches!(
            authority
                .reset_password("alice@example.com", wrong, "N3w-pass", now)
                .await,
            Err(AuthError::InvalidResetCode)
        ));
        assert!(matches!(
            authority
                .reset_password("alice@example.com", &code, "123", now)
                .await,
            Err(AuthError::InvalidPassword(_))
        ));

        authority
            .reset_password("alice@example.com", &code, "N3w-pass", now)
            .await
            .unwrap();
        assert!(authority
            .login("alice@example.com", "N3w-pass", now)
            .await
            .is_ok());

        // Codes are single use.
        let stored = store
            .find_by_identity("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(stored.reset_code.is_none());
        assert!(matches!(
            authority
                .reset_password("alice@example.com", &code, "An0ther!", now)
                .await,
            Err(AuthError::InvalidResetCode)
        ));
    }

    #[tokio::test]
    async fn expired_reset_code_is_discarded() {
        let (authority, store) = authority();
        let now = Utc::now();
        authority
            .register(new_user("alice@example.com", "Secr3t!"), now)
            .await
            .unwrap();
        let code = authority
            .request_reset_code("alice@example.com", now)
            .await
            .unwrap()
            .unwrap();

        let still_valid = now + Duration::minutes(10) - Duration::seconds(1);
        let expired = now + Duration::minutes(10);
        let stored = store
            .find_by_identity("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(still_valid < stored.reset_code.unwrap().expires_at);

        assert!(matches!(
            authority
                .reset_password("alice@example.com", &code, "N3w-pass", expired)
                .await,
            Err(AuthError::ResetCodeExpired)
        ));
        let stored = store
            .find_by_identity("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(stored.reset_code.is_none());
        assert!(authority
            .login("alice@example.com", "Secr3t!", now)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn reset_request_is_silent_for_unknown_and_inactive() {
        let (authority, store) = authority();
        let now = Utc::now();
        store
            .insert(&stored("idle@example.com", "Secr3t!", Role::Admin, false))
            .await
            .unwrap();

        for identity in ["nobody@example.com", "idle@example.com"] {
            let code = authority.request_reset_code(identity, now).await.unwrap();
            assert!(code.is_none(), "{identity}");
        }
        let idle = store
            .find_by_identity("idle@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(idle.reset_code.is_none());

        assert!(matches!(
            authority
                .reset_password("nobody@example.com", "123456", "N3w-pass", now)
                .await,
            Err(AuthError::InvalidResetCode)
        ));
    }

    #[tokio::test]
    async fn reset_code_can_stay_out_of_responses() {
        let store = Arc::new(MemoryUserStore::new());
        let config = AuthConfig::new(SECRET)
            .unwrap()
            .with_bcrypt_cost(4)
            .with_reset_codes(Duration::minutes(5), false);
        let authority = Authority::new(&config, store.clone()).unwrap();
        let now = Utc::now();
        authority
            .register(new_user("alice@example.com", "Secr3t!"), now)
            .await
            .unwrap();

        let returned = authority
            .request_reset_code("alice@example.com", now)
            .await
            .unwrap();
        assert!(returned.is_none());

        let stored = store
            .find_by_identity("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        let reset = stored.reset_code.unwrap();
        assert_eq!(reset.expires_at, now + Duration::minutes(5));
        authority
            .reset_password("alice@example.com", &reset.code, "N3w-pass", now)
            .await
            .unwrap();
    }
}
