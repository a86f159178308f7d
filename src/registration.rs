//! User registration: identity policy, password policy, uniqueness.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::db::UserStore;
use crate::error::AuthError;
use crate::models::{NewUser, PublicUser, UserCredential};
use crate::password::{self, PasswordPolicy};

const MAX_IDENTITY_LEN: usize = 255;
const NAME_LEN: std::ops::RangeInclusive<usize> = 3..=255;

/// Accepted shape of an identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdentityPolicy {
    #[default]
    Email,
    /// 3-64 characters of `[a-z0-9._-]`
    Username,
}

impl fmt::Display for IdentityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityPolicy::Email => write!(f, "email"),
            IdentityPolicy::Username => write!(f, "username"),
        }
    }
}

impl FromStr for IdentityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "email" => Ok(IdentityPolicy::Email),
            "username" => Ok(IdentityPolicy::Username),
            _ => Err(format!("unknown identity policy: {}", s)),
        }
    }
}

impl IdentityPolicy {
    /// Canonical form used for storage and lookups.
    pub fn canonicalize(raw: &str) -> String {
        raw.trim().to_lowercase()
    }

    /// Canonicalize and check an identity.
    pub fn normalize(&self, raw: &str) -> Result<String, AuthError> {
        let identity = Self::canonicalize(raw);
        if identity.is_empty() {
            return Err(AuthError::InvalidIdentity(
                "identity must not be empty".into(),
            ));
        }
        if identity.len() > MAX_IDENTITY_LEN {
            return Err(AuthError::InvalidIdentity(format!(
                "identity must be at most {} characters",
                MAX_IDENTITY_LEN
            )));
        }

        let checked = match self {
            IdentityPolicy::Email => check_email(&identity),
            IdentityPolicy::Username => check_username(&identity),
        };
        checked.map_err(|reason| AuthError::InvalidIdentity(reason.to_string()))?;
        Ok(identity)
    }
}

fn check_email(value: &str) -> Result<(), &'static str> {
    let (local, domain) = value.split_once('@').ok_or("invalid email format")?;
    if domain.contains('@') || value.chars().any(char::is_whitespace) {
        return Err("invalid email format");
    }

    if local.is_empty() || local.len() > 64 {
        return Err("invalid email local part");
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return Err("invalid email local part");
    }

    if !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || domain.contains("..")
    {
        return Err("invalid email domain");
    }
    let labels_ok = domain.split('.').all(|label| {
        !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_alphanumeric() || c == '-')
    });
    if !labels_ok {
        return Err("invalid email domain");
    }

    Ok(())
}

fn check_username(value: &str) -> Result<(), &'static str> {
    if !(3..=64).contains(&value.chars().count()) {
        return Err("username must be 3 to 64 characters");
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err("username may only contain letters, digits, '.', '_' and '-'");
    }
    Ok(())
}

/// Creates credential records.
pub struct RegistrationGate {
    store: Arc<dyn UserStore>,
    identity_policy: IdentityPolicy,
    password_policy: PasswordPolicy,
    bcrypt_cost: u32,
}

impl RegistrationGate {
    pub fn new(config: &AuthConfig, store: Arc<dyn UserStore>) -> Self {
        Self {
            store,
            identity_policy: config.identity_policy,
            password_policy: config.password_policy.clone(),
            bcrypt_cost: config.bcrypt_cost,
        }
    }

    pub fn password_policy(&self) -> &PasswordPolicy {
        &self.password_policy
    }

    /// Register a new user.
    ///
    /// Uniqueness is left to the store's insert, so two concurrent
    /// registrations of one identity yield one success and one
    /// `DuplicateIdentity`.
    pub async fn register(
        &self,
        request: NewUser,
        now: DateTime<Utc>,
    ) -> Result<PublicUser, AuthError> {
        let identity = self.identity_policy.normalize(&request.identity)?;

        let name = match request.name.as_deref().map(str::trim) {
            Some(name) => {
                if !NAME_LEN.contains(&name.chars().count()) {
                    return Err(AuthError::InvalidName(format!(
                        "name must be {} to {} characters",
                        NAME_LEN.start(),
                        NAME_LEN.end()
                    )));
                }
                name.to_string()
            }
            None => identity.clone(),
        };

        self.password_policy.validate(&request.password)?;
        let password_hash =
            password::hash_blocking(request.password, self.bcrypt_cost).await?;

        let user = UserCredential {
            id: Uuid::new_v4(),
            identity,
            name,
            password_hash,
            role: request.role.unwrap_or_default(),
            is_active: true,
            reset_code: None,
            created_at: now,
            updated_at: now,
        };

        self.store.insert(&user).await?;

        info!(
            event = "user.registered",
            user_id = %user.id,
            identity = %user.identity,
            role = %user.role,
            "New user registered"
        );

        Ok(user.to_public())
    }
}
