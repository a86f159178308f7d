//! User store: the persistence collaborator behind registration and login.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{ResetCode, UserCredential, UserFilter};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Insert hit an existing identity.
    #[error("identity already exists")]
    Conflict,

    #[error("record not found")]
    NotFound,

    #[error("invalid row: {0}")]
    InvalidRow(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_identity(&self, identity: &str) -> Result<Option<UserCredential>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserCredential>, StoreError>;

    /// Records matching `filter`, oldest first, after skipping `filter.skip`
    /// and returning at most `filter.limit`.
    async fn list(&self, filter: &UserFilter) -> Result<Vec<UserCredential>, StoreError>;

    /// Insert a new record. Must fail with [`StoreError::Conflict`] when the
    /// identity exists, atomically with respect to concurrent inserts.
    async fn insert(&self, user: &UserCredential) -> Result<(), StoreError>;

    /// Replace the password hash. Any pending reset code is discarded.
    async fn update_password_hash(
        &self,
        identity: &str,
        password_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Set the active flag and return the updated record.
    async fn set_active(
        &self,
        id: Uuid,
        active: bool,
        at: DateTime<Utc>,
    ) -> Result<UserCredential, StoreError>;

    /// Store or clear the pending reset code, replacing any earlier one.
    async fn set_reset_code(
        &self,
        identity: &str,
        reset_code: Option<&ResetCode>,
    ) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Open the store named by `database_url`.
///
/// `memory:` selects a process-local store; anything else is a PostgreSQL URL.
pub async fn connect(database_url: &str) -> Result<Arc<dyn UserStore>, StoreError> {
    if database_url.starts_with("memory:") {
        warn!("using in-memory user store; records are lost on restart");
        return Ok(Arc::new(MemoryUserStore::new()));
    }

    let store = PgUserStore::connect(database_url).await?;
    Ok(Arc::new(store))
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<String, UserCredential>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_identity(&self, identity: &str) -> Result<Option<UserCredential>, StoreError> {
        Ok(self.users.lock().await.get(identity).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserCredential>, StoreError> {
        let users = self.users.lock().await;
        Ok(users.values().find(|user| user.id == id).cloned())
    }

    async fn list(&self, filter: &UserFilter) -> Result<Vec<UserCredential>, StoreError> {
        let users = self.users.lock().await;
        let mut matching: Vec<UserCredential> = users
            .values()
            .filter(|user| filter.matches(user))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        Ok(matching
            .into_iter()
            .skip(filter.skip as usize)
            .take(filter.limit as usize)
            .collect())
    }

    async fn insert(&self, user: &UserCredential) -> Result<(), StoreError> {
        let mut users = self.users.lock().await;
        match users.entry(user.identity.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict),
            Entry::Vacant(slot) => {
                slot.insert(user.clone());
                Ok(())
            }
        }
    }

    async fn update_password_hash(
        &self,
        identity: &str,
        password_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut users = self.users.lock().await;
        let user = users.get_mut(identity).ok_or(StoreError::NotFound)?;
        user.password_hash = password_hash.to_string();
        user.reset_code = None;
        user.updated_at = at;
        Ok(())
    }

    async fn set_active(
        &self,
        id: Uuid,
        active: bool,
        at: DateTime<Utc>,
    ) -> Result<UserCredential, StoreError> {
        let mut users = self.users.lock().await;
        let user = users
            .values_mut()
            .find(|user| user.id == id)
            .ok_or(StoreError::NotFound)?;
        user.is_active = active;
        user.updated_at = at;
        Ok(user.clone())
    }

    async fn set_reset_code(
        &self,
        identity: &str,
        reset_code: Option<&ResetCode>,
    ) -> Result<(), StoreError> {
        let mut users = self.users.lock().await;
        let user = users.get_mut(identity).ok_or(StoreError::NotFound)?;
        user.reset_code = reset_code.cloned();
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

pub struct PgUserStore {
    pool: PgPool,
}

macro_rules! user_columns {
    () => {
        "id, identity, name, password_hash, role, is_active, reset_code, \
         reset_code_expires_at, created_at, updated_at"
    };
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    identity: String,
    name: String,
    password_hash: String,
    role: String,
    is_active: bool,
    reset_code: Option<String>,
    reset_code_expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for UserCredential {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let reset_code = match (row.reset_code, row.reset_code_expires_at) {
            (Some(code), Some(expires_at)) => Some(ResetCode { code, expires_at }),
            _ => None,
        };

        Ok(UserCredential {
            id: row.id,
            role: row.role.parse().map_err(StoreError::InvalidRow)?,
            identity: row.identity,
            name: row.name,
            password_hash: row.password_hash,
            is_active: row.is_active,
            reset_code,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl PgUserStore {
    /// Connect and bring the schema up to date.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("connected to PostgreSQL user store");

        Ok(Self { pool })
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_identity(&self, identity: &str) -> Result<Option<UserCredential>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users WHERE identity = $1"
        ))
        .bind(identity)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserCredential::try_from).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserCredential>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserCredential::try_from).transpose()
    }

    async fn list(&self, filter: &UserFilter) -> Result<Vec<UserCredential>, StoreError> {
        let rows = sqlx::query_as::<_, UserRow>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users \
             WHERE ($1::BOOLEAN IS NULL OR is_active = $1) \
             AND ($2::TEXT IS NULL OR role = $2) \
             ORDER BY created_at, id OFFSET $3 LIMIT $4"
        ))
        .bind(filter.is_active)
        .bind(filter.role.map(|role| role.as_str()))
        .bind(i64::from(filter.skip))
        .bind(i64::from(filter.limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(UserCredential::try_from).collect()
    }

    async fn insert(&self, user: &UserCredential) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO users \
             (id, identity, name, password_hash, role, is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(user.id)
        .bind(&user.identity)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            // users_identity_key
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict,
            other => StoreError::Database(other),
        })?;

        Ok(())
    }

    async fn update_password_hash(
        &self,
        identity: &str,
        password_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $1, updated_at = $2, \
             reset_code = NULL, reset_code_expires_at = NULL \
             WHERE identity = $3",
        )
        .bind(password_hash)
        .bind(at)
        .bind(identity)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn set_active(
        &self,
        id: Uuid,
        active: bool,
        at: DateTime<Utc>,
    ) -> Result<UserCredential, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            "UPDATE users SET is_active = $1, updated_at = $2 WHERE id = $3 RETURNING ",
            user_columns!()
        ))
        .bind(active)
        .bind(at)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(StoreError::NotFound)?.try_into()
    }

    async fn set_reset_code(
        &self,
        identity: &str,
        reset_code: Option<&ResetCode>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE users SET reset_code = $1, reset_code_expires_at = $2 WHERE identity = $3",
        )
        .bind(reset_code.map(|reset| reset.code.as_str()))
        .bind(reset_code.map(|reset| reset.expires_at))
        .bind(identity)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use chrono::Duration as TimeDelta;

    fn user(identity: &str) -> UserCredential {
        let now = Utc::now();
        UserCredential {
            id: Uuid::new_v4(),
            identity: identity.to_string(),
            name: "Test User".to_string(),
            password_hash: "$2b$04$hash".to_string(),
            role: Role::Admin,
            is_active: true,
            reset_code: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn row(role: &str) -> UserRow {
        let now = Utc::now();
        UserRow {
            id: Uuid::new_v4(),
            identity: "a@example.com".into(),
            name: "A".into(),
            password_hash: "$2b$04$hash".into(),
            role: role.into(),
            is_active: true,
            reset_code: None,
            reset_code_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn memory_store_insert_and_find() {
        let store = MemoryUserStore::new();
        let alice = user("a@example.com");
        store.insert(&alice).await.unwrap();

        let found = store
            .find_by_identity("a@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.name, "Test User");
        assert!(store
            .find_by_identity("b@example.com")
            .await
            .unwrap()
            .is_none());

        let by_id = store.find_by_id(alice.id).await.unwrap().unwrap();
        assert_eq!(by_id.identity, "a@example.com");
        assert!(store.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_rejects_duplicate() {
        let store = MemoryUserStore::new();
        store.insert(&user("a@example.com")).await.unwrap();
        assert!(matches!(
            store.insert(&user("a@example.com")).await,
            Err(StoreError::Conflict)
        ));
    }

    #[tokio::test]
    async fn memory_store_updates_hash_and_drops_reset_code() {
        let store = MemoryUserStore::new();
        store.insert(&user("a@example.com")).await.unwrap();
        let code = ResetCode {
            code: "123456".into(),
            expires_at: Utc::now() + TimeDelta::minutes(10),
        };
        store
            .set_reset_code("a@example.com", Some(&code))
            .await
            .unwrap();

        let later = Utc::now() + TimeDelta::seconds(10);
        store
            .update_password_hash("a@example.com", "$2b$04$new", later)
            .await
            .unwrap();
        let found = store
            .find_by_identity("a@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.password_hash, "$2b$04$new");
        assert_eq!(found.updated_at, later);
        assert!(found.reset_code.is_none());

        assert!(matches!(
            store
                .update_password_hash("missing@example.com", "x", later)
                .await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn memory_store_sets_active_flag() {
        let store = MemoryUserStore::new();
        let alice = user("a@example.com");
        store.insert(&alice).await.unwrap();

        let later = Utc::now() + TimeDelta::seconds(5);
        let updated = store.set_active(alice.id, false, later).await.unwrap();
        assert!(!updated.is_active);
        assert_eq!(updated.updated_at, later);

        let found = store.find_by_id(alice.id).await.unwrap().unwrap();
        assert!(!found.is_active);

        assert!(matches!(
            store.set_active(Uuid::new_v4(), true, later).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn memory_store_keeps_one_reset_code() {
        let store = MemoryUserStore::new();
        store.insert(&user("a@example.com")).await.unwrap();

        let expires_at = Utc::now() + TimeDelta::minutes(10);
        for code in ["111111", "222222"] {
            let reset = ResetCode {
                code: code.into(),
                expires_at,
            };
            store
                .set_reset_code("a@example.com", Some(&reset))
                .await
                .unwrap();
        }
        let found = store
            .find_by_identity("a@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.reset_code.unwrap().code, "222222");

        store.set_reset_code("a@example.com", None).await.unwrap();
        let found = store
            .find_by_identity("a@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(found.reset_code.is_none());

        assert!(matches!(
            store.set_reset_code("missing@example.com", None).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn memory_store_lists_with_filters_and_paging() {
        let store = MemoryUserStore::new();
        let base = Utc::now();
        for (i, role) in [Role::Admin, Role::Tendero, Role::Tendero, Role::Vendedor]
            .into_iter()
            .enumerate()
        {
            let mut record = user(&format!("user{}@example.com", i));
            record.role = role;
            record.is_active = i != 2;
            record.created_at = base + TimeDelta::seconds(i as i64);
            store.insert(&record).await.unwrap();
        }

        let all = store.list(&UserFilter::default()).await.unwrap();
        let identities: Vec<&str> = all.iter().map(|u| &u.identity[..]).collect();
        assert_eq!(
            identities,
            [
                "user0@example.com",
                "user1@example.com",
                "user2@example.com",
                "user3@example.com"
            ]
        );

        let tenderos = UserFilter {
            role: Some(Role::Tendero),
            ..UserFilter::default()
        };
        assert_eq!(store.list(&tenderos).await.unwrap().len(), 2);

        let active_tenderos = UserFilter {
            is_active: Some(true),
            ..tenderos
        };
        let found = store.list(&active_tenderos).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].identity, "user1@example.com");

        let page = UserFilter {
            skip: 1,
            limit: 2,
            ..UserFilter::default()
        };
        let found = store.list(&page).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].identity, "user1@example.com");
        assert_eq!(found[1].identity, "user2@example.com");
    }

    #[tokio::test]
    async fn connect_selects_memory_store() {
        let store = connect("memory:").await.unwrap();
        store.ping().await.unwrap();
    }

    #[test]
    fn row_with_unknown_role_is_invalid() {
        assert!(matches!(
            UserCredential::try_from(row("SUPERUSER")),
            Err(StoreError::InvalidRow(_))
        ));
    }

    #[test]
    fn row_reset_code_needs_both_columns() {
        let mut half = row("ADMIN");
        half.reset_code = Some("123456".into());
        let credential = UserCredential::try_from(half).unwrap();
        assert!(credential.reset_code.is_none());

        let mut full = row("TENDERO");
        full.reset_code = Some("123456".into());
        full.reset_code_expires_at = Some(Utc::now());
        let credential = UserCredential::try_from(full).unwrap();
        assert_eq!(credential.reset_code.unwrap().code, "123456");
        assert_eq!(credential.role, Role::Tendero);
    }
}
