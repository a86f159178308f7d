use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Role carried by a user record and copied into its tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    #[default]
    Admin,
    Tendero,
    Vendedor,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Tendero, Role::Vendedor];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Tendero => "TENDERO",
            Role::Vendedor => "VENDEDOR",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Role::Admin => "Administrador",
            Role::Tendero => "Tendero",
            Role::Vendedor => "Vendedor",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Role::Admin => "Full access to the system",
            Role::Tendero => "Manages stores and establishments",
            Role::Vendedor => "Manages sales and customers",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "TENDERO" => Ok(Role::Tendero),
            "VENDEDOR" => Ok(Role::Vendedor),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

/// A pending password reset code.
#[derive(Clone, PartialEq)]
pub struct ResetCode {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for ResetCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResetCode")
            .field("code", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// A stored credential. Owned by the user store.
#[derive(Clone)]
pub struct UserCredential {
    pub id: Uuid,
    pub identity: String,
    pub name: String,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub reset_code: Option<ResetCode>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserCredential {
    pub fn to_public(&self) -> PublicUser {
        PublicUser {
            id: self.id,
            identity: self.identity.clone(),
            name: self.name.clone(),
            role: self.role,
            is_active: self.is_active,
            created_at: self.created_at,
        }
    }
}

// The hash stays out of debug output.
impl fmt::Debug for UserCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCredential")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("name", &self.name)
            .field("role", &self.role)
            .field("is_active", &self.is_active)
            .field("reset_code", &self.reset_code)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish_non_exhaustive()
    }
}

/// Public-facing projection of a credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub identity: String,
    pub name: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Input to the registration gate.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    #[serde(alias = "email", alias = "username")]
    pub identity: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "email", alias = "username")]
    pub identity: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: PublicUser,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(alias = "email", alias = "username")]
    pub identity: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ForgotPasswordResponse {
    pub message: String,
    /// Only present when codes are returned in responses and the account
    /// exists and is active.
    pub reset_code: Option<String>,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    #[serde(alias = "email", alias = "username")]
    pub identity: String,
    pub reset_code: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TemporaryPasswordResponse {
    pub message: String,
    pub temporary_password: String,
    pub user: PublicUser,
}

/// Query string for the user listing.
#[derive(Debug, Clone, Deserialize)]
pub struct UserFilter {
    pub is_active: Option<bool>,
    pub role: Option<Role>,
    #[serde(default)]
    pub skip: u32,
    #[serde(default = "UserFilter::default_limit")]
    pub limit: u32,
}

impl UserFilter {
    pub const MAX_LIMIT: u32 = 100;

    fn default_limit() -> u32 {
        Self::MAX_LIMIT
    }

    pub fn matches(&self, user: &UserCredential) -> bool {
        self.is_active.map_or(true, |active| user.is_active == active)
            && self.role.map_or(true, |role| user.role == role)
    }
}

impl Default for UserFilter {
    fn default() -> Self {
        Self {
            is_active: None,
            role: None,
            skip: 0,
            limit: Self::MAX_LIMIT,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoleInfo {
    pub value: Role,
    pub label: String,
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RolesResponse {
    pub roles: Vec<RoleInfo>,
}

impl RolesResponse {
    pub fn all() -> Self {
        Self {
            roles: Role::ALL
                .iter()
                .map(|role| RoleInfo {
                    value: *role,
                    label: role.label().to_string(),
                    description: role.description().to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
    pub detail: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub database: String,
}
