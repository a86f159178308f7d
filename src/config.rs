//! Process configuration, read once at startup.
//!
//! Values come from the environment (a `.env` file is loaded first by the
//! binary). Missing or malformed required values are fatal.

use chrono::Duration;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::password::{PasswordPolicy, MAX_PASSWORD_BYTES};
use crate::registration::IdentityPolicy;

pub const DEFAULT_TOKEN_LIFETIME_MINUTES: i64 = 1440;
pub const DEFAULT_RESET_CODE_MINUTES: i64 = 10;
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_API_PREFIX: &str = "/api/v1/auth";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("SECRET_KEY must be at least {min} bytes (got {actual})")]
    WeakSecret { min: usize, actual: usize },
}

/// Settings for issuing and checking credentials.
#[derive(Clone)]
pub struct AuthConfig {
    secret: Vec<u8>,
    pub token_lifetime: Duration,
    /// Grace added to `exp` during validation; zero by default.
    pub leeway: Duration,
    pub bcrypt_cost: u32,
    pub identity_policy: IdentityPolicy,
    pub password_policy: PasswordPolicy,
    /// How long a password reset code stays usable.
    pub reset_code_lifetime: Duration,
    /// Hand reset codes back in the HTTP response. There is no mail
    /// delivery, so turning this off leaves codes reachable only through
    /// the store.
    pub reset_code_in_response: bool,
}

impl AuthConfig {
    pub const MIN_SECRET_BYTES: usize = 32;

    /// Build a config with default settings around a signing secret.
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self, ConfigError> {
        let secret = secret.into();
        if secret.iter().all(u8::is_ascii_whitespace) {
            return Err(ConfigError::Missing("SECRET_KEY"));
        }
        if secret.len() < Self::MIN_SECRET_BYTES {
            return Err(ConfigError::WeakSecret {
                min: Self::MIN_SECRET_BYTES,
                actual: secret.len(),
            });
        }

        Ok(Self {
            secret,
            token_lifetime: Duration::minutes(DEFAULT_TOKEN_LIFETIME_MINUTES),
            leeway: Duration::zero(),
            bcrypt_cost: bcrypt::DEFAULT_COST,
            identity_policy: IdentityPolicy::default(),
            password_policy: PasswordPolicy::default(),
            reset_code_lifetime: Duration::minutes(DEFAULT_RESET_CODE_MINUTES),
            reset_code_in_response: true,
        })
    }

    pub fn with_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.token_lifetime = lifetime;
        self
    }

    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    pub fn with_identity_policy(mut self, policy: IdentityPolicy) -> Self {
        self.identity_policy = policy;
        self
    }

    pub fn with_password_policy(mut self, policy: PasswordPolicy) -> Self {
        self.password_policy = policy;
        self
    }

    pub fn with_reset_codes(mut self, lifetime: Duration, in_response: bool) -> Self {
        self.reset_code_lifetime = lifetime;
        self.reset_code_in_response = in_response;
        self
    }

    pub fn secret(&self) -> &[u8] {
        &self.secret
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &"<redacted>")
            .field("token_lifetime", &self.token_lifetime)
            .field("leeway", &self.leeway)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("identity_policy", &self.identity_policy)
            .field("password_policy", &self.password_policy)
            .field("reset_code_lifetime", &self.reset_code_lifetime)
            .field("reset_code_in_response", &self.reset_code_in_response)
            .finish()
    }
}

/// What the service reports about itself on `/` and the health endpoints.
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    /// Mount point of the auth routes, without a trailing slash
    pub api_prefix: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub service: ServiceInfo,
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub auth: AuthConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let secret = get("SECRET_KEY").ok_or(ConfigError::Missing("SECRET_KEY"))?;

        let minutes: i64 = parse(
            &get,
            "ACCESS_TOKEN_EXPIRE_MINUTES",
            DEFAULT_TOKEN_LIFETIME_MINUTES,
        )?;
        // Upper bound keeps the timestamp arithmetic far from overflow.
        if !(1..=525_600 * 10).contains(&minutes) {
            return Err(ConfigError::Invalid {
                key: "ACCESS_TOKEN_EXPIRE_MINUTES",
                reason: format!("{} is out of range", minutes),
            });
        }

        let leeway: i64 = parse(&get, "TOKEN_LEEWAY_SECONDS", 0)?;
        if !(0..=3600).contains(&leeway) {
            return Err(ConfigError::Invalid {
                key: "TOKEN_LEEWAY_SECONDS",
                reason: format!("{} is out of range", leeway),
            });
        }

        let cost: u32 = parse(&get, "BCRYPT_COST", bcrypt::DEFAULT_COST)?;
        if !(4..=31).contains(&cost) {
            return Err(ConfigError::Invalid {
                key: "BCRYPT_COST",
                reason: format!("{} is outside 4..=31", cost),
            });
        }

        let identity_policy: IdentityPolicy =
            parse(&get, "IDENTITY_POLICY", IdentityPolicy::default())?;

        let min_length: usize = parse(
            &get,
            "PASSWORD_MIN_LENGTH",
            PasswordPolicy::default().min_length,
        )?;
        if min_length == 0 || min_length > MAX_PASSWORD_BYTES {
            return Err(ConfigError::Invalid {
                key: "PASSWORD_MIN_LENGTH",
                reason: format!("{} is outside 1..={}", min_length, MAX_PASSWORD_BYTES),
            });
        }
        let require_mixed = parse_bool(&get, "PASSWORD_REQUIRE_MIXED", false)?;

        let reset_minutes: i64 = parse(
            &get,
            "RESET_CODE_EXPIRE_MINUTES",
            DEFAULT_RESET_CODE_MINUTES,
        )?;
        if !(1..=1440).contains(&reset_minutes) {
            return Err(ConfigError::Invalid {
                key: "RESET_CODE_EXPIRE_MINUTES",
                reason: format!("{} is outside 1..=1440", reset_minutes),
            });
        }
        let reset_in_response = parse_bool(&get, "RESET_CODE_IN_RESPONSE", true)?;

        let auth = AuthConfig::new(secret.into_bytes())?
            .with_token_lifetime(Duration::minutes(minutes))
            .with_leeway(Duration::seconds(leeway))
            .with_bcrypt_cost(cost)
            .with_identity_policy(identity_policy)
            .with_password_policy(PasswordPolicy {
                min_length,
                require_mixed,
                ..PasswordPolicy::default()
            })
            .with_reset_codes(Duration::minutes(reset_minutes), reset_in_response);

        let api_prefix = get("API_PREFIX").unwrap_or_else(|| DEFAULT_API_PREFIX.to_string());
        let api_prefix = api_prefix.trim().trim_end_matches('/').to_string();
        if !api_prefix.starts_with('/') {
            return Err(ConfigError::Invalid {
                key: "API_PREFIX",
                reason: "must start with '/'".to_string(),
            });
        }

        Ok(Self {
            service: ServiceInfo {
                name: get("APP_NAME")
                    .unwrap_or_else(|| "MS-AUTH - Authentication Service".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                api_prefix,
            },
            database_url,
            host: get("SERVICE_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse(&get, "SERVICE_PORT", DEFAULT_PORT)?,
            auth,
        })
    }
}

fn parse<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::Invalid {
                key,
                reason: e.to_string(),
            }),
        None => Ok(default),
    }
}

fn parse_bool<G>(get: &G, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                key,
                reason: format!("'{}' is not a boolean", v),
            }),
        },
    }
}
