//! Password hashing, verification and the password policy.
//!
//! Hashes are bcrypt artifacts (`$2b$<cost>$<salt><digest>`), so the algorithm
//! tag, work factor and salt travel with the digest. bcrypt only reads the
//! first 72 bytes of its input, so longer passwords are refused outright
//! instead of being truncated.

use thiserror::Error;

use crate::error::AuthError;

/// Longest password bcrypt hashes without truncation.
pub const MAX_PASSWORD_BYTES: usize = 72;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PasswordError {
    #[error("password must not be empty")]
    Empty,

    #[error("password must be at least {min} characters (got {actual})")]
    TooShort { min: usize, actual: usize },

    #[error("password must be at most {max} bytes (got {actual})")]
    TooLong { max: usize, actual: usize },

    #[error("password must contain an uppercase letter")]
    MissingUppercase,

    #[error("password must contain a lowercase letter")]
    MissingLowercase,

    #[error("password must contain a digit")]
    MissingDigit,
}

/// Hash a password with a fresh random salt.
pub fn hash_password(plaintext: &str, cost: u32) -> Result<String, AuthError> {
    if plaintext.is_empty() {
        return Err(PasswordError::Empty.into());
    }
    if plaintext.len() > MAX_PASSWORD_BYTES {
        return Err(PasswordError::TooLong {
            max: MAX_PASSWORD_BYTES,
            actual: plaintext.len(),
        }
        .into());
    }

    bcrypt::hash(plaintext, cost)
        .map_err(|e| AuthError::Internal(format!("hashing failed: {}", e)))
}

/// Check a password against a stored hash.
///
/// A hash that bcrypt cannot parse is reported as `CorruptCredential`.
pub fn verify_password(plaintext: &str, stored_hash: &str) -> Result<bool, AuthError> {
    let matched = bcrypt::verify(plaintext, stored_hash).map_err(|e| {
        tracing::error!(
            event = "credential.corrupt",
            error = %e,
            "stored password hash is unreadable"
        );
        AuthError::CorruptCredential
    })?;

    // bcrypt would match the 72-byte prefix of a longer input.
    let in_range = !plaintext.is_empty() && plaintext.len() <= MAX_PASSWORD_BYTES;
    Ok(matched && in_range)
}

/// [`hash_password`] on the blocking thread pool.
pub async fn hash_blocking(plaintext: String, cost: u32) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || hash_password(&plaintext, cost))
        .await
        .map_err(|e| AuthError::Internal(format!("hashing task failed: {}", e)))?
}

/// [`verify_password`] on the blocking thread pool.
pub async fn verify_blocking(plaintext: String, stored_hash: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || verify_password(&plaintext, &stored_hash))
        .await
        .map_err(|e| AuthError::Internal(format!("verification task failed: {}", e)))?
}

/// Rules a new password has to satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordPolicy {
    /// Minimum length in characters
    pub min_length: usize,
    /// Maximum length in bytes, never above [`MAX_PASSWORD_BYTES`]
    pub max_length: usize,
    /// Require an uppercase letter, a lowercase letter and a digit
    pub require_mixed: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 6,
            max_length: MAX_PASSWORD_BYTES,
            require_mixed: false,
        }
    }
}

impl PasswordPolicy {
    pub fn validate(&self, password: &str) -> Result<(), PasswordError> {
        if password.is_empty() {
            return Err(PasswordError::Empty);
        }

        let chars = password.chars().count();
        if chars < self.min_length {
            return Err(PasswordError::TooShort {
                min: self.min_length,
                actual: chars,
            });
        }

        let max = self.max_length.min(MAX_PASSWORD_BYTES);
        if password.len() > max {
            return Err(PasswordError::TooLong {
                max,
                actual: password.len(),
            });
        }

        if self.require_mixed {
            if !password.chars().any(char::is_uppercase) {
                return Err(PasswordError::MissingUppercase);
            }
            if !password.chars().any(char::is_lowercase) {
                return Err(PasswordError::MissingLowercase);
            }
            if !password.chars().any(|c| c.is_ascii_digit()) {
                return Err(PasswordError::MissingDigit);
            }
        }

        Ok(())
    }
}
