//! Access token issuance and validation (HS256 JWT).

use actix_web::{dev::ServiceRequest, web, Error, HttpMessage};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::authority::Authority;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::models::Role;

/// Signature scheme used for every token this service signs or accepts.
pub const ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user identity)
    pub sub: String,
    pub role: Role,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expiry (Unix seconds)
    pub exp: i64,
    /// Token id, random per token
    pub jti: String,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
    /// Lifetime in seconds
    pub expires_in: i64,
}

pub struct TokenIssuer {
    key: EncodingKey,
    header: Header,
    lifetime: Duration,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            key: EncodingKey::from_secret(config.secret()),
            header: Header::new(ALGORITHM),
            lifetime: config.token_lifetime,
        }
    }

    pub fn issue(
        &self,
        subject: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, AuthError> {
        let iat = now.timestamp();
        let claims = Claims {
            sub: subject.to_owned(),
            role,
            iat,
            exp: iat + self.lifetime.num_seconds(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&self.header, &claims, &self.key)
            .map_err(|e| AuthError::Internal(format!("token signing failed: {}", e)))?;

        Ok(IssuedToken {
            token,
            claims,
            expires_in: self.lifetime.num_seconds(),
        })
    }
}

pub struct TokenValidator {
    key: DecodingKey,
    validation: Validation,
    leeway: Duration,
}

impl TokenValidator {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(ALGORITHM);
        // Expiry is checked against the caller's clock in `validate`.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            key: DecodingKey::from_secret(config.secret()),
            validation,
            leeway: config.leeway,
        }
    }

    /// Parse, verify and expiry-check a token. Nothing is cached between calls.
    pub fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AuthError> {
        let claims = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(classify)?
            .claims;

        if now.timestamp() >= claims.exp.saturating_add(self.leeway.num_seconds()) {
            return Err(AuthError::TokenExpired);
        }

        Ok(claims)
    }
}

// jsonwebtoken checks the signature before it decodes the payload, so any
// payload edit surfaces as InvalidSignature.
fn classify(err: jsonwebtoken::errors::Error) -> AuthError {
    debug!(error = ?err, "token rejected");
    match err.kind() {
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName => AuthError::InvalidSignature,
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::MalformedToken,
    }
}

/// Bearer middleware: validates the token and stashes its [`Claims`] in the
/// request extensions for the handler.
pub async fn validator(
    req: ServiceRequest,
    credentials: BearerAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    let Some(authority) = req.app_data::<web::Data<Authority>>().cloned() else {
        return Err((
            actix_web::error::ErrorInternalServerError("authority not configured"),
            req,
        ));
    };

    match authority.authenticate(credentials.token(), Utc::now()) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            Ok(req)
        }
        Err(e) => {
            warn!(
                event = "auth.token_rejected",
                path = %req.path(),
                reason = %e,
                "Bearer token rejected"
            );
            Err((e.into(), req))
        }
    }
}
