//! Password hashing and access tokens.
//!
//! Passwords are stored as Argon2id PHC strings. Access tokens are HS256
//! JWTs whose subject is the user id.

use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::error::{Result, TodoError};
use crate::store::UserId;

/// Hash a password for storage.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| TodoError::Auth(format!("cannot hash password: {e}")))
}

/// Check a password against a stored hash. Malformed hashes never match.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        tracing::warn!("stored password hash is malformed");
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id, as a string.
    pub sub: String,
    pub iat: u64,
    pub exp: u64,
}

/// Why a presented token was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(String),
}

/// Issues and verifies access tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: u64,
}

impl TokenIssuer {
    /// Build an issuer from a shared secret.
    pub fn new(secret: &[u8], ttl_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl_secs,
        }
    }

    /// Build an issuer from config, generating an ephemeral secret when none is set.
    pub fn from_config(config: &AuthConfig) -> Self {
        if config.jwt_secret.trim().is_empty() {
            tracing::warn!(
                "no access-token secret configured; using an ephemeral one (tokens will not survive restart)"
            );
            let secret = format!("{}{}", uuid::Uuid::new_v4(), uuid::Uuid::new_v4());
            return Self::new(secret.as_bytes(), config.token_ttl_secs);
        }
        Self::new(config.jwt_secret.as_bytes(), config.token_ttl_secs)
    }

    /// Sign a token for `user_id` valid from `now_secs`.
    pub fn issue_at(&self, user_id: UserId, now_secs: u64) -> Result<String> {
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now_secs,
            exp: now_secs.saturating_add(self.ttl_secs),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TodoError::Auth(format!("cannot sign token: {e}")))
    }

    /// Sign a token for `user_id` valid from now.
    pub fn issue(&self, user_id: UserId) -> Result<String> {
        self.issue_at(user_id, now_epoch_secs())
    }

    /// Verify a token and return the user id it names.
    pub fn verify(&self, token: &str) -> std::result::Result<UserId, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            },
        )?;
        data.claims
            .sub
            .parse::<UserId>()
            .map_err(|_| TokenError::Invalid(format!("subject '{}' is not a user id", data.claims.sub)))
    }
}

fn now_epoch_secs() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}
