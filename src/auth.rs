//! Password hashing and bearer tokens.
//!
//! Tokens are HS256 JWTs whose subject is `"<username>,<role>"`. Expired,
//! malformed or wrongly signed tokens are all treated as "not authorized".

use crate::config::AuthConfig;
use crate::error::ApiError;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
}

/// Identity carried by a valid token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSubject {
    pub username: String,
    pub role: i64,
}

impl TokenSubject {
    pub fn is_privileged(&self) -> bool {
        self.role != crate::models::ROLE_NORMAL
    }

    fn encode_subject(&self) -> String {
        format!("{},{}", self.username, self.role)
    }

    /// Split on the last comma so usernames may themselves contain commas.
    fn decode_subject(sub: &str) -> Option<Self> {
        let (username, role) = sub.rsplit_once(',')?;
        Some(Self {
            username: username.to_string(),
            role: role.parse().ok()?,
        })
    }
}

pub fn hash_password(password: &str, cost: u32) -> Result<String, ApiError> {
    Ok(bcrypt::hash(password, cost)?)
}

pub fn verify_password(password: &str, hashed: &str) -> Result<bool, ApiError> {
    Ok(bcrypt::verify(password, hashed)?)
}

/// Mint a token for `subject` valid for the configured lifetime.
pub fn create_token(config: &AuthConfig, subject: &TokenSubject) -> Result<String, ApiError> {
    let claims = Claims {
        sub: subject.encode_subject(),
        exp: (Utc::now() + config.token_ttl).timestamp(),
    };
    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )?)
}

/// Check a token's signature and expiry and return its subject.
pub fn verify_token(config: &AuthConfig, token: &str) -> Result<TokenSubject, ApiError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| {
        debug!(error = %e, "Rejected bearer token");
        ApiError::Unauthorized
    })?;
    TokenSubject::decode_subject(&data.claims.sub).ok_or(ApiError::Unauthorized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-secret".to_string(),
            token_ttl: chrono::Duration::days(7),
            bcrypt_cost: 4,
        }
    }

    fn admin() -> TokenSubject {
        TokenSubject {
            username: "admin".to_string(),
            role: 1,
        }
    }

    #[test]
    fn test_password_hash_and_verify() {
        let hashed = hash_password("s3cret", 4).unwrap();
        assert_ne!(hashed, "s3cret");
        assert!(verify_password("s3cret", &hashed).unwrap());
        assert!(!verify_password("wrong", &hashed).unwrap());
    }

    #[test]
    fn test_token_round_trip() {
        let token = create_token(&config(), &admin()).unwrap();
        let subject = verify_token(&config(), &token).unwrap();
        assert_eq!(subject, admin());
        assert!(subject.is_privileged());
    }

    #[test]
    fn test_expired_token_is_unauthorized() {
        let expired = AuthConfig {
            token_ttl: chrono::Duration::days(-1),
            ..config()
        };
        let token = create_token(&expired, &admin()).unwrap();
        assert!(matches!(
            verify_token(&config(), &token),
            Err(ApiError::Unauthorized)
        ));
    }

    #[test]
    fn test_wrong_secret_is_unauthorized() {
        let token = create_token(&config(), &admin()).unwrap();
        let other = AuthConfig {
            jwt_secret: "other".to_string(),
            ..config()
        };
        assert!(matches!(verify_token(&other, &token), Err(ApiError::Unauthorized)));
    }

    #[test]
    fn test_subject_with_comma_in_username() {
        let subject = TokenSubject::decode_subject("kim,lee,0").unwrap();
        assert_eq!(subject.username, "kim,lee");
        assert_eq!(subject.role, 0);
        assert!(TokenSubject::decode_subject("no-role").is_none());
    }
}
