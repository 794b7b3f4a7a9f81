//! Signed session tokens.
//!
//! Tokens are self-contained HS256 JWTs carrying identity id, role and
//! department. Nothing is stored server-side; a token is trusted only while
//! its signature checks out and its absolute expiry has not passed.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::db::{Identity, Role};
use crate::error::Error;

use super::rbac::Actor;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Identity id
    pub sub: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    /// Issued at (Unix timestamp seconds)
    pub iat: i64,
    /// Expiration (Unix timestamp seconds)
    pub exp: i64,
}

impl Claims {
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.sub.clone(),
            role: self.role,
            department: self.department.clone(),
        }
    }
}

pub struct TokenAuthority {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenAuthority {
    pub fn new(secret: &str, ttl_days: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl: Duration::days(ttl_days),
        }
    }

    pub fn issue(&self, identity: &Identity) -> Result<String, Error> {
        self.issue_at(identity, Utc::now())
    }

    pub fn issue_at(&self, identity: &Identity, issued_at: DateTime<Utc>) -> Result<String, Error> {
        let claims = Claims {
            sub: identity.id.clone(),
            role: identity.role,
            department: identity.department_id.clone(),
            iat: issued_at.timestamp(),
            exp: (issued_at + self.ttl).timestamp(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| Error::internal(format!("failed to sign token: {}", e)))
    }

    /// Verify signature and expiry. Every failure collapses into `Unauthenticated`
    /// so callers cannot tell a forged token from an expired one.
    pub fn verify(&self, token: &str) -> Result<Claims, Error> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("Token validation failed: {e}");
                Error::Unauthenticated
            })
    }
}
