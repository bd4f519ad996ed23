//! Entitlement credential issuing and verification
//!
//! Credentials are HS256 JWTs that carry a full entitlement snapshot so that
//! downstream services can gate features without a database round trip.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use slate_types::{Tier, UserEntitlement};

use crate::crypto::{HmacKey, HmacKeyError};
use crate::{EngineError, EngineResult};

/// Claims embedded in an entitlement credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementClaims {
    /// User ID
    pub sub: String,
    pub email: String,
    pub tier: Tier,
    pub used_pages: i32,
    pub total_pages: i32,
    pub max_shots_per_scene: i32,
    pub can_generate_storyboards: bool,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expiry (unix seconds)
    pub exp: i64,
}

impl EntitlementClaims {
    /// Snapshot claims for `entitlement` issued at `now`
    pub fn from_entitlement(entitlement: &UserEntitlement, now: DateTime<Utc>, ttl: Duration) -> Self {
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let iat = now.timestamp();
        Self {
            sub: entitlement.user_id.to_string(),
            email: entitlement.email.clone(),
            tier: entitlement.tier,
            used_pages: entitlement.used_pages,
            total_pages: entitlement.total_pages,
            max_shots_per_scene: entitlement.max_shots_per_scene,
            can_generate_storyboards: entitlement.can_generate_storyboards,
            iat,
            exp: iat.saturating_add(ttl_secs),
        }
    }
}

/// A signed credential and its expiry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Signs and verifies entitlement credentials
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenIssuer {
    /// Create an issuer; the secret must be at least 32 bytes
    pub fn new(secret: impl AsRef<[u8]>, ttl: Duration) -> Result<Self, HmacKeyError> {
        let secret = secret.as_ref();
        HmacKey::new(secret)?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl,
        })
    }

    /// Credential lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a credential for the current snapshot
    pub fn issue(&self, entitlement: &UserEntitlement) -> EngineResult<IssuedToken> {
        self.issue_at(entitlement, Utc::now())
    }

    /// Sign a credential as of `now`
    pub fn issue_at(
        &self,
        entitlement: &UserEntitlement,
        now: DateTime<Utc>,
    ) -> EngineResult<IssuedToken> {
        let claims = EntitlementClaims::from_entitlement(entitlement, now, self.ttl);
        let expires_at = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| EngineError::Internal("token expiry out of range".to_string()))?;

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| {
            tracing::error!("Failed to sign credential: {}", e);
            EngineError::Internal("failed to sign credential".to_string())
        })?;

        Ok(IssuedToken { token, expires_at })
    }

    /// Verify a credential and return its claims
    pub fn verify(&self, token: &str) -> EngineResult<EntitlementClaims> {
        decode::<EntitlementClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("Credential rejected: {}", e);
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => EngineError::TokenExpired,
                    _ => EngineError::InvalidToken,
                }
            })
    }
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slate_types::UserId;

    const SECRET: &str = "test-secret-that-is-at-least-32-bytes";

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(SECRET, Duration::from_secs(30 * 24 * 60 * 60)).unwrap()
    }

    fn entitlement() -> UserEntitlement {
        UserEntitlement::new_free(UserId::new("uid-1"), "writer@example.com", Utc::now())
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(TokenIssuer::new("too-short", Duration::from_secs(60)).is_err());
    }

    #[test]
    fn test_issue_then_verify_carries_snapshot() {
        let issuer = issuer();
        let mut ent = entitlement();
        ent.apply_tier(Tier::Pro);

        let issued = issuer.issue(&ent).unwrap();
        let claims = issuer.verify(&issued.token).unwrap();

        assert_eq!(claims.sub, "uid-1");
        assert_eq!(claims.tier, Tier::Pro);
        assert_eq!(claims.total_pages, -1);
        assert_eq!(claims.max_shots_per_scene, -1);
        assert!(claims.can_generate_storyboards);
        assert_eq!(claims.exp - claims.iat, 30 * 24 * 60 * 60);
    }

    #[test]
    fn test_claims_are_camel_case() {
        let claims = EntitlementClaims::from_entitlement(&entitlement(), Utc::now(), issuer().ttl());
        let json = serde_json::to_value(claims).unwrap();
        assert_eq!(json["maxShotsPerScene"], 5);
        assert_eq!(json["canGenerateStoryboards"], false);
    }

    #[test]
    fn test_expired_token() {
        let issuer = issuer();
        let issued = issuer
            .issue_at(&entitlement(), Utc::now() - chrono::Duration::days(31))
            .unwrap();
        assert!(matches!(issuer.verify(&issued.token), Err(EngineError::TokenExpired)));
    }

    #[test]
    fn test_foreign_signature_rejected() {
        let other = TokenIssuer::new("another-secret-that-is-32-bytes-long", Duration::from_secs(60))
            .unwrap();
        let issued = other.issue(&entitlement()).unwrap();
        assert!(matches!(issuer().verify(&issued.token), Err(EngineError::InvalidToken)));
    }
}
