//! Firebase ID token verification with JWKS caching

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use super::{FirebaseConfig, IdentityError, IdentityTokenVerifier, VerifiedIdentity};

const JWKS_CACHE_KEY: &str = "jwks";

#[derive(Debug, Clone, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    kid: String,
    n: String,
    e: String,
}

/// Claims of a Firebase ID token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirebaseClaims {
    /// Firebase UID
    pub sub: String,
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    /// Time of the original sign-in
    pub auth_time: Option<i64>,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

/// Verifies Firebase ID tokens against Google's published keys.
///
/// The set of known key IDs is cached with the keys; a token naming an
/// unknown key is rejected without refetching the JWKS.
#[derive(Clone)]
pub struct FirebaseIdTokenVerifier {
    config: FirebaseConfig,
    http_client: reqwest::Client,
    key_cache: Cache<String, Arc<DecodingKey>>,
    jwks_kids_cache: Cache<String, Arc<Vec<String>>>,
}

impl FirebaseIdTokenVerifier {
    pub fn new(config: FirebaseConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(2)
            .tcp_nodelay(true)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let cache_duration = config.jwks_cache_duration;
        Self {
            config,
            http_client,
            key_cache: Cache::builder()
                .time_to_live(cache_duration)
                .max_capacity(100)
                .build(),
            jwks_kids_cache: Cache::builder()
                .time_to_live(cache_duration)
                .max_capacity(1)
                .build(),
        }
    }

    /// Validate an ID token and return its claims
    pub async fn validate(&self, token: &str) -> Result<FirebaseClaims, IdentityError> {
        let header = decode_header(token).map_err(|e| {
            tracing::debug!("Failed to decode ID token header: {}", e);
            IdentityError::InvalidToken
        })?;
        let kid = header.kid.ok_or_else(|| {
            tracing::debug!("ID token missing kid");
            IdentityError::InvalidToken
        })?;

        let decoding_key = self.get_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[self.config.issuer()]);
        // Audience is compared below in constant time.
        validation.validate_aud = false;

        let claims = decode::<FirebaseClaims>(token, &decoding_key, &validation)
            .map_err(|e| {
                tracing::debug!("ID token validation failed: {}", e);
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => IdentityError::TokenExpired,
                    _ => IdentityError::InvalidToken,
                }
            })?
            .claims;

        let audience_ok: bool = claims
            .aud
            .as_bytes()
            .ct_eq(self.config.project_id.as_bytes())
            .into();
        if !audience_ok {
            tracing::debug!(aud = %claims.aud, "ID token audience mismatch");
            return Err(IdentityError::InvalidToken);
        }

        if claims.sub.is_empty() || claims.sub.len() > 128 {
            return Err(IdentityError::InvalidToken);
        }

        let now = Utc::now().timestamp();
        if claims.auth_time.is_some_and(|t| t > now) {
            tracing::debug!("ID token auth_time in the future");
            return Err(IdentityError::InvalidToken);
        }
        if claims.exp < now {
            return Err(IdentityError::TokenExpired);
        }

        Ok(claims)
    }

    async fn get_key(&self, kid: &str) -> Result<Arc<DecodingKey>, IdentityError> {
        if let Some(key) = self.key_cache.get(kid).await {
            return Ok(key);
        }

        if let Some(known_kids) = self.jwks_kids_cache.get(JWKS_CACHE_KEY).await {
            if !known_kids.iter().any(|k| k == kid) {
                tracing::debug!("Unknown key ID '{}' not in cached JWKS", kid);
                return Err(IdentityError::InvalidToken);
            }
        }

        let jwks = self.fetch_jwks().await?;

        let kids: Vec<String> = jwks.keys.iter().map(|k| k.kid.clone()).collect();
        self.jwks_kids_cache
            .insert(JWKS_CACHE_KEY.to_string(), Arc::new(kids))
            .await;

        let mut found = None;
        for jwk in &jwks.keys {
            match DecodingKey::from_rsa_components(&jwk.n, &jwk.e) {
                Ok(key) => {
                    let key = Arc::new(key);
                    if jwk.kid == kid {
                        found = Some(Arc::clone(&key));
                    }
                    self.key_cache.insert(jwk.kid.clone(), key).await;
                }
                Err(e) => tracing::warn!(kid = %jwk.kid, "Skipping unusable JWK: {}", e),
            }
        }

        found.ok_or_else(|| {
            tracing::debug!("Key not found in JWKS: {}", kid);
            IdentityError::InvalidToken
        })
    }

    async fn fetch_jwks(&self) -> Result<Jwks, IdentityError> {
        tracing::debug!("Fetching JWKS from {}", self.config.jwks_url);

        let response = self
            .http_client
            .get(&self.config.jwks_url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to fetch JWKS: {}", e);
                IdentityError::Unavailable("failed to fetch JWKS".to_string())
            })?;

        if !response.status().is_success() {
            tracing::error!("JWKS fetch returned status: {}", response.status());
            return Err(IdentityError::Unavailable("failed to fetch JWKS".to_string()));
        }

        response.json::<Jwks>().await.map_err(|e| {
            tracing::error!("Failed to parse JWKS: {}", e);
            IdentityError::Unavailable("failed to parse JWKS".to_string())
        })
    }

    /// Drop cached keys, forcing a refetch on the next validation
    pub fn invalidate_cache(&self) {
        self.key_cache.invalidate_all();
        self.jwks_kids_cache.invalidate_all();
    }
}

#[async_trait]
impl IdentityTokenVerifier for FirebaseIdTokenVerifier {
    async fn verify_id_token(&self, id_token: &str) -> Result<VerifiedIdentity, IdentityError> {
        let claims = self.validate(id_token).await?;
        let email = claims.email.ok_or_else(|| {
            tracing::debug!("ID token carries no email");
            IdentityError::InvalidToken
        })?;

        Ok(VerifiedIdentity {
            uid: claims.sub,
            email,
            email_verified: claims.email_verified,
        })
    }
}

impl std::fmt::Debug for FirebaseIdTokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseIdTokenVerifier")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
