//! External identity provider
//!
//! The engine only needs three admin operations (look up by UID, look up by
//! email, delete) plus ID-token verification at login. Both are traits so the
//! sweeper and the account service can be exercised without the network.

mod firebase;
mod id_token;

pub use firebase::{AccessTokenSource, FirebaseAdminClient, ServiceAccountTokens, StaticToken};
pub use id_token::{FirebaseClaims, FirebaseIdTokenVerifier};

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identity provider errors
#[derive(Error, Debug)]
pub enum IdentityError {
    /// No such user at the provider
    #[error("identity not found")]
    NotFound,

    /// ID token malformed or badly signed
    #[error("invalid ID token")]
    InvalidToken,

    /// ID token expired
    #[error("ID token expired")]
    TokenExpired,

    /// Service account credentials could not be loaded or used
    #[error("credentials error: {0}")]
    Credentials(String),

    /// Provider unreachable
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),

    /// Provider answered with an unexpected status
    #[error("unexpected identity provider response {status}: {message}")]
    UnexpectedResponse { status: u16, message: String },
}

impl IdentityError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

impl From<reqwest::Error> for IdentityError {
    fn from(err: reqwest::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// User record held by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityUser {
    pub uid: String,
    pub email: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

/// Admin operations on the identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Look up a user by UID; `NotFound` when absent
    async fn get_user_by_identifier(&self, uid: &str) -> Result<IdentityUser, IdentityError>;

    /// Look up a user by email; `NotFound` when absent
    async fn get_user_by_contact(&self, email: &str) -> Result<IdentityUser, IdentityError>;

    /// Delete a user by UID; `NotFound` when absent
    async fn delete_user(&self, uid: &str) -> Result<(), IdentityError>;
}

/// Identity asserted by a verified ID token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub uid: String,
    pub email: String,
    pub email_verified: bool,
}

/// Verifies ID tokens presented at login
#[async_trait]
pub trait IdentityTokenVerifier: Send + Sync {
    async fn verify_id_token(&self, id_token: &str) -> Result<VerifiedIdentity, IdentityError>;
}

/// Firebase project settings
#[derive(Debug, Clone)]
pub struct FirebaseConfig {
    /// Firebase / GCP project ID
    pub project_id: String,
    /// Identity Toolkit base URL
    pub api_base_url: String,
    /// JWKS for ID token signatures
    pub jwks_url: String,
    /// JWKS cache duration
    pub jwks_cache_duration: Duration,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
}

impl FirebaseConfig {
    pub const DEFAULT_API_BASE_URL: &'static str = "https://identitytoolkit.googleapis.com";
    pub const DEFAULT_JWKS_URL: &'static str =
        "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            api_base_url: Self::DEFAULT_API_BASE_URL.to_string(),
            jwks_url: Self::DEFAULT_JWKS_URL.to_string(),
            jwks_cache_duration: Duration::from_secs(60 * 60),
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
        }
    }

    /// Point the admin client at another Identity Toolkit host
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Point the ID token verifier at another JWKS
    pub fn with_jwks_url(mut self, url: impl Into<String>) -> Self {
        self.jwks_url = url.into();
        self
    }

    /// Use the Firebase Auth emulator at `host` (e.g. `localhost:9099`)
    pub fn with_emulator(self, host: &str) -> Self {
        self.with_api_base_url(format!("http://{host}/identitytoolkit.googleapis.com"))
    }

    /// Expected `iss` claim of ID tokens
    pub fn issuer(&self) -> String {
        format!("https://securetoken.google.com/{}", self.project_id)
    }

    /// Admin REST endpoint for `accounts:<action>`
    pub fn accounts_url(&self, action: &str) -> String {
        format!(
            "{}/v1/projects/{}/accounts:{}",
            self.api_base_url, self.project_id, action
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_urls() {
        let config = FirebaseConfig::new("slate-prod");
        assert_eq!(config.issuer(), "https://securetoken.google.com/slate-prod");
        assert_eq!(
            config.accounts_url("lookup"),
            "https://identitytoolkit.googleapis.com/v1/projects/slate-prod/accounts:lookup"
        );
    }

    #[test]
    fn test_emulator_urls() {
        let config = FirebaseConfig::new("demo").with_emulator("localhost:9099");
        assert_eq!(
            config.accounts_url("delete"),
            "http://localhost:9099/identitytoolkit.googleapis.com/v1/projects/demo/accounts:delete"
        );
    }
}
