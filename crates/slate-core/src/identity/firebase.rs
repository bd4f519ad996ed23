//! Firebase Auth admin client over the Identity Toolkit REST API

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use super::{FirebaseConfig, IdentityError, IdentityProvider, IdentityUser};

/// OAuth scope accepted by the Identity Toolkit admin endpoints
pub const IDENTITY_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Refresh this long before the access token expires
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Assumed lifetime when the provider does not report one
const TOKEN_DEFAULT_TTL: Duration = Duration::from_secs(50 * 60);

/// Source of OAuth bearer tokens for admin calls
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, IdentityError>;

    /// Forget any cached token
    async fn invalidate(&self) {}
}

/// Fixed bearer token (the Auth emulator accepts `owner`)
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, IdentityError> {
        Ok(self.0.clone())
    }
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_MARGIN < self.expires_at
    }
}

/// Service-account tokens with refresh-ahead caching
pub struct ServiceAccountTokens {
    provider: Arc<dyn TokenProvider>,
    cache: RwLock<Option<CachedToken>>,
}

impl ServiceAccountTokens {
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            provider,
            cache: RwLock::new(None),
        }
    }

    /// Load the service account named by `GOOGLE_APPLICATION_CREDENTIALS`
    pub fn from_env() -> Result<Self, IdentityError> {
        let service_account = CustomServiceAccount::from_env().map_err(|e| {
            IdentityError::Credentials(format!("failed to load service account: {e}"))
        })?;

        match service_account {
            Some(sa) => Ok(Self::new(Arc::new(sa))),
            None => Err(IdentityError::Credentials(
                "GOOGLE_APPLICATION_CREDENTIALS not set".to_string(),
            )),
        }
    }
}

#[async_trait]
impl AccessTokenSource for ServiceAccountTokens {
    async fn access_token(&self) -> Result<String, IdentityError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref().filter(|c| c.is_valid()) {
                return Ok(cached.access_token.clone());
            }
        }

        let mut cache = self.cache.write().await;
        if let Some(cached) = cache.as_ref().filter(|c| c.is_valid()) {
            return Ok(cached.access_token.clone());
        }

        let token = self
            .provider
            .token(&[IDENTITY_SCOPE])
            .await
            .map_err(|e| IdentityError::Credentials(format!("failed to obtain access token: {e}")))?;

        let remaining = (token.expires_at() - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
            .min(TOKEN_DEFAULT_TTL);
        let access_token = token.as_str().to_string();
        *cache = Some(CachedToken {
            access_token: access_token.clone(),
            expires_at: Instant::now() + remaining,
        });

        debug!("Refreshed identity admin access token");
        Ok(access_token)
    }

    async fn invalidate(&self) {
        *self.cache.write().await = None;
    }
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<RawUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUser {
    local_id: String,
    email: Option<String>,
    #[serde(default)]
    disabled: bool,
}

impl From<RawUser> for IdentityUser {
    fn from(raw: RawUser) -> Self {
        Self {
            uid: raw.local_id,
            email: raw.email,
            disabled: raw.disabled,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    message: String,
}

/// Firebase Auth admin client
#[derive(Clone)]
pub struct FirebaseAdminClient {
    http: Client,
    config: FirebaseConfig,
    tokens: Arc<dyn AccessTokenSource>,
}

impl FirebaseAdminClient {
    /// Client authenticated with the service account from the environment
    pub fn new(config: FirebaseConfig) -> Result<Self, IdentityError> {
        let tokens = ServiceAccountTokens::from_env()?;
        Self::with_token_source(config, Arc::new(tokens))
    }

    /// Client with an explicit token source
    pub fn with_token_source(
        config: FirebaseConfig,
        tokens: Arc<dyn AccessTokenSource>,
    ) -> Result<Self, IdentityError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("slate-core/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IdentityError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            config,
            tokens,
        })
    }

    /// POST to `accounts:<action>`, retrying once with a fresh token on 401
    async fn post(
        &self,
        action: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, IdentityError> {
        let url = self.config.accounts_url(action);

        let token = self.tokens.access_token().await?;
        let response = self.http.post(&url).bearer_auth(&token).json(body).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!(action, "Admin token rejected, refreshing");
        self.tokens.invalidate().await;
        let token = self.tokens.access_token().await?;
        Ok(self.http.post(&url).bearer_auth(&token).json(body).send().await?)
    }

    async fn lookup(&self, body: serde_json::Value) -> Result<IdentityUser, IdentityError> {
        let response = self.post("lookup", &body).await?;
        let status = response.status();

        if status.is_success() {
            let lookup: LookupResponse = response.json().await?;
            return lookup
                .users
                .into_iter()
                .next()
                .map(IdentityUser::from)
                .ok_or(IdentityError::NotFound);
        }

        Err(error_from_response(status, response).await)
    }
}

async fn error_from_response(status: StatusCode, response: reqwest::Response) -> IdentityError {
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<GoogleErrorBody>(&body)
        .map(|b| b.error.message)
        .unwrap_or(body);

    if status == StatusCode::BAD_REQUEST && message.starts_with("USER_NOT_FOUND") {
        return IdentityError::NotFound;
    }

    IdentityError::UnexpectedResponse {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl IdentityProvider for FirebaseAdminClient {
    #[instrument(skip(self))]
    async fn get_user_by_identifier(&self, uid: &str) -> Result<IdentityUser, IdentityError> {
        self.lookup(json!({ "localId": [uid] })).await
    }

    #[instrument(skip(self, email))]
    async fn get_user_by_contact(&self, email: &str) -> Result<IdentityUser, IdentityError> {
        self.lookup(json!({ "email": [email] })).await
    }

    #[instrument(skip(self))]
    async fn delete_user(&self, uid: &str) -> Result<(), IdentityError> {
        let response = self.post("delete", &json!({ "localId": uid })).await?;
        let status = response.status();
        if status.is_success() {
            debug!(uid, "Identity deleted");
            return Ok(());
        }
        Err(error_from_response(status, response).await)
    }
}

impl std::fmt::Debug for FirebaseAdminClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseAdminClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
