//! Configuration for the Entitlement API service.

use std::time::Duration;

use slate_core::{EngineConfig, FirebaseConfig};

/// Minimum length of the credential signing secret
const MIN_SECRET_LEN: usize = 32;

/// Entitlement API configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub http_port: u16,
    /// Database URL
    pub database_url: String,
    /// Secret for entitlement credentials
    pub jwt_secret: String,
    /// Secret shared with the payment gateway
    pub payment_webhook_secret: String,
    /// Firebase project settings
    pub firebase: FirebaseConfig,
    /// Firebase Auth emulator host, if used
    pub emulator_host: Option<String>,
    /// Engine tunables
    pub engine: EngineConfig,
    /// Time between deletion sweeps
    pub sweep_interval: Duration,
    /// Request timeout
    pub request_timeout: Duration,
    /// Metrics enabled
    pub metrics_enabled: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| lookup(name).ok_or(ConfigError::Missing(name));
        let number = |name: &'static str, default: u64| -> Result<u64, ConfigError> {
            lookup(name).map_or(Ok(default), |v| {
                v.trim().parse().map_err(|_| ConfigError::Invalid(name))
            })
        };

        // Database
        let database_url = required("DATABASE_URL")?;

        // Secrets
        let jwt_secret = required("JWT_SECRET")?;
        if jwt_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid("JWT_SECRET"));
        }
        let payment_webhook_secret = required("PAYMENT_WEBHOOK_SECRET")?;
        if payment_webhook_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid("PAYMENT_WEBHOOK_SECRET"));
        }

        // Identity provider: one credential source, the service account file
        let project_id = required("FIREBASE_PROJECT_ID")?;
        let emulator_host = lookup("FIREBASE_AUTH_EMULATOR_HOST").filter(|h| !h.is_empty());
        let mut firebase = FirebaseConfig::new(project_id);
        match emulator_host.as_deref() {
            Some(host) => firebase = firebase.with_emulator(host),
            None => {
                required("GOOGLE_APPLICATION_CREDENTIALS")?;
            }
        }

        // Server
        let http_port = u16::try_from(number("HTTP_PORT", 8080)?)
            .map_err(|_| ConfigError::Invalid("HTTP_PORT"))?;
        let request_timeout = Duration::from_secs(number("REQUEST_TIMEOUT_SECS", 30)?);
        let metrics_enabled = lookup("METRICS_ENABLED")
            .map(|v| v.parse().unwrap_or(true))
            .unwrap_or(true);

        // Engine
        let day = 24 * 60 * 60;
        let sweep_interval = Duration::from_secs(number("SWEEP_INTERVAL_SECS", day)?);
        if sweep_interval.is_zero() {
            return Err(ConfigError::Invalid("SWEEP_INTERVAL_SECS"));
        }
        let sweep_concurrency = usize::try_from(number("SWEEP_CONCURRENCY", 4)?)
            .map_err(|_| ConfigError::Invalid("SWEEP_CONCURRENCY"))?;
        let engine = EngineConfig::default()
            .with_deletion_grace(Duration::from_secs(number("DELETION_GRACE_DAYS", 30)? * day))
            .with_token_ttl(Duration::from_secs(number("TOKEN_TTL_DAYS", 30)? * day))
            .with_sweep_concurrency(sweep_concurrency.max(1));

        Ok(Self {
            http_port,
            database_url,
            jwt_secret,
            payment_webhook_secret,
            firebase,
            emulator_host,
            engine,
            sweep_interval,
            request_timeout,
            metrics_enabled,
        })
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
