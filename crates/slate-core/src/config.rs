//! Engine configuration

use std::time::Duration;

/// Tunables shared by the engine services
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Lifetime of issued credentials
    pub token_ttl: Duration,
    /// Time between a deletion request and the cascade
    pub deletion_grace: Duration,
    /// Accounts swept in parallel
    pub sweep_concurrency: usize,
    /// Window for per-IP promo limits
    pub promo_ip_window: Duration,
    /// Accepted clock skew for signed gateway callbacks
    pub signature_tolerance: Duration,
    /// Gateway recorded on ledger rows
    pub payment_gateway: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            token_ttl: Duration::from_secs(30 * 24 * 60 * 60),
            deletion_grace: Duration::from_secs(30 * 24 * 60 * 60),
            sweep_concurrency: 4,
            promo_ip_window: Duration::from_secs(24 * 60 * 60),
            signature_tolerance: Duration::from_secs(300),
            payment_gateway: "payu".to_string(),
        }
    }
}

impl EngineConfig {
    /// Set credential lifetime
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Set deletion grace period
    pub fn with_deletion_grace(mut self, grace: Duration) -> Self {
        self.deletion_grace = grace;
        self
    }

    /// Set sweep concurrency (at least one)
    pub fn with_sweep_concurrency(mut self, concurrency: usize) -> Self {
        self.sweep_concurrency = concurrency.max(1);
        self
    }

    /// Set the per-IP promo window
    pub fn with_promo_ip_window(mut self, window: Duration) -> Self {
        self.promo_ip_window = window;
        self
    }

    /// Grace period as a calendar duration
    pub fn grace_period(&self) -> chrono::Duration {
        to_chrono(self.deletion_grace)
    }

    /// Promo window as a calendar duration
    pub fn promo_window(&self) -> chrono::Duration {
        to_chrono(self.promo_ip_window)
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}
