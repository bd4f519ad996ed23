//! Application state for the Entitlement API service.

use std::sync::Arc;

use slate_core::{
    AccountService, EntitlementResolver, GatewaySignatureVerifier, PaymentHandler, PromoService,
    SweeperStatus,
};
use slate_db::DbPool;

use crate::config::Config;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub resolver: EntitlementResolver,
    pub promo: PromoService,
    pub payment: PaymentHandler,
    pub account: AccountService,
    /// Verifies payment callback origin
    pub signatures: Arc<GatewaySignatureVerifier>,
    /// Database pool, checked by `/ready`
    pub pool: DbPool,
    /// Background deletion sweeper liveness
    pub sweeper: SweeperStatus,
    /// Configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Get request timeout from config
    pub fn request_timeout(&self) -> std::time::Duration {
        self.config.request_timeout
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("http_port", &self.config.http_port)
            .field("request_timeout", &self.config.request_timeout)
            .finish_non_exhaustive()
    }
}
