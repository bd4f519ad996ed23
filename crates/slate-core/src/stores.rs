//! Store handles shared by the engine services

use std::sync::Arc;

use slate_db::{
    BanRepository, ContentRepository, EntitlementRepository, PaymentLedgerRepository,
    PromoRepository, Repositories, SessionRepository,
};

/// Every repository the engine talks to, behind trait objects
#[derive(Clone)]
pub struct Stores {
    pub entitlements: Arc<dyn EntitlementRepository>,
    pub promos: Arc<dyn PromoRepository>,
    pub payments: Arc<dyn PaymentLedgerRepository>,
    pub bans: Arc<dyn BanRepository>,
    pub content: Arc<dyn ContentRepository>,
    pub sessions: Arc<dyn SessionRepository>,
}

impl From<Repositories> for Stores {
    fn from(repos: Repositories) -> Self {
        Self {
            entitlements: Arc::new(repos.entitlements),
            promos: Arc::new(repos.promos),
            payments: Arc::new(repos.payments),
            bans: Arc::new(repos.bans),
            content: Arc::new(repos.content),
            sessions: Arc::new(repos.sessions),
        }
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}
