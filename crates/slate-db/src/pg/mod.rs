//! PostgreSQL repository implementations

mod ban;
mod content;
mod entitlement;
mod payment;
mod promo;
mod session;

pub use ban::PgBanRepository;
pub use content::PgContentRepository;
pub use entitlement::PgEntitlementRepository;
pub use payment::PgPaymentLedgerRepository;
pub use promo::PgPromoRepository;
pub use session::PgSessionRepository;

use crate::DbPool;

/// All repositories bundled together
#[derive(Clone)]
pub struct Repositories {
    pub entitlements: PgEntitlementRepository,
    pub promos: PgPromoRepository,
    pub payments: PgPaymentLedgerRepository,
    pub bans: PgBanRepository,
    pub content: PgContentRepository,
    pub sessions: PgSessionRepository,
}

impl Repositories {
    /// Create all repositories from a database pool
    pub fn new(pool: DbPool) -> Self {
        Self {
            entitlements: PgEntitlementRepository::new(pool.clone()),
            promos: PgPromoRepository::new(pool.clone()),
            payments: PgPaymentLedgerRepository::new(pool.clone()),
            bans: PgBanRepository::new(pool.clone()),
            content: PgContentRepository::new(pool.clone()),
            sessions: PgSessionRepository::new(pool),
        }
    }
}
