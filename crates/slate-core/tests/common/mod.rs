//! Common test utilities for slate-core integration tests

pub mod jwks_mock;
pub mod mock_identity;
pub mod mock_repos;

use std::sync::Arc;
use std::time::Duration;

#[allow(unused_imports)]
pub use jwks_mock::{JwksMockServer, TestIdTokenClaims, TestKeyPair, TEST_PROJECT_ID};
#[allow(unused_imports)]
pub use mock_identity::{MockIdentityProvider, MockTokenVerifier};
#[allow(unused_imports)]
pub use mock_repos::*;

use slate_core::{
    AccountService, DeletionSweeper, EngineConfig, EntitlementResolver, IdentityProvider,
    PaymentHandler, PromoService, Stores, TokenIssuer, UserLocks,
};

pub const TEST_SECRET: &str = "0123456789abcdef0123456789abcdef";

/// Engine services wired to in-memory stores
#[allow(dead_code)]
pub struct TestEngine {
    pub entitlements: MockEntitlementRepository,
    pub promos: MockPromoRepository,
    pub payments: MockPaymentLedgerRepository,
    pub bans: MockBanRepository,
    pub content: MockContentRepository,
    pub sessions: MockSessionRepository,
    pub identity: MockIdentityProvider,
    pub verifier: MockTokenVerifier,
    pub tokens: Arc<TokenIssuer>,
    pub resolver: EntitlementResolver,
    pub promo: PromoService,
    pub payment: PaymentHandler,
    pub sweeper: DeletionSweeper,
    pub account: AccountService,
    pub config: EngineConfig,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let entitlements = MockEntitlementRepository::new();
        let promos = MockPromoRepository::new();
        let payments = MockPaymentLedgerRepository::new();
        let bans = MockBanRepository::new();
        let content = MockContentRepository::new();
        let sessions = MockSessionRepository::new();
        let identity = MockIdentityProvider::new();
        let verifier = MockTokenVerifier::new();

        let stores = mock_stores(&entitlements, &promos, &payments, &bans, &content, &sessions);
        let locks = UserLocks::new();
        let tokens = Arc::new(
            TokenIssuer::new(TEST_SECRET, Duration::from_secs(3600)).expect("valid test secret"),
        );
        let resolver = EntitlementResolver::new(Arc::clone(&stores.entitlements), locks.clone())
            .with_deletion_grace(config.grace_period());
        let promo = PromoService::new(
            Arc::clone(&stores.promos),
            resolver.clone(),
            Arc::clone(&tokens),
            config.clone(),
        );
        let payment = PaymentHandler::new(
            Arc::clone(&stores.payments),
            resolver.clone(),
            Arc::clone(&tokens),
            config.payment_gateway.clone(),
        );
        let sweeper = DeletionSweeper::new(
            stores.clone(),
            Arc::new(identity.clone()),
            locks,
            config.clone(),
        );
        let account = AccountService::new(
            stores,
            resolver.clone(),
            promo.clone(),
            Arc::clone(&tokens),
            Arc::new(verifier.clone()),
        );

        Self {
            entitlements,
            promos,
            payments,
            bans,
            content,
            sessions,
            identity,
            verifier,
            tokens,
            resolver,
            promo,
            payment,
            sweeper,
            account,
            config,
        }
    }

    /// Stores over the same in-memory rows the engine uses
    #[allow(dead_code)]
    pub fn stores(&self) -> Stores {
        mock_stores(
            &self.entitlements,
            &self.promos,
            &self.payments,
            &self.bans,
            &self.content,
            &self.sessions,
        )
    }

    /// Sweeper sharing the engine's stores and locks but talking to `identity`
    #[allow(dead_code)]
    pub fn sweeper_with_identity(&self, identity: Arc<dyn IdentityProvider>) -> DeletionSweeper {
        DeletionSweeper::new(
            self.stores(),
            identity,
            self.resolver.locks().clone(),
            self.config.clone(),
        )
    }

    /// Free-tier user known to both the quota store and the identity provider
    pub fn seed_user(&self, uid: &str, email: &str) {
        self.entitlements
            .insert(MockEntitlementRepository::create_test_row(uid, email));
        self.identity.insert_user(uid, email);
    }
}

fn mock_stores(
    entitlements: &MockEntitlementRepository,
    promos: &MockPromoRepository,
    payments: &MockPaymentLedgerRepository,
    bans: &MockBanRepository,
    content: &MockContentRepository,
    sessions: &MockSessionRepository,
) -> Stores {
    Stores {
        entitlements: Arc::new(entitlements.clone()),
        promos: Arc::new(promos.clone()),
        payments: Arc::new(payments.clone()),
        bans: Arc::new(bans.clone()),
        content: Arc::new(content.clone()),
        sessions: Arc::new(sessions.clone()),
    }
}
