//! Slate Core - Entitlement engine
//!
//! Keeps a user's tier, quota and derived permissions consistent across
//! promo redemptions, payment confirmations and account deletion:
//!
//! - [`EntitlementResolver`] owns every mutation of the quota store
//! - [`PromoService`] and [`PaymentHandler`] turn external events into at most
//!   one tier change each
//! - [`TokenIssuer`] signs a fresh credential after every tier change
//! - [`DeletionSweeper`] cascades scheduled deletions and bans the identity
//! - [`AccountService`] handles login and deletion scheduling

pub mod account;
pub mod config;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod locks;
pub mod payment;
pub mod promo;
pub mod resolver;
pub mod stores;
pub mod sweeper;
pub mod token;

pub use account::{AccountService, LoginRequest, LoginResult};
pub use config::EngineConfig;
pub use error::*;
pub use identity::{
    FirebaseAdminClient, FirebaseConfig, FirebaseIdTokenVerifier, IdentityError,
    IdentityProvider, IdentityTokenVerifier, IdentityUser, VerifiedIdentity,
};
pub use locks::{UserGuard, UserLocks};
pub use payment::{ConfirmRequest, ConfirmResult, GatewaySignatureVerifier, PaymentHandler};
pub use promo::{PromoService, RedeemRequest, RedeemResult};
pub use resolver::{EntitlementResolver, TierChangeReason};
pub use stores::Stores;
pub use sweeper::{DeletionSweeper, SweeperStatus};
pub use token::{EntitlementClaims, IssuedToken, TokenIssuer};
