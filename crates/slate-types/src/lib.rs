//! Slate Types - Shared domain types
//!
//! This crate contains domain types used across the Slate entitlement engine:
//! - User identity and subscription tiers
//! - Entitlement snapshots and shot clamping
//! - Promo codes, payment transactions and deletion outcomes

pub mod deletion;
pub mod entitlement;
pub mod error;
pub mod payment;
pub mod promo;
pub mod tier;
pub mod user;

pub use deletion::*;
pub use entitlement::*;
pub use error::*;
pub use payment::*;
pub use promo::*;
pub use tier::*;
pub use user::*;
