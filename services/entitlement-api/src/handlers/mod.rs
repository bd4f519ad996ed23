//! REST API handlers

pub mod account;
pub mod auth;
pub mod entitlement;
pub mod health;
pub mod payment;
pub mod promo;
pub mod shared;

pub use account::*;
pub use auth::*;
pub use entitlement::*;
pub use health::*;
pub use payment::*;
pub use promo::*;
