//! Parse errors for domain enums

use thiserror::Error;

/// Errors produced when parsing stored or inbound string values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Unknown tier name
    #[error("invalid tier: {0}")]
    InvalidTier(String),

    /// Unknown payment status
    #[error("invalid payment status: {0}")]
    InvalidPaymentStatus(String),
}
