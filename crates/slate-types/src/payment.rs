//! Payment transaction types

use serde::{Deserialize, Serialize};

use crate::ParseError;

/// Ledger status of a gateway transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Seen but not settled (also the state of a released claim)
    Pending,
    /// Settled; side effects applied
    Success,
    /// Gateway reported failure
    Failed,
}

impl PaymentStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Interpret a raw gateway status string.
    ///
    /// Gateways send `success` in any casing; everything else that is
    /// non-empty is a failure.
    pub fn from_gateway(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("success") {
            Self::Success
        } else {
            Self::Failed
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(ParseError::InvalidPaymentStatus(other.to_string())),
        }
    }
}

/// Outcome of a payment confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfirmOutcome {
    /// First successful confirmation; user upgraded
    Upgraded,
    /// Transaction already applied earlier
    AlreadyProcessed,
    /// No such user; nothing recorded
    UserNotFound,
    /// Gateway reported a failed payment
    Rejected,
}

impl ConfirmOutcome {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Upgraded => "Upgraded",
            Self::AlreadyProcessed => "AlreadyProcessed",
            Self::UserNotFound => "UserNotFound",
            Self::Rejected => "Rejected",
        }
    }
}

impl std::fmt::Display for ConfirmOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
