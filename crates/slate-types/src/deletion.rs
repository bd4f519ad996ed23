//! Deletion cascade outcome types

use serde::{Deserialize, Serialize};

use crate::{AccountState, UserId};

/// One step of the account deletion cascade, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeStep {
    /// Shots belonging to a script's parse jobs
    Shots,
    /// Parse jobs of a script
    ParseJobs,
    /// The scripts themselves
    Scripts,
    /// Page usage log
    QuotaRecord,
    /// Promo redemption history
    PromoRedemptions,
    /// Script health analyses
    ScriptAnalyses,
    /// Issued credential sessions
    Sessions,
    /// Identity provider account
    ExternalIdentity,
    /// Permanent ban record
    BanRecord,
    /// The entitlement row (always last)
    AccountRecord,
}

impl CascadeStep {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Shots => "shots",
            Self::ParseJobs => "parse_jobs",
            Self::Scripts => "scripts",
            Self::QuotaRecord => "quota_record",
            Self::PromoRedemptions => "promo_redemptions",
            Self::ScriptAnalyses => "script_analyses",
            Self::Sessions => "sessions",
            Self::ExternalIdentity => "external_identity",
            Self::BanRecord => "ban_record",
            Self::AccountRecord => "account_record",
        }
    }
}

impl std::fmt::Display for CascadeStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened in a single step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StepResult {
    /// Step succeeded; `count` rows/entities removed
    Deleted { count: u64 },
    /// Step succeeded by writing a record
    Recorded,
    /// Step succeeded with a non-fatal anomaly
    Warning { message: String },
    /// Step failed; retried on the next sweep
    Failed { error: String },
    /// Step not attempted
    Skipped { reason: String },
}

impl StepResult {
    /// Failed or skipped steps keep the account pending
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Skipped { .. })
    }
}

/// Recorded outcome of one cascade step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step: CascadeStep,
    /// Sub-resource the step acted on (e.g. a script id), if any
    pub target: Option<String>,
    #[serde(flatten)]
    pub result: StepResult,
}

impl StepOutcome {
    pub fn new(step: CascadeStep, result: StepResult) -> Self {
        Self {
            step,
            target: None,
            result,
        }
    }

    pub fn for_target(step: CascadeStep, target: impl Into<String>, result: StepResult) -> Self {
        Self {
            step,
            target: Some(target.into()),
            result,
        }
    }
}

/// Outcome of sweeping one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSweepOutcome {
    pub user_id: UserId,
    pub email: String,
    /// `Gone` when fully removed, `Deleting` when a retry is due
    /// (`Active` if the owner cancelled mid-sweep)
    pub final_state: AccountState,
    pub steps: Vec<StepOutcome>,
}

impl AccountSweepOutcome {
    /// Whether the account was fully removed
    pub fn is_gone(&self) -> bool {
        self.final_state == AccountState::Gone
    }

    /// Steps that failed or were skipped
    pub fn failed_steps(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(|s| s.result.is_failure())
    }
}
