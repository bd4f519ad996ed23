//! Scheduled account deletion
//!
//! Accounts whose grace period has elapsed are removed step by step. Every
//! step records its own outcome; a failure never stops the remaining steps,
//! but it keeps the account row (and skips the ban) so that the next run
//! retries the whole cascade. All steps are idempotent.
//!
//! The user's lock is held from the due check until the account row is gone,
//! so no other operation on that user interleaves with the cascade.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use slate_db::{CreateBan, DbResult};
use slate_types::{
    normalize_email, AccountState, AccountSweepOutcome, CascadeStep, StepOutcome, StepResult,
    UserEntitlement, UserId,
};
use tracing::{error, info, instrument, warn};

use crate::config::EngineConfig;
use crate::identity::{IdentityError, IdentityProvider};
use crate::locks::{UserGuard, UserLocks};
use crate::stores::Stores;
use crate::EngineResult;

const BAN_REASON: &str = "account deleted by owner request";

/// Liveness of a periodic sweeper, shared with whoever reports on it
#[derive(Debug, Clone, Default)]
pub struct SweeperStatus {
    running: Arc<AtomicBool>,
    /// Unix seconds of the last finished sweep, 0 before the first one
    last_sweep: Arc<AtomicI64>,
}

impl SweeperStatus {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn last_sweep_at(&self) -> Option<DateTime<Utc>> {
        match self.last_sweep.load(Ordering::Acquire) {
            0 => None,
            secs => DateTime::from_timestamp(secs, 0),
        }
    }

    fn record_sweep(&self, at: DateTime<Utc>) {
        self.last_sweep.store(at.timestamp(), Ordering::Release);
    }
}

/// Clears the running flag however the loop exits, panics included
struct RunningFlag(SweeperStatus);

impl RunningFlag {
    fn raise(status: &SweeperStatus) -> Self {
        status.running.store(true, Ordering::Release);
        Self(status.clone())
    }
}

impl Drop for RunningFlag {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::Release);
    }
}

/// Deletion sweeper
#[derive(Clone)]
pub struct DeletionSweeper {
    stores: Stores,
    identity: Arc<dyn IdentityProvider>,
    locks: UserLocks,
    config: EngineConfig,
    status: SweeperStatus,
}

impl DeletionSweeper {
    pub fn new(
        stores: Stores,
        identity: Arc<dyn IdentityProvider>,
        locks: UserLocks,
        config: EngineConfig,
    ) -> Self {
        Self {
            stores,
            identity,
            locks,
            config,
            status: SweeperStatus::default(),
        }
    }

    /// Handle reporting whether [`Self::run_periodic`] is alive
    pub fn status(&self) -> SweeperStatus {
        self.status.clone()
    }

    /// Process every account whose grace period elapsed by `now`
    #[instrument(skip(self))]
    pub async fn sweep(&self, now: DateTime<Utc>) -> EngineResult<Vec<AccountSweepOutcome>> {
        let cutoff = now - self.config.grace_period();
        let due = self.stores.entitlements.find_due_for_deletion(cutoff).await?;

        if due.is_empty() {
            info!("No accounts due for deletion");
            return Ok(Vec::new());
        }
        info!(accounts = due.len(), "Sweeping scheduled deletions");

        let mut accounts = Vec::with_capacity(due.len());
        for row in due {
            match UserEntitlement::try_from(row) {
                Ok(entitlement) => accounts.push(entitlement),
                Err(e) => error!(error = %e, "Skipping unreadable entitlement row"),
            }
        }

        let outcomes: Vec<AccountSweepOutcome> = stream::iter(accounts)
            .map(|account| self.sweep_account(account, now))
            .buffer_unordered(self.config.sweep_concurrency.max(1))
            .collect()
            .await;

        let gone = outcomes.iter().filter(|o| o.is_gone()).count();
        info!(gone, retry = outcomes.len() - gone, "Deletion sweep finished");
        self.locks.prune();

        Ok(outcomes)
    }

    /// Run [`Self::sweep`] every `interval`, first tick immediately, until `shutdown` resolves
    pub async fn run_periodic(self, interval: Duration, shutdown: impl Future<Output = ()>) {
        let _running = RunningFlag::raise(&self.status);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Deletion sweeper stopping");
                    return;
                }
                _ = ticker.tick() => {
                    let now = Utc::now();
                    match self.sweep(now).await {
                        Ok(_) => self.status.record_sweep(now),
                        Err(e) => error!(error = %e, "Deletion sweep failed"),
                    }
                }
            }
        }
    }

    #[instrument(skip(self, account, now), fields(user_id = %account.user_id))]
    async fn sweep_account(&self, account: UserEntitlement, now: DateTime<Utc>) -> AccountSweepOutcome {
        let user_id = account.user_id.as_str();
        let email = normalize_email(&account.email);
        let mut steps = Vec::new();

        let guard = self.locks.lock(user_id).await;
        if let Some(state) = self.claim(user_id, now, &mut steps).await {
            return AccountSweepOutcome {
                user_id: UserId::new(user_id),
                email,
                final_state: state,
                steps,
            };
        }

        self.delete_content(user_id, &mut steps).await;

        steps.push(record(
            CascadeStep::QuotaRecord,
            None,
            self.stores.entitlements.delete_usage_for_user(user_id).await,
        ));
        steps.push(record(
            CascadeStep::PromoRedemptions,
            None,
            self.stores.promos.delete_redemptions_for_user(user_id).await,
        ));
        steps.push(record(
            CascadeStep::ScriptAnalyses,
            None,
            self.stores.content.delete_analyses_for_user(user_id).await,
        ));
        steps.push(record(
            CascadeStep::Sessions,
            None,
            self.stores.sessions.delete_for_user(user_id).await,
        ));

        self.delete_identity(user_id, &email, &mut steps).await;

        let final_state = self.finish(&guard, user_id, &email, &mut steps).await;
        drop(guard);

        for step in steps.iter().filter(|s| s.result.is_failure()) {
            metrics::counter!(
                "deletion_sweep_step_failures_total",
                "step" => step.step.as_str()
            )
            .increment(1);
        }
        let label = if final_state == AccountState::Gone { "gone" } else { "retry" };
        metrics::counter!("deletion_sweep_accounts_total", "outcome" => label).increment(1);

        AccountSweepOutcome {
            user_id: UserId::new(user_id),
            email,
            final_state,
            steps,
        }
    }

    /// Re-read the row under the lock; `Some` means the account must not be swept
    async fn claim(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        steps: &mut Vec<StepOutcome>,
    ) -> Option<AccountState> {
        let row = match self.stores.entitlements.find_by_id(user_id).await {
            Ok(Some(row)) => row,
            Ok(None) => {
                info!("Account already removed");
                return Some(AccountState::Gone);
            }
            Err(e) => {
                steps.push(record(CascadeStep::AccountRecord, None, Err(e)));
                return Some(AccountState::Deleting);
            }
        };

        let state = match UserEntitlement::try_from(row) {
            Ok(current) => current.account_state(now, self.config.grace_period()),
            Err(e) => {
                error!(error = %e, "Unreadable entitlement row");
                steps.push(StepOutcome::new(
                    CascadeStep::AccountRecord,
                    StepResult::Failed { error: e.to_string() },
                ));
                return Some(AccountState::Deleting);
            }
        };
        if state == AccountState::Deleting {
            return None;
        }

        warn!(?state, "Deletion no longer due, account kept");
        steps.push(StepOutcome::new(
            CascadeStep::AccountRecord,
            StepResult::Skipped { reason: "deletion no longer due".to_string() },
        ));
        Some(state)
    }

    /// Shots and parse jobs of every script, then the scripts themselves
    async fn delete_content(&self, user_id: &str, steps: &mut Vec<StepOutcome>) {
        let script_ids = match self.stores.content.list_script_ids(user_id).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "Failed to list scripts");
                steps.push(StepOutcome::new(
                    CascadeStep::Scripts,
                    StepResult::Failed { error: e.to_string() },
                ));
                return;
            }
        };

        let mut clean = Vec::with_capacity(script_ids.len());
        for script_id in script_ids {
            let target = script_id.to_string();
            let shots = record(
                CascadeStep::Shots,
                Some(&target),
                self.stores.content.delete_shots_for_script(script_id).await,
            );
            let jobs = if shots.result.is_failure() {
                StepOutcome::for_target(
                    CascadeStep::ParseJobs,
                    &target,
                    StepResult::Skipped { reason: "shots not deleted".to_string() },
                )
            } else {
                record(
                    CascadeStep::ParseJobs,
                    Some(&target),
                    self.stores.content.delete_parse_jobs_for_script(script_id).await,
                )
            };

            if !jobs.result.is_failure() {
                clean.push(script_id);
            } else {
                steps.push(StepOutcome::for_target(
                    CascadeStep::Scripts,
                    &target,
                    StepResult::Skipped { reason: "parse jobs not deleted".to_string() },
                ));
            }
            steps.push(shots);
            steps.push(jobs);
        }

        for script_id in clean {
            steps.push(record(
                CascadeStep::Scripts,
                Some(&script_id.to_string()),
                self.stores.content.delete_script(script_id).await,
            ));
        }
    }

    /// Delete by UID, fall back to email, then confirm the email is gone
    async fn delete_identity(&self, user_id: &str, email: &str, steps: &mut Vec<StepOutcome>) {
        let primary = self.identity.delete_user(user_id).await;

        let deleted = match primary {
            Ok(()) => Ok(1),
            Err(e) => {
                if !e.is_not_found() {
                    warn!(error = %e, "Identity deletion by UID failed, trying email");
                }
                self.delete_identity_by_email(email).await
            }
        };

        match deleted {
            Ok(count) => steps.push(StepOutcome::new(
                CascadeStep::ExternalIdentity,
                StepResult::Deleted { count },
            )),
            Err(e) => {
                warn!(error = %e, "Identity deletion failed");
                steps.push(StepOutcome::new(
                    CascadeStep::ExternalIdentity,
                    StepResult::Failed { error: e.to_string() },
                ));
                return;
            }
        }

        match self.identity.get_user_by_contact(email).await {
            Err(IdentityError::NotFound) => {}
            Ok(user) => {
                warn!(remaining_uid = %user.uid, "Identity still present after deletion");
                steps.push(StepOutcome::for_target(
                    CascadeStep::ExternalIdentity,
                    &user.uid,
                    StepResult::Warning {
                        message: "identity still present after deletion".to_string(),
                    },
                ));
            }
            Err(e) => steps.push(StepOutcome::new(
                CascadeStep::ExternalIdentity,
                StepResult::Warning {
                    message: format!("could not confirm identity deletion: {e}"),
                },
            )),
        }
    }

    async fn delete_identity_by_email(&self, email: &str) -> Result<u64, IdentityError> {
        let user = match self.identity.get_user_by_contact(email).await {
            Ok(user) => user,
            Err(IdentityError::NotFound) => return Ok(0),
            Err(e) => return Err(e),
        };

        match self.identity.delete_user(&user.uid).await {
            Ok(()) => Ok(1),
            Err(IdentityError::NotFound) => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Ban and remove the account row if every earlier step succeeded
    async fn finish(
        &self,
        _guard: &UserGuard,
        user_id: &str,
        email: &str,
        steps: &mut Vec<StepOutcome>,
    ) -> AccountState {
        let failed = steps.iter().filter(|s| s.result.is_failure()).count();
        if failed > 0 {
            warn!(failed, "Cascade incomplete, account kept for retry");
            steps.push(StepOutcome::new(
                CascadeStep::AccountRecord,
                StepResult::Skipped {
                    reason: format!("{failed} step(s) failed"),
                },
            ));
            return AccountState::Deleting;
        }

        let ban = self
            .stores
            .bans
            .ban(CreateBan {
                user_id: user_id.to_string(),
                email: email.to_string(),
                reason: BAN_REASON.to_string(),
            })
            .await;
        if let Err(e) = ban {
            error!(error = %e, "Failed to record ban");
            steps.push(StepOutcome::new(
                CascadeStep::BanRecord,
                StepResult::Failed { error: e.to_string() },
            ));
            steps.push(StepOutcome::new(
                CascadeStep::AccountRecord,
                StepResult::Skipped { reason: "ban not recorded".to_string() },
            ));
            return AccountState::Deleting;
        }
        steps.push(StepOutcome::new(CascadeStep::BanRecord, StepResult::Recorded));

        let outcome = record(
            CascadeStep::AccountRecord,
            None,
            self.stores.entitlements.delete(user_id).await,
        );
        let state = if outcome.result.is_failure() {
            AccountState::Deleting
        } else {
            info!("Account deleted");
            AccountState::Gone
        };
        steps.push(outcome);
        state
    }
}

fn record(step: CascadeStep, target: Option<&str>, result: DbResult<u64>) -> StepOutcome {
    let result = match result {
        Ok(count) => StepResult::Deleted { count },
        Err(e) => {
            warn!(step = %step, target, error = %e, "Cascade step failed");
            StepResult::Failed { error: e.to_string() }
        }
    };

    match target {
        Some(target) => StepOutcome::for_target(step, target, result),
        None => StepOutcome::new(step, result),
    }
}
