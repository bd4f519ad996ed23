//! Mock repositories for testing
//!
//! In-memory stores that keep the conditional semantics of the PostgreSQL
//! statements: DashMap entry locks stand in for row locks. Any operation can be
//! made to fail with [`Failures::fail`].

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use slate_db::*;
use uuid::Uuid;

/// Named operations that should fail
#[derive(Default, Clone)]
pub struct Failures {
    ops: Arc<DashSet<&'static str>>,
}

impl Failures {
    pub fn fail(&self, op: &'static str) {
        self.ops.insert(op);
    }

    pub fn heal(&self, op: &'static str) {
        self.ops.remove(op);
    }

    fn check(&self, op: &'static str) -> DbResult<()> {
        if self.ops.contains(op) {
            return Err(DbError::Sqlx(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

/// In-memory entitlement repository (with page usage log)
#[derive(Default, Clone)]
pub struct MockEntitlementRepository {
    rows: Arc<DashMap<String, EntitlementRow>>,
    usage: Arc<DashMap<String, Vec<i32>>>,
    pub failures: Failures,
}

impl MockEntitlementRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row directly
    pub fn insert(&self, row: EntitlementRow) {
        self.rows.insert(row.user_id.clone(), row);
    }

    /// Free-tier row for tests
    pub fn create_test_row(user_id: &str, email: &str) -> EntitlementRow {
        EntitlementRow {
            user_id: user_id.to_string(),
            email: email.to_string(),
            tier: "free".to_string(),
            used_pages: 0,
            total_pages: 10,
            max_shots_per_scene: 5,
            can_generate_storyboards: false,
            deletion_scheduled_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn get(&self, user_id: &str) -> Option<EntitlementRow> {
        self.rows.get(user_id).map(|r| r.value().clone())
    }

    pub fn usage_entries(&self, user_id: &str) -> usize {
        self.usage.get(user_id).map_or(0, |u| u.len())
    }
}

#[async_trait]
impl EntitlementRepository for MockEntitlementRepository {
    async fn find_by_id(&self, user_id: &str) -> DbResult<Option<EntitlementRow>> {
        self.failures.check("find_by_id")?;
        Ok(self.get(user_id))
    }

    async fn create_if_absent(&self, entitlement: CreateEntitlement) -> DbResult<EntitlementRow> {
        self.failures.check("create_if_absent")?;
        let row = self
            .rows
            .entry(entitlement.user_id.clone())
            .or_insert_with(|| EntitlementRow {
                user_id: entitlement.user_id,
                email: entitlement.email,
                tier: entitlement.tier,
                used_pages: 0,
                total_pages: entitlement.total_pages,
                max_shots_per_scene: entitlement.max_shots_per_scene,
                can_generate_storyboards: entitlement.can_generate_storyboards,
                deletion_scheduled_at: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .value()
            .clone();
        Ok(row)
    }

    async fn update_tier_limits(
        &self,
        user_id: &str,
        limits: TierLimitsUpdate,
    ) -> DbResult<Option<EntitlementRow>> {
        self.failures.check("update_tier_limits")?;
        Ok(self.rows.get_mut(user_id).map(|mut row| {
            row.tier = limits.tier;
            row.total_pages = limits.total_pages;
            row.max_shots_per_scene = limits.max_shots_per_scene;
            row.can_generate_storyboards = limits.can_generate_storyboards;
            row.updated_at = Utc::now();
            row.clone()
        }))
    }

    async fn try_consume_pages(
        &self,
        user_id: &str,
        pages: i32,
    ) -> DbResult<Option<EntitlementRow>> {
        self.failures.check("try_consume_pages")?;
        let Some(mut row) = self.rows.get_mut(user_id) else {
            return Ok(None);
        };
        let fits = row.total_pages == -1
            || i64::from(row.used_pages) + i64::from(pages) <= i64::from(row.total_pages);
        if !fits {
            return Ok(None);
        }
        row.used_pages += pages;
        row.updated_at = Utc::now();
        self.usage.entry(user_id.to_string()).or_default().push(pages);
        Ok(Some(row.clone()))
    }

    async fn set_deletion_scheduled_at(
        &self,
        user_id: &str,
        at: Option<DateTime<Utc>>,
    ) -> DbResult<Option<EntitlementRow>> {
        self.failures.check("set_deletion_scheduled_at")?;
        Ok(self.rows.get_mut(user_id).map(|mut row| {
            row.deletion_scheduled_at = at;
            row.clone()
        }))
    }

    async fn find_due_for_deletion(&self, cutoff: DateTime<Utc>) -> DbResult<Vec<EntitlementRow>> {
        self.failures.check("find_due_for_deletion")?;
        Ok(self
            .rows
            .iter()
            .filter(|r| r.deletion_scheduled_at.is_some_and(|at| at <= cutoff))
            .map(|r| r.value().clone())
            .collect())
    }

    async fn delete_usage_for_user(&self, user_id: &str) -> DbResult<u64> {
        self.failures.check("delete_usage_for_user")?;
        Ok(self.usage.remove(user_id).map_or(0, |(_, u)| u.len() as u64))
    }

    async fn delete(&self, user_id: &str) -> DbResult<u64> {
        self.failures.check("delete_entitlement")?;
        Ok(u64::from(self.rows.remove(user_id).is_some()))
    }
}

/// In-memory promo repository
#[derive(Default, Clone)]
pub struct MockPromoRepository {
    codes: Arc<DashMap<String, PromoCodeRow>>,
    redemptions: Arc<DashMap<(String, String), PromoRedemptionRow>>,
    pub failures: Failures,
}

impl MockPromoRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_code(&self, row: PromoCodeRow) {
        self.codes.insert(row.code.clone(), row);
    }

    /// Active pro code with an optional global cap
    pub fn create_test_code(code: &str, max_uses: Option<i32>) -> PromoCodeRow {
        PromoCodeRow {
            code: code.to_string(),
            tier: "pro".to_string(),
            active: true,
            expires_at: None,
            max_uses,
            used_count: 0,
            max_uses_per_ip: None,
            created_at: Utc::now(),
        }
    }

    pub fn code(&self, code: &str) -> Option<PromoCodeRow> {
        self.codes.get(code).map(|r| r.value().clone())
    }

    pub fn redemption_count(&self, user_id: &str) -> usize {
        self.redemptions.iter().filter(|r| r.user_id == user_id).count()
    }

    pub fn insert_redemption(&self, row: PromoRedemptionRow) {
        self.redemptions
            .insert((row.code.clone(), row.user_id.clone()), row);
    }
}

#[async_trait]
impl PromoRepository for MockPromoRepository {
    async fn find_code(&self, code: &str) -> DbResult<Option<PromoCodeRow>> {
        self.failures.check("find_code")?;
        Ok(self.code(code))
    }

    async fn find_redemption(
        &self,
        code: &str,
        user_id: &str,
    ) -> DbResult<Option<PromoRedemptionRow>> {
        self.failures.check("find_redemption")?;
        Ok(self
            .redemptions
            .get(&(code.to_string(), user_id.to_string()))
            .map(|r| r.value().clone()))
    }

    async fn count_redemptions_from_ip(
        &self,
        code: &str,
        source_ip: &str,
        since: DateTime<Utc>,
    ) -> DbResult<i64> {
        self.failures.check("count_redemptions_from_ip")?;
        Ok(self
            .redemptions
            .iter()
            .filter(|r| {
                r.code == code && r.source_ip.as_deref() == Some(source_ip) && r.applied_at >= since
            })
            .count() as i64)
    }

    async fn create_redemption(
        &self,
        redemption: CreateRedemption,
    ) -> DbResult<PromoRedemptionRow> {
        self.failures.check("create_redemption")?;
        match self
            .redemptions
            .entry((redemption.code.clone(), redemption.user_id.clone()))
        {
            Entry::Occupied(_) => Err(DbError::UniqueViolation(
                "promo_redemptions_code_user_key".to_string(),
            )),
            Entry::Vacant(slot) => {
                let row = PromoRedemptionRow {
                    id: redemption.id,
                    code: redemption.code,
                    user_id: redemption.user_id,
                    email: redemption.email,
                    applied_tier: redemption.applied_tier,
                    source_ip: redemption.source_ip,
                    applied_at: Utc::now(),
                };
                slot.insert(row.clone());
                Ok(row)
            }
        }
    }

    async fn delete_redemption(&self, code: &str, user_id: &str) -> DbResult<u64> {
        self.failures.check("delete_redemption")?;
        Ok(u64::from(
            self.redemptions
                .remove(&(code.to_string(), user_id.to_string()))
                .is_some(),
        ))
    }

    async fn claim_use(&self, code: &str) -> DbResult<bool> {
        self.failures.check("claim_use")?;
        let Some(mut row) = self.codes.get_mut(code) else {
            return Ok(false);
        };
        if row.max_uses.is_some_and(|max| row.used_count >= max) {
            return Ok(false);
        }
        row.used_count += 1;
        Ok(true)
    }

    async fn release_use(&self, code: &str) -> DbResult<()> {
        self.failures.check("release_use")?;
        if let Some(mut row) = self.codes.get_mut(code) {
            row.used_count = (row.used_count - 1).max(0);
        }
        Ok(())
    }

    async fn delete_redemptions_for_user(&self, user_id: &str) -> DbResult<u64> {
        self.failures.check("delete_redemptions_for_user")?;
        let before = self.redemptions.len();
        self.redemptions.retain(|_, r| r.user_id != user_id);
        Ok((before - self.redemptions.len()) as u64)
    }
}

/// In-memory payment ledger
#[derive(Default, Clone)]
pub struct MockPaymentLedgerRepository {
    rows: Arc<DashMap<String, PaymentTransactionRow>>,
    pub failures: Failures,
}

impl MockPaymentLedgerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, transaction_id: &str) -> Option<PaymentTransactionRow> {
        self.rows.get(transaction_id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    fn new_row(record: RecordTransaction, status: &str) -> PaymentTransactionRow {
        PaymentTransactionRow {
            transaction_id: record.transaction_id,
            user_id: record.user_id,
            amount: record.amount,
            currency: record.currency,
            status: status.to_string(),
            gateway: record.gateway,
            metadata: record.metadata,
            error_message: record.error_message,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

#[async_trait]
impl PaymentLedgerRepository for MockPaymentLedgerRepository {
    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> DbResult<Option<PaymentTransactionRow>> {
        self.failures.check("find_by_transaction_id")?;
        Ok(self.get(transaction_id))
    }

    async fn claim_success(&self, record: RecordTransaction) -> DbResult<bool> {
        self.failures.check("claim_success")?;
        match self.rows.entry(record.transaction_id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(Self::new_row(record, "success"));
                Ok(true)
            }
            Entry::Occupied(mut slot) => {
                let row = slot.get_mut();
                if row.status == "success" {
                    return Ok(false);
                }
                row.status = "success".to_string();
                row.error_message = None;
                row.updated_at = Utc::now();
                Ok(true)
            }
        }
    }

    async fn release_claim(&self, transaction_id: &str, error_message: &str) -> DbResult<()> {
        self.failures.check("release_claim")?;
        if let Some(mut row) = self.rows.get_mut(transaction_id) {
            if row.status == "success" {
                row.status = "pending".to_string();
                row.error_message = Some(error_message.to_string());
            }
        }
        Ok(())
    }

    async fn record_failure(&self, record: RecordTransaction) -> DbResult<()> {
        self.failures.check("record_failure")?;
        match self.rows.entry(record.transaction_id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(Self::new_row(record, "failed"));
            }
            Entry::Occupied(mut slot) => {
                let row = slot.get_mut();
                if row.status != "success" {
                    row.status = "failed".to_string();
                    row.error_message = record.error_message;
                    row.metadata = record.metadata;
                }
            }
        }
        Ok(())
    }
}

/// In-memory banned identities
#[derive(Default, Clone)]
pub struct MockBanRepository {
    rows: Arc<DashMap<(String, String), BannedIdentityRow>>,
    pub failures: Failures,
}

impl MockBanRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of banned UIDs
    pub fn len(&self) -> usize {
        self.rows.iter().filter(|r| r.kind == "uid").count()
    }

    pub fn is_uid_banned(&self, user_id: &str) -> bool {
        self.rows
            .contains_key(&("uid".to_string(), user_id.to_string()))
    }

    pub fn is_email_banned(&self, email: &str) -> bool {
        self.rows
            .contains_key(&("email".to_string(), email.to_string()))
    }

    fn insert_once(&self, kind: &str, identifier: &str, ban: &CreateBan) {
        self.rows
            .entry((kind.to_string(), identifier.to_string()))
            .or_insert_with(|| BannedIdentityRow {
                kind: kind.to_string(),
                identifier: identifier.to_string(),
                user_id: ban.user_id.clone(),
                reason: ban.reason.clone(),
                banned_at: Utc::now(),
            });
    }
}

#[async_trait]
impl BanRepository for MockBanRepository {
    async fn is_banned(&self, user_id: &str, email: &str) -> DbResult<bool> {
        self.failures.check("is_banned")?;
        Ok(self.is_uid_banned(user_id) || self.is_email_banned(email))
    }

    async fn ban(&self, ban: CreateBan) -> DbResult<()> {
        self.failures.check("ban")?;
        self.insert_once("uid", &ban.user_id, &ban);
        self.insert_once("email", &ban.email, &ban);
        Ok(())
    }
}

/// In-memory scripts, parse jobs, shots and analyses
#[derive(Default, Clone)]
pub struct MockContentRepository {
    next_id: Arc<AtomicI64>,
    scripts: Arc<DashMap<i64, String>>,
    parse_jobs: Arc<DashMap<i64, i64>>,
    shots: Arc<DashMap<i64, i64>>,
    analyses: Arc<DashMap<i64, String>>,
    pub failures: Failures,
}

impl MockContentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Script with `jobs` parse jobs of `shots_per_job` shots each; returns the script id
    pub fn seed_script(&self, user_id: &str, jobs: usize, shots_per_job: usize) -> i64 {
        let script_id = self.id();
        self.scripts.insert(script_id, user_id.to_string());
        for _ in 0..jobs {
            let job_id = self.id();
            self.parse_jobs.insert(job_id, script_id);
            for _ in 0..shots_per_job {
                self.shots.insert(self.id(), job_id);
            }
        }
        script_id
    }

    pub fn seed_analysis(&self, user_id: &str) {
        self.analyses.insert(self.id(), user_id.to_string());
    }

    pub fn script_count(&self, user_id: &str) -> usize {
        self.scripts.iter().filter(|s| s.value() == user_id).count()
    }

    pub fn total_rows(&self) -> usize {
        self.scripts.len() + self.parse_jobs.len() + self.shots.len() + self.analyses.len()
    }
}

#[async_trait]
impl ContentRepository for MockContentRepository {
    async fn list_script_ids(&self, user_id: &str) -> DbResult<Vec<i64>> {
        self.failures.check("list_script_ids")?;
        let mut ids: Vec<i64> = self
            .scripts
            .iter()
            .filter(|s| s.value() == user_id)
            .map(|s| *s.key())
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn delete_shots_for_script(&self, script_id: i64) -> DbResult<u64> {
        self.failures.check("delete_shots_for_script")?;
        let jobs: Vec<i64> = self
            .parse_jobs
            .iter()
            .filter(|j| *j.value() == script_id)
            .map(|j| *j.key())
            .collect();
        let before = self.shots.len();
        self.shots.retain(|_, job| !jobs.contains(job));
        Ok((before - self.shots.len()) as u64)
    }

    async fn delete_parse_jobs_for_script(&self, script_id: i64) -> DbResult<u64> {
        self.failures.check("delete_parse_jobs_for_script")?;
        let before = self.parse_jobs.len();
        self.parse_jobs.retain(|_, s| *s != script_id);
        Ok((before - self.parse_jobs.len()) as u64)
    }

    async fn delete_script(&self, script_id: i64) -> DbResult<u64> {
        self.failures.check("delete_script")?;
        Ok(u64::from(self.scripts.remove(&script_id).is_some()))
    }

    async fn delete_analyses_for_user(&self, user_id: &str) -> DbResult<u64> {
        self.failures.check("delete_analyses_for_user")?;
        let before = self.analyses.len();
        self.analyses.retain(|_, u| u != user_id);
        Ok((before - self.analyses.len()) as u64)
    }
}

/// In-memory session repository
#[derive(Default, Clone)]
pub struct MockSessionRepository {
    sessions: Arc<DashMap<Uuid, SessionRow>>,
    pub failures: Failures,
}

impl MockSessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count_for_user(&self, user_id: &str) -> usize {
        self.sessions.iter().filter(|s| s.user_id == user_id).count()
    }
}

#[async_trait]
impl SessionRepository for MockSessionRepository {
    async fn create(&self, session: CreateSession) -> DbResult<SessionRow> {
        self.failures.check("create_session")?;
        let row = SessionRow {
            id: session.id,
            user_id: session.user_id,
            token_hash: session.token_hash,
            ip_address: session.ip_address,
            created_at: Utc::now(),
            expires_at: session.expires_at,
        };
        self.sessions.insert(row.id, row.clone());
        Ok(row)
    }

    async fn delete_for_user(&self, user_id: &str) -> DbResult<u64> {
        self.failures.check("delete_sessions")?;
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.user_id != user_id);
        Ok((before - self.sessions.len()) as u64)
    }
}
