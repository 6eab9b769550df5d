//! In-memory implementations of the orchestrator's ports for tests.

use async_trait::async_trait;
use purge_common::db::deletion_request::AcquireOutcome;
use purge_common::models::deletion_request::DeletionStatus;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use super::ports::*;
use super::{Collaborators, Orchestrator, OrchestratorConfig};
use crate::revocation::RevokeToken;

pub fn account(provider: &str, providers: &[&str]) -> Account {
    let user_id = Uuid::now_v7();

    Account {
        user_id,
        email: format!("{user_id}@test.com"),
        provider: String::from(provider),
        providers: providers.iter().map(|p| String::from(*p)).collect(),
    }
}

#[derive(Default)]
pub struct FakeIdentityProvider {
    tokens: Mutex<HashMap<String, Uuid>>,
    accounts: Mutex<HashMap<Uuid, Account>>,
    passwords: Mutex<HashMap<Uuid, String>>,
    deleted: Mutex<HashSet<Uuid>>,
    sessions_revoked: Mutex<HashSet<Uuid>>,
    password_checks: AtomicUsize,
    fail_account_deletion: AtomicBool,
    fail_session_revocation: AtomicBool,
}

impl FakeIdentityProvider {
    /// Registers the account and returns a bearer token for it.
    pub fn add_account(&self, account: Account) -> String {
        let token = format!("token-{}", account.user_id);
        self.tokens
            .lock()
            .unwrap()
            .insert(token.clone(), account.user_id);
        self.accounts
            .lock()
            .unwrap()
            .insert(account.user_id, account);

        token
    }

    pub fn set_password(&self, user_id: Uuid, password: &str) {
        self.passwords
            .lock()
            .unwrap()
            .insert(user_id, String::from(password));
    }

    pub fn password_checks(&self) -> usize {
        self.password_checks.load(Ordering::SeqCst)
    }

    pub fn is_deleted(&self, user_id: Uuid) -> bool {
        self.deleted.lock().unwrap().contains(&user_id)
    }

    pub fn sessions_revoked(&self, user_id: Uuid) -> bool {
        self.sessions_revoked.lock().unwrap().contains(&user_id)
    }

    pub fn fail_account_deletion(&self) {
        self.fail_account_deletion.store(true, Ordering::SeqCst);
    }

    pub fn fail_session_revocation(&self) {
        self.fail_session_revocation.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn authenticate(&self, bearer_token: &str) -> Result<Option<Uuid>, PortError> {
        Ok(self.tokens.lock().unwrap().get(bearer_token).copied())
    }

    async fn get_current_user(&self, bearer_token: &str) -> Result<Option<Identity>, PortError> {
        let Some(user_id) = self.tokens.lock().unwrap().get(bearer_token).copied() else {
            return Ok(None);
        };

        if self.is_deleted(user_id) {
            return Ok(None);
        }

        Ok(self
            .accounts
            .lock()
            .unwrap()
            .get(&user_id)
            .map(|a| Identity {
                user_id,
                email: a.email.clone(),
            }))
    }

    async fn get_account(&self, user_id: Uuid) -> Result<Option<Account>, PortError> {
        if self.is_deleted(user_id) {
            return Ok(None);
        }

        Ok(self.accounts.lock().unwrap().get(&user_id).cloned())
    }

    async fn verify_password(&self, user_id: Uuid, password: &str) -> Result<bool, PortError> {
        self.password_checks.fetch_add(1, Ordering::SeqCst);
        // Hashing runs off the request task in production, so concurrent callers interleave here.
        tokio::task::yield_now().await;
        Ok(self.passwords.lock().unwrap().get(&user_id).map(String::as_str) == Some(password))
    }

    async fn revoke_all_sessions(&self, user_id: Uuid) -> Result<(), PortError> {
        if self.fail_session_revocation.load(Ordering::SeqCst) {
            return Err(PortError::Unavailable(String::from("session store offline")));
        }

        self.sessions_revoked.lock().unwrap().insert(user_id);
        Ok(())
    }

    async fn delete_account(&self, user_id: Uuid) -> Result<(), PortError> {
        if self.fail_account_deletion.load(Ordering::SeqCst) {
            return Err(PortError::Rejected(String::from("identity provider refused")));
        }

        self.deleted.lock().unwrap().insert(user_id);
        Ok(())
    }
}

struct FakeCode {
    user_id: Uuid,
    purpose: String,
    code: String,
    expires_at: SystemTime,
    used: bool,
}

#[derive(Default)]
pub struct FakeVerificationCodes {
    codes: Mutex<Vec<FakeCode>>,
}

impl FakeVerificationCodes {
    pub fn insert(&self, user_id: Uuid, purpose: &str, code: &str, expires_at: SystemTime) {
        self.codes.lock().unwrap().push(FakeCode {
            user_id,
            purpose: String::from(purpose),
            code: String::from(code),
            expires_at,
            used: false,
        });
    }

    pub fn issued_count(&self, user_id: Uuid) -> usize {
        self.codes
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.user_id == user_id)
            .count()
    }
}

#[async_trait]
impl VerificationCodeStore for FakeVerificationCodes {
    async fn issue(
        &self,
        user_id: Uuid,
        _email: &str,
        code: &str,
        purpose: &str,
        expires_at: SystemTime,
    ) -> Result<(), PortError> {
        self.insert(user_id, purpose, code, expires_at);
        Ok(())
    }

    async fn consume(&self, user_id: Uuid, purpose: &str, code: &str) -> Result<bool, PortError> {
        let now = SystemTime::now();
        let mut codes = self.codes.lock().unwrap();

        let latest = codes
            .iter_mut()
            .rev()
            .find(|c| c.user_id == user_id && c.purpose == purpose && !c.used && c.expires_at > now);

        match latest {
            Some(c) if c.code == code => {
                c.used = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct FakeRateLimitStore {
    attempts: Mutex<HashMap<(String, Uuid), (u32, SystemTime)>>,
    unavailable: AtomicBool,
}

impl FakeRateLimitStore {
    pub fn fail_with_unavailable(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RateLimitStore for FakeRateLimitStore {
    async fn record_attempt(
        &self,
        operation: &str,
        subject_id: Uuid,
        window: Duration,
    ) -> Result<(u32, SystemTime), PortError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PortError::Unavailable(String::from("throttle store offline")));
        }

        let now = SystemTime::now();
        let mut attempts = self.attempts.lock().unwrap();
        let entry = attempts
            .entry((String::from(operation), subject_id))
            .or_insert((0, now + window));

        if entry.1 <= now {
            *entry = (0, now + window);
        }

        entry.0 += 1;
        Ok(*entry)
    }
}

#[derive(Clone, Debug)]
pub struct LedgerRow {
    pub status: DeletionStatus,
    pub requested_at: SystemTime,
    pub last_error: Option<String>,
    pub steps_completed: Vec<String>,
}

#[derive(Default)]
pub struct FakeLedger {
    rows: Mutex<HashMap<Uuid, LedgerRow>>,
}

impl FakeLedger {
    pub fn row(&self, user_id: Uuid) -> Option<LedgerRow> {
        self.rows.lock().unwrap().get(&user_id).cloned()
    }

    pub fn put_row(&self, user_id: Uuid, status: DeletionStatus, requested_at: SystemTime) {
        self.rows.lock().unwrap().insert(
            user_id,
            LedgerRow {
                status,
                requested_at,
                last_error: None,
                steps_completed: Vec::new(),
            },
        );
    }
}

#[async_trait]
impl DeletionLedger for FakeLedger {
    async fn status(&self, user_id: Uuid) -> Result<Option<DeletionStatus>, PortError> {
        Ok(self.row(user_id).map(|r| r.status))
    }

    async fn acquire(
        &self,
        user_id: Uuid,
        stale_after: Duration,
    ) -> Result<AcquireOutcome, PortError> {
        let now = SystemTime::now();
        let mut rows = self.rows.lock().unwrap();

        if let Some(row) = rows.get(&user_id) {
            match row.status {
                DeletionStatus::Deleted => return Ok(AcquireOutcome::AlreadyDeleted),
                DeletionStatus::Processing if row.requested_at + stale_after > now => {
                    return Ok(AcquireOutcome::InProgress);
                }
                _ => (),
            }
        }

        rows.insert(
            user_id,
            LedgerRow {
                status: DeletionStatus::Processing,
                requested_at: now,
                last_error: None,
                steps_completed: Vec::new(),
            },
        );

        Ok(AcquireOutcome::Acquired)
    }

    async fn mark_deleted(&self, user_id: Uuid, steps: &[String]) -> Result<(), PortError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(&user_id)
            .ok_or_else(|| PortError::Rejected(String::from("no deletion request")))?;

        row.status = DeletionStatus::Deleted;
        row.steps_completed = steps.to_vec();
        Ok(())
    }

    async fn mark_failed(
        &self,
        user_id: Uuid,
        error: &str,
        steps: &[String],
    ) -> Result<(), PortError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(&user_id)
            .ok_or_else(|| PortError::Rejected(String::from("no deletion request")))?;

        row.status = DeletionStatus::Failed;
        row.last_error = Some(String::from(error));
        row.steps_completed = steps.to_vec();
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeErasureStore {
    touched: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    profile_deleted: AtomicBool,
}

impl FakeErasureStore {
    pub fn fail_table(&self, table: &str) {
        self.failing.lock().unwrap().insert(String::from(table));
    }

    pub fn touched_tables(&self) -> Vec<String> {
        self.touched.lock().unwrap().clone()
    }

    pub fn profile_deleted(&self) -> bool {
        self.profile_deleted.load(Ordering::SeqCst)
    }

    fn touch(&self, table: &str) -> Result<usize, PortError> {
        self.touched.lock().unwrap().push(String::from(table));

        if self.failing.lock().unwrap().contains(table) {
            return Err(PortError::Rejected(format!("relation \"{table}\" is locked")));
        }

        Ok(1)
    }
}

#[async_trait]
impl ErasureStore for FakeErasureStore {
    async fn delete_rows(&self, table: &str, _user_id: Uuid) -> Result<usize, PortError> {
        self.touch(table)
    }

    async fn anonymize_rows(
        &self,
        table: &str,
        _sensitive_column: &str,
        _marker: &serde_json::Value,
        _user_id: Uuid,
    ) -> Result<usize, PortError> {
        self.touch(table)
    }

    async fn delete_profile(&self, _user_id: Uuid) -> Result<(), PortError> {
        self.profile_deleted.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakePlatformStore {
    platforms: Mutex<HashMap<Uuid, Vec<PlatformConnection>>>,
}

impl FakePlatformStore {
    pub fn connect(&self, user_id: Uuid, platform: &str) {
        self.platforms
            .lock()
            .unwrap()
            .entry(user_id)
            .or_default()
            .push(PlatformConnection {
                platform: String::from(platform),
                access_token: Some(format!("{platform}-access")),
                refresh_token: Some(format!("{platform}-refresh")),
            });
    }
}

#[async_trait]
impl PlatformStore for FakePlatformStore {
    async fn connected_platforms(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<PlatformConnection>, PortError> {
        Ok(self
            .platforms
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct FakeAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl FakeAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn actions(&self) -> Vec<SecurityAction> {
        self.events().iter().map(|e| e.action).collect()
    }
}

#[async_trait]
impl AuditSink for FakeAuditSink {
    async fn log_event(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[derive(Default)]
pub struct FakeRevoker {
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    revoked: Mutex<Vec<String>>,
}

impl FakeRevoker {
    pub fn fail_platform(&self, platform: &str) {
        self.failing.lock().unwrap().insert(String::from(platform));
    }

    pub fn delay_each_call(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn revoked(&self) -> Vec<String> {
        self.revoked.lock().unwrap().clone()
    }
}

#[async_trait]
impl RevokeToken for FakeRevoker {
    async fn revoke(
        &self,
        platform: &str,
        _access_token: &str,
        _refresh_token: Option<&str>,
    ) -> bool {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().unwrap().contains(platform) {
            return false;
        }

        self.revoked.lock().unwrap().push(String::from(platform));
        true
    }
}

/// Every fake wired into one orchestrator, with handles kept for assertions.
#[derive(Default)]
pub struct Fakes {
    pub identity: Arc<FakeIdentityProvider>,
    pub ledger: Arc<FakeLedger>,
    pub rate_limits: Arc<FakeRateLimitStore>,
    pub codes: Arc<FakeVerificationCodes>,
    pub erasure: Arc<FakeErasureStore>,
    pub platforms: Arc<FakePlatformStore>,
    pub audit: Arc<FakeAuditSink>,
    pub revoker: Arc<FakeRevoker>,
}

impl Fakes {
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            identity: self.identity.clone(),
            ledger: self.ledger.clone(),
            rate_limits: self.rate_limits.clone(),
            codes: self.codes.clone(),
            erasure: self.erasure.clone(),
            platforms: self.platforms.clone(),
            audit: self.audit.clone(),
            revoker: self.revoker.clone(),
        }
    }

    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        Arc::new(Orchestrator::new(
            self.collaborators(),
            OrchestratorConfig::default(),
        ))
    }
}
