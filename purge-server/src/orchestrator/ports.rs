//! Collaborators the orchestrator drives. Production implementations live in
//! [`super::adapters`]; in-memory fakes live in [`super::testing`].

use async_trait::async_trait;
use purge_common::db::deletion_request::AcquireOutcome;
use purge_common::db::DaoError;
use purge_common::models::deletion_request::DeletionStatus;
use std::fmt;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

#[derive(Debug)]
pub enum PortError {
    Unavailable(String),
    Rejected(String),
}

impl std::error::Error for PortError {}

impl fmt::Display for PortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortError::Unavailable(msg) => write!(f, "PortError: Unavailable: {msg}"),
            PortError::Rejected(msg) => write!(f, "PortError: Rejected: {msg}"),
        }
    }
}

impl From<DaoError> for PortError {
    fn from(e: DaoError) -> Self {
        match e {
            DaoError::DbAsyncPoolFailure(_) => PortError::Unavailable(e.to_string()),
            _ => PortError::Rejected(e.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: String,
}

#[derive(Clone, Debug)]
pub struct Account {
    pub user_id: Uuid,
    pub email: String,
    pub provider: String,
    pub providers: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct PlatformConnection {
    pub platform: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AuditStatus {
    Success,
    Failure,
    Warning,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "success",
            AuditStatus::Failure => "failure",
            AuditStatus::Warning => "warning",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SecurityAction {
    AccountDeleteRequested,
    AccountDeleted,
    AccountDeleteFailed,
    RateLimitExceeded,
    OtpSent,
    OtpSendFailed,
}

impl SecurityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityAction::AccountDeleteRequested => "ACCOUNT_DELETE_REQUESTED",
            SecurityAction::AccountDeleted => "ACCOUNT_DELETED",
            SecurityAction::AccountDeleteFailed => "ACCOUNT_DELETE_FAILED",
            SecurityAction::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            SecurityAction::OtpSent => "OTP_SENT",
            SecurityAction::OtpSendFailed => "OTP_SEND_FAILED",
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuditEvent {
    pub action: SecurityAction,
    pub actor_id: Option<Uuid>,
    pub status: AuditStatus,
    pub details: serde_json::Value,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verifies a bearer credential and returns the user it was issued to. The account behind
    /// it may no longer exist.
    async fn authenticate(&self, bearer_token: &str) -> Result<Option<Uuid>, PortError>;
    /// Resolves a bearer credential to the caller's identity. `None` means the credential is
    /// not acceptable.
    async fn get_current_user(&self, bearer_token: &str) -> Result<Option<Identity>, PortError>;
    async fn get_account(&self, user_id: Uuid) -> Result<Option<Account>, PortError>;
    async fn verify_password(&self, user_id: Uuid, password: &str) -> Result<bool, PortError>;
    async fn revoke_all_sessions(&self, user_id: Uuid) -> Result<(), PortError>;
    async fn delete_account(&self, user_id: Uuid) -> Result<(), PortError>;
}

#[async_trait]
pub trait DeletionLedger: Send + Sync {
    async fn status(&self, user_id: Uuid) -> Result<Option<DeletionStatus>, PortError>;
    async fn acquire(&self, user_id: Uuid, stale_after: Duration)
        -> Result<AcquireOutcome, PortError>;
    async fn mark_deleted(&self, user_id: Uuid, steps: &[String]) -> Result<(), PortError>;
    async fn mark_failed(&self, user_id: Uuid, error: &str, steps: &[String])
        -> Result<(), PortError>;
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Atomically records an attempt and returns the attempt count in the current window and
    /// the time the window resets.
    async fn record_attempt(
        &self,
        operation: &str,
        subject_id: Uuid,
        window: Duration,
    ) -> Result<(u32, SystemTime), PortError>;
}

#[async_trait]
pub trait VerificationCodeStore: Send + Sync {
    async fn issue(
        &self,
        user_id: Uuid,
        email: &str,
        code: &str,
        purpose: &str,
        expires_at: SystemTime,
    ) -> Result<(), PortError>;

    /// Consumes the most recent unused, unexpired code for the purpose if it equals `code`.
    async fn consume(&self, user_id: Uuid, purpose: &str, code: &str) -> Result<bool, PortError>;
}

#[async_trait]
pub trait ErasureStore: Send + Sync {
    async fn delete_rows(&self, table: &str, user_id: Uuid) -> Result<usize, PortError>;
    async fn anonymize_rows(
        &self,
        table: &str,
        sensitive_column: &str,
        marker: &serde_json::Value,
        user_id: Uuid,
    ) -> Result<usize, PortError>;
    async fn delete_profile(&self, user_id: Uuid) -> Result<(), PortError>;
}

#[async_trait]
pub trait PlatformStore: Send + Sync {
    async fn connected_platforms(&self, user_id: Uuid)
        -> Result<Vec<PlatformConnection>, PortError>;
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Records a security event. Failures are logged by the sink and never surface.
    async fn log_event(&self, event: AuditEvent);
}
