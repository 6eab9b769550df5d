//! Account deletion: authorization up to the ledger lock, then a detached run that revokes
//! sessions and platform tokens, erases the user's data and reports progress as it goes.

pub mod adapters;
pub mod eraser;
pub mod gate;
pub mod ports;
pub mod progress;
pub mod rate_limiter;
pub mod state;

#[cfg(test)]
pub mod testing;

use futures::future;
use purge_common::db::deletion_request::AcquireOutcome;
use purge_common::models::deletion_request::DeletionStatus;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::revocation::RevokeToken;
use eraser::{Eraser, ErasurePlan};
use gate::{Credential, GateError, ReauthGate, ReauthMethod};
use ports::{
    AuditEvent, AuditSink, AuditStatus, DeletionLedger, ErasureStore, IdentityProvider,
    PlatformStore, PortError, RateLimitStore, SecurityAction, VerificationCodeStore,
};
use progress::{ProgressChannel, ProgressEvent};
use rate_limiter::{RateLimitPolicy, RateLimiter, DELETE_ACCOUNT_POLICY};
use state::{RunState, Signal, TransitionError};

pub const CONFIRMATION_TEXT: &str = "DELETE";
pub const GENERIC_ERROR_MSG: &str = "An unexpected error occurred. Please try again.";
pub const REVOKE_TOKENS_MSG: &str = "Revoking connected platform tokens...";

/// Replaces messages that look like they carry a stack trace with a generic message.
pub fn sanitize_error_message(message: &str) -> String {
    if message.contains("stack") || message.contains("at ") {
        String::from(GENERIC_ERROR_MSG)
    } else {
        String::from(message)
    }
}

#[derive(Clone, Debug)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: String,
}

impl ClientInfo {
    pub fn unknown() -> Self {
        Self {
            ip: String::from("unknown"),
            user_agent: String::from("unknown"),
        }
    }

    /// Audit details with the client's address and user agent merged in.
    pub fn details(&self, mut details: Value) -> Value {
        if let Value::Object(fields) = &mut details {
            fields.insert(String::from("ip"), Value::from(self.ip.as_str()));
            fields.insert(
                String::from("userAgent"),
                Value::from(self.user_agent.as_str()),
            );
        }

        details
    }
}

#[derive(Debug)]
pub struct DeletionCommand {
    pub confirmation_text: String,
    pub current_password: Option<String>,
    pub verification_code: Option<String>,
    pub client: ClientInfo,
}

impl DeletionCommand {
    fn credential(&self) -> Result<Option<Credential>, DeletionError> {
        match (&self.current_password, &self.verification_code) {
            (Some(_), Some(_)) => Err(DeletionError::InvalidInput(String::from(
                "Provide either a password or a verification code, not both",
            ))),
            (Some(password), None) => Ok(Some(Credential::Password(password.clone()))),
            (None, Some(code)) => Ok(Some(Credential::VerificationCode(code.clone()))),
            (None, None) => Ok(None),
        }
    }
}

#[derive(Debug)]
pub enum DeletionError {
    Unauthorized,
    InvalidInput(String),
    AlreadyInProgress,
    TooManyAttempts { retry_after_secs: u64 },
    ReauthRequired { method: ReauthMethod },
    ReauthFailed,
    CriticalErasureFailure { message: String, detail: String },
    Fatal(String),
    Unavailable(String),
}

impl std::error::Error for DeletionError {}

impl fmt::Display for DeletionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeletionError::Unauthorized => write!(f, "DeletionError: Unauthorized"),
            DeletionError::InvalidInput(msg) => write!(f, "DeletionError: Invalid input: {msg}"),
            DeletionError::AlreadyInProgress => {
                write!(f, "DeletionError: Deletion already in progress")
            }
            DeletionError::TooManyAttempts { retry_after_secs } => write!(
                f,
                "DeletionError: Too many attempts, retry after {retry_after_secs}s"
            ),
            DeletionError::ReauthRequired { method } => write!(
                f,
                "DeletionError: Re-authentication required ({})",
                method.as_str()
            ),
            DeletionError::ReauthFailed => write!(f, "DeletionError: Re-authentication failed"),
            DeletionError::CriticalErasureFailure { detail, .. } => {
                write!(f, "DeletionError: Critical erasure failure: {detail}")
            }
            DeletionError::Fatal(msg) => write!(f, "DeletionError: Fatal: {msg}"),
            DeletionError::Unavailable(msg) => write!(f, "DeletionError: Unavailable: {msg}"),
        }
    }
}

impl From<PortError> for DeletionError {
    fn from(e: PortError) -> Self {
        match e {
            PortError::Unavailable(msg) => DeletionError::Unavailable(msg),
            PortError::Rejected(msg) => DeletionError::Fatal(msg),
        }
    }
}

impl From<TransitionError> for DeletionError {
    fn from(e: TransitionError) -> Self {
        DeletionError::Fatal(e.to_string())
    }
}

#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub stale_after: Duration,
    pub rate_limit: RateLimitPolicy,
    pub erasure_plan: ErasurePlan,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(60 * 60),
            rate_limit: DELETE_ACCOUNT_POLICY,
            erasure_plan: ErasurePlan::default(),
        }
    }
}

pub struct Collaborators {
    pub identity: Arc<dyn IdentityProvider>,
    pub ledger: Arc<dyn DeletionLedger>,
    pub rate_limits: Arc<dyn RateLimitStore>,
    pub codes: Arc<dyn VerificationCodeStore>,
    pub erasure: Arc<dyn ErasureStore>,
    pub platforms: Arc<dyn PlatformStore>,
    pub audit: Arc<dyn AuditSink>,
    pub revoker: Arc<dyn RevokeToken>,
}

/// A request that passed every check and holds the ledger lock. Consumed by
/// [`Orchestrator::execute`].
#[derive(Debug)]
pub struct AuthorizedRun {
    pub user_id: Uuid,
    client: ClientInfo,
    state: RunState,
    init_event: Option<ProgressEvent>,
}

#[derive(Debug)]
pub enum Authorization {
    AlreadyDeleted,
    Authorized(AuthorizedRun),
}

#[derive(Debug)]
pub struct RunOutcome {
    pub state: RunState,
    pub steps_completed: Vec<String>,
    pub error: Option<String>,
}

pub struct Orchestrator {
    identity: Arc<dyn IdentityProvider>,
    ledger: Arc<dyn DeletionLedger>,
    platforms: Arc<dyn PlatformStore>,
    audit: Arc<dyn AuditSink>,
    revoker: Arc<dyn RevokeToken>,
    limiter: RateLimiter,
    gate: ReauthGate,
    eraser: Eraser,
    stale_after: Duration,
    rate_limit: RateLimitPolicy,
}

impl Orchestrator {
    pub fn new(collaborators: Collaborators, config: OrchestratorConfig) -> Self {
        let Collaborators {
            identity,
            ledger,
            rate_limits,
            codes,
            erasure,
            platforms,
            audit,
            revoker,
        } = collaborators;

        Self {
            limiter: RateLimiter::new(rate_limits),
            gate: ReauthGate::new(Arc::clone(&identity), codes),
            eraser: Eraser::new(erasure, Arc::clone(&identity), config.erasure_plan),
            identity,
            ledger,
            platforms,
            audit,
            revoker,
            stale_after: config.stale_after,
            rate_limit: config.rate_limit,
        }
    }

    /// Runs every check that can be answered directly, up to and including the ledger lock.
    /// Nothing is erased here.
    pub async fn authorize(
        &self,
        bearer_token: &str,
        command: DeletionCommand,
    ) -> Result<Authorization, DeletionError> {
        let mut state = RunState::Unauthenticated;

        let user_id = self
            .identity
            .authenticate(bearer_token)
            .await?
            .ok_or(DeletionError::Unauthorized)?;
        state = state.next(Signal::IdentityVerified)?.state;

        if command.confirmation_text != CONFIRMATION_TEXT {
            return Err(DeletionError::InvalidInput(String::from(
                "Please type DELETE to confirm account deletion",
            )));
        }

        let credential = command.credential()?;

        // Completed runs leave no account behind, so this precedes the account lookup.
        if self.ledger.status(user_id).await? == Some(DeletionStatus::Deleted) {
            return Ok(Authorization::AlreadyDeleted);
        }

        let rate_check = match self.limiter.check(user_id, &self.rate_limit).await {
            Ok(c) => c,
            Err(e) => {
                log::error!("Rate limit store unavailable, denying deletion attempt: {e}");
                return Err(DeletionError::Unavailable(e.to_string()));
            }
        };

        if !rate_check.allowed {
            self.audit
                .log_event(AuditEvent {
                    action: SecurityAction::RateLimitExceeded,
                    actor_id: Some(user_id),
                    status: AuditStatus::Warning,
                    details: command
                        .client
                        .details(json!({ "action_type": self.rate_limit.operation })),
                })
                .await;

            return Err(DeletionError::TooManyAttempts {
                retry_after_secs: rate_check.retry_after_secs(),
            });
        }
        state = state.next(Signal::RateAllowed)?.state;

        let account = self
            .identity
            .get_account(user_id)
            .await?
            .ok_or(DeletionError::Unauthorized)?;

        match self.gate.verify(&account, credential.as_ref()).await {
            Ok(_) => (),
            Err(GateError::ReauthRequired { method }) | Err(GateError::MissingInput { method }) => {
                return Err(DeletionError::ReauthRequired { method });
            }
            Err(GateError::Unavailable(e)) => return Err(e.into()),
            Err(e) => {
                log::info!("Re-authentication failed for user {}: {e}", user_id);
                self.audit
                    .log_event(AuditEvent {
                        action: SecurityAction::AccountDeleteFailed,
                        actor_id: Some(user_id),
                        status: AuditStatus::Failure,
                        details: command
                            .client
                            .details(json!({ "reason": e.audit_reason() })),
                    })
                    .await;

                return Err(DeletionError::ReauthFailed);
            }
        }
        state = state.next(Signal::ReauthSucceeded)?.state;

        match self.ledger.acquire(user_id, self.stale_after).await? {
            AcquireOutcome::AlreadyDeleted => Ok(Authorization::AlreadyDeleted),
            AcquireOutcome::InProgress => Err(DeletionError::AlreadyInProgress),
            AcquireOutcome::Acquired => {
                let transition = state.next(Signal::LockAcquired)?;

                Ok(Authorization::Authorized(AuthorizedRun {
                    user_id: user_id,
                    client: command.client,
                    state: transition.state,
                    init_event: transition.event,
                }))
            }
        }
    }

    /// Spawns the run on a detached task so a client disconnect cannot cancel it, and returns
    /// the receiving end of its progress stream.
    pub fn start(
        self: &Arc<Self>,
        run: AuthorizedRun,
    ) -> mpsc::UnboundedReceiver<ProgressEvent> {
        let (channel, receiver) = progress::channel();
        let orchestrator = Arc::clone(self);

        tokio::spawn(async move {
            let outcome = orchestrator.execute(run, channel).await;
            log::info!(
                "Deletion run ended in state {:?} after {} steps",
                outcome.state,
                outcome.steps_completed.len(),
            );
        });

        receiver
    }

    pub async fn execute(&self, run: AuthorizedRun, progress: ProgressChannel) -> RunOutcome {
        let AuthorizedRun {
            user_id,
            client,
            mut state,
            init_event,
        } = run;

        if let Some(event) = init_event {
            progress.emit(event);
        }

        self.audit
            .log_event(AuditEvent {
                action: SecurityAction::AccountDeleteRequested,
                actor_id: Some(user_id),
                status: AuditStatus::Success,
                details: client.details(json!({})),
            })
            .await;

        let mut steps = Vec::new();

        match self.run_steps(&mut state, user_id, &progress, &mut steps).await {
            Ok(()) => {
                if let Err(e) = self.ledger.mark_deleted(user_id, &steps).await {
                    log::error!("Failed to mark deletion request for {user_id} as deleted: {e}");
                }

                self.audit
                    .log_event(AuditEvent {
                        action: SecurityAction::AccountDeleted,
                        actor_id: None,
                        status: AuditStatus::Success,
                        details: client.details(json!({ "steps_completed": steps })),
                    })
                    .await;

                match state.next(Signal::Finalized) {
                    Ok(transition) => {
                        state = transition.state;
                        if let Some(event) = transition.event {
                            progress.finish(event);
                        }
                    }
                    Err(e) => {
                        log::error!("{e}");
                        progress.finish(ProgressEvent::error(GENERIC_ERROR_MSG));
                    }
                }

                RunOutcome {
                    state,
                    steps_completed: steps,
                    error: None,
                }
            }
            Err(e) => {
                log::error!("Account deletion for user {user_id} failed: {e}");

                let message = match &e {
                    DeletionError::CriticalErasureFailure { message, .. } => message.clone(),
                    _ => String::from(GENERIC_ERROR_MSG),
                };

                let last_error = match &e {
                    DeletionError::CriticalErasureFailure { detail, .. } => {
                        sanitize_error_message(detail)
                    }
                    e => sanitize_error_message(&e.to_string()),
                };

                if let Err(e) = self.ledger.mark_failed(user_id, &last_error, &steps).await {
                    log::error!("Failed to mark deletion request for {user_id} as failed: {e}");
                }

                self.audit
                    .log_event(AuditEvent {
                        action: SecurityAction::AccountDeleteFailed,
                        actor_id: Some(user_id),
                        status: AuditStatus::Failure,
                        details: client.details(json!({
                            "error": e.to_string(),
                            "steps_completed": steps,
                        })),
                    })
                    .await;

                let event = match state.next(Signal::Fault(message.clone())) {
                    Ok(transition) => {
                        state = transition.state;
                        transition.event
                    }
                    Err(e) => {
                        log::error!("{e}");
                        state = RunState::Failed;
                        None
                    }
                };
                progress.finish(event.unwrap_or_else(|| ProgressEvent::error(&message)));

                RunOutcome {
                    state,
                    steps_completed: steps,
                    error: Some(message),
                }
            }
        }
    }

    async fn run_steps(
        &self,
        state: &mut RunState,
        user_id: Uuid,
        progress: &ProgressChannel,
        steps: &mut Vec<String>,
    ) -> Result<(), DeletionError> {
        self.advance(state, Signal::RevocationStarted, progress)?;

        match self.identity.revoke_all_sessions(user_id).await {
            Ok(()) => steps.push(String::from("sessions_revoked")),
            Err(e) => log::warn!("Failed to revoke sessions for user {user_id}: {e}"),
        }

        progress.emit(ProgressEvent::progress("revoke_tokens", REVOKE_TOKENS_MSG));
        self.revoke_platform_tokens(user_id, progress, steps).await;

        self.advance(state, Signal::RevocationJoined, progress)?;

        let outcome = self.eraser.erase(user_id, progress).await;
        steps.extend(outcome.completed_steps);

        if let Some(failure) = outcome.error {
            return Err(DeletionError::CriticalErasureFailure {
                message: failure.message,
                detail: failure.detail,
            });
        }

        self.advance(state, Signal::ErasureSucceeded, progress)?;

        Ok(())
    }

    /// Revokes every connected platform concurrently. Individual failures are recorded and
    /// never abort the run.
    async fn revoke_platform_tokens(
        &self,
        user_id: Uuid,
        progress: &ProgressChannel,
        steps: &mut Vec<String>,
    ) {
        let platforms = match self.platforms.connected_platforms(user_id).await {
            Ok(p) => p,
            Err(e) => {
                log::warn!("Failed to list connected platforms for user {user_id}: {e}");
                return;
            }
        };

        if platforms.is_empty() {
            return;
        }

        let revocations = platforms.iter().filter_map(|connection| {
            let access_token = connection.access_token.as_deref()?;

            Some(async move {
                progress.emit(ProgressEvent::progress_for(
                    "revoke_tokens",
                    &format!("Revoking {}...", connection.platform),
                    "platform",
                    &connection.platform,
                ));

                let revoked = self
                    .revoker
                    .revoke(
                        &connection.platform,
                        access_token,
                        connection.refresh_token.as_deref(),
                    )
                    .await;

                (connection.platform.as_str(), revoked)
            })
        });

        for (platform, revoked) in future::join_all(revocations).await {
            if revoked {
                steps.push(format!("{platform}_token_revoked"));
            } else {
                log::warn!("Token revocation for {platform} failed for user {user_id}");
                steps.push(format!("{platform}_token_revoke_failed"));
            }
        }

        steps.push(String::from("oauth_tokens_revoked"));
    }

    fn advance(
        &self,
        state: &mut RunState,
        signal: Signal,
        progress: &ProgressChannel,
    ) -> Result<(), TransitionError> {
        let transition = state.next(signal)?;
        *state = transition.state;

        if let Some(event) = transition.event {
            progress.emit(event);
        }

        Ok(())
    }
}
