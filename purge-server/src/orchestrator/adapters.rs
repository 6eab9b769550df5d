//! Postgres-backed implementations of the orchestrator's ports.

use async_trait::async_trait;
use purge_common::db::deletion_request::AcquireOutcome;
use purge_common::db::{self, DaoError, DbAsyncPool};
use purge_common::models::deletion_request::DeletionStatus;
use purge_common::token::access_token::AccessToken;
use purge_common::token::Token;
use std::str::FromStr;
use std::time::{Duration, SystemTime};
use tokio::sync::oneshot;
use uuid::Uuid;
use zeroize::Zeroizing;

use super::ports::*;

fn is_not_found(e: &DaoError) -> bool {
    matches!(e, DaoError::QueryFailure(diesel::result::Error::NotFound))
}

pub struct PgIdentityProvider {
    db_async_pool: DbAsyncPool,
    token_signing_key: Zeroizing<Vec<u8>>,
}

impl PgIdentityProvider {
    pub fn new(db_async_pool: &DbAsyncPool, token_signing_key: &[u8]) -> Self {
        Self {
            db_async_pool: db_async_pool.clone(),
            token_signing_key: Zeroizing::new(Vec::from(token_signing_key)),
        }
    }
}

#[async_trait]
impl IdentityProvider for PgIdentityProvider {
    async fn authenticate(&self, bearer_token: &str) -> Result<Option<Uuid>, PortError> {
        match AccessToken::decode(bearer_token).and_then(|t| t.verify(&self.token_signing_key)) {
            Ok(claims) => Ok(Some(claims.user_id)),
            Err(e) => {
                log::debug!("Rejected bearer token: {e}");
                Ok(None)
            }
        }
    }

    async fn get_current_user(&self, bearer_token: &str) -> Result<Option<Identity>, PortError> {
        let Some(user_id) = self.authenticate(bearer_token).await? else {
            return Ok(None);
        };

        let auth_dao = db::auth::Dao::new(&self.db_async_pool);
        match auth_dao.get_user(user_id).await {
            Ok(user) => Ok(Some(Identity {
                user_id: user.id,
                email: user.email,
            })),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_account(&self, user_id: Uuid) -> Result<Option<Account>, PortError> {
        let auth_dao = db::auth::Dao::new(&self.db_async_pool);
        match auth_dao.get_user(user_id).await {
            Ok(user) => Ok(Some(Account {
                user_id: user.id,
                email: user.email,
                provider: user.auth_provider,
                providers: user.auth_providers,
            })),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn verify_password(&self, user_id: Uuid, password: &str) -> Result<bool, PortError> {
        let auth_dao = db::auth::Dao::new(&self.db_async_pool);
        let user = auth_dao.get_user(user_id).await?;

        let Some(password_hash) = user.password_hash else {
            return Ok(false);
        };

        let password = Zeroizing::new(Vec::from(password.as_bytes()));
        let (sender, receiver) = oneshot::channel();

        rayon::spawn(move || {
            let matches = match argon2_kdf::Hash::from_str(&password_hash) {
                Ok(hash) => Ok(hash.verify(&password)),
                Err(e) => Err(e),
            };

            if sender.send(matches).is_err() {
                log::error!("Password verification result receiver dropped");
            }
        });

        match receiver.await {
            Ok(Ok(matches)) => Ok(matches),
            Ok(Err(e)) => {
                log::error!("Stored password hash for user {user_id} is unparseable: {e}");
                Ok(false)
            }
            Err(_) => Err(PortError::Unavailable(String::from(
                "Rayon thread pool failure",
            ))),
        }
    }

    async fn revoke_all_sessions(&self, user_id: Uuid) -> Result<(), PortError> {
        let auth_dao = db::auth::Dao::new(&self.db_async_pool);
        let revoked = auth_dao.revoke_all_sessions(user_id).await?;
        log::info!("Revoked {revoked} sessions for user {user_id}");

        Ok(())
    }

    async fn delete_account(&self, user_id: Uuid) -> Result<(), PortError> {
        let auth_dao = db::auth::Dao::new(&self.db_async_pool);
        auth_dao.delete_auth_user(user_id).await?;

        Ok(())
    }
}

pub struct PgDeletionLedger {
    db_async_pool: DbAsyncPool,
}

impl PgDeletionLedger {
    pub fn new(db_async_pool: &DbAsyncPool) -> Self {
        Self {
            db_async_pool: db_async_pool.clone(),
        }
    }
}

#[async_trait]
impl DeletionLedger for PgDeletionLedger {
    async fn status(&self, user_id: Uuid) -> Result<Option<DeletionStatus>, PortError> {
        let dao = db::deletion_request::Dao::new(&self.db_async_pool);
        let request = dao.get_request(user_id).await?;

        Ok(request.map(|r| r.status()))
    }

    async fn acquire(
        &self,
        user_id: Uuid,
        stale_after: Duration,
    ) -> Result<AcquireOutcome, PortError> {
        let dao = db::deletion_request::Dao::new(&self.db_async_pool);
        Ok(dao.acquire(user_id, stale_after).await?)
    }

    async fn mark_deleted(&self, user_id: Uuid, steps: &[String]) -> Result<(), PortError> {
        let dao = db::deletion_request::Dao::new(&self.db_async_pool);
        Ok(dao.mark_deleted(user_id, steps).await?)
    }

    async fn mark_failed(
        &self,
        user_id: Uuid,
        error: &str,
        steps: &[String],
    ) -> Result<(), PortError> {
        let dao = db::deletion_request::Dao::new(&self.db_async_pool);
        Ok(dao.mark_failed(user_id, error, steps).await?)
    }
}

pub struct PgRateLimitStore {
    db_async_pool: DbAsyncPool,
}

impl PgRateLimitStore {
    pub fn new(db_async_pool: &DbAsyncPool) -> Self {
        Self {
            db_async_pool: db_async_pool.clone(),
        }
    }
}

#[async_trait]
impl RateLimitStore for PgRateLimitStore {
    async fn record_attempt(
        &self,
        operation: &str,
        subject_id: Uuid,
        window: Duration,
    ) -> Result<(u32, SystemTime), PortError> {
        let throttle_dao = db::throttle::Dao::new(&self.db_async_pool);
        let (attempt_count, expiration) = throttle_dao
            .mark_attempt_and_get_attempt_count(operation, subject_id, window)
            .await?;

        Ok((attempt_count.max(0) as u32, expiration))
    }
}

pub struct PgVerificationCodeStore {
    db_async_pool: DbAsyncPool,
}

impl PgVerificationCodeStore {
    pub fn new(db_async_pool: &DbAsyncPool) -> Self {
        Self {
            db_async_pool: db_async_pool.clone(),
        }
    }
}

#[async_trait]
impl VerificationCodeStore for PgVerificationCodeStore {
    async fn issue(
        &self,
        user_id: Uuid,
        email: &str,
        code: &str,
        purpose: &str,
        expires_at: SystemTime,
    ) -> Result<(), PortError> {
        let auth_dao = db::auth::Dao::new(&self.db_async_pool);
        auth_dao
            .save_verification_code(user_id, email, code, purpose, expires_at)
            .await?;

        Ok(())
    }

    async fn consume(&self, user_id: Uuid, purpose: &str, code: &str) -> Result<bool, PortError> {
        let auth_dao = db::auth::Dao::new(&self.db_async_pool);
        Ok(auth_dao
            .consume_verification_code(user_id, purpose, code)
            .await?)
    }
}

pub struct PgErasureStore {
    db_async_pool: DbAsyncPool,
}

impl PgErasureStore {
    pub fn new(db_async_pool: &DbAsyncPool) -> Self {
        Self {
            db_async_pool: db_async_pool.clone(),
        }
    }
}

#[async_trait]
impl ErasureStore for PgErasureStore {
    async fn delete_rows(&self, table: &str, user_id: Uuid) -> Result<usize, PortError> {
        let erasure_dao = db::erasure::Dao::new(&self.db_async_pool);
        Ok(erasure_dao.delete_user_rows(table, user_id).await?)
    }

    async fn anonymize_rows(
        &self,
        table: &str,
        sensitive_column: &str,
        marker: &serde_json::Value,
        user_id: Uuid,
    ) -> Result<usize, PortError> {
        let erasure_dao = db::erasure::Dao::new(&self.db_async_pool);
        Ok(erasure_dao
            .anonymize_user_rows(table, sensitive_column, marker, user_id)
            .await?)
    }

    async fn delete_profile(&self, user_id: Uuid) -> Result<(), PortError> {
        let erasure_dao = db::erasure::Dao::new(&self.db_async_pool);
        erasure_dao.delete_profile(user_id).await?;

        Ok(())
    }
}

pub struct PgPlatformStore {
    db_async_pool: DbAsyncPool,
}

impl PgPlatformStore {
    pub fn new(db_async_pool: &DbAsyncPool) -> Self {
        Self {
            db_async_pool: db_async_pool.clone(),
        }
    }
}

#[async_trait]
impl PlatformStore for PgPlatformStore {
    async fn connected_platforms(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<PlatformConnection>, PortError> {
        let platform_dao = db::connected_platform::Dao::new(&self.db_async_pool);
        let platforms = platform_dao.get_platforms_for_user(user_id).await?;

        Ok(platforms
            .into_iter()
            .map(|p| PlatformConnection {
                platform: p.platform,
                access_token: p.oauth_token,
                refresh_token: p.refresh_token,
            })
            .collect())
    }
}

/// Writes each event to the log as one line of JSON, then persists it. Persistence failures
/// are logged and swallowed.
pub struct PgAuditSink {
    db_async_pool: DbAsyncPool,
}

impl PgAuditSink {
    pub fn new(db_async_pool: &DbAsyncPool) -> Self {
        Self {
            db_async_pool: db_async_pool.clone(),
        }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn log_event(&self, event: AuditEvent) {
        log::info!(
            "{}",
            serde_json::json!({
                "audit": event.action.as_str(),
                "actor_id": event.actor_id,
                "status": event.status.as_str(),
                "details": event.details,
            })
        );

        let audit_dao = db::audit::Dao::new(&self.db_async_pool);
        if let Err(e) = audit_dao
            .insert_entry(
                event.actor_id,
                event.action.as_str(),
                event.status.as_str(),
                &event.details,
            )
            .await
        {
            log::error!(
                "Failed to persist audit event {}: {e}",
                event.action.as_str()
            );
        }
    }
}
