use purge_common::db::auth::Dao as AuthDao;
use purge_common::db::DbAsyncPool;

use async_trait::async_trait;

use crate::jobs::{Job, JobError};

/// Removes verification codes that have expired or were already used.
pub struct ClearExpiredVerificationCodesJob {
    db_async_pool: DbAsyncPool,
    is_running: bool,
}

impl ClearExpiredVerificationCodesJob {
    pub fn new(db_async_pool: DbAsyncPool) -> Self {
        Self {
            db_async_pool,
            is_running: false,
        }
    }
}

#[async_trait]
impl Job for ClearExpiredVerificationCodesJob {
    fn name(&self) -> &'static str {
        "Clear Expired Verification Codes"
    }

    fn is_ready(&self) -> bool {
        !self.is_running
    }

    async fn execute(&mut self) -> Result<(), JobError> {
        self.is_running = true;

        let dao = AuthDao::new(&self.db_async_pool);
        let result = dao.delete_all_expired_verification_codes().await;

        self.is_running = false;

        let deleted_count = result?;
        log::info!("Cleared {deleted_count} expired or used verification codes");

        Ok(())
    }
}
