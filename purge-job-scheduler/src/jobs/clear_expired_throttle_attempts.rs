use purge_common::db::throttle::Dao as ThrottleDao;
use purge_common::db::DbAsyncPool;

use async_trait::async_trait;

use crate::jobs::{Job, JobError};

pub struct ClearExpiredThrottleAttemptsJob {
    db_async_pool: DbAsyncPool,
    is_running: bool,
}

impl ClearExpiredThrottleAttemptsJob {
    pub fn new(db_async_pool: DbAsyncPool) -> Self {
        Self {
            db_async_pool,
            is_running: false,
        }
    }
}

#[async_trait]
impl Job for ClearExpiredThrottleAttemptsJob {
    fn name(&self) -> &'static str {
        "Clear Expired Throttle Attempts"
    }

    fn is_ready(&self) -> bool {
        !self.is_running
    }

    async fn execute(&mut self) -> Result<(), JobError> {
        self.is_running = true;

        let dao = ThrottleDao::new(&self.db_async_pool);
        let result = dao.clear_expired_attempts().await;

        self.is_running = false;

        let deleted_count = result?;
        log::info!("Cleared {deleted_count} expired throttle windows");

        Ok(())
    }
}
