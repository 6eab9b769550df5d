use purge_common::db::deletion_request::Dao as DeletionRequestDao;
use purge_common::db::DbAsyncPool;

use async_trait::async_trait;
use std::time::Duration;

use crate::jobs::{Job, JobError};

/// Fails deletion requests left in `processing` longer than `stale_after`, e.g. by a server
/// that restarted mid-run, so the user can try again.
pub struct RecoverStaleDeletionRequestsJob {
    stale_after: Duration,
    db_async_pool: DbAsyncPool,
    is_running: bool,
}

impl RecoverStaleDeletionRequestsJob {
    pub fn new(stale_after: Duration, db_async_pool: DbAsyncPool) -> Self {
        Self {
            stale_after,
            db_async_pool,
            is_running: false,
        }
    }
}

#[async_trait]
impl Job for RecoverStaleDeletionRequestsJob {
    fn name(&self) -> &'static str {
        "Recover Stale Deletion Requests"
    }

    fn is_ready(&self) -> bool {
        !self.is_running
    }

    async fn execute(&mut self) -> Result<(), JobError> {
        self.is_running = true;

        let dao = DeletionRequestDao::new(&self.db_async_pool);
        let result = dao.recover_stale_requests(self.stale_after).await;

        self.is_running = false;

        match result? {
            0 => (),
            recovered_count => {
                log::warn!("Recovered {recovered_count} stale deletion requests");
            }
        }

        Ok(())
    }
}
