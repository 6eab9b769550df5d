use diesel::result::DatabaseErrorKind;
use diesel::{dsl, ExpressionMethods, OptionalExtension, QueryDsl};
use diesel_async::RunQueryDsl;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use crate::db::{DaoError, DbAsyncPool};
use crate::models::deletion_request::{DeletionRequest, DeletionStatus, NewDeletionRequest};
use crate::schema::deletion_requests as deletion_request_fields;
use crate::schema::deletion_requests::dsl::deletion_requests;

pub const STALE_RECOVERY_ERROR: &str = "Stale processing request - auto-recovered";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AcquireOutcome {
    Acquired,
    AlreadyDeleted,
    InProgress,
}

pub struct Dao {
    db_async_pool: DbAsyncPool,
}

impl Dao {
    pub fn new(db_async_pool: &DbAsyncPool) -> Self {
        Self {
            db_async_pool: db_async_pool.clone(),
        }
    }

    pub async fn get_request(&self, user_id: Uuid) -> Result<Option<DeletionRequest>, DaoError> {
        let mut conn = self.db_async_pool.get().await?;
        let request = deletion_requests
            .find(user_id)
            .first::<DeletionRequest>(&mut conn)
            .await
            .optional()?;

        Ok(request)
    }

    /// Locks the user's row and moves it to `processing` unless it is already deleted or a
    /// non-stale run holds it. Re-entry clears the previous error and step list.
    pub async fn acquire(
        &self,
        user_id: Uuid,
        stale_after: Duration,
    ) -> Result<AcquireOutcome, DaoError> {
        let mut db_connection = self.db_async_pool.get().await?;

        let result = db_connection
            .build_transaction()
            .run::<_, diesel::result::Error, _>(|conn| {
                Box::pin(async move {
                    let now = SystemTime::now();

                    let existing = deletion_requests
                        .find(user_id)
                        .for_update()
                        .first::<DeletionRequest>(conn)
                        .await
                        .optional()?;

                    let Some(existing) = existing else {
                        let new_request = NewDeletionRequest {
                            user_id,
                            status: DeletionStatus::Processing.as_str(),
                            requested_at: now,
                            completed_at: None,
                            last_error: None,
                            steps_completed: Vec::new(),
                        };

                        dsl::insert_into(deletion_requests)
                            .values(&new_request)
                            .execute(conn)
                            .await?;

                        return Ok(AcquireOutcome::Acquired);
                    };

                    match existing.status() {
                        DeletionStatus::Deleted => return Ok(AcquireOutcome::AlreadyDeleted),
                        DeletionStatus::Processing
                            if existing.requested_at + stale_after > now =>
                        {
                            return Ok(AcquireOutcome::InProgress);
                        }
                        _ => (),
                    }

                    dsl::update(deletion_requests.find(user_id))
                        .set((
                            deletion_request_fields::status
                                .eq(DeletionStatus::Processing.as_str()),
                            deletion_request_fields::requested_at.eq(now),
                            deletion_request_fields::completed_at.eq(None::<SystemTime>),
                            deletion_request_fields::last_error.eq(None::<String>),
                            deletion_request_fields::steps_completed.eq(Vec::<String>::new()),
                        ))
                        .execute(conn)
                        .await?;

                    Ok(AcquireOutcome::Acquired)
                })
            })
            .await;

        match result {
            Ok(outcome) => Ok(outcome),
            // Another request inserted the row between our read and our insert
            Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                Ok(AcquireOutcome::InProgress)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn mark_deleted(&self, user_id: Uuid, steps: &[String]) -> Result<(), DaoError> {
        let mut conn = self.db_async_pool.get().await?;
        dsl::update(deletion_requests.find(user_id))
            .set((
                deletion_request_fields::status.eq(DeletionStatus::Deleted.as_str()),
                deletion_request_fields::completed_at.eq(Some(SystemTime::now())),
                deletion_request_fields::last_error.eq(None::<String>),
                deletion_request_fields::steps_completed.eq(steps),
            ))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    pub async fn mark_failed(
        &self,
        user_id: Uuid,
        error: &str,
        steps: &[String],
    ) -> Result<(), DaoError> {
        let mut conn = self.db_async_pool.get().await?;
        dsl::update(deletion_requests.find(user_id))
            .set((
                deletion_request_fields::status.eq(DeletionStatus::Failed.as_str()),
                deletion_request_fields::last_error.eq(Some(error)),
                deletion_request_fields::steps_completed.eq(steps),
            ))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    /// Marks abandoned `processing` rows as failed so the next attempt starts clean.
    pub async fn recover_stale_requests(&self, stale_after: Duration) -> Result<usize, DaoError> {
        let cutoff = SystemTime::now() - stale_after;

        let mut conn = self.db_async_pool.get().await?;
        let recovered_count = dsl::update(
            deletion_requests
                .filter(deletion_request_fields::status.eq(DeletionStatus::Processing.as_str()))
                .filter(deletion_request_fields::requested_at.lt(cutoff)),
        )
        .set((
            deletion_request_fields::status.eq(DeletionStatus::Failed.as_str()),
            deletion_request_fields::last_error.eq(Some(STALE_RECOVERY_ERROR)),
        ))
        .execute(&mut conn)
        .await?;

        Ok(recovered_count)
    }
}
