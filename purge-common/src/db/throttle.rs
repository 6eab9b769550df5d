use diesel::{dsl, ExpressionMethods, QueryDsl};
use diesel_async::RunQueryDsl;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use crate::db::{DaoError, DbAsyncPool};
use crate::models::throttleable_attempt::NewThrottleableAttempt;
use crate::schema::throttleable_attempts as throttleable_attempt_fields;
use crate::schema::throttleable_attempts::dsl::throttleable_attempts;

pub struct Dao {
    db_async_pool: DbAsyncPool,
}

impl Dao {
    pub fn new(db_async_pool: &DbAsyncPool) -> Self {
        Self {
            db_async_pool: db_async_pool.clone(),
        }
    }

    /// Records an attempt and returns the attempt count within the current window along with
    /// the time the window expires. An expired window is restarted by the attempt.
    pub async fn mark_attempt_and_get_attempt_count(
        &self,
        operation: &str,
        subject_id: Uuid,
        window: Duration,
    ) -> Result<(i32, SystemTime), DaoError> {
        let operation = String::from(operation);
        let mut db_connection = self.db_async_pool.get().await?;

        let attempt_count_and_expiration = db_connection
            .build_transaction()
            .run::<_, diesel::result::Error, _>(|conn| {
                Box::pin(async move {
                    let now = SystemTime::now();
                    let new_expiration = now + window;

                    let new_attempt = NewThrottleableAttempt {
                        operation: &operation,
                        subject_id,
                        attempt_count: 1,
                        expiration_timestamp: new_expiration,
                    };

                    let (attempt_count, curr_expiration) = dsl::insert_into(throttleable_attempts)
                        .values(&new_attempt)
                        .on_conflict((
                            throttleable_attempt_fields::operation,
                            throttleable_attempt_fields::subject_id,
                        ))
                        .do_update()
                        .set(
                            throttleable_attempt_fields::attempt_count
                                .eq(throttleable_attempt_fields::attempt_count + 1),
                        )
                        .returning((
                            throttleable_attempt_fields::attempt_count,
                            throttleable_attempt_fields::expiration_timestamp,
                        ))
                        .get_result::<(i32, SystemTime)>(conn)
                        .await?;

                    if curr_expiration < now {
                        dsl::update(throttleable_attempts.find((operation.as_str(), subject_id)))
                            .set((
                                throttleable_attempt_fields::attempt_count.eq(1),
                                throttleable_attempt_fields::expiration_timestamp
                                    .eq(new_expiration),
                            ))
                            .execute(conn)
                            .await?;

                        return Ok((1, new_expiration));
                    }

                    Ok((attempt_count, curr_expiration))
                })
            })
            .await?;

        Ok(attempt_count_and_expiration)
    }

    pub async fn clear_expired_attempts(&self) -> Result<usize, DaoError> {
        let mut conn = self.db_async_pool.get().await?;
        let deleted_count = diesel::delete(
            throttleable_attempts
                .filter(throttleable_attempt_fields::expiration_timestamp.lt(SystemTime::now())),
        )
        .execute(&mut conn)
        .await?;

        Ok(deleted_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils;

    fn dao() -> Dao {
        Dao::new(test_utils::db_async_pool())
    }

    #[tokio::test]
    #[ignore]
    async fn attempts_accumulate_within_window() {
        let dao = dao();
        let subject_id = Uuid::now_v7();
        let window = Duration::from_secs(60);

        let (count, expiration) = dao
            .mark_attempt_and_get_attempt_count("delete_account", subject_id, window)
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert!(expiration > SystemTime::now());

        let (count, second_expiration) = dao
            .mark_attempt_and_get_attempt_count("delete_account", subject_id, window)
            .await
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(expiration, second_expiration);

        let (count, _) = dao
            .mark_attempt_and_get_attempt_count("send_otp", subject_id, window)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    #[ignore]
    async fn expired_window_restarts_count() {
        let dao = dao();
        let subject_id = Uuid::now_v7();

        dao.mark_attempt_and_get_attempt_count("delete_account", subject_id, Duration::ZERO)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let (count, _) = dao
            .mark_attempt_and_get_attempt_count(
                "delete_account",
                subject_id,
                Duration::from_secs(60),
            )
            .await
            .unwrap();
        assert_eq!(count, 1);

        dao.clear_expired_attempts().await.unwrap();
    }
}
