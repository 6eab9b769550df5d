use diesel::{ExpressionMethods, QueryDsl};
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::db::{DaoError, DbAsyncPool};
use crate::models::connected_platform::ConnectedPlatform;
use crate::schema::connected_platforms as connected_platform_fields;
use crate::schema::connected_platforms::dsl::connected_platforms;

pub struct Dao {
    db_async_pool: DbAsyncPool,
}

impl Dao {
    pub fn new(db_async_pool: &DbAsyncPool) -> Self {
        Self {
            db_async_pool: db_async_pool.clone(),
        }
    }

    pub async fn get_platforms_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<ConnectedPlatform>, DaoError> {
        let mut conn = self.db_async_pool.get().await?;
        let platforms = connected_platforms
            .filter(connected_platform_fields::user_id.eq(user_id))
            .order(connected_platform_fields::created_timestamp.asc())
            .load::<ConnectedPlatform>(&mut conn)
            .await?;

        Ok(platforms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils;
    use std::time::SystemTime;

    #[tokio::test]
    #[ignore]
    async fn get_platforms_for_user_returns_only_users_rows() {
        let dao = Dao::new(test_utils::db_async_pool());
        let user_id = test_utils::insert_user(None, "google").await;
        let other_user_id = test_utils::insert_user(None, "google").await;

        {
            let mut conn = test_utils::db_async_conn().await;
            let rows = [
                (user_id, "stripe"),
                (user_id, "tiktok"),
                (other_user_id, "youtube"),
            ];

            for (owner, platform) in rows {
                diesel::insert_into(connected_platforms)
                    .values((
                        connected_platform_fields::id.eq(Uuid::now_v7()),
                        connected_platform_fields::user_id.eq(owner),
                        connected_platform_fields::platform.eq(platform),
                        connected_platform_fields::oauth_token.eq(Some("token")),
                        connected_platform_fields::refresh_token.eq(None::<String>),
                        connected_platform_fields::created_timestamp.eq(SystemTime::now()),
                    ))
                    .execute(&mut conn)
                    .await
                    .unwrap();
            }
        }

        let platforms = dao.get_platforms_for_user(user_id).await.unwrap();
        let names: Vec<&str> = platforms.iter().map(|p| p.platform.as_str()).collect();
        assert_eq!(names, vec!["stripe", "tiktok"]);

        {
            let mut conn = test_utils::db_async_conn().await;
            diesel::delete(
                connected_platforms
                    .filter(connected_platform_fields::user_id.eq_any([user_id, other_user_id])),
            )
            .execute(&mut conn)
            .await
            .unwrap();
        }

        test_utils::delete_user(user_id).await;
        test_utils::delete_user(other_user_id).await;
    }
}
