use diesel::{
    dsl, BoolExpressionMethods, ExpressionMethods, NullableExpressionMethods, OptionalExtension,
    QueryDsl,
};
use diesel_async::RunQueryDsl;
use std::time::SystemTime;
use uuid::Uuid;

use crate::db::{DaoError, DbAsyncPool};
use crate::models::user::User;
use crate::models::verification_code::NewVerificationCode;

use crate::schema::user_sessions as user_session_fields;
use crate::schema::user_sessions::dsl::user_sessions;
use crate::schema::users::dsl::users;
use crate::schema::verification_codes as verification_code_fields;
use crate::schema::verification_codes::dsl::verification_codes;

pub struct Dao {
    db_async_pool: DbAsyncPool,
}

impl Dao {
    pub fn new(db_async_pool: &DbAsyncPool) -> Self {
        Self {
            db_async_pool: db_async_pool.clone(),
        }
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<User, DaoError> {
        let mut conn = self.db_async_pool.get().await?;
        let user = users.find(user_id).first::<User>(&mut conn).await?;
        Ok(user)
    }

    pub async fn revoke_all_sessions(&self, user_id: Uuid) -> Result<usize, DaoError> {
        let mut conn = self.db_async_pool.get().await?;
        let revoked_count =
            diesel::delete(user_sessions.filter(user_session_fields::user_id.eq(user_id)))
                .execute(&mut conn)
                .await?;

        Ok(revoked_count)
    }

    pub async fn delete_auth_user(&self, user_id: Uuid) -> Result<(), DaoError> {
        let mut db_connection = self.db_async_pool.get().await?;

        db_connection
            .build_transaction()
            .run::<_, diesel::result::Error, _>(|conn| {
                Box::pin(async move {
                    diesel::delete(
                        user_sessions.filter(user_session_fields::user_id.eq(user_id)),
                    )
                    .execute(conn)
                    .await?;

                    let deleted_count = diesel::delete(users.find(user_id)).execute(conn).await?;
                    if deleted_count == 0 {
                        return Err(diesel::result::Error::NotFound);
                    }

                    Ok(())
                })
            })
            .await?;

        Ok(())
    }

    pub async fn save_verification_code(
        &self,
        user_id: Uuid,
        email: &str,
        code: &str,
        purpose: &str,
        expiration: SystemTime,
    ) -> Result<Uuid, DaoError> {
        let new_code = NewVerificationCode {
            id: Uuid::now_v7(),
            user_id,
            email,
            code,
            purpose,
            created_timestamp: SystemTime::now(),
            expires_at: expiration,
        };

        let mut conn = self.db_async_pool.get().await?;
        dsl::insert_into(verification_codes)
            .values(&new_code)
            .execute(&mut conn)
            .await?;

        Ok(new_code.id)
    }

    /// Marks the code used only if it matches the most recently issued code for the purpose
    /// that is still unused and unexpired. Returns `false` when nothing was consumed.
    pub async fn consume_verification_code(
        &self,
        user_id: Uuid,
        purpose: &str,
        code: &str,
    ) -> Result<bool, DaoError> {
        let now = SystemTime::now();

        let most_recent_code_id = verification_codes
            .select(verification_code_fields::id)
            .filter(verification_code_fields::user_id.eq(user_id))
            .filter(verification_code_fields::purpose.eq(purpose))
            .filter(verification_code_fields::used_at.is_null())
            .filter(verification_code_fields::expires_at.gt(now))
            .order(verification_code_fields::created_timestamp.desc())
            .limit(1)
            .single_value();

        let mut conn = self.db_async_pool.get().await?;
        let consumed_id = diesel::update(
            verification_codes
                .filter(verification_code_fields::id.nullable().eq(most_recent_code_id))
                .filter(verification_code_fields::code.eq(code))
                .filter(verification_code_fields::used_at.is_null()),
        )
        .set(verification_code_fields::used_at.eq(now))
        .returning(verification_code_fields::id)
        .get_result::<Uuid>(&mut conn)
        .await
        .optional()?;

        Ok(consumed_id.is_some())
    }

    pub async fn delete_all_expired_verification_codes(&self) -> Result<usize, DaoError> {
        let mut conn = self.db_async_pool.get().await?;
        let deleted_count = diesel::delete(
            verification_codes.filter(
                verification_code_fields::expires_at
                    .lt(SystemTime::now())
                    .or(verification_code_fields::used_at.is_not_null()),
            ),
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
    use std::time::Duration;

    const PURPOSE: &str = "delete_account";

    fn dao() -> Dao {
        Dao::new(test_utils::db_async_pool())
    }

    #[tokio::test]
    #[ignore]
    async fn consume_verification_code_is_single_use() {
        let dao = dao();
        let user_id = test_utils::insert_user(None, "email").await;
        let expiration = SystemTime::now() + Duration::from_secs(600);

        dao.save_verification_code(user_id, "a@purge.test", "123456", PURPOSE, expiration)
            .await
            .unwrap();

        assert!(!dao
            .consume_verification_code(user_id, PURPOSE, "654321")
            .await
            .unwrap());
        assert!(dao
            .consume_verification_code(user_id, PURPOSE, "123456")
            .await
            .unwrap());
        assert!(!dao
            .consume_verification_code(user_id, PURPOSE, "123456")
            .await
            .unwrap());

        dao.delete_all_expired_verification_codes().await.unwrap();
        test_utils::delete_user(user_id).await;
    }

    #[tokio::test]
    #[ignore]
    async fn consume_verification_code_only_accepts_most_recent() {
        let dao = dao();
        let user_id = test_utils::insert_user(None, "email").await;
        let expiration = SystemTime::now() + Duration::from_secs(600);

        dao.save_verification_code(user_id, "a@purge.test", "111111", PURPOSE, expiration)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        dao.save_verification_code(user_id, "a@purge.test", "222222", PURPOSE, expiration)
            .await
            .unwrap();

        assert!(!dao
            .consume_verification_code(user_id, PURPOSE, "111111")
            .await
            .unwrap());
        assert!(!dao
            .consume_verification_code(user_id, "password_change", "222222")
            .await
            .unwrap());
        assert!(dao
            .consume_verification_code(user_id, PURPOSE, "222222")
            .await
            .unwrap());

        dao.delete_all_expired_verification_codes().await.unwrap();
        test_utils::delete_user(user_id).await;
    }

    #[tokio::test]
    #[ignore]
    async fn expired_code_is_rejected_and_cleared() {
        let dao = dao();
        let user_id = test_utils::insert_user(None, "email").await;
        let expiration = SystemTime::now() - Duration::from_secs(1);

        dao.save_verification_code(user_id, "a@purge.test", "333333", PURPOSE, expiration)
            .await
            .unwrap();

        assert!(!dao
            .consume_verification_code(user_id, PURPOSE, "333333")
            .await
            .unwrap());
        assert!(dao.delete_all_expired_verification_codes().await.unwrap() >= 1);

        test_utils::delete_user(user_id).await;
    }

    #[tokio::test]
    #[ignore]
    async fn delete_auth_user_removes_user() {
        let dao = dao();
        let user_id = test_utils::insert_user(Some("hash"), "email").await;

        let user = dao.get_user(user_id).await.unwrap();
        assert_eq!(user.auth_provider, "email");

        {
            let mut conn = test_utils::db_async_conn().await;
            diesel::delete(crate::schema::profiles::dsl::profiles.find(user_id))
                .execute(&mut conn)
                .await
                .unwrap();
        }

        dao.delete_auth_user(user_id).await.unwrap();
        assert!(matches!(
            dao.get_user(user_id).await,
            Err(DaoError::QueryFailure(diesel::result::Error::NotFound))
        ));
    }
}
