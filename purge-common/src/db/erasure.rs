use diesel::{sql_types, QueryDsl};
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::db::{DaoError, DbAsyncPool};
use crate::schema::profiles::dsl::profiles;

pub struct Dao {
    db_async_pool: DbAsyncPool,
}

impl Dao {
    pub fn new(db_async_pool: &DbAsyncPool) -> Self {
        Self {
            db_async_pool: db_async_pool.clone(),
        }
    }

    pub async fn delete_user_rows(&self, table: &str, user_id: Uuid) -> Result<usize, DaoError> {
        check_identifier(table)?;

        let mut conn = self.db_async_pool.get().await?;
        let deleted_count = diesel::sql_query(format!("DELETE FROM {table} WHERE user_id = $1"))
            .bind::<sql_types::Uuid, _>(user_id)
            .execute(&mut conn)
            .await?;

        Ok(deleted_count)
    }

    /// Detaches the user's rows from the user and overwrites `sensitive_column` with `marker`.
    pub async fn anonymize_user_rows(
        &self,
        table: &str,
        sensitive_column: &str,
        marker: &serde_json::Value,
        user_id: Uuid,
    ) -> Result<usize, DaoError> {
        check_identifier(table)?;
        check_identifier(sensitive_column)?;

        let mut conn = self.db_async_pool.get().await?;
        let updated_count = diesel::sql_query(format!(
            "UPDATE {table} SET user_id = NULL, {sensitive_column} = $1 WHERE user_id = $2"
        ))
        .bind::<sql_types::Jsonb, _>(marker)
        .bind::<sql_types::Uuid, _>(user_id)
        .execute(&mut conn)
        .await?;

        Ok(updated_count)
    }

    pub async fn delete_profile(&self, user_id: Uuid) -> Result<usize, DaoError> {
        let mut conn = self.db_async_pool.get().await?;
        let deleted_count = diesel::delete(profiles.find(user_id))
            .execute(&mut conn)
            .await?;

        Ok(deleted_count)
    }
}

// Table and column names are spliced into SQL, so only plain lowercase identifiers are allowed
fn check_identifier(identifier: &str) -> Result<(), DaoError> {
    let is_valid = !identifier.is_empty()
        && identifier.len() <= 63
        && identifier
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
        && !identifier.as_bytes()[0].is_ascii_digit();

    if is_valid {
        Ok(())
    } else {
        Err(DaoError::CannotRunQuery("Invalid identifier"))
    }
}
