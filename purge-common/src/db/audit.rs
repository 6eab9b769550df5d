use diesel::dsl;
use diesel_async::RunQueryDsl;
use std::time::SystemTime;
use uuid::Uuid;

use crate::db::{DaoError, DbAsyncPool};
use crate::models::audit_log_entry::NewAuditLogEntry;
use crate::schema::audit_log::dsl::audit_log;

pub struct Dao {
    db_async_pool: DbAsyncPool,
}

impl Dao {
    pub fn new(db_async_pool: &DbAsyncPool) -> Self {
        Self {
            db_async_pool: db_async_pool.clone(),
        }
    }

    pub async fn insert_entry(
        &self,
        user_id: Option<Uuid>,
        action: &str,
        status: &str,
        details: &serde_json::Value,
    ) -> Result<Uuid, DaoError> {
        let entry = NewAuditLogEntry {
            id: Uuid::now_v7(),
            user_id,
            action,
            status,
            details_json: details,
            created_timestamp: SystemTime::now(),
        };

        let mut conn = self.db_async_pool.get().await?;
        dsl::insert_into(audit_log)
            .values(&entry)
            .execute(&mut conn)
            .await?;

        Ok(entry.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils;
    use crate::models::audit_log_entry::AuditLogEntry;

    use diesel::QueryDsl;
    use serde_json::json;

    #[tokio::test]
    #[ignore]
    async fn insert_entry_persists_details() {
        let dao = Dao::new(test_utils::db_async_pool());
        let details = json!({ "ip": "203.0.113.9", "userAgent": "curl/8.0" });

        let id = dao
            .insert_entry(None, "ACCOUNT_DELETED", "success", &details)
            .await
            .unwrap();

        let mut conn = test_utils::db_async_conn().await;
        let entry = audit_log
            .find(id)
            .first::<AuditLogEntry>(&mut conn)
            .await
            .unwrap();

        assert!(entry.user_id.is_none());
        assert_eq!(entry.action, "ACCOUNT_DELETED");
        assert_eq!(entry.details_json, details);

        diesel::delete(audit_log.find(id))
            .execute(&mut conn)
            .await
            .unwrap();
    }
}
