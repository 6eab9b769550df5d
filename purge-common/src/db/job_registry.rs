use diesel::{dsl, ExpressionMethods, OptionalExtension, QueryDsl};
use diesel_async::RunQueryDsl;
use std::time::SystemTime;

use crate::db::{DaoError, DbAsyncPool};
use crate::models::job_registry_item::NewJobRegistryItem;
use crate::schema::job_registry as job_registry_fields;
use crate::schema::job_registry::dsl::job_registry;

pub struct Dao {
    db_async_pool: DbAsyncPool,
}

impl Dao {
    pub fn new(db_async_pool: &DbAsyncPool) -> Self {
        Self {
            db_async_pool: db_async_pool.clone(),
        }
    }

    pub async fn get_job_last_run_timestamp(
        &self,
        name: &str,
    ) -> Result<Option<SystemTime>, DaoError> {
        let mut conn = self.db_async_pool.get().await?;
        let timestamp = job_registry
            .select(job_registry_fields::last_run_timestamp)
            .find(name)
            .get_result(&mut conn)
            .await
            .optional()?;

        Ok(timestamp)
    }

    pub async fn set_job_last_run_timestamp(
        &self,
        job_name: &str,
        timestamp: SystemTime,
    ) -> Result<(), DaoError> {
        let registry_item = NewJobRegistryItem {
            job_name,
            last_run_timestamp: timestamp,
        };

        let mut conn = self.db_async_pool.get().await?;
        dsl::insert_into(job_registry)
            .values(&registry_item)
            .on_conflict(job_registry_fields::job_name)
            .do_update()
            .set(job_registry_fields::last_run_timestamp.eq(timestamp))
            .execute(&mut conn)
            .await?;

        Ok(())
    }
}
