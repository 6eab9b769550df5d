use diesel::{Insertable, Queryable};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::schema::throttleable_attempts;

#[derive(Clone, Debug, Serialize, Deserialize, Identifiable, Queryable)]
#[diesel(table_name = throttleable_attempts, primary_key(operation, subject_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ThrottleableAttempt {
    pub operation: String,
    pub subject_id: Uuid,
    pub attempt_count: i32,
    pub expiration_timestamp: SystemTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = throttleable_attempts, primary_key(operation, subject_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewThrottleableAttempt<'a> {
    pub operation: &'a str,
    pub subject_id: Uuid,
    pub attempt_count: i32,
    pub expiration_timestamp: SystemTime,
}
