use diesel::{Insertable, Queryable};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::schema::verification_codes;

#[derive(Clone, Debug, Serialize, Deserialize, Identifiable, Queryable)]
#[diesel(table_name = verification_codes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct VerificationCode {
    pub id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub code: String,
    pub purpose: String,
    pub created_timestamp: SystemTime,
    pub expires_at: SystemTime,
    pub used_at: Option<SystemTime>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = verification_codes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewVerificationCode<'a> {
    pub id: Uuid,
    pub user_id: Uuid,
    pub email: &'a str,
    pub code: &'a str,
    pub purpose: &'a str,
    pub created_timestamp: SystemTime,
    pub expires_at: SystemTime,
}
