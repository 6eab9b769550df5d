use diesel::{Insertable, Queryable, Selectable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;
use uuid::Uuid;

use crate::schema::deletion_requests;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletionStatus {
    Processing,
    Deleted,
    Failed,
}

impl DeletionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionStatus::Processing => "processing",
            DeletionStatus::Deleted => "deleted",
            DeletionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for DeletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeletionStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(DeletionStatus::Processing),
            "deleted" => Ok(DeletionStatus::Deleted),
            "failed" => Ok(DeletionStatus::Failed),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Identifiable, Queryable, Selectable)]
#[diesel(table_name = deletion_requests, primary_key(user_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DeletionRequest {
    pub user_id: Uuid,
    pub status: String,
    pub requested_at: SystemTime,
    pub completed_at: Option<SystemTime>,
    pub last_error: Option<String>,
    pub steps_completed: Vec<String>,
}

impl DeletionRequest {
    /// Rows with a status this build doesn't recognize are treated as failed so they can be
    /// retried rather than blocking the user forever.
    pub fn status(&self) -> DeletionStatus {
        self.status.parse().unwrap_or(DeletionStatus::Failed)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = deletion_requests, primary_key(user_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewDeletionRequest<'a> {
    pub user_id: Uuid,
    pub status: &'a str,
    pub requested_at: SystemTime,
    pub completed_at: Option<SystemTime>,
    pub last_error: Option<&'a str>,
    pub steps_completed: Vec<String>,
}
