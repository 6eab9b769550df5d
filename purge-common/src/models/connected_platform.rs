use diesel::{Queryable, Selectable};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::schema::connected_platforms;

#[derive(Clone, Debug, Serialize, Deserialize, Identifiable, Queryable, Selectable)]
#[diesel(table_name = connected_platforms)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ConnectedPlatform {
    pub id: Uuid,
    pub user_id: Uuid,
    pub platform: String,
    #[serde(skip_serializing)]
    pub oauth_token: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub created_timestamp: SystemTime,
}
