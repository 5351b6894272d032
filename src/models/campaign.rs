use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::item::Site;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    pub organizer: Site,
    pub volunteers: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}
