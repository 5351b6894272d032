use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::capacity::Capacity;
use crate::models::courier::GeoPoint;

/// A party with a place on the map: the business an item or order is picked
/// up from, or a campaign's organizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    pub location: Option<GeoPoint>,
}

impl Site {
    pub fn valid_location(&self) -> Option<GeoPoint> {
        self.location.filter(GeoPoint::is_valid)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ItemStatus {
    Pending,
    Requested,
    Assigned,
    PickedUp,
    Delivered,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    Pending,
    Accepted,
    Declined,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub name: String,
    pub business: Site,
    pub size: Capacity,
    pub status: ItemStatus,
    pub assignment_status: Option<AssignmentStatus>,
    pub assigned_courier: Option<Uuid>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Item {
    pub fn location(&self) -> Option<GeoPoint> {
        self.business.valid_location()
    }

    pub fn is_unassigned(&self) -> bool {
        self.status == ItemStatus::Pending && self.assigned_courier.is_none()
    }
}
