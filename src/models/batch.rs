use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::capacity::Capacity;
use crate::models::courier::GeoPoint;
use crate::models::item::AssignmentStatus;
use crate::models::verification::{BusinessPickupCode, VerificationCode};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum BatchStatus {
    Suggested,
    Requested,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl BatchStatus {
    /// Statuses in which a batch must hold an assigned courier.
    pub fn holds_courier(self) -> bool {
        matches!(
            self,
            BatchStatus::Requested | BatchStatus::Assigned | BatchStatus::InProgress
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub items: Vec<Uuid>,
    pub required_capacity: Capacity,
    pub center_point: GeoPoint,
    pub status: BatchStatus,
    pub assignment_status: Option<AssignmentStatus>,
    pub assigned_courier: Option<Uuid>,
    pub assignment_requested_at: Option<DateTime<Utc>>,
    pub pickup_codes: Vec<BusinessPickupCode>,
    pub delivery_code: Option<VerificationCode>,
    pub created_at: DateTime<Utc>,
}

impl Batch {
    pub fn new(
        campaign_id: Uuid,
        items: Vec<Uuid>,
        required_capacity: Capacity,
        center_point: GeoPoint,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            campaign_id,
            items,
            required_capacity,
            center_point,
            status: BatchStatus::Suggested,
            assignment_status: Some(AssignmentStatus::Pending),
            assigned_courier: None,
            assignment_requested_at: None,
            pickup_codes: Vec::new(),
            delivery_code: None,
            created_at: now,
        }
    }

    pub fn is_assigned_to(&self, courier_id: Uuid) -> bool {
        self.assigned_courier == Some(courier_id)
    }

    pub fn awaiting_response(&self) -> bool {
        self.status == BatchStatus::Requested
            && self.assignment_status == Some(AssignmentStatus::Pending)
    }

    pub fn pickup_code_for(&self, business_id: Uuid) -> Option<&BusinessPickupCode> {
        self.pickup_codes
            .iter()
            .find(|entry| entry.business_id == business_id)
    }

    pub fn pickup_code_for_mut(&mut self, business_id: Uuid) -> Option<&mut BusinessPickupCode> {
        self.pickup_codes
            .iter_mut()
            .find(|entry| entry.business_id == business_id)
    }
}
