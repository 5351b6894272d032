use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::capacity::Capacity;
use crate::models::courier::GeoPoint;
use crate::models::item::Site;
use crate::models::verification::VerificationCode;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    WaitingForDriver,
    DriverAssigned,
    PickupReady,
    PickedUp,
    Delivering,
    Delivered,
}

impl DeliveryStatus {
    /// A driver is attached to the order and has not finished it yet.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            DeliveryStatus::DriverAssigned
                | DeliveryStatus::PickupReady
                | DeliveryStatus::PickedUp
                | DeliveryStatus::Delivering
        )
    }

    /// The pickup business is still a stop on the driver's route.
    pub fn awaits_pickup(self) -> bool {
        matches!(
            self,
            DeliveryStatus::DriverAssigned | DeliveryStatus::PickupReady
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Fulfilled,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderEvent {
    WaitingForDriver,
    DriverAssigned,
    PickupReady,
    PickedUp,
    Delivering,
    Delivered,
    DriverRejected,
    DriverTimeout,
}

impl From<DeliveryStatus> for OrderEvent {
    fn from(status: DeliveryStatus) -> Self {
        match status {
            DeliveryStatus::WaitingForDriver => OrderEvent::WaitingForDriver,
            DeliveryStatus::DriverAssigned => OrderEvent::DriverAssigned,
            DeliveryStatus::PickupReady => OrderEvent::PickupReady,
            DeliveryStatus::PickedUp => OrderEvent::PickedUp,
            DeliveryStatus::Delivering => OrderEvent::Delivering,
            DeliveryStatus::Delivered => OrderEvent::Delivered,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    System,
    Courier(Uuid),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: OrderEvent,
    pub updated_by: Actor,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAddress {
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    pub location: Option<GeoPoint>,
}

impl DeliveryAddress {
    pub fn valid_location(&self) -> Option<GeoPoint> {
        self.location.filter(GeoPoint::is_valid)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub sale_item_id: Uuid,
    pub business: Site,
    pub quantity: u32,
    #[serde(default)]
    pub required_capacity: Capacity,
    pub delivery_address: DeliveryAddress,
    pub assigned_courier: Option<Uuid>,
    pub delivery_status: DeliveryStatus,
    pub payment_status: PaymentStatus,
    pub status_history: Vec<StatusChange>,
    pub pickup_code: Option<VerificationCode>,
    pub delivery_code: Option<VerificationCode>,
    pub declined_by: Vec<Uuid>,
    pub assignment_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn record(&mut self, status: impl Into<OrderEvent>, updated_by: Actor, at: DateTime<Utc>) {
        self.status_history.push(StatusChange {
            status: status.into(),
            updated_by,
            timestamp: at,
        });
    }

    /// Moves the delivery status forward and appends it to the history.
    pub fn advance(&mut self, status: DeliveryStatus, updated_by: Actor, at: DateTime<Utc>) {
        self.delivery_status = status;
        self.record(status, updated_by, at);
    }

    pub fn is_assigned_to(&self, courier_id: Uuid) -> bool {
        self.assigned_courier == Some(courier_id)
    }

    pub fn has_declined(&self, courier_id: Uuid) -> bool {
        self.declined_by.contains(&courier_id)
    }

    pub fn add_declined(&mut self, courier_id: Uuid) {
        if !self.has_declined(courier_id) {
            self.declined_by.push(courier_id);
        }
    }
}
