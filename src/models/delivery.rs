use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::location::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Pending,
    Assigned,
    PickedUp,
    InTransit,
    Delivered,
    Cancelled,
}

impl DeliveryStatus {
    /// The single legal forward edge, if any. Terminal states have none.
    pub fn next(self) -> Option<DeliveryStatus> {
        match self {
            DeliveryStatus::Pending => Some(DeliveryStatus::Assigned),
            DeliveryStatus::Assigned => Some(DeliveryStatus::PickedUp),
            DeliveryStatus::PickedUp => Some(DeliveryStatus::InTransit),
            DeliveryStatus::InTransit => Some(DeliveryStatus::Delivered),
            DeliveryStatus::Delivered | DeliveryStatus::Cancelled => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Cancelled)
    }

    /// A delivery with a driver en route in some form; drives the operator
    /// map's marker set.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            DeliveryStatus::Assigned | DeliveryStatus::PickedUp | DeliveryStatus::InTransit
        )
    }
}

/// Customer fields are denormalized onto the delivery at creation time and
/// are never re-synced from the customer directory afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub customer_id: Uuid,
    pub name: String,
    pub address: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: Uuid,
    pub company_id: Uuid,
    pub customer: CustomerInfo,
    /// Fixed destination, set at creation, immutable.
    pub customer_location: GeoPoint,
    pub driver_id: Option<Uuid>,
    pub driver_name: Option<String>,
    pub fee: f64,
    pub notes: String,
    pub status: DeliveryStatus,
    /// Latest reported driver position while this delivery is in transit.
    pub driver_location: Option<GeoPoint>,
    pub last_location_update: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
