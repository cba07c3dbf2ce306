use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::location::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub phone: String,
    pub vehicle: String,
    pub status: DriverStatus,
    pub is_online: bool,
    /// True only while the location reporter task for this driver is live.
    pub is_tracking: bool,
    /// The driver's general position, independent of any delivery. A single
    /// latest-value slot: stop_tracking never clears it.
    pub location: Option<GeoPoint>,
    pub last_seen: Option<DateTime<Utc>>,
    /// Last positioning failure, shown to the driver until the next
    /// successful start_tracking.
    pub tracking_error: Option<String>,
}
