use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// One position fix from the device. Ephemeral: each sample overwrites the
/// previous one on the driver record (and the in-transit delivery, if any);
/// no history is kept.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LocationSample {
    pub position: GeoPoint,
    pub recorded_at: DateTime<Utc>,
}

impl LocationSample {
    pub fn now(lat: f64, lng: f64) -> Self {
        Self {
            position: GeoPoint { lat, lng },
            recorded_at: Utc::now(),
        }
    }
}
