use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::delivery::Delivery;
use crate::models::driver::Driver;
use crate::observability::metrics::Metrics;
use crate::tracker::{ReporterSettings, TrackerHandle};

pub struct AppState {
    pub deliveries: DashMap<Uuid, Delivery>,
    pub drivers: DashMap<Uuid, Driver>,
    /// Live location-reporter sessions, one per tracking driver.
    pub trackers: DashMap<Uuid, TrackerHandle>,
    /// Serializes InTransit-entering transitions per driver: the
    /// one-in-transit invariant needs its scan and commit to be one
    /// critical section.
    pub transit_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    /// Change stream: every committed delivery write is published here and
    /// fanned out to scoped subscribers.
    pub delivery_events_tx: broadcast::Sender<Delivery>,
    pub reporter: ReporterSettings,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(event_buffer_size: usize, reporter: ReporterSettings) -> Self {
        let (delivery_events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            deliveries: DashMap::new(),
            drivers: DashMap::new(),
            trackers: DashMap::new(),
            transit_locks: DashMap::new(),
            delivery_events_tx,
            reporter,
            metrics: Metrics::new(),
        }
    }

    /// Notify subscribers of a committed delivery write. A send error only
    /// means nobody is listening right now.
    pub fn publish_delivery(&self, delivery: &Delivery) {
        let _ = self.delivery_events_tx.send(delivery.clone());
    }
}
