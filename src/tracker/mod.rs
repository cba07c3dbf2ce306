use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::delivery::DeliveryStatus;
use crate::models::location::LocationSample;
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("no position fix within the acquisition timeout")]
    Timeout,

    #[error("positioning unavailable: {0}")]
    Unavailable(String),
}

pub type FixResult = Result<LocationSample, PositionError>;

#[derive(Debug, Clone)]
pub struct ReporterSettings {
    /// Fixes arriving closer together than this are dropped.
    pub min_fix_interval: Duration,
    /// Tracking stops with a positioning error if no fix arrives in time.
    pub fix_timeout: Duration,
    pub fix_channel_size: usize,
}

impl Default for ReporterSettings {
    fn default() -> Self {
        Self {
            min_fix_interval: Duration::ZERO,
            fix_timeout: Duration::from_secs(30),
            fix_channel_size: 16,
        }
    }
}

/// One live tracking session. The device pushes fixes (or its error
/// callback) into `fix_tx`; dropping the handle closes the channel and
/// winds the reporter task down.
pub struct TrackerHandle {
    pub fix_tx: mpsc::Sender<FixResult>,
    session: Uuid,
}

/// Begin a tracking session for a driver. Rejects unknown drivers and
/// double starts; a session that ended in a positioning error must be
/// restarted explicitly through here.
pub fn start_tracking(state: &Arc<AppState>, driver_id: Uuid) -> Result<(), AppError> {
    if !state.drivers.contains_key(&driver_id) {
        return Err(AppError::NotFound(format!("driver {driver_id} not found")));
    }

    let (fix_tx, fix_rx) = mpsc::channel(state.reporter.fix_channel_size);
    let session = Uuid::new_v4();

    match state.trackers.entry(driver_id) {
        Entry::Occupied(_) => {
            return Err(AppError::Conflict("driver is already tracking".to_string()));
        }
        Entry::Vacant(slot) => {
            slot.insert(TrackerHandle { fix_tx, session });
        }
    }

    if let Some(mut driver) = state.drivers.get_mut(&driver_id) {
        driver.is_tracking = true;
        driver.tracking_error = None;
    }

    tokio::spawn(run_reporter(state.clone(), driver_id, fix_rx, session));
    info!(driver_id = %driver_id, "tracking started");
    Ok(())
}

/// End the session. Clears the tracking flag but leaves the last known
/// position in place; it stays authoritative until overwritten.
pub fn stop_tracking(state: &AppState, driver_id: Uuid) -> Result<(), AppError> {
    let removed = state.trackers.remove(&driver_id);
    if removed.is_none() {
        return Err(AppError::Conflict("driver is not tracking".to_string()));
    }

    if let Some(mut driver) = state.drivers.get_mut(&driver_id) {
        driver.is_tracking = false;
    }

    info!(driver_id = %driver_id, "tracking stopped");
    Ok(())
}

/// Forward one device fix into the driver's reporter.
pub async fn report_fix(
    state: &AppState,
    driver_id: Uuid,
    sample: LocationSample,
) -> Result<(), AppError> {
    send_to_reporter(state, driver_id, Ok(sample)).await
}

/// Forward the positioning subsystem's error callback; the reporter stops
/// on receipt.
pub async fn report_position_error(
    state: &AppState,
    driver_id: Uuid,
    error: PositionError,
) -> Result<(), AppError> {
    send_to_reporter(state, driver_id, Err(error)).await
}

async fn send_to_reporter(
    state: &AppState,
    driver_id: Uuid,
    event: FixResult,
) -> Result<(), AppError> {
    let fix_tx = state
        .trackers
        .get(&driver_id)
        .map(|handle| handle.fix_tx.clone())
        .ok_or_else(|| AppError::Conflict("driver is not tracking".to_string()))?;

    fix_tx
        .send(event)
        .await
        .map_err(|_| AppError::Conflict("tracking session already closed".to_string()))
}

async fn run_reporter(
    state: Arc<AppState>,
    driver_id: Uuid,
    mut fix_rx: mpsc::Receiver<FixResult>,
    session: Uuid,
) {
    info!(driver_id = %driver_id, "location reporter started");

    let min_interval = state.reporter.min_fix_interval;
    let fix_timeout = state.reporter.fix_timeout;
    let mut last_accepted: Option<Instant> = None;

    loop {
        match timeout(fix_timeout, fix_rx.recv()).await {
            Err(_elapsed) => {
                state
                    .metrics
                    .location_fixes_total
                    .with_label_values(&["error"])
                    .inc();
                stop_with_error(&state, driver_id, session, PositionError::Timeout);
                break;
            }
            // stop_tracking closed the channel and already cleaned up.
            Ok(None) => break,
            Ok(Some(Err(err))) => {
                state
                    .metrics
                    .location_fixes_total
                    .with_label_values(&["error"])
                    .inc();
                stop_with_error(&state, driver_id, session, err);
                break;
            }
            Ok(Some(Ok(sample))) => {
                if last_accepted.is_some_and(|at| at.elapsed() < min_interval) {
                    state
                        .metrics
                        .location_fixes_total
                        .with_label_values(&["throttled"])
                        .inc();
                    continue;
                }
                last_accepted = Some(Instant::now());
                state
                    .metrics
                    .location_fixes_total
                    .with_label_values(&["accepted"])
                    .inc();
                publish_sample(&state, driver_id, sample);
            }
        }
    }

    info!(driver_id = %driver_id, "location reporter exited");
}

/// Write one accepted sample to the driver record and, when the driver has
/// exactly one in-transit delivery, mirror it there too. Failures are
/// logged and swallowed; the sampling loop never stops over a bad publish.
fn publish_sample(state: &AppState, driver_id: Uuid, sample: LocationSample) {
    match state.drivers.get_mut(&driver_id) {
        Some(mut driver) => {
            driver.location = Some(sample.position);
            driver.last_seen = Some(sample.recorded_at);
        }
        None => {
            warn!(driver_id = %driver_id, "dropping fix for unknown driver");
            return;
        }
    }

    // Collected before the entry lock below; see transitions.rs on shard
    // deadlocks.
    let in_transit: Vec<Uuid> = state
        .deliveries
        .iter()
        .filter(|entry| {
            entry.driver_id == Some(driver_id) && entry.status == DeliveryStatus::InTransit
        })
        .map(|entry| entry.id)
        .collect();

    let delivery_id = match in_transit.as_slice() {
        [] => return,
        [only] => *only,
        more => {
            // Unreachable while the guard enforces the one-in-transit
            // invariant; log instead of guessing a target.
            warn!(
                driver_id = %driver_id,
                count = more.len(),
                "multiple in-transit deliveries; fix not mirrored"
            );
            return;
        }
    };

    mirror_fix_to_delivery(state, delivery_id, sample);
}

/// Stamp a fix onto a scanned delivery, but only if it is still in transit
/// at lock time; the driver may have delivered (or an operator cancelled)
/// in the window since the scan, and terminal deliveries take no writes.
/// Returns whether the write happened.
fn mirror_fix_to_delivery(state: &AppState, delivery_id: Uuid, sample: LocationSample) -> bool {
    let Some(mut entry) = state.deliveries.get_mut(&delivery_id) else {
        warn!(delivery_id = %delivery_id, "in-transit delivery vanished before publish");
        return false;
    };
    if entry.status != DeliveryStatus::InTransit {
        warn!(
            delivery_id = %delivery_id,
            status = ?entry.status,
            "delivery left transit before publish; fix not mirrored"
        );
        return false;
    }

    entry.driver_location = Some(sample.position);
    entry.last_location_update = Some(sample.recorded_at);
    let updated = entry.clone();
    drop(entry);

    state.publish_delivery(&updated);
    true
}

fn stop_with_error(state: &AppState, driver_id: Uuid, session: Uuid, err: PositionError) {
    // Only tear down our own session; the driver may already have restarted.
    let owned = state
        .trackers
        .remove_if(&driver_id, |_, handle| handle.session == session)
        .is_some();
    if !owned {
        return;
    }

    warn!(driver_id = %driver_id, error = %err, "tracking stopped on positioning error");

    if let Some(mut driver) = state.drivers.get_mut(&driver_id) {
        driver.is_tracking = false;
        driver.tracking_error = Some(err.to_string());
    }
}
