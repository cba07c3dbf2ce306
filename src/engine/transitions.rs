use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::delivery::{Delivery, DeliveryStatus};
use crate::state::AppState;

/// Move a delivery exactly one step forward along
/// `Pending -> Assigned -> PickedUp -> InTransit -> Delivered`.
///
/// Only the assigned driver may advance; the write is conditioned on the
/// status still being the one the checks ran against, so two racing callers
/// cannot both commit the same edge.
pub fn advance_status(
    state: &AppState,
    delivery_id: Uuid,
    actor_id: Uuid,
) -> Result<Delivery, AppError> {
    let result = try_advance(state, delivery_id, actor_id);

    match &result {
        Ok(delivery) => {
            state
                .metrics
                .transitions_total
                .with_label_values(&["success"])
                .inc();
            info!(
                delivery_id = %delivery.id,
                status = ?delivery.status,
                actor_id = %actor_id,
                "delivery advanced"
            );
        }
        Err(err) => {
            state
                .metrics
                .transitions_total
                .with_label_values(&["rejected"])
                .inc();
            info!(delivery_id = %delivery_id, error = %err, "transition rejected");
        }
    }

    result
}

fn try_advance(state: &AppState, delivery_id: Uuid, actor_id: Uuid) -> Result<Delivery, AppError> {
    let (current, assigned_driver) = state
        .deliveries
        .get(&delivery_id)
        .map(|entry| (entry.status, entry.driver_id))
        .ok_or_else(|| AppError::NotFound(format!("delivery {delivery_id} not found")))?;

    let next = current.next().ok_or_else(|| AppError::IllegalTransition {
        current,
        detail: "delivery is in a terminal state".to_string(),
    })?;

    match assigned_driver {
        Some(id) if id == actor_id => {}
        Some(_) => {
            return Err(AppError::Forbidden(
                "only the assigned driver may advance this delivery".to_string(),
            ));
        }
        None => {
            return Err(AppError::IllegalTransition {
                current,
                detail: "pending deliveries are assigned by an operator".to_string(),
            });
        }
    }

    // At most one in-transit delivery per driver. The scan happens before
    // taking the entry lock (iterating the map while holding an entry
    // guard can deadlock on a shard), so the per-driver lock below is held
    // across scan AND commit: without it, two PickedUp deliveries of the
    // same driver could both pass the scan and both enter transit.
    let transit_lock = (next == DeliveryStatus::InTransit)
        .then(|| state.transit_locks.entry(actor_id).or_default().clone());
    let _transit_guard = transit_lock
        .as_ref()
        .map(|lock| lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner()));

    if next == DeliveryStatus::InTransit {
        let already_in_transit = state.deliveries.iter().any(|entry| {
            entry.id != delivery_id
                && entry.driver_id == Some(actor_id)
                && entry.status == DeliveryStatus::InTransit
        });
        if already_in_transit {
            return Err(AppError::Conflict(
                "driver already has a delivery in transit".to_string(),
            ));
        }
    }

    let mut entry = state
        .deliveries
        .get_mut(&delivery_id)
        .ok_or_else(|| AppError::NotFound(format!("delivery {delivery_id} not found")))?;

    // Conditional write: reject if another writer got here first.
    if entry.status != current {
        return Err(AppError::IllegalTransition {
            current: entry.status,
            detail: "status changed concurrently".to_string(),
        });
    }

    entry.status = next;
    entry.updated_at = Utc::now();
    let updated = entry.clone();
    drop(entry);

    state.publish_delivery(&updated);
    Ok(updated)
}

/// Operator cancel: legal from any non-terminal state. The sanctioned path
/// for "reassignment" is cancel plus a fresh delivery.
pub fn cancel_delivery(state: &AppState, delivery_id: Uuid) -> Result<Delivery, AppError> {
    let mut entry = state
        .deliveries
        .get_mut(&delivery_id)
        .ok_or_else(|| AppError::NotFound(format!("delivery {delivery_id} not found")))?;

    if entry.status.is_terminal() {
        state
            .metrics
            .transitions_total
            .with_label_values(&["rejected"])
            .inc();
        return Err(AppError::IllegalTransition {
            current: entry.status,
            detail: "terminal deliveries cannot be cancelled".to_string(),
        });
    }

    entry.status = DeliveryStatus::Cancelled;
    entry.updated_at = Utc::now();
    let updated = entry.clone();
    drop(entry);

    state
        .metrics
        .transitions_total
        .with_label_values(&["success"])
        .inc();
    info!(delivery_id = %updated.id, "delivery cancelled");

    state.publish_delivery(&updated);
    Ok(updated)
}
