use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::delivery::{Delivery, DeliveryStatus};
use crate::models::driver::DriverStatus;
use crate::state::AppState;

/// Operator-triggered assignment of a pending delivery to a driver.
///
/// The driver must be active AND online; the online check lives here in the
/// engine, not in whatever candidate list the console happens to render.
/// Exactly one store write, conditioned on the delivery still being pending.
pub fn assign_delivery(
    state: &AppState,
    delivery_id: Uuid,
    driver_id: Uuid,
) -> Result<Delivery, AppError> {
    let result = try_assign(state, delivery_id, driver_id);

    let outcome = if result.is_ok() { "success" } else { "rejected" };
    state
        .metrics
        .assignments_total
        .with_label_values(&[outcome])
        .inc();

    if let Ok(delivery) = &result {
        info!(
            delivery_id = %delivery.id,
            driver_id = %driver_id,
            "delivery assigned"
        );
    }

    result
}

fn try_assign(state: &AppState, delivery_id: Uuid, driver_id: Uuid) -> Result<Delivery, AppError> {
    let driver_name = {
        let driver = state
            .drivers
            .get(&driver_id)
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

        if driver.status != DriverStatus::Active {
            return Err(AppError::Validation("driver is not active".to_string()));
        }
        if !driver.is_online {
            return Err(AppError::Validation("driver is not online".to_string()));
        }

        driver.name.clone()
    };

    let mut entry = state
        .deliveries
        .get_mut(&delivery_id)
        .ok_or_else(|| AppError::NotFound(format!("delivery {delivery_id} not found")))?;

    if entry.status != DeliveryStatus::Pending {
        return Err(AppError::IllegalTransition {
            current: entry.status,
            detail: "only pending deliveries can be assigned".to_string(),
        });
    }

    entry.status = DeliveryStatus::Assigned;
    entry.driver_id = Some(driver_id);
    entry.driver_name = Some(driver_name);
    entry.updated_at = Utc::now();
    let updated = entry.clone();
    drop(entry);

    state.publish_delivery(&updated);
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::assign_delivery;
    use crate::error::AppError;
    use crate::models::delivery::{CustomerInfo, Delivery, DeliveryStatus};
    use crate::models::driver::{Driver, DriverStatus};
    use crate::models::location::GeoPoint;
    use crate::state::AppState;
    use crate::tracker::ReporterSettings;

    fn state() -> AppState {
        AppState::new(64, ReporterSettings::default())
    }

    fn seed_driver(state: &AppState, status: DriverStatus, is_online: bool) -> Uuid {
        let id = Uuid::new_v4();
        state.drivers.insert(
            id,
            Driver {
                id,
                company_id: Uuid::from_u128(1),
                name: "Rolf".to_string(),
                phone: "+49 40 555".to_string(),
                vehicle: "cargo bike".to_string(),
                status,
                is_online,
                is_tracking: false,
                location: None,
                last_seen: None,
                tracking_error: None,
            },
        );
        id
    }

    fn seed_pending(state: &AppState) -> Uuid {
        let id = Uuid::new_v4();
        state.deliveries.insert(
            id,
            Delivery {
                id,
                company_id: Uuid::from_u128(1),
                customer: CustomerInfo {
                    customer_id: Uuid::from_u128(2),
                    name: "Ada Kunde".to_string(),
                    address: "Beispielstr. 1".to_string(),
                    phone: "+49 40 123456".to_string(),
                },
                customer_location: GeoPoint {
                    lat: 53.55,
                    lng: 9.99,
                },
                driver_id: None,
                driver_name: None,
                fee: 4.5,
                notes: String::new(),
                status: DeliveryStatus::Pending,
                driver_location: None,
                last_location_update: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        );
        id
    }

    #[test]
    fn pending_delivery_gets_driver_and_assigned_status() {
        let state = state();
        let driver = seed_driver(&state, DriverStatus::Active, true);
        let delivery = seed_pending(&state);

        let updated = assign_delivery(&state, delivery, driver).unwrap();
        assert_eq!(updated.status, DeliveryStatus::Assigned);
        assert_eq!(updated.driver_id, Some(driver));
        assert_eq!(updated.driver_name.as_deref(), Some("Rolf"));
    }

    #[test]
    fn non_pending_delivery_is_rejected() {
        let state = state();
        let driver = seed_driver(&state, DriverStatus::Active, true);
        let delivery = seed_pending(&state);
        assign_delivery(&state, delivery, driver).unwrap();

        let err = assign_delivery(&state, delivery, driver).unwrap_err();
        assert!(matches!(err, AppError::IllegalTransition { .. }));
    }

    #[test]
    fn inactive_driver_is_rejected_without_mutation() {
        let state = state();
        let driver = seed_driver(&state, DriverStatus::Inactive, true);
        let delivery = seed_pending(&state);

        let err = assign_delivery(&state, delivery, driver).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let unchanged = state.deliveries.get(&delivery).unwrap();
        assert_eq!(unchanged.status, DeliveryStatus::Pending);
        assert!(unchanged.driver_id.is_none());
    }

    #[test]
    fn offline_driver_is_rejected_by_the_engine() {
        let state = state();
        let driver = seed_driver(&state, DriverStatus::Active, false);
        let delivery = seed_pending(&state);

        let err = assign_delivery(&state, delivery, driver).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn unknown_driver_is_rejected() {
        let state = state();
        let delivery = seed_pending(&state);

        let err = assign_delivery(&state, delivery, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
