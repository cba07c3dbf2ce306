use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::warn;
use uuid::Uuid;

use crate::models::delivery::Delivery;
use crate::state::AppState;

/// A role-scoped filter over the delivery collection. Each observer session
/// holds exactly one of these for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Scope {
    /// Operator console: everything belonging to the company.
    Company { company_id: Uuid },
    /// Driver console: the driver's own deliveries.
    Driver { driver_id: Uuid },
    /// Customer view: the customer's own orders.
    Customer { customer_id: Uuid },
}

impl Scope {
    pub fn matches(&self, delivery: &Delivery) -> bool {
        match self {
            Scope::Company { company_id } => delivery.company_id == *company_id,
            Scope::Driver { driver_id } => delivery.driver_id == Some(*driver_id),
            Scope::Customer { customer_id } => delivery.customer.customer_id == *customer_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Scope::Company { .. } => "company",
            Scope::Driver { .. } => "driver",
            Scope::Customer { .. } => "customer",
        }
    }
}

/// Current filtered result set for a scope, oldest delivery first.
pub fn scoped_deliveries(state: &AppState, scope: &Scope) -> Vec<Delivery> {
    let mut deliveries: Vec<Delivery> = state
        .deliveries
        .iter()
        .filter(|entry| scope.matches(entry.value()))
        .map(|entry| entry.value().clone())
        .collect();
    deliveries.sort_by_key(|delivery| delivery.created_at);
    deliveries
}

/// Live subscription: yields the full scoped set immediately, then again
/// after every store write matching the scope. Deliberately resends the
/// complete set rather than diffs; that is the observer contract.
///
/// A lagged receiver degrades to a warning plus a fresh snapshot rather
/// than failing the subscription.
pub fn watch(state: Arc<AppState>, scope: Scope) -> impl Stream<Item = Vec<Delivery>> {
    let rx = state.delivery_events_tx.subscribe();
    let initial = scoped_deliveries(&state, &scope);
    let kind = scope.kind();

    let updates = BroadcastStream::new(rx).filter_map(move |event| match event {
        Ok(delivery) if scope.matches(&delivery) => {
            state
                .metrics
                .fanout_notifications_total
                .with_label_values(&[kind])
                .inc();
            Some(scoped_deliveries(&state, &scope))
        }
        Ok(_) => None,
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            warn!(skipped, "subscription lagged; resending current snapshot");
            Some(scoped_deliveries(&state, &scope))
        }
    });

    tokio_stream::once(initial).chain(updates)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use tokio_stream::StreamExt;
    use uuid::Uuid;

    use super::{watch, Scope};
    use crate::models::delivery::{CustomerInfo, Delivery, DeliveryStatus};
    use crate::models::location::GeoPoint;
    use crate::state::AppState;
    use crate::tracker::ReporterSettings;

    fn delivery(company: u128, customer: u128, driver: Option<u128>) -> Delivery {
        Delivery {
            id: Uuid::new_v4(),
            company_id: Uuid::from_u128(company),
            customer: CustomerInfo {
                customer_id: Uuid::from_u128(customer),
                name: "Ada Kunde".to_string(),
                address: "Beispielstr. 1".to_string(),
                phone: "+49 40 123456".to_string(),
            },
            customer_location: GeoPoint {
                lat: 53.55,
                lng: 9.99,
            },
            driver_id: driver.map(Uuid::from_u128),
            driver_name: driver.map(|_| "Rolf".to_string()),
            fee: 4.5,
            notes: String::new(),
            status: DeliveryStatus::Pending,
            driver_location: None,
            last_location_update: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn scopes_filter_on_their_own_key() {
        let d = delivery(1, 2, Some(3));

        assert!(Scope::Company {
            company_id: Uuid::from_u128(1)
        }
        .matches(&d));
        assert!(!Scope::Company {
            company_id: Uuid::from_u128(9)
        }
        .matches(&d));

        assert!(Scope::Driver {
            driver_id: Uuid::from_u128(3)
        }
        .matches(&d));
        assert!(!Scope::Driver {
            driver_id: Uuid::from_u128(9)
        }
        .matches(&d));

        assert!(Scope::Customer {
            customer_id: Uuid::from_u128(2)
        }
        .matches(&d));
        assert!(!Scope::Customer {
            customer_id: Uuid::from_u128(9)
        }
        .matches(&d));
    }

    #[test]
    fn driver_scope_never_matches_unassigned_deliveries() {
        let d = delivery(1, 2, None);
        assert!(!Scope::Driver {
            driver_id: Uuid::from_u128(3)
        }
        .matches(&d));
    }

    #[tokio::test]
    async fn watch_emits_snapshot_then_full_set_per_matching_write() {
        let state = Arc::new(AppState::new(64, ReporterSettings::default()));
        for _ in 0..3 {
            let d = delivery(1, 2, None);
            state.deliveries.insert(d.id, d);
        }

        let scope = Scope::Company {
            company_id: Uuid::from_u128(1),
        };
        let mut stream = Box::pin(watch(state.clone(), scope));

        let snapshot = stream.next().await.unwrap();
        assert_eq!(snapshot.len(), 3);

        // a fourth delivery arrives
        let d4 = delivery(1, 2, None);
        let d4_id = d4.id;
        state.deliveries.insert(d4.id, d4.clone());
        state.publish_delivery(&d4);

        let updated = stream.next().await.unwrap();
        assert_eq!(updated.len(), 4);
        assert!(updated.iter().any(|d| d.id == d4_id));
    }

    #[tokio::test]
    async fn writes_outside_the_scope_do_not_notify() {
        let state = Arc::new(AppState::new(64, ReporterSettings::default()));
        let scope = Scope::Company {
            company_id: Uuid::from_u128(1),
        };
        let mut stream = Box::pin(watch(state.clone(), scope));
        assert_eq!(stream.next().await.unwrap().len(), 0);

        let other = delivery(9, 2, None);
        state.deliveries.insert(other.id, other.clone());
        state.publish_delivery(&other);

        let mine = delivery(1, 2, None);
        state.deliveries.insert(mine.id, mine.clone());
        state.publish_delivery(&mine);

        // the next emission is driven by the in-scope write only
        let set = stream.next().await.unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set[0].id, mine.id);
    }
}
