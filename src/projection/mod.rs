use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use crate::geo::haversine_km;
use crate::models::delivery::{Delivery, DeliveryStatus};
use crate::models::location::GeoPoint;

/// Status buckets for the console headers. `active` groups the on-the-road
/// stages (picked up + in transit); `assigned` is its own bucket because
/// those deliveries still sit at the pickup point.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub assigned: usize,
    pub active: usize,
    pub delivered: usize,
    pub cancelled: usize,
}

pub fn status_counts(deliveries: &[Delivery]) -> StatusCounts {
    let mut counts = StatusCounts::default();
    for delivery in deliveries {
        match delivery.status {
            DeliveryStatus::Pending => counts.pending += 1,
            DeliveryStatus::Assigned => counts.assigned += 1,
            DeliveryStatus::PickedUp | DeliveryStatus::InTransit => counts.active += 1,
            DeliveryStatus::Delivered => counts.delivered += 1,
            DeliveryStatus::Cancelled => counts.cancelled += 1,
        }
    }
    counts
}

/// List-display truncation, safe on multi-byte addresses. Never yields
/// more than `max_chars` characters, ellipsis included.
pub fn truncate_address(address: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }
    if address.chars().count() <= max_chars {
        return address.to_string();
    }

    let mut truncated: String = address.chars().take(max_chars.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum MarkerChange {
    Added {
        delivery_id: Uuid,
        position: GeoPoint,
        distance_to_destination_km: f64,
    },
    Moved {
        delivery_id: Uuid,
        position: GeoPoint,
        distance_to_destination_km: f64,
    },
    Removed {
        delivery_id: Uuid,
    },
}

/// Operator-map marker state, keyed by delivery id. Applying a snapshot
/// yields move/remove changes so the map can relocate existing markers
/// instead of recreating them.
#[derive(Debug, Default)]
pub struct MarkerBoard {
    markers: HashMap<Uuid, GeoPoint>,
}

impl MarkerBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, deliveries: &[Delivery]) -> Vec<MarkerChange> {
        let mut next = HashMap::new();
        let mut changes = Vec::new();

        for delivery in deliveries {
            if !delivery.status.is_active() {
                continue;
            }
            let Some(position) = delivery.driver_location else {
                continue;
            };

            let distance_to_destination_km = haversine_km(&position, &delivery.customer_location);
            match self.markers.get(&delivery.id) {
                None => changes.push(MarkerChange::Added {
                    delivery_id: delivery.id,
                    position,
                    distance_to_destination_km,
                }),
                Some(previous) if *previous != position => changes.push(MarkerChange::Moved {
                    delivery_id: delivery.id,
                    position,
                    distance_to_destination_km,
                }),
                Some(_) => {}
            }
            next.insert(delivery.id, position);
        }

        for delivery_id in self.markers.keys() {
            if !next.contains_key(delivery_id) {
                changes.push(MarkerChange::Removed {
                    delivery_id: *delivery_id,
                });
            }
        }

        self.markers = next;
        changes
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{status_counts, truncate_address, MarkerBoard, MarkerChange};
    use crate::models::delivery::{CustomerInfo, Delivery, DeliveryStatus};
    use crate::models::location::GeoPoint;

    fn delivery(status: DeliveryStatus, driver_location: Option<GeoPoint>) -> Delivery {
        Delivery {
            id: Uuid::new_v4(),
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
            driver_id: Some(Uuid::from_u128(3)),
            driver_name: Some("Rolf".to_string()),
            fee: 4.5,
            notes: String::new(),
            status,
            driver_location,
            last_location_update: driver_location.map(|_| Utc::now()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn counts_bucket_per_status() {
        let deliveries = vec![
            delivery(DeliveryStatus::Pending, None),
            delivery(DeliveryStatus::Pending, None),
            delivery(DeliveryStatus::Assigned, None),
            delivery(DeliveryStatus::PickedUp, None),
            delivery(DeliveryStatus::InTransit, None),
            delivery(DeliveryStatus::Delivered, None),
            delivery(DeliveryStatus::Cancelled, None),
        ];

        let counts = status_counts(&deliveries);
        assert_eq!(counts.pending, 2);
        assert_eq!(counts.assigned, 1);
        assert_eq!(counts.active, 2);
        assert_eq!(counts.delivered, 1);
        assert_eq!(counts.cancelled, 1);
    }

    #[test]
    fn short_addresses_pass_through() {
        assert_eq!(truncate_address("Beispielstr. 1", 20), "Beispielstr. 1");
    }

    #[test]
    fn long_addresses_get_an_ellipsis_on_a_char_boundary() {
        let truncated = truncate_address("Große Bergstraße 264, 22767 Hamburg", 12);
        assert_eq!(truncated.chars().count(), 12);
        assert!(truncated.ends_with('…'));
        assert_eq!(truncated, "Große Bergs…");
    }

    #[test]
    fn zero_width_truncation_yields_nothing() {
        assert_eq!(truncate_address("Beispielstr. 1", 0), "");
    }

    #[test]
    fn marker_added_then_moved_then_removed() {
        let mut board = MarkerBoard::new();
        let mut d = delivery(
            DeliveryStatus::InTransit,
            Some(GeoPoint {
                lat: 53.50,
                lng: 9.90,
            }),
        );

        let changes = board.apply(std::slice::from_ref(&d));
        assert!(matches!(changes.as_slice(), [MarkerChange::Added { .. }]));

        // position changes: the marker moves, it is not recreated
        d.driver_location = Some(GeoPoint {
            lat: 53.51,
            lng: 9.91,
        });
        let changes = board.apply(std::slice::from_ref(&d));
        assert!(matches!(
            changes.as_slice(),
            [MarkerChange::Moved { delivery_id, .. }] if *delivery_id == d.id
        ));

        // delivered: the marker leaves the active set
        d.status = DeliveryStatus::Delivered;
        let changes = board.apply(std::slice::from_ref(&d));
        assert!(matches!(
            changes.as_slice(),
            [MarkerChange::Removed { delivery_id }] if *delivery_id == d.id
        ));
    }

    #[test]
    fn unchanged_position_yields_no_change() {
        let mut board = MarkerBoard::new();
        let d = delivery(
            DeliveryStatus::InTransit,
            Some(GeoPoint {
                lat: 53.50,
                lng: 9.90,
            }),
        );

        board.apply(std::slice::from_ref(&d));
        assert!(board.apply(std::slice::from_ref(&d)).is_empty());
    }

    #[test]
    fn deliveries_without_a_driver_fix_have_no_marker() {
        let mut board = MarkerBoard::new();
        let d = delivery(DeliveryStatus::Assigned, None);
        assert!(board.apply(std::slice::from_ref(&d)).is_empty());
    }

    #[test]
    fn moved_markers_report_distance_to_destination() {
        let mut board = MarkerBoard::new();
        let d = delivery(
            DeliveryStatus::InTransit,
            Some(GeoPoint {
                lat: 53.55,
                lng: 9.99,
            }),
        );

        // driver is standing at the destination
        let changes = board.apply(std::slice::from_ref(&d));
        match changes.as_slice() {
            [MarkerChange::Added {
                distance_to_destination_km,
                ..
            }] => assert!(*distance_to_destination_km < 1e-6),
            other => panic!("unexpected changes: {other:?}"),
        }
    }
}
