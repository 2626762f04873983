//! Layer 3: approximate route feasibility.
//!
//! Before paying for a real routing call, each candidate is checked with a
//! greedy nearest-neighbor walk over its hypothetical stop set, advancing a
//! simulated clock at the configured average speed. A courier whose walk
//! breaches any order's deadline is dropped here.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::geo::{advance_by_minutes, haversine_km, travel_minutes};
use crate::models::courier::{DispatchCourier, GeoPoint};
use crate::models::order::DispatchOrder;
use crate::models::plan::StopKind;

use super::DispatchEngine;

/// One stop of a courier's hypothetical load: the pickup/dropoff pairs of its
/// existing open orders plus the new order's pair.
#[derive(Debug, Clone)]
pub(crate) struct HypotheticalStop {
    pub order_id: Uuid,
    pub kind: StopKind,
    pub location: GeoPoint,
    pub deadline_at: DateTime<Utc>,
}

/// Reconstructs the stop set for `courier` carrying its open orders plus
/// `new_order`. Open orders missing from the snapshot are skipped.
pub(crate) fn hypothetical_stops(
    courier: &DispatchCourier,
    new_order: &DispatchOrder,
    all_orders: &HashMap<Uuid, DispatchOrder>,
) -> Vec<HypotheticalStop> {
    let mut stops = Vec::with_capacity((courier.assigned_open_order_ids.len() + 1) * 2);

    for order_id in &courier.assigned_open_order_ids {
        let Some(order) = all_orders.get(order_id) else {
            debug!(
                courier_id = %courier.id,
                order_id = %order_id,
                "open order missing from snapshot; ignoring"
            );
            continue;
        };
        push_pair(&mut stops, order);
    }
    push_pair(&mut stops, new_order);

    stops
}

fn push_pair(stops: &mut Vec<HypotheticalStop>, order: &DispatchOrder) {
    stops.push(HypotheticalStop {
        order_id: order.id,
        kind: StopKind::Pickup,
        location: order.pickup,
        deadline_at: order.deadline_at,
    });
    stops.push(HypotheticalStop {
        order_id: order.id,
        kind: StopKind::Dropoff,
        location: order.dropoff,
        deadline_at: order.deadline_at,
    });
}

impl DispatchEngine {
    /// Greedy nearest-neighbor simulation. At each step the walk moves to the
    /// closest unvisited stop that is a pickup or a dropoff whose own pickup
    /// has already been visited, and the clock advances at the configured
    /// average speed. Fails as soon as any simulated dropoff misses its
    /// order's deadline.
    pub(crate) fn passes_feasibility(
        &self,
        courier: &DispatchCourier,
        new_order: &DispatchOrder,
        all_orders: &HashMap<Uuid, DispatchOrder>,
        now: DateTime<Utc>,
    ) -> bool {
        let stops = hypothetical_stops(courier, new_order, all_orders);

        let mut visited = vec![false; stops.len()];
        let mut picked_up: HashSet<Uuid> = HashSet::new();
        let mut position = courier.current_location;
        let mut clock = now;

        for _ in 0..stops.len() {
            let next = stops
                .iter()
                .enumerate()
                .filter(|(idx, stop)| {
                    !visited[*idx]
                        && (stop.kind == StopKind::Pickup || picked_up.contains(&stop.order_id))
                })
                .min_by(|(_, a), (_, b)| {
                    haversine_km(&position, &a.location)
                        .total_cmp(&haversine_km(&position, &b.location))
                });
            let Some((idx, stop)) = next else {
                // Unreachable with well-formed pickup/dropoff pairs.
                return false;
            };

            let distance_km = haversine_km(&position, &stop.location);
            clock = advance_by_minutes(clock, travel_minutes(distance_km, self.config.average_speed_kmh));

            if stop.kind == StopKind::Dropoff && clock > stop.deadline_at {
                debug!(
                    courier_id = %courier.id,
                    order_id = %stop.order_id,
                    eta = %clock,
                    deadline = %stop.deadline_at,
                    "approximate dropoff misses deadline; dropping candidate"
                );
                return false;
            }

            visited[idx] = true;
            if stop.kind == StopKind::Pickup {
                picked_up.insert(stop.order_id);
            }
            position = stop.location;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    use super::hypothetical_stops;
    use crate::config::DispatchConfig;
    use crate::engine::DispatchEngine;
    use crate::models::courier::{CourierStatus, DispatchCourier, GeoPoint};
    use crate::models::order::{DispatchOrder, OrderStatus};
    use crate::models::plan::StopKind;
    use crate::routing::haversine::HaversineRouter;

    fn engine() -> DispatchEngine {
        DispatchEngine::new(
            DispatchConfig::default(),
            Arc::new(HaversineRouter::default()),
        )
        .unwrap()
    }

    fn courier(lat: f64, lng: f64, open: Vec<Uuid>) -> DispatchCourier {
        DispatchCourier {
            id: Uuid::from_u128(1),
            name: "test-courier".to_string(),
            current_location: GeoPoint { lat, lng },
            status: CourierStatus::Online,
            shift_end_at: Utc.with_ymd_and_hms(2025, 6, 1, 22, 0, 0).unwrap(),
            completed_orders_today: 0,
            assigned_open_order_ids: open,
            zone_id: None,
        }
    }

    fn order(seed: u128, pickup: (f64, f64), dropoff: (f64, f64), deadline_minutes: i64) -> DispatchOrder {
        let created_at = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        DispatchOrder {
            id: Uuid::from_u128(seed),
            pickup: GeoPoint {
                lat: pickup.0,
                lng: pickup.1,
            },
            dropoff: GeoPoint {
                lat: dropoff.0,
                lng: dropoff.1,
            },
            created_at,
            deadline_at: created_at + Duration::minutes(deadline_minutes),
            status: OrderStatus::Unassigned,
            zone_id: None,
        }
    }

    #[test]
    fn nearby_order_with_generous_deadline_passes() {
        let engine = engine();
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let courier = courier(24.70, 46.68, vec![]);
        let new_order = order(10, (24.71, 46.67), (24.69, 46.72), 60);

        assert!(engine.passes_feasibility(&courier, &new_order, &HashMap::new(), now));
    }

    #[test]
    fn impossible_deadline_fails() {
        let engine = engine();
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let courier = courier(24.70, 46.68, vec![]);
        // ~35 km of driving against a 10 minute deadline.
        let new_order = order(10, (24.71, 46.67), (24.90, 46.95), 10);

        assert!(!engine.passes_feasibility(&courier, &new_order, &HashMap::new(), now));
    }

    #[test]
    fn existing_order_deadline_is_also_enforced() {
        let engine = engine();
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

        // The existing order's dropoff is far away and nearly due; adding the
        // new order pushes it past its deadline.
        let existing = order(20, (24.70, 46.69), (24.85, 46.90), 25);
        let courier = courier(24.70, 46.68, vec![existing.id]);
        let new_order = order(10, (24.71, 46.67), (24.69, 46.72), 240);

        let mut all_orders = HashMap::new();
        all_orders.insert(existing.id, existing);

        assert!(!engine.passes_feasibility(&courier, &new_order, &all_orders, now));
    }

    #[test]
    fn dropoff_is_never_walked_before_its_pickup() {
        // The dropoff sits right next to the courier, the pickup further out.
        // A walk ignoring precedence would visit the dropoff first.
        let courier = courier(24.70, 46.68, vec![]);
        let new_order = order(10, (24.75, 46.75), (24.701, 46.681), 240);
        let stops = hypothetical_stops(&courier, &new_order, &HashMap::new());

        assert_eq!(stops.len(), 2);
        assert_eq!(stops[0].kind, StopKind::Pickup);

        let engine = engine();
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        assert!(engine.passes_feasibility(&courier, &new_order, &HashMap::new(), now));
    }

    #[test]
    fn missing_open_order_is_skipped() {
        let ghost = Uuid::from_u128(99);
        let courier = courier(24.70, 46.68, vec![ghost]);
        let new_order = order(10, (24.71, 46.67), (24.69, 46.72), 60);

        let stops = hypothetical_stops(&courier, &new_order, &HashMap::new());
        assert_eq!(stops.len(), 2);
    }
}
