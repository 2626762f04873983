//! Layer 4: precise plan construction and candidate selection.
//!
//! Every Layer-3 survivor gets a real routing call with waypoint optimization
//! enabled. Candidates are evaluated concurrently under a bounded pool so a
//! wide funnel does not translate into unbounded simultaneous API calls, and
//! the winner is picked deterministically once all evaluations are in.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::geo::{advance_by_minutes, haversine_km, minutes_between};
use crate::models::courier::DispatchCourier;
use crate::models::order::DispatchOrder;
use crate::models::plan::{AssignmentResult, CourierPlan, RouteStop, StopKind};
use crate::routing::Route;

use super::DispatchEngine;
use super::feasibility::{HypotheticalStop, hypothetical_stops};
use super::scoring::compute_score;

impl DispatchEngine {
    /// Builds a precise plan for every candidate and returns the lowest-scored
    /// survivor. Ties are broken by ascending courier id so repeated runs with
    /// identical inputs pick the same courier.
    pub(crate) async fn best_plan(
        &self,
        new_order: &DispatchOrder,
        candidates: &[&DispatchCourier],
        all_orders: &HashMap<Uuid, DispatchOrder>,
        now: DateTime<Utc>,
    ) -> Option<AssignmentResult> {
        let evaluations: Vec<(Uuid, CourierPlan, f64)> =
            stream::iter(candidates.iter().copied().map(|courier| async move {
                let (plan, min_slack_minutes) =
                    self.plan_for_courier(courier, new_order, all_orders, now).await?;
                let (score, breakdown) =
                    compute_score(&self.config, courier, &plan, min_slack_minutes);
                debug!(
                    order_id = %new_order.id,
                    courier_id = %courier.id,
                    score,
                    distance_penalty = breakdown.distance_penalty,
                    fairness_penalty = breakdown.fairness_penalty,
                    overload_penalty = breakdown.overload_penalty,
                    sla_penalty = breakdown.sla_penalty,
                    "candidate plan scored"
                );
                Some((courier.id, plan, score))
            }))
            .buffer_unordered(self.config.max_concurrent_route_requests)
            .filter_map(|evaluation| async move { evaluation })
            .collect()
            .await;

        evaluations
            .into_iter()
            .min_by(|a, b| a.2.total_cmp(&b.2).then_with(|| a.0.cmp(&b.0)))
            .map(|(courier_id, plan, score)| AssignmentResult {
                order_id: new_order.id,
                courier_id,
                plan,
                score,
            })
    }

    /// One routing call for one candidate. Returns the realized plan and its
    /// minimum deadline slack, or `None` when the candidate must be dropped:
    /// provider failure, unroutable, malformed realized order, or any dropoff
    /// past its deadline (the hard SLA gate).
    async fn plan_for_courier(
        &self,
        courier: &DispatchCourier,
        new_order: &DispatchOrder,
        all_orders: &HashMap<Uuid, DispatchOrder>,
        now: DateTime<Utc>,
    ) -> Option<(CourierPlan, f64)> {
        let stops = hypothetical_stops(courier, new_order, all_orders);
        let waypoints: Vec<_> = stops.iter().map(|stop| stop.location).collect();

        let route = match self
            .provider
            .route(courier.current_location, &waypoints, now, true)
            .await
        {
            Ok(route) => route,
            Err(err) => {
                warn!(
                    courier_id = %courier.id,
                    order_id = %new_order.id,
                    error = %err,
                    "route request failed; dropping candidate"
                );
                return None;
            }
        };

        if route.legs.is_empty() {
            debug!(
                courier_id = %courier.id,
                order_id = %new_order.id,
                "provider returned no legs; candidate unroutable"
            );
            return None;
        }

        let Some(planned_stops) = realize_stops(&stops, &route, now) else {
            debug!(
                courier_id = %courier.id,
                order_id = %new_order.id,
                "route legs do not cover all stops; dropping candidate"
            );
            return None;
        };

        if !pickups_precede_dropoffs(&planned_stops) {
            debug!(
                courier_id = %courier.id,
                order_id = %new_order.id,
                "realized order visits a dropoff before its pickup; dropping candidate"
            );
            return None;
        }

        let mut min_slack_minutes: Option<f64> = None;
        for stop in planned_stops.iter().filter(|s| s.kind == StopKind::Dropoff) {
            let Some(deadline_at) = deadline_of(&stops, stop.order_id) else {
                return None;
            };
            let slack = minutes_between(deadline_at, stop.eta);
            if slack < 0.0 {
                debug!(
                    courier_id = %courier.id,
                    order_id = %stop.order_id,
                    eta = %stop.eta,
                    deadline = %deadline_at,
                    "real dropoff misses deadline; rejecting plan"
                );
                return None;
            }
            min_slack_minutes = Some(match min_slack_minutes {
                Some(current) => current.min(slack),
                None => slack,
            });
        }

        let min_slack_minutes = min_slack_minutes.unwrap_or(self.config.sla_buffer_minutes);

        let plan = CourierPlan {
            courier_id: courier.id,
            stops: planned_stops,
            polyline: route.polyline.clone(),
            total_distance_km: route.total_distance_km,
            total_duration_minutes: route.total_duration_minutes,
        };

        Some((plan, min_slack_minutes))
    }
}

/// Matches each leg endpoint to the nearest still-unmatched stop and
/// accumulates ETAs. Trailing legs beyond the stop count are ignored; if the
/// legs do not cover every stop the plan is unusable and `None` is returned.
fn realize_stops(
    stops: &[HypotheticalStop],
    route: &Route,
    now: DateTime<Utc>,
) -> Option<Vec<RouteStop>> {
    let mut remaining: Vec<usize> = (0..stops.len()).collect();
    let mut realized = Vec::with_capacity(stops.len());
    let mut clock = now;

    for leg in &route.legs {
        if remaining.is_empty() {
            break;
        }
        clock = advance_by_minutes(clock, leg.duration_minutes);

        let slot = remaining
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                haversine_km(&leg.to_point, &stops[**a].location)
                    .total_cmp(&haversine_km(&leg.to_point, &stops[**b].location))
            })
            .map(|(slot, _)| slot)?;
        let idx = remaining.remove(slot);

        realized.push(RouteStop {
            order_id: stops[idx].order_id,
            kind: stops[idx].kind,
            location: stops[idx].location,
            eta: clock,
        });
    }

    if remaining.is_empty() { Some(realized) } else { None }
}

fn pickups_precede_dropoffs(stops: &[RouteStop]) -> bool {
    let mut picked_up = std::collections::HashSet::new();
    for stop in stops {
        match stop.kind {
            StopKind::Pickup => {
                picked_up.insert(stop.order_id);
            }
            StopKind::Dropoff => {
                if !picked_up.contains(&stop.order_id) {
                    return false;
                }
            }
        }
    }
    true
}

fn deadline_of(stops: &[HypotheticalStop], order_id: Uuid) -> Option<DateTime<Utc>> {
    stops
        .iter()
        .find(|stop| stop.order_id == order_id)
        .map(|stop| stop.deadline_at)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    use super::{pickups_precede_dropoffs, realize_stops};
    use crate::engine::feasibility::HypotheticalStop;
    use crate::models::courier::GeoPoint;
    use crate::models::plan::{RouteStop, StopKind};
    use crate::routing::{Route, RouteLeg};

    fn stop(seed: u128, kind: StopKind, lat: f64, lng: f64) -> HypotheticalStop {
        HypotheticalStop {
            order_id: Uuid::from_u128(seed),
            kind,
            location: GeoPoint { lat, lng },
            deadline_at: Utc.with_ymd_and_hms(2025, 6, 1, 14, 0, 0).unwrap(),
        }
    }

    fn leg(lat: f64, lng: f64, minutes: f64) -> RouteLeg {
        RouteLeg {
            to_point: GeoPoint { lat, lng },
            duration_minutes: minutes,
            distance_km: minutes / 60.0 * 40.0,
        }
    }

    #[test]
    fn realized_stops_follow_leg_order_and_accumulate_etas() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let stops = vec![
            stop(1, StopKind::Pickup, 24.71, 46.67),
            stop(1, StopKind::Dropoff, 24.69, 46.72),
        ];
        // Provider visits pickup then dropoff.
        let route = Route {
            legs: vec![leg(24.71, 46.67, 3.0), leg(24.69, 46.72, 9.0)],
            polyline: None,
            total_distance_km: 8.0,
            total_duration_minutes: 12.0,
        };

        let realized = realize_stops(&stops, &route, now).unwrap();
        assert_eq!(realized.len(), 2);
        assert_eq!(realized[0].kind, StopKind::Pickup);
        assert_eq!(realized[0].eta, now + Duration::minutes(3));
        assert_eq!(realized[1].kind, StopKind::Dropoff);
        assert_eq!(realized[1].eta, now + Duration::minutes(12));
    }

    #[test]
    fn reordered_legs_map_to_matching_stops() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let stops = vec![
            stop(1, StopKind::Pickup, 24.71, 46.67),
            stop(1, StopKind::Dropoff, 24.69, 46.72),
            stop(2, StopKind::Pickup, 24.72, 46.66),
            stop(2, StopKind::Dropoff, 24.68, 46.73),
        ];
        // Provider interleaves the two orders.
        let route = Route {
            legs: vec![
                leg(24.71, 46.67, 2.0),
                leg(24.72, 46.66, 2.0),
                leg(24.69, 46.72, 6.0),
                leg(24.68, 46.73, 2.0),
            ],
            polyline: None,
            total_distance_km: 10.0,
            total_duration_minutes: 12.0,
        };

        let realized = realize_stops(&stops, &route, now).unwrap();
        let kinds: Vec<_> = realized.iter().map(|s| (s.order_id, s.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                (Uuid::from_u128(1), StopKind::Pickup),
                (Uuid::from_u128(2), StopKind::Pickup),
                (Uuid::from_u128(1), StopKind::Dropoff),
                (Uuid::from_u128(2), StopKind::Dropoff),
            ]
        );
        assert!(pickups_precede_dropoffs(&realized));
    }

    #[test]
    fn legs_not_covering_all_stops_is_rejected() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let stops = vec![
            stop(1, StopKind::Pickup, 24.71, 46.67),
            stop(1, StopKind::Dropoff, 24.69, 46.72),
        ];
        let route = Route {
            legs: vec![leg(24.71, 46.67, 3.0)],
            polyline: None,
            total_distance_km: 2.0,
            total_duration_minutes: 3.0,
        };

        assert!(realize_stops(&stops, &route, now).is_none());
    }

    #[test]
    fn dropoff_before_pickup_is_detected() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let stops = vec![
            RouteStop {
                order_id: Uuid::from_u128(1),
                kind: StopKind::Dropoff,
                location: GeoPoint {
                    lat: 24.69,
                    lng: 46.72,
                },
                eta: now,
            },
            RouteStop {
                order_id: Uuid::from_u128(1),
                kind: StopKind::Pickup,
                location: GeoPoint {
                    lat: 24.71,
                    lng: 46.67,
                },
                eta: now,
            },
        ];
        assert!(!pickups_precede_dropoffs(&stops));
    }
}
