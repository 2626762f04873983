//! Great-circle routing provider.
//!
//! Estimates travel time from straight-line distance at an assumed speed.
//! Less accurate than a real routing backend (ignores roads) but always
//! available and fully deterministic, which also makes it the test double
//! of choice.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::geo::{haversine_km, travel_minutes};
use crate::models::courier::GeoPoint;
use crate::routing::{Route, RouteLeg, RoutingError, RoutingProvider, TravelTimeMatrix};

const DEFAULT_SPEED_KMH: f64 = 40.0;

#[derive(Debug, Clone)]
pub struct HaversineRouter {
    pub speed_kmh: f64,
}

impl Default for HaversineRouter {
    fn default() -> Self {
        Self {
            speed_kmh: DEFAULT_SPEED_KMH,
        }
    }
}

impl HaversineRouter {
    pub fn new(speed_kmh: f64) -> Self {
        Self { speed_kmh }
    }

    /// Greedy nearest-neighbor visiting order over `waypoints`.
    fn optimized_order(origin: GeoPoint, waypoints: &[GeoPoint]) -> Vec<usize> {
        let mut remaining: Vec<usize> = (0..waypoints.len()).collect();
        let mut order = Vec::with_capacity(waypoints.len());
        let mut position = origin;

        loop {
            let Some(slot) = remaining
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    haversine_km(&position, &waypoints[**a])
                        .total_cmp(&haversine_km(&position, &waypoints[**b]))
                })
                .map(|(slot, _)| slot)
            else {
                break;
            };
            let idx = remaining.remove(slot);
            position = waypoints[idx];
            order.push(idx);
        }

        order
    }
}

#[async_trait]
impl RoutingProvider for HaversineRouter {
    async fn travel_times(
        &self,
        origins: &[GeoPoint],
        destinations: &[GeoPoint],
        _at: DateTime<Utc>,
    ) -> Result<TravelTimeMatrix, RoutingError> {
        let durations_minutes = origins
            .iter()
            .map(|origin| {
                destinations
                    .iter()
                    .map(|destination| {
                        travel_minutes(haversine_km(origin, destination), self.speed_kmh)
                    })
                    .collect()
            })
            .collect();

        Ok(TravelTimeMatrix { durations_minutes })
    }

    async fn route(
        &self,
        origin: GeoPoint,
        waypoints: &[GeoPoint],
        _at: DateTime<Utc>,
        optimize_order: bool,
    ) -> Result<Route, RoutingError> {
        let order = if optimize_order {
            Self::optimized_order(origin, waypoints)
        } else {
            (0..waypoints.len()).collect()
        };

        let mut legs = Vec::with_capacity(order.len());
        let mut position = origin;
        let mut total_distance_km = 0.0;
        let mut total_duration_minutes = 0.0;

        for idx in order {
            let to_point = waypoints[idx];
            let distance_km = haversine_km(&position, &to_point);
            let duration_minutes = travel_minutes(distance_km, self.speed_kmh);
            total_distance_km += distance_km;
            total_duration_minutes += duration_minutes;
            legs.push(RouteLeg {
                to_point,
                duration_minutes,
                distance_km,
            });
            position = to_point;
        }

        Ok(Route {
            legs,
            polyline: None,
            total_distance_km,
            total_duration_minutes,
        })
    }
}
