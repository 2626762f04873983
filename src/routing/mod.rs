//! Routing provider seam.
//!
//! The engine depends only on the two-method [`RoutingProvider`] trait.
//! Concrete backends live behind it: [`haversine::HaversineRouter`] for a
//! deterministic offline estimate and [`osrm::OsrmRouter`] for a real
//! routing service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::courier::GeoPoint;

pub mod haversine;
pub mod osrm;

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("routing http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("routing api error: {0}")]
    Api(String),

    #[error("malformed routing response: {0}")]
    Malformed(String),
}

/// Travel-time estimates: one row per origin, one column per destination.
/// A missing or non-positive entry means "no route / unknown" and must be
/// treated as a filter failure, never as zero travel time.
#[derive(Debug, Clone, Default)]
pub struct TravelTimeMatrix {
    pub durations_minutes: Vec<Vec<f64>>,
}

impl TravelTimeMatrix {
    pub fn minutes(&self, origin: usize, destination: usize) -> Option<f64> {
        self.durations_minutes.get(origin)?.get(destination).copied()
    }
}

#[derive(Debug, Clone)]
pub struct RouteLeg {
    pub to_point: GeoPoint,
    pub duration_minutes: f64,
    pub distance_km: f64,
}

/// A concrete route. Legs reflect the provider-chosen stop order when
/// waypoint optimization was requested; an empty `legs` list signals
/// "unroutable" and the caller must drop that candidate.
#[derive(Debug, Clone, Default)]
pub struct Route {
    pub legs: Vec<RouteLeg>,
    pub polyline: Option<String>,
    pub total_distance_km: f64,
    pub total_duration_minutes: f64,
}

#[async_trait]
pub trait RoutingProvider: Send + Sync {
    /// Batched travel-time lookup from every origin to every destination.
    async fn travel_times(
        &self,
        origins: &[GeoPoint],
        destinations: &[GeoPoint],
        at: DateTime<Utc>,
    ) -> Result<TravelTimeMatrix, RoutingError>;

    /// Route from `origin` through `waypoints`. With `optimize_order` the
    /// provider is free to reorder the waypoints; the realized order is
    /// reported through the returned legs.
    async fn route(
        &self,
        origin: GeoPoint,
        waypoints: &[GeoPoint],
        at: DateTime<Utc>,
        optimize_order: bool,
    ) -> Result<Route, RoutingError>;
}
