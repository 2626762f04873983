use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::courier::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopKind {
    Pickup,
    Dropoff,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteStop {
    pub order_id: Uuid,
    pub kind: StopKind,
    pub location: GeoPoint,
    pub eta: DateTime<Utc>,
}

/// Ordered stop sequence for one courier with projected ETAs. Every order in
/// the plan has its pickup before its dropoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourierPlan {
    pub courier_id: Uuid,
    pub stops: Vec<RouteStop>,
    pub polyline: Option<String>,
    pub total_distance_km: f64,
    pub total_duration_minutes: f64,
}

impl CourierPlan {
    pub fn dropoff_eta(&self, order_id: Uuid) -> Option<DateTime<Utc>> {
        self.stops
            .iter()
            .find(|stop| stop.order_id == order_id && stop.kind == StopKind::Dropoff)
            .map(|stop| stop.eta)
    }
}

/// Outcome of a dispatch decision. Lower score is better.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentResult {
    pub order_id: Uuid,
    pub courier_id: Uuid,
    pub plan: CourierPlan,
    pub score: f64,
}

/// Persisted/broadcast form of an accepted assignment, produced by the
/// coordinator once it applies an `AssignmentResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub id: Uuid,
    pub order_id: Uuid,
    pub courier_id: Uuid,
    pub plan: CourierPlan,
    pub score: f64,
    pub assigned_at: DateTime<Utc>,
}
