use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::courier::GeoPoint;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum OrderStatus {
    Unassigned,
    Assigned,
}

/// A delivery order as presented to the dispatch engine. `deadline_at` is the
/// hard SLA cutoff, resolved upstream from the order's SLA figure; the engine
/// never re-derives it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchOrder {
    pub id: Uuid,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub created_at: DateTime<Utc>,
    pub deadline_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub zone_id: Option<String>,
}
