use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum CourierStatus {
    Online,
    OnBreak,
    Offline,
}

/// Snapshot of a courier as seen by one dispatch decision. The engine only
/// reads these; `assigned_open_order_ids` is updated by the caller after a
/// successful assignment, never by the engine itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchCourier {
    pub id: Uuid,
    pub name: String,
    pub current_location: GeoPoint,
    pub status: CourierStatus,
    pub shift_end_at: DateTime<Utc>,
    pub completed_orders_today: u32,
    pub assigned_open_order_ids: Vec<Uuid>,
    pub zone_id: Option<String>,
}

impl DispatchCourier {
    /// Total load if this courier accepted one more order.
    pub fn load_after_assignment(&self) -> u32 {
        self.completed_orders_today + self.assigned_open_order_ids.len() as u32 + 1
    }
}
