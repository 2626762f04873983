//! Dispatch coordinator: the boundary between the engine and whatever owns
//! persistence. Builds orders (resolving the SLA deadline), feeds the engine
//! from queue or sweep, and applies accepted assignments to the in-memory
//! state before the next order is evaluated.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::DispatchEngine;
use crate::error::DispatchError;
use crate::models::courier::GeoPoint;
use crate::models::order::{DispatchOrder, OrderStatus};
use crate::models::plan::{AssignmentRecord, AssignmentResult};
use crate::state::DispatchState;

pub struct Coordinator {
    state: Arc<DispatchState>,
    engine: Arc<DispatchEngine>,
}

impl Coordinator {
    pub fn new(state: Arc<DispatchState>, engine: Arc<DispatchEngine>) -> Self {
        Self { state, engine }
    }

    pub fn state(&self) -> &Arc<DispatchState> {
        &self.state
    }

    /// Builds an order and enqueues it for dispatch. `sla_hours` is the
    /// figure resolved from the caller's SLA configuration record; when no
    /// record exists the engine config's `sla_hours` is the fallback.
    pub async fn submit_order(
        &self,
        pickup: GeoPoint,
        dropoff: GeoPoint,
        zone_id: Option<String>,
        sla_hours: Option<f64>,
    ) -> Result<DispatchOrder, DispatchError> {
        let created_at = Utc::now();
        let hours = sla_hours.unwrap_or(self.engine.config().sla_hours);
        let deadline_at =
            created_at + Duration::milliseconds((hours * 3_600_000.0).round() as i64);

        let order = DispatchOrder {
            id: Uuid::new_v4(),
            pickup,
            dropoff,
            created_at,
            deadline_at,
            status: OrderStatus::Unassigned,
            zone_id,
        };

        self.state.orders.insert(order.id, order.clone());
        self.state
            .order_tx
            .send(order.clone())
            .await
            .map_err(|err| DispatchError::QueueSend(err.to_string()))?;
        self.state.metrics.orders_in_queue.inc();

        Ok(order)
    }

    /// Runs one queued order through the engine against fresh snapshots.
    pub async fn dispatch_order(&self, order: DispatchOrder) -> Option<AssignmentResult> {
        let now = Utc::now();
        let start = Instant::now();

        let couriers = self.state.courier_snapshot();
        let all_orders = self.state.order_snapshot();
        // Prefer the stored copy; the queued one may be stale by now.
        let current = all_orders.get(&order.id).cloned().unwrap_or(order);

        let outcome = self
            .engine
            .assign_new_order(&current, &all_orders, &couriers, now)
            .await;

        let elapsed = start.elapsed().as_secs_f64();
        let label = if outcome.is_some() { "assigned" } else { "unassigned" };
        self.state
            .metrics
            .decision_latency_seconds
            .with_label_values(&[label])
            .observe(elapsed);
        self.state
            .metrics
            .decisions_total
            .with_label_values(&[label])
            .inc();

        if let Some(assignment) = &outcome {
            self.apply_assignment(assignment);
        } else {
            warn!(
                order_id = %current.id,
                "order left unassigned for a later dispatch cycle"
            );
        }

        outcome
    }

    /// The "later dispatch cycle": sweeps every order still unassigned
    /// through `assign_batch` and applies the results.
    pub async fn dispatch_pending(&self, now: DateTime<Utc>) -> Vec<AssignmentResult> {
        let pending = self.state.unassigned_orders();
        if pending.is_empty() {
            return Vec::new();
        }

        let couriers = self.state.courier_snapshot();
        let all_orders = self.state.order_snapshot();

        let results = self
            .engine
            .assign_batch(&pending, &all_orders, &couriers, now)
            .await;

        for assignment in &results {
            self.apply_assignment(assignment);
        }
        info!(
            swept = pending.len(),
            assigned = results.len(),
            "pending dispatch sweep finished"
        );

        results
    }

    /// Applies one accepted assignment: the order is marked assigned, the
    /// courier's open set grows, a record is stored and broadcast. This runs
    /// before the next order in a batch is evaluated, which is what keeps a
    /// courier from being double-booked.
    pub fn apply_assignment(&self, assignment: &AssignmentResult) {
        if let Some(mut order) = self.state.orders.get_mut(&assignment.order_id) {
            order.status = OrderStatus::Assigned;
        }

        if let Some(mut courier) = self.state.couriers.get_mut(&assignment.courier_id) {
            if !courier.assigned_open_order_ids.contains(&assignment.order_id) {
                courier.assigned_open_order_ids.push(assignment.order_id);
            }
            self.state
                .metrics
                .courier_open_orders
                .with_label_values(&[&assignment.courier_id.to_string()])
                .set(courier.assigned_open_order_ids.len() as f64);
        }

        let record = AssignmentRecord {
            id: Uuid::new_v4(),
            order_id: assignment.order_id,
            courier_id: assignment.courier_id,
            plan: assignment.plan.clone(),
            score: assignment.score,
            assigned_at: Utc::now(),
        };
        self.state.assignments.insert(record.id, record.clone());
        let _ = self.state.assignment_events_tx.send(record);

        info!(
            order_id = %assignment.order_id,
            courier_id = %assignment.courier_id,
            score = assignment.score,
            "assignment applied"
        );
    }
}

/// Queue-driven dispatch loop; run as a tokio task. Ends when the intake
/// channel closes.
pub async fn run_dispatch_loop(
    coordinator: Arc<Coordinator>,
    mut order_rx: mpsc::Receiver<DispatchOrder>,
) {
    info!("dispatch loop started");

    while let Some(order) = order_rx.recv().await {
        coordinator.state.metrics.orders_in_queue.dec();
        coordinator.dispatch_order(order).await;
    }

    warn!("dispatch loop stopped: queue channel closed");
}
