use std::collections::HashMap;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::models::courier::DispatchCourier;
use crate::models::order::{DispatchOrder, OrderStatus};
use crate::models::plan::AssignmentRecord;
use crate::observability::metrics::Metrics;

/// In-memory state owned by the dispatch coordinator: the courier fleet, the
/// open orders, accepted assignment records, the order intake queue, and the
/// assignment event broadcast consumed by notification boundaries.
pub struct DispatchState {
    pub couriers: DashMap<Uuid, DispatchCourier>,
    pub orders: DashMap<Uuid, DispatchOrder>,
    pub assignments: DashMap<Uuid, AssignmentRecord>,
    pub order_tx: mpsc::Sender<DispatchOrder>,
    pub assignment_events_tx: broadcast::Sender<AssignmentRecord>,
    pub metrics: Metrics,
}

impl DispatchState {
    pub fn new(
        order_queue_size: usize,
        event_buffer_size: usize,
    ) -> (Self, mpsc::Receiver<DispatchOrder>) {
        let (order_tx, order_rx) = mpsc::channel(order_queue_size);
        let (assignment_events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        (
            Self {
                couriers: DashMap::new(),
                orders: DashMap::new(),
                assignments: DashMap::new(),
                order_tx,
                assignment_events_tx,
                metrics: Metrics::new(),
            },
            order_rx,
        )
    }

    /// Snapshot of the fleet in ascending id order, so every decision sees
    /// the couriers in the same sequence.
    pub fn courier_snapshot(&self) -> Vec<DispatchCourier> {
        let mut couriers: Vec<_> = self
            .couriers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        couriers.sort_by_key(|courier| courier.id);
        couriers
    }

    pub fn order_snapshot(&self) -> HashMap<Uuid, DispatchOrder> {
        self.orders
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    /// Orders still awaiting assignment, oldest first.
    pub fn unassigned_orders(&self) -> Vec<DispatchOrder> {
        let mut pending: Vec<_> = self
            .orders
            .iter()
            .filter(|entry| entry.value().status == OrderStatus::Unassigned)
            .map(|entry| entry.value().clone())
            .collect();
        pending.sort_by_key(|order| (order.created_at, order.id));
        pending
    }
}
