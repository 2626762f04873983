//! The dispatch funnel entry points.
//!
//! `assign_new_order` runs one order through the four layers; `assign_batch`
//! runs a sequence of orders with read-after-write consistency on its own
//! working copies and per-order failure isolation.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::geo::haversine_km;
use crate::models::courier::{CourierStatus, DispatchCourier};
use crate::models::order::{DispatchOrder, OrderStatus};
use crate::models::plan::AssignmentResult;

use super::DispatchEngine;

impl DispatchEngine {
    /// Decides which courier, if any, gets `order`. `all_orders` is the
    /// snapshot of currently open orders keyed by id (needed to reconstruct
    /// existing courier loads); `couriers` the operationally active fleet.
    ///
    /// Returns `None` for every no-candidate outcome: already-assigned or
    /// expired order, or an empty survivor set after any layer.
    pub async fn assign_new_order(
        &self,
        order: &DispatchOrder,
        all_orders: &HashMap<Uuid, DispatchOrder>,
        couriers: &[DispatchCourier],
        now: DateTime<Utc>,
    ) -> Option<AssignmentResult> {
        if order.status != OrderStatus::Unassigned {
            debug!(order_id = %order.id, "order is not unassigned; nothing to do");
            return None;
        }
        if order.deadline_at <= now {
            debug!(
                order_id = %order.id,
                deadline = %order.deadline_at,
                "order deadline already passed; nothing to do"
            );
            return None;
        }

        let local = self.local_candidates(order, couriers, now);
        if local.is_empty() {
            info!(order_id = %order.id, "no couriers survive the local filter");
            return None;
        }

        let reachable = self.eta_candidates(order, local, now).await;
        if reachable.is_empty() {
            info!(order_id = %order.id, "no couriers within pickup ETA threshold");
            return None;
        }

        let feasible: Vec<&DispatchCourier> = reachable
            .into_iter()
            .filter(|courier| self.passes_feasibility(courier, order, all_orders, now))
            .collect();
        if feasible.is_empty() {
            info!(order_id = %order.id, "no courier load survives the feasibility simulation");
            return None;
        }

        let result = self.best_plan(order, &feasible, all_orders, now).await;
        match &result {
            Some(assignment) => info!(
                order_id = %order.id,
                courier_id = %assignment.courier_id,
                score = assignment.score,
                "courier selected"
            ),
            None => info!(order_id = %order.id, "no feasible plan survived routing"),
        }
        result
    }

    /// Layer 1: cheap in-process elimination. Keeps couriers that are online,
    /// still on shift, zone-compatible, and within the Haversine radius of
    /// the pickup.
    fn local_candidates<'a>(
        &self,
        order: &DispatchOrder,
        couriers: &'a [DispatchCourier],
        now: DateTime<Utc>,
    ) -> Vec<&'a DispatchCourier> {
        couriers
            .iter()
            .filter(|courier| {
                if courier.status != CourierStatus::Online {
                    return false;
                }
                if courier.shift_end_at <= now {
                    return false;
                }
                if let (Some(order_zone), Some(courier_zone)) = (&order.zone_id, &courier.zone_id) {
                    if order_zone != courier_zone {
                        return false;
                    }
                }
                haversine_km(&courier.current_location, &order.pickup)
                    <= self.config.max_haversine_radius_km
            })
            .collect()
    }

    /// Layer 2: one batched travel-time call for all remaining couriers. An
    /// entry that is missing or non-positive is invalid data, never "instant
    /// arrival", so those couriers are dropped along with anyone past the
    /// pickup ETA threshold.
    async fn eta_candidates<'a>(
        &self,
        order: &DispatchOrder,
        candidates: Vec<&'a DispatchCourier>,
        now: DateTime<Utc>,
    ) -> Vec<&'a DispatchCourier> {
        let origins: Vec<_> = candidates
            .iter()
            .map(|courier| courier.current_location)
            .collect();

        let matrix = match self
            .provider
            .travel_times(&origins, &[order.pickup], now)
            .await
        {
            Ok(matrix) => matrix,
            Err(err) => {
                warn!(
                    order_id = %order.id,
                    error = %err,
                    "travel time lookup failed; dropping all candidates"
                );
                return Vec::new();
            }
        };

        candidates
            .into_iter()
            .enumerate()
            .filter(|(idx, courier)| match matrix.minutes(*idx, 0) {
                Some(eta) if eta > 0.0 && eta <= self.config.max_pickup_eta_minutes => true,
                Some(eta) => {
                    debug!(
                        order_id = %order.id,
                        courier_id = %courier.id,
                        eta_minutes = eta,
                        "pickup ETA invalid or over threshold"
                    );
                    false
                }
                None => {
                    debug!(
                        order_id = %order.id,
                        courier_id = %courier.id,
                        "travel time entry missing"
                    );
                    false
                }
            })
            .map(|(_, courier)| courier)
            .collect()
    }

    /// Runs `orders` through the funnel one at a time. Each accepted
    /// assignment is applied to this call's working copies before the next
    /// order is evaluated, so a courier's growing load is visible within the
    /// batch. A panicking evaluation is caught and logged; that order is
    /// simply absent from the result. Deliberately sequential: evaluating two
    /// orders concurrently against the same courier could double-book it.
    pub async fn assign_batch(
        &self,
        orders: &[DispatchOrder],
        all_orders: &HashMap<Uuid, DispatchOrder>,
        couriers: &[DispatchCourier],
        now: DateTime<Utc>,
    ) -> Vec<AssignmentResult> {
        let mut working_orders = all_orders.clone();
        for order in orders {
            working_orders
                .entry(order.id)
                .or_insert_with(|| order.clone());
        }
        let mut working_couriers: Vec<DispatchCourier> = couriers.to_vec();
        let mut results = Vec::new();

        for order in orders {
            let Some(current) = working_orders.get(&order.id).cloned() else {
                continue;
            };

            let outcome = AssertUnwindSafe(self.assign_new_order(
                &current,
                &working_orders,
                &working_couriers,
                now,
            ))
            .catch_unwind()
            .await;

            match outcome {
                Ok(Some(assignment)) => {
                    if let Some(entry) = working_orders.get_mut(&assignment.order_id) {
                        entry.status = OrderStatus::Assigned;
                    }
                    if let Some(courier) = working_couriers
                        .iter_mut()
                        .find(|courier| courier.id == assignment.courier_id)
                    {
                        courier.assigned_open_order_ids.push(assignment.order_id);
                    }
                    results.push(assignment);
                }
                Ok(None) => {}
                Err(_) => {
                    error!(
                        order_id = %order.id,
                        "order evaluation panicked; continuing with remaining orders"
                    );
                }
            }
        }

        results
    }
}
