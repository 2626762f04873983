use crate::config::DispatchConfig;
use crate::models::courier::DispatchCourier;
use crate::models::plan::CourierPlan;

#[derive(Debug, Clone, Copy)]
pub struct ScoreBreakdown {
    pub distance_penalty: f64,
    pub fairness_penalty: f64,
    pub overload_penalty: f64,
    pub sla_penalty: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.distance_penalty + self.fairness_penalty + self.overload_penalty + self.sla_penalty
    }
}

/// Scores a surviving plan; lower is better. `min_slack_minutes` is the
/// smallest deadline margin across the plan's dropoffs.
pub fn compute_score(
    config: &DispatchConfig,
    courier: &DispatchCourier,
    plan: &CourierPlan,
    min_slack_minutes: f64,
) -> (f64, ScoreBreakdown) {
    let load_after = courier.load_after_assignment() as f64;
    let target = config.target_orders_per_courier_per_day as f64;

    let breakdown = ScoreBreakdown {
        distance_penalty: config.penalties.distance * plan.total_distance_km,
        fairness_penalty: config.penalties.fairness * (load_after - target).abs(),
        overload_penalty: config.penalties.overload * (load_after - target).max(0.0),
        sla_penalty: config.penalties.sla
            * (config.sla_buffer_minutes - min_slack_minutes).max(0.0),
    };

    (breakdown.total(), breakdown)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use super::compute_score;
    use crate::config::DispatchConfig;
    use crate::models::courier::{CourierStatus, DispatchCourier, GeoPoint};
    use crate::models::plan::CourierPlan;

    fn courier(completed: u32, open: usize) -> DispatchCourier {
        DispatchCourier {
            id: Uuid::from_u128(1),
            name: "test-courier".to_string(),
            current_location: GeoPoint {
                lat: 24.70,
                lng: 46.68,
            },
            status: CourierStatus::Online,
            shift_end_at: Utc.with_ymd_and_hms(2025, 6, 1, 22, 0, 0).unwrap(),
            completed_orders_today: completed,
            assigned_open_order_ids: (0..open).map(|i| Uuid::from_u128(100 + i as u128)).collect(),
            zone_id: None,
        }
    }

    fn plan(total_distance_km: f64) -> CourierPlan {
        CourierPlan {
            courier_id: Uuid::from_u128(1),
            stops: Vec::new(),
            polyline: None,
            total_distance_km,
            total_duration_minutes: total_distance_km / 40.0 * 60.0,
        }
    }

    #[test]
    fn longer_plans_score_worse() {
        let config = DispatchConfig::default();
        let courier = courier(0, 0);

        let (short, _) = compute_score(&config, &courier, &plan(5.0), 60.0);
        let (long, _) = compute_score(&config, &courier, &plan(25.0), 60.0);

        assert!(short < long);
    }

    #[test]
    fn overload_kicks_in_only_past_target() {
        let config = DispatchConfig::default();
        let below_target = courier(2, 0);
        let above_target = courier(15, 0);

        let (_, below) = compute_score(&config, &below_target, &plan(5.0), 60.0);
        let (_, above) = compute_score(&config, &above_target, &plan(5.0), 60.0);

        assert_eq!(below.overload_penalty, 0.0);
        assert!(above.overload_penalty > 0.0);
    }

    #[test]
    fn fairness_penalizes_deviation_in_both_directions() {
        let config = DispatchConfig::default();
        let idle = courier(0, 0);
        let on_target = courier(11, 0);

        let (_, idle_breakdown) = compute_score(&config, &idle, &plan(5.0), 60.0);
        let (_, on_target_breakdown) = compute_score(&config, &on_target, &plan(5.0), 60.0);

        assert!(idle_breakdown.fairness_penalty > on_target_breakdown.fairness_penalty);
        assert_eq!(on_target_breakdown.fairness_penalty, 0.0);
    }

    #[test]
    fn slack_above_buffer_costs_nothing() {
        let config = DispatchConfig::default();
        let courier = courier(0, 0);

        let (_, comfortable) = compute_score(&config, &courier, &plan(5.0), 60.0);
        let (_, tight) = compute_score(&config, &courier, &plan(5.0), 5.0);

        assert_eq!(comfortable.sla_penalty, 0.0);
        assert!(tight.sla_penalty > 0.0);
    }
}
