use std::env;

use crate::error::DispatchError;

#[derive(Debug, Clone, Copy)]
pub struct PenaltyWeights {
    pub distance: f64,
    pub fairness: f64,
    pub overload: f64,
    pub sla: f64,
}

/// Tunable thresholds and penalty weights for one dispatch engine instance.
/// Immutable once the engine is constructed.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub max_haversine_radius_km: f64,
    pub max_pickup_eta_minutes: f64,
    pub average_speed_kmh: f64,
    pub sla_hours: f64,
    pub sla_buffer_minutes: f64,
    pub target_orders_per_courier_per_day: u32,
    pub max_concurrent_route_requests: usize,
    pub order_queue_size: usize,
    pub event_buffer_size: usize,
    pub penalties: PenaltyWeights,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_haversine_radius_km: 10.0,
            max_pickup_eta_minutes: 30.0,
            average_speed_kmh: 40.0,
            sla_hours: 4.0,
            sla_buffer_minutes: 15.0,
            target_orders_per_courier_per_day: 12,
            max_concurrent_route_requests: 8,
            order_queue_size: 1024,
            event_buffer_size: 1024,
            penalties: PenaltyWeights {
                distance: 1.0,
                fairness: 2.0,
                overload: 5.0,
                sla: 0.5,
            },
        }
    }
}

impl DispatchConfig {
    pub fn from_env() -> Result<Self, DispatchError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        Ok(Self {
            max_haversine_radius_km: parse_or_default(
                "MAX_HAVERSINE_RADIUS_KM",
                defaults.max_haversine_radius_km,
            )?,
            max_pickup_eta_minutes: parse_or_default(
                "MAX_PICKUP_ETA_MINUTES",
                defaults.max_pickup_eta_minutes,
            )?,
            average_speed_kmh: parse_or_default("AVERAGE_SPEED_KMH", defaults.average_speed_kmh)?,
            sla_hours: parse_or_default("SLA_HOURS", defaults.sla_hours)?,
            sla_buffer_minutes: parse_or_default("SLA_BUFFER_MINUTES", defaults.sla_buffer_minutes)?,
            target_orders_per_courier_per_day: parse_or_default(
                "TARGET_ORDERS_PER_COURIER",
                defaults.target_orders_per_courier_per_day,
            )?,
            max_concurrent_route_requests: parse_or_default(
                "MAX_CONCURRENT_ROUTE_REQUESTS",
                defaults.max_concurrent_route_requests,
            )?,
            order_queue_size: parse_or_default("ORDER_QUEUE_SIZE", defaults.order_queue_size)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            penalties: PenaltyWeights {
                distance: parse_or_default("PENALTY_DISTANCE", defaults.penalties.distance)?,
                fairness: parse_or_default("PENALTY_FAIRNESS", defaults.penalties.fairness)?,
                overload: parse_or_default("PENALTY_OVERLOAD", defaults.penalties.overload)?,
                sla: parse_or_default("PENALTY_SLA", defaults.penalties.sla)?,
            },
        })
    }

    /// Rejects values that would make ETA arithmetic or scoring nonsensical.
    /// Called at engine construction, never later.
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.average_speed_kmh <= 0.0 {
            return Err(DispatchError::InvalidConfig(format!(
                "average_speed_kmh must be positive, got {}",
                self.average_speed_kmh
            )));
        }
        if self.sla_hours <= 0.0 {
            return Err(DispatchError::InvalidConfig(format!(
                "sla_hours must be positive, got {}",
                self.sla_hours
            )));
        }
        if self.max_haversine_radius_km <= 0.0 {
            return Err(DispatchError::InvalidConfig(format!(
                "max_haversine_radius_km must be positive, got {}",
                self.max_haversine_radius_km
            )));
        }
        if self.max_pickup_eta_minutes <= 0.0 {
            return Err(DispatchError::InvalidConfig(format!(
                "max_pickup_eta_minutes must be positive, got {}",
                self.max_pickup_eta_minutes
            )));
        }
        if self.sla_buffer_minutes < 0.0 {
            return Err(DispatchError::InvalidConfig(format!(
                "sla_buffer_minutes must not be negative, got {}",
                self.sla_buffer_minutes
            )));
        }
        if self.max_concurrent_route_requests == 0 {
            return Err(DispatchError::InvalidConfig(
                "max_concurrent_route_requests must be at least 1".to_string(),
            ));
        }
        let weights = [
            ("distance", self.penalties.distance),
            ("fairness", self.penalties.fairness),
            ("overload", self.penalties.overload),
            ("sla", self.penalties.sla),
        ];
        for (name, weight) in weights {
            if weight < 0.0 {
                return Err(DispatchError::InvalidConfig(format!(
                    "penalty weight {name} must not be negative, got {weight}"
                )));
            }
        }
        Ok(())
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, DispatchError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| DispatchError::InvalidConfig(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::DispatchConfig;

    #[test]
    fn default_config_is_valid() {
        assert!(DispatchConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_speed_is_rejected() {
        let config = DispatchConfig {
            average_speed_kmh: 0.0,
            ..DispatchConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn negative_sla_hours_is_rejected() {
        let config = DispatchConfig {
            sla_hours: -1.0,
            ..DispatchConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn negative_penalty_weight_is_rejected() {
        let mut config = DispatchConfig::default();
        config.penalties.overload = -3.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_worker_pool_is_rejected() {
        let config = DispatchConfig {
            max_concurrent_route_requests: 0,
            ..DispatchConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
