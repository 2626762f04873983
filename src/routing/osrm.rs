//! OSRM HTTP adapter for the routing provider seam.
//!
//! Uses `/table` for travel-time matrices and `/trip` (or `/route` when the
//! waypoint order is fixed) for concrete routes. OSRM has no notion of a
//! departure time, so the `at` argument is ignored here.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::models::courier::GeoPoint;
use crate::routing::{Route, RouteLeg, RoutingError, RoutingProvider, TravelTimeMatrix};

#[derive(Debug, Clone)]
pub struct OsrmConfig {
    pub base_url: String,
    pub profile: String,
    pub timeout_secs: u64,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            profile: "car".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OsrmRouter {
    config: OsrmConfig,
    client: reqwest::Client,
}

impl OsrmRouter {
    pub fn new(config: OsrmConfig) -> Result<Self, RoutingError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    fn coord_segment<'a>(points: impl Iterator<Item = &'a GeoPoint>) -> String {
        points
            .map(|point| format!("{:.6},{:.6}", point.lng, point.lat))
            .collect::<Vec<_>>()
            .join(";")
    }
}

#[async_trait]
impl RoutingProvider for OsrmRouter {
    async fn travel_times(
        &self,
        origins: &[GeoPoint],
        destinations: &[GeoPoint],
        _at: DateTime<Utc>,
    ) -> Result<TravelTimeMatrix, RoutingError> {
        if origins.is_empty() || destinations.is_empty() {
            return Ok(TravelTimeMatrix::default());
        }

        let coords = Self::coord_segment(origins.iter().chain(destinations.iter()));
        let sources = (0..origins.len())
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(";");
        let dests = (origins.len()..origins.len() + destinations.len())
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(";");

        let url = format!(
            "{}/table/v1/{}/{}?annotations=duration&sources={}&destinations={}",
            self.config.base_url, self.config.profile, coords, sources, dests
        );

        let response = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<OsrmTableResponse>()
            .await?;

        if response.code != "Ok" {
            return Err(RoutingError::Api(response.code));
        }

        let durations = response
            .durations
            .ok_or_else(|| RoutingError::Malformed("table response without durations".to_string()))?;

        Ok(table_to_matrix(durations))
    }

    async fn route(
        &self,
        origin: GeoPoint,
        waypoints: &[GeoPoint],
        _at: DateTime<Utc>,
        optimize_order: bool,
    ) -> Result<Route, RoutingError> {
        if waypoints.is_empty() {
            return Ok(Route::default());
        }

        let coords = Self::coord_segment(std::iter::once(&origin).chain(waypoints.iter()));

        if optimize_order {
            let url = format!(
                "{}/trip/v1/{}/{}?roundtrip=false&source=first&overview=full&geometries=polyline",
                self.config.base_url, self.config.profile, coords
            );
            let response = self
                .client
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .json::<OsrmTripResponse>()
                .await?;
            trip_to_route(response)
        } else {
            let url = format!(
                "{}/route/v1/{}/{}?overview=full&geometries=polyline",
                self.config.base_url, self.config.profile, coords
            );
            let response = self
                .client
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .json::<OsrmRouteResponse>()
                .await?;
            route_to_route(response)
        }
    }
}

// OSRM reports null for unreachable pairs; the engine treats non-positive
// entries as "no route", so nulls are mapped to -1.0.
fn table_to_matrix(durations_seconds: Vec<Vec<Option<f64>>>) -> TravelTimeMatrix {
    let durations_minutes = durations_seconds
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|entry| match entry {
                    Some(seconds) => seconds / 60.0,
                    None => -1.0,
                })
                .collect()
        })
        .collect();

    TravelTimeMatrix { durations_minutes }
}

fn trip_to_route(response: OsrmTripResponse) -> Result<Route, RoutingError> {
    if response.code != "Ok" {
        // "NoTrips" and friends mean the candidate is unroutable, not broken.
        return Ok(Route::default());
    }

    let Some(trip) = response.trips.unwrap_or_default().into_iter().next() else {
        return Ok(Route::default());
    };

    let mut visits = response.waypoints.unwrap_or_default();
    visits.sort_by_key(|waypoint| waypoint.waypoint_index);

    if visits.len() != trip.legs.len() + 1 {
        return Err(RoutingError::Malformed(format!(
            "trip has {} legs but {} waypoints",
            trip.legs.len(),
            visits.len()
        )));
    }

    let legs = trip
        .legs
        .iter()
        .zip(visits.iter().skip(1))
        .map(|(leg, visit)| RouteLeg {
            to_point: GeoPoint {
                lat: visit.location[1],
                lng: visit.location[0],
            },
            duration_minutes: leg.duration / 60.0,
            distance_km: leg.distance / 1000.0,
        })
        .collect();

    Ok(Route {
        legs,
        polyline: trip.geometry,
        total_distance_km: trip.distance / 1000.0,
        total_duration_minutes: trip.duration / 60.0,
    })
}

fn route_to_route(response: OsrmRouteResponse) -> Result<Route, RoutingError> {
    if response.code != "Ok" {
        return Ok(Route::default());
    }

    let Some(route) = response.routes.unwrap_or_default().into_iter().next() else {
        return Ok(Route::default());
    };

    let visits = response.waypoints.unwrap_or_default();
    if visits.len() != route.legs.len() + 1 {
        return Err(RoutingError::Malformed(format!(
            "route has {} legs but {} waypoints",
            route.legs.len(),
            visits.len()
        )));
    }

    let legs = route
        .legs
        .iter()
        .zip(visits.iter().skip(1))
        .map(|(leg, visit)| RouteLeg {
            to_point: GeoPoint {
                lat: visit.location[1],
                lng: visit.location[0],
            },
            duration_minutes: leg.duration / 60.0,
            distance_km: leg.distance / 1000.0,
        })
        .collect();

    Ok(Route {
        legs,
        polyline: route.geometry,
        total_distance_km: route.distance / 1000.0,
        total_duration_minutes: route.duration / 60.0,
    })
}

#[derive(Debug, Deserialize)]
struct OsrmTableResponse {
    code: String,
    durations: Option<Vec<Vec<Option<f64>>>>,
}

#[derive(Debug, Deserialize)]
struct OsrmRouteResponse {
    code: String,
    routes: Option<Vec<OsrmRouteBody>>,
    waypoints: Option<Vec<OsrmWaypoint>>,
}

#[derive(Debug, Deserialize)]
struct OsrmTripResponse {
    code: String,
    trips: Option<Vec<OsrmRouteBody>>,
    waypoints: Option<Vec<OsrmTripWaypoint>>,
}

#[derive(Debug, Deserialize)]
struct OsrmRouteBody {
    legs: Vec<OsrmLeg>,
    distance: f64,
    duration: f64,
    geometry: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OsrmLeg {
    distance: f64,
    duration: f64,
}

#[derive(Debug, Deserialize)]
struct OsrmWaypoint {
    location: [f64; 2],
}

#[derive(Debug, Deserialize)]
struct OsrmTripWaypoint {
    waypoint_index: usize,
    location: [f64; 2],
}

#[cfg(test)]
mod tests {
    use super::{OsrmRouter, OsrmTableResponse, OsrmTripResponse, table_to_matrix, trip_to_route};
    use crate::models::courier::GeoPoint;

    #[test]
    fn coord_segment_is_lng_lat_ordered() {
        let points = vec![
            GeoPoint {
                lat: 24.71,
                lng: 46.67,
            },
            GeoPoint {
                lat: 24.69,
                lng: 46.72,
            },
        ];
        let segment = OsrmRouter::coord_segment(points.iter());
        assert_eq!(segment, "46.670000,24.710000;46.720000,24.690000");
    }

    #[test]
    fn null_table_entries_become_negative() {
        let raw = r#"{"code":"Ok","durations":[[120.0,null],[60.0,300.0]]}"#;
        let response: OsrmTableResponse = serde_json::from_str(raw).unwrap();
        let matrix = table_to_matrix(response.durations.unwrap());

        assert_eq!(matrix.minutes(0, 0), Some(2.0));
        assert_eq!(matrix.minutes(0, 1), Some(-1.0));
        assert_eq!(matrix.minutes(1, 1), Some(5.0));
        assert_eq!(matrix.minutes(2, 0), None);
    }

    #[test]
    fn trip_response_maps_legs_to_visit_order() {
        let raw = r#"{
            "code": "Ok",
            "trips": [{
                "legs": [
                    {"distance": 1000.0, "duration": 120.0},
                    {"distance": 2000.0, "duration": 240.0}
                ],
                "distance": 3000.0,
                "duration": 360.0,
                "geometry": "abc123"
            }],
            "waypoints": [
                {"waypoint_index": 0, "location": [46.68, 24.70]},
                {"waypoint_index": 2, "location": [46.72, 24.69]},
                {"waypoint_index": 1, "location": [46.67, 24.71]}
            ]
        }"#;
        let response: OsrmTripResponse = serde_json::from_str(raw).unwrap();
        let route = trip_to_route(response).unwrap();

        assert_eq!(route.legs.len(), 2);
        // Second listed waypoint has visit index 2, so the first leg goes to
        // the third listed waypoint (visit index 1).
        assert!((route.legs[0].to_point.lat - 24.71).abs() < 1e-9);
        assert!((route.legs[1].to_point.lat - 24.69).abs() < 1e-9);
        assert!((route.legs[0].duration_minutes - 2.0).abs() < 1e-9);
        assert!((route.total_distance_km - 3.0).abs() < 1e-9);
        assert_eq!(route.polyline.as_deref(), Some("abc123"));
    }

    #[test]
    fn no_trips_means_unroutable_not_error() {
        let raw = r#"{"code":"NoTrips","trips":[],"waypoints":[]}"#;
        let response: OsrmTripResponse = serde_json::from_str(raw).unwrap();
        let route = trip_to_route(response).unwrap();
        assert!(route.legs.is_empty());
    }
}
