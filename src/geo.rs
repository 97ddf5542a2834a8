//! Delivery-radius geofencing and location resolution.
//!
//! A candidate coordinate is accepted when its great-circle distance to the
//! plant is within the configured radius. Accepted coordinates are then
//! reverse-geocoded to a display address; a geocoding failure never undoes
//! the acceptance, it only leaves the address empty.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult, ValidationError};

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    /// Build a coordinate, rejecting non-finite or out-of-range values.
    pub fn new(lat: f64, lng: f64) -> Result<Self, ValidationError> {
        let valid = lat.is_finite()
            && lng.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lng);
        if valid {
            Ok(Self { lat, lng })
        } else {
            Err(ValidationError::InvalidCoordinate { lat, lng })
        }
    }

    /// Parse `lat,lng` as typed on the command line or streamed by a feed.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidCoordinate {
            lat: f64::NAN,
            lng: f64::NAN,
        };
        let (lat, lng) = raw.trim().split_once(',').ok_or_else(invalid)?;
        let lat = lat.trim().parse::<f64>().map_err(|_| invalid())?;
        let lng = lng.trim().parse::<f64>().map_err(|_| invalid())?;
        Self::new(lat, lng)
    }
}

/// Great-circle distance in kilometres.
pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// The plant and the radius it delivers to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeliveryCenter {
    pub center: Coordinate,
    pub radius_km: f64,
}

impl DeliveryCenter {
    pub fn distance_km(&self, point: Coordinate) -> f64 {
        haversine_km(self.center, point)
    }

    /// Accept the point (returning its distance) or reject it as out of range.
    /// A point exactly on the boundary is accepted.
    pub fn check(&self, point: Coordinate) -> AppResult<f64> {
        let distance_km = self.distance_km(point);
        if distance_km > self.radius_km {
            return Err(AppError::OutOfRange {
                distance_km,
                radius_km: self.radius_km,
            });
        }
        Ok(distance_km)
    }
}

/// A forward-search hit. The geocoding proxy returns `lat`/`lon` as strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchHit {
    #[serde(deserialize_with = "crate::geo::number_or_string")]
    pub lat: f64,
    #[serde(alias = "lng", deserialize_with = "crate::geo::number_or_string")]
    pub lon: f64,
    #[serde(default)]
    pub display_name: Option<String>,
}

pub(crate) fn number_or_string<'de, D: serde::Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let raw = serde_json::Value::deserialize(d)?;
    crate::orders::json_number(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("expected a number, got {raw}")))
}

/// Address lookups, served by the backend's geocoding proxy.
pub trait Geocoder: Send + Sync {
    /// Coordinate → human-readable address.
    fn reverse(
        &self,
        point: Coordinate,
        timeout: Duration,
    ) -> impl Future<Output = AppResult<String>> + Send;

    /// Free text → candidate coordinates, best match first.
    fn search(&self, query: &str) -> impl Future<Output = AppResult<Vec<SearchHit>>> + Send;
}

/// An accepted delivery location.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLocation {
    pub lat: f64,
    pub lng: f64,
    /// Empty when reverse geocoding failed.
    pub address: String,
    pub distance_km: f64,
}

impl ResolvedLocation {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate {
            lat: self.lat,
            lng: self.lng,
        }
    }
}

pub struct LocationResolver<'a, G> {
    geocoder: &'a G,
    center: DeliveryCenter,
    reverse_timeout: Duration,
}

impl<'a, G: Geocoder> LocationResolver<'a, G> {
    pub fn new(geocoder: &'a G, center: DeliveryCenter, reverse_timeout: Duration) -> Self {
        Self {
            geocoder,
            center,
            reverse_timeout,
        }
    }

    /// Geofence the coordinate, then reverse-geocode it.
    pub async fn resolve(&self, point: Coordinate) -> AppResult<ResolvedLocation> {
        let distance_km = self.center.check(point)?;

        let lookup = self.geocoder.reverse(point, self.reverse_timeout);
        let reversed = tokio::time::timeout(self.reverse_timeout, lookup)
            .await
            .unwrap_or_else(|_| Err(AppError::Timeout("location/reverse".into())));
        let address = match reversed {
            Ok(address) => address,
            Err(e) => {
                warn!(lat = point.lat, lng = point.lng, error = %e, "Reverse geocoding failed");
                String::new()
            }
        };

        info!(
            lat = point.lat,
            lng = point.lng,
            distance_km = %format!("{distance_km:.2}"),
            "Delivery location accepted"
        );
        Ok(ResolvedLocation {
            lat: point.lat,
            lng: point.lng,
            address,
            distance_km,
        })
    }

    /// Search an address and resolve the first hit. Returns `Ok(None)` for a
    /// blank query.
    pub async fn search(&self, query: &str) -> AppResult<Option<ResolvedLocation>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }

        let hits = self.geocoder.search(query).await.map_err(|e| {
            warn!(query, error = %e, "Address search failed");
            AppError::Network("Search failed. Try again.".into())
        })?;
        debug!(query, hits = hits.len(), "Address search returned");

        let first = hits
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound("Address not found within delivery area.".into()))?;
        let point = Coordinate::new(first.lat, first.lon)?;
        self.resolve(point).await.map(Some)
    }
}
