//! Application configuration.
//!
//! One `AppConfig` is built at startup (defaults → `config.json` → env
//! overrides) and shared through `AppState`. Prices, the delivery center and
//! the poll intervals live here and nowhere else.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::geo::{Coordinate, DeliveryCenter};

pub const CONFIG_FILE: &str = "config.json";

const ENV_API_URL: &str = "PUREDROP_API_URL";
const ENV_ROUTING_URL: &str = "PUREDROP_ROUTING_URL";
const ENV_RADIUS_KM: &str = "PUREDROP_RADIUS_KM";

/// Upper bound on the stored session lifetime (one year).
const MAX_SESSION_TTL_HOURS: i64 = 24 * 366;

/// Backend endpoint paths, relative to `api_base_url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Endpoints {
    pub login: String,
    pub register: String,
    pub create_order: String,
    pub all_orders: String,
    /// Order id is appended.
    pub update_status: String,
    /// Mobile number is appended as the query value.
    pub orders_by_mobile: String,
    /// Mobile number is appended.
    pub user_active_status: String,
    pub reverse_geocode: String,
    pub search_address: String,
    /// Order id is appended.
    pub order_location: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login: "User/login".into(),
            register: "User/register".into(),
            create_order: "Order/create".into(),
            all_orders: "Order/all".into(),
            update_status: "Order/status/".into(),
            orders_by_mobile: "Order/by-mobile?mobileNumber".into(),
            user_active_status: "User/active-status/".into(),
            reverse_geocode: "location/reverse".into(),
            search_address: "location/search".into(),
            order_location: "location/order-location/".into(),
        }
    }
}

/// Unit prices in whole rupees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Pricing {
    pub normal_unit_price: u32,
    pub cool_unit_price: u32,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            normal_unit_price: 20,
            cool_unit_price: 40,
        }
    }
}

impl Pricing {
    pub fn total(&self, normal_qty: u32, cool_qty: u32) -> u64 {
        (u64::from(normal_qty) * u64::from(self.normal_unit_price))
            .saturating_add(u64::from(cool_qty) * u64::from(self.cool_unit_price))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    pub api_base_url: String,
    pub routing_base_url: String,
    pub endpoints: Endpoints,
    pub pricing: Pricing,
    pub delivery_center_lat: f64,
    pub delivery_center_lng: f64,
    pub delivery_radius_km: f64,
    pub dashboard_poll_secs: u64,
    pub route_refresh_secs: u64,
    pub reverse_geocode_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub orders_page_size: usize,
    pub user_orders_page_size: usize,
    pub session_ttl_hours: i64,
    /// `text` or `json` console log output.
    pub log_format: String,
    pub plant_name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000/api/".into(),
            routing_base_url: "https://router.project-osrm.org".into(),
            endpoints: Endpoints::default(),
            pricing: Pricing::default(),
            delivery_center_lat: 16.531837,
            delivery_center_lng: 81.973862,
            delivery_radius_km: 5.0,
            dashboard_poll_secs: 5,
            route_refresh_secs: 10,
            reverse_geocode_timeout_secs: 8,
            request_timeout_secs: 30,
            orders_page_size: 5,
            user_orders_page_size: 10,
            session_ttl_hours: 24 * 7,
            log_format: "text".into(),
            plant_name: "BhagiRadha SawyamKrushi Water Plant".into(),
        }
    }
}

impl AppConfig {
    /// Load configuration. An explicit `path` must exist; the default
    /// `<data_dir>/config.json` is optional.
    pub fn load(data_dir: &Path, path: Option<&Path>) -> AppResult<Self> {
        let (file, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (data_dir.join(CONFIG_FILE), false),
        };

        let mut config = if file.exists() {
            let raw = std::fs::read_to_string(&file)
                .map_err(|e| AppError::Config(format!("read {}: {e}", file.display())))?;
            let parsed: AppConfig = serde_json::from_str(&raw)
                .map_err(|e| AppError::Config(format!("parse {}: {e}", file.display())))?;
            info!(path = %file.display(), "Loaded configuration file");
            parsed
        } else if required {
            return Err(AppError::Config(format!(
                "config file not found: {}",
                file.display()
            )));
        } else {
            info!(path = %file.display(), "No configuration file, using defaults");
            AppConfig::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> AppResult<()> {
        if let Some(url) = env_var(ENV_API_URL) {
            self.api_base_url = url;
        }
        if let Some(url) = env_var(ENV_ROUTING_URL) {
            self.routing_base_url = url;
        }
        if let Some(radius) = env_parse::<f64>(ENV_RADIUS_KM)? {
            self.delivery_radius_km = radius;
        }
        Ok(())
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.api_base_url.trim().is_empty() {
            return Err(AppError::Config("apiBaseUrl must not be empty".into()));
        }
        if !(self.delivery_radius_km.is_finite() && self.delivery_radius_km > 0.0) {
            return Err(AppError::Config(format!(
                "deliveryRadiusKm must be positive, got {}",
                self.delivery_radius_km
            )));
        }
        Coordinate::new(self.delivery_center_lat, self.delivery_center_lng).map_err(|_| {
            AppError::Config(format!(
                "delivery center out of range: {}, {}",
                self.delivery_center_lat, self.delivery_center_lng
            ))
        })?;
        if self.orders_page_size == 0 || self.user_orders_page_size == 0 {
            return Err(AppError::Config("page sizes must be at least 1".into()));
        }
        if self.dashboard_poll_secs == 0 || self.route_refresh_secs == 0 {
            return Err(AppError::Config("poll intervals must be at least 1s".into()));
        }
        if self.reverse_geocode_timeout_secs == 0 {
            return Err(AppError::Config(
                "reverseGeocodeTimeoutSecs must be at least 1".into(),
            ));
        }
        if !(1..=MAX_SESSION_TTL_HOURS).contains(&self.session_ttl_hours) {
            return Err(AppError::Config(format!(
                "sessionTtlHours must be between 1 and {MAX_SESSION_TTL_HOURS}, got {}",
                self.session_ttl_hours
            )));
        }
        Ok(())
    }

    pub fn delivery_center(&self) -> DeliveryCenter {
        DeliveryCenter {
            center: Coordinate {
                lat: self.delivery_center_lat,
                lng: self.delivery_center_lng,
            },
            radius_km: self.delivery_radius_km,
        }
    }

    pub fn dashboard_poll_interval(&self) -> Duration {
        Duration::from_secs(self.dashboard_poll_secs)
    }

    pub fn route_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.route_refresh_secs)
    }

    pub fn reverse_geocode_timeout(&self) -> Duration {
        Duration::from_secs(self.reverse_geocode_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Default data directory: `$XDG_DATA_HOME/puredrop` or `~/.local/share/puredrop`
/// (`%LOCALAPPDATA%\puredrop` on Windows).
pub fn default_data_dir() -> PathBuf {
    let base = std::env::var("LOCALAPPDATA")
        .or_else(|_| std::env::var("XDG_DATA_HOME"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()))
                .join(".local")
                .join("share")
        });
    base.join("puredrop")
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> AppResult<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env_var(key) {
        None => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(|e| {
            warn!(key, value = %raw, "Invalid environment override");
            AppError::Config(format!("invalid {key} value {raw:?}: {e}"))
        }),
    }
}
