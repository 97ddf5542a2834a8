//! Live delivery tracking.
//!
//! The tracker follows the administrator's position and keeps a driving
//! route to the order's delivery point fresh. A route is fetched as soon as
//! both points are known, again whenever the position moves, and otherwise
//! on a fixed interval. Only changed routes are published.

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{friendly_error, http_client, interpret_response, BackendClient};
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::geo::{haversine_km, Coordinate};
use crate::orders::json_number;

pub trait RouteProvider: Send + Sync {
    fn route(
        &self,
        from: Coordinate,
        to: Coordinate,
    ) -> impl Future<Output = AppResult<Vec<Coordinate>>> + Send;
}

/// OSRM driving routes.
pub struct OsrmClient {
    http: Client,
    base: String,
}

impl OsrmClient {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        Ok(Self {
            http: http_client(config.request_timeout())?,
            base: config.routing_base_url.trim().trim_end_matches('/').to_string(),
        })
    }

    fn route_url(&self, from: Coordinate, to: Coordinate) -> String {
        format!(
            "{}/route/v1/driving/{},{};{},{}?overview=full&geometries=geojson",
            self.base, from.lng, from.lat, to.lng, to.lat
        )
    }
}

/// First route's GeoJSON line, converted from `[lng, lat]` pairs.
fn parse_route(json: &Value) -> AppResult<Vec<Coordinate>> {
    let coords = json
        .get("routes")
        .and_then(Value::as_array)
        .and_then(|routes| routes.first())
        .and_then(|r| r.pointer("/geometry/coordinates"))
        .and_then(Value::as_array)
        .ok_or_else(|| AppError::NotFound("No route found".into()))?;

    coords
        .iter()
        .map(|pair| {
            let lng = pair.get(0).and_then(json_number);
            let lat = pair.get(1).and_then(json_number);
            match (lat, lng) {
                (Some(lat), Some(lng)) => Ok(Coordinate::new(lat, lng)?),
                _ => Err(AppError::Decode(format!("bad route point {pair}"))),
            }
        })
        .collect()
}

impl RouteProvider for OsrmClient {
    async fn route(&self, from: Coordinate, to: Coordinate) -> AppResult<Vec<Coordinate>> {
        let url = self.route_url(from, to);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| friendly_error(&url, &e))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| friendly_error(&url, &e))?;
        let json = interpret_response(status, &body, None)?;
        parse_route(&json)
    }
}

// ---------------------------------------------------------------------------
// Destination
// ---------------------------------------------------------------------------

pub trait DestinationLookup: Send + Sync {
    fn order_location(&self, order_id: i64) -> impl Future<Output = AppResult<Coordinate>> + Send;
}

impl DestinationLookup for BackendClient {
    async fn order_location(&self, order_id: i64) -> AppResult<Coordinate> {
        BackendClient::order_location(self, order_id).await
    }
}

/// Look up the delivery point for `order_id`. A failed lookup falls back to
/// the caller's coordinate when there is one.
pub async fn resolve_destination<L: DestinationLookup>(
    lookup: &L,
    order_id: i64,
    fallback: Option<Coordinate>,
) -> AppResult<Coordinate> {
    match lookup.order_location(order_id).await {
        Ok(point) => Ok(point),
        Err(e) => match fallback {
            Some(point) => {
                warn!(order_id, "Order location lookup failed, using passed coordinate: {e}");
                Ok(point)
            }
            None => Err(e),
        },
    }
}

// ---------------------------------------------------------------------------
// Position feed
// ---------------------------------------------------------------------------

/// A position that never moves.
pub fn fixed_position(point: Coordinate) -> watch::Receiver<Option<Coordinate>> {
    let (_tx, rx) = watch::channel(Some(point));
    rx
}

/// Read `lat,lng` lines from `reader` and publish each valid one.
pub fn spawn_line_feed<R>(
    reader: R,
    cancel: CancellationToken,
) -> (watch::Receiver<Option<Coordinate>>, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = watch::channel(None);
    let handle = tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => break,
                line = lines.next_line() => line,
            };
            match line {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => match Coordinate::parse(&line) {
                    Ok(point) => {
                        debug!(lat = point.lat, lng = point.lng, "Position update");
                        tx.send_replace(Some(point));
                    }
                    Err(e) => warn!("Ignoring position {line:?}: {e}"),
                },
                Ok(None) => break,
                Err(e) => {
                    warn!("Position feed failed: {e}");
                    break;
                }
            }
        }
        debug!("Position feed closed");
    });
    (rx, handle)
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingUpdate {
    pub admin: Coordinate,
    pub destination: Coordinate,
    /// Straight-line distance, for display.
    pub distance_km: f64,
    pub path: Vec<Coordinate>,
}

pub struct Tracker {
    rx: watch::Receiver<Option<TrackingUpdate>>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Tracker {
    pub fn subscribe(&self) -> watch::Receiver<Option<TrackingUpdate>> {
        self.rx.clone()
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!("Tracker task failed: {e}");
        }
    }
}

pub fn spawn_tracker<P>(
    provider: Arc<P>,
    destination: Coordinate,
    mut positions: watch::Receiver<Option<Coordinate>>,
    refresh: Duration,
    cancel: CancellationToken,
) -> Tracker
where
    P: RouteProvider + 'static,
{
    let (tx, rx) = watch::channel(None);
    let task_cancel = cancel.clone();

    let handle = tokio::spawn(async move {
        info!(
            lat = destination.lat,
            lng = destination.lng,
            "Tracking started (refresh: {}s)",
            refresh.as_secs()
        );
        let mut ticker = tokio::time::interval(refresh);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut feed_open = true;
        let mut last_path: Option<Vec<Coordinate>> = None;

        loop {
            tokio::select! {
                _ = task_cancel.cancelled() => break,
                changed = positions.changed(), if feed_open => {
                    if changed.is_err() {
                        feed_open = false;
                        continue;
                    }
                    ticker.reset();
                }
                _ = ticker.tick() => {}
            }

            let current = *positions.borrow_and_update();
            let Some(admin) = current else {
                continue;
            };

            let fetched = tokio::select! {
                _ = task_cancel.cancelled() => break,
                res = provider.route(admin, destination) => res,
            };

            match fetched {
                Ok(path) if last_path.as_ref() == Some(&path) => {
                    debug!("Route unchanged");
                }
                Ok(path) => {
                    debug!(points = path.len(), "Route updated");
                    tx.send_replace(Some(TrackingUpdate {
                        admin,
                        destination,
                        distance_km: haversine_km(admin, destination),
                        path: path.clone(),
                    }));
                    last_path = Some(path);
                }
                Err(e) => warn!("Route refresh failed: {e}"),
            }
        }
        info!("Tracking stopped");
    });

    Tracker { rx, cancel, handle }
}
