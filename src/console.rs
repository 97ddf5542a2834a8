//! Admin order console: filters, stats, pagination, status transitions and
//! the dashboard watcher.
//!
//! The watcher is a background task that polls the order listing on a fixed
//! interval, keeps today's orders newest first and raises one notification
//! each time a new highest order id shows up. It stops when its
//! cancellation token fires or the backend rejects the session.

use chrono::{DateTime, Local, NaiveDate};
use serde::Serialize;
use std::cmp::Reverse;
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::BackendClient;
use crate::data_helpers::{non_blank, parse_date};
use crate::error::{AppError, AppResult, ValidationError};
use crate::orders::{BookingType, Order, OrderStatus};

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub booking_type: Option<BookingType>,
    pub date: Option<NaiveDate>,
    pub search: Option<String>,
}

impl OrderFilter {
    /// Build a filter from the raw option values. `all` (or blank) disables
    /// the status and booking type filters.
    pub fn from_args(
        status: Option<&str>,
        booking_type: Option<&str>,
        date: Option<&str>,
        search: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let status = match status.and_then(non_blank) {
            None => None,
            Some(s) if s.eq_ignore_ascii_case("all") => None,
            Some(s) => Some(
                OrderStatus::parse(&s)
                    .ok_or_else(|| ValidationError::InvalidFilter(format!("status {s}")))?,
            ),
        };
        let booking_type = match booking_type.and_then(non_blank) {
            None => None,
            Some(s) if s.eq_ignore_ascii_case("all") => None,
            Some(s) => Some(
                BookingType::parse(&s)
                    .ok_or_else(|| ValidationError::InvalidFilter(format!("booking type {s}")))?,
            ),
        };
        let date = match date.and_then(non_blank) {
            None => None,
            Some(s) => Some(
                parse_date(&s).ok_or_else(|| ValidationError::InvalidFilter(format!("date {s}")))?,
            ),
        };
        Ok(Self {
            status,
            booking_type,
            date,
            search: search.and_then(non_blank).map(|s| s.to_lowercase()),
        })
    }

    pub fn matches(&self, order: &Order) -> bool {
        if self.status.is_some_and(|s| s != order.status) {
            return false;
        }
        if self.booking_type.is_some_and(|b| b != order.booking_type) {
            return false;
        }
        if let Some(date) = self.date {
            if order.created_date() != Some(date) {
                return false;
            }
        }
        if let Some(term) = &self.search {
            let name_hit = order.name.to_lowercase().contains(term.as_str());
            let mobile_hit = order.mobile_number.contains(term.as_str());
            if !name_hit && !mobile_hit {
                return false;
            }
        }
        true
    }

    pub fn apply(&self, orders: &[Order]) -> Vec<Order> {
        orders.iter().filter(|o| self.matches(o)).cloned().collect()
    }
}

/// Newest first by creation time, then by id. Orders without a usable
/// timestamp sort last.
pub fn sort_newest_first(orders: &mut [Order]) {
    orders.sort_by_key(|o| (Reverse(o.created_local()), Reverse(o.id)));
}

/// Orders created on `today`, newest first.
pub fn todays_orders(orders: &[Order], today: NaiveDate) -> Vec<Order> {
    let mut list: Vec<Order> = orders
        .iter()
        .filter(|o| o.created_date() == Some(today))
        .cloned()
        .collect();
    sort_newest_first(&mut list);
    list
}

// ---------------------------------------------------------------------------
// Stats and pagination
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStats {
    pub total: usize,
    pub pending: usize,
    pub completed: usize,
    pub cancelled: usize,
    /// Sum of completed orders only.
    pub revenue: f64,
}

pub fn stats(orders: &[Order]) -> OrderStats {
    orders.iter().fold(OrderStats::default(), |mut acc, o| {
        acc.total += 1;
        match o.status {
            OrderStatus::Pending => acc.pending += 1,
            OrderStatus::Completed => {
                acc.completed += 1;
                acc.revenue += o.total_amount;
            }
            OrderStatus::Cancelled => acc.cancelled += 1,
        }
        acc
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based page actually shown.
    pub page: usize,
    pub page_count: usize,
    pub total_items: usize,
}

/// Slice `items` into 1-based pages of `page_size`. Page 0 means page 1;
/// pages past the end are empty.
pub fn paginate<T: Clone>(items: &[T], page: usize, page_size: usize) -> Page<T> {
    let page_size = page_size.max(1);
    let page = page.max(1);
    let page_count = items.len().div_ceil(page_size);
    let start = (page - 1).saturating_mul(page_size);
    let slice = if start >= items.len() {
        Vec::new()
    } else {
        items[start..(start + page_size).min(items.len())].to_vec()
    };
    Page {
        items: slice,
        page,
        page_count,
        total_items: items.len(),
    }
}

// ---------------------------------------------------------------------------
// Backend seam
// ---------------------------------------------------------------------------

pub trait OrderSource: Send + Sync {
    fn fetch_all(&self, token: &str) -> impl Future<Output = AppResult<Vec<Order>>> + Send;

    fn update_status(
        &self,
        token: &str,
        order_id: i64,
        status: OrderStatus,
    ) -> impl Future<Output = AppResult<()>> + Send;
}

impl OrderSource for BackendClient {
    async fn fetch_all(&self, token: &str) -> AppResult<Vec<Order>> {
        self.all_orders(token).await
    }

    async fn update_status(&self, token: &str, order_id: i64, status: OrderStatus) -> AppResult<()> {
        self.update_order_status(token, order_id, status).await
    }
}

/// Move a pending order to `to`, then return the refetched listing.
pub async fn transition<S: OrderSource>(
    source: &S,
    token: &str,
    order_id: i64,
    to: OrderStatus,
) -> AppResult<Vec<Order>> {
    let orders = source.fetch_all(token).await?;
    let order = orders
        .iter()
        .find(|o| o.id == order_id)
        .ok_or_else(|| AppError::NotFound(format!("Order #{order_id} not found")))?;
    if order.status.is_terminal() || !to.is_terminal() {
        return Err(AppError::InvalidTransition {
            id: order_id,
            from: order.status,
        });
    }

    source.update_status(token, order_id, to).await?;
    info!(order_id, status = %to, "Order status updated");
    source.fetch_all(token).await
}

// ---------------------------------------------------------------------------
// New order detection
// ---------------------------------------------------------------------------

/// Tracks the highest order id seen so far. The first observation only
/// records a baseline.
#[derive(Debug, Default)]
pub struct NewOrderDetector {
    highest: Option<i64>,
}

impl NewOrderDetector {
    /// Returns the new highest id when it grew since the last observation.
    pub fn observe(&mut self, orders: &[Order]) -> Option<i64> {
        let max = orders.iter().map(|o| o.id).max();
        match (self.highest, max) {
            (None, _) => {
                self.highest = Some(max.unwrap_or(0));
                None
            }
            (Some(prev), Some(max)) if max > prev => {
                self.highest = Some(max);
                Some(max)
            }
            _ => None,
        }
    }
}

pub trait Notifier: Send + Sync {
    fn new_order(&self, order_id: i64);
}

/// Rings the terminal bell.
pub struct TerminalBell;

impl Notifier for TerminalBell {
    fn new_order(&self, order_id: i64) {
        info!(order_id, "New order received");
        let mut err = std::io::stderr();
        let _ = write!(err, "\x07");
        let _ = err.flush();
    }
}

// ---------------------------------------------------------------------------
// Dashboard watcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    /// Today's orders, newest first.
    pub orders: Vec<Order>,
    pub stats: OrderStats,
    pub fetched_at: DateTime<Local>,
}

pub struct DashboardWatcher {
    rx: watch::Receiver<Option<DashboardSnapshot>>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl DashboardWatcher {
    pub fn subscribe(&self) -> watch::Receiver<Option<DashboardSnapshot>> {
        self.rx.clone()
    }

    /// Stop polling and wait for the task to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!("Dashboard watcher task failed: {e}");
        }
    }

    /// True once the task has exited, on its own or after shutdown.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

pub fn spawn_dashboard<S, N>(
    source: Arc<S>,
    notifier: Arc<N>,
    token: String,
    interval: Duration,
    cancel: CancellationToken,
) -> DashboardWatcher
where
    S: OrderSource + 'static,
    N: Notifier + 'static,
{
    let (tx, rx) = watch::channel(None);
    let task_cancel = cancel.clone();

    let handle = tokio::spawn(async move {
        info!("Dashboard watcher started (interval: {}s)", interval.as_secs());
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut detector = NewOrderDetector::default();

        loop {
            tokio::select! {
                _ = task_cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let fetched = tokio::select! {
                _ = task_cancel.cancelled() => break,
                res = source.fetch_all(&token) => res,
            };

            let all = match fetched {
                Ok(all) => all,
                Err(e) if e.is_auth_failure() => {
                    warn!("Dashboard watcher stopped: {e}");
                    break;
                }
                Err(e) => {
                    warn!("Dashboard poll failed: {e}");
                    continue;
                }
            };

            if let Some(id) = detector.observe(&all) {
                notifier.new_order(id);
            }

            let today = todays_orders(&all, Local::now().date_naive());
            debug!(fetched = all.len(), today = today.len(), "Dashboard poll");
            tx.send_if_modified(|current| {
                let changed =
                    current.as_ref().map(|s: &DashboardSnapshot| &s.orders) != Some(&today);
                if changed {
                    *current = Some(DashboardSnapshot {
                        stats: stats(&today),
                        orders: today,
                        fetched_at: Local::now(),
                    });
                }
                changed
            });
        }
        info!("Dashboard watcher stopped");
    });

    DashboardWatcher { rx, cancel, handle }
}
