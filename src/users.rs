//! Order history lookups by mobile number, account activation and the
//! plain-text orders report.
//!
//! Customers see their own history through this module; administrators use
//! it for user management.

use chrono::{DateTime, Local, NaiveDate};
use std::fmt::Write as _;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::api::{ActiveStatus, BackendClient};
use crate::console::sort_newest_first;
use crate::data_helpers::{non_blank, normalize_phone, parse_date};
use crate::error::{AppError, AppResult, ValidationError};
use crate::orders::{Order, OrderStatus};

/// Date range and status filter. Both ends of the range are inclusive and
/// cover the whole day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub status: Option<OrderStatus>,
}

impl HistoryFilter {
    pub fn from_args(
        from: Option<&str>,
        to: Option<&str>,
        status: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let date = |raw: Option<&str>, label: &str| -> Result<Option<NaiveDate>, ValidationError> {
            match raw.and_then(non_blank) {
                None => Ok(None),
                Some(s) => parse_date(&s)
                    .map(Some)
                    .ok_or_else(|| ValidationError::InvalidFilter(format!("{label} date {s}"))),
            }
        };
        let status = match status.and_then(non_blank) {
            None => None,
            Some(s) if s.eq_ignore_ascii_case("all") => None,
            Some(s) => Some(
                OrderStatus::parse(&s)
                    .ok_or_else(|| ValidationError::InvalidFilter(format!("status {s}")))?,
            ),
        };
        Ok(Self {
            from: date(from, "from")?,
            to: date(to, "to")?,
            status,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.from.is_none() && self.to.is_none() && self.status.is_none()
    }

    pub fn matches(&self, order: &Order) -> bool {
        if self.status.is_some_and(|s| s != order.status) {
            return false;
        }
        if self.from.is_none() && self.to.is_none() {
            return true;
        }
        // A date bound excludes orders whose date is unknown.
        let Some(day) = order.created_date() else {
            return false;
        };
        self.from.map_or(true, |from| day >= from) && self.to.map_or(true, |to| day <= to)
    }

    pub fn apply(&self, orders: &[Order]) -> Vec<Order> {
        orders.iter().filter(|o| self.matches(o)).cloned().collect()
    }
}

pub trait UserDirectory: Send + Sync {
    fn orders_by_mobile(
        &self,
        token: &str,
        mobile: &str,
    ) -> impl Future<Output = AppResult<Vec<Order>>> + Send;

    fn set_active(
        &self,
        token: &str,
        mobile: &str,
        status: ActiveStatus,
    ) -> impl Future<Output = AppResult<String>> + Send;
}

impl UserDirectory for BackendClient {
    async fn orders_by_mobile(&self, token: &str, mobile: &str) -> AppResult<Vec<Order>> {
        BackendClient::orders_by_mobile(self, token, mobile).await
    }

    async fn set_active(&self, token: &str, mobile: &str, status: ActiveStatus) -> AppResult<String> {
        self.set_user_active(token, mobile, status).await
    }
}

/// All orders placed from `mobile`, newest first.
pub async fn lookup<D: UserDirectory>(
    directory: &D,
    token: &str,
    mobile: &str,
) -> AppResult<Vec<Order>> {
    let mobile = normalize_phone(mobile);
    if mobile.is_empty() {
        return Err(ValidationError::MissingLookupMobile.into());
    }
    let mut orders = directory.orders_by_mobile(token, &mobile).await?;
    sort_newest_first(&mut orders);
    Ok(orders)
}

/// Toggle the account, then refetch its orders. Returns the backend's
/// confirmation and the fresh listing.
pub async fn set_active_and_refetch<D: UserDirectory>(
    directory: &D,
    token: &str,
    mobile: &str,
    status: ActiveStatus,
) -> AppResult<(String, Vec<Order>)> {
    let mobile = normalize_phone(mobile);
    if mobile.is_empty() {
        return Err(ValidationError::MissingLookupMobile.into());
    }
    let message = directory.set_active(token, &mobile, status).await?;
    info!(mobile = %mobile, status = %status, "User active status changed");
    let orders = lookup(directory, token, &mobile).await?;
    Ok((message, orders))
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

const REPORT_WIDTH: usize = 60;

pub fn report_file_name(mobile: &str) -> String {
    format!("Orders_{}.txt", normalize_phone(mobile))
}

/// Render the orders report. Refuses an empty list.
pub fn render_report(
    plant_name: &str,
    mobile: &str,
    orders: &[Order],
    generated_at: DateTime<Local>,
) -> AppResult<String> {
    if orders.is_empty() {
        return Err(AppError::NotFound("No orders to download".into()));
    }
    let customer = orders
        .iter()
        .map(|o| o.name.trim())
        .find(|n| !n.is_empty())
        .unwrap_or("User");
    let rule = "-".repeat(REPORT_WIDTH);

    let mut out = String::new();
    let _ = writeln!(out, "{plant_name:^width$}", width = REPORT_WIDTH);
    let _ = writeln!(out, "{customer} Orders Report");
    let _ = writeln!(out, "Mobile: {mobile}");
    let _ = writeln!(out, "Generated: {}", generated_at.format("%Y-%m-%d %H:%M"));
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(
        out,
        "{:<12}{:>11}{:>12}{:>11}  {:<12}",
        "Date", "Normal Qty", "Cooling Qty", "Total", "Status"
    );
    let _ = writeln!(out, "{rule}");

    let mut total_amount = 0.0;
    for order in orders {
        let date = order
            .created_date()
            .map(|d| d.format("%d/%m/%Y").to_string())
            .unwrap_or_else(|| "-".into());
        let _ = writeln!(
            out,
            "{:<12}{:>11}{:>12}{:>11.2}  {:<12}",
            date, order.normal_qty, order.cool_qty, order.total_amount, order.status
        );
        total_amount += order.total_amount;
    }
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "Orders: {}   Amount: {total_amount:.2}", orders.len());
    Ok(out)
}

/// Write the report into `dir` and return the file path.
pub fn save_report(dir: &Path, mobile: &str, report: &str) -> AppResult<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(report_file_name(mobile));
    std::fs::write(&path, report)?;
    info!(path = %path.display(), "Orders report saved");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::sample_order;
    use chrono::TimeZone;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeDirectory {
        orders: Vec<Order>,
        calls: Mutex<Vec<String>>,
    }

    impl UserDirectory for FakeDirectory {
        async fn orders_by_mobile(&self, _token: &str, mobile: &str) -> AppResult<Vec<Order>> {
            self.calls.lock().unwrap().push(format!("orders {mobile}"));
            Ok(self.orders.clone())
        }

        async fn set_active(
            &self,
            _token: &str,
            mobile: &str,
            status: ActiveStatus,
        ) -> AppResult<String> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("active {mobile} {status}"));
            Ok("User status updated".into())
        }
    }

    fn history() -> Vec<Order> {
        vec![
            sample_order(1, OrderStatus::Completed, "2026-10-01T07:30:00"),
            sample_order(2, OrderStatus::Pending, "2026-10-05T23:59:00"),
            sample_order(3, OrderStatus::Cancelled, "2026-10-09T12:00:00"),
        ]
    }

    #[test]
    fn to_date_includes_the_whole_day() {
        let f = HistoryFilter::from_args(Some("2026-10-01"), Some("2026-10-05"), None).unwrap();
        let ids: Vec<i64> = f.apply(&history()).iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn status_filter_and_all() {
        let f = HistoryFilter::from_args(None, None, Some("cancelled")).unwrap();
        assert_eq!(f.apply(&history())[0].id, 3);
        let f = HistoryFilter::from_args(None, None, Some("all")).unwrap();
        assert!(f.is_empty());
        assert_eq!(f.apply(&history()).len(), 3);
        assert!(HistoryFilter::from_args(Some("yesterday"), None, None).is_err());
    }

    #[test]
    fn date_bounds_drop_undated_orders() {
        let mut orders = history();
        orders[0].created_at = None;
        let f = HistoryFilter::from_args(Some("2026-01-01"), None, None).unwrap();
        assert_eq!(f.apply(&orders).len(), 2);
    }

    #[tokio::test]
    async fn lookup_requires_mobile_and_sorts_newest_first() {
        let dir = FakeDirectory {
            orders: history(),
            ..FakeDirectory::default()
        };
        let err = lookup(&dir, "tok", "  ").await.unwrap_err();
        assert_eq!(err.to_string(), "Enter mobile number");

        let ids: Vec<i64> = lookup(&dir, "tok", "99510 62449")
            .await
            .unwrap()
            .iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(ids, vec![3, 2, 1]);
        assert_eq!(dir.calls.lock().unwrap()[0], "orders 9951062449");
    }

    #[tokio::test]
    async fn toggle_then_refetch() {
        let dir = FakeDirectory {
            orders: history(),
            ..FakeDirectory::default()
        };
        let (message, orders) = set_active_and_refetch(&dir, "tok", "9951062449", ActiveStatus::Block)
            .await
            .unwrap();
        assert_eq!(message, "User status updated");
        assert_eq!(orders.len(), 3);
        assert_eq!(
            *dir.calls.lock().unwrap(),
            vec!["active 9951062449 Block", "orders 9951062449"]
        );
    }

    #[test]
    fn report_lists_orders_under_plant_header() {
        let generated = Local.with_ymd_and_hms(2026, 10, 14, 9, 0, 0).unwrap();
        let text = render_report("Test Plant", "9951062449", &history(), generated).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0].trim(), "Test Plant");
        assert_eq!(lines[1], "Customer 1 Orders Report");
        assert!(text.contains("01/10/2026"));
        assert!(text.contains("Cancelled"));
        assert!(text.contains("Orders: 3   Amount: 240.00"));
    }

    #[test]
    fn empty_report_is_refused_and_saving_writes_file() {
        let err = render_report("P", "1", &[], Local::now()).unwrap_err();
        assert_eq!(err.to_string(), "No orders to download");

        let dir = std::env::temp_dir().join(format!("puredrop_report_{}", uuid::Uuid::new_v4()));
        let path = save_report(&dir, "9951062449", "hello").unwrap();
        assert!(path.ends_with("Orders_9951062449.txt"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
