//! Performance buckets for the admin charts.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::error::ValidationError;
use crate::orders::{Order, OrderStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Week,
    Month,
    Year,
}

impl Period {
    /// `YYYY-Www` (ISO week-year), `YYYY-MM` or `YYYY`.
    pub fn key(self, date: NaiveDate) -> String {
        match self {
            Period::Week => {
                let week = date.iso_week();
                format!("{:04}-W{:02}", week.year(), week.week())
            }
            Period::Month => format!("{:04}-{:02}", date.year(), date.month()),
            Period::Year => format!("{:04}", date.year()),
        }
    }
}

impl FromStr for Period {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "week" | "weekly" => Ok(Period::Week),
            "month" | "monthly" => Ok(Period::Month),
            "year" | "yearly" => Ok(Period::Year),
            other => Err(ValidationError::InvalidFilter(format!("period {other}"))),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Period::Week => "week",
            Period::Month => "month",
            Period::Year => "year",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceBucket {
    pub key: String,
    pub normal: u64,
    pub cool: u64,
    pub total_qty: u64,
    pub revenue: f64,
}

/// Group `orders` by `period`, sorted by key. Quantities count every order;
/// revenue counts completed orders only. Orders without a parseable
/// creation date are skipped.
pub fn aggregate(orders: &[Order], period: Period) -> Vec<PerformanceBucket> {
    let mut buckets: BTreeMap<String, PerformanceBucket> = BTreeMap::new();
    let mut skipped = 0usize;

    for order in orders {
        let Some(date) = order.created_date() else {
            skipped += 1;
            continue;
        };
        let key = period.key(date);
        let bucket = buckets
            .entry(key.clone())
            .or_insert_with(|| PerformanceBucket {
                key,
                ..PerformanceBucket::default()
            });
        bucket.normal += u64::from(order.normal_qty);
        bucket.cool += u64::from(order.cool_qty);
        bucket.total_qty += order.total_qty();
        if order.status == OrderStatus::Completed {
            bucket.revenue += order.total_amount;
        }
    }

    if skipped > 0 {
        debug!(skipped, "Orders without a creation date left out of performance");
    }
    buckets.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::sample_order;

    #[test]
    fn week_keys_follow_iso_week_year() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
        // 2021-01-03 belongs to ISO week 53 of 2020.
        assert_eq!(Period::Week.key(d(2021, 1, 3)), "2020-W53");
        assert_eq!(Period::Week.key(d(2026, 1, 5)), "2026-W02");
        // Late December can fall into week 1 of the next year.
        assert_eq!(Period::Week.key(d(2024, 12, 30)), "2025-W01");
        assert_eq!(Period::Month.key(d(2026, 3, 9)), "2026-03");
        assert_eq!(Period::Year.key(d(2026, 3, 9)), "2026");
    }

    #[test]
    fn monthly_buckets_sum_quantities_and_completed_revenue() {
        let orders = vec![
            sample_order(1, OrderStatus::Completed, "2026-09-02T10:00:00"),
            sample_order(2, OrderStatus::Cancelled, "2026-09-20T10:00:00"),
            sample_order(3, OrderStatus::Completed, "2026-10-01T10:00:00"),
            sample_order(4, OrderStatus::Pending, "not a date"),
        ];
        let buckets = aggregate(&orders, Period::Month);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].key, "2026-09");
        assert_eq!(buckets[0].normal, 4);
        assert_eq!(buckets[0].cool, 2);
        assert_eq!(buckets[0].total_qty, 6);
        assert_eq!(buckets[0].revenue, 80.0);
        assert_eq!(buckets[1].key, "2026-10");
    }

    #[test]
    fn buckets_are_sorted_by_key() {
        let orders = vec![
            sample_order(1, OrderStatus::Completed, "2026-02-01T10:00:00"),
            sample_order(2, OrderStatus::Completed, "2024-06-01T10:00:00"),
            sample_order(3, OrderStatus::Completed, "2025-06-01T10:00:00"),
        ];
        let keys: Vec<String> = aggregate(&orders, Period::Year)
            .into_iter()
            .map(|b| b.key)
            .collect();
        assert_eq!(keys, vec!["2024", "2025", "2026"]);
    }

    #[test]
    fn period_parses_labels() {
        assert_eq!("Weekly".parse::<Period>().unwrap(), Period::Week);
        assert_eq!("month".parse::<Period>().unwrap(), Period::Month);
        assert!("decade".parse::<Period>().is_err());
    }
}
