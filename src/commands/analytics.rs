use std::fmt::Write as _;

use super::{require, Output};
use crate::analytics::{aggregate, Period, PerformanceBucket};
use crate::error::AppResult;
use crate::session::Route;
use crate::AppState;

fn render(period: Period, buckets: &[PerformanceBucket]) -> String {
    if buckets.is_empty() {
        return "No dated orders yet".into();
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<10}  {:>7}  {:>7}  {:>7}  {:>10}",
        period.to_string(),
        "Normal",
        "Cool",
        "Total",
        "Revenue"
    );
    for b in buckets {
        let _ = writeln!(
            out,
            "{:<10}  {:>7}  {:>7}  {:>7}  {:>10.2}",
            b.key, b.normal, b.cool, b.total_qty, b.revenue
        );
    }
    out.trim_end().to_string()
}

pub async fn performance(state: &AppState, out: &Output, period: &str) -> AppResult<()> {
    let session = require(state, Route::AdminPerformance)?;
    let period: Period = period.parse()?;
    let orders = state.backend.all_orders(session.bearer()).await?;
    let buckets = aggregate(&orders, period);
    out.show(&buckets, || render(period, &buckets))
}
