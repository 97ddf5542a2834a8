//! Command handlers, one module per screen group. Every handler resolves
//! its route through the session guard before doing anything else.

use chrono::Utc;
use serde::Serialize;
use std::fmt::Write as _;
use std::future::Future;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::watch;

use crate::cli::Command;
use crate::console::{OrderStats, Page};
use crate::error::{AppError, AppResult};
use crate::orders::Order;
use crate::session::{self, Route, Session};
use crate::AppState;

mod analytics;
mod auth;
mod customers;
mod diagnostics;
mod location;
mod orders;
mod tracking;

pub async fn dispatch(state: &AppState, command: Command, out: &Output) -> AppResult<()> {
    match command {
        Command::Login { mobile, password } => auth::login(state, out, &mobile, password).await,
        Command::Register {
            name,
            mobile,
            address,
            password,
            confirm_password,
        } => auth::register(state, out, name, mobile, address, password, confirm_password).await,
        Command::Logout => auth::logout(state, out),
        Command::Whoami => auth::whoami(state, out),
        Command::About => diagnostics::about(state, out),

        Command::Order(args) => orders::place(state, out, args, None).await,
        Command::Advance { date, order } => orders::place(state, out, order, Some(date)).await,
        Command::History { filter, page } => orders::history(state, out, &filter, page).await,
        Command::Locate { coordinate } => location::locate(state, out, &coordinate).await,
        Command::Search { query } => location::search(state, out, &query.join(" ")).await,

        Command::Dashboard { once, page } => orders::dashboard(state, out, once, page).await,
        Command::Orders {
            status,
            booking_type,
            date,
            search,
            page,
        } => {
            orders::list(
                state,
                out,
                status.as_deref(),
                booking_type.as_deref(),
                date.as_deref(),
                search.as_deref(),
                page,
            )
            .await
        }
        Command::Complete { order_id } => {
            orders::set_status(state, out, order_id, crate::orders::OrderStatus::Completed).await
        }
        Command::Cancel { order_id } => {
            orders::set_status(state, out, order_id, crate::orders::OrderStatus::Cancelled).await
        }
        Command::Performance { period } => analytics::performance(state, out, &period).await,

        Command::Users {
            mobile,
            filter,
            page,
        } => customers::orders(state, out, &mobile, &filter, page).await,
        Command::Block { mobile } => {
            customers::set_active(state, out, &mobile, crate::api::ActiveStatus::Block).await
        }
        Command::Activate { mobile } => {
            customers::set_active(state, out, &mobile, crate::api::ActiveStatus::Active).await
        }
        Command::Report {
            mobile,
            filter,
            out: dir,
        } => customers::report(state, out, &mobile, &filter, dir).await,
        Command::Track {
            order_id,
            destination,
            from,
        } => tracking::track(state, out, order_id, destination.as_deref(), from.as_deref()).await,
    }
}

/// Session for `route`, or the reason it is refused.
pub(crate) fn require(state: &AppState, route: Route) -> AppResult<Session> {
    session::require(&state.db, route, Utc::now())
}

/// Prints command results as text or JSON on stdout.
pub struct Output {
    json: bool,
}

impl Output {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    pub fn show<T: Serialize + ?Sized>(
        &self,
        value: &T,
        text: impl FnOnce() -> String,
    ) -> AppResult<()> {
        if self.json {
            let rendered = serde_json::to_string_pretty(value)
                .map_err(|e| AppError::Decode(format!("render output: {e}")))?;
            println!("{rendered}");
        } else {
            println!("{}", text());
        }
        Ok(())
    }

    pub fn notice(&self, message: &str) {
        if self.json {
            println!("{}", serde_json::json!({ "message": message }));
        } else {
            println!("{message}");
        }
    }
}

/// Resolves on the first Ctrl-C.
pub(crate) async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Ctrl-C handler unavailable: {e}");
        std::future::pending::<()>().await;
    }
}

/// Hand every published value to `on_update` until `stop` resolves or the
/// sender goes away. Returns `true` when the sender closed.
pub(crate) async fn follow<T, F>(
    rx: &mut watch::Receiver<Option<T>>,
    stop: impl Future<Output = ()>,
    mut on_update: F,
) -> AppResult<bool>
where
    T: Clone,
    F: FnMut(T) -> AppResult<()>,
{
    tokio::pin!(stop);
    loop {
        tokio::select! {
            _ = &mut stop => return Ok(false),
            changed = rx.changed() => {
                if changed.is_err() {
                    return Ok(true);
                }
                let latest = rx.borrow_and_update().clone();
                if let Some(value) = latest {
                    on_update(value)?;
                }
            }
        }
    }
}

/// Ask a yes/no question on the terminal. Anything but `y`/`yes` is no.
pub(crate) async fn confirm(question: &str) -> AppResult<bool> {
    let answer = prompt(&format!("{question} [y/N] ")).await?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

pub(crate) async fn prompt(label: &str) -> AppResult<String> {
    let mut stderr = tokio::io::stderr();
    stderr.write_all(label.as_bytes()).await?;
    stderr.flush().await?;
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

pub(crate) fn render_orders(orders: &[Order]) -> String {
    if orders.is_empty() {
        return "No orders found".into();
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>6}  {:<16}  {:<20}  {:<10}  {:>3}  {:>3}  {:>8}  {:<7}  {}",
        "ID", "Created", "Name", "Mobile", "N", "C", "Total", "Type", "Status"
    );
    for o in orders {
        let created = o
            .created_local()
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".into());
        let name: String = o.name.chars().take(20).collect();
        let _ = writeln!(
            out,
            "{:>6}  {:<16}  {:<20}  {:<10}  {:>3}  {:>3}  {:>8.2}  {:<7}  {}",
            o.id,
            created,
            name,
            o.mobile_number,
            o.normal_qty,
            o.cool_qty,
            o.total_amount,
            o.booking_type,
            o.status
        );
    }
    out.trim_end().to_string()
}

pub(crate) fn render_page(page: &Page<Order>) -> String {
    format!(
        "{}\nPage {} of {} ({} orders)",
        render_orders(&page.items),
        page.page,
        page.page_count.max(1),
        page.total_items
    )
}

pub(crate) fn render_stats(stats: &OrderStats) -> String {
    format!(
        "Orders: {}  Pending: {}  Completed: {}  Cancelled: {}  Revenue: ₹{:.2}",
        stats.total, stats.pending, stats.completed, stats.cancelled, stats.revenue
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::paginate;
    use crate::orders::{sample_order, OrderStatus};

    #[test]
    fn order_table_has_header_and_one_row_per_order() {
        let orders = vec![
            sample_order(1, OrderStatus::Pending, "2026-10-14T09:15:00"),
            sample_order(2, OrderStatus::Completed, "2026-10-14T10:00:00"),
        ];
        let text = render_orders(&orders);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("Status"));
        assert!(lines[1].contains("2026-10-14 09:15"));
        assert!(lines[2].ends_with("Completed"));
    }

    #[tokio::test]
    async fn follow_delivers_updates_until_the_sender_closes() {
        let (tx, mut rx) = watch::channel(None);
        let feeder = tokio::spawn(async move {
            for n in 1..=3 {
                tx.send_replace(Some(n));
                tokio::task::yield_now().await;
            }
        });
        let mut seen = Vec::new();
        let closed = follow(&mut rx, std::future::pending(), |n| {
            seen.push(n);
            Ok(())
        })
        .await
        .unwrap();
        feeder.await.unwrap();
        assert!(closed);
        assert_eq!(seen.last(), Some(&3));
    }

    #[tokio::test]
    async fn follow_returns_once_stop_fires() {
        let (tx, mut rx) = watch::channel(Some(1));
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        rx.mark_changed();
        stop_tx.send(()).unwrap();
        let closed = follow(
            &mut rx,
            async {
                let _ = stop_rx.await;
            },
            |_: i32| Ok(()),
        )
        .await
        .unwrap();
        assert!(!closed);
        drop(tx);
    }

    #[test]
    fn page_footer_counts_from_one() {
        let page = paginate::<Order>(&[], 1, 5);
        assert!(render_page(&page).ends_with("Page 1 of 1 (0 orders)"));
    }
}
