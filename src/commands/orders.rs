use chrono::Local;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{confirm, follow, interrupted, render_page, render_stats, require, Output};
use crate::cli::{HistoryArgs, OrderArgs};
use crate::composer::{self, Confirmation, OrderComposer, OrderDraft};
use crate::console::{
    self, paginate, sort_newest_first, spawn_dashboard, stats, todays_orders, OrderFilter,
    OrderStats, Page, TerminalBell,
};
use crate::error::AppResult;
use crate::geo::{Coordinate, LocationResolver};
use crate::orders::{BookingType, Order, OrderStatus};
use crate::session::Route;
use crate::users::{self, HistoryFilter};
use crate::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OrdersView<'a> {
    stats: &'a OrderStats,
    page: &'a Page<Order>,
}

fn render_view(view: &OrdersView<'_>) -> String {
    format!("{}\n\n{}", render_stats(view.stats), render_page(view.page))
}

pub async fn place(
    state: &AppState,
    out: &Output,
    args: OrderArgs,
    advance_date: Option<String>,
) -> AppResult<()> {
    let session = require(state, Route::Home)?;
    let booking_type = if advance_date.is_some() {
        BookingType::Advance
    } else {
        BookingType::Daily
    };

    let mut draft = OrderDraft::new(
        booking_type,
        args.name.as_deref().unwrap_or(&session.user_name),
        args.mobile.as_deref().unwrap_or(&session.mobile),
    );
    draft.normal_qty = args.normal;
    draft.cool_qty = args.cool;
    draft.delivery_date = advance_date;

    let resolver = LocationResolver::new(
        state.backend.as_ref(),
        state.config.delivery_center(),
        state.config.reverse_geocode_timeout(),
    );
    let picked = match (&args.at, &args.search) {
        (Some(raw), _) => Some(resolver.resolve(Coordinate::parse(raw)?).await?),
        (None, Some(query)) => resolver.search(query).await?,
        (None, None) => None,
    };

    match (&picked, &args.address) {
        (Some(loc), typed) => {
            draft.apply_location(loc);
            // Keep the pin and fall back to the typed address when reverse
            // geocoding gave nothing.
            if draft.address.trim().is_empty() {
                if let Some(typed) = typed {
                    draft.address = typed.clone();
                }
            }
        }
        (None, Some(typed)) => draft.set_typed_address(typed),
        (None, None) => {}
    }

    let composer = OrderComposer::new(state.config.pricing, state.config.delivery_center());
    let request = composer.validate(&draft, Local::now().date_naive())?;

    out.show(&request, || Confirmation(&request).to_string())?;
    if !args.yes && !confirm("Place this order?").await? {
        out.notice("Order not placed");
        return Ok(());
    }

    let message = composer::submit(state.backend.as_ref(), session.bearer(), &request).await?;
    out.notice(message);
    Ok(())
}

pub async fn history(
    state: &AppState,
    out: &Output,
    filter: &HistoryArgs,
    page: usize,
) -> AppResult<()> {
    let session = require(state, Route::OrderHistory)?;
    let filter = HistoryFilter::from_args(
        filter.from.as_deref(),
        filter.to.as_deref(),
        filter.status.as_deref(),
    )?;
    let orders = users::lookup(state.backend.as_ref(), session.bearer(), &session.mobile).await?;
    let shown = paginate(&filter.apply(&orders), page, state.config.orders_page_size);
    out.show(&shown, || render_page(&shown))
}

pub async fn dashboard(state: &AppState, out: &Output, once: bool, page: usize) -> AppResult<()> {
    let session = require(state, Route::AdminDashboard)?;
    let page_size = state.config.orders_page_size;

    if once {
        let all = state.backend.all_orders(session.bearer()).await?;
        let today = todays_orders(&all, Local::now().date_naive());
        let summary = stats(&today);
        let shown = paginate(&today, page, page_size);
        let view = OrdersView {
            stats: &summary,
            page: &shown,
        };
        return out.show(&view, || render_view(&view));
    }

    let watcher = spawn_dashboard(
        state.backend.clone(),
        Arc::new(TerminalBell),
        session.bearer().to_string(),
        state.config.dashboard_poll_interval(),
        CancellationToken::new(),
    );
    let mut rx = watcher.subscribe();
    if !out.is_json() {
        eprintln!("Watching today's orders, Ctrl-C to stop");
    }

    let closed = follow(&mut rx, interrupted(), |snapshot| {
        let shown = paginate(&snapshot.orders, page, page_size);
        let view = OrdersView {
            stats: &snapshot.stats,
            page: &shown,
        };
        out.show(&view, || {
            format!(
                "[{}]\n{}\n",
                snapshot.fetched_at.format("%H:%M:%S"),
                render_view(&view)
            )
        })
    })
    .await?;
    if closed {
        out.notice("Dashboard stopped");
    }

    watcher.shutdown().await;
    info!("Dashboard closed");
    Ok(())
}

pub async fn list(
    state: &AppState,
    out: &Output,
    status: Option<&str>,
    booking_type: Option<&str>,
    date: Option<&str>,
    search: Option<&str>,
    page: usize,
) -> AppResult<()> {
    let session = require(state, Route::AdminOrders)?;
    let filter = OrderFilter::from_args(status, booking_type, date, search)?;

    let all = state.backend.all_orders(session.bearer()).await?;
    let mut filtered = filter.apply(&all);
    sort_newest_first(&mut filtered);

    let summary = stats(&filtered);
    let shown = paginate(&filtered, page, state.config.orders_page_size);
    let view = OrdersView {
        stats: &summary,
        page: &shown,
    };
    out.show(&view, || render_view(&view))
}

pub async fn set_status(
    state: &AppState,
    out: &Output,
    order_id: i64,
    to: OrderStatus,
) -> AppResult<()> {
    let session = require(state, Route::AdminOrders)?;
    let refreshed =
        console::transition(state.backend.as_ref(), session.bearer(), order_id, to).await?;
    let pending = refreshed
        .iter()
        .filter(|o| o.status == OrderStatus::Pending)
        .count();
    out.notice(&format!(
        "Order #{order_id} marked {to}. {pending} orders still pending."
    ));
    Ok(())
}
