use chrono::Local;
use std::path::PathBuf;

use super::{render_page, require, Output};
use crate::api::ActiveStatus;
use crate::cli::HistoryArgs;
use crate::console::paginate;
use crate::error::AppResult;
use crate::orders::Order;
use crate::session::{Route, Session};
use crate::users::{self, HistoryFilter};
use crate::AppState;

async fn filtered_orders(
    state: &AppState,
    session: &Session,
    mobile: &str,
    filter: &HistoryArgs,
) -> AppResult<Vec<Order>> {
    let filter = HistoryFilter::from_args(
        filter.from.as_deref(),
        filter.to.as_deref(),
        filter.status.as_deref(),
    )?;
    let orders = users::lookup(state.backend.as_ref(), session.bearer(), mobile).await?;
    Ok(filter.apply(&orders))
}

pub async fn orders(
    state: &AppState,
    out: &Output,
    mobile: &str,
    filter: &HistoryArgs,
    page: usize,
) -> AppResult<()> {
    let session = require(state, Route::AdminUserManagement)?;
    let list = filtered_orders(state, &session, mobile, filter).await?;
    let shown = paginate(&list, page, state.config.user_orders_page_size);
    out.show(&shown, || render_page(&shown))
}

pub async fn set_active(
    state: &AppState,
    out: &Output,
    mobile: &str,
    status: ActiveStatus,
) -> AppResult<()> {
    let session = require(state, Route::AdminUserManagement)?;
    let (message, orders) =
        users::set_active_and_refetch(state.backend.as_ref(), session.bearer(), mobile, status)
            .await?;
    out.notice(&format!("{message} ({} orders on record)", orders.len()));
    Ok(())
}

pub async fn report(
    state: &AppState,
    out: &Output,
    mobile: &str,
    filter: &HistoryArgs,
    dir: Option<PathBuf>,
) -> AppResult<()> {
    let session = require(state, Route::AdminUserManagement)?;
    let list = filtered_orders(state, &session, mobile, filter).await?;
    let text = users::render_report(&state.config.plant_name, mobile.trim(), &list, Local::now())?;
    let dir = match dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let path = users::save_report(&dir, mobile, &text)?;
    out.notice(&format!("Report saved to {}", path.display()));
    Ok(())
}
