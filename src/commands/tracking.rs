use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{follow, interrupted, require, Output};
use crate::error::AppResult;
use crate::geo::Coordinate;
use crate::session::Route;
use crate::tracking::{
    fixed_position, resolve_destination, spawn_line_feed, spawn_tracker, OsrmClient,
    TrackingUpdate,
};
use crate::AppState;

fn describe(update: &TrackingUpdate) -> String {
    format!(
        "You: {:.6},{:.6}  Destination: {:.6},{:.6}  {:.2} km  ({} route points)",
        update.admin.lat,
        update.admin.lng,
        update.destination.lat,
        update.destination.lng,
        update.distance_km,
        update.path.len()
    )
}

pub async fn track(
    state: &AppState,
    out: &Output,
    order_id: i64,
    destination: Option<&str>,
    from: Option<&str>,
) -> AppResult<()> {
    require(state, Route::Track)?;
    let fallback = destination.map(Coordinate::parse).transpose()?;
    let destination = resolve_destination(state.backend.as_ref(), order_id, fallback).await?;

    let cancel = CancellationToken::new();
    let (positions, feed) = match from {
        Some(raw) => (fixed_position(Coordinate::parse(raw)?), None),
        None => {
            eprintln!("Reading positions as lat,lng lines from stdin, Ctrl-C to stop");
            let (rx, handle) = spawn_line_feed(tokio::io::stdin(), cancel.child_token());
            (rx, Some(handle))
        }
    };

    let routes = Arc::new(OsrmClient::new(&state.config)?);
    let tracker = spawn_tracker(
        routes,
        destination,
        positions,
        state.config.route_refresh_interval(),
        cancel.child_token(),
    );
    let mut rx = tracker.subscribe();
    follow(&mut rx, interrupted(), |update| out.show(&update, || describe(&update))).await?;

    cancel.cancel();
    tracker.shutdown().await;
    if let Some(feed) = feed {
        let _ = feed.await;
    }
    Ok(())
}
