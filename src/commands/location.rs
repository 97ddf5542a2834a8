use super::{require, Output};
use crate::error::AppResult;
use crate::geo::{Coordinate, LocationResolver, ResolvedLocation};
use crate::session::Route;
use crate::AppState;

fn resolver(state: &AppState) -> LocationResolver<'_, crate::api::BackendClient> {
    LocationResolver::new(
        state.backend.as_ref(),
        state.config.delivery_center(),
        state.config.reverse_geocode_timeout(),
    )
}

fn describe(loc: &ResolvedLocation) -> String {
    let address = if loc.address.is_empty() {
        "(address unavailable)"
    } else {
        loc.address.as_str()
    };
    format!(
        "Delivery available: {:.2} km from the plant\n{:.6},{:.6}\n{address}",
        loc.distance_km, loc.lat, loc.lng
    )
}

pub async fn locate(state: &AppState, out: &Output, raw: &str) -> AppResult<()> {
    require(state, Route::Home)?;
    let point = Coordinate::parse(raw)?;
    let resolved = resolver(state).resolve(point).await?;
    out.show(&resolved, || describe(&resolved))
}

pub async fn search(state: &AppState, out: &Output, query: &str) -> AppResult<()> {
    require(state, Route::Home)?;
    match resolver(state).search(query).await? {
        Some(resolved) => out.show(&resolved, || describe(&resolved)),
        None => {
            out.notice("Enter an address to search");
            Ok(())
        }
    }
}
