//! Minifig price handler

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::{models::{MinifigRef, PriceWithTrend}, AppState};

/// Optional hints that save a name lookup during id resolution
#[derive(Debug, Default, Deserialize)]
pub struct PriceQuery {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub bricklink_id: Option<String>,
}

/// GET /minifigs/:minifig_id/price
///
/// Always 200; a zeroed price is returned when nothing can be fetched.
pub async fn get_price(
    State(state): State<AppState>,
    Path(minifig_id): Path<String>,
    Query(query): Query<PriceQuery>,
) -> Json<PriceWithTrend> {
    let minifig = MinifigRef {
        minifig_id_rebrickable: minifig_id.trim().to_string(),
        minifig_name: query.name,
        minifig_id_bricklink: query.bricklink_id,
    };
    Json(state.enrichment.get_minifig_price_with_trend(&minifig).await)
}

pub fn minifig_routes() -> Router<AppState> {
    Router::new().route("/minifigs/:minifig_id/price", get(get_price))
}
