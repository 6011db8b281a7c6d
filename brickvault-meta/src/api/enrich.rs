//! Enrichment run handlers
//!
//! POST /enrich/parts, POST /enrich/minifigs, POST /enrich/prices,
//! GET /enrich/status/:batch_id

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use brickvault_common::events::EnrichmentKind;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::{BatchRunStatus, EnrichAccepted},
    AppState,
};

/// POST /enrich/* request
#[derive(Debug, Deserialize)]
pub struct EnrichRequest {
    pub ids: Vec<String>,
    #[serde(default)]
    pub table_id: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
}

async fn accept(state: &AppState, kind: EnrichmentKind, request: EnrichRequest) -> (StatusCode, Json<EnrichAccepted>) {
    let accepted = state
        .enrichment
        .enrich_batch(kind, request.ids, request.table_id, request.owner_id)
        .await;
    (StatusCode::ACCEPTED, Json(accepted))
}

/// POST /enrich/parts
///
/// Returns 202 with the batch id; the run continues in the background.
pub async fn enrich_parts(
    State(state): State<AppState>,
    Json(request): Json<EnrichRequest>,
) -> (StatusCode, Json<EnrichAccepted>) {
    accept(&state, EnrichmentKind::Parts, request).await
}

/// POST /enrich/minifigs
pub async fn enrich_minifigs(
    State(state): State<AppState>,
    Json(request): Json<EnrichRequest>,
) -> (StatusCode, Json<EnrichAccepted>) {
    accept(&state, EnrichmentKind::Minifigs, request).await
}

/// POST /enrich/prices
pub async fn enrich_prices(
    State(state): State<AppState>,
    Json(request): Json<EnrichRequest>,
) -> (StatusCode, Json<EnrichAccepted>) {
    accept(&state, EnrichmentKind::Prices, request).await
}

/// GET /enrich/status/:batch_id
pub async fn batch_status(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> ApiResult<Json<BatchRunStatus>> {
    state
        .enrichment
        .batch_status(batch_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Batch not found: {}", batch_id)))
}

pub fn enrich_routes() -> Router<AppState> {
    Router::new()
        .route("/enrich/parts", post(enrich_parts))
        .route("/enrich/minifigs", post(enrich_minifigs))
        .route("/enrich/prices", post(enrich_prices))
        .route("/enrich/status/:batch_id", get(batch_status))
}
