//! Part metadata handlers

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use brickvault_common::events::{NotificationOptions, NotificationSink};

use crate::{
    error::{ApiError, ApiResult},
    models::PartMetadata,
    AppState,
};

/// GET /parts/:element_id
///
/// Cached metadata only; never calls upstream.
pub async fn get_part(
    State(state): State<AppState>,
    Path(element_id): Path<String>,
) -> ApiResult<Json<PartMetadata>> {
    state
        .enrichment
        .get_part_metadata(element_id.trim())
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No metadata for element {}", element_id)))
}

/// POST /parts/:element_id/refresh
///
/// Request-path lookup. Upstream failures reach the caller and the UI
/// notification area.
pub async fn refresh_part(
    State(state): State<AppState>,
    Path(element_id): Path<String>,
) -> ApiResult<Json<PartMetadata>> {
    match state.enrichment.enrich_one_part(&element_id).await {
        Ok(part) => Ok(Json(part)),
        Err(e) => {
            tracing::warn!(element_id = %element_id, error = %e, "Part refresh failed");
            state
                .event_bus
                .show_error(&format!("Could not refresh {}: {}", element_id, e), NotificationOptions::default());
            state.record_error(e.to_string()).await;
            Err(ApiError::from(e))
        }
    }
}

pub fn part_routes() -> Router<AppState> {
    Router::new()
        .route("/parts/:element_id", get(get_part))
        .route("/parts/:element_id/refresh", post(refresh_part))
}
