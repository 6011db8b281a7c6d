//! User record handlers
//!
//! GET /tables/:table_id/records, POST /records, PUT /records/:uuid/item,
//! DELETE /records/:uuid

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use brickvault_common::events::{NotificationOptions, NotificationSink};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::records,
    error::{ApiError, ApiResult},
    models::{EnrichAccepted, EnrichedRecord, NewRecord, UserOwnedRecord},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub owner_id: String,
}

/// PUT /records/:uuid/item request
#[derive(Debug, Deserialize)]
pub struct ChangeItemRequest {
    pub item_id: String,
}

/// Record plus the enrichment run scheduled for it
#[derive(Debug, Serialize)]
pub struct RecordResponse {
    pub record: UserOwnedRecord,
    pub enrichment: EnrichAccepted,
}

/// GET /tables/:table_id/records?owner_id=
pub async fn list_table_records(
    State(state): State<AppState>,
    Path(table_id): Path<String>,
    Query(query): Query<OwnerQuery>,
) -> ApiResult<Json<Vec<EnrichedRecord>>> {
    let records = state.enrichment.list_table_records(&table_id, &query.owner_id).await?;
    Ok(Json(records))
}

/// POST /records
pub async fn add_record(
    State(state): State<AppState>,
    Json(request): Json<NewRecord>,
) -> ApiResult<(StatusCode, Json<RecordResponse>)> {
    let (record, enrichment) = state.enrichment.add_record(request).await?;
    tracing::info!(uuid = %record.uuid, item_id = %record.item_id, "Record added");
    Ok((StatusCode::CREATED, Json(RecordResponse { record, enrichment })))
}

/// PUT /records/:uuid/item
///
/// Clears the record's invalid flag and re-enriches the new id.
pub async fn change_item(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
    Json(request): Json<ChangeItemRequest>,
) -> ApiResult<Json<RecordResponse>> {
    let (record, enrichment) = state.enrichment.change_record_item(uuid, &request.item_id).await?;
    state.event_bus.show_success(
        &format!("Updated to {}", record.item_id),
        NotificationOptions::default(),
    );
    Ok(Json(RecordResponse { record, enrichment }))
}

/// DELETE /records/:uuid
pub async fn remove_record(State(state): State<AppState>, Path(uuid): Path<Uuid>) -> ApiResult<StatusCode> {
    if records::delete_record(&state.db, uuid).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Record not found: {}", uuid)))
    }
}

pub fn record_routes() -> Router<AppState> {
    Router::new()
        .route("/tables/:table_id/records", get(list_table_records))
        .route("/records", post(add_record))
        .route("/records/:uuid/item", put(change_item))
        .route("/records/:uuid", delete(remove_record))
}
