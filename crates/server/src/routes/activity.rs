//! Ledger activity handlers: sales, internal transfers and testing.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;

use fuelops_core::TransferId;
use fuelops_core::transfer::{TransferAudit, TransferPatch, TransferRecord, TransferRequest};

use crate::error::AppError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::services::TransferService;
use crate::services::transfers::RecordedTransfer;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/lots/activity", post(record))
        .route(
            "/lots/activity/{id}",
            get(get_record).patch(edit).delete(void),
        )
        .route("/lots/activity/{id}/audit", get(audit))
}

/// Optional reason attached to a void.
#[derive(Debug, Default, Deserialize)]
pub struct VoidQuery {
    pub reason: Option<String>,
}

async fn record(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<TransferRequest>,
) -> Result<(StatusCode, Json<RecordedTransfer>), AppError> {
    let recorded = TransferService::new(state.pool()).record(request).await?;
    Ok((StatusCode::CREATED, Json(recorded)))
}

async fn get_record(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<TransferId>,
) -> Result<Json<TransferRecord>, AppError> {
    Ok(Json(TransferService::new(state.pool()).get(id).await?))
}

async fn edit(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<TransferId>,
    ApiJson(patch): ApiJson<TransferPatch>,
) -> Result<Json<TransferRecord>, AppError> {
    Ok(Json(TransferService::new(state.pool()).edit(id, patch).await?))
}

async fn void(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<TransferId>,
    ApiQuery(query): ApiQuery<VoidQuery>,
) -> Result<Json<TransferRecord>, AppError> {
    let voided = TransferService::new(state.pool())
        .void(id, query.reason)
        .await?;
    Ok(Json(voided))
}

async fn audit(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<TransferId>,
) -> Result<Json<Vec<TransferAudit>>, AppError> {
    Ok(Json(TransferService::new(state.pool()).audit(id).await?))
}
