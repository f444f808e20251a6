//! Lot ledger handlers: purchases, listings and CSV export.

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};

use fuelops_core::LotId;
use fuelops_core::lot::NewPurchase;

use crate::db::lots::{LotFilter, LotListing};
use crate::error::AppError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::services::LedgerService;
use crate::state::AppState;

const EXPORT_FILENAME: &str = "lots.csv";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/lots", post(create_purchase))
        .route("/lots/list", get(list_lots))
        .route("/lots/export", get(export_lots))
        .route("/lots/{id}", get(get_lot))
}

async fn create_purchase(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewPurchase>,
) -> Result<(StatusCode, Json<LotListing>), AppError> {
    let lot = LedgerService::new(state.pool()).create_purchase(input).await?;
    Ok((StatusCode::CREATED, Json(lot)))
}

async fn list_lots(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<LotFilter>,
) -> Result<Json<Vec<LotListing>>, AppError> {
    let lots = LedgerService::new(state.pool()).list_lots(&filter).await?;
    Ok(Json(lots))
}

async fn export_lots(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<LotFilter>,
) -> Result<impl IntoResponse, AppError> {
    let csv = LedgerService::new(state.pool()).export_lots(&filter).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{EXPORT_FILENAME}\""),
            ),
        ],
        csv,
    ))
}

async fn get_lot(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<LotId>,
) -> Result<Json<LotListing>, AppError> {
    Ok(Json(LedgerService::new(state.pool()).get_lot(id).await?))
}
