//! Unit registry handlers.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;

use fuelops_core::unit::{NewUnit, Unit, UnitPatch};
use fuelops_core::{UnitId, UnitType};

use crate::error::AppError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::services::RegistryService;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/units", get(list_units).post(create_unit))
        .route("/units/{id}", get(get_unit).patch(update_unit))
        .route("/units/{id}/deactivate", post(deactivate_unit))
}

#[derive(Debug, Default, Deserialize)]
pub struct UnitsQuery {
    #[serde(rename = "type")]
    pub unit_type: Option<UnitType>,
}

async fn create_unit(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewUnit>,
) -> Result<(StatusCode, Json<Unit>), AppError> {
    let unit = RegistryService::new(state.pool()).create_unit(input).await?;
    Ok((StatusCode::CREATED, Json(unit)))
}

async fn list_units(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<UnitsQuery>,
) -> Result<Json<Vec<Unit>>, AppError> {
    let units = RegistryService::new(state.pool())
        .list_units(query.unit_type)
        .await?;
    Ok(Json(units))
}

async fn get_unit(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<UnitId>,
) -> Result<Json<Unit>, AppError> {
    Ok(Json(RegistryService::new(state.pool()).get_unit(id).await?))
}

async fn update_unit(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<UnitId>,
    ApiJson(patch): ApiJson<UnitPatch>,
) -> Result<Json<Unit>, AppError> {
    let unit = RegistryService::new(state.pool())
        .update_unit(id, patch)
        .await?;
    Ok(Json(unit))
}

async fn deactivate_unit(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<UnitId>,
) -> Result<Json<Unit>, AppError> {
    let unit = RegistryService::new(state.pool()).deactivate_unit(id).await?;
    Ok(Json(unit))
}
