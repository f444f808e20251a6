//! Driver handlers.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, patch, post},
};
use serde::Deserialize;

use fuelops_core::DriverId;
use fuelops_core::driver::{Driver, DriverPatch, NewDriver};

use crate::error::AppError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::services::RegistryService;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/drivers", get(list_drivers).post(create_driver))
        .route("/drivers/{id}", patch(update_driver))
        .route("/drivers/{id}/deactivate", post(deactivate_driver))
}

#[derive(Debug, Default, Deserialize)]
pub struct DriversQuery {
    #[serde(default)]
    pub active_only: bool,
}

async fn create_driver(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewDriver>,
) -> Result<(StatusCode, Json<Driver>), AppError> {
    let driver = RegistryService::new(state.pool()).create_driver(input).await?;
    Ok((StatusCode::CREATED, Json(driver)))
}

async fn list_drivers(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<DriversQuery>,
) -> Result<Json<Vec<Driver>>, AppError> {
    let drivers = RegistryService::new(state.pool())
        .list_drivers(query.active_only)
        .await?;
    Ok(Json(drivers))
}

async fn update_driver(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<DriverId>,
    ApiJson(patch): ApiJson<DriverPatch>,
) -> Result<Json<Driver>, AppError> {
    let driver = RegistryService::new(state.pool())
        .update_driver(id, patch)
        .await?;
    Ok(Json(driver))
}

async fn deactivate_driver(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<DriverId>,
) -> Result<Json<Driver>, AppError> {
    let driver = RegistryService::new(state.pool())
        .deactivate_driver(id)
        .await?;
    Ok(Json(driver))
}
