//! Trip session handlers.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::get,
};
use chrono::NaiveDate;
use serde::Deserialize;

use fuelops_core::trip::Trip;
use fuelops_core::{TripId, UnitId};

use crate::error::AppError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::services::TripService;
use crate::services::trips::{DeletedTrip, TripPatch};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/trips", get(list_trips).post(create_trip))
        .route(
            "/trips/{id}",
            get(get_trip).patch(patch_trip).delete(delete_trip),
        )
}

/// A truck and one of its days.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TruckDay {
    pub truck_id: UnitId,
    pub date: NaiveDate,
}

async fn create_trip(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<TruckDay>,
) -> Result<(StatusCode, Json<Trip>), AppError> {
    let trip = TripService::new(state.pool())
        .create(input.truck_id, input.date)
        .await?;
    Ok((StatusCode::CREATED, Json(trip)))
}

async fn list_trips(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<TruckDay>,
) -> Result<Json<Vec<Trip>>, AppError> {
    let trips = TripService::new(state.pool())
        .list(query.truck_id, query.date)
        .await?;
    Ok(Json(trips))
}

async fn get_trip(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<TripId>,
) -> Result<Json<Trip>, AppError> {
    Ok(Json(TripService::new(state.pool()).get(id).await?))
}

async fn patch_trip(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<TripId>,
    ApiJson(patch): ApiJson<TripPatch>,
) -> Result<Json<Trip>, AppError> {
    Ok(Json(TripService::new(state.pool()).patch(id, patch).await?))
}

async fn delete_trip(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<TripId>,
) -> Result<Json<DeletedTrip>, AppError> {
    Ok(Json(TripService::new(state.pool()).delete(id).await?))
}
