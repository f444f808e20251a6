//! Day-level readings: dispenser, odometer, day log and meter snapshots.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use chrono::NaiveDate;
use serde::Deserialize;

use fuelops_core::UnitId;
use fuelops_core::readings::{DayLogEntry, DayLogNote, DispenserDay, NewDayLogNote, OdometerDay};
use fuelops_core::stock::{MeterSnapshot, NewMeterSnapshot};

use crate::error::AppError;
use crate::extract::{ApiJson, ApiQuery};
use crate::services::ReadingsService;
use crate::services::readings::{DispenserClosing, DispenserOpening, OdometerInput};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/day/dispenser",
            get(dispenser).post(open_dispenser).patch(close_dispenser),
        )
        .route(
            "/day/odometer",
            get(odometer).post(record_odometer).patch(patch_odometer),
        )
        .route("/day/logs", get(day_log).post(add_note))
        .route("/meter-snapshots", post(record_snapshot))
}

/// A unit and one of its days. `unit_id` is accepted for `truck_id`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DayQuery {
    #[serde(alias = "unit_id")]
    pub truck_id: UnitId,
    pub date: NaiveDate,
}

async fn dispenser(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<DayQuery>,
) -> Result<Json<DispenserDay>, AppError> {
    let day = ReadingsService::new(state.pool())
        .dispenser(query.truck_id, query.date)
        .await?;
    Ok(Json(day))
}

async fn open_dispenser(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<DispenserOpening>,
) -> Result<(StatusCode, Json<DispenserDay>), AppError> {
    let day = ReadingsService::new(state.pool())
        .open_dispenser(input)
        .await?;
    Ok((StatusCode::CREATED, Json(day)))
}

async fn close_dispenser(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<DispenserClosing>,
) -> Result<Json<DispenserDay>, AppError> {
    let day = ReadingsService::new(state.pool())
        .close_dispenser(input)
        .await?;
    Ok(Json(day))
}

async fn odometer(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<DayQuery>,
) -> Result<Json<OdometerDay>, AppError> {
    let day = ReadingsService::new(state.pool())
        .odometer(query.truck_id, query.date)
        .await?;
    Ok(Json(day))
}

async fn record_odometer(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<OdometerInput>,
) -> Result<(StatusCode, Json<OdometerDay>), AppError> {
    let day = ReadingsService::new(state.pool())
        .record_odometer(input)
        .await?;
    Ok((StatusCode::CREATED, Json(day)))
}

async fn patch_odometer(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<OdometerInput>,
) -> Result<Json<OdometerDay>, AppError> {
    let day = ReadingsService::new(state.pool())
        .patch_odometer(input)
        .await?;
    Ok(Json(day))
}

async fn day_log(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<DayQuery>,
) -> Result<Json<Vec<DayLogEntry>>, AppError> {
    let entries = ReadingsService::new(state.pool())
        .day_log(query.truck_id, query.date)
        .await?;
    Ok(Json(entries))
}

async fn add_note(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewDayLogNote>,
) -> Result<(StatusCode, Json<DayLogNote>), AppError> {
    let note = ReadingsService::new(state.pool()).add_note(input).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

async fn record_snapshot(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewMeterSnapshot>,
) -> Result<(StatusCode, Json<MeterSnapshot>), AppError> {
    let snapshot = ReadingsService::new(state.pool())
        .record_snapshot(input)
        .await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}
