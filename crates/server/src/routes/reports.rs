//! Read-side handlers: operations views, reconciliation and stock summary.

use axum::{Json, Router, extract::State, routing::get};
use chrono::NaiveDate;
use serde::Deserialize;

use fuelops_core::ops::OperationsView;
use fuelops_core::reconcile::ReconciliationResult;
use fuelops_core::stock::StockSummary;
use fuelops_core::{Liters, TripId, UnitId};

use crate::error::AppError;
use crate::extract::ApiQuery;
use crate::services::ReportService;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ops/day", get(ops_day))
        .route("/ops/trip", get(ops_trip))
        .route("/reconcile/daily", get(reconcile_daily))
        .route("/reconcile/range", get(reconcile_range))
        .route("/reconcile/trip", get(reconcile_trip))
        .route("/stock/summary", get(stock_summary))
}

fn reports(state: &AppState) -> ReportService<'_> {
    ReportService::new(state.pool(), state.config().default_tolerance_liters)
}

#[derive(Debug, Deserialize)]
pub struct OpsDayQuery {
    #[serde(alias = "truck_id")]
    pub unit_id: UnitId,
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct TripQuery {
    pub trip_id: TripId,
    pub tolerance: Option<Liters>,
}

#[derive(Debug, Deserialize)]
pub struct DailyQuery {
    pub truck_id: UnitId,
    pub date: NaiveDate,
    pub tolerance: Option<Liters>,
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub truck_id: UnitId,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub tolerance: Option<Liters>,
}

async fn ops_day(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<OpsDayQuery>,
) -> Result<Json<OperationsView>, AppError> {
    let view = reports(&state).ops_day(query.unit_id, query.date).await?;
    Ok(Json(view))
}

async fn ops_trip(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<TripQuery>,
) -> Result<Json<OperationsView>, AppError> {
    Ok(Json(reports(&state).ops_trip(query.trip_id).await?))
}

async fn reconcile_daily(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<DailyQuery>,
) -> Result<Json<ReconciliationResult>, AppError> {
    let result = reports(&state)
        .reconcile_daily(query.truck_id, query.date, query.tolerance)
        .await?;
    Ok(Json(result))
}

async fn reconcile_range(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<RangeQuery>,
) -> Result<Json<Vec<ReconciliationResult>>, AppError> {
    let results = reports(&state)
        .reconcile_range(query.truck_id, query.from, query.to, query.tolerance)
        .await?;
    Ok(Json(results))
}

async fn reconcile_trip(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<TripQuery>,
) -> Result<Json<ReconciliationResult>, AppError> {
    let result = reports(&state)
        .reconcile_trip(query.trip_id, query.tolerance)
        .await?;
    Ok(Json(result))
}

async fn stock_summary(
    State(state): State<AppState>,
) -> Result<Json<Vec<StockSummary>>, AppError> {
    Ok(Json(reports(&state).stock_summary().await?))
}
