//! Unified error handling for the HTTP boundary.
//!
//! Every error renders as `{"error": <kind>, "message": <text>}`. Ledger
//! errors keep their message; database and internal errors are captured to
//! Sentry and reach the client only as a generic message.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use fuelops_core::LedgerError;

use crate::db::RepositoryError;
use crate::services::ServiceError;

/// Application-level error type for the ledger service.
#[derive(Debug, Error)]
pub enum AppError {
    /// A ledger rule rejected the request.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(RepositoryError),

    /// Request body, query or path could not be parsed.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Machine-readable kind sent as `error`.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Ledger(e) => e.kind(),
            Self::BadRequest(_) => "validation_error",
            Self::Database(_) | Self::Internal(_) => "internal_error",
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Ledger(LedgerError::Validation(_)) | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Ledger(LedgerError::InsufficientStock { .. } | LedgerError::Overdraw { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::Ledger(LedgerError::TripRequired { .. }) => StatusCode::LOCKED,
            Self::Ledger(LedgerError::Conflict(_)) => StatusCode::CONFLICT,
            Self::Ledger(LedgerError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(message) => Self::Ledger(LedgerError::Conflict(message)),
            RepositoryError::NotFound => Self::Ledger(LedgerError::not_found("resource", "requested")),
            other => Self::Database(other),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Ledger(e) => Self::Ledger(e),
            ServiceError::Repository(e) => e.into(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Ledger request error"
            );
        } else {
            tracing::debug!(error = %self, kind = self.kind(), "Ledger request rejected");
        }

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        };

        (
            status,
            Json(json!({ "error": self.kind(), "message": message })),
        )
            .into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::*;

    fn status_of(err: impl Into<AppError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn test_ledger_error_status_codes() {
        assert_eq!(
            status_of(LedgerError::validation("negative volume")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(LedgerError::InsufficientStock {
                lot_code: "LOT05MAR24T1A4000".to_string(),
                requested: Decimal::from(3000),
                remaining: Decimal::from(2500),
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(LedgerError::Overdraw {
                unit_code: "T1".to_string(),
                requested: Decimal::from(10),
                available: Decimal::ZERO,
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(LedgerError::TripRequired {
                unit_code: "T1".to_string(),
                date: NaiveDate::from_ymd_opt(2024, 3, 6).unwrap(),
            }),
            StatusCode::LOCKED
        );
        assert_eq!(
            status_of(LedgerError::conflict("trip 1 must be closed")),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(LedgerError::not_found("unit", 42)),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_repository_errors_map_by_kind() {
        assert_eq!(
            status_of(RepositoryError::Conflict("duplicate".to_string())),
            StatusCode::CONFLICT
        );
        assert_eq!(status_of(RepositoryError::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(RepositoryError::DataCorruption("bad row".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_service_error_unwraps_to_ledger_kind() {
        let err = AppError::from(ServiceError::from(LedgerError::conflict("busy")));
        assert_eq!(err.kind(), "conflict");
        let err = AppError::from(ServiceError::from(RepositoryError::NotFound));
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_body_carries_kind_and_message() {
        let response = AppError::from(LedgerError::TripRequired {
            unit_code: "T1".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, 6).unwrap(),
        })
        .into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "trip_required");
        assert_eq!(
            body["message"],
            "readings locked: no trip exists for T1 on 2024-03-06"
        );
    }

    #[tokio::test]
    async fn test_internal_details_are_hidden() {
        let response =
            AppError::Database(RepositoryError::DataCorruption("secret".to_string())).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "internal_error");
        assert_eq!(body["message"], "Internal server error");
    }
}
