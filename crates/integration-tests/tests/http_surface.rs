//! Request handling that does not reach the database: health, request IDs,
//! and rejection of malformed input with the JSON error body.

use axum::http::{Method, StatusCode};
use fuelops_integration_tests::TestContext;
use serde_json::json;

#[tokio::test]
async fn test_health_is_ok_without_database() {
    let ctx = TestContext::unconnected();
    let (status, _, body) = ctx.send_raw(Method::GET, "/health", None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"ok");
}

#[tokio::test]
async fn test_readiness_reports_unreachable_database() {
    let ctx = TestContext::unconnected();
    let (status, _) = ctx.get("/health/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let ctx = TestContext::unconnected();
    let (_, headers, _) = ctx
        .send_raw(Method::GET, "/health", None, &[("x-request-id", "abc-123")])
        .await;
    assert_eq!(headers["x-request-id"], "abc-123");
}

#[tokio::test]
async fn test_request_id_is_generated_when_missing() {
    let ctx = TestContext::unconnected();
    let (_, headers, _) = ctx.send_raw(Method::GET, "/health", None, &[]).await;
    let id = headers["x-request-id"].to_str().unwrap_or_default();
    assert_eq!(id.len(), 36);
}

#[tokio::test]
async fn test_malformed_body_is_validation_error() {
    let ctx = TestContext::unconnected();
    let (status, body) = ctx
        .post("/lots/activity", &json!({ "activity": "SALE", "from_unit_id": 1 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
    assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));
}

#[tokio::test]
async fn test_unknown_activity_is_rejected() {
    let ctx = TestContext::unconnected();
    let (status, body) = ctx
        .post(
            "/lots/activity",
            &json!({
                "activity": "REFUND",
                "from_unit_id": 1,
                "volume_liters": "10",
                "performed_at": "2024-03-05T09:00:00",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_missing_query_parameter_is_rejected() {
    let ctx = TestContext::unconnected();
    let (status, body) = ctx.get("/reconcile/daily?truck_id=1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_bad_path_id_is_rejected() {
    let ctx = TestContext::unconnected();
    let (status, body) = ctx.get("/trips/not-a-number").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_inverted_range_is_rejected_before_querying() {
    let ctx = TestContext::unconnected();
    let (status, body) = ctx
        .get("/reconcile/range?truck_id=1&from=2024-03-10&to=2024-03-01")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_negative_tolerance_is_rejected_before_querying() {
    let ctx = TestContext::unconnected();
    let (status, body) = ctx
        .get("/reconcile/daily?truck_id=1&date=2024-03-05&tolerance=-1")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_empty_trip_patch_is_rejected_before_querying() {
    let ctx = TestContext::unconnected();
    let (status, body) = ctx.patch("/trips/1", &json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_oversized_meter_snapshot_is_rejected() {
    let ctx = TestContext::unconnected();
    let (status, body) = ctx
        .post(
            "/meter-snapshots",
            &json!({ "truck_id": 1, "reading_liters": "100000000000" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "snapshot: {body}");
    assert_eq!(body["error"], "validation_error");
}
