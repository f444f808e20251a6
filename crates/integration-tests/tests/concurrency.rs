//! Concurrent writers against the same units.
//!
//! Each test returns early unless `FUELOPS_TEST_DATABASE_URL` is set.

use axum::http::StatusCode;
use fuelops_integration_tests::{TestContext, id, liters};
use rust_decimal::Decimal;
use serde_json::{Value, json};

const DAY: &str = "2024-03-05";

fn sale(truck_id: i64, volume: &str) -> Value {
    json!({
        "activity": "SALE",
        "from_unit_id": truck_id,
        "to_vehicle": "KA01MN4321",
        "volume_liters": volume,
        "performed_at": "2024-03-05T09:30:00",
    })
}

#[tokio::test]
async fn test_competing_sales_never_overdraw_a_lot() {
    let Some(ctx) = TestContext::from_env().await else {
        return;
    };
    let truck_id = id(&ctx.create_unit("TRUCK", 6000).await);
    let lot_id = id(&ctx.purchase(truck_id, "4000", DAY).await);
    ctx.open_trip(truck_id, DAY, "0").await;

    let first = sale(truck_id, "3000");
    let second = sale(truck_id, "3000");
    let ((a, _), (b, _)) = tokio::join!(
        ctx.post("/lots/activity", &first),
        ctx.post("/lots/activity", &second),
    );
    let mut statuses = [a, b];
    statuses.sort();
    assert_eq!(
        statuses,
        [StatusCode::CREATED, StatusCode::UNPROCESSABLE_ENTITY]
    );

    let (_, lot) = ctx.get(&format!("/lots/{lot_id}")).await;
    assert_eq!(liters(&lot["remaining_liters"]), Decimal::from(1000));
}

#[tokio::test]
async fn test_sales_that_fit_all_succeed() {
    let Some(ctx) = TestContext::from_env().await else {
        return;
    };
    let truck_id = id(&ctx.create_unit("TRUCK", 6000).await);
    let lot_id = id(&ctx.purchase(truck_id, "4000", DAY).await);
    ctx.open_trip(truck_id, DAY, "0").await;

    let request = sale(truck_id, "500");
    let results = tokio::join!(
        ctx.post("/lots/activity", &request),
        ctx.post("/lots/activity", &request),
        ctx.post("/lots/activity", &request),
        ctx.post("/lots/activity", &request),
        ctx.post("/lots/activity", &request),
    );
    for (status, body) in [results.0, results.1, results.2, results.3, results.4] {
        assert_eq!(status, StatusCode::CREATED, "sale: {body}");
    }

    let (_, lot) = ctx.get(&format!("/lots/{lot_id}")).await;
    assert_eq!(liters(&lot["remaining_liters"]), Decimal::from(1500));
    assert_eq!(liters(&lot["used_liters"]), Decimal::from(2500));
}

#[tokio::test]
async fn test_opposing_transfers_do_not_deadlock() {
    let Some(ctx) = TestContext::from_env().await else {
        return;
    };
    let left = id(&ctx.create_unit("TRUCK", 6000).await);
    let right = id(&ctx.create_unit("TRUCK", 6000).await);
    ctx.purchase(left, "2000", DAY).await;
    ctx.purchase(right, "2000", DAY).await;
    ctx.open_trip(left, DAY, "0").await;
    ctx.open_trip(right, DAY, "0").await;

    let transfer = |from: i64, to: i64| {
        json!({
            "activity": "TANKER_TO_TANKER",
            "from_unit_id": from,
            "to_unit_id": to,
            "volume_liters": "250",
            "performed_at": "2024-03-05T10:00:00",
        })
    };
    let there = transfer(left, right);
    let back = transfer(right, left);
    let ((a, a_body), (b, b_body)) = tokio::join!(
        ctx.post("/lots/activity", &there),
        ctx.post("/lots/activity", &back),
    );
    assert_eq!(a, StatusCode::CREATED, "left to right: {a_body}");
    assert_eq!(b, StatusCode::CREATED, "right to left: {b_body}");

    for unit in [left, right] {
        let (_, view) = ctx
            .get(&format!("/ops/day?unit_id={unit}&date={DAY}"))
            .await;
        assert_eq!(liters(&view["remaining_liters"]), Decimal::from(2000));
    }
}

#[tokio::test]
async fn test_concurrent_trip_creation_keeps_numbering() {
    let Some(ctx) = TestContext::from_env().await else {
        return;
    };
    let truck_id = id(&ctx.create_unit("TRUCK", 6000).await);
    let request = json!({ "truck_id": truck_id, "date": DAY });

    let ((a, _), (b, _)) = tokio::join!(ctx.post("/trips", &request), ctx.post("/trips", &request));
    let mut statuses = [a, b];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::CREATED, StatusCode::CONFLICT]);

    let (_, trips) = ctx
        .get(&format!("/trips?truck_id={truck_id}&date={DAY}"))
        .await;
    assert_eq!(trips.as_array().map(Vec::len), Some(1));
    assert_eq!(trips[0]["trip_no"], 1);
}
