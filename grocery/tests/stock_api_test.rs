//! Stock ledger endpoints over the full router.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use axum::http::StatusCode;
use chrono::Duration;
use common::{as_admin, as_customer, int, TestApp};
use grocery_core::UserId;
use grocery_testing::mocks::{test_instant, ManualClock};
use grocery_testing::InMemoryStore;
use serde_json::{json, Value};
use std::sync::Arc;

#[tokio::test]
async fn check_reports_each_line() {
    let app = TestApp::new();
    let milk = app.store.seed_product("Milk", 10, 199);
    let eggs = app.store.seed_product("Eggs", 4, 349);
    app.store.set_counters(eggs.id, 4, 4, Some(test_instant()));

    let response = app
        .server
        .post("/api/stock/check")
        .json(&json!({"items": [
            {"product_id": milk.id, "quantity": 3},
            {"product_id": eggs.id, "quantity": 1},
        ]}))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["all_available"], json!(false));
    assert_eq!(body["stock_details"][0]["can_fulfill"], json!(true));
    assert_eq!(int(&body["stock_details"][0], "available_now"), 10);
    assert_eq!(
        body["unavailable_items"][0]["reason"],
        json!("Other users are currently purchasing this item")
    );
    assert_eq!(int(&body["unavailable_items"][0], "available"), 0);
}

#[tokio::test]
async fn check_unknown_product_is_not_found_line() {
    let app = TestApp::new();
    let response = app
        .server
        .post("/api/stock/check")
        .json(&json!({"items": [{"product_id": uuid::Uuid::new_v4(), "quantity": 1}]}))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["all_available"], json!(false));
    assert_eq!(body["unavailable_items"][0]["reason"], json!("Product not found"));
}

#[tokio::test]
async fn reserve_is_all_or_nothing() {
    let app = TestApp::new();
    let user = UserId::new();
    let bread = app.store.seed_product("Bread", 5, 250);
    let jam = app.store.seed_product("Jam", 1, 450);

    let response = as_customer(app.server.post("/api/stock/reserve"), user)
        .json(&json!({"items": [
            {"product_id": bread.id, "quantity": 2},
            {"product_id": jam.id, "quantity": 3},
        ]}))
        .await;

    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["message"], json!("Some items could not be reserved"));
    let failed = body["failed_items"].as_array().unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["product_id"], json!(jam.id));
    assert!(app.store.levels().iter().all(|level| level.buying_in_progress == 0));
}

#[tokio::test]
async fn reserve_then_release_restores_counters() {
    let app = TestApp::new();
    let user = UserId::new();
    let rice = app.store.seed_product("Rice", 8, 899);
    let items = json!({"items": [{"product_id": rice.id, "quantity": 3}]});

    let reserved = as_customer(app.server.post("/api/stock/reserve"), user)
        .json(&items)
        .await;
    reserved.assert_status_ok();
    let body: Value = reserved.json();
    assert_eq!(body["message"], json!("Stock reserved successfully"));
    assert_eq!(int(&body["reserved_items"][0], "buying_in_progress"), 3);
    assert_eq!(int(&body["reserved_items"][0], "available_now"), 5);

    let released = as_customer(app.server.post("/api/stock/release"), user)
        .json(&items)
        .await;
    released.assert_status_ok();
    let body: Value = released.json();
    assert_eq!(body["message"], json!("Stock released successfully"));
    assert_eq!(int(&body["released_items"][0], "buying_in_progress"), 0);

    let level = &app.store.levels()[0];
    assert_eq!(level.total_available_stock, 8);
    assert_eq!(level.buying_in_progress, 0);
}

#[tokio::test]
async fn release_never_goes_negative() {
    let app = TestApp::new();
    let oil = app.store.seed_product("Oil", 6, 599);
    app.store.set_counters(oil.id, 6, 1, Some(test_instant()));

    let response = as_customer(app.server.post("/api/stock/release"), UserId::new())
        .json(&json!({"items": [{"product_id": oil.id, "quantity": 4}]}))
        .await;

    response.assert_status_ok();
    assert_eq!(app.store.levels()[0].buying_in_progress, 0);
}

#[tokio::test]
async fn last_unit_goes_to_exactly_one_buyer() {
    let app = TestApp::new();
    let cake = app.store.seed_product("Cake", 1, 1500);
    let items = json!({"items": [{"product_id": cake.id, "quantity": 1}]});

    let first = as_customer(app.server.post("/api/stock/reserve"), UserId::new()).json(&items);
    let second = as_customer(app.server.post("/api/stock/reserve"), UserId::new()).json(&items);
    let (first, second) = tokio::join!(first.into_future(), second.into_future());

    let mut statuses = [first.status_code().as_u16(), second.status_code().as_u16()];
    statuses.sort_unstable();
    assert_eq!(statuses, [200, 409]);
    assert_eq!(app.store.levels()[0].buying_in_progress, 1);
}

#[tokio::test]
async fn malformed_batches_are_rejected() {
    let app = TestApp::new();
    let user = UserId::new();
    let bodies = [
        json!({}),
        json!({"items": "milk"}),
        json!({"items": []}),
        json!({"items": [{"product_id": "not-a-uuid", "quantity": 1}]}),
        json!({"items": [{"product_id": uuid::Uuid::new_v4(), "quantity": 0}]}),
    ];

    for body in &bodies {
        let response = as_customer(app.server.post("/api/stock/reserve"), user)
            .json(body)
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST, "body {body}");
    }
}

#[tokio::test]
async fn reserve_requires_identity() {
    let app = TestApp::new();
    let tea = app.store.seed_product("Tea", 3, 399);

    let response = app
        .server
        .post("/api/stock/reserve")
        .json(&json!({"items": [{"product_id": tea.id, "quantity": 1}]}))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(app.store.levels()[0].buying_in_progress, 0);
}

#[tokio::test]
async fn realtime_returns_current_levels() {
    let app = TestApp::new();
    let salt = app.store.seed_product("Salt", 12, 99);
    app.store.set_counters(salt.id, 12, 5, Some(test_instant()));

    let response = app
        .server
        .post("/api/stock/realtime")
        .json(&json!({"product_ids": [salt.id]}))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    let product = &body["products"][0];
    assert_eq!(product["product_name"], json!("Salt"));
    assert_eq!(int(product, "available_now"), 7);

    let empty = app
        .server
        .post("/api/stock/realtime")
        .json(&json!({"product_ids": []}))
        .await;
    empty.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stuck_endpoints_are_admin_only() {
    let app = TestApp::new();

    as_customer(app.server.get("/api/admin/stock/stuck"), UserId::new())
        .await
        .assert_status(StatusCode::FORBIDDEN);
    app.server
        .get("/api/admin/stock/stuck")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn reset_without_body_clears_every_reservation() {
    let app = TestApp::new();
    let admin = UserId::new();
    let flour = app.store.seed_product("Flour", 9, 299);
    let sugar = app.store.seed_product("Sugar", 9, 199);
    app.store.set_counters(flour.id, 9, 2, Some(test_instant()));
    app.store.set_counters(sugar.id, 9, 4, Some(test_instant()));

    let stuck = as_admin(app.server.get("/api/admin/stock/stuck"), admin).await;
    stuck.assert_status_ok();
    assert_eq!(int(&stuck.json::<Value>(), "count"), 2);

    let reset = as_admin(app.server.post("/api/admin/stock/stuck/reset"), admin).await;
    reset.assert_status_ok();
    let body: Value = reset.json();
    assert_eq!(int(&body, "reset_count"), 2);
    assert_eq!(body["message"], json!("Reset 2 stuck reservation(s)"));
    assert!(app.store.levels().iter().all(|level| level.buying_in_progress == 0));
}

#[tokio::test]
async fn reset_with_age_only_touches_old_reservations() {
    let clock = Arc::new(ManualClock::new(test_instant()));
    let app = TestApp::with_store(InMemoryStore::with_clock(clock.clone()));
    let admin = UserId::new();
    let old = app.store.seed_product("Old", 5, 100);
    let fresh = app.store.seed_product("Fresh", 5, 100);
    app.store
        .set_counters(old.id, 5, 2, Some(test_instant() - Duration::minutes(45)));
    app.store
        .set_counters(fresh.id, 5, 3, Some(test_instant() - Duration::minutes(5)));

    let response = as_admin(app.server.post("/api/admin/stock/stuck/reset"), admin)
        .json(&json!({"older_than_minutes": 30}))
        .await;

    response.assert_status_ok();
    assert_eq!(int(&response.json::<Value>(), "reset_count"), 1);
    let levels = app.store.levels();
    assert_eq!(levels[0].buying_in_progress, 0);
    assert_eq!(levels[1].buying_in_progress, 3);
}

#[tokio::test]
async fn reset_rejects_malformed_json() {
    let app = TestApp::new();

    let response = as_admin(app.server.post("/api/admin/stock/stuck/reset"), UserId::new())
        .text("{not json")
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}
