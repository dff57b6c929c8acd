//! Cart, checkout, delivery and return flow over the full router.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use axum::http::StatusCode;
use common::{as_admin, as_customer, int, TestApp};
use grocery_core::users::Role;
use grocery_core::UserId;
use serde_json::{json, Value};

async fn add_to_cart(app: &TestApp, user: UserId, product: grocery_core::ProductId, quantity: u32) {
    as_customer(app.server.post("/api/cart/items"), user)
        .json(&json!({"product_id": product, "quantity": quantity}))
        .await
        .assert_status_ok();
}

async fn place_order(app: &TestApp, user: UserId) -> Value {
    let response = as_customer(app.server.post("/api/orders"), user).await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Value>()["order"].clone()
}

#[tokio::test]
async fn cart_merges_lines_and_totals() {
    let app = TestApp::new();
    let user = UserId::new();
    let apple = app.store.seed_product("Apple", 20, 50);

    add_to_cart(&app, user, apple.id, 2).await;
    let response = as_customer(app.server.post("/api/cart/items"), user)
        .json(&json!({"product_id": apple.id, "quantity": 3}))
        .await;

    response.assert_status_ok();
    let cart: Value = response.json();
    assert_eq!(cart["lines"].as_array().unwrap().len(), 1);
    assert_eq!(int(&cart["lines"][0], "quantity"), 5);
    assert_eq!(int(&cart, "total_cents"), 250);

    let updated = as_customer(app.server.put(&format!("/api/cart/items/{}", apple.id)), user)
        .json(&json!({"quantity": 1}))
        .await;
    updated.assert_status_ok();
    assert_eq!(int(&updated.json::<Value>(), "total_cents"), 50);

    as_customer(app.server.delete("/api/cart"), user)
        .await
        .assert_status(StatusCode::NO_CONTENT);
    let empty: Value = as_customer(app.server.get("/api/cart"), user).await.json();
    assert!(empty["lines"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn full_lifecycle_from_cart_to_refund() {
    let app = TestApp::new();
    let customer = app.store.seed_user("ada@example.com", Role::Customer).id;
    let admin = app.store.seed_user("ops@example.com", Role::Admin).id;
    let coffee = app.store.seed_product("Coffee", 10, 1200);

    add_to_cart(&app, customer, coffee.id, 3).await;
    let order = place_order(&app, customer).await;
    assert_eq!(order["status"], json!("pending_payment"));
    assert_eq!(int(&order, "total_cents"), 3600);
    assert_eq!(app.store.levels()[0].buying_in_progress, 3);
    let order_id = order["id"].as_str().unwrap().to_string();

    // Payment turns the reservation into a deduction
    let paid = as_customer(app.server.post(&format!("/api/orders/{order_id}/confirm")), customer).await;
    paid.assert_status_ok();
    assert_eq!(paid.json::<Value>()["status"], json!("paid"));
    let level = &app.store.levels()[0];
    assert_eq!(level.total_available_stock, 7);
    assert_eq!(level.buying_in_progress, 0);

    let delivery = as_admin(app.server.post("/api/admin/deliveries"), admin)
        .json(&json!({"order_id": order_id, "courier": "Bike Co"}))
        .await;
    delivery.assert_status(StatusCode::CREATED);
    let delivery_id = delivery.json::<Value>()["id"].as_str().unwrap().to_string();

    for status in ["out_for_delivery", "delivered"] {
        as_admin(app.server.post(&format!("/api/admin/deliveries/{delivery_id}/status")), admin)
            .json(&json!({"status": status, "note": " on the way "}))
            .await
            .assert_status_ok();
    }

    let tracking = as_customer(app.server.get(&format!("/api/orders/{order_id}/delivery")), customer).await;
    tracking.assert_status_ok();
    let tracking: Value = tracking.json();
    assert_eq!(tracking["delivery"]["status"], json!("delivered"));
    assert_eq!(tracking["events"].as_array().unwrap().len(), 3);

    let stranger = as_customer(app.server.get(&format!("/api/orders/{order_id}/delivery")), UserId::new()).await;
    stranger.assert_status(StatusCode::NOT_FOUND);

    let delivered: Value = as_customer(app.server.get(&format!("/api/orders/{order_id}")), customer)
        .await
        .json();
    assert_eq!(delivered["status"], json!("delivered"));

    let request = as_customer(app.server.post("/api/returns"), customer)
        .json(&json!({
            "order_id": order_id,
            "product_id": coffee.id,
            "quantity": 2,
            "reason": "Bag arrived torn",
        }))
        .await;
    request.assert_status(StatusCode::CREATED);
    let request: Value = request.json();
    assert_eq!(request["status"], json!("pending"));
    assert_eq!(int(&request, "refund_cents"), 2400);
    let return_id = request["id"].as_str().unwrap().to_string();

    // Only one unit is left to return
    as_customer(app.server.post("/api/returns"), customer)
        .json(&json!({
            "order_id": order_id,
            "product_id": coffee.id,
            "quantity": 2,
            "reason": "Second thoughts",
        }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let approved = as_admin(app.server.post(&format!("/api/admin/returns/{return_id}/approve")), admin)
        .json(&json!({"restock": true, "note": "Refunded to wallet"}))
        .await;
    approved.assert_status_ok();
    assert_eq!(approved.json::<Value>()["status"], json!("approved"));

    let wallet: Value = as_customer(app.server.get("/api/wallet"), customer).await.json();
    assert_eq!(int(&wallet, "balance_cents"), 2400);
    assert_eq!(wallet["transactions"].as_array().unwrap().len(), 1);
    assert_eq!(app.store.levels()[0].total_available_stock, 9);

    as_admin(app.server.post(&format!("/api/admin/returns/{return_id}/reject")), admin)
        .json(&json!({}))
        .await
        .assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn cancelling_releases_the_reservation() {
    let app = TestApp::new();
    let user = UserId::new();
    let honey = app.store.seed_product("Honey", 4, 799);

    add_to_cart(&app, user, honey.id, 4).await;
    let order = place_order(&app, user).await;
    let order_id = order["id"].as_str().unwrap();

    let cancelled = as_customer(app.server.post(&format!("/api/orders/{order_id}/cancel")), user).await;
    cancelled.assert_status_ok();
    assert_eq!(cancelled.json::<Value>()["status"], json!("cancelled"));

    let level = &app.store.levels()[0];
    assert_eq!(level.total_available_stock, 4);
    assert_eq!(level.buying_in_progress, 0);

    as_customer(app.server.post(&format!("/api/orders/{order_id}/confirm")), user)
        .await
        .assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn rejected_checkout_keeps_the_cart() {
    let app = TestApp::new();
    let buyer = UserId::new();
    let rival = UserId::new();
    let cheese = app.store.seed_product("Cheese", 2, 650);

    add_to_cart(&app, buyer, cheese.id, 2).await;
    add_to_cart(&app, rival, cheese.id, 1).await;
    place_order(&app, rival).await;

    let response = as_customer(app.server.post("/api/orders"), buyer).await;
    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["success"], json!(false));
    assert_eq!(int(&body["failed_items"][0], "available"), 1);

    let cart: Value = as_customer(app.server.get("/api/cart"), buyer).await.json();
    assert_eq!(int(&cart["lines"][0], "quantity"), 2);
    assert_eq!(app.store.levels()[0].buying_in_progress, 1);
}

#[tokio::test]
async fn empty_cart_cannot_check_out() {
    let app = TestApp::new();

    as_customer(app.server.post("/api/orders"), UserId::new())
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn orders_are_private_to_their_owner() {
    let app = TestApp::new();
    let owner = UserId::new();
    let admin = UserId::new();
    let pasta = app.store.seed_product("Pasta", 5, 180);

    add_to_cart(&app, owner, pasta.id, 1).await;
    let order = place_order(&app, owner).await;
    let path = format!("/api/orders/{}", order["id"].as_str().unwrap());

    as_customer(app.server.get(&path), UserId::new())
        .await
        .assert_status(StatusCode::NOT_FOUND);
    as_admin(app.server.get(&path), admin).await.assert_status_ok();

    let listed: Value = as_admin(app.server.get("/api/admin/orders"), admin)
        .add_query_param("status", "pending_payment")
        .await
        .json();
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn favorites_round_trip() {
    let app = TestApp::new();
    let user = UserId::new();
    let kiwi = app.store.seed_product("Kiwi", 30, 40);
    let path = format!("/api/favorites/{}", kiwi.id);

    as_customer(app.server.put(&path), user)
        .await
        .assert_status(StatusCode::NO_CONTENT);
    let favorites: Value = as_customer(app.server.get("/api/favorites"), user).await.json();
    assert_eq!(favorites[0]["id"], json!(kiwi.id));

    as_customer(app.server.delete(&path), user)
        .await
        .assert_status(StatusCode::NO_CONTENT);
    let favorites: Value = as_customer(app.server.get("/api/favorites"), user).await.json();
    assert!(favorites.as_array().unwrap().is_empty());
}
