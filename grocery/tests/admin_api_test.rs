//! Catalog administration, warehouses, accounts and probes.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use axum::http::StatusCode;
use common::{as_admin, as_customer, int, TestApp};
use grocery_core::warehouse::LEADING_WAREHOUSE_ID;
use grocery_core::UserId;
use serde_json::{json, Value};

#[tokio::test]
async fn probes_answer_without_identity() {
    let app = TestApp::new();

    let health = app.server.get("/health").await;
    health.assert_status_ok();
    assert!(health.headers().contains_key("x-correlation-id"));

    let ready: Value = app.server.get("/ready").await.json();
    assert_eq!(ready["status"], json!("ready"));
}

#[tokio::test]
async fn admin_creates_and_lists_products() {
    let app = TestApp::new();
    let admin = UserId::new();

    let created = as_admin(app.server.post("/api/admin/products"), admin)
        .json(&json!({
            "name": "  Oat Milk ",
            "category": "Dairy",
            "price_cents": 289,
            "initial_stock": 24,
        }))
        .await;
    created.assert_status(StatusCode::CREATED);
    let product: Value = created.json();
    assert_eq!(product["name"], json!("Oat Milk"));
    assert_eq!(product["category"], json!("dairy"));
    assert_eq!(product["unit"], json!("piece"));
    assert_eq!(int(&product, "total_available_stock"), 24);

    let listed: Value = app
        .server
        .get("/api/products")
        .add_query_param("category", "dairy")
        .await
        .json();
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let categories: Value = app.server.get("/api/categories").await.json();
    assert_eq!(categories[0]["category"], json!("dairy"));
    assert_eq!(int(&categories[0], "product_count"), 1);

    let path = format!("/api/products/{}", product["id"].as_str().unwrap());
    app.server.get(&path).await.assert_status_ok();
}

#[tokio::test]
async fn invalid_products_are_rejected() {
    let app = TestApp::new();
    let admin = UserId::new();

    for body in [
        json!({"name": " ", "category": "bakery", "price_cents": 100}),
        json!({"name": "Bagel", "category": "bakery", "price_cents": -1}),
        json!({"name": "Bagel", "price_cents": 100}),
    ] {
        let response = as_admin(app.server.post("/api/admin/products"), admin)
            .json(&body)
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST, "body {body}");
    }

    as_customer(app.server.post("/api/admin/products"), UserId::new())
        .json(&json!({"name": "Bagel", "category": "bakery", "price_cents": 100}))
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn restock_cannot_drop_below_reservations() {
    let app = TestApp::new();
    let admin = UserId::new();
    let butter = app.store.seed_product("Butter", 10, 399);
    app.store.set_counters(butter.id, 10, 6, None);
    let path = format!("/api/admin/products/{}/restock", butter.id);

    as_admin(app.server.post(&path), admin)
        .json(&json!({"delta": -5}))
        .await
        .assert_status(StatusCode::CONFLICT);
    as_admin(app.server.post(&path), admin)
        .json(&json!({"delta": 0}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let restocked = as_admin(app.server.post(&path), admin)
        .json(&json!({"delta": 5}))
        .await;
    restocked.assert_status_ok();
    assert_eq!(int(&restocked.json::<Value>(), "total_available_stock"), 15);
}

#[tokio::test]
async fn restock_rejects_oversized_delta() {
    let app = TestApp::new();
    let admin = UserId::new();
    let yeast = app.store.seed_product("Yeast", 3, 120);
    let path = format!("/api/admin/products/{}/restock", yeast.id);

    for delta in [i64::MAX, i64::MIN] {
        let response = as_admin(app.server.post(&path), admin)
            .json(&json!({"delta": delta}))
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST, "delta {delta}");
        assert_eq!(response.json::<Value>()["code"], json!("BAD_REQUEST"));
    }
    assert_eq!(app.store.levels()[0].total_available_stock, 3);
}

#[tokio::test]
async fn transfers_move_units_between_warehouses() {
    let app = TestApp::new();
    let admin = UserId::new();
    let beans = app.store.seed_product("Beans", 10, 149);
    app.store.set_counters(beans.id, 10, 7, None);

    let created = as_admin(app.server.post("/api/admin/warehouses"), admin)
        .json(&json!({"name": "North Depot", "location": "Harbour Rd"}))
        .await;
    created.assert_status(StatusCode::CREATED);
    let depot = created.json::<Value>()["id"].as_str().unwrap().to_string();

    // Only the three unreserved units may leave the leading warehouse
    as_admin(app.server.post("/api/admin/transfers"), admin)
        .json(&json!({
            "from_warehouse_id": LEADING_WAREHOUSE_ID,
            "to_warehouse_id": depot,
            "product_id": beans.id,
            "quantity": 4,
        }))
        .await
        .assert_status(StatusCode::CONFLICT);

    let moved = as_admin(app.server.post("/api/admin/transfers"), admin)
        .json(&json!({
            "from_warehouse_id": LEADING_WAREHOUSE_ID,
            "to_warehouse_id": depot,
            "product_id": beans.id,
            "quantity": 3,
        }))
        .await;
    moved.assert_status(StatusCode::CREATED);

    let level = &app.store.levels()[0];
    assert_eq!(level.total_available_stock, 7);
    assert_eq!(level.buying_in_progress, 7);

    let inventory: Value = as_admin(app.server.get(&format!("/api/admin/warehouses/{depot}/inventory")), admin)
        .await
        .json();
    assert_eq!(int(&inventory[0], "quantity"), 3);

    let history: Value = as_admin(app.server.get("/api/admin/transfers"), admin)
        .add_query_param("limit", 10)
        .await
        .json();
    assert_eq!(history.as_array().unwrap().len(), 1);

    let warehouses: Value = as_admin(app.server.get("/api/admin/warehouses"), admin).await.json();
    assert_eq!(warehouses[0]["is_leading"], json!(true));
    assert_eq!(warehouses.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn self_transfer_is_invalid() {
    let app = TestApp::new();
    let beans = app.store.seed_product("Beans", 10, 149);

    as_admin(app.server.post("/api/admin/transfers"), UserId::new())
        .json(&json!({
            "from_warehouse_id": LEADING_WAREHOUSE_ID,
            "to_warehouse_id": LEADING_WAREHOUSE_ID,
            "product_id": beans.id,
            "quantity": 1,
        }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn register_then_login() {
    let app = TestApp::new();

    let registered = app
        .server
        .post("/api/users/register")
        .json(&json!({"email": " Grace@Example.com ", "name": "Grace", "password": "hopper1906"}))
        .await;
    registered.assert_status(StatusCode::CREATED);
    let user: Value = registered.json();
    assert_eq!(user["email"], json!("grace@example.com"));
    assert_eq!(user["role"], json!("customer"));
    assert!(user.get("password_hash").is_none());

    app.server
        .post("/api/users/register")
        .json(&json!({"email": "grace@example.com", "name": "Grace", "password": "hopper1906"}))
        .await
        .assert_status(StatusCode::CONFLICT);

    let login = app
        .server
        .post("/api/users/login")
        .json(&json!({"email": "GRACE@example.com", "password": "hopper1906"}))
        .await;
    login.assert_status_ok();
    assert_eq!(login.json::<Value>()["id"], user["id"]);

    app.server
        .post("/api/users/login")
        .json(&json!({"email": "grace@example.com", "password": "wrong-password"}))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    app.server
        .post("/api/users/login")
        .json(&json!({"email": "nobody@example.com", "password": "hopper1906"}))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    let id: UserId = user["id"].as_str().unwrap().parse().unwrap();
    let me: Value = as_customer(app.server.get("/api/users/me"), id).await.json();
    assert_eq!(me["name"], json!("Grace"));
}

#[tokio::test]
async fn registration_validates_input() {
    let app = TestApp::new();

    for body in [
        json!({"email": "not-an-email", "name": "X", "password": "longenough"}),
        json!({"email": "x@example.com", "name": " ", "password": "longenough"}),
        json!({"email": "x@example.com", "name": "X", "password": "short"}),
    ] {
        let response = app.server.post("/api/users/register").json(&body).await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST, "body {body}");
    }
}
