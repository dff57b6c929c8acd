//! Shared harness: the full router over an in-memory store.

#![allow(dead_code, clippy::expect_used, clippy::panic)]

use axum::http::{HeaderName, HeaderValue};
use axum_test::{TestRequest, TestServer};
use grocery::{build_router, AppState};
use grocery_core::UserId;
use grocery_testing::InMemoryStore;
use serde_json::Value;

pub struct TestApp {
    pub server: TestServer,
    pub store: InMemoryStore,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_store(InMemoryStore::new())
    }

    pub fn with_store(store: InMemoryStore) -> Self {
        grocery_testing::helpers::init_tracing();
        let router = build_router(AppState::new(store.clone()), &["*".to_string()]);
        let server = TestServer::new(router).expect("router should build a test server");
        Self { server, store }
    }
}

fn header(name: &'static str, value: &str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static(name),
        HeaderValue::from_str(value).expect("header value"),
    )
}

/// Attach gateway identity for a customer.
pub fn as_customer(request: TestRequest, user: UserId) -> TestRequest {
    let (name, value) = header("x-user-id", &user.to_string());
    request.add_header(name, value)
}

/// Attach gateway identity for an admin.
pub fn as_admin(request: TestRequest, user: UserId) -> TestRequest {
    let (role, admin) = header("x-user-role", "admin");
    as_customer(request, user).add_header(role, admin)
}

/// Read an integer field, failing loudly when absent.
pub fn int(value: &Value, field: &str) -> i64 {
    value[field]
        .as_i64()
        .unwrap_or_else(|| panic!("{field} missing in {value}"))
}
