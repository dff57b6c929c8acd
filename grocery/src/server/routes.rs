//! Router configuration for the grocery service.
//!
//! Builds the complete Axum router with all endpoints.

use super::state::AppState;
use crate::api::{cart, catalog, deliveries, favorites, orders, returns, stock, users, warehouses};
use crate::metrics::track_http_metrics;
use axum::{
    http::HeaderValue,
    middleware,
    routing::{get, post, put},
    Router,
};
use grocery_web::handlers::{health_check, readiness};
use grocery_web::correlation_id_layer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the complete Axum router.
///
/// - `/health`, `/ready`: probes
/// - `/api/...`: customer endpoints (identity from gateway headers)
/// - `/api/admin/...`: admin endpoints (admin role required)
pub fn build_router(state: AppState, cors_allowed_origins: &[String]) -> Router {
    let customer_routes = Router::new()
        // Stock ledger
        .route("/stock/check", post(stock::check_availability))
        .route("/stock/reserve", post(stock::reserve))
        .route("/stock/release", post(stock::release))
        .route("/stock/realtime", post(stock::realtime))
        // Catalog
        .route("/products", get(catalog::list_products))
        .route("/products/:id", get(catalog::get_product))
        .route("/categories", get(catalog::list_categories))
        // Cart
        .route("/cart", get(cart::get_cart).delete(cart::clear_cart))
        .route("/cart/items", post(cart::add_item))
        .route(
            "/cart/items/:product_id",
            put(cart::set_quantity).delete(cart::remove_item),
        )
        // Favorites
        .route("/favorites", get(favorites::list_favorites))
        .route(
            "/favorites/:product_id",
            put(favorites::add_favorite).delete(favorites::remove_favorite),
        )
        // Orders
        .route("/orders", post(orders::place_order).get(orders::list_orders))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/confirm", post(orders::confirm_order))
        .route("/orders/:id/cancel", post(orders::cancel_order))
        .route("/orders/:id/delivery", get(deliveries::tracking))
        // Returns & wallet
        .route("/returns", post(returns::request_return).get(returns::list_returns))
        .route("/wallet", get(returns::get_wallet))
        // Users
        .route("/users/register", post(users::register))
        .route("/users/login", post(users::login))
        .route("/users/me", get(users::me));

    let admin_routes = Router::new()
        .route("/stock/stuck", get(stock::list_stuck))
        .route("/stock/stuck/reset", post(stock::reset_stuck))
        .route("/products", post(catalog::create_product))
        .route("/products/:id/restock", post(catalog::restock))
        .route("/orders", get(orders::list_all_orders))
        .route("/returns", get(returns::list_all_returns))
        .route("/returns/:id/approve", post(returns::approve_return))
        .route("/returns/:id/reject", post(returns::reject_return))
        .route(
            "/warehouses",
            get(warehouses::list_warehouses).post(warehouses::create_warehouse),
        )
        .route("/warehouses/:id/inventory", get(warehouses::inventory))
        .route(
            "/transfers",
            get(warehouses::list_transfers).post(warehouses::transfer),
        )
        .route("/deliveries", post(deliveries::create_delivery))
        .route("/deliveries/:id/status", post(deliveries::update_status));

    Router::new()
        // Health checks (no authentication)
        .route("/health", get(health_check))
        .route("/ready", get(readiness))
        .nest("/api", customer_routes.nest("/admin", admin_routes))
        .route_layer(middleware::from_fn(track_http_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_allowed_origins))
        .layer(correlation_id_layer())
        .with_state(state)
}

/// CORS policy from configured origins; `*` (or nothing usable) allows any.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    if parsed.is_empty() {
        tracing::warn!("No valid CORS origins configured, allowing any origin");
        return layer.allow_origin(Any);
    }
    layer.allow_origin(AllowOrigin::list(parsed))
}
