//! HTTP adapter: the router plus thin handlers per resource.

pub mod orders;
pub mod params;
pub mod payments;
pub mod products;
pub mod refunds;
pub mod reviews;
pub mod tenants;

use axum::routing::{get, post, put};
use axum::{Json, Router};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/health",
            get(|| async { Json(serde_json::json!({"status": "healthy", "service": "mercato"})) }),
        )
        .route("/orders", get(orders::list).post(orders::create))
        .route("/orders/my-orders", get(orders::my_orders))
        .route("/orders/tenant-sales", get(orders::tenant_sales))
        .route(
            "/orders/tenant-product-orders",
            get(orders::tenant_product_orders),
        )
        .route("/orders/customer-orders", get(orders::customer_orders))
        .route("/orders/tenant-statistics", get(orders::tenant_statistics))
        .route(
            "/orders/product-statistics",
            get(orders::product_statistics),
        )
        .route("/orders/:id", get(orders::get).put(orders::update))
        .route("/orders/:id/items", put(orders::replace_items))
        .route("/orders/:id/update-status", post(orders::update_status))
        .route(
            "/orders/:id/confirm-delivery",
            post(orders::confirm_delivery),
        )
        .route(
            "/payments/initialize_chapa_payment",
            post(payments::initialize_chapa),
        )
        .route(
            "/payments/initialize_cod_payment",
            post(payments::initialize_cod),
        )
        .route(
            "/payments/verify_chapa_payment",
            post(payments::verify_chapa),
        )
        // Same handler on both paths; the gateway's POST must never be
        // blocked by middleware applied to the authenticated surface.
        .route("/payments/chapa_webhook", post(payments::chapa_webhook))
        .route(
            "/payments/chapa_webhook_standalone",
            post(payments::chapa_webhook),
        )
        .route("/payments", get(payments::list))
        .route("/payments/:id", get(payments::get))
        .route(
            "/payments/:id/confirm_cod_payment",
            post(payments::confirm_cod),
        )
        .route(
            "/refund-requests",
            get(refunds::list_requests).post(refunds::create_request),
        )
        .route("/refund-requests/:id", get(refunds::get_request))
        .route("/refund-requests/:id/approve", post(refunds::approve))
        .route("/refund-requests/:id/reject", post(refunds::reject))
        .route("/refunds", post(refunds::execute))
        .route("/reviews", post(reviews::create))
        .route("/reviews/my-reviews", get(reviews::my_reviews))
        .route("/reviews/tenant-stats", get(reviews::tenant_stats))
        .route(
            "/reviews/:id",
            put(reviews::update).delete(reviews::delete),
        )
        .route("/products", get(products::list).post(products::create))
        .route("/products/:id", get(products::get))
        .route("/products/:id/list-tenant", post(products::list_tenant))
        .route("/products/:id/reviews", get(reviews::list_for_product))
        .route(
            "/products/:id/reviews/summary",
            get(reviews::product_summary),
        )
        .route("/tenants", get(tenants::list))
        .route("/tenants/:id", get(tenants::get))
        .route(
            "/api-keys",
            get(tenants::list_api_keys).post(tenants::create_api_key),
        )
        .route("/api-keys/:id/revoke", post(tenants::revoke_api_key))
        .with_state(state)
}
