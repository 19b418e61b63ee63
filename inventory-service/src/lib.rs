pub mod alerts;
pub mod catalog_handlers;
pub mod extraordinary_handlers;
pub mod ledger;
pub mod movement_handlers;
pub mod stock_handlers;
pub mod tenant;

use std::sync::Arc;

use axum::extract::State;
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::routing::{get, post, put};
use axum::{middleware, Router};
use common_observability::LedgerMetrics;
use prometheus::{Encoder, TextEncoder};
use sqlx::PgPool;
use tower_http::cors::{AllowOrigin, CorsLayer};

pub use alerts::{resolve_alert_level, AlertLevel};
pub use ledger::{
    ensure_stock_row, record_movement, record_movement_tx, LedgerError, Movement, MovementInput,
    MovementKind, StockRow,
};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub metrics: Arc<LedgerMetrics>,
}

async fn health() -> &'static str {
    "ok"
}

async fn metrics_endpoint(State(state): State<AppState>) -> (StatusCode, String) {
    let encoder = TextEncoder::new();
    let families = state.metrics.registry.gather();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buf) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("metrics encode error: {e}"),
        );
    }
    (StatusCode::OK, String::from_utf8_lossy(&buf).to_string())
}

async fn error_metrics_mw(
    State(metrics): State<Arc<LedgerMetrics>>,
    req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    let resp = next.run(req).await;
    let status = resp.status();
    if status.as_u16() >= 400 {
        let code = resp
            .headers()
            .get("x-error-code")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown");
        metrics
            .http_errors_total
            .with_label_values(&["inventory-service", code, status.as_str()])
            .inc();
    }
    resp
}

pub fn build_router(state: AppState) -> Router {
    let allowed_origins = [
        "http://localhost:3000",
        "http://localhost:3001",
        "http://localhost:5173",
    ];
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(
            allowed_origins
                .iter()
                .filter_map(|origin| origin.parse::<HeaderValue>().ok())
                .collect::<Vec<_>>(),
        ))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            ACCEPT,
            CONTENT_TYPE,
            HeaderName::from_static("x-tenant-id"),
            HeaderName::from_static("x-user-id"),
        ]);

    let metrics = state.metrics.clone();
    Router::new()
        .route("/healthz", get(health))
        .route(
            "/movements",
            post(movement_handlers::create_movement).get(movement_handlers::list_movements),
        )
        .route("/stock", get(stock_handlers::list_stock))
        .route(
            "/stock/:warehouse_id/:item_id/thresholds",
            put(stock_handlers::update_thresholds),
        )
        .route(
            "/warehouses",
            post(catalog_handlers::create_warehouse).get(catalog_handlers::list_warehouses),
        )
        .route(
            "/items",
            post(catalog_handlers::create_item).get(catalog_handlers::list_items),
        )
        .route(
            "/extraordinary-items",
            post(extraordinary_handlers::create_request)
                .get(extraordinary_handlers::list_requests),
        )
        .route(
            "/extraordinary-items/:request_id/deliver",
            put(extraordinary_handlers::mark_delivered),
        )
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
        .layer(middleware::from_fn_with_state(metrics, error_metrics_mw))
        .layer(cors)
}
