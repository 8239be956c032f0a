//! Router assembly.

use std::sync::Arc;

use axum::{Router, middleware, routing::{any, get}};

use crate::handlers::{health_handler, metrics_handler, proxy_handler};
use crate::middleware::{admission_middleware, request_id_middleware};
use crate::state::AppState;

/// Builds the gateway router. Only `/api` traffic passes through admission control.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/api", any(proxy_handler))
        .route("/api/{*path}", any(proxy_handler))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            admission_middleware,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(api)
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}
