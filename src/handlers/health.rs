use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};

use crate::state::AppState;

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "backends": {
            "healthy": state.load_balancer.healthy_count(),
            "total": state.load_balancer.all_backends().len(),
        },
        "tracked_clients": state.guards.tracked_clients(),
    }))
}
