//! Request middleware: request ids and per-client admission control.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderName, HeaderValue, Uri};
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;
use uuid::Uuid;

use crate::client_id::{derive_client_id, derive_client_id_or_peer};
use crate::error::ApiError;
use crate::gate::Decision;
use crate::metrics::{ADMITTED_TOTAL, REJECTED_TOTAL, REQUEST_TOTAL, TRACKED_CLIENTS};
use crate::path::{canonical_path, is_under};
use crate::state::AppState;

const API_PREFIX: &str = "/api";

static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
static X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
static X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Keeps an incoming `X-Request-Id` or generates a UUID v4, and echoes it back.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    if let Ok(val) = HeaderValue::from_str(&request_id) {
        req.headers_mut().insert(X_REQUEST_ID.clone(), val);
    }

    let span = tracing::info_span!("request", request_id = %request_id);
    let mut response = next.run(req).instrument(span).await;

    if let Ok(val) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(X_REQUEST_ID.clone(), val);
    }

    response
}

/// Admission control. Over-budget clients get a 429 and the handler never runs.
///
/// The path is canonicalized first and the request is rewritten to it, so the
/// route group a request is counted against is the one the upstream serves.
/// Paths that resolve outside `/api` are refused.
pub async fn admission_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    REQUEST_TOTAL.inc();

    let path = canonical_path(req.uri().path());
    if !is_under(&path, API_PREFIX) {
        tracing::debug!(raw = %req.uri().path(), %path, "request path escapes the api");
        return Err(ApiError::BadRequest);
    }
    if path != req.uri().path() {
        let canonical = with_path(req.uri(), &path)?;
        *req.uri_mut() = canonical;
    }

    let client_id = if state.peer_fallback {
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0);
        derive_client_id_or_peer(req.headers(), peer)
    } else {
        derive_client_id(req.headers())
    };

    let guard = state.guards.guard_for(&path);
    let decision = guard.check(&client_id);
    TRACKED_CLIENTS.set(state.guards.tracked_clients() as f64);

    match decision {
        Decision::Rejected { retry_after } => {
            REJECTED_TOTAL.inc();
            tracing::debug!(client = %client_id, %path, "rate limit exceeded");
            Err(ApiError::TooManyRequests { retry_after })
        }
        Decision::Admitted { remaining } => {
            ADMITTED_TOTAL.inc();
            let limit = guard.policy.limit;

            let mut response = next.run(req).await;
            let headers = response.headers_mut();
            headers.insert(X_RATELIMIT_LIMIT.clone(), HeaderValue::from(limit));
            headers.insert(X_RATELIMIT_REMAINING.clone(), HeaderValue::from(remaining));
            Ok(response)
        }
    }
}

// Same URI with `path` in place of the original path, query kept
fn with_path(uri: &Uri, path: &str) -> Result<Uri, ApiError> {
    let path_and_query = match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    };
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(path_and_query.parse().map_err(|_| ApiError::BadRequest)?);
    Uri::from_parts(parts).map_err(|_| ApiError::BadRequest)
}
