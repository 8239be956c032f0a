use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, to_bytes};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::Response;

use crate::client_id::X_FORWARDED_FOR;
use crate::error::ApiError;
use crate::metrics::{UPSTREAM_ERRORS, UPSTREAM_LATENCY};
use crate::state::AppState;

// Largest request body forwarded upstream
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

// Connection-scoped headers that must not be forwarded
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

// Forwards an admitted request to the next healthy upstream
pub async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    req: Request,
) -> Result<Response, ApiError> {
    let backend = state
        .load_balancer
        .get_backend()
        .ok_or(ApiError::NoHealthyBackend)?;

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);
    let (parts, body) = req.into_parts();

    let path_and_query = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
    let url = format!("{}{}", backend.url, path_and_query);
    let body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| ApiError::PayloadTooLarge)?;

    let start_time = Instant::now();
    let result = state
        .client
        .request(parts.method, &url)
        .headers(request_headers(&parts.headers, peer))
        .body(body)
        .send()
        .await;

    let upstream = match result {
        Ok(res) => res,
        Err(e) => {
            UPSTREAM_ERRORS.inc();
            backend.set_healthy(false);
            tracing::warn!(url = %backend.url, error = %e, "upstream failed, marked unhealthy");
            return Err(ApiError::BadGateway(e.to_string()));
        }
    };

    let status = upstream.status();
    let headers = response_headers(upstream.headers());
    let bytes = upstream.bytes().await.map_err(|e| {
        UPSTREAM_ERRORS.inc();
        ApiError::BadGateway(e.to_string())
    })?;
    UPSTREAM_LATENCY.observe(start_time.elapsed().as_secs_f64());

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

fn is_hop_by_hop(name: &header::HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

// End-to-end headers plus the peer appended to X-Forwarded-For
fn request_headers(incoming: &HeaderMap, peer: Option<SocketAddr>) -> HeaderMap {
    let mut headers: HeaderMap = incoming
        .iter()
        .filter(|(name, _)| {
            !is_hop_by_hop(name) && **name != header::HOST && **name != header::CONTENT_LENGTH
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    if let Some(peer) = peer {
        let ip = peer.ip().to_string();
        let chain = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(existing) if !existing.trim().is_empty() => format!("{existing}, {ip}"),
            _ => ip,
        };
        if let Ok(value) = HeaderValue::from_str(&chain) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }

    headers
}

fn response_headers(upstream: &HeaderMap) -> HeaderMap {
    upstream
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name) && **name != header::CONTENT_LENGTH)
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}
