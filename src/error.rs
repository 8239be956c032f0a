//! Error types for the gateway.
//!
//! `ApiError` renders as the `{status, data, message}` envelope the
//! course API uses for every response.

use std::time::Duration;

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

pub const TOO_MANY_REQUESTS_MESSAGE: &str = "Too many requests. Please try again later.";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Client spent its budget for the current window.
    #[error("Too many requests. Please try again later.")]
    TooManyRequests { retry_after: Duration },

    #[error("Malformed request path.")]
    BadRequest,

    #[error("Request body is too large.")]
    PayloadTooLarge,

    #[error("No healthy upstream available.")]
    NoHealthyBackend,

    /// Upstream could not be reached or returned an unreadable body.
    #[error("Upstream request failed: {0}")]
    BadGateway(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Startup validation failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("at least one backend is required")]
    NoBackends,

    #[error("invalid route limit {0:?}, expected <prefix>=<limit>/<window_ms>")]
    InvalidRouteLimit(String),

    #[error("route limit for {0:?} is given more than once")]
    DuplicateRouteLimit(String),

    #[error("invalid bind address: {0}")]
    InvalidAddress(String),

    #[error("failed to build upstream client: {0}")]
    HttpClient(String),
}

/// Response envelope shared with the course API.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub status: u16,
    pub data: Option<T>,
    pub message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::BadRequest => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NoHealthyBackend => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if let ApiError::Internal(msg) = &self {
            tracing::error!(%msg, "internal gateway error");
        }

        let body = Envelope::<()> {
            status: status.as_u16(),
            data: None,
            message: self.to_string(),
        };
        let mut response = (status, axum::Json(body)).into_response();

        if let ApiError::TooManyRequests { retry_after } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs(retry_after)));
        }

        response
    }
}

// whole seconds, rounded up, never 0
fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(1)), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(1000)), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(1001)), 2);
        assert_eq!(retry_after_secs(Duration::from_secs(59)), 59);
    }

    #[test]
    fn too_many_requests_envelope() {
        let err = ApiError::TooManyRequests {
            retry_after: Duration::from_millis(2500),
        };
        assert_eq!(err.to_string(), TOO_MANY_REQUESTS_MESSAGE);

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "3");
    }

    #[test]
    fn status_per_variant() {
        assert_eq!(ApiError::BadRequest.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::NoHealthyBackend.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ApiError::BadGateway("refused".into()).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn internal_error_is_500_without_retry_after() {
        let response = ApiError::Internal("metrics encoding failed".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }

    #[test]
    fn envelope_serializes_null_data() {
        let body = Envelope::<()> {
            status: 429,
            data: None,
            message: TOO_MANY_REQUESTS_MESSAGE.to_string(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "status": 429,
                "data": null,
                "message": "Too many requests. Please try again later."
            })
        );
    }
}
