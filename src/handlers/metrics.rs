use axum::http::header;
use axum::response::{IntoResponse, Response};
use prometheus::{Encoder, TextEncoder};

use crate::error::ApiError;

pub async fn metrics_handler() -> Result<Response, ApiError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ApiError::Internal(format!("metrics encoding failed: {e}")))?;

    Ok((
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        String::from_utf8_lossy(&buffer).into_owned(),
    )
        .into_response())
}
