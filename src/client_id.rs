//! Client identification for admission control.

use std::net::SocketAddr;

use axum::http::HeaderMap;

/// Key shared by every caller without a usable `X-Forwarded-For`.
pub const UNKNOWN_CLIENT: &str = "unknown";

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// First entry of `X-Forwarded-For`, trimmed, or [`UNKNOWN_CLIENT`].
///
/// Callers without the header all land in one bucket and throttle each other.
pub fn derive_client_id(headers: &HeaderMap) -> String {
    forwarded_for(headers).unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Like [`derive_client_id`] but falls back to the peer address when known.
pub fn derive_client_id_or_peer(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    forwarded_for(headers)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(X_FORWARDED_FOR)?.to_str().ok()?;
    let first = value.split(',').next()?.trim();
    if first.is_empty() {
        None
    } else {
        Some(first.to_string())
    }
}
