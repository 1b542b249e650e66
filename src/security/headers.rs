//! Header manipulation.
//!
//! # Responsibilities
//! - Add X-Forwarded-For, X-Forwarded-Proto, X-Forwarded-Host
//! - Strip hop-by-hop headers in both directions
//!
//! # Design Decisions
//! - Preserve original client IP in X-Forwarded-For
//! - Existing X-Forwarded-For is only extended when forwarded headers are trusted
//! - Headers named by `Connection` are hop-by-hop too

use std::net::IpAddr;

use axum::http::header::CONNECTION;
use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::http::request::{X_FORWARDED_HOST, X_FORWARDED_PROTO};

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

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

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Set X-Forwarded-* for the upstream.
pub fn set_forwarded(
    headers: &mut HeaderMap,
    client_ip: Option<IpAddr>,
    proto: &str,
    host: &str,
    trust_existing: bool,
) {
    if let Some(ip) = client_ip {
        let chain = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(existing) if trust_existing => format!("{}, {}", existing, ip),
            _ => ip.to_string(),
        };
        if let Ok(value) = HeaderValue::from_str(&chain) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    } else if !trust_existing {
        headers.remove(X_FORWARDED_FOR);
    }

    if let Ok(value) = HeaderValue::from_str(proto) {
        headers.insert(X_FORWARDED_PROTO, value);
    }
    if let Ok(value) = HeaderValue::from_str(host) {
        headers.insert(X_FORWARDED_HOST, value);
    }
}
