//! Request identification and external URL reconstruction.
//!
//! # Responsibilities
//! - Attach a unique request ID (UUID v4) and echo it in the response
//! - Reconstruct the URI the client actually used (scheme, host, path, query)
//! - Normalize the request path before routing
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - A configured public base URL beats any request header
//! - X-Forwarded-* is only honored when explicitly trusted

use axum::http::header::HOST;
use axum::http::{HeaderMap, Uri};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

use crate::config::ExternalConfig;
use crate::routing::{normalize_path, PathError};

/// Request ID header name.
pub const X_REQUEST_ID: &str = "x-request-id";

pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// Layer assigning `X-Request-ID` to requests that lack one.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::x_request_id(MakeRequestUuid)
}

/// Layer copying `X-Request-ID` onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}

/// The request URI with its path normalized. The query is kept as sent.
pub fn normalize_uri(uri: &Uri) -> Result<Uri, PathError> {
    let path = normalize_path(uri.path())?;
    let path_and_query = match uri.query() {
        Some(query) => format!("{}?{}", path, query),
        None => path,
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(path_and_query.parse().map_err(|_| PathError::BadEscape)?);
    Uri::from_parts(parts).map_err(|_| PathError::BadEscape)
}

/// Reconstructs the externally visible URI of a request.
#[derive(Debug, Clone)]
pub struct ExternalUrl {
    base_url: Option<String>,
    trust_forwarded_headers: bool,
    default_scheme: &'static str,
}

impl ExternalUrl {
    /// `tls` selects the scheme assumed when nothing else says otherwise.
    pub fn new(config: &ExternalConfig, tls: bool) -> Self {
        Self {
            base_url: config
                .base_url
                .as_ref()
                .map(|b| b.trim_end_matches('/').to_string()),
            trust_forwarded_headers: config.trust_forwarded_headers,
            default_scheme: if tls { "https" } else { "http" },
        }
    }

    /// Scheme the client used.
    pub fn scheme<'a>(&'a self, headers: &'a HeaderMap) -> &'a str {
        self.forwarded(headers, X_FORWARDED_PROTO)
            .unwrap_or(self.default_scheme)
    }

    /// Host the client addressed.
    pub fn host<'a>(&self, headers: &'a HeaderMap, uri: &'a Uri) -> &'a str {
        self.forwarded(headers, X_FORWARDED_HOST)
            .or_else(|| headers.get(HOST).and_then(|h| h.to_str().ok()))
            .or_else(|| uri.authority().map(|a| a.as_str()))
            .unwrap_or("localhost")
    }

    /// Full original URI, e.g. `https://host/oauth2_protected/data?x=1`.
    pub fn original_uri(&self, headers: &HeaderMap, uri: &Uri) -> String {
        let path_and_query = uri.path_and_query().map_or("/", |pq| pq.as_str());

        match &self.base_url {
            Some(base) => format!("{}{}", base, path_and_query),
            None => format!(
                "{}://{}{}",
                self.scheme(headers),
                self.host(headers, uri),
                path_and_query
            ),
        }
    }

    // First entry of a trusted, possibly comma-separated X-Forwarded-* header.
    fn forwarded<'a>(&self, headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
        if !self.trust_forwarded_headers {
            return None;
        }
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}
