//! Response handling and transformation.
//!
//! # Responsibilities
//! - Relay the upstream response to the client as a stream, bounded by an
//!   idle timeout between body frames
//! - Remove hop-by-hop and per-route ignored headers
//! - Add `Set-Cookie` lines granted by an anonymous introspection
//! - Map proxy-side failures to fixed, detail-free responses
//!
//! # Design Decisions
//! - Streaming responses avoid buffering entire body
//! - Upstream status codes, including 5xx, are relayed verbatim
//! - Granted cookies are appended, never replacing upstream `Set-Cookie`

use std::time::Duration;

use axum::body::Body;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use hyper::body::Incoming;
use tower_http::timeout::TimeoutBody;

use crate::auth::Grant;
use crate::routing::Route;
use crate::security::headers::strip_hop_by_hop;

/// Prepare response headers for the client.
pub fn filter_headers(headers: &mut HeaderMap, route: &Route, grant: Option<&Grant>) {
    strip_hop_by_hop(headers);

    for name in &route.ignored_response_headers {
        headers.remove(name);
    }

    if let Some(grant) = grant {
        append_granted_cookies(headers, grant);
    }
}

/// Add the `Set-Cookie` lines of a grant.
pub fn append_granted_cookies(headers: &mut HeaderMap, grant: &Grant) {
    for cookie in &grant.set_cookie {
        headers.append(SET_COOKIE, cookie.clone());
    }
}

/// Turn an upstream response into the client response.
///
/// The body fails, and the connection is dropped, when the upstream sends no
/// frame for `idle_timeout`.
pub fn relay(
    response: hyper::Response<Incoming>,
    route: &Route,
    grant: Option<&Grant>,
    idle_timeout: Duration,
) -> Response {
    let (mut parts, body) = response.into_parts();
    filter_headers(&mut parts.headers, route, grant);
    Response::from_parts(parts, Body::new(TimeoutBody::new(idle_timeout, body)))
}

/// The path could not be normalized.
pub fn bad_request() -> Response {
    (StatusCode::BAD_REQUEST, "Bad Request").into_response()
}

/// No route matched the path.
pub fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}

/// The upstream could not be reached or did not answer in time.
pub fn gateway_error(status: StatusCode) -> Response {
    let text = status.canonical_reason().unwrap_or("Gateway Error");
    (status, text).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthMode, RouteConfig};
    use axum::http::header::CACHE_CONTROL;
    use axum::http::HeaderValue;

    fn route(ignored: &[&str]) -> Route {
        let config = RouteConfig {
            name: None,
            path_prefix: "/".into(),
            rewrite: None,
            upstream: "http://127.0.0.1:3000".into(),
            auth: AuthMode::CookieAnonymous,
            ignored_response_headers: ignored.iter().map(|s| s.to_string()).collect(),
        };
        Route::compile(0, &config).unwrap()
    }

    #[test]
    fn test_ignored_headers_removed() {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=3600"));
        headers.insert("x-powered-by", HeaderValue::from_static("php"));
        headers.insert("content-type", HeaderValue::from_static("text/html"));

        filter_headers(&mut headers, &route(&["Cache-Control", "X-Powered-By"]), None);

        assert!(!headers.contains_key(CACHE_CONTROL));
        assert!(!headers.contains_key("x-powered-by"));
        assert_eq!(headers["content-type"], "text/html");
    }

    #[test]
    fn test_granted_cookie_is_appended() {
        let mut headers = HeaderMap::new();
        headers.insert(SET_COOKIE, HeaderValue::from_static("theme=dark"));
        let grant = Grant {
            set_cookie: vec![HeaderValue::from_static("sid=abc")],
            ..Grant::default()
        };

        filter_headers(&mut headers, &route(&[]), Some(&grant));

        let cookies: Vec<_> = headers.get_all(SET_COOKIE).iter().collect();
        assert_eq!(cookies, vec!["theme=dark", "sid=abc"]);
    }

    #[test]
    fn test_granted_cookie_survives_ignored_set_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(SET_COOKIE, HeaderValue::from_static("upstream=1"));
        let grant = Grant {
            set_cookie: vec![HeaderValue::from_static("sid=abc")],
            ..Grant::default()
        };

        filter_headers(&mut headers, &route(&["Set-Cookie"]), Some(&grant));

        let cookies: Vec<_> = headers.get_all(SET_COOKIE).iter().collect();
        assert_eq!(cookies, vec!["sid=abc"]);
    }

    #[test]
    fn test_gateway_error_has_no_detail() {
        let response = gateway_error(StatusCode::BAD_GATEWAY);
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
