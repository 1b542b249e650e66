//! Authorization decision engine.
//!
//! # State Machine (per request)
//! ```text
//! Unauthenticated ──[introspect]──→ Allowed
//!                               ├─→ Denied401
//!                               └─→ Denied403
//! ```
//! All three outcomes are terminal; there is no retry within a request.
//!
//! # Design Decisions
//! - Pure function of auth mode and introspection outcome
//! - Anything other than 200/401/403, including transport errors, is a 401
//! - `Set-Cookie` is only carried for anonymous-capable routes

use axum::http::header::{AUTHORIZATION, COOKIE, SET_COOKIE, WWW_AUTHENTICATE};
use axum::http::{HeaderValue, StatusCode};

use crate::auth::introspection::{IntrospectionError, IntrospectionResponse};
use crate::config::AuthMode;

/// Identity headers granted by a successful introspection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grant {
    /// Replaces the outbound `Authorization` header (removed when `None`).
    pub authorization: Option<HeaderValue>,
    /// Replaces the outbound `Cookie` header (removed when `None`).
    pub cookie: Option<HeaderValue>,
    /// Added to the client-facing response.
    pub set_cookie: Vec<HeaderValue>,
}

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// Not authenticated (401).
    Unauthenticated,
    /// Authenticated but not allowed (403).
    Forbidden,
}

impl Denial {
    /// Status returned when no redirect target applies.
    pub fn status(&self) -> StatusCode {
        match self {
            Denial::Unauthenticated => StatusCode::UNAUTHORIZED,
            Denial::Forbidden => StatusCode::FORBIDDEN,
        }
    }
}

/// Outcome of the authorization step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Allow(Grant),
    Deny(Denial),
}

impl AuthDecision {
    /// Label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            AuthDecision::Allow(_) => "allow",
            AuthDecision::Deny(Denial::Unauthenticated) => "deny_401",
            AuthDecision::Deny(Denial::Forbidden) => "deny_403",
        }
    }
}

/// Classify an introspection outcome.
pub fn decide(
    mode: AuthMode,
    outcome: &Result<IntrospectionResponse, IntrospectionError>,
) -> AuthDecision {
    let response = match outcome {
        Ok(response) => response,
        Err(_) => return AuthDecision::Deny(Denial::Unauthenticated),
    };

    match response.status {
        StatusCode::OK => {
            let headers = &response.headers;
            let set_cookie = if mode.is_anonymous() {
                headers.get_all(SET_COOKIE).iter().cloned().collect()
            } else {
                Vec::new()
            };
            AuthDecision::Allow(Grant {
                authorization: headers.get(AUTHORIZATION).cloned(),
                cookie: headers.get(COOKIE).cloned(),
                set_cookie,
            })
        }
        StatusCode::FORBIDDEN => AuthDecision::Deny(Denial::Forbidden),
        _ => AuthDecision::Deny(Denial::Unauthenticated),
    }
}

/// Authentication challenge sent back by the introspection service, if any.
pub fn challenge(outcome: &Result<IntrospectionResponse, IntrospectionError>) -> Option<&HeaderValue> {
    outcome
        .as_ref()
        .ok()
        .and_then(|response| response.headers.get(WWW_AUTHENTICATE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;
    use std::time::Duration;

    fn response(status: StatusCode, headers: &[(&'static str, &'static str)]) -> IntrospectionResponse {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.append(*name, HeaderValue::from_static(value));
        }
        IntrospectionResponse::new(status, map)
    }

    #[test]
    fn test_ok_copies_identity_headers() {
        let outcome = Ok(response(
            StatusCode::OK,
            &[
                ("authorization", "Bearer resolved-id-token"),
                ("cookie", "session=resolved"),
                ("set-cookie", "sid=abc"),
                ("cache-control", "no-store"),
            ],
        ));

        let AuthDecision::Allow(grant) = decide(AuthMode::OAuth2, &outcome) else {
            panic!("expected allow");
        };
        assert_eq!(grant.authorization.unwrap(), "Bearer resolved-id-token");
        assert_eq!(grant.cookie.unwrap(), "session=resolved");
        // Cookie-setting headers of non-anonymous routes stay internal.
        assert!(grant.set_cookie.is_empty());
    }

    #[test]
    fn test_m2m_exchanges_for_bearer() {
        let outcome = Ok(response(
            StatusCode::OK,
            &[("authorization", "Bearer m2m-token"), ("set-cookie", "x=1")],
        ));
        assert_eq!(
            decide(AuthMode::M2m, &outcome),
            AuthDecision::Allow(Grant {
                authorization: Some(HeaderValue::from_static("Bearer m2m-token")),
                ..Grant::default()
            })
        );
    }

    #[test]
    fn test_challenge_is_read_from_reply() {
        let outcome = Ok(response(
            StatusCode::UNAUTHORIZED,
            &[("www-authenticate", "Basic realm=\"asab\"")],
        ));
        assert_eq!(decide(AuthMode::M2m, &outcome), AuthDecision::Deny(Denial::Unauthenticated));
        assert_eq!(challenge(&outcome).unwrap(), "Basic realm=\"asab\"");

        let failed = Err(IntrospectionError::Timeout(Duration::from_millis(100)));
        assert!(challenge(&failed).is_none());
    }

    #[test]
    fn test_ok_without_headers_grants_nothing() {
        let outcome = Ok(response(StatusCode::OK, &[]));
        assert_eq!(
            decide(AuthMode::Cookie, &outcome),
            AuthDecision::Allow(Grant::default())
        );
    }

    #[test]
    fn test_anonymous_carries_every_set_cookie() {
        let outcome = Ok(response(
            StatusCode::OK,
            &[("set-cookie", "sid=abc"), ("set-cookie", "tenant=default")],
        ));

        let AuthDecision::Allow(grant) = decide(AuthMode::CookieAnonymous, &outcome) else {
            panic!("expected allow");
        };
        assert_eq!(grant.set_cookie, vec!["sid=abc", "tenant=default"]);
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (StatusCode::UNAUTHORIZED, AuthDecision::Deny(Denial::Unauthenticated)),
            (StatusCode::FORBIDDEN, AuthDecision::Deny(Denial::Forbidden)),
            (StatusCode::NO_CONTENT, AuthDecision::Deny(Denial::Unauthenticated)),
            (StatusCode::FOUND, AuthDecision::Deny(Denial::Unauthenticated)),
            (StatusCode::INTERNAL_SERVER_ERROR, AuthDecision::Deny(Denial::Unauthenticated)),
        ];
        for (status, expected) in cases {
            assert_eq!(decide(AuthMode::Cookie, &Ok(response(status, &[]))), expected);
        }
    }

    #[test]
    fn test_transport_error_is_unauthenticated() {
        let outcome = Err(IntrospectionError::Timeout(Duration::from_millis(100)));
        assert_eq!(
            decide(AuthMode::CookieAnonymous, &outcome),
            AuthDecision::Deny(Denial::Unauthenticated)
        );
    }

    #[test]
    fn test_decision_is_deterministic() {
        let outcome = Ok(response(StatusCode::OK, &[("authorization", "Bearer x")]));
        assert_eq!(decide(AuthMode::OAuth2, &outcome), decide(AuthMode::OAuth2, &outcome));
    }

    #[test]
    fn test_labels() {
        assert_eq!(AuthDecision::Allow(Grant::default()).label(), "allow");
        assert_eq!(AuthDecision::Deny(Denial::Forbidden).label(), "deny_403");
        assert_eq!(Denial::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
    }
}
