//! Introspection subrequests.
//!
//! # Responsibilities
//! - Build the authorization subrequest for a route's auth mode
//! - Send it with a bounded timeout
//! - Hand status and headers to the decision engine
//!
//! # Contract
//! ```text
//! POST <endpoint>[?anonymous=<id>]
//!     body:          raw inbound Authorization value (possibly empty)
//!     Cookie:        inbound Cookie, if any
//!     X-Request-URI: original external URI (oauth2 only)
//!
//! → 200 with optional Authorization / Cookie / Set-Cookie
//! → 401 / 403 on failure
//! ```
//!
//! # Design Decisions
//! - One attempt per request. A retry could create a second anonymous session.
//! - The response body is drained (up to a small cap) and discarded so the
//!   pooled connection can be reused; only status and headers matter
//! - Nothing from the response reaches the client except through an `AuthDecision`

use std::time::Duration;

use axum::body::Body;
use axum::http::header::{COOKIE, USER_AGENT};
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode, Uri};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use url::Url;

use crate::auth::credentials::Credentials;
use crate::config::{AuthConfig, AuthMode, IntrospectionConfig, ValidationError};
use crate::http::request::X_REQUEST_ID;

/// Header carrying the original request URI to the introspection service.
pub const X_REQUEST_URI: &str = "x-request-uri";

/// Query parameter marking an anonymous-capable introspection.
pub const ANONYMOUS_PARAM: &str = "anonymous";

const INTROSPECTION_USER_AGENT: &str = "auth-proxy-introspection";

/// Largest introspection body read before the connection is given up.
const MAX_DRAINED_BODY: usize = 64 * 1024;

/// Status and headers returned by the introspection endpoint.
#[derive(Debug, Clone)]
pub struct IntrospectionResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl IntrospectionResponse {
    /// Wrap the status and headers of an introspection reply.
    pub fn new(status: StatusCode, headers: HeaderMap) -> Self {
        Self { status, headers }
    }
}

/// Failure to obtain an introspection response.
#[derive(Debug, thiserror::Error)]
pub enum IntrospectionError {
    #[error("no introspection endpoint configured for auth mode {0}")]
    NoEndpoint(AuthMode),
    #[error("failed to build introspection request: {0}")]
    Request(#[from] axum::http::Error),
    #[error("introspection transport error: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),
    #[error("introspection timed out after {0:?}")]
    Timeout(Duration),
}

/// Resolved endpoint URIs, one per auth mode.
#[derive(Debug, Clone, Default)]
struct Endpoints {
    cookie: Option<Uri>,
    oauth2: Option<Uri>,
    cookie_anonymous: Option<Uri>,
    m2m: Option<Uri>,
}

/// Client for the introspection service.
#[derive(Clone)]
pub struct IntrospectionClient {
    client: Client<HttpConnector, Body>,
    endpoints: Endpoints,
    timeout: Duration,
}

impl IntrospectionClient {
    /// Resolve endpoints from configuration.
    ///
    /// The anonymous endpoint gets the `anonymous=<id>` parameter baked in.
    pub fn new(
        client: Client<HttpConnector, Body>,
        introspection: &IntrospectionConfig,
        auth: &AuthConfig,
    ) -> Result<Self, ValidationError> {
        let anonymous = auth.anonymous_id.as_deref();
        let endpoints = Endpoints {
            cookie: resolve("introspection.cookie", introspection.cookie.as_deref(), None)?,
            oauth2: resolve("introspection.oauth2", introspection.oauth2.as_deref(), None)?,
            cookie_anonymous: resolve(
                "introspection.cookie_anonymous",
                introspection.cookie_anonymous.as_deref(),
                anonymous,
            )?,
            m2m: resolve("introspection.m2m", introspection.m2m.as_deref(), None)?,
        };

        Ok(Self {
            client,
            endpoints,
            timeout: Duration::from_millis(auth.timeout_ms),
        })
    }

    /// Endpoint used for the given mode.
    pub fn endpoint(&self, mode: AuthMode) -> Option<&Uri> {
        match mode {
            AuthMode::None => None,
            AuthMode::Cookie => self.endpoints.cookie.as_ref(),
            AuthMode::OAuth2 => self.endpoints.oauth2.as_ref(),
            AuthMode::CookieAnonymous => self.endpoints.cookie_anonymous.as_ref(),
            AuthMode::M2m => self.endpoints.m2m.as_ref(),
        }
    }

    /// Build the subrequest for one inbound request.
    pub fn build_request(
        &self,
        mode: AuthMode,
        credentials: &Credentials,
        original_uri: &str,
        request_id: Option<&HeaderValue>,
    ) -> Result<Request<Body>, IntrospectionError> {
        let endpoint = self
            .endpoint(mode)
            .ok_or(IntrospectionError::NoEndpoint(mode))?;

        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(endpoint.clone())
            .header(USER_AGENT, INTROSPECTION_USER_AGENT);

        if let Some(cookie) = &credentials.cookie {
            builder = builder.header(COOKIE, cookie.clone());
        }
        if let Some(request_id) = request_id {
            builder = builder.header(X_REQUEST_ID, request_id.clone());
        }
        if mode == AuthMode::OAuth2 {
            builder = builder.header(X_REQUEST_URI, original_uri);
        }

        let body = match &credentials.authorization {
            Some(value) => Body::from(value.as_bytes().to_vec()),
            None => Body::empty(),
        };

        Ok(builder.body(body)?)
    }

    /// Call the introspection endpoint for the given mode.
    pub async fn introspect(
        &self,
        mode: AuthMode,
        credentials: &Credentials,
        original_uri: &str,
        request_id: Option<&HeaderValue>,
    ) -> Result<IntrospectionResponse, IntrospectionError> {
        let request = self.build_request(mode, credentials, original_uri, request_id)?;
        let deadline = tokio::time::Instant::now() + self.timeout;

        let response = tokio::time::timeout_at(deadline, self.client.request(request))
            .await
            .map_err(|_| IntrospectionError::Timeout(self.timeout))??;

        let (parts, body) = response.into_parts();

        // The decision is already made; a slow or oversized body only costs the connection.
        let drained =
            tokio::time::timeout_at(deadline, axum::body::to_bytes(Body::new(body), MAX_DRAINED_BODY)).await;
        if !matches!(drained, Ok(Ok(_))) {
            tracing::debug!(mode = %mode, "Introspection body not drained");
        }

        Ok(IntrospectionResponse::new(parts.status, parts.headers))
    }
}

fn resolve(
    field: &str,
    endpoint: Option<&str>,
    anonymous_id: Option<&str>,
) -> Result<Option<Uri>, ValidationError> {
    let Some(endpoint) = endpoint else {
        return Ok(None);
    };
    let error = |message: String| ValidationError {
        field: field.to_string(),
        message,
    };

    let mut url = Url::parse(endpoint).map_err(|e| error(e.to_string()))?;
    if let Some(id) = anonymous_id {
        url.query_pairs_mut().append_pair(ANONYMOUS_PARAM, id);
    }

    url.as_str()
        .parse::<Uri>()
        .map(Some)
        .map_err(|e| error(e.to_string()))
}
