//! Upstream forwarding.
//!
//! # Responsibilities
//! - Rewrite the path and point the request at the route's upstream
//! - Replace identity headers with the ones granted by introspection
//! - Send the request with a bounded wait for the response head
//! - Relay the response through `response::relay`, with the same bound on
//!   each wait for a body frame
//!
//! # Design Decisions
//! - Bodies stream in both directions; nothing is buffered
//! - On routes with auth, the client's `Authorization` and `Cookie` are never
//!   forwarded; only granted values are, and a missing grant removes them
//! - Outbound requests always use HTTP/1.1 to the upstream

use std::net::IpAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, COOKIE, HOST};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode};
use axum::response::Response;
use hyper_util::client::legacy::{connect::HttpConnector, Client};

use crate::auth::Grant;
use crate::http::response;
use crate::routing::Route;
use crate::security::headers::{set_forwarded, strip_hop_by_hop};

/// Failure to get a response head from the upstream.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("invalid upstream request: {0}")]
    Request(#[from] axum::http::Error),
    #[error("upstream transport error: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),
    #[error("upstream timed out after {0:?}")]
    Timeout(Duration),
}

impl ForwardError {
    /// Status returned to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            ForwardError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

/// What the client side of the connection looked like.
#[derive(Debug, Clone)]
pub struct ClientContext {
    /// Peer address of the inbound connection.
    pub ip: Option<IpAddr>,
    /// Scheme the client used (`http` or `https`).
    pub proto: String,
    /// Host the client addressed.
    pub host: String,
}

/// Proxies requests to route upstreams.
#[derive(Clone)]
pub struct Forwarder {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
    trust_forwarded_headers: bool,
}

impl Forwarder {
    pub fn new(client: Client<HttpConnector, Body>, timeout: Duration, trust_forwarded_headers: bool) -> Self {
        Self {
            client,
            timeout,
            trust_forwarded_headers,
        }
    }

    /// Build the outbound request.
    pub fn build_request(
        &self,
        route: &Route,
        inbound: Request<Body>,
        grant: Option<&Grant>,
        client: &ClientContext,
    ) -> Result<Request<Body>, ForwardError> {
        let (mut parts, body) = inbound.into_parts();

        let path = route.rewrite_path(parts.uri.path());
        let uri = route.upstream.uri_for(&path, parts.uri.query())?;

        let mut headers = std::mem::take(&mut parts.headers);
        strip_hop_by_hop(&mut headers);
        headers.insert(
            HOST,
            HeaderValue::from_str(route.upstream.authority().as_str())
                .map_err(axum::http::Error::from)?,
        );
        set_forwarded(
            &mut headers,
            client.ip,
            &client.proto,
            &client.host,
            self.trust_forwarded_headers,
        );

        if route.auth.requires_introspection() {
            let empty = Grant::default();
            let grant = grant.unwrap_or(&empty);
            replace_header(&mut headers, AUTHORIZATION, grant.authorization.as_ref());
            replace_header(&mut headers, COOKIE, grant.cookie.as_ref());
        }

        let mut request = Request::builder()
            .method(parts.method)
            .uri(uri)
            .body(body)?;
        *request.headers_mut() = headers;
        Ok(request)
    }

    /// Forward to the upstream and relay its response.
    pub async fn forward(
        &self,
        route: &Route,
        inbound: Request<Body>,
        grant: Option<&Grant>,
        client: &ClientContext,
    ) -> Result<Response, ForwardError> {
        let request = self.build_request(route, inbound, grant, client)?;

        tracing::trace!(route = %route.name, uri = %request.uri(), "Dispatching upstream request");

        let upstream = tokio::time::timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| ForwardError::Timeout(self.timeout))??;

        Ok(response::relay(upstream, route, grant, self.timeout))
    }
}

fn replace_header(headers: &mut HeaderMap, name: HeaderName, value: Option<&HeaderValue>) {
    match value {
        Some(value) => {
            headers.insert(name, value.clone());
        }
        None => {
            headers.remove(name);
        }
    }
}
