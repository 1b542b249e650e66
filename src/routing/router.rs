//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up matching route for a path
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) path prefix scan (acceptable for typical route counts)
//! - Longest prefix wins; equal prefixes resolve to the first declared
//! - Explicit NoMatch rather than silent default

use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{HeaderName, Uri};
use url::Url;

use crate::config::{AuthMode, RouteConfig, ValidationError};
use crate::routing::matcher::{PathPrefixMatcher, PathRewrite};

/// Upstream target of a route.
#[derive(Debug, Clone)]
pub struct Upstream {
    authority: Authority,
    base_path: String,
}

impl Upstream {
    /// Parse an upstream base URL (`http://host:port[/base]`).
    pub fn parse(raw: &str) -> Result<Self, String> {
        let url = Url::parse(raw).map_err(|e| e.to_string())?;
        if url.scheme() != "http" {
            return Err(format!("unsupported scheme {:?}", url.scheme()));
        }
        let host = url.host_str().ok_or("missing host")?;
        let authority = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        let authority = authority.parse::<Authority>().map_err(|e| e.to_string())?;

        Ok(Self {
            authority,
            base_path: url.path().trim_end_matches('/').to_string(),
        })
    }

    /// Host (and port) of the upstream.
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Absolute URI for a (rewritten) path and optional query string.
    pub fn uri_for(&self, path: &str, query: Option<&str>) -> Result<Uri, axum::http::Error> {
        let mut path_and_query = format!("{}{}", self.base_path, path);
        if path_and_query.is_empty() {
            path_and_query.push('/');
        }
        if let Some(query) = query {
            path_and_query.push('?');
            path_and_query.push_str(query);
        }

        Uri::builder()
            .scheme(Scheme::HTTP)
            .authority(self.authority.clone())
            .path_and_query(path_and_query.parse::<PathAndQuery>()?)
            .build()
    }
}

/// A compiled route.
#[derive(Debug, Clone)]
pub struct Route {
    /// Route identifier for logging/metrics.
    pub name: String,
    matcher: PathPrefixMatcher,
    /// Optional rewrite applied to the path before forwarding.
    pub rewrite: Option<PathRewrite>,
    /// Where matching requests are sent.
    pub upstream: Upstream,
    /// Authorization applied before forwarding.
    pub auth: AuthMode,
    /// Upstream response headers dropped before relaying.
    pub ignored_response_headers: Vec<HeaderName>,
}

impl Route {
    /// Compile a route from its configuration.
    pub fn compile(index: usize, config: &RouteConfig) -> Result<Self, ValidationError> {
        let error = |field: &str, message: String| ValidationError {
            field: format!("routes[{}].{}", index, field),
            message,
        };

        let rewrite = config
            .rewrite
            .as_ref()
            .map(|r| PathRewrite::new(&r.pattern, r.replacement.clone()))
            .transpose()
            .map_err(|e| error("rewrite.pattern", e.to_string()))?;

        let upstream = Upstream::parse(&config.upstream).map_err(|e| error("upstream", e))?;

        let ignored_response_headers = config
            .ignored_response_headers
            .iter()
            .map(|name| HeaderName::from_bytes(name.as_bytes()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| error("ignored_response_headers", e.to_string()))?;

        Ok(Self {
            name: config
                .name
                .clone()
                .unwrap_or_else(|| config.path_prefix.clone()),
            matcher: PathPrefixMatcher::new(config.path_prefix.clone()),
            rewrite,
            upstream,
            auth: config.auth,
            ignored_response_headers,
        })
    }

    /// The configured path prefix.
    pub fn prefix(&self) -> &str {
        self.matcher.prefix()
    }

    /// Path to send upstream after applying the rewrite rule.
    pub fn rewrite_path<'a>(&self, path: &'a str) -> std::borrow::Cow<'a, str> {
        match &self.rewrite {
            Some(rewrite) => rewrite.apply(path),
            None => std::borrow::Cow::Borrowed(path),
        }
    }
}

/// Immutable route table.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Compile routes from configuration, keeping declaration order.
    pub fn from_config(configs: &[RouteConfig]) -> Result<Self, ValidationError> {
        let routes = configs
            .iter()
            .enumerate()
            .map(|(i, config)| Route::compile(i, config))
            .collect::<Result<Vec<_>, _>>()?;

        for (i, route) in routes.iter().enumerate() {
            if routes[..i].iter().any(|earlier| earlier.prefix() == route.prefix()) {
                tracing::warn!(
                    route = %route.name,
                    prefix = %route.prefix(),
                    "Duplicate path prefix; the earlier route takes precedence"
                );
            }
        }

        Ok(Self { routes })
    }

    /// Find the route for a path: longest matching prefix, first declared on ties.
    pub fn match_path(&self, path: &str) -> Option<&Route> {
        let mut best: Option<&Route> = None;
        for route in self.routes.iter().filter(|r| r.matcher.matches(path)) {
            let better = best.map_or(true, |b| {
                route.matcher.specificity() > b.matcher.specificity()
            });
            if better {
                best = Some(route);
            }
        }
        best
    }

    /// All routes in declaration order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}
