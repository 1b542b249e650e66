//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that every auth mode in use has an introspection endpoint
//! - Validate URLs, prefixes, rewrite patterns and header names
//! - Validate value ranges (timeouts > 0, bind address parses)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::HeaderName;
use regex::Regex;
use url::Url;

use crate::config::schema::{AuthMode, ProxyConfig, RouteConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field (e.g. `routes[2].upstream`).
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration, collecting every error.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("not a socket address: {:?}", config.listener.bind_address),
        ));
    }

    if config.routes.is_empty() {
        errors.push(ValidationError::new("routes", "at least one route is required"));
    }

    let mut modes_in_use = HashSet::new();
    for (i, route) in config.routes.iter().enumerate() {
        validate_route(i, route, &mut errors);
        modes_in_use.insert(route.auth);
    }

    for mode in modes_in_use.iter().filter(|m| m.requires_introspection()) {
        let field = format!("introspection.{}", mode);
        match config.introspection.endpoint(*mode) {
            Some(endpoint) => check_url(&field, endpoint, &["http"], &mut errors),
            None => errors.push(ValidationError::new(
                field,
                format!("required by routes with auth = \"{}\"", mode),
            )),
        }
    }

    if modes_in_use.contains(&AuthMode::CookieAnonymous) {
        let missing = config
            .auth
            .anonymous_id
            .as_deref()
            .map(str::trim)
            .map_or(true, str::is_empty);
        if missing {
            errors.push(ValidationError::new(
                "auth.anonymous_id",
                "required by routes with auth = \"cookie_anonymous\"",
            ));
        }
    }

    if modes_in_use.contains(&AuthMode::M2m) {
        let realm = &config.auth.basic_realm;
        if realm.chars().any(|c| c == '"' || c == '\\' || !(' '..='~').contains(&c)) {
            errors.push(ValidationError::new(
                "auth.basic_realm",
                "must be printable ASCII without quotes or backslashes",
            ));
        }
    }

    if let Some(authorize_url) = &config.auth.authorize_url {
        check_url("auth.authorize_url", authorize_url, &["http", "https"], &mut errors);
        if config.auth.client_id.trim().is_empty() {
            errors.push(ValidationError::new(
                "auth.client_id",
                "required when auth.authorize_url is set",
            ));
        }
    }

    if let Some(denied_url) = &config.auth.denied_url {
        check_url("auth.denied_url", denied_url, &["http", "https"], &mut errors);
    }

    if config.auth.timeout_ms == 0 {
        errors.push(ValidationError::new("auth.timeout_ms", "must be greater than zero"));
    }

    if let Some(base_url) = &config.external.base_url {
        check_url("external.base_url", base_url, &["http", "https"], &mut errors);
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than zero"));
    }
    if config.timeouts.upstream_secs == 0 {
        errors.push(ValidationError::new("timeouts.upstream_secs", "must be greater than zero"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_route(index: usize, route: &RouteConfig, errors: &mut Vec<ValidationError>) {
    let field = |name: &str| format!("routes[{}].{}", index, name);

    let prefix = &route.path_prefix;
    if !prefix.starts_with('/') {
        errors.push(ValidationError::new(field("path_prefix"), "must start with '/'"));
    }
    if prefix.chars().any(|c| c.is_whitespace() || c == '?' || c == '#') {
        errors.push(ValidationError::new(
            field("path_prefix"),
            "must not contain whitespace, '?' or '#'",
        ));
    }

    check_url(&field("upstream"), &route.upstream, &["http"], errors);
    if Url::parse(&route.upstream).is_ok_and(|url| url.query().is_some()) {
        errors.push(ValidationError::new(field("upstream"), "URL must not have a query"));
    }

    if let Some(rewrite) = &route.rewrite {
        if let Err(e) = Regex::new(&rewrite.pattern) {
            errors.push(ValidationError::new(
                field("rewrite.pattern"),
                format!("invalid regex: {}", e),
            ));
        }
    }

    for name in &route.ignored_response_headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                field("ignored_response_headers"),
                format!("invalid header name: {:?}", name),
            ));
        }
    }
}

fn check_url(field: &str, value: &str, schemes: &[&str], errors: &mut Vec<ValidationError>) {
    let url = match Url::parse(value) {
        Ok(url) => url,
        Err(e) => {
            errors.push(ValidationError::new(field, format!("invalid URL {:?}: {}", value, e)));
            return;
        }
    };

    if !schemes.contains(&url.scheme()) {
        errors.push(ValidationError::new(
            field,
            format!("scheme must be one of {:?}, got {:?}", schemes, url.scheme()),
        ));
    }
    if url.host_str().map_or(true, str::is_empty) {
        errors.push(ValidationError::new(field, "URL must have a host"));
    }
    if url.fragment().is_some() {
        errors.push(ValidationError::new(field, "URL must not have a fragment"));
    }
}
