//! Failure redirects.
//!
//! # Responsibilities
//! - Turn a 401 into a redirect to the OpenID Connect authorize endpoint
//! - Turn a 403 into a redirect to the access-denied page, when one is configured
//! - Otherwise surface the bare status with an empty body
//! - For machine clients, answer 401 with a `WWW-Authenticate` challenge
//!
//! The original external URI travels in `redirect_uri` (401) or `what` (403)
//! so the user lands back on it after the login flow.

use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, LOCATION, WWW_AUTHENTICATE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use url::Url;

use crate::auth::decision::Denial;
use crate::config::{AuthConfig, ValidationError};

/// Builds the client-facing response for a denied request.
#[derive(Debug, Clone)]
pub struct FailureRedirector {
    authorize_url: Option<Url>,
    client_id: String,
    scope: String,
    prompt: String,
    denied_url: Option<Url>,
    basic_challenge: HeaderValue,
}

impl FailureRedirector {
    pub fn new(config: &AuthConfig) -> Result<Self, ValidationError> {
        let parse = |field: &str, raw: &Option<String>| {
            raw.as_deref()
                .map(Url::parse)
                .transpose()
                .map_err(|e| ValidationError {
                    field: field.to_string(),
                    message: e.to_string(),
                })
        };

        Ok(Self {
            authorize_url: parse("auth.authorize_url", &config.authorize_url)?,
            client_id: config.client_id.clone(),
            scope: config.scope.clone(),
            prompt: config.prompt.clone(),
            denied_url: parse("auth.denied_url", &config.denied_url)?,
            basic_challenge: HeaderValue::from_str(&format!("Basic realm=\"{}\"", config.basic_realm))
                .map_err(|e| ValidationError {
                    field: "auth.basic_realm".to_string(),
                    message: e.to_string(),
                })?,
        })
    }

    /// Redirect target for a denial, if one is configured.
    pub fn location(&self, denial: Denial, original_uri: &str) -> Option<Url> {
        match denial {
            Denial::Unauthenticated => {
                let mut url = self.authorize_url.clone()?;
                url.query_pairs_mut()
                    .append_pair("response_type", "code")
                    .append_pair("scope", &self.scope)
                    .append_pair("client_id", &self.client_id)
                    .append_pair("prompt", &self.prompt)
                    .append_pair("redirect_uri", original_uri);
                Some(url)
            }
            Denial::Forbidden => {
                let mut url = self.denied_url.clone()?;
                url.query_pairs_mut()
                    .append_pair("error", "access_denied")
                    .append_pair("what", original_uri);
                Some(url)
            }
        }
    }

    /// Response sent to the client for a denial.
    pub fn respond(&self, denial: Denial, original_uri: &str) -> Response {
        let location = self
            .location(denial, original_uri)
            .and_then(|url| HeaderValue::from_str(url.as_str()).ok());

        match location {
            Some(location) => Response::builder()
                .status(StatusCode::FOUND)
                .header(LOCATION, location)
                .header(CACHE_CONTROL, "no-store")
                .body(Body::empty())
                .unwrap_or_else(|_| StatusCode::FOUND.into_response()),
            None => denial.status().into_response(),
        }
    }

    /// Response for a denied machine client. Never redirects.
    ///
    /// A 401 carries the introspection service's challenge, or a Basic
    /// challenge for the configured realm when the service gave none.
    pub fn challenge(&self, denial: Denial, challenge: Option<&HeaderValue>) -> Response {
        let mut response = denial.status().into_response();
        if denial == Denial::Unauthenticated {
            let value = challenge.unwrap_or(&self.basic_challenge).clone();
            response.headers_mut().insert(WWW_AUTHENTICATE, value);
        }
        response
    }
}
