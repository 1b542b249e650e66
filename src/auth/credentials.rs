//! Identity-bearing header extraction.

use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::{HeaderMap, HeaderValue};

/// Credentials carried by an inbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Raw `Authorization` value.
    pub authorization: Option<HeaderValue>,
    /// `Cookie` value; several `Cookie` lines are folded into one.
    pub cookie: Option<HeaderValue>,
}

impl Credentials {
    /// Pull `Authorization` and `Cookie` from request headers.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            authorization: headers.get(AUTHORIZATION).cloned(),
            cookie: fold_cookies(headers),
        }
    }

    /// True if the request carries neither header.
    pub fn is_empty(&self) -> bool {
        self.authorization.is_none() && self.cookie.is_none()
    }
}

// HTTP/2 clients may split cookies across several header fields.
fn fold_cookies(headers: &HeaderMap) -> Option<HeaderValue> {
    let mut values = headers.get_all(COOKIE).iter();
    let first = values.next()?;

    let mut folded = first.as_bytes().to_vec();
    for value in values {
        folded.extend_from_slice(b"; ");
        folded.extend_from_slice(value.as_bytes());
    }

    match HeaderValue::from_bytes(&folded) {
        Ok(value) => Some(value),
        Err(_) => Some(first.clone()),
    }
}
