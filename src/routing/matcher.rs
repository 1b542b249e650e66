//! Path matching and rewriting.
//!
//! # Responsibilities
//! - Normalize the request path before any matching
//! - Match path prefix (case-sensitive, plain string prefix)
//! - Rewrite the matched path with a regex before forwarding
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - Prefix matching is a plain string prefix, not segment-aware:
//!   `/api` matches `/api`, `/api/x` and `/apix`
//! - A rewrite whose pattern does not match leaves the path unchanged
//! - Routes see the normalized path only; upstreams receive that same path,
//!   so `/public/../app` can never be matched as `/public`

use std::borrow::Cow;

use regex::Regex;

/// Matches the request path prefix.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    /// Create a new path prefix matcher.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Returns true if the path starts with this prefix.
    pub fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.prefix)
    }

    /// Length of the prefix, used to rank overlapping matches.
    pub fn specificity(&self) -> usize {
        self.prefix.len()
    }

    /// The configured prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

/// Regex-based path rewrite.
#[derive(Debug, Clone)]
pub struct PathRewrite {
    pattern: Regex,
    replacement: String,
}

impl PathRewrite {
    /// Compile a rewrite rule.
    pub fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            replacement: replacement.into(),
        })
    }

    /// Rewrite the path. The first match is replaced; no match forwards the
    /// path as-is. The result always starts with `/`.
    pub fn apply<'a>(&self, path: &'a str) -> Cow<'a, str> {
        if !self.pattern.is_match(path) {
            return Cow::Borrowed(path);
        }

        let rewritten = self.pattern.replace(path, self.replacement.as_str());
        if rewritten.starts_with('/') {
            Cow::Owned(rewritten.into_owned())
        } else {
            Cow::Owned(format!("/{}", rewritten))
        }
    }
}

/// A request path that cannot be normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("path is not absolute")]
    NotAbsolute,
    #[error("malformed percent-encoding")]
    BadEscape,
    #[error("percent-encoded path separator")]
    EncodedSeparator,
}

/// Normalize a request path (RFC 3986, section 6.2.2).
///
/// Percent-encoded unreserved characters are decoded, `.` and `..` segments
/// are resolved (never above the root) and repeated slashes are merged.
/// Encoded `/` and `\` are rejected.
pub fn normalize_path(path: &str) -> Result<String, PathError> {
    if !path.starts_with('/') {
        return Err(PathError::NotAbsolute);
    }
    let decoded = decode_unreserved(path)?;

    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split('/').skip(1) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }

    let mut normalized = String::with_capacity(decoded.len());
    for segment in &segments {
        normalized.push('/');
        normalized.push_str(segment);
    }
    let directory = decoded.ends_with('/') || decoded.ends_with("/.") || decoded.ends_with("/..");
    if normalized.is_empty() || directory {
        normalized.push('/');
    }
    Ok(normalized)
}

fn decode_unreserved(path: &str) -> Result<String, PathError> {
    let bytes = path.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'%' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }

        let escape = bytes.get(i + 1..i + 3).ok_or(PathError::BadEscape)?;
        let hex = std::str::from_utf8(escape).map_err(|_| PathError::BadEscape)?;
        let value = u8::from_str_radix(hex, 16).map_err(|_| PathError::BadEscape)?;
        match value {
            b'/' | b'\\' => return Err(PathError::EncodedSeparator),
            v if v.is_ascii_alphanumeric() || matches!(v, b'-' | b'.' | b'_' | b'~') => out.push(v),
            _ => {
                out.push(b'%');
                out.extend(escape.iter().map(u8::to_ascii_uppercase));
            }
        }
        i += 3;
    }
    String::from_utf8(out).map_err(|_| PathError::BadEscape)
}
