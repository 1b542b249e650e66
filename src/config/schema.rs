//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the auth proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Route table, in declaration order.
    pub routes: Vec<RouteConfig>,

    /// Login redirect and introspection call settings.
    pub auth: AuthConfig,

    /// Introspection endpoints, one per auth mode.
    pub introspection: IntrospectionConfig,

    /// How the externally visible URL of a request is reconstructed.
    pub external: ExternalConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// How a route is authorized before it is forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// No introspection; identity headers pass through untouched.
    #[default]
    None,
    /// Session cookie introspection.
    Cookie,
    /// Bearer token introspection, with the original URI as context.
    #[serde(rename = "oauth2")]
    OAuth2,
    /// Cookie introspection that falls back to an anonymous session.
    CookieAnonymous,
    /// Machine-to-machine Basic credentials exchanged for a bearer token.
    /// Failures answer with a `WWW-Authenticate` challenge, never a redirect.
    M2m,
}

impl AuthMode {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::None => "none",
            AuthMode::Cookie => "cookie",
            AuthMode::OAuth2 => "oauth2",
            AuthMode::CookieAnonymous => "cookie_anonymous",
            AuthMode::M2m => "m2m",
        }
    }

    /// True if requests on this route go through introspection.
    pub fn requires_introspection(&self) -> bool {
        !matches!(self, AuthMode::None)
    }

    /// True if a failed login still yields an anonymous session.
    pub fn is_anonymous(&self) -> bool {
        matches!(self, AuthMode::CookieAnonymous)
    }

    /// True if clients are programs that cannot follow a login redirect.
    pub fn is_machine(&self) -> bool {
        matches!(self, AuthMode::M2m)
    }
}

impl std::fmt::Display for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Regex path rewrite, e.g. `^/seacat/api/seacat_auth/(.*)` → `/$1`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RewriteConfig {
    /// Pattern matched against the request path.
    pub pattern: String,

    /// Replacement, with `$1`-style capture references.
    pub replacement: String,
}

/// Route configuration mapping a path prefix to an upstream.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics. Defaults to the prefix.
    #[serde(default)]
    pub name: Option<String>,

    /// Path prefix to match.
    pub path_prefix: String,

    /// Optional path rewrite applied before forwarding.
    #[serde(default)]
    pub rewrite: Option<RewriteConfig>,

    /// Upstream base URL (e.g., "http://127.0.0.1:3000").
    pub upstream: String,

    /// Authorization applied to this route.
    #[serde(default)]
    pub auth: AuthMode,

    /// Upstream response headers removed before relaying to the client.
    #[serde(default)]
    pub ignored_response_headers: Vec<String>,
}

/// Login redirect and introspection call settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// OpenID Connect authorize endpoint. Without it, 401 is returned as-is.
    pub authorize_url: Option<String>,

    /// OAuth client ID sent with the login redirect.
    pub client_id: String,

    /// Scope sent with the login redirect.
    pub scope: String,

    /// Prompt sent with the login redirect.
    pub prompt: String,

    /// Access-denied landing page. Without it, 403 is returned as-is.
    pub denied_url: Option<String>,

    /// Subject ID of anonymous sessions.
    pub anonymous_id: Option<String>,

    /// Realm of the Basic challenge sent on failed `m2m` authentication,
    /// when the introspection service did not supply one.
    pub basic_realm: String,

    /// Introspection call timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            authorize_url: None,
            client_id: String::new(),
            scope: "openid cookie".to_string(),
            prompt: "login".to_string(),
            denied_url: None,
            anonymous_id: None,
            basic_realm: "auth-proxy".to_string(),
            timeout_ms: 5_000,
        }
    }
}

/// Introspection endpoints.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct IntrospectionConfig {
    /// Endpoint for `cookie` routes.
    pub cookie: Option<String>,

    /// Endpoint for `oauth2` routes.
    pub oauth2: Option<String>,

    /// Endpoint for `cookie_anonymous` routes.
    pub cookie_anonymous: Option<String>,

    /// Endpoint for `m2m` routes.
    pub m2m: Option<String>,
}

impl IntrospectionConfig {
    /// Configured endpoint for the given mode.
    pub fn endpoint(&self, mode: AuthMode) -> Option<&str> {
        match mode {
            AuthMode::None => None,
            AuthMode::Cookie => self.cookie.as_deref(),
            AuthMode::OAuth2 => self.oauth2.as_deref(),
            AuthMode::CookieAnonymous => self.cookie_anonymous.as_deref(),
            AuthMode::M2m => self.m2m.as_deref(),
        }
    }
}

/// External URL reconstruction.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ExternalConfig {
    /// Public scheme and host (e.g., "https://auth.example.com").
    /// Takes precedence over request headers.
    pub base_url: Option<String>,

    /// Honor X-Forwarded-Proto / X-Forwarded-Host from a TLS terminator.
    pub trust_forwarded_headers: bool,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time until the response head) in seconds.
    pub request_secs: u64,

    /// Upstream response head timeout in seconds.
    pub upstream_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 60,
            upstream_secs: 30,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
