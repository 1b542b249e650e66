//! HTTP server setup and the request pipeline.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all proxy handler
//! - Wire up middleware (request ID, tracing, request timeout)
//! - Bind server to a plain or TLS listener
//! - Normalize the path, then run each request through
//!   route → introspect → decide → forward/redirect
//! - Emit one access log record and metrics per request

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request},
    response::Response,
    routing::any,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::auth::{
    challenge, decide, AuthDecision, Credentials, FailureRedirector, IntrospectionClient,
};
use crate::config::validation::validate_config;
use crate::config::{ConfigError, ProxyConfig};
use crate::http::forwarder::{ClientContext, Forwarder};
use crate::http::request::{
    normalize_uri, propagate_request_id_layer, set_request_id_layer, ExternalUrl, X_REQUEST_ID,
};
use crate::http::response;
use crate::observability::metrics;
use crate::routing::{Route, Router as ProxyRouter};

/// Time allowed for in-flight requests after shutdown on the TLS listener.
const TLS_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state injected into handlers. Read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<ProxyRouter>,
    pub introspection: IntrospectionClient,
    pub redirector: Arc<FailureRedirector>,
    pub forwarder: Forwarder,
    pub external: Arc<ExternalUrl>,
}

/// HTTP server for the auth proxy.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Validate the configuration and build the server.
    pub fn new(config: ProxyConfig) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let invalid = |e| ConfigError::Validation(vec![e]);
        let proxy_router = Arc::new(ProxyRouter::from_config(&config.routes).map_err(invalid)?);

        // One pooled client serves both introspection and upstream calls
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        let introspection = IntrospectionClient::new(client.clone(), &config.introspection, &config.auth)
            .map_err(invalid)?;
        let redirector = Arc::new(FailureRedirector::new(&config.auth).map_err(invalid)?);
        let forwarder = Forwarder::new(
            client,
            Duration::from_secs(config.timeouts.upstream_secs),
            config.external.trust_forwarded_headers,
        );
        let external = Arc::new(ExternalUrl::new(&config.external, config.listener.tls.is_some()));

        let state = AppState {
            router: proxy_router,
            introspection,
            redirector,
            forwarder,
            external,
        };

        tracing::info!(
            routes = state.router.routes().len(),
            "Route table compiled"
        );
        for route in state.router.routes() {
            tracing::debug!(
                route = %route.name,
                prefix = %route.prefix(),
                upstream = %route.upstream.authority(),
                auth = %route.auth,
                "Route"
            );
        }

        let router = Self::build_router(&config, state);
        Ok(Self { router })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(TraceLayer::new_for_http())
                    .layer(propagate_request_id_layer())
                    .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs))),
            )
    }

    /// Run the server on a plain TCP listener until shutdown is signalled.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Run the server with TLS termination until shutdown is signalled.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        tracing::info!(address = %addr, "HTTPS server starting");

        let handle = axum_server::Handle::new();
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            tracing::info!("Shutdown signal received");
            shutdown_handle.graceful_shutdown(Some(TLS_DRAIN_TIMEOUT));
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(app)
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}

/// Main proxy handler.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut request: Request<Body>,
) -> Response {
    let start_time = Instant::now();
    let request_id = request.headers().get(X_REQUEST_ID).cloned();
    let request_id_str = request_id
        .as_ref()
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let method = request.method().to_string();

    match normalize_uri(request.uri()) {
        Ok(uri) => *request.uri_mut() = uri,
        Err(e) => {
            tracing::info!(
                request_id = %request_id_str,
                method = %method,
                path = %request.uri().path(),
                status = 400,
                error = %e,
                "Rejected request path"
            );
            metrics::record_request("none", &method, 400, start_time);
            return response::bad_request();
        }
    }
    let path = request.uri().path().to_string();

    let Some(route) = state.router.match_path(&path) else {
        tracing::info!(
            request_id = %request_id_str,
            method = %method,
            path = %path,
            status = 404,
            "No route matched"
        );
        metrics::record_request("none", &method, 404, start_time);
        return response::not_found();
    };

    let (auth_outcome, response) = handle_route(&state, route, addr, request, request_id.as_ref()).await;

    let status = response.status().as_u16();
    tracing::info!(
        request_id = %request_id_str,
        method = %method,
        path = %path,
        route = %route.name,
        auth = auth_outcome,
        status,
        latency_ms = start_time.elapsed().as_millis() as u64,
        "Request completed"
    );
    metrics::record_request(&route.name, &method, status, start_time);

    response
}

/// Authorize (when the route asks for it) and then forward or redirect.
///
/// Returns the auth outcome label along with the client response.
async fn handle_route(
    state: &AppState,
    route: &Route,
    addr: SocketAddr,
    request: Request<Body>,
    request_id: Option<&HeaderValue>,
) -> (&'static str, Response) {
    let original_uri = state.external.original_uri(request.headers(), request.uri());

    let grant = if route.auth.requires_introspection() {
        let credentials = Credentials::from_headers(request.headers());
        let outcome = state
            .introspection
            .introspect(route.auth, &credentials, &original_uri, request_id)
            .await;

        if let Err(e) = &outcome {
            tracing::warn!(
                route = %route.name,
                auth = %route.auth,
                error = %e,
                "Introspection failed"
            );
        }

        let decision = decide(route.auth, &outcome);
        let label = decision.label();
        tracing::debug!(route = %route.name, auth = %route.auth, decision = label, "Authorization decided");
        metrics::record_auth_decision(route.auth.as_str(), label);

        match decision {
            AuthDecision::Allow(grant) => Some(grant),
            AuthDecision::Deny(denial) if route.auth.is_machine() => {
                return (label, state.redirector.challenge(denial, challenge(&outcome)));
            }
            AuthDecision::Deny(denial) => {
                return (label, state.redirector.respond(denial, &original_uri));
            }
        }
    } else {
        None
    };

    let client = ClientContext {
        ip: Some(addr.ip()),
        proto: state.external.scheme(request.headers()).to_string(),
        host: state
            .external
            .host(request.headers(), request.uri())
            .to_string(),
    };

    let auth_outcome = if grant.is_some() { "allow" } else { "none" };
    match state
        .forwarder
        .forward(route, request, grant.as_ref(), &client)
        .await
    {
        Ok(response) => (auth_outcome, response),
        Err(e) => {
            tracing::error!(route = %route.name, error = %e, "Upstream request failed");
            let mut response = response::gateway_error(e.status());
            if let Some(grant) = &grant {
                response::append_granted_cookies(response.headers_mut(), grant);
            }
            (auth_outcome, response)
        }
    }
}
