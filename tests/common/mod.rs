//! Shared utilities for integration tests.
//!
//! Mock introspection and upstream servers are small axum apps on ephemeral
//! ports that record every request they see and answer with a fixed reply.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use auth_proxy::config::{AuthMode, ProxyConfig, RewriteConfig, RouteConfig};
use auth_proxy::http::HttpServer;
use auth_proxy::lifecycle::Shutdown;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use axum::Router;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// One request as seen by a mock server.
#[derive(Debug, Clone)]
pub struct Captured {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: String,
}

impl Captured {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Fixed reply of a mock server.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(&'static str, &'static str)>,
    pub body: &'static str,
    pub delay: Option<Duration>,
}

impl Reply {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: "",
            delay: None,
        }
    }

    pub fn ok(body: &'static str) -> Self {
        Self {
            body,
            ..Self::status(200)
        }
    }

    pub fn header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.push((name, value));
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[derive(Clone)]
struct MockState {
    reply: Reply,
    calls: Arc<Mutex<Vec<Captured>>>,
}

/// A running mock server.
pub struct MockServer {
    pub addr: SocketAddr,
    calls: Arc<Mutex<Vec<Captured>>>,
}

impl MockServer {
    pub async fn start(reply: Reply) -> Self {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            reply,
            calls: calls.clone(),
        };
        let app = Router::new().fallback(capture).with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, calls }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn calls(&self) -> Vec<Captured> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last(&self) -> Captured {
        self.calls().pop().expect("mock server received no request")
    }
}

async fn capture(State(state): State<MockState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();

    state.calls.lock().unwrap().push(Captured {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        headers: parts.headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    if let Some(delay) = state.reply.delay {
        tokio::time::sleep(delay).await;
    }

    let mut response = Response::new(Body::from(state.reply.body));
    *response.status_mut() = StatusCode::from_u16(state.reply.status).unwrap();
    for (name, value) in &state.reply.headers {
        response.headers_mut().append(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    response
}

/// A proxy running on an ephemeral port. Dropping it stops the server.
pub struct ProxyHandle {
    pub addr: SocketAddr,
    _shutdown: Shutdown,
}

impl ProxyHandle {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn start_proxy(mut config: ProxyConfig) -> ProxyHandle {
    config.listener.bind_address = "127.0.0.1:0".into();
    let server = HttpServer::new(config).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    ProxyHandle {
        addr,
        _shutdown: shutdown,
    }
}

pub fn route(prefix: &str, upstream: &MockServer, auth: AuthMode) -> RouteConfig {
    RouteConfig {
        name: None,
        path_prefix: prefix.into(),
        rewrite: None,
        upstream: upstream.url(""),
        auth,
        ignored_response_headers: Vec::new(),
    }
}

pub fn rewrite(pattern: &str, replacement: &str) -> Option<RewriteConfig> {
    Some(RewriteConfig {
        pattern: pattern.into(),
        replacement: replacement.into(),
    })
}

/// Base configuration: login redirects enabled, forwarded headers trusted.
pub fn base_config(introspection: &MockServer) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.auth.authorize_url = Some("https://auth.example.com/api/openidconnect/authorize".into());
    config.auth.client_id = "signin".into();
    config.auth.anonymous_id = Some("anon-42".into());
    config.auth.timeout_ms = 500;
    config.introspection.cookie = Some(introspection.url("/nginx/introspect/cookie"));
    config.introspection.oauth2 = Some(introspection.url("/nginx/introspect/oauth2"));
    config.introspection.cookie_anonymous =
        Some(introspection.url("/nginx/introspect/cookie/anonymous"));
    config.introspection.m2m = Some(introspection.url("/m2m/nginx"));
    config.external.trust_forwarded_headers = true;
    config.timeouts.upstream_secs = 2;
    config
}

/// Client that never follows redirects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap()
}

/// Send one request over a raw socket, path exactly as given, and return
/// the response status. Clients like reqwest normalize dot segments first.
pub async fn raw_get(addr: SocketAddr, path: &str, headers: &[(&str, &str)]) -> u16 {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut request = format!("GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n", path, addr);
    for (name, value) in headers {
        request.push_str(&format!("{}: {}\r\n", name, value));
    }
    request.push_str("\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8_lossy(&response);
    response
        .split_whitespace()
        .nth(1)
        .and_then(|status| status.parse().ok())
        .expect("malformed status line")
}

/// Upstream that sends a response head and part of the body, then stalls.
pub async fn start_stalled_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\npartial")
                    .await;
                tokio::time::sleep(Duration::from_secs(30)).await;
            });
        }
    });

    addr
}
