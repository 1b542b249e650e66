//! Failure injection tests: slow or broken introspection and upstreams.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use auth_proxy::config::AuthMode;
use reqwest::header::{LOCATION, SET_COOKIE};

mod common;
use common::{base_config, client, route, start_proxy, start_stalled_upstream, MockServer, Reply};

/// An address nothing listens on.
async fn dead_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

#[tokio::test]
async fn test_introspection_timeout_denies() {
    let introspection =
        MockServer::start(Reply::status(200).delayed(Duration::from_secs(5))).await;
    let upstream = MockServer::start(Reply::ok("data")).await;

    let mut config = base_config(&introspection);
    config.auth.authorize_url = None;
    config.auth.timeout_ms = 200;
    config.routes.push(route("/app", &upstream, AuthMode::Cookie));
    let proxy = start_proxy(config).await;

    let start = Instant::now();
    let res = client().get(proxy.url("/app")).send().await.unwrap();

    assert_eq!(res.status(), 401);
    assert!(start.elapsed() < Duration::from_secs(3), "timeout must not hang");
    assert!(upstream.calls().is_empty());
}

#[tokio::test]
async fn test_introspection_timeout_redirects_to_login() {
    let introspection =
        MockServer::start(Reply::status(200).delayed(Duration::from_secs(5))).await;
    let upstream = MockServer::start(Reply::ok("data")).await;

    let mut config = base_config(&introspection);
    config.auth.timeout_ms = 200;
    config.routes.push(route("/oauth2_protected", &upstream, AuthMode::OAuth2));
    let proxy = start_proxy(config).await;

    let res = client().get(proxy.url("/oauth2_protected/data")).send().await.unwrap();

    assert_eq!(res.status(), 302);
    assert!(res.headers()[LOCATION]
        .to_str()
        .unwrap()
        .starts_with("https://auth.example.com/api/openidconnect/authorize?"));
}

#[tokio::test]
async fn test_introspection_unreachable_denies() {
    let introspection = MockServer::start(Reply::status(200)).await;
    let upstream = MockServer::start(Reply::ok("data")).await;

    let mut config = base_config(&introspection);
    config.auth.authorize_url = None;
    config.introspection.cookie = Some(format!("http://{}/introspect", dead_addr().await));
    config.routes.push(route("/app", &upstream, AuthMode::Cookie));
    let proxy = start_proxy(config).await;

    let res = client().get(proxy.url("/app")).send().await.unwrap();

    assert_eq!(res.status(), 401);
    assert!(upstream.calls().is_empty());
}

#[tokio::test]
async fn test_unexpected_introspection_status_denies() {
    let introspection = MockServer::start(Reply::status(500)).await;
    let upstream = MockServer::start(Reply::ok("data")).await;

    let mut config = base_config(&introspection);
    config.auth.authorize_url = None;
    config.routes.push(route("/app", &upstream, AuthMode::Cookie));
    let proxy = start_proxy(config).await;

    let res = client().get(proxy.url("/app")).send().await.unwrap();

    assert_eq!(res.status(), 401);
    assert!(res.text().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_upstream_timeout_is_gateway_timeout() {
    let introspection = MockServer::start(Reply::status(500)).await;
    let upstream = MockServer::start(Reply::ok("late").delayed(Duration::from_secs(5))).await;

    let mut config = base_config(&introspection);
    config.timeouts.upstream_secs = 1;
    config.routes.push(route("/", &upstream, AuthMode::None));
    let proxy = start_proxy(config).await;

    let res = client().get(proxy.url("/slow")).send().await.unwrap();

    assert_eq!(res.status(), 504);
}

#[tokio::test]
async fn test_upstream_unreachable_is_bad_gateway() {
    let introspection = MockServer::start(Reply::status(500)).await;

    let mut config = base_config(&introspection);
    let mut dead = route("/", &introspection, AuthMode::None);
    dead.upstream = format!("http://{}", dead_addr().await);
    config.routes.push(dead);
    let proxy = start_proxy(config).await;

    let res = client().get(proxy.url("/")).send().await.unwrap();

    assert_eq!(res.status(), 502);
    assert_eq!(res.text().await.unwrap(), "Bad Gateway");
}

#[tokio::test]
async fn test_upstream_errors_are_relayed_verbatim() {
    let introspection = MockServer::start(Reply::status(500)).await;
    let upstream = MockServer::start(Reply {
        body: "upstream broke",
        ..Reply::status(503)
    })
    .await;

    let mut config = base_config(&introspection);
    config.routes.push(route("/", &upstream, AuthMode::None));
    let proxy = start_proxy(config).await;

    let res = client().get(proxy.url("/")).send().await.unwrap();

    assert_eq!(res.status(), 503);
    assert_eq!(res.text().await.unwrap(), "upstream broke");
}

#[tokio::test]
async fn test_ignored_response_headers_are_dropped() {
    let introspection = MockServer::start(Reply::status(500)).await;
    let upstream = MockServer::start(
        Reply::ok("ok")
            .header("x-powered-by", "legacy")
            .header("cache-control", "max-age=3600")
            .header("content-language", "en"),
    )
    .await;

    let mut config = base_config(&introspection);
    let mut open = route("/", &upstream, AuthMode::None);
    open.ignored_response_headers = vec!["X-Powered-By".into(), "Cache-Control".into()];
    config.routes.push(open);
    let proxy = start_proxy(config).await;

    let res = client().get(proxy.url("/")).send().await.unwrap();

    assert!(res.headers().get("x-powered-by").is_none());
    assert!(res.headers().get("cache-control").is_none());
    assert_eq!(res.headers()["content-language"], "en");
}

#[tokio::test]
async fn test_stalled_upstream_body_is_cut_off() {
    let introspection = MockServer::start(Reply::status(500)).await;
    let stalled = start_stalled_upstream().await;

    let mut config = base_config(&introspection);
    config.timeouts.upstream_secs = 1;
    let mut slow = route("/", &introspection, AuthMode::None);
    slow.upstream = format!("http://{}", stalled);
    config.routes.push(slow);
    let proxy = start_proxy(config).await;

    let start = Instant::now();
    let res = client().get(proxy.url("/download")).send().await.unwrap();
    assert_eq!(res.status(), 200);

    let body = tokio::time::timeout(Duration::from_secs(5), res.bytes())
        .await
        .expect("body must not hang past the idle timeout");
    assert!(body.is_err(), "truncated body must surface as an error");
    assert!(start.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_anonymous_cookie_survives_upstream_failure() {
    let introspection = MockServer::start(Reply::status(200).header("set-cookie", "sid=abc")).await;

    let mut config = base_config(&introspection);
    let mut dead = route("/open_access", &introspection, AuthMode::CookieAnonymous);
    dead.upstream = format!("http://{}", dead_addr().await);
    config.routes.push(dead);
    let proxy = start_proxy(config).await;

    let res = client().get(proxy.url("/open_access/page")).send().await.unwrap();

    assert_eq!(res.status(), 502);
    assert_eq!(res.headers()[SET_COOKIE], "sid=abc");
}
