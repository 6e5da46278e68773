//! Integration Tests for the Caching Proxy
//!
//! Drives the full router against a simulated origin running on an
//! ephemeral local port.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use pkg_cache::{
    cache::{CachePolicy, CacheRule, CacheStore},
    create_router,
    upstream::Fetcher,
    AppState, Config,
};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tower::ServiceExt;

// == Helper Functions ==

/// Simulated origin server counting every request it answers.
struct Origin {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl Origin {
    async fn start() -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/file.zip", get(zip_file).post(zip_file))
            .route("/dynamic/page.zip", get(html_page))
            .route("/missing.zip", get(missing))
            .route("/echo", any(echo))
            .route("/health", any(echo))
            .with_state(Arc::clone(&hits));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, hits }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn zip_file(State(hits): State<Arc<AtomicUsize>>) -> Response {
    hits.fetch_add(1, Ordering::SeqCst);
    (
        [
            (header::CONTENT_TYPE, "application/zip"),
            (header::ETAG, "\"origin-v1\""),
        ],
        b"PK\x03\x04 zip payload".to_vec(),
    )
        .into_response()
}

async fn html_page(State(hits): State<Arc<AtomicUsize>>) -> Response {
    hits.fetch_add(1, Ordering::SeqCst);
    (
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        "<html>dynamic</html>",
    )
        .into_response()
}

async fn missing(State(hits): State<Arc<AtomicUsize>>) -> Response {
    hits.fetch_add(1, Ordering::SeqCst);
    (StatusCode::NOT_FOUND, "no such file").into_response()
}

async fn echo(
    State(hits): State<Arc<AtomicUsize>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    hits.fetch_add(1, Ordering::SeqCst);
    let custom = headers
        .get("x-custom")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    (
        StatusCode::CREATED,
        [("x-origin", "echo")],
        format!("{} {} {}", method, custom, String::from_utf8_lossy(&body)),
    )
        .into_response()
}

fn proxy_app(dir: &TempDir, bypass: bool) -> Router {
    let rules = vec![
        CacheRule::new(r"\.zip$"),
        CacheRule::disabled(r"/echo$"),
        CacheRule::new("(broken"),
    ];
    let state = AppState::new(
        CacheStore::new(dir.path().join("cache"), 1024 * 1024),
        CachePolicy::new(&rules).with_bypass(bypass),
        Fetcher::new(&Config::default()).unwrap(),
    );
    create_router(state)
}

async fn send(app: &Router, method: Method, uri: &str, body: &'static str) -> Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("x-custom", "forwarded")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn get_url(app: &Router, uri: &str) -> Response {
    send(app, Method::GET, uri, "").await
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

fn cache_files(dir: &TempDir) -> usize {
    match std::fs::read_dir(dir.path().join("cache")) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    }
}

fn written_files(dir: &TempDir) -> usize {
    match std::fs::read_dir(dir.path().join("cache")) {
        Ok(entries) => entries
            .filter_map(|e| e.ok()?.metadata().ok())
            .filter(|m| m.len() > 0)
            .count(),
        Err(_) => 0,
    }
}

/// Waits for background commits to land.
async fn wait_for_files(dir: &TempDir, count: usize) {
    for _ in 0..200 {
        if written_files(dir) >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} cached files, found {}", count, cache_files(dir));
}

/// Gives a background commit time to run if one was scheduled.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

/// Origin that sends response headers promising a body, then hangs up.
async fn start_truncating_origin() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\nContent-Type: application/zip\r\nContent-Length: 1000\r\n\r\npartial",
                )
                .await;
            let _ = socket.shutdown().await;
        }
    });
    addr
}

// == Hit / Miss Tests ==

#[tokio::test]
async fn test_second_request_is_cache_hit() {
    let origin = Origin::start().await;
    let dir = TempDir::new().unwrap();
    let app = proxy_app(&dir, false);
    let url = origin.url("/file.zip");

    let first = get_url(&app, &url).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert!(first.headers().get("x-cache").is_none());
    let first_body = body_bytes(first).await;
    wait_for_files(&dir, 1).await;

    let second = get_url(&app, &url).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.headers().get("x-cache").unwrap(), "HIT");
    let second_body = body_bytes(second).await;

    assert_eq!(first_body, b"PK\x03\x04 zip payload");
    assert_eq!(first_body, second_body);
    assert_eq!(origin.hits(), 1);
    assert_eq!(cache_files(&dir), 1);
}

#[tokio::test]
async fn test_miss_relays_upstream_headers() {
    let origin = Origin::start().await;
    let dir = TempDir::new().unwrap();
    let app = proxy_app(&dir, false);

    let response = get_url(&app, &origin.url("/file.zip")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/zip"
    );
    assert_eq!(response.headers().get(header::ETAG).unwrap(), "\"origin-v1\"");
}

#[tokio::test]
async fn test_ineligible_request_always_forwarded() {
    let origin = Origin::start().await;
    let dir = TempDir::new().unwrap();
    let app = proxy_app(&dir, false);
    let url = origin.url("/echo");

    for _ in 0..2 {
        let response = get_url(&app, &url).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.headers().get("x-cache").is_none());
    }

    settle().await;
    assert_eq!(origin.hits(), 2);
    assert_eq!(cache_files(&dir), 0);
}

#[tokio::test]
async fn test_request_forwarded_unchanged() {
    let origin = Origin::start().await;
    let dir = TempDir::new().unwrap();
    let app = proxy_app(&dir, false);

    let response = send(&app, Method::POST, &origin.url("/echo"), "request body").await;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers().get("x-origin").unwrap(), "echo");
    assert_eq!(body_bytes(response).await, b"POST forwarded request body");
}

// == Storage Policy Tests ==

#[tokio::test]
async fn test_html_response_not_cached() {
    let origin = Origin::start().await;
    let dir = TempDir::new().unwrap();
    let app = proxy_app(&dir, false);
    let url = origin.url("/dynamic/page.zip");

    for _ in 0..2 {
        let response = get_url(&app, &url).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-cache").is_none());
        assert_eq!(body_bytes(response).await, b"<html>dynamic</html>");
    }

    settle().await;
    assert_eq!(origin.hits(), 2);
    assert_eq!(cache_files(&dir), 0);
}

#[tokio::test]
async fn test_error_status_not_cached() {
    let origin = Origin::start().await;
    let dir = TempDir::new().unwrap();
    let app = proxy_app(&dir, false);
    let url = origin.url("/missing.zip");

    for _ in 0..2 {
        let response = get_url(&app, &url).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get("x-cache").is_none());
    }

    settle().await;
    assert_eq!(origin.hits(), 2);
    assert_eq!(cache_files(&dir), 0);
}

#[tokio::test]
async fn test_head_response_not_cached() {
    let origin = Origin::start().await;
    let dir = TempDir::new().unwrap();
    let app = proxy_app(&dir, false);
    let url = origin.url("/file.zip");

    let head = send(&app, Method::HEAD, &url, "").await;
    assert_eq!(head.status(), StatusCode::OK);
    settle().await;
    assert_eq!(cache_files(&dir), 0);

    let response = get_url(&app, &url).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-cache").is_none());
    assert_eq!(body_bytes(response).await, b"PK\x03\x04 zip payload");
    wait_for_files(&dir, 1).await;

    let response = get_url(&app, &url).await;
    assert_eq!(response.headers().get("x-cache").unwrap(), "HIT");
    assert_eq!(body_bytes(response).await, b"PK\x03\x04 zip payload");
    assert_eq!(origin.hits(), 2);
}

#[tokio::test]
async fn test_post_to_eligible_url_not_cached() {
    let origin = Origin::start().await;
    let dir = TempDir::new().unwrap();
    let app = proxy_app(&dir, false);

    let url = origin.url("/file.zip");

    let response = send(&app, Method::POST, &url, "upload").await;
    assert_eq!(response.status(), StatusCode::OK);
    settle().await;
    assert_eq!(cache_files(&dir), 0);

    let response = get_url(&app, &url).await;
    assert!(response.headers().get("x-cache").is_none());
    assert_eq!(origin.hits(), 2);
}

#[tokio::test]
async fn test_bypass_skips_lookup_and_commit() {
    let origin = Origin::start().await;
    let dir = TempDir::new().unwrap();
    let app = proxy_app(&dir, true);
    let url = origin.url("/file.zip");

    for _ in 0..2 {
        let response = get_url(&app, &url).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-cache").is_none());
    }

    settle().await;
    assert_eq!(origin.hits(), 2);
    assert_eq!(cache_files(&dir), 0);
}

// == Degradation Tests ==

#[tokio::test]
async fn test_removed_artifact_falls_through_to_origin() {
    let origin = Origin::start().await;
    let dir = TempDir::new().unwrap();
    let app = proxy_app(&dir, false);
    let url = origin.url("/file.zip");

    get_url(&app, &url).await;
    wait_for_files(&dir, 1).await;
    for entry in std::fs::read_dir(dir.path().join("cache")).unwrap() {
        std::fs::remove_file(entry.unwrap().path()).unwrap();
    }

    let response = get_url(&app, &url).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-cache").is_none());
    assert_eq!(body_bytes(response).await, b"PK\x03\x04 zip payload");
    assert_eq!(origin.hits(), 2);
}

#[tokio::test]
async fn test_unreachable_origin_is_bad_gateway() {
    let dir = TempDir::new().unwrap();
    let app = proxy_app(&dir, false);

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let response = get_url(&app, &format!("http://{}/file.zip", addr)).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(cache_files(&dir), 0);
}

#[tokio::test]
async fn test_truncated_origin_body_is_server_error() {
    let dir = TempDir::new().unwrap();
    let app = proxy_app(&dir, false);
    let addr = start_truncating_origin().await;

    let response = get_url(&app, &format!("http://{}/file.zip", addr)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(String::from_utf8(body_bytes(response).await)
        .unwrap()
        .starts_with("Body read error:"));
    settle().await;
    assert_eq!(cache_files(&dir), 0);
}

// == Local Endpoint Tests ==

#[tokio::test]
async fn test_stats_empty_store() {
    let dir = TempDir::new().unwrap();
    let app = proxy_app(&dir, false);

    let response = get_url(&app, "/cache/stats").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_bytes(response).await,
        b"Cache Size: 0 bytes (0 MB)\nFiles: 0\n"
    );
}

#[tokio::test]
async fn test_stats_after_commit() {
    let origin = Origin::start().await;
    let dir = TempDir::new().unwrap();
    let app = proxy_app(&dir, false);

    get_url(&app, &origin.url("/file.zip")).await;
    wait_for_files(&dir, 1).await;

    let response = get_url(&app, "/cache/stats").await;
    let expected = format!(
        "Cache Size: {} bytes (0 MB)\nFiles: 1\n",
        b"PK\x03\x04 zip payload".len()
    );
    assert_eq!(body_bytes(response).await, expected.as_bytes());
}

#[tokio::test]
async fn test_health() {
    let dir = TempDir::new().unwrap();
    let app = proxy_app(&dir, false);

    let response = get_url(&app, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"OK");
}

#[tokio::test]
async fn test_post_to_health_path_is_forwarded() {
    let origin = Origin::start().await;
    let dir = TempDir::new().unwrap();
    let app = proxy_app(&dir, false);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/health")
                .header(header::HOST, origin.addr.to_string())
                .header("x-custom", "forwarded")
                .body(Body::from("ping"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_bytes(response).await, b"POST forwarded ping");
    assert_eq!(origin.hits(), 1);
}
