//! API Handlers
//!
//! Health and stats endpoints, plus the proxy handler that serves cache hits
//! and forwards everything else upstream.

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, Uri},
    response::{IntoResponse, Response},
};
use tracing::{error, info, warn};

use crate::cache::{CachePolicy, CacheStore};
use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::upstream::{Fetcher, UpstreamRequest, UpstreamResponse};

/// Marker header set on responses served from the store.
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Application state shared across all handlers.
///
/// The store guards its own access records, so handlers share it through a
/// plain `Arc` and never serialize on a global lock.
#[derive(Clone)]
pub struct AppState {
    /// On-disk artifact store
    pub store: Arc<CacheStore>,
    /// Eligibility rules, bypass flag and storage checks
    pub policy: Arc<CachePolicy>,
    /// Client for cache misses
    pub fetcher: Fetcher,
}

impl AppState {
    /// Creates a new AppState from its parts.
    pub fn new(store: CacheStore, policy: CachePolicy, fetcher: Fetcher) -> Self {
        Self {
            store: Arc::new(store),
            policy: Arc::new(policy),
            fetcher,
        }
    }

    /// Creates a new AppState from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = CacheStore::new(config.cache.directory.clone(), config.budget_bytes());
        let policy = CachePolicy::from_config(config);
        let fetcher = Fetcher::new(config)?;
        Ok(Self::new(store, policy, fetcher))
    }
}

/// Runs blocking store work on the blocking pool.
async fn run_blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| ProxyError::Internal(format!("store task failed: {}", e)))?
}

/// Handler for GET /health
pub async fn health_handler() -> &'static str {
    "OK"
}

/// Handler for GET /cache/stats
///
/// Reports a fresh scan of the cache directory as plain text.
pub async fn stats_handler(State(state): State<AppState>) -> Result<String> {
    let store = Arc::clone(&state.store);
    let usage = run_blocking(move || store.stats()).await.map_err(|e| {
        error!(error = %e, "failed to get cache stats");
        e
    })?;
    Ok(usage.to_string())
}

/// Fallback handler: every request that is not a local endpoint.
///
/// Eligible URLs found in the store are answered directly with
/// `X-Cache: HIT`. Everything else is forwarded unchanged and the response
/// relayed. Eligible `GET` responses that pass the storage checks are then
/// committed in the background. Store failures never fail the request.
pub async fn proxy_handler(State(state): State<AppState>, request: Request) -> Result<Response> {
    let (parts, body) = request.into_parts();
    if parts.method == Method::CONNECT {
        return Err(ProxyError::InvalidRequest(
            "CONNECT tunneling is not supported".to_string(),
        ));
    }

    let url = target_url(&parts.uri, &parts.headers)?;
    let eligible = state.policy.is_eligible(&url);
    // Only a GET body is the artifact itself.
    let committable = eligible && parts.method == Method::GET;

    if eligible {
        if let Some(data) = lookup(&state, &url).await {
            info!(url = %url, size = data.len(), "cache hit");
            return Ok(cache_hit(data));
        }
    }

    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|e| ProxyError::InvalidRequest(format!("failed to read request body: {}", e)))?;

    let upstream = state
        .fetcher
        .fetch(UpstreamRequest {
            method: parts.method,
            url: url.clone(),
            headers: parts.headers,
            body,
        })
        .await
        .map_err(|e| {
            match &e {
                ProxyError::BodyRead(_) => {
                    error!(url = %url, error = %e, "failed to read response body")
                }
                _ => error!(url = %url, error = %e, "proxy request failed"),
            }
            e
        })?;

    let store_after =
        committable && state.policy.should_store(upstream.status, upstream.content_type());
    let body = upstream.body.clone();

    let response = relay(upstream);
    if store_after {
        tokio::spawn(commit(Arc::clone(&state.store), url, body));
    }
    Ok(response)
}

/// Resolves the absolute URL of a proxied request.
///
/// Absolute-form targets are used as received; origin-form targets are
/// resolved against the `Host` header.
pub fn target_url(uri: &Uri, headers: &HeaderMap) -> Result<String> {
    if uri.scheme().is_some() && uri.authority().is_some() {
        return Ok(uri.to_string());
    }

    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .filter(|h| !h.is_empty())
        .ok_or_else(|| {
            ProxyError::InvalidRequest(format!("request target '{}' has no host", uri))
        })?;
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    Ok(format!("http://{}{}", host, path))
}

/// Reads an artifact if present. Any store failure is logged and reported
/// as a miss.
async fn lookup(state: &AppState, url: &str) -> Option<Vec<u8>> {
    let store = Arc::clone(&state.store);
    let key = url.to_string();
    let result = run_blocking(move || {
        if !store.exists(&key) {
            return Ok(None);
        }
        store.get(&key).map(Some)
    })
    .await;

    match result {
        Ok(found) => found,
        Err(e) => {
            warn!(url = %url, error = %e, "failed to read from cache");
            None
        }
    }
}

/// Stores a response body. Failures are logged only.
async fn commit(store: Arc<CacheStore>, url: String, body: Bytes) {
    let key = url.clone();
    let size = body.len();

    match run_blocking(move || store.put(&key, &body)).await {
        Ok(()) => info!(url = %url, size, "cached response"),
        Err(e) => error!(url = %url, error = %e, "failed to cache response"),
    }
}

fn cache_hit(data: Vec<u8>) -> Response {
    ([(X_CACHE, HeaderValue::from_static("HIT"))], data).into_response()
}

fn relay(upstream: UpstreamResponse) -> Response {
    let mut response = Response::new(Body::from(upstream.body));
    *response.status_mut() = upstream.status;
    *response.headers_mut() = upstream.headers;
    response
}
