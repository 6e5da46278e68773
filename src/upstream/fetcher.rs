//! Upstream Fetcher
//!
//! Forwards a buffered request to the origin, or through the configured
//! parent proxy, and buffers the full response.

use std::time::Duration;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderName, Method, StatusCode};
use tracing::debug;

use crate::config::Config;
use crate::error::{ProxyError, Result};

/// Headers scoped to a single connection, never forwarded on either leg.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// A fully buffered request bound for an origin.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    /// Absolute target URL
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// A fully buffered origin response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamResponse {
    /// Value of the `Content-Type` header, if present and valid text.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }
}

// == Fetcher ==
/// HTTP client used for every cache miss.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    /// Builds the client from configuration.
    ///
    /// Proxy settings from the process environment are ignored; only the
    /// configured parent proxy is used. Redirects are relayed, not followed.
    pub fn new(config: &Config) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .no_proxy()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(config.upstream.connect_timeout_secs))
            .danger_accept_invalid_certs(config.upstream.insecure_tls);

        if let Some(url) = config.parent_proxy() {
            let mut proxy = reqwest::Proxy::all(url).map_err(|e| {
                ProxyError::Config(format!("invalid parent proxy '{}': {}", url, e))
            })?;
            if let Some(auth) = config.parent_proxy_auth.as_deref().filter(|a| !a.is_empty()) {
                let (user, password) = auth.split_once(':').unwrap_or((auth, ""));
                proxy = proxy.basic_auth(user, password);
            }
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| ProxyError::Config(format!("failed to build upstream client: {}", e)))?;
        Ok(Self { client })
    }

    // == Fetch ==
    /// Sends the request and reads the whole response body.
    ///
    /// A failure before response headers arrive is `Upstream`; a failure
    /// while reading the body is `BodyRead`. Nothing is retried.
    pub async fn fetch(&self, request: UpstreamRequest) -> Result<UpstreamResponse> {
        let mut headers = strip_hop_by_hop(request.headers);
        // Recomputed from the buffered body.
        headers.remove(header::CONTENT_LENGTH);

        debug!(method = %request.method, url = %request.url, "forwarding upstream");
        let response = self
            .client
            .request(request.method, &request.url)
            .headers(headers)
            .body(request.body)
            .send()
            .await
            .map_err(|e| ProxyError::Upstream(e.to_string()))?;

        let status = response.status();
        let headers = strip_hop_by_hop(response.headers().clone());
        let body = response
            .bytes()
            .await
            .map_err(|e| ProxyError::BodyRead(e.to_string()))?;

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

/// Removes hop-by-hop headers, including any named in `Connection`.
pub fn strip_hop_by_hop(mut headers: HeaderMap) -> HeaderMap {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();

    for name in &named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    headers
}
