//! Error types for the caching proxy
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

// == Proxy Error Enum ==
/// Unified error type for the caching proxy.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Malformed or unreadable configuration
    #[error("Config error: {0}")]
    Config(String),

    /// No artifact stored for the key
    #[error("Not found: {0}")]
    NotFound(String),

    /// Filesystem failure inside the cache store
    #[error("Store I/O error: {0}")]
    StoreIo(#[from] std::io::Error),

    /// Cache rule pattern that does not compile
    #[error("Invalid pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    /// Request the proxy cannot forward
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Upstream fetch failed (connection refused, TLS, timeout)
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Upstream body could not be read after headers arrived
    #[error("Body read error: {0}")]
    BodyRead(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// Maps the error to the status code returned to the client.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::NotFound(_) => StatusCode::NOT_FOUND,
            ProxyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Config(_)
            | ProxyError::StoreIo(_)
            | ProxyError::Pattern { .. }
            | ProxyError::BodyRead(_)
            | ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the caching proxy.
pub type Result<T> = std::result::Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_maps_to_bad_gateway() {
        let err = ProxyError::Upstream("connection refused".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_store_io_maps_to_internal() {
        let err: ProxyError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_invalid_request_maps_to_bad_request() {
        let err = ProxyError::InvalidRequest("no host".to_string());
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
