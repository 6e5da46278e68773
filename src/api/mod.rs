//! API Module
//!
//! HTTP handlers and routing for the caching proxy.
//!
//! # Endpoints
//! - `GET /health` - Health check endpoint
//! - `GET /cache/stats` - Cache size report
//! - any other request - Forward proxy with disk cache

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
