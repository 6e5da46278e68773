//! pkg_cache - A forward caching proxy
//!
//! Serves cacheable downloads from a size-bounded disk store and forwards
//! everything else upstream, optionally through a parent proxy.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod upstream;

pub use api::{create_router, AppState};
pub use config::Config;
pub use error::{ProxyError, Result};
