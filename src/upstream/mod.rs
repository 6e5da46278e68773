//! Upstream Module
//!
//! Outbound HTTP toward origin servers and the optional parent proxy.

mod fetcher;

pub use fetcher::{strip_hop_by_hop, Fetcher, UpstreamRequest, UpstreamResponse};
