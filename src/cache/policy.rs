//! Cache Policy Module
//!
//! Combines the rule set, the bypass flag and the response storage checks
//! the dispatcher consults on every request.

use axum::http::StatusCode;

use crate::cache::{CacheRule, RuleSet};
use crate::config::Config;

/// Per-request caching decisions.
#[derive(Debug, Clone, Default)]
pub struct CachePolicy {
    rules: RuleSet,
    bypass: bool,
    excluded_content_types: Vec<String>,
}

impl CachePolicy {
    /// Builds the policy from configuration, compiling the enabled rules.
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.cache_rules)
            .with_bypass(config.bypass_cache)
            .with_excluded_content_types(config.cache.excluded_content_types.clone())
    }

    /// Creates a policy over the given rules with HTML excluded.
    pub fn new(rules: &[CacheRule]) -> Self {
        Self {
            rules: RuleSet::compile(rules),
            bypass: false,
            excluded_content_types: vec!["text/html".to_string()],
        }
    }

    pub fn with_bypass(mut self, bypass: bool) -> Self {
        self.bypass = bypass;
        self
    }

    pub fn with_excluded_content_types(mut self, types: Vec<String>) -> Self {
        self.excluded_content_types = types
            .into_iter()
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        self
    }

    /// True when caching is globally disabled.
    pub fn bypass(&self) -> bool {
        self.bypass
    }

    /// Whether a request URL may be served from or committed to the store.
    pub fn is_eligible(&self, url: &str) -> bool {
        !self.bypass && self.rules.is_eligible(url)
    }

    /// Whether a fetched response for an eligible URL should be committed.
    ///
    /// Only `200 OK` responses whose content type contains none of the
    /// excluded types are stored.
    pub fn should_store(&self, status: StatusCode, content_type: Option<&str>) -> bool {
        if status != StatusCode::OK {
            return false;
        }
        let content_type = content_type.unwrap_or_default().to_ascii_lowercase();
        !self
            .excluded_content_types
            .iter()
            .any(|excluded| content_type.contains(excluded.as_str()))
    }
}
