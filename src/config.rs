//! Configuration Module
//!
//! Loads proxy settings from a YAML file, then applies environment
//! overrides on top.

use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cache::{CacheRule, BYTES_PER_MB};
use crate::error::{ProxyError, Result};

/// Config file used when `CONFIG_PATH` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Cache directory used when none is configured.
pub const DEFAULT_CACHE_DIR: &str = "/cache";

/// Budget used when none is configured (10 GiB).
pub const DEFAULT_MAX_SIZE_MB: u64 = 10 * 1024;

/// Listen port used when none is configured.
pub const DEFAULT_PORT: u16 = 8080;

/// Proxy configuration.
///
/// Every field has a default, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ordered cache rules; first enabled match makes a URL cacheable
    pub cache_rules: Vec<CacheRule>,
    /// Disk store settings
    pub cache: CacheSettings,
    /// Listener settings
    pub server: ServerSettings,
    /// Parent proxy every upstream request goes through
    pub parent_proxy: Option<String>,
    /// `user:password` credential for the parent proxy
    pub parent_proxy_auth: Option<String>,
    /// Disables all cache reads and writes
    pub bypass_cache: bool,
    /// Outbound client settings
    pub upstream: UpstreamSettings,
}

/// Disk store settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Directory holding the artifacts
    pub directory: PathBuf,
    /// Byte budget in megabytes
    pub max_size_mb: u64,
    /// Response content types never committed to the store
    pub excluded_content_types: Vec<String>,
    /// Track files left by a previous run using their modification time
    pub seed_access_times: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_CACHE_DIR),
            max_size_mb: DEFAULT_MAX_SIZE_MB,
            excluded_content_types: vec!["text/html".to_string()],
            seed_access_times: false,
        }
    }
}

/// Listener settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// HTTP listen port
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

/// Outbound client settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamSettings {
    /// Connection establishment timeout in seconds
    pub connect_timeout_secs: u64,
    /// Skip certificate verification toward origins
    pub insecure_tls: bool,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            insecure_tls: false,
        }
    }
}

impl Config {
    /// Loads the file named by `CONFIG_PATH` (default `config.yaml`) and
    /// applies environment overrides.
    ///
    /// # Environment Variables
    /// - `CACHE_DIR` - Cache directory
    /// - `CACHE_SIZE_MB` - Byte budget in megabytes
    /// - `PORT` - HTTP listen port
    /// - `PARENT_PROXY` - Parent proxy URL
    /// - `PARENT_PROXY_AUTH` - Parent proxy `user:password`
    /// - `BYPASS_CACHE` - Disable caching (`true`/`false`)
    pub fn from_env() -> Result<Self> {
        let path = env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load(&path)?;
        config.apply_overrides(|name| env::var(name).ok())?;
        Ok(config)
    }

    /// Reads and parses a YAML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&raw)
    }

    /// Parses YAML config text.
    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
            .map_err(|e| ProxyError::Config(format!("failed to parse config: {}", e)))
    }

    /// Applies overrides from a variable lookup. Unset and empty variables
    /// leave the file value in place.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("CACHE_DIR") {
            self.cache.directory = PathBuf::from(v);
        }
        if let Some(v) = var("CACHE_SIZE_MB") {
            self.cache.max_size_mb = parse_number("CACHE_SIZE_MB", &v)?;
        }
        if let Some(v) = var("PORT") {
            self.server.port = parse_number("PORT", &v)?;
        }
        if let Some(v) = var("PARENT_PROXY") {
            self.parent_proxy = Some(v);
        }
        if let Some(v) = var("PARENT_PROXY_AUTH") {
            self.parent_proxy_auth = Some(v);
        }
        if let Some(v) = var("BYPASS_CACHE") {
            self.bypass_cache = parse_flag("BYPASS_CACHE", &v)?;
        }
        Ok(())
    }

    /// Byte budget for the store.
    pub fn budget_bytes(&self) -> u64 {
        self.cache.max_size_mb.saturating_mul(BYTES_PER_MB)
    }

    /// Parent proxy URL, if one is configured.
    pub fn parent_proxy(&self) -> Option<&str> {
        self.parent_proxy.as_deref().filter(|p| !p.is_empty())
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ProxyError::Config(format!("{} must be a number, got '{}'", name, value)))
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ProxyError::Config(format!(
            "{} must be true or false, got '{}'",
            name, value
        ))),
    }
}
