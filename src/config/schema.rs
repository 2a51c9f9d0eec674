//! Configuration schema for chartctl
//!
//! Configuration is stored at `~/.config/chartctl/config.toml`

use crate::repo::cache::mb_to_bytes;
use crate::repo::{CatalogSettings, FetchSettings, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Index and cache settings
    pub catalog: CatalogConfig,

    /// Network settings
    pub fetch: FetchConfig,

    /// Retry settings for transient network failures
    pub retry: RetryConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Catalog configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Cache directory (empty = platform cache directory)
    pub cache_dir: Option<PathBuf>,

    /// Seconds before a repository index is refreshed
    pub index_ttl_secs: u64,

    /// Use a stale or cached index when a repository is unreachable
    pub offline_fallback: bool,

    /// Maximum total cache size in MB (0 = unbounded)
    pub max_cache_mb: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            index_ttl_secs: 300,
            offline_fallback: false,
            max_cache_mb: 1024,
        }
    }
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Largest accepted index or archive in MB
    pub max_archive_mb: u64,

    /// User-Agent sent to repositories
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        let defaults = FetchSettings::default();
        Self {
            timeout_secs: defaults.timeout.as_secs(),
            max_archive_mb: 64,
            user_agent: defaults.user_agent,
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per fetch, including the first
    pub max_attempts: u32,

    /// Delay after the first failure in milliseconds
    pub initial_backoff_ms: u64,

    /// Upper bound on the delay in milliseconds
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 200,
            max_backoff_ms: 5000,
        }
    }
}

impl Config {
    /// Catalog settings, with `cache_dir` used when none is configured
    pub fn catalog_settings(&self, default_cache_dir: PathBuf) -> CatalogSettings {
        let cache_dir = self
            .catalog
            .cache_dir
            .clone()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or(default_cache_dir);

        CatalogSettings {
            cache_dir,
            index_ttl: Duration::from_secs(self.catalog.index_ttl_secs),
            offline_fallback: self.catalog.offline_fallback,
            max_cache_bytes: (self.catalog.max_cache_mb > 0)
                .then(|| mb_to_bytes(self.catalog.max_cache_mb)),
            retry: RetryPolicy {
                max_attempts: self.retry.max_attempts.max(1),
                initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
                max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
            },
        }
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            timeout: Duration::from_secs(self.fetch.timeout_secs.max(1)),
            max_body_bytes: mb_to_bytes(self.fetch.max_archive_mb),
            user_agent: self.fetch.user_agent.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[catalog]"));
        assert!(toml.contains("[retry]"));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.catalog.index_ttl_secs, 300);
        assert_eq!(config.retry.max_attempts, 4);
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [catalog]
            offline_fallback = true
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.catalog.offline_fallback);
        assert_eq!(config.fetch.timeout_secs, 30); // default preserved
    }

    #[test]
    fn catalog_settings_convert_units() {
        let toml = r#"
            [catalog]
            cache_dir = "/var/cache/charts"
            index_ttl_secs = 60
            max_cache_mb = 0

            [retry]
            max_attempts = 0
            initial_backoff_ms = 50
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        let settings = config.catalog_settings(PathBuf::from("/unused"));

        assert_eq!(settings.cache_dir, PathBuf::from("/var/cache/charts"));
        assert_eq!(settings.index_ttl, Duration::from_secs(60));
        assert_eq!(settings.max_cache_bytes, None);
        assert_eq!(settings.retry.max_attempts, 1);
        assert_eq!(settings.retry.initial_backoff, Duration::from_millis(50));
    }

    #[test]
    fn default_cache_dir_applies() {
        let settings = Config::default().catalog_settings(PathBuf::from("/tmp/charts"));
        assert_eq!(settings.cache_dir, PathBuf::from("/tmp/charts"));
        assert_eq!(settings.max_cache_bytes, Some(1024 * 1024 * 1024));
    }
}
