//! Error types for chartctl
//!
//! All modules use `ChartResult<T>` as their return type.
//!
//! `ChartError` is `Clone` so a single fetch outcome can be handed to every
//! caller waiting on the same archive. IO sources are held behind `Arc`.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for chartctl operations
pub type ChartResult<T> = Result<T, ChartError>;

/// All errors that can occur in chartctl
#[derive(Error, Debug, Clone)]
pub enum ChartError {
    // Repository index errors
    #[error("Chart repository {repository} is unreachable: {reason}")]
    RepositoryUnreachable { repository: String, reason: String },

    #[error("Failed to parse index of chart repository {repository}: {reason}")]
    IndexParse { repository: String, reason: String },

    // Resolution errors
    #[error("No version of chart {name} in {repository} matches {constraint:?}")]
    NoMatchingVersion {
        name: String,
        constraint: String,
        repository: String,
    },

    #[error("Invalid version constraint {constraint:?}: {reason}")]
    InvalidConstraint { constraint: String, reason: String },

    // Archive errors
    #[error("Archive for chart {name}-{version} not found at {url}")]
    ArchiveNotFound {
        name: String,
        version: String,
        url: String,
    },

    #[error("Archive for chart {name}-{version} could not be fetched from {url}: {reason}")]
    ArchiveUnreachable {
        name: String,
        version: String,
        url: String,
        reason: String,
    },

    // Cache errors
    #[error("Failed to write cache entry {path}: {source}")]
    CacheWrite {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("Failed to read cache entry {path}: {source}")]
    CacheRead {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("Operation cancelled by shutdown")]
    Cancelled,

    // Chart content errors
    #[error("Failed to load chart archive: {0}")]
    ChartLoad(String),

    #[error("Invalid chart values: {0}")]
    ValuesParse(String),

    #[error("Invalid {kind} manifest: {reason}")]
    ObjectSource { kind: String, reason: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(Arc<serde_json::Error>),

    #[error("YAML error: {0}")]
    Yaml(Arc<serde_yaml_ng::Error>),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(String),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl From<serde_json::Error> for ChartError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(Arc::new(e))
    }
}

impl From<serde_yaml_ng::Error> for ChartError {
    fn from(e: serde_yaml_ng::Error) -> Self {
        Self::Yaml(Arc::new(e))
    }
}

impl From<toml::de::Error> for ChartError {
    fn from(e: toml::de::Error) -> Self {
        Self::TomlParse(e.to_string())
    }
}

impl From<toml::ser::Error> for ChartError {
    fn from(e: toml::ser::Error) -> Self {
        Self::TomlSerialize(e.to_string())
    }
}

impl ChartError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source: Arc::new(source),
        }
    }

    /// Create a cache write error
    pub fn cache_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CacheWrite {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Create a cache read error
    pub fn cache_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CacheRead {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::RepositoryUnreachable { .. } => {
                Some("Check the repository URL, or enable catalog.offline_fallback to use a cached index")
            }
            Self::NoMatchingVersion { .. } => Some("Run: chartctl versions --chart-repo <url> <name>"),
            Self::InvalidConstraint { .. } => {
                Some("Use an exact version (1.2.3) or a range such as ^1.2, ~1.2.0 or >=1.0 <2.0")
            }
            Self::CacheWrite { .. } | Self::CacheRead { .. } => Some("Run: chartctl cache clear"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ChartError::NoMatchingVersion {
            name: "demo".to_string(),
            constraint: "^3.0.0".to_string(),
            repository: "https://charts.example.com".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("demo"));
        assert!(msg.contains("^3.0.0"));
        assert!(msg.contains("https://charts.example.com"));
    }

    #[test]
    fn error_hint() {
        let err = ChartError::InvalidConstraint {
            constraint: "^^".to_string(),
            reason: "unexpected character".to_string(),
        };
        assert!(err.hint().is_some());
        assert_eq!(ChartError::Cancelled.hint(), None);
    }

    #[test]
    fn error_is_cloneable_with_source() {
        let err = ChartError::io(
            "reading archive",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        let cloned = err.clone();
        assert_eq!(err.to_string(), cloned.to_string());
        assert!(std::error::Error::source(&cloned).is_some());
    }
}
