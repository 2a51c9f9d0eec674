//! Remote fetching of index documents and chart archives
//!
//! [`RemoteFetcher`] is the seam between the catalog and the network. A
//! fetcher performs exactly one GET per call and never retries; retry policy
//! belongs to the catalog.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::io::ErrorKind;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Failure of a single fetch
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("not found")]
    NotFound,

    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("timed out")]
    Timeout,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("cancelled")]
    Cancelled,
}

impl FetchError {
    /// Whether a later attempt may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Timeout)
    }
}

/// Abstract network retrieval
///
/// Implemented by [`HttpFetcher`] for real repositories and by
/// [`MemoryFetcher`] for tests and embedding.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Retrieve the body at `url`
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;

    /// Human-readable fetcher name for logs
    fn fetcher_name(&self) -> &'static str;
}

/// Settings for [`HttpFetcher`]
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Overall deadline of one request, body included
    pub timeout: Duration,
    /// Largest accepted response body
    pub max_body_bytes: u64,
    /// User-Agent header value
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_body_bytes: 64 * 1024 * 1024,
            user_agent: concat!("chartctl/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// HTTP(S) fetcher backed by `ureq`, with `file://` support
///
/// `ureq` is blocking, so requests run on tokio's blocking pool. A blocking
/// request cannot be interrupted: when the caller is cancelled it returns at
/// once, but the request itself keeps its pool thread until it completes or
/// hits [`FetchSettings::timeout`], and its result is discarded.
pub struct HttpFetcher {
    agent: ureq::Agent,
    settings: FetchSettings,
}

impl HttpFetcher {
    /// Create a fetcher with the given settings
    pub fn new(settings: FetchSettings) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(settings.timeout))
            .http_status_as_error(false)
            .build();

        Self {
            agent: ureq::Agent::new_with_config(config),
            settings,
        }
    }

    fn get_blocking(
        agent: &ureq::Agent,
        url: &str,
        user_agent: &str,
        limit: u64,
    ) -> Result<Vec<u8>, FetchError> {
        let mut response = agent
            .get(url)
            .header("User-Agent", user_agent)
            .call()
            .map_err(classify_ureq_error)?;

        let status = response.status().as_u16();
        match status {
            200..=299 => {}
            404 | 410 => return Err(FetchError::NotFound),
            500..=599 => {
                return Err(FetchError::Unreachable(format!(
                    "server returned HTTP status {}",
                    status
                )))
            }
            _ => {
                return Err(FetchError::Protocol(format!(
                    "unexpected HTTP status {}",
                    status
                )))
            }
        }

        response
            .body_mut()
            .with_config()
            .limit(limit)
            .read_to_vec()
            .map_err(classify_ureq_error)
    }

    async fn fetch_file(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => FetchError::NotFound,
            _ => FetchError::Unreachable(format!("reading {}: {}", path, e)),
        })?;

        if bytes.len() as u64 > self.settings.max_body_bytes {
            return Err(FetchError::Protocol(format!(
                "{} exceeds the {} byte limit",
                path, self.settings.max_body_bytes
            )));
        }
        Ok(bytes)
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        if let Some(path) = url.strip_prefix("file://") {
            debug!("Reading {}", path);
            return self.fetch_file(path).await;
        }

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(FetchError::Protocol(format!(
                "unsupported URL scheme in {}",
                url
            )));
        }

        debug!("GET {}", url);
        let agent = self.agent.clone();
        let url = url.to_string();
        let user_agent = self.settings.user_agent.clone();
        let limit = self.settings.max_body_bytes;

        tokio::task::spawn_blocking(move || Self::get_blocking(&agent, &url, &user_agent, limit))
            .await
            .map_err(|e| FetchError::Protocol(format!("fetch task failed: {}", e)))?
    }

    fn fetcher_name(&self) -> &'static str {
        "http"
    }
}

fn classify_ureq_error(err: ureq::Error) -> FetchError {
    let message = err.to_string();
    match err {
        ureq::Error::Timeout(_) => FetchError::Timeout,
        ureq::Error::Io(ref e) if e.kind() == ErrorKind::TimedOut => FetchError::Timeout,
        ureq::Error::HostNotFound | ureq::Error::ConnectionFailed | ureq::Error::Io(_) => {
            FetchError::Unreachable(message)
        }
        ureq::Error::StatusCode(404 | 410) => FetchError::NotFound,
        _ => FetchError::Protocol(message),
    }
}

/// In-memory fetcher with scripted responses
///
/// Each URL holds a queue of outcomes. Every fetch consumes the front of the
/// queue except the last outcome, which repeats forever. Unknown URLs are
/// `NotFound`. Calls are counted per URL.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    responses: Mutex<HashMap<String, VecDeque<Result<Vec<u8>, FetchError>>>>,
    calls: Mutex<HashMap<String, usize>>,
    delay: Option<Duration>,
}

impl MemoryFetcher {
    /// Create an empty fetcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every response, to make concurrent calls overlap
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a successful response for `url`
    pub fn insert(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.push(url, Ok(body.into()));
    }

    /// Queue a failure for `url`
    pub fn push_failure(&self, url: &str, error: FetchError) {
        self.push(url, Err(error));
    }

    /// Number of fetches of `url` so far
    pub fn calls(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    /// Number of fetches across all URLs
    pub fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .sum()
    }

    fn push(&self, url: &str, outcome: Result<Vec<u8>, FetchError>) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(url.to_string())
            .or_default()
            .push_back(outcome);
    }

    fn next_outcome(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut responses = self.responses.lock().unwrap_or_else(PoisonError::into_inner);
        match responses.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Err(FetchError::NotFound)),
            Some(queue) => queue.front().cloned().unwrap_or(Err(FetchError::NotFound)),
            None => Err(FetchError::NotFound),
        }
    }
}

#[async_trait]
impl RemoteFetcher for MemoryFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(url.to_string())
            .or_insert(0) += 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.next_outcome(url)
    }

    fn fetcher_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn transient_classification() {
        assert!(FetchError::Timeout.is_transient());
        assert!(FetchError::Unreachable("reset".to_string()).is_transient());
        assert!(!FetchError::NotFound.is_transient());
        assert!(!FetchError::Protocol("bad".to_string()).is_transient());
        assert!(!FetchError::Cancelled.is_transient());
    }

    #[tokio::test]
    async fn memory_fetcher_replays_script_then_sticks() {
        let fetcher = MemoryFetcher::new();
        let url = "https://charts.example.com/index.yaml";
        fetcher.push_failure(url, FetchError::Timeout);
        fetcher.insert(url, "ok");

        assert_eq!(fetcher.fetch(url).await, Err(FetchError::Timeout));
        assert_eq!(fetcher.fetch(url).await, Ok(b"ok".to_vec()));
        assert_eq!(fetcher.fetch(url).await, Ok(b"ok".to_vec()));
        assert_eq!(fetcher.calls(url), 3);
    }

    #[tokio::test]
    async fn memory_fetcher_unknown_url_is_not_found() {
        let fetcher = MemoryFetcher::new();
        assert_eq!(
            fetcher.fetch("https://nowhere.example.com/x").await,
            Err(FetchError::NotFound)
        );
        assert_eq!(fetcher.total_calls(), 1);
    }

    #[tokio::test]
    async fn http_fetcher_reads_file_urls() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.yaml");
        std::fs::write(&path, "apiVersion: v1\n").unwrap();

        let fetcher = HttpFetcher::new(FetchSettings::default());
        let url = format!("file://{}", path.display());
        assert_eq!(fetcher.fetch(&url).await.unwrap(), b"apiVersion: v1\n");

        let missing = format!("file://{}", dir.path().join("missing.tgz").display());
        assert_eq!(fetcher.fetch(&missing).await, Err(FetchError::NotFound));
    }

    #[tokio::test]
    async fn http_fetcher_enforces_size_limit_on_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.tgz");
        std::fs::write(&path, vec![0u8; 32]).unwrap();

        let fetcher = HttpFetcher::new(FetchSettings {
            max_body_bytes: 16,
            ..FetchSettings::default()
        });
        let result = fetcher.fetch(&format!("file://{}", path.display())).await;
        assert!(matches!(result, Err(FetchError::Protocol(_))));
    }

    #[tokio::test]
    async fn http_fetcher_rejects_unknown_scheme() {
        let fetcher = HttpFetcher::new(FetchSettings::default());
        let result = fetcher.fetch("ftp://charts.example.com/index.yaml").await;
        assert!(matches!(result, Err(FetchError::Protocol(_))));
    }
}
