//! Chart catalog: resolve, download and cache chart archives
//!
//! The catalog is the single entry point callers use. It keeps one index
//! snapshot per repository, refreshes it when stale, serves archives from the
//! [`FileCache`] and downloads each missing archive at most once no matter how
//! many callers ask for it concurrently.
//!
//! ```text
//! resolve_version ──► VersionIndex ──(stale)──► refresh (single-flight per repo)
//! fetch_archive   ──► FileCache ──(miss)──► download (single-flight per CacheKey)
//!                                              └─► RemoteFetcher + RetryPolicy
//!                                              └─► FileCache::put
//! ```

use crate::chart::{self, Chart};
use crate::error::{ChartError, ChartResult};
use crate::repo::cache::{format_bytes, CacheKey, FileCache};
use crate::repo::fetcher::{FetchError, RemoteFetcher};
use crate::repo::index::{
    index_url, normalize_repository_url, IndexEntry, IndexSnapshot, ResolvedVersion, VersionIndex,
};
use crate::repo::retry::RetryPolicy;
use crate::repo::singleflight::SingleFlight;
use crate::repo::version::VersionConstraint;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Archive bytes shared between every caller that asked for them
pub type Archive = Arc<[u8]>;

/// What a caller asks for: a chart, a constraint and a repository
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageIdentity {
    pub repository_url: String,
    pub name: String,
    pub version_constraint: String,
}

impl PackageIdentity {
    pub fn new(
        repository_url: impl AsRef<str>,
        name: impl Into<String>,
        version_constraint: impl Into<String>,
    ) -> Self {
        Self {
            repository_url: normalize_repository_url(repository_url.as_ref()),
            name: name.into(),
            version_constraint: version_constraint.into(),
        }
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let constraint = if self.version_constraint.trim().is_empty() {
            "latest"
        } else {
            self.version_constraint.as_str()
        };
        write!(f, "{} {} from {}", self.name, constraint, self.repository_url)
    }
}

/// Catalog behaviour
#[derive(Debug, Clone)]
pub struct CatalogSettings {
    /// Root of the archive cache
    pub cache_dir: PathBuf,
    /// Age after which a repository index is refreshed
    pub index_ttl: Duration,
    /// Serve a stale or persisted index when a refresh fails in transit
    pub offline_fallback: bool,
    /// Evict oldest archives beyond this total size
    pub max_cache_bytes: Option<u64>,
    pub retry: RetryPolicy,
}

impl CatalogSettings {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            index_ttl: Duration::from_secs(300),
            offline_fallback: false,
            max_cache_bytes: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// Shared, cloneable chart catalog
///
/// Clones share the same index, cache and in-flight tables.
#[derive(Clone)]
pub struct Catalog {
    inner: Arc<Inner>,
}

struct Inner {
    index: VersionIndex,
    cache: FileCache,
    fetcher: Arc<dyn RemoteFetcher>,
    settings: CatalogSettings,
    refreshes: SingleFlight<String, Arc<IndexSnapshot>>,
    downloads: SingleFlight<CacheKey, Archive>,
    shutdown: CancellationToken,
}

impl Catalog {
    /// Create a catalog
    ///
    /// Fetches and backoff sleeps abort with [`ChartError::Cancelled`] once
    /// `shutdown` is cancelled.
    pub fn new(
        settings: CatalogSettings,
        fetcher: Arc<dyn RemoteFetcher>,
        shutdown: CancellationToken,
    ) -> Self {
        debug!(
            "Catalog at {} using {} fetcher",
            settings.cache_dir.display(),
            fetcher.fetcher_name()
        );
        Self {
            inner: Arc::new(Inner {
                index: VersionIndex::new(settings.index_ttl),
                cache: FileCache::new(settings.cache_dir.clone()),
                fetcher,
                settings,
                refreshes: SingleFlight::new(),
                downloads: SingleFlight::new(),
                shutdown,
            }),
        }
    }

    pub fn cache(&self) -> &FileCache {
        &self.inner.cache
    }

    /// Resolve an identity to one concrete version
    ///
    /// Refreshes the repository index first when it is missing or stale.
    pub async fn resolve_version(&self, identity: &PackageIdentity) -> ChartResult<ResolvedVersion> {
        let constraint = VersionConstraint::parse(&identity.version_constraint)?;
        let snapshot = self.index_for(&identity.repository_url).await?;
        snapshot.resolve(&identity.name, &constraint)
    }

    /// Current index of a repository, refreshed if stale
    pub async fn index_for(&self, repository_url: &str) -> ChartResult<Arc<IndexSnapshot>> {
        if let Some(snapshot) = self.inner.index.fresh(repository_url) {
            debug!("Index of {} is fresh", snapshot.repository_url());
            return Ok(snapshot);
        }
        self.refresh_index(repository_url).await
    }

    /// Fetch a repository index now
    ///
    /// Concurrent refreshes of one repository share a single fetch.
    pub async fn refresh_index(&self, repository_url: &str) -> ChartResult<Arc<IndexSnapshot>> {
        let repository_url = normalize_repository_url(repository_url);
        let inner = Arc::clone(&self.inner);
        let key = repository_url.clone();
        self.inner
            .refreshes
            .run(key, async move { inner.refresh(repository_url).await })
            .await
    }

    /// Archive bytes for a resolved version
    ///
    /// Served from the cache when present. Otherwise downloaded once, written
    /// through the cache and handed to every concurrent caller.
    pub async fn fetch_archive(&self, resolved: &ResolvedVersion) -> ChartResult<Archive> {
        let key = CacheKey::for_resolved(resolved);

        match self.inner.cache.get(&key).await {
            Ok(Some(entry)) => {
                debug!("Cache hit for {}", key);
                return Ok(Archive::from(entry.payload));
            }
            Ok(None) => debug!("Cache miss for {}", key),
            Err(e) => warn!("Ignoring unreadable cache entry {}: {}", key, e),
        }

        let inner = Arc::clone(&self.inner);
        let resolved = resolved.clone();
        self.inner
            .downloads
            .run(key, async move { inner.download(resolved).await })
            .await
    }

    /// Resolve and fetch in one step
    pub async fn fetch_chart(
        &self,
        identity: &PackageIdentity,
    ) -> ChartResult<(ResolvedVersion, Archive)> {
        let resolved = self.resolve_version(identity).await?;
        let archive = self.fetch_archive(&resolved).await?;
        Ok((resolved, archive))
    }

    /// Resolve, fetch and unpack a chart
    pub async fn load_chart(&self, identity: &PackageIdentity) -> ChartResult<(ResolvedVersion, Chart)> {
        let (resolved, archive) = self.fetch_chart(identity).await?;
        let chart = tokio::task::spawn_blocking(move || chart::load_archive(&archive))
            .await
            .map_err(|e| ChartError::Internal(format!("chart loading task failed: {}", e)))??;
        Ok((resolved, chart))
    }

    /// Every version of one chart, in index order
    pub async fn versions(&self, repository_url: &str, name: &str) -> ChartResult<Option<IndexEntry>> {
        let snapshot = self.index_for(repository_url).await?;
        Ok(snapshot.entry(name).cloned())
    }

    /// Charts whose name or description contains `query`
    pub async fn search(&self, repository_url: &str, query: &str) -> ChartResult<Vec<IndexEntry>> {
        let snapshot = self.index_for(repository_url).await?;
        Ok(snapshot.search(query).into_iter().cloned().collect())
    }
}

impl Inner {
    async fn refresh(&self, repository_url: String) -> ChartResult<Arc<IndexSnapshot>> {
        let url = index_url(&repository_url);
        let fetched = self
            .settings
            .retry
            .run(&url, &self.shutdown, || self.fetcher.fetch(&url))
            .await;

        match fetched {
            Ok(bytes) => {
                let snapshot = IndexSnapshot::parse(&repository_url, &bytes)?;
                if let Err(e) = self.cache.store_index(&repository_url, &bytes).await {
                    warn!("Failed to persist index of {}: {}", repository_url, e);
                }
                info!(
                    "Loaded index of {} ({} charts, {} versions)",
                    repository_url,
                    snapshot.chart_count(),
                    snapshot.version_count()
                );
                Ok(self.index.replace(snapshot))
            }
            Err(FetchError::Cancelled) => Err(ChartError::Cancelled),
            Err(e) => {
                let unreachable = ChartError::RepositoryUnreachable {
                    repository: repository_url.clone(),
                    reason: e.to_string(),
                };
                if self.settings.offline_fallback {
                    self.fallback_index(&repository_url, unreachable).await
                } else {
                    Err(unreachable)
                }
            }
        }
    }

    /// Last known index when the repository cannot be reached
    async fn fallback_index(
        &self,
        repository_url: &str,
        unreachable: ChartError,
    ) -> ChartResult<Arc<IndexSnapshot>> {
        if let Some(stale) = self.index.current(repository_url) {
            warn!(
                "{}; using index loaded at {}",
                unreachable,
                stale.loaded_at().format("%Y-%m-%d %H:%M:%S UTC")
            );
            return Ok(stale);
        }

        match self.cache.load_index(repository_url).await {
            Ok(Some(bytes)) => {
                let snapshot = IndexSnapshot::parse(repository_url, &bytes)?;
                warn!("{}; using cached index", unreachable);
                Ok(Arc::new(snapshot))
            }
            Ok(None) => Err(unreachable),
            Err(e) => {
                warn!("Cached index of {} is unreadable: {}", repository_url, e);
                Err(unreachable)
            }
        }
    }

    async fn download(&self, resolved: ResolvedVersion) -> ChartResult<Archive> {
        let key = CacheKey::for_resolved(&resolved);

        // A flight that ended between our lookup and this one may have
        // written the entry already.
        if let Ok(Some(entry)) = self.cache.get(&key).await {
            return Ok(Archive::from(entry.payload));
        }

        let url = resolved.download_url.as_str();
        let bytes = self
            .settings
            .retry
            .run(url, &self.shutdown, || self.fetcher.fetch(url))
            .await
            .map_err(|e| archive_error(&resolved, e))?;

        info!(
            "Downloaded {} {} ({})",
            resolved.name,
            resolved.version,
            format_bytes(bytes.len() as u64)
        );
        let archive = Archive::from(bytes);

        match self.cache.put(&key, Arc::clone(&archive)).await {
            Ok(_) => {
                if let Some(max_bytes) = self.settings.max_cache_bytes {
                    match self.cache.evict_to(max_bytes, Some(&key)).await {
                        Ok(report) if report.removed > 0 => info!(
                            "Evicted {} cached archives ({})",
                            report.removed,
                            format_bytes(report.freed_bytes)
                        ),
                        Ok(_) => {}
                        Err(e) => warn!("Cache eviction failed: {}", e),
                    }
                }
            }
            Err(e) => warn!("Failed to cache {}: {}", key, e),
        }

        Ok(archive)
    }
}

fn archive_error(resolved: &ResolvedVersion, error: FetchError) -> ChartError {
    match error {
        FetchError::NotFound => ChartError::ArchiveNotFound {
            name: resolved.name.clone(),
            version: resolved.version.clone(),
            url: resolved.download_url.clone(),
        },
        FetchError::Cancelled => ChartError::Cancelled,
        other => ChartError::ArchiveUnreachable {
            name: resolved.name.clone(),
            version: resolved.version.clone(),
            url: resolved.download_url.clone(),
            reason: other.to_string(),
        },
    }
}
