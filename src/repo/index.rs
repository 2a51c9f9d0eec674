//! Repository index parsing and per-repository snapshots
//!
//! A chart repository publishes `index.yaml`, listing every chart with its
//! versions and download URLs. The document is parsed into an immutable
//! [`IndexSnapshot`]; [`VersionIndex`] holds the current snapshot of each
//! repository and swaps it wholesale on refresh, so readers never observe a
//! partially updated index.

use crate::error::{ChartError, ChartResult};
use crate::repo::version::{parse_version, select_highest, VersionConstraint};
use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;

/// File name of the index document inside a repository
pub const INDEX_FILE: &str = "index.yaml";

/// Raw index document (index.yaml)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDocument {
    /// API version
    #[serde(default)]
    pub api_version: String,

    /// When the index was generated
    #[serde(default)]
    pub generated: Option<String>,

    /// All chart versions, keyed by chart name, in published order
    #[serde(default)]
    pub entries: HashMap<String, Vec<IndexRecord>>,
}

/// One published chart version as it appears in index.yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRecord {
    /// Chart name
    #[serde(default)]
    pub name: String,

    /// Version string
    pub version: String,

    /// Download URLs for the archive (absolute or relative to the repository)
    #[serde(default)]
    pub urls: Vec<String>,

    /// Archive digest as published by the repository
    #[serde(default)]
    pub digest: Option<String>,

    /// Version of the packaged application
    #[serde(default)]
    pub app_version: Option<String>,

    /// Description
    #[serde(default)]
    pub description: Option<String>,

    /// When this version was published
    #[serde(default)]
    pub created: Option<String>,

    /// Whether this chart is deprecated
    #[serde(default)]
    pub deprecated: bool,
}

/// A concrete, resolved chart version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ResolvedVersion {
    /// Repository the version was resolved against
    pub repository_url: String,
    /// Chart name
    pub name: String,
    /// Resolved semantic version
    pub version: String,
    /// Absolute download URL of the archive
    pub download_url: String,
    /// Archive digest as published by the repository
    pub digest: Option<String>,
}

/// One downloadable version of a chart
#[derive(Debug, Clone)]
pub struct ChartVersion {
    /// Parsed version
    pub version: Version,
    /// Absolute download URL
    pub download_url: String,
    /// Published digest
    pub digest: Option<String>,
    /// Version of the packaged application
    pub app_version: Option<String>,
    /// Description
    pub description: Option<String>,
    /// Deprecation flag
    pub deprecated: bool,
}

/// All versions of one chart, in index order
#[derive(Debug, Clone)]
pub struct IndexEntry {
    /// Chart name
    pub name: String,
    /// Versions and download locations, in the order the index lists them
    pub versions: Vec<ChartVersion>,
}

impl IndexEntry {
    /// Highest release version, if any
    pub fn latest(&self) -> Option<&ChartVersion> {
        let latest = VersionConstraint::parse("latest").ok()?;
        select_highest(&self.versions, |v| &v.version, &latest)
    }
}

/// Immutable view of one repository's index
#[derive(Debug)]
pub struct IndexSnapshot {
    repository_url: String,
    entries: HashMap<String, IndexEntry>,
    fetched_at: Instant,
    loaded_at: DateTime<Utc>,
}

impl IndexSnapshot {
    /// Parse an index document fetched from `repository_url`
    pub fn parse(repository_url: &str, bytes: &[u8]) -> ChartResult<Self> {
        let parse_error = |reason: String| ChartError::IndexParse {
            repository: repository_url.to_string(),
            reason,
        };

        let document: IndexDocument =
            serde_yaml_ng::from_slice(bytes).map_err(|e| parse_error(e.to_string()))?;

        if document.api_version.trim().is_empty() {
            return Err(parse_error("no API version specified".to_string()));
        }

        Ok(Self::from_document(repository_url, document))
    }

    /// Build a snapshot from an already parsed document
    ///
    /// Versions that are not valid semver, or that have no download URL,
    /// are skipped.
    pub fn from_document(repository_url: &str, document: IndexDocument) -> Self {
        let repository_url = normalize_repository_url(repository_url);
        let mut entries = HashMap::with_capacity(document.entries.len());

        for (name, records) in document.entries {
            let mut versions = Vec::with_capacity(records.len());
            for record in records {
                let Some(version) = parse_version(&record.version) else {
                    debug!("Skipping {} {}: not a semantic version", name, record.version);
                    continue;
                };
                let Some(url) = record.urls.first() else {
                    debug!("Skipping {} {}: no download URL", name, record.version);
                    continue;
                };
                versions.push(ChartVersion {
                    version,
                    download_url: absolute_url(&repository_url, url),
                    digest: record.digest,
                    app_version: record.app_version,
                    description: record.description,
                    deprecated: record.deprecated,
                });
            }
            entries.insert(name.clone(), IndexEntry { name, versions });
        }

        Self {
            repository_url,
            entries,
            fetched_at: Instant::now(),
            loaded_at: Utc::now(),
        }
    }

    /// Resolve a constraint to one concrete version of `name`
    ///
    /// Picks the highest version satisfying the constraint. Among versions
    /// of equal precedence the one listed first in the index wins.
    pub fn resolve(&self, name: &str, constraint: &VersionConstraint) -> ChartResult<ResolvedVersion> {
        let no_match = || ChartError::NoMatchingVersion {
            name: name.to_string(),
            constraint: constraint.to_string(),
            repository: self.repository_url.clone(),
        };

        let entry = self.entries.get(name).ok_or_else(no_match)?;
        let chosen =
            select_highest(&entry.versions, |v| &v.version, constraint).ok_or_else(no_match)?;

        debug!(
            "Resolved {} {} to {} in {}",
            name, constraint, chosen.version, self.repository_url
        );

        Ok(ResolvedVersion {
            repository_url: self.repository_url.clone(),
            name: name.to_string(),
            version: chosen.version.to_string(),
            download_url: chosen.download_url.clone(),
            digest: chosen.digest.clone(),
        })
    }

    /// Get one chart's entry
    pub fn entry(&self, name: &str) -> Option<&IndexEntry> {
        self.entries.get(name)
    }

    /// Search chart names and descriptions (case-insensitive)
    ///
    /// An empty query lists every chart. Results are sorted by name.
    pub fn search(&self, query: &str) -> Vec<&IndexEntry> {
        let query_lower = query.to_lowercase();
        let mut results: Vec<&IndexEntry> = self
            .entries
            .values()
            .filter(|entry| {
                if query_lower.is_empty() || entry.name.to_lowercase().contains(&query_lower) {
                    return true;
                }
                entry
                    .latest()
                    .and_then(|v| v.description.as_deref())
                    .is_some_and(|d| d.to_lowercase().contains(&query_lower))
            })
            .collect();
        results.sort_by(|a, b| a.name.cmp(&b.name));
        results
    }

    /// Repository this snapshot was loaded from
    pub fn repository_url(&self) -> &str {
        &self.repository_url
    }

    /// Number of charts in the index
    pub fn chart_count(&self) -> usize {
        self.entries.len()
    }

    /// Number of versions across all charts
    pub fn version_count(&self) -> usize {
        self.entries.values().map(|e| e.versions.len()).sum()
    }

    /// When the snapshot was built
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Whether the snapshot is older than `ttl`
    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() > ttl
    }
}

/// Current index snapshot of every known repository
#[derive(Debug)]
pub struct VersionIndex {
    snapshots: RwLock<HashMap<String, Arc<IndexSnapshot>>>,
    ttl: Duration,
}

impl VersionIndex {
    /// Create an empty index with the given staleness threshold
    pub fn new(ttl: Duration) -> Self {
        Self {
            snapshots: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Current snapshot for a repository, fresh or not
    pub fn current(&self, repository_url: &str) -> Option<Arc<IndexSnapshot>> {
        let key = normalize_repository_url(repository_url);
        self.snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    /// Current snapshot for a repository if it is younger than the TTL
    pub fn fresh(&self, repository_url: &str) -> Option<Arc<IndexSnapshot>> {
        self.current(repository_url)
            .filter(|snapshot| !snapshot.is_stale(self.ttl))
    }

    /// Make `snapshot` the visible index of its repository
    pub fn replace(&self, snapshot: IndexSnapshot) -> Arc<IndexSnapshot> {
        let snapshot = Arc::new(snapshot);
        self.snapshots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(snapshot.repository_url.clone(), Arc::clone(&snapshot));
        snapshot
    }
}

/// Canonical form of a repository URL (no trailing slash)
pub fn normalize_repository_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// URL of a repository's index document
pub fn index_url(repository_url: &str) -> String {
    format!("{}/{}", normalize_repository_url(repository_url), INDEX_FILE)
}

/// Resolve a possibly relative download URL against the repository
fn absolute_url(repository_url: &str, url: &str) -> String {
    if url.contains("://") {
        url.to_string()
    } else {
        format!("{}/{}", repository_url, url.trim_start_matches("./").trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPO: &str = "https://charts.example.com/stable/";

    fn sample_index_yaml() -> &'static str {
        r#"
apiVersion: v1
generated: "2025-12-04T00:00:00Z"
entries:
  demo:
    - name: demo
      version: 1.0.0
      description: Demo chart
      urls: [demo-1.0.0.tgz]
    - name: demo
      version: 1.2.0
      description: Demo chart
      digest: sha256:abc
      urls: [https://mirror.example.com/demo-1.2.0.tgz]
    - name: demo
      version: 2.0.0-rc.1
      description: Demo chart
      urls: [demo-2.0.0-rc.1.tgz]
  nginx:
    - name: nginx
      version: 0.3.0
      description: Web server
      urls: [charts/nginx-0.3.0.tgz]
    - name: nginx
      version: banana
      urls: [nginx-banana.tgz]
    - name: nginx
      version: 0.4.0
      urls: []
"#
    }

    fn snapshot() -> IndexSnapshot {
        IndexSnapshot::parse(REPO, sample_index_yaml().as_bytes()).unwrap()
    }

    fn resolve(name: &str, constraint: &str) -> ChartResult<ResolvedVersion> {
        snapshot().resolve(name, &VersionConstraint::parse(constraint).unwrap())
    }

    #[test]
    fn parse_skips_invalid_versions() {
        let snapshot = snapshot();
        assert_eq!(snapshot.chart_count(), 2);
        assert_eq!(snapshot.version_count(), 4);
        assert_eq!(snapshot.repository_url(), "https://charts.example.com/stable");
    }

    #[test]
    fn caret_range_picks_highest_release() {
        let resolved = resolve("demo", "^1.0.0").unwrap();
        assert_eq!(resolved.version, "1.2.0");
        assert_eq!(resolved.download_url, "https://mirror.example.com/demo-1.2.0.tgz");
        assert_eq!(resolved.digest.as_deref(), Some("sha256:abc"));
    }

    #[test]
    fn unsatisfiable_constraint_is_no_matching_version() {
        let err = resolve("demo", "^3.0.0").unwrap_err();
        assert!(matches!(err, ChartError::NoMatchingVersion { .. }));
    }

    #[test]
    fn unknown_chart_is_no_matching_version() {
        let err = resolve("missing", "1.0.0").unwrap_err();
        assert!(matches!(err, ChartError::NoMatchingVersion { ref name, .. } if name == "missing"));
    }

    #[test]
    fn exact_prerelease_resolves() {
        let resolved = resolve("demo", "2.0.0-rc.1").unwrap();
        assert_eq!(resolved.version, "2.0.0-rc.1");
        assert_eq!(
            resolved.download_url,
            "https://charts.example.com/stable/demo-2.0.0-rc.1.tgz"
        );
    }

    #[test]
    fn relative_urls_are_resolved_against_repository() {
        let resolved = resolve("nginx", "latest").unwrap();
        assert_eq!(
            resolved.download_url,
            "https://charts.example.com/stable/charts/nginx-0.3.0.tgz"
        );
        assert_eq!(resolved.repository_url, "https://charts.example.com/stable");
    }

    #[test]
    fn equal_versions_first_in_index_wins() {
        let yaml = r#"
apiVersion: v1
entries:
  dup:
    - version: 1.0.0+build.1
      urls: [https://a.example.com/dup.tgz]
    - version: 1.0.0+build.2
      urls: [https://b.example.com/dup.tgz]
"#;
        let snapshot = IndexSnapshot::parse(REPO, yaml.as_bytes()).unwrap();
        let resolved = snapshot
            .resolve("dup", &VersionConstraint::parse("^1").unwrap())
            .unwrap();
        assert_eq!(resolved.download_url, "https://a.example.com/dup.tgz");
    }

    #[test]
    fn malformed_document_is_parse_error() {
        let err = IndexSnapshot::parse(REPO, b"<html>not an index</html>").unwrap_err();
        assert!(matches!(err, ChartError::IndexParse { .. }));

        let err = IndexSnapshot::parse(REPO, b"entries: {}").unwrap_err();
        assert!(err.to_string().contains("no API version"));
    }

    #[test]
    fn search_matches_name_and_description() {
        let snapshot = snapshot();
        let names: Vec<_> = snapshot.search("web").iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["nginx"]);

        let all: Vec<_> = snapshot.search("").iter().map(|e| e.name.as_str()).collect();
        assert_eq!(all, vec!["demo", "nginx"]);
    }

    #[test]
    fn version_index_replaces_whole_snapshot() {
        let index = VersionIndex::new(Duration::from_secs(60));
        assert!(index.current(REPO).is_none());

        let first = index.replace(snapshot());
        assert!(Arc::ptr_eq(&first, &index.fresh(REPO).unwrap()));

        let yaml = "apiVersion: v1\nentries:\n  other:\n    - version: 0.1.0\n      urls: [other.tgz]\n";
        index.replace(IndexSnapshot::parse(REPO, yaml.as_bytes()).unwrap());

        let current = index.current("https://charts.example.com/stable").unwrap();
        assert!(current.entry("demo").is_none());
        assert!(current.entry("other").is_some());
        // Readers holding the old snapshot still see it intact
        assert!(first.entry("demo").is_some());
    }

    #[test]
    fn stale_snapshot_is_not_fresh() {
        let index = VersionIndex::new(Duration::ZERO);
        index.replace(snapshot());
        std::thread::sleep(Duration::from_millis(5));
        assert!(index.fresh(REPO).is_none());
        assert!(index.current(REPO).is_some());
    }

    #[test]
    fn index_url_joins_without_double_slash() {
        assert_eq!(index_url(REPO), "https://charts.example.com/stable/index.yaml");
    }
}
