//! On-disk chart archive cache
//!
//! Archives are stored per repository and per package:
//!
//! ```text
//! <root>/<repository namespace>/repository.url
//! <root>/<repository namespace>/index.yaml
//! <root>/<repository namespace>/charts/<name>/<version>.tgz
//! ```
//!
//! Writes go to a hidden temporary file in the destination directory which is
//! synced and then renamed into place, so a reader sees either the complete
//! archive or nothing.

use crate::error::{ChartError, ChartResult};
use crate::repo::index::ResolvedVersion;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, warn};

const ARCHIVE_SUFFIX: &str = ".tgz";
const TEMP_SUFFIX: &str = ".tmp";
const CHARTS_DIR: &str = "charts";
const REPOSITORY_URL_FILE: &str = "repository.url";
const INDEX_FILE: &str = "index.yaml";

/// Format bytes as human-readable size (e.g., "1.5 MB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Convert MB to bytes, saturating at `u64::MAX`
pub fn mb_to_bytes(mb: u64) -> u64 {
    mb.saturating_mul(1024 * 1024)
}

/// Identity of one cached archive
///
/// Always derived from a concrete version, never from a constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub repository_url: String,
    pub name: String,
    pub version: String,
}

impl CacheKey {
    pub fn new(
        repository_url: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            repository_url: repository_url.into(),
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn for_resolved(resolved: &ResolvedVersion) -> Self {
        Self::new(
            resolved.repository_url.clone(),
            resolved.name.clone(),
            resolved.version.to_string(),
        )
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.repository_url, self.name, self.version)
    }
}

/// A complete cached archive
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub payload: Vec<u8>,
    pub last_used: DateTime<Utc>,
}

/// Listing record for one cached archive
#[derive(Debug, Clone, Serialize)]
pub struct CacheRecord {
    pub repository_url: String,
    pub name: String,
    pub version: String,
    pub size_bytes: u64,
    /// Last write or cache hit
    pub last_used: DateTime<Utc>,
    #[serde(skip)]
    pub path: PathBuf,
}

impl CacheRecord {
    pub fn key(&self) -> CacheKey {
        CacheKey::new(&self.repository_url, &self.name, &self.version)
    }
}

/// Result of an eviction pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    pub removed: usize,
    pub freed_bytes: u64,
}

/// Directory name for a repository: the first 16 hex digits of its SHA-256
pub fn repository_namespace(repository_url: &str) -> String {
    let digest = Sha256::digest(repository_url.as_bytes());
    hex::encode(&digest[..8])
}

/// Base names Windows reserves for devices, in any letter case
const RESERVED_BASE_NAMES: &[&str] = &[
    "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7", "com8",
    "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

/// Make a name or version safe to use as a single path segment
///
/// `[a-z0-9._-]` is kept and every other byte is percent-encoded, uppercase
/// letters included, so keys differing only in case never share a file on a
/// case-insensitive filesystem. A leading or trailing `.` is encoded so no
/// segment is hidden, relative or silently trimmed, and the first letter of a
/// reserved device name is encoded. The mapping is injective; the empty
/// string maps to a lone `%`.
pub fn escape_segment(raw: &str) -> String {
    if raw.is_empty() {
        return "%".to_string();
    }

    let base = raw.split('.').next().unwrap_or_default();
    let reserved = RESERVED_BASE_NAMES.contains(&base);
    let last = raw.len() - 1;

    let mut out = String::with_capacity(raw.len());
    for (i, byte) in raw.bytes().enumerate() {
        let keep = byte.is_ascii_lowercase()
            || byte.is_ascii_digit()
            || matches!(byte, b'-' | b'_' | b'.');
        let edge_dot = byte == b'.' && (i == 0 || i == last);
        if keep && !edge_dot && !(i == 0 && reserved) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

/// Inverse of [`escape_segment`]
pub fn unescape_segment(escaped: &str) -> Option<String> {
    if escaped == "%" {
        return Some(String::new());
    }

    let bytes = escaped.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = escaped.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

fn is_temp_file(file_name: &str) -> bool {
    file_name.starts_with('.') && file_name.ends_with(TEMP_SUFFIX)
}

/// Persistent, content-stable archive cache
#[derive(Debug, Clone)]
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn repository_dir(&self, repository_url: &str) -> PathBuf {
        self.root.join(repository_namespace(repository_url))
    }

    /// Final path of the archive for `key`
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.repository_dir(&key.repository_url)
            .join(CHARTS_DIR)
            .join(escape_segment(&key.name))
            .join(format!("{}{}", escape_segment(&key.version), ARCHIVE_SUFFIX))
    }

    /// Look up a complete archive. `None` is a cache miss.
    ///
    /// A hit marks the archive as most recently used.
    pub async fn get(&self, key: &CacheKey) -> ChartResult<Option<CacheEntry>> {
        let path = self.entry_path(key);
        let payload = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ChartError::cache_read(path, e)),
        };

        let now = SystemTime::now();
        if let Err(e) = blocking(move || touch(&path, now)).await {
            debug!("Could not record use of {}: {}", key, e);
        }

        Ok(Some(CacheEntry {
            key: key.clone(),
            payload,
            last_used: DateTime::<Utc>::from(now),
        }))
    }

    pub async fn contains(&self, key: &CacheKey) -> bool {
        tokio::fs::try_exists(self.entry_path(key))
            .await
            .unwrap_or(false)
    }

    /// Store an archive atomically
    ///
    /// Returns `false` when the identical archive was already present.
    pub async fn put(&self, key: &CacheKey, payload: impl Into<Arc<[u8]>>) -> ChartResult<bool> {
        let payload = payload.into();
        let repository_dir = self.repository_dir(&key.repository_url);
        let path = self.entry_path(key);
        let key = key.clone();

        blocking(move || {
            match fs::read(&path) {
                Ok(existing) if existing[..] == payload[..] => {
                    debug!("Cache entry {} already present", key);
                    return Ok(false);
                }
                Ok(_) => warn!("Replacing cache entry {} with different content", key),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(ChartError::cache_read(&path, e)),
            }

            write_repository_marker(&repository_dir, &key.repository_url)?;
            write_atomic(&path, &payload)?;
            debug!("Cached {} ({})", key, format_bytes(payload.len() as u64));
            Ok(true)
        })
        .await
    }

    /// Persist the raw index document of a repository
    pub async fn store_index(&self, repository_url: &str, document: &[u8]) -> ChartResult<()> {
        let repository_dir = self.repository_dir(repository_url);
        let repository_url = repository_url.to_string();
        let document = document.to_vec();

        blocking(move || {
            write_repository_marker(&repository_dir, &repository_url)?;
            write_atomic(&repository_dir.join(INDEX_FILE), &document)
        })
        .await
    }

    /// Read the last persisted index document of a repository
    pub async fn load_index(&self, repository_url: &str) -> ChartResult<Option<Vec<u8>>> {
        let path = self.repository_dir(repository_url).join(INDEX_FILE);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ChartError::cache_read(path, e)),
        }
    }

    /// List every complete archive, least recently used first
    pub async fn entries(&self) -> ChartResult<Vec<CacheRecord>> {
        let root = self.root.clone();
        blocking(move || list_entries(&root)).await
    }

    pub async fn total_size(&self) -> ChartResult<u64> {
        Ok(self.entries().await?.iter().map(|r| r.size_bytes).sum())
    }

    /// Remove the least recently used archives until the cache is at most
    /// `max_bytes`
    ///
    /// `protect` is never removed, even if it alone exceeds the limit.
    pub async fn evict_to(
        &self,
        max_bytes: u64,
        protect: Option<&CacheKey>,
    ) -> ChartResult<EvictionReport> {
        let records = self.entries().await?;
        let mut total: u64 = records.iter().map(|r| r.size_bytes).sum();
        let mut report = EvictionReport::default();

        for record in records {
            if total <= max_bytes {
                break;
            }
            if protect.is_some_and(|key| *key == record.key()) {
                continue;
            }

            match tokio::fs::remove_file(&record.path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(ChartError::io(format!("evicting {}", record.key()), e)),
            }
            if let Some(parent) = record.path.parent() {
                // Fails while other versions remain
                let _ = tokio::fs::remove_dir(parent).await;
            }

            debug!("Evicted {}", record.key());
            total = total.saturating_sub(record.size_bytes);
            report.removed += 1;
            report.freed_bytes += record.size_bytes;
        }

        Ok(report)
    }

    /// Remove every repository directory, returning the number of archives
    /// removed
    ///
    /// Only directories carrying a repository marker belong to the cache;
    /// anything else under the root is left alone.
    pub async fn clear(&self) -> ChartResult<usize> {
        let removed = self.entries().await?.len();
        let root = self.root.clone();

        blocking(move || {
            for repository_dir in subdirectories(&root)? {
                if !repository_dir.join(REPOSITORY_URL_FILE).is_file() {
                    debug!("Leaving {} in place", repository_dir.display());
                    continue;
                }
                match fs::remove_dir_all(&repository_dir) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => {
                        return Err(ChartError::io(
                            format!("clearing {}", repository_dir.display()),
                            e,
                        ))
                    }
                }
            }
            Ok(removed)
        })
        .await
    }

    /// Remove one repository's archives and index
    pub async fn clear_repository(&self, repository_url: &str) -> ChartResult<usize> {
        let removed = self
            .entries()
            .await?
            .iter()
            .filter(|r| r.repository_url == repository_url)
            .count();

        let dir = self.repository_dir(repository_url);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(removed),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(ChartError::io(
                format!("clearing cache for {}", repository_url),
                e,
            )),
        }
    }

    /// Delete temporary files left behind by interrupted writes
    pub async fn remove_stale_temp_files(&self) -> ChartResult<usize> {
        let root = self.root.clone();
        blocking(move || {
            let mut removed = 0;
            for dir in walk_dirs(&root)? {
                for file in read_dir_entries(&dir)? {
                    let name = file.file_name().to_string_lossy().into_owned();
                    if is_temp_file(&name) && fs::remove_file(file.path()).is_ok() {
                        debug!("Removed stale temp file {}", file.path().display());
                        removed += 1;
                    }
                }
            }
            Ok(removed)
        })
        .await
    }
}

async fn blocking<T, F>(work: F) -> ChartResult<T>
where
    F: FnOnce() -> ChartResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ChartError::Internal(format!("cache task failed: {}", e)))?
}

fn write_atomic(path: &Path, payload: &[u8]) -> ChartResult<()> {
    let dir = path
        .parent()
        .ok_or_else(|| ChartError::Internal(format!("{} has no parent", path.display())))?;
    fs::create_dir_all(dir).map_err(|e| ChartError::cache_write(dir, e))?;

    let mut temp = tempfile::Builder::new()
        .prefix(".")
        .suffix(TEMP_SUFFIX)
        .tempfile_in(dir)
        .map_err(|e| ChartError::cache_write(path, e))?;
    temp.write_all(payload)
        .map_err(|e| ChartError::cache_write(path, e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| ChartError::cache_write(path, e))?;
    temp.persist(path)
        .map_err(|e| ChartError::cache_write(path, e.error))?;

    // Make the rename itself durable
    if let Ok(handle) = fs::File::open(dir) {
        let _ = handle.sync_all();
    }
    Ok(())
}

/// Set the modification time, which the cache uses as last-use time
fn touch(path: &Path, when: SystemTime) -> ChartResult<()> {
    fs::File::options()
        .append(true)
        .open(path)
        .and_then(|file| file.set_modified(when))
        .map_err(|e| ChartError::cache_write(path, e))
}

fn write_repository_marker(repository_dir: &Path, repository_url: &str) -> ChartResult<()> {
    let marker = repository_dir.join(REPOSITORY_URL_FILE);
    if marker.exists() {
        return Ok(());
    }
    write_atomic(&marker, repository_url.as_bytes())
}

fn read_dir_entries(dir: &Path) -> ChartResult<Vec<fs::DirEntry>> {
    match fs::read_dir(dir) {
        Ok(iter) => iter
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ChartError::cache_read(dir, e)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(ChartError::cache_read(dir, e)),
    }
}

fn subdirectories(dir: &Path) -> ChartResult<Vec<PathBuf>> {
    Ok(read_dir_entries(dir)?
        .into_iter()
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| e.path())
        .collect())
}

/// Every directory that may hold cache files: repositories and chart names
fn walk_dirs(root: &Path) -> ChartResult<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for repository_dir in subdirectories(root)? {
        for name_dir in subdirectories(&repository_dir.join(CHARTS_DIR))? {
            dirs.push(name_dir);
        }
        dirs.push(repository_dir);
    }
    Ok(dirs)
}

fn list_entries(root: &Path) -> ChartResult<Vec<CacheRecord>> {
    let mut records = Vec::new();

    for repository_dir in subdirectories(root)? {
        let repository_url = match fs::read_to_string(repository_dir.join(REPOSITORY_URL_FILE)) {
            Ok(url) => url.trim().to_string(),
            Err(_) => {
                debug!("Skipping {} without repository marker", repository_dir.display());
                continue;
            }
        };

        for name_dir in subdirectories(&repository_dir.join(CHARTS_DIR))? {
            let Some(name) = name_dir
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(unescape_segment)
            else {
                continue;
            };

            for file in read_dir_entries(&name_dir)? {
                let file_name = file.file_name().to_string_lossy().into_owned();
                if is_temp_file(&file_name) {
                    continue;
                }
                let Some(version) = file_name
                    .strip_suffix(ARCHIVE_SUFFIX)
                    .and_then(unescape_segment)
                else {
                    continue;
                };

                let metadata = file
                    .metadata()
                    .map_err(|e| ChartError::cache_read(file.path(), e))?;
                let last_used = metadata
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .map_err(|e| ChartError::cache_read(file.path(), e))?;

                records.push(CacheRecord {
                    repository_url: repository_url.clone(),
                    name: name.clone(),
                    version,
                    size_bytes: metadata.len(),
                    last_used,
                    path: file.path(),
                });
            }
        }
    }

    records.sort_by(|a, b| {
        a.last_used
            .cmp(&b.last_used)
            .then_with(|| a.repository_url.cmp(&b.repository_url))
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.version.cmp(&b.version))
    });
    Ok(records)
}
