//! Chart repositories: indexes, version resolution, fetching and caching
//!
//! # Components
//!
//! | Module | Role |
//! |--------|------|
//! | [`version`] | Constraint parsing and highest-match selection |
//! | [`index`] | Index documents and per-repository snapshots |
//! | [`fetcher`] | Network access behind the [`RemoteFetcher`] trait |
//! | [`cache`] | Atomic on-disk archive cache |
//! | [`catalog`] | Resolve + fetch with de-duplication and retries |
//!
//! Cached archives are immutable for a given repository, chart and version.
//! Interrupted writes never produce a visible entry.

pub mod cache;
pub mod catalog;
pub mod fetcher;
pub mod index;
pub mod retry;
pub mod singleflight;
pub mod version;

pub use cache::{CacheEntry, CacheKey, CacheRecord, FileCache};
pub use catalog::{Archive, Catalog, CatalogSettings, PackageIdentity};
pub use fetcher::{FetchError, FetchSettings, HttpFetcher, MemoryFetcher, RemoteFetcher};
pub use index::{IndexEntry, IndexSnapshot, ResolvedVersion, VersionIndex};
pub use retry::RetryPolicy;
pub use version::VersionConstraint;
