//! CLI command implementations

pub mod cache;
pub mod config;
pub mod fetch;
pub mod render;
pub mod resolve;
pub mod versions;

pub use cache::execute as cache;
pub use config::execute as config;
pub use fetch::execute as fetch;
pub use render::execute as render;
pub use resolve::execute as resolve;
pub use versions::execute as versions;
pub use versions::search;

use crate::config::{Config, ConfigManager};
use crate::repo::{Catalog, HttpFetcher};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Build the catalog every chart command works through
pub(crate) fn open_catalog(config: &Config, shutdown: CancellationToken) -> Catalog {
    let settings = config.catalog_settings(ConfigManager::default_cache_dir());
    let fetcher = Arc::new(HttpFetcher::new(config.fetch_settings()));
    Catalog::new(settings, fetcher, shutdown)
}
