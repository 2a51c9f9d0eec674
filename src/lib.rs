//! chartctl - chart repository client
//!
//! Resolves chart version constraints against repository indexes,
//! downloads chart archives at most once into an on-disk cache and renders
//! their manifests.

pub mod chart;
pub mod cli;
pub mod config;
pub mod error;
pub mod repo;
pub mod source;
pub mod ui;

pub use error::{ChartError, ChartResult};
pub use repo::{Catalog, CatalogSettings, PackageIdentity};
