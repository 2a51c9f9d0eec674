//! Chart archives and their contents
//!
//! A chart archive is a gzipped tarball whose single top-level directory
//! holds `Chart.yaml`, an optional `values.yaml`, a `templates/` directory
//! and any other files.

pub mod loader;
pub mod render;
pub mod values;

pub use loader::load_archive;
pub use render::{join_documents, render_chart, ReleaseContext, Renderer, SourceRenderer};
pub use values::{merge_values, parse_overrides};

use serde::{Deserialize, Serialize};

/// Contents of `Chart.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    #[serde(default)]
    pub api_version: String,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub chart_type: Option<String>,
}

/// One file of a chart, path relative to the chart directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartFile {
    pub path: String,
    pub content: Vec<u8>,
}

/// An unpacked chart
#[derive(Debug, Clone)]
pub struct Chart {
    pub metadata: ChartMetadata,
    /// Default values from `values.yaml`, always a mapping
    pub values: serde_yaml_ng::Value,
    /// Files under `templates/`, sorted by path
    pub templates: Vec<ChartFile>,
    /// Every other file, sorted by path
    pub files: Vec<ChartFile>,
}

impl Chart {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn version(&self) -> &str {
        &self.metadata.version
    }
}
