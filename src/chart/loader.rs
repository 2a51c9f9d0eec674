//! Unpack chart archives in memory

use crate::chart::{Chart, ChartFile, ChartMetadata};
use crate::error::{ChartError, ChartResult};
use flate2::read::GzDecoder;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Component, Path};
use tracing::debug;

/// Upper bound on the unpacked size of one chart
const MAX_UNPACKED_BYTES: u64 = 256 * 1024 * 1024;

const CHART_FILE: &str = "Chart.yaml";
const VALUES_FILE: &str = "values.yaml";
const TEMPLATES_DIR: &str = "templates/";

/// Parse a gzipped chart tarball
///
/// The top-level directory is stripped from every path. Entries that would
/// escape the chart directory, or that sit at the archive root, are rejected.
/// Directories, links and other special entries are ignored.
pub fn load_archive(bytes: &[u8]) -> ChartResult<Chart> {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    let mut files: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    let mut unpacked: u64 = 0;

    let entries = archive
        .entries()
        .map_err(|e| ChartError::ChartLoad(format!("reading archive: {}", e)))?;

    for entry in entries {
        let mut entry =
            entry.map_err(|e| ChartError::ChartLoad(format!("reading archive entry: {}", e)))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let path = entry
            .path()
            .map_err(|e| ChartError::ChartLoad(format!("invalid entry path: {}", e)))?
            .into_owned();
        let relative = chart_relative_path(&path)?;

        unpacked = unpacked.saturating_add(entry.size());
        if unpacked > MAX_UNPACKED_BYTES {
            return Err(ChartError::ChartLoad(format!(
                "archive unpacks to more than {} bytes",
                MAX_UNPACKED_BYTES
            )));
        }

        let mut content = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut content)
            .map_err(|e| ChartError::ChartLoad(format!("reading {}: {}", relative, e)))?;
        files.insert(relative, content);
    }

    let chart_yaml = files
        .remove(CHART_FILE)
        .ok_or_else(|| ChartError::ChartLoad(format!("{} is missing", CHART_FILE)))?;
    let metadata: ChartMetadata = serde_yaml_ng::from_slice(&chart_yaml)
        .map_err(|e| ChartError::ChartLoad(format!("invalid {}: {}", CHART_FILE, e)))?;
    if metadata.name.trim().is_empty() {
        return Err(ChartError::ChartLoad(format!("{} has no name", CHART_FILE)));
    }

    let values = match files.remove(VALUES_FILE) {
        Some(raw) => parse_default_values(&raw)?,
        None => serde_yaml_ng::Value::Mapping(Default::default()),
    };

    let (templates, files): (Vec<_>, Vec<_>) = files
        .into_iter()
        .map(|(path, content)| ChartFile { path, content })
        .partition(|file| file.path.starts_with(TEMPLATES_DIR));

    debug!(
        "Loaded chart {} {} ({} templates, {} files)",
        metadata.name,
        metadata.version,
        templates.len(),
        files.len()
    );

    Ok(Chart {
        metadata,
        values,
        templates,
        files,
    })
}

/// Path below the archive's top-level directory, `/`-separated
fn chart_relative_path(path: &Path) -> ChartResult<String> {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(_)) => {}
        _ => {
            return Err(ChartError::ChartLoad(format!(
                "entry {} is outside the chart directory",
                path.display()
            )))
        }
    }

    let mut parts = Vec::new();
    for component in components {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => {
                return Err(ChartError::ChartLoad(format!(
                    "entry {} escapes the chart directory",
                    path.display()
                )))
            }
        }
    }

    if parts.is_empty() {
        return Err(ChartError::ChartLoad(format!(
            "entry {} is at the archive root",
            path.display()
        )));
    }
    Ok(parts.join("/"))
}

fn parse_default_values(raw: &[u8]) -> ChartResult<serde_yaml_ng::Value> {
    let value: serde_yaml_ng::Value = serde_yaml_ng::from_slice(raw)
        .map_err(|e| ChartError::ChartLoad(format!("invalid {}: {}", VALUES_FILE, e)))?;
    match value {
        serde_yaml_ng::Value::Null => Ok(serde_yaml_ng::Value::Mapping(Default::default())),
        serde_yaml_ng::Value::Mapping(_) => Ok(value),
        _ => Err(ChartError::ChartLoad(format!(
            "{} must be a mapping",
            VALUES_FILE
        ))),
    }
}
