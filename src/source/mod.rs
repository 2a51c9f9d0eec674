//! Application and Release manifests as render inputs
//!
//! Both object kinds carry a chart reference and value overrides:
//!
//! - Application: `spec.template.chart` and `spec.template.values`
//! - Release: `spec.environment.chart` and `spec.environment.values`
//!
//! Manifests are read from files or stdin, as YAML or JSON.

use crate::chart::ReleaseContext;
use crate::error::{ChartError, ChartResult};
use crate::repo::PackageIdentity;
use serde::{Deserialize, Serialize};
use serde_yaml_ng::{Mapping, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::Read;
use std::path::Path;

/// Namespace used when neither the caller nor the manifest names one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Kind of object a render request is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Application,
    Release,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Application => write!(f, "Application"),
            Self::Release => write!(f, "Release"),
        }
    }
}

/// Everything needed to render one chart
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub identity: PackageIdentity,
    pub values: Value,
    pub release: ReleaseContext,
}

#[derive(Debug, Deserialize)]
struct Manifest<S> {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    metadata: ObjectMeta,
    spec: S,
}

#[derive(Debug, Default, Deserialize)]
struct ObjectMeta {
    #[serde(default)]
    name: String,
    #[serde(default)]
    namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApplicationSpec {
    template: Environment,
}

#[derive(Debug, Deserialize)]
struct ReleaseSpec {
    environment: Environment,
}

#[derive(Debug, Deserialize, Serialize)]
struct Environment {
    chart: ChartReference,
    #[serde(default)]
    values: Option<Value>,
}

#[derive(Debug, Deserialize, Serialize)]
struct ChartReference {
    name: String,
    #[serde(default)]
    version: String,
    #[serde(rename = "repoUrl")]
    repo_url: String,
}

/// Extract a render request from manifest text
///
/// `namespace` overrides the manifest's own namespace.
pub fn read_manifest(
    kind: ObjectKind,
    content: &str,
    namespace: Option<&str>,
) -> ChartResult<RenderRequest> {
    let invalid = |reason: String| ChartError::ObjectSource {
        kind: kind.to_string(),
        reason,
    };

    let (declared_kind, metadata, environment, release_name) = match kind {
        ObjectKind::Application => {
            let manifest: Manifest<ApplicationSpec> =
                serde_yaml_ng::from_str(content).map_err(|e| invalid(e.to_string()))?;
            let name = require_name(&manifest.metadata, kind)?;
            let release_name = application_release_name(&name, &manifest.spec.template)?;
            (manifest.kind, manifest.metadata, manifest.spec.template, release_name)
        }
        ObjectKind::Release => {
            let manifest: Manifest<ReleaseSpec> =
                serde_yaml_ng::from_str(content).map_err(|e| invalid(e.to_string()))?;
            let name = require_name(&manifest.metadata, kind)?;
            (manifest.kind, manifest.metadata, manifest.spec.environment, name)
        }
    };

    if let Some(declared) = declared_kind {
        if declared != kind.to_string() {
            return Err(invalid(format!("expected kind {}, found {}", kind, declared)));
        }
    }

    let chart = environment.chart;
    if chart.name.trim().is_empty() {
        return Err(invalid("chart name is empty".to_string()));
    }
    if chart.repo_url.trim().is_empty() {
        return Err(invalid("chart repoUrl is empty".to_string()));
    }

    let values = match environment.values {
        None | Some(Value::Null) => Value::Mapping(Mapping::new()),
        Some(value @ Value::Mapping(_)) => value,
        Some(_) => return Err(invalid("values must be a mapping".to_string())),
    };

    let namespace = namespace
        .map(str::to_string)
        .or(metadata.namespace)
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

    Ok(RenderRequest {
        identity: PackageIdentity::new(&chart.repo_url, chart.name, chart.version),
        values,
        release: ReleaseContext {
            name: release_name,
            namespace,
        },
    })
}

/// Read a manifest from `path`, or from stdin when `path` is `-`
pub fn load_manifest(
    kind: ObjectKind,
    path: &Path,
    namespace: Option<&str>,
) -> ChartResult<RenderRequest> {
    let content = if path == Path::new("-") {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .map_err(|e| ChartError::io("reading manifest from stdin", e))?;
        buffer
    } else {
        std::fs::read_to_string(path)
            .map_err(|e| ChartError::io(format!("reading manifest {}", path.display()), e))?
    };

    read_manifest(kind, &content, namespace)
}

fn require_name(metadata: &ObjectMeta, kind: ObjectKind) -> ChartResult<String> {
    if metadata.name.trim().is_empty() {
        return Err(ChartError::ObjectSource {
            kind: kind.to_string(),
            reason: "metadata.name is empty".to_string(),
        });
    }
    Ok(metadata.name.clone())
}

/// First release of an application: `<app>-<template hash>-0`
fn application_release_name(app: &str, template: &Environment) -> ChartResult<String> {
    let canonical = serde_json::to_vec(template)?;
    let digest = Sha256::digest(&canonical);
    Ok(format!("{}-{}-0", app, &hex::encode(digest)[..8]))
}
