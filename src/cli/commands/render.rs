//! Render command - print the manifests of a chart

use super::open_catalog;
use crate::chart::{join_documents, parse_overrides, render_chart, ReleaseContext, SourceRenderer};
use crate::cli::args::{RenderArgs, RenderSource};
use crate::config::Config;
use crate::error::{ChartError, ChartResult};
use crate::source::{self, ObjectKind, RenderRequest, DEFAULT_NAMESPACE};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Execute the render command
pub async fn execute(
    args: RenderArgs,
    config: &Config,
    shutdown: CancellationToken,
) -> ChartResult<()> {
    let request = build_request(args.source, args.namespace).await?;
    let catalog = open_catalog(config, shutdown);

    let (resolved, chart) = catalog.load_chart(&request.identity).await?;
    info!(
        "Rendering {} {} as {} in {}",
        resolved.name, resolved.version, request.release.name, request.release.namespace
    );
    debug!("Value overrides: {:?}", request.values);

    let documents = render_chart(&SourceRenderer, &chart, &request.release, &request.values)?;
    if documents.is_empty() {
        debug!("{} {} has no manifest templates", resolved.name, resolved.version);
        return Ok(());
    }

    println!("{}", join_documents(&documents));
    Ok(())
}

async fn build_request(source: RenderSource, namespace: Option<String>) -> ChartResult<RenderRequest> {
    match source {
        RenderSource::Chart {
            chart,
            values,
            release_name,
        } => {
            let values = match values {
                Some(raw) => parse_overrides(&read_values(raw).await?)?,
                None => parse_overrides("")?,
            };
            Ok(RenderRequest {
                identity: chart.identity(),
                values,
                release: ReleaseContext {
                    name: release_name,
                    namespace: namespace.unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
                },
            })
        }
        RenderSource::App { file } => load(ObjectKind::Application, file, namespace).await,
        RenderSource::Release { file } => load(ObjectKind::Release, file, namespace).await,
    }
}

/// Inline values, or the contents of the file named after `@`
async fn read_values(raw: String) -> ChartResult<String> {
    match raw.strip_prefix('@') {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ChartError::io(format!("reading values from {}", path), e)),
        None => Ok(raw),
    }
}

/// Manifests may come from stdin, so they are read off the runtime
async fn load(kind: ObjectKind, file: PathBuf, namespace: Option<String>) -> ChartResult<RenderRequest> {
    tokio::task::spawn_blocking(move || source::load_manifest(kind, &file, namespace.as_deref()))
        .await
        .map_err(|e| ChartError::Internal(format!("manifest reader failed: {}", e)))?
}
