//! Resolve command - pick one chart version for a constraint

use super::open_catalog;
use crate::cli::args::{OutputFormat, ResolveArgs};
use crate::config::Config;
use crate::error::ChartResult;
use crate::repo::ResolvedVersion;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Execute the resolve command
pub async fn execute(
    args: ResolveArgs,
    config: &Config,
    shutdown: CancellationToken,
) -> ChartResult<()> {
    let catalog = open_catalog(config, shutdown);
    let identity = args.chart.identity();

    let resolved = catalog.resolve_version(&identity).await?;
    info!("Resolved {} to {}", identity, resolved.version);

    match args.format {
        OutputFormat::Plain => println!("{}", resolved.version),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&resolved)?),
        OutputFormat::Table => print_resolved(&resolved),
    }

    Ok(())
}

fn print_resolved(resolved: &ResolvedVersion) {
    println!("{:<12} {}", "CHART", resolved.name);
    println!("{:<12} {}", "VERSION", resolved.version);
    println!("{:<12} {}", "REPOSITORY", resolved.repository_url);
    println!("{:<12} {}", "URL", resolved.download_url);
    if let Some(digest) = &resolved.digest {
        println!("{:<12} {}", "DIGEST", digest);
    }
}
