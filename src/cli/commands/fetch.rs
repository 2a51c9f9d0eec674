//! Fetch command - download a chart archive into the cache

use super::open_catalog;
use crate::cli::args::FetchArgs;
use crate::config::Config;
use crate::error::{ChartError, ChartResult};
use crate::repo::cache::format_bytes;
use crate::repo::CacheKey;
use crate::ui;
use tokio::fs;
use tokio_util::sync::CancellationToken;

/// Execute the fetch command
///
/// Prints the path of the cached archive on stdout.
pub async fn execute(args: FetchArgs, config: &Config, shutdown: CancellationToken) -> ChartResult<()> {
    let catalog = open_catalog(config, shutdown);
    let identity = args.chart.identity();

    let (resolved, archive) = catalog.fetch_chart(&identity).await?;
    let summary = format!(
        "Fetched {} {} ({})",
        resolved.name,
        resolved.version,
        format_bytes(archive.len() as u64)
    );

    if let Some(output) = &args.output {
        fs::write(output, &archive[..])
            .await
            .map_err(|e| ChartError::io(format!("writing {}", output.display()), e))?;
        ui::step_ok_detail(&summary, &output.display().to_string());
    }

    let key = CacheKey::for_resolved(&resolved);
    if catalog.cache().contains(&key).await {
        if args.output.is_none() {
            ui::step_ok(&summary);
        }
        println!("{}", catalog.cache().entry_path(&key).display());
    } else {
        ui::step_warn_hint(
            &format!("{} {} is not cached", resolved.name, resolved.version),
            "The cache directory could not be written; see the log with -v",
        );
    }

    Ok(())
}
