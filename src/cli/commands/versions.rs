//! Versions and search commands - browse a repository index

use super::open_catalog;
use crate::cli::args::{OutputFormat, SearchArgs, VersionsArgs};
use crate::config::Config;
use crate::error::{ChartError, ChartResult};
use crate::repo::index::normalize_repository_url;
use crate::repo::IndexEntry;
use console::style;
use tokio_util::sync::CancellationToken;

/// Execute the versions command
pub async fn execute(
    args: VersionsArgs,
    config: &Config,
    shutdown: CancellationToken,
) -> ChartResult<()> {
    let catalog = open_catalog(config, shutdown);

    let entry = catalog
        .versions(&args.repo, &args.name)
        .await?
        .ok_or_else(|| ChartError::NoMatchingVersion {
            name: args.name.clone(),
            constraint: "any".to_string(),
            repository: normalize_repository_url(&args.repo),
        })?;

    match args.format {
        OutputFormat::Table => print_versions_table(&entry),
        OutputFormat::Json => print_versions_json(&entry)?,
        OutputFormat::Plain => {
            for version in &entry.versions {
                println!("{}", version.version);
            }
        }
    }

    Ok(())
}

fn print_versions_table(entry: &IndexEntry) {
    let latest = entry.latest().map(|v| v.version.clone());

    println!("{:<20} {:<16} {:<44}", "VERSION", "APP VERSION", "DESCRIPTION");
    println!("{}", "-".repeat(80));

    for version in &entry.versions {
        let mut label = version.version.to_string();
        if version.deprecated {
            label = style(format!("{} (deprecated)", label)).dim().to_string();
        } else if latest.as_ref() == Some(&version.version) {
            label = style(label).green().to_string();
        }

        println!(
            "{:<20} {:<16} {:<44}",
            label,
            version.app_version.as_deref().unwrap_or("-"),
            version.description.as_deref().unwrap_or("")
        );
    }

    println!();
    println!("Total: {} version(s)", entry.versions.len());
}

fn print_versions_json(entry: &IndexEntry) -> ChartResult<()> {
    #[derive(serde::Serialize)]
    struct VersionJson<'a> {
        version: String,
        app_version: Option<&'a str>,
        url: &'a str,
        digest: Option<&'a str>,
        deprecated: bool,
    }

    let versions: Vec<VersionJson<'_>> = entry
        .versions
        .iter()
        .map(|v| VersionJson {
            version: v.version.to_string(),
            app_version: v.app_version.as_deref(),
            url: &v.download_url,
            digest: v.digest.as_deref(),
            deprecated: v.deprecated,
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&versions)?);
    Ok(())
}

/// Execute the search command
pub async fn search(args: SearchArgs, config: &Config, shutdown: CancellationToken) -> ChartResult<()> {
    let catalog = open_catalog(config, shutdown);
    let query = args.query.unwrap_or_default();

    let entries = catalog.search(&args.repo, &query).await?;

    if entries.is_empty() && args.format != OutputFormat::Json {
        println!("No charts found.");
        return Ok(());
    }

    match args.format {
        OutputFormat::Table => print_search_table(&entries),
        OutputFormat::Json => print_search_json(&entries)?,
        OutputFormat::Plain => {
            for entry in &entries {
                println!("{}", entry.name);
            }
        }
    }

    Ok(())
}

fn print_search_table(entries: &[IndexEntry]) {
    println!("{:<30} {:<14} {:<36}", "NAME", "LATEST", "DESCRIPTION");
    println!("{}", "-".repeat(80));

    for entry in entries {
        let latest = entry.latest();
        println!(
            "{:<30} {:<14} {:<36}",
            entry.name,
            latest.map(|v| v.version.to_string()).unwrap_or_else(|| "-".to_string()),
            latest.and_then(|v| v.description.as_deref()).unwrap_or("")
        );
    }

    println!();
    println!("Total: {} chart(s)", entries.len());
}

fn print_search_json(entries: &[IndexEntry]) -> ChartResult<()> {
    #[derive(serde::Serialize)]
    struct ChartJson<'a> {
        name: &'a str,
        latest: Option<String>,
        description: Option<&'a str>,
        versions: usize,
    }

    let charts: Vec<ChartJson<'_>> = entries
        .iter()
        .map(|entry| {
            let latest = entry.latest();
            ChartJson {
                name: &entry.name,
                latest: latest.map(|v| v.version.to_string()),
                description: latest.and_then(|v| v.description.as_deref()),
                versions: entry.versions.len(),
            }
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&charts)?);
    Ok(())
}
