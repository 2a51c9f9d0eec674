//! Cache command - manage cached chart archives

use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::{Config, ConfigManager};
use crate::error::ChartResult;
use crate::repo::cache::{format_bytes, mb_to_bytes, CacheRecord};
use crate::repo::index::normalize_repository_url;
use crate::repo::FileCache;
use crate::ui;
use console::style;
use std::io::{self, Write};
use tracing::debug;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> ChartResult<()> {
    let settings = config.catalog_settings(ConfigManager::default_cache_dir());
    let cache = FileCache::new(settings.cache_dir);
    debug!("Chart cache at {}", cache.root().display());

    match args.action {
        CacheAction::List { format } => list_entries(&cache, format).await,
        CacheAction::Gc { max_mb } => {
            let limit = match max_mb {
                Some(mb) => Some(mb_to_bytes(mb)),
                None => settings.max_cache_bytes,
            };
            gc(&cache, limit).await
        }
        CacheAction::Clear { repo, yes } => clear(&cache, repo.as_deref(), yes).await,
    }
}

/// List all cached archives
async fn list_entries(cache: &FileCache, format: OutputFormat) -> ChartResult<()> {
    let entries = cache.entries().await?;

    if entries.is_empty() && format != OutputFormat::Json {
        println!("No cached charts found.");
        return Ok(());
    }

    match format {
        OutputFormat::Table => print_cache_table(&entries),
        OutputFormat::Json => print_cache_json(&entries)?,
        OutputFormat::Plain => print_cache_plain(&entries),
    }

    Ok(())
}

fn print_cache_table(entries: &[CacheRecord]) {
    println!(
        "{:<24} {:<12} {:<10} {:<18} {}",
        "CHART", "VERSION", "SIZE", "LAST USED", "REPOSITORY"
    );
    println!("{}", "-".repeat(100));

    for entry in entries {
        let last_used = entry.last_used.format("%Y-%m-%d %H:%M").to_string();
        println!(
            "{:<24} {:<12} {:<10} {:<18} {}",
            entry.name,
            entry.version,
            format_bytes(entry.size_bytes),
            last_used,
            style(&entry.repository_url).dim()
        );
    }

    let total: u64 = entries.iter().map(|e| e.size_bytes).sum();
    println!();
    println!("Total: {} archive(s), {}", entries.len(), format_bytes(total));
}

fn print_cache_json(entries: &[CacheRecord]) -> ChartResult<()> {
    #[derive(serde::Serialize)]
    struct CacheJson<'a> {
        #[serde(flatten)]
        record: &'a CacheRecord,
        path: String,
    }

    let json_entries: Vec<CacheJson<'_>> = entries
        .iter()
        .map(|record| CacheJson {
            record,
            path: record.path.display().to_string(),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&json_entries)?);
    Ok(())
}

fn print_cache_plain(entries: &[CacheRecord]) {
    for entry in entries {
        println!("{}", entry.path.display());
    }
}

/// Remove interrupted writes, then evict the least recently used archives
/// above `limit`
async fn gc(cache: &FileCache, limit: Option<u64>) -> ChartResult<()> {
    let temp_removed = cache.remove_stale_temp_files().await?;
    if temp_removed > 0 {
        ui::step_ok(&format!("Removed {} interrupted write(s)", temp_removed));
    }

    let Some(limit) = limit else {
        println!("Cache size limit is disabled (max_cache_mb = 0)");
        return Ok(());
    };

    let report = cache.evict_to(limit, None).await?;
    if report.removed == 0 {
        println!(
            "Cache is within its limit ({} of {}).",
            format_bytes(cache.total_size().await?),
            format_bytes(limit)
        );
        return Ok(());
    }

    ui::step_ok(&format!(
        "Evicted {} archive(s), freed {}",
        report.removed,
        format_bytes(report.freed_bytes)
    ));
    Ok(())
}

/// Remove every cached archive, or those of one repository
async fn clear(cache: &FileCache, repo: Option<&str>, skip_confirm: bool) -> ChartResult<()> {
    let repo = repo.map(normalize_repository_url);
    let entries = cache.entries().await?;
    let affected = entries
        .iter()
        .filter(|e| repo.as_ref().map_or(true, |r| &e.repository_url == r))
        .count();

    match &repo {
        Some(repo) => eprintln!(
            "This will remove {} archive(s) and the cached index of {}",
            affected, repo
        ),
        None => eprintln!(
            "This will remove {} archive(s) and every cached index under {}",
            affected,
            cache.root().display()
        ),
    }

    if !skip_confirm && !confirm() {
        ui::remark("Aborted.");
        return Ok(());
    }

    match repo {
        Some(repo) => {
            let removed = cache.clear_repository(&repo).await?;
            ui::step_ok(&format!("Removed {} archive(s) of {}", removed, repo));
        }
        None => {
            let removed = cache.clear().await?;
            ui::step_ok(&format!("Removed {} archive(s)", removed));
        }
    }
    Ok(())
}

fn confirm() -> bool {
    eprint!("Are you sure? [y/N] ");
    let _ = io::stderr().flush();

    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        ui::remark("Failed to read input.");
        return false;
    }
    input.trim().eq_ignore_ascii_case("y")
}
