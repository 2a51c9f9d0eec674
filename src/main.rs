//! chartctl - chart repository client
//!
//! CLI entry point that dispatches to subcommands.

use chartctl::cli::{Cli, Commands};
use chartctl::config::{Config, ConfigManager};
use chartctl::error::ChartResult;
use clap::Parser;
use console::style;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold().for_stderr(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow().for_stderr(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> ChartResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let mut config = config_manager.load().await?;

    init_logging(cli.verbose, &config);
    debug!("Using configuration at {}", config_manager.path().display());

    // Command-line overrides apply to this run only
    if let Some(dir) = cli.cache_dir {
        config.catalog.cache_dir = Some(dir);
    }
    if cli.offline_fallback {
        config.catalog.offline_fallback = true;
    }

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupted, cancelling in-flight fetches");
            trigger.cancel();
        }
    });

    match cli.command {
        Commands::Resolve(args) => chartctl::cli::commands::resolve(args, &config, shutdown).await,
        Commands::Fetch(args) => chartctl::cli::commands::fetch(args, &config, shutdown).await,
        Commands::Versions(args) => chartctl::cli::commands::versions(args, &config, shutdown).await,
        Commands::Search(args) => chartctl::cli::commands::search(args, &config, shutdown).await,
        Commands::Render(args) => chartctl::cli::commands::render(args, &config, shutdown).await,
        Commands::Cache(args) => chartctl::cli::commands::cache(args, &config).await,
        Commands::Config(args) => {
            chartctl::cli::commands::config(args, &config, &config_manager).await
        }
    }
}

/// Logs go to stderr: 0 = warn, 1 = info, 2+ = debug
fn init_logging(verbose: u8, config: &Config) {
    let filter = match verbose {
        0 => EnvFilter::new("chartctl=warn"),
        1 => EnvFilter::new("chartctl=info"),
        _ => EnvFilter::new("chartctl=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if config.general.log_format == "json" {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}
