//! CLI argument definitions using clap derive

use crate::repo::PackageIdentity;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// chartctl - resolve, fetch and render charts from chart repositories
///
/// Archives are cached on disk per repository, chart and version, so a
/// chart is downloaded at most once.
#[derive(Parser, Debug)]
#[command(name = "chartctl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "CHARTCTL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Chart cache directory (overrides configuration)
    #[arg(long, global = true, env = "CHARTCTL_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Use the last known index when a repository is unreachable
    #[arg(long, global = true)]
    pub offline_fallback: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve a version constraint to one chart version
    Resolve(ResolveArgs),

    /// Download a chart archive into the cache
    Fetch(FetchArgs),

    /// List the versions of a chart
    Versions(VersionsArgs),

    /// Search the charts of a repository
    Search(SearchArgs),

    /// Render the manifests of a chart
    Render(RenderArgs),

    /// Manage the chart cache
    Cache(CacheArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Chart reference as given on the command line
#[derive(Args, Debug, Clone)]
pub struct ChartArgs {
    /// Name of the chart
    #[arg(long = "chart-name")]
    pub name: String,

    /// Version of the chart (exact version or semver range, empty = latest)
    #[arg(long = "chart-version", default_value = "")]
    pub chart_version: String,

    /// Repository URL of the chart
    #[arg(long = "chart-repo")]
    pub repo: String,
}

impl ChartArgs {
    pub fn identity(&self) -> PackageIdentity {
        PackageIdentity::new(&self.repo, self.name.clone(), self.chart_version.clone())
    }
}

/// Arguments for the resolve command
#[derive(Parser, Debug)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub chart: ChartArgs,

    /// Output format
    #[arg(short, long, default_value = "plain")]
    pub format: OutputFormat,
}

/// Arguments for the fetch command
#[derive(Parser, Debug)]
pub struct FetchArgs {
    #[command(flatten)]
    pub chart: ChartArgs,

    /// Also write the archive to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the versions command
#[derive(Parser, Debug)]
pub struct VersionsArgs {
    /// Chart name
    pub name: String,

    /// Repository URL
    #[arg(long = "chart-repo")]
    pub repo: String,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the search command
#[derive(Parser, Debug)]
pub struct SearchArgs {
    /// Text to look for in chart names and descriptions (empty = all)
    pub query: Option<String>,

    /// Repository URL
    #[arg(long = "chart-repo")]
    pub repo: String,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the render command
#[derive(Parser, Debug)]
pub struct RenderArgs {
    /// Where the chart reference comes from
    #[command(subcommand)]
    pub source: RenderSource,

    /// Namespace to render into (overrides the manifest)
    #[arg(short, long, global = true)]
    pub namespace: Option<String>,
}

/// Render sources
#[derive(Subcommand, Debug)]
pub enum RenderSource {
    /// Render a chart named on the command line
    Chart {
        #[command(flatten)]
        chart: ChartArgs,

        /// Values in JSON or YAML, or @FILE to read them from a file
        #[arg(long)]
        values: Option<String>,

        /// Release name passed to the renderer
        #[arg(long, default_value = "release-0")]
        release_name: String,
    },

    /// Render the chart of an Application manifest
    App {
        /// Manifest file (YAML or JSON, - for stdin)
        file: PathBuf,
    },

    /// Render the chart of a Release manifest
    Release {
        /// Manifest file (YAML or JSON, - for stdin)
        file: PathBuf,
    },
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., catalog.index_ttl_secs)
        key: String,
        /// Value to set
        value: String,
    },
}

/// Output format for listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List cached archives
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Remove interrupted writes and shrink the cache to its size limit
    Gc {
        /// Size limit in MB (default: from config)
        #[arg(long)]
        max_mb: Option<u64>,
    },

    /// Remove cached archives and indexes
    Clear {
        /// Only clear this repository
        #[arg(long)]
        repo: Option<String>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}
