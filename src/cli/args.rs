//! CLI argument definitions using clap derive

use crate::detect::BreakageKind;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// nixpkgs-broken - track Hydra build health and mark broken packages
///
/// Ingests build results from a Hydra jobset into a local database,
/// classifies persistently failing packages, and annotates their
/// `meta.broken` in a nixpkgs checkout.
#[derive(Parser, Debug)]
#[command(name = "nixpkgs-broken")]
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
    #[arg(short, long, global = true, env = "NIXPKGS_BROKEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Hydra base URL (overrides ci.base_url)
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Jobset as project/jobset (overrides ci.jobset)
    #[arg(long, global = true)]
    pub jobset: Option<String>,

    /// Build database path (overrides store.database)
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest the current evaluation's build results
    Update(UpdateArgs),

    /// Show stored build health and broken packages
    Report(ReportArgs),

    /// Mark every broken package in a nixpkgs checkout
    Mark(MarkArgs),

    /// Mark one attribute broken on the given platforms
    MarkAttr(MarkAttrArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Arguments for the update command
#[derive(Parser, Debug)]
pub struct UpdateArgs {
    /// Replay the last saved evaluation snapshots instead of fetching them
    #[arg(long)]
    pub use_cached: bool,

    /// Ingest this evaluation instead of the newest one
    #[arg(long)]
    pub eval: Option<u64>,

    /// Refetch every stored build that has no status yet
    #[arg(long, conflicts_with_all = ["use_cached", "eval"])]
    pub missing_status: bool,

    /// Parallel build fetches (overrides ci.concurrency)
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,
}

/// Arguments for the report command
#[derive(Parser, Debug)]
pub struct ReportArgs {
    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,

    /// Which breakage to list
    #[arg(long, default_value = "all")]
    pub kind: KindArg,
}

/// Arguments for the mark command
#[derive(Parser, Debug)]
pub struct MarkArgs {
    /// nixpkgs checkout (overrides patch.nixpkgs)
    pub nixpkgs: Option<PathBuf>,

    /// Only list what would be marked
    #[arg(long)]
    pub dry_run: bool,

    /// Which breakage to mark
    #[arg(long, default_value = "all")]
    pub kind: KindArg,

    /// One-line comment written above each declaration
    #[arg(long)]
    pub comment: Option<String>,
}

/// Arguments for the mark-attr command
#[derive(Parser, Debug)]
pub struct MarkAttrArgs {
    /// Attribute path, e.g. python311Packages.requests
    pub attr: String,

    /// Platforms to mark (aarch64-darwin, aarch64-linux, x86_64-darwin, x86_64-linux)
    #[arg(required = true)]
    pub platforms: Vec<String>,

    /// nixpkgs checkout (overrides patch.nixpkgs)
    #[arg(long)]
    pub nixpkgs: Option<PathBuf>,

    /// One-line comment written above the declaration
    #[arg(long)]
    pub comment: Option<String>,
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
        /// Configuration key (e.g., ci.jobset)
        key: String,
        /// Value to set (comma-separated for lists)
        value: String,
    },
}

/// Output format for the report command
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable listing
    Table,
    /// JSON output
    Json,
    /// One `attribute.system` per line
    Plain,
}

/// Breakage class selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    /// Regressed and never-successful
    All,
    /// Built before, failing now
    Regressed,
    /// No successful build known
    NeverSuccessful,
}

impl From<KindArg> for BreakageKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::All => Self::All,
            KindArg::Regressed => Self::Regressed,
            KindArg::NeverSuccessful => Self::NeverSuccessful,
        }
    }
}
