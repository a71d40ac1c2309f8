//! nixpkgs-broken - CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use nixpkgs_broken::cli::{commands, Cli, Commands};
use nixpkgs_broken::config::ConfigManager;
use nixpkgs_broken::error::NbResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Help and version go to stdout and succeed; any other parse error is a failure
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            e.print().ok();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> NbResult<()> {
    // 0 = warn, 1 = info, 2+ = debug; stdout stays free for report output
    let filter = match cli.verbose {
        0 => EnvFilter::new("nixpkgs_broken=warn"),
        1 => EnvFilter::new("nixpkgs_broken=info"),
        _ => EnvFilter::new("nixpkgs_broken=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let mut config = manager.load().await?;
    debug!("Loaded configuration from {}", manager.path().display());

    if let Some(base_url) = cli.base_url {
        config.ci.base_url = base_url.trim_end_matches('/').to_string();
    }
    if let Some(jobset) = cli.jobset {
        config.ci.jobset = jobset;
    }
    if let Some(database) = cli.database {
        config.store.database = database;
    }
    config.validate(manager.path())?;

    match cli.command {
        Commands::Update(args) => commands::update(args, &config).await,
        Commands::Report(args) => commands::report(args, &config).await,
        Commands::Mark(args) => commands::mark(args, &config).await,
        Commands::MarkAttr(args) => commands::mark_attr(args, &config).await,
        Commands::Config(args) => commands::config(args, &config, &manager).await,
    }
}
