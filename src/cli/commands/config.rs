//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::{NbError, NbResult};
use crate::ui::{self, Tone, UiContext};
use std::path::PathBuf;

const VALID_KEYS: [&str; 14] = [
    "ci.base_url",
    "ci.jobset",
    "ci.concurrency",
    "ci.connect_timeout_secs",
    "ci.read_timeout_secs",
    "store.database",
    "snapshot.dir",
    "detect.exclude",
    "patch.nixpkgs",
    "patch.start_marker",
    "patch.end_marker",
    "patch.deny_attrs",
    "patch.deny_files",
    "patch.complex_markers",
];

/// Execute the config command
pub async fn execute(args: ConfigArgs, config: &Config, manager: &ConfigManager) -> NbResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
        Some(ConfigAction::Set { key, value }) => set_value(manager, &key, &value).await?,
    }

    Ok(())
}

fn show_config(config: &Config) -> NbResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

async fn init_config(manager: &ConfigManager, force: bool) -> NbResult<()> {
    let ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::step_detail(
            &ctx,
            Tone::Warn,
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    ui::step_detail(
        &ctx,
        Tone::Ok,
        "Configuration initialized",
        &path.display().to_string(),
    );
    Ok(())
}

/// Set one key in the stored file, leaving command-line overrides out of it
async fn set_value(manager: &ConfigManager, key: &str, value: &str) -> NbResult<()> {
    let ctx = UiContext::detect();
    let mut config = manager.load().await?;

    if let Err(e) = apply(&mut config, key, value) {
        ui::remark(&ctx, "Valid keys:");
        for key in VALID_KEYS {
            eprintln!("  {}", key);
        }
        return Err(e);
    }

    config.validate(manager.path())?;
    manager.save(&config).await?;
    ui::step(&ctx, Tone::Ok, &format!("Set {} = {}", key, value));
    Ok(())
}

/// Assign a dot-separated key on `config`
fn apply(config: &mut Config, key: &str, value: &str) -> NbResult<()> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["ci", "base_url"] => config.ci.base_url = value.trim_end_matches('/').to_string(),
        ["ci", "jobset"] => config.ci.jobset = value.to_string(),
        ["ci", "concurrency"] => config.ci.concurrency = parse_number(value)?,
        ["ci", "connect_timeout_secs"] => config.ci.connect_timeout_secs = parse_number(value)?,
        ["ci", "read_timeout_secs"] => config.ci.read_timeout_secs = parse_number(value)?,

        ["store", "database"] => config.store.database = PathBuf::from(value),
        ["snapshot", "dir"] => config.snapshot.dir = PathBuf::from(value),

        ["detect", "exclude"] => config.detect.exclude = parse_list(value),

        ["patch", "nixpkgs"] => {
            config.patch.nixpkgs = (!value.is_empty()).then(|| PathBuf::from(value))
        }
        ["patch", "start_marker"] => config.patch.rules.start_marker = value.to_string(),
        ["patch", "end_marker"] => config.patch.rules.end_marker = value.to_string(),
        ["patch", "deny_attrs"] => config.patch.rules.deny_attrs = parse_list(value),
        ["patch", "deny_files"] => config.patch.rules.deny_files = parse_list(value),
        ["patch", "complex_markers"] => config.patch.rules.complex_markers = parse_list(value),

        _ => return Err(NbError::User(format!("Unknown config key: {}", key))),
    }

    Ok(())
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_number<T: std::str::FromStr>(value: &str) -> NbResult<T> {
    value
        .parse()
        .map_err(|_| NbError::User(format!("Invalid number: {}", value)))
}
