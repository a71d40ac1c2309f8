//! CLI command implementations

pub mod config;
pub mod mark;
pub mod mark_attr;
pub mod report;
pub mod update;

pub use config::execute as config;
pub use mark::execute as mark;
pub use mark_attr::execute as mark_attr;
pub use report::execute as report;
pub use update::execute as update;

use crate::config::Config;
use crate::detect::{BrokenDetector, BrokenReport, ExclusionRules};
use crate::error::{NbError, NbResult};
use crate::fetch::HydraClient;
use crate::patch::PatchOutcome;
use crate::store::{BuildStore, JobsetId};
use crate::ui::{self, Tone, UiContext};
use std::path::{Path, PathBuf};

fn hydra_client(config: &Config) -> HydraClient {
    HydraClient::new(
        &config.ci.base_url,
        config.ci.connect_timeout(),
        config.ci.read_timeout(),
    )
}

/// Open the build database and register the configured jobset
fn open_store(config: &Config) -> NbResult<(BuildStore, JobsetId)> {
    let mut store = BuildStore::open(&config.store.database)?;
    let jobset_id = store.ensure_jobset(&config.ci.base_url, &config.ci.jobset)?;
    Ok((store, jobset_id))
}

/// Classify the stored jobset, asking the CI service about unknown successes
async fn detect_broken(config: &Config, store: &mut BuildStore, jobset_id: JobsetId) -> NbResult<BrokenReport> {
    let rules = ExclusionRules::new(&config.detect.exclude)?;
    let client = hydra_client(config);
    BrokenDetector::new(&client, &config.ci.jobset, jobset_id, &rules)
        .detect(store)
        .await
}

/// The nixpkgs checkout to patch: argument, then config, then cwd
fn nixpkgs_root(arg: Option<PathBuf>, config: &Config) -> NbResult<PathBuf> {
    let root = match arg.or_else(|| config.patch.nixpkgs.clone()) {
        Some(root) => root,
        None => std::env::current_dir().map_err(|e| NbError::io("getting current directory", e))?,
    };
    check_checkout(&root)?;
    Ok(root)
}

fn check_checkout(root: &Path) -> NbResult<()> {
    if root.join("default.nix").is_file() {
        Ok(())
    } else {
        Err(NbError::User(format!(
            "{} is not a nixpkgs checkout (no default.nix)",
            root.display()
        )))
    }
}

/// One line per patch attempt
fn show_attempt(ctx: &UiContext, attr: &str, result: &NbResult<PatchOutcome>) {
    match result {
        Ok(PatchOutcome::Committed { file, expression }) => ui::step_detail(
            ctx,
            Tone::Ok,
            &format!("{}: broken = {}", attr, expression),
            &file.display().to_string(),
        ),
        Ok(PatchOutcome::AlreadyMarked) => {
            ui::step(ctx, Tone::Note, &format!("{} is already marked broken", attr))
        }
        Err(e) => ui::step_detail(ctx, Tone::Fail, "Not marked", &e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_needs_default_nix() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(check_checkout(dir.path()), Err(NbError::User(_))));

        std::fs::write(dir.path().join("default.nix"), "{ }: { }\n").unwrap();
        assert!(check_checkout(dir.path()).is_ok());
    }

    #[test]
    fn nixpkgs_root_prefers_argument() {
        let from_arg = tempfile::tempdir().unwrap();
        std::fs::write(from_arg.path().join("default.nix"), "{ }: { }\n").unwrap();

        let mut config = Config::default();
        config.patch.nixpkgs = Some(PathBuf::from("/nonexistent/nixpkgs"));

        let root = nixpkgs_root(Some(from_arg.path().to_path_buf()), &config).unwrap();
        assert_eq!(root, from_arg.path());
        assert!(nixpkgs_root(None, &config).is_err());
    }
}
