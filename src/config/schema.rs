//! Configuration schema for nixpkgs-broken
//!
//! Configuration is stored at `~/.config/nixpkgs-broken/config.toml`

use crate::config::ConfigManager;
use crate::error::{NbError, NbResult};
use crate::patch::PatchRules;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// CI service connection
    pub ci: CiConfig,

    /// Build database
    pub store: StoreConfig,

    /// Offline replay snapshots
    pub snapshot: SnapshotConfig,

    /// Breakage classification
    pub detect: DetectConfig,

    /// Source tree annotation
    pub patch: PatchConfig,
}

impl Config {
    /// Reject values no command can work with
    pub fn validate(&self, path: &Path) -> NbResult<()> {
        let invalid = |reason: &str| NbError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        if !(self.ci.base_url.starts_with("http://") || self.ci.base_url.starts_with("https://")) {
            return Err(invalid("ci.base_url must be an http(s) URL"));
        }
        if self.ci.jobset.split('/').filter(|s| !s.is_empty()).count() != 2 {
            return Err(invalid("ci.jobset must look like project/jobset"));
        }
        if self.ci.concurrency == 0 {
            return Err(invalid("ci.concurrency must be at least 1"));
        }
        if self.patch.rules.start_marker.is_empty() || self.patch.rules.end_marker.is_empty() {
            return Err(invalid("patch markers must not be empty"));
        }
        Ok(())
    }
}

/// CI service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CiConfig {
    /// Hydra instance
    pub base_url: String,

    /// `project/jobset`
    pub jobset: String,

    /// Parallel build fetches
    pub concurrency: usize,

    pub connect_timeout_secs: u64,

    pub read_timeout_secs: u64,
}

impl CiConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

impl Default for CiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://hydra.nixos.org".to_string(),
            jobset: "nixpkgs/trunk".to_string(),
            concurrency: 100,
            connect_timeout_secs: 10,
            read_timeout_secs: 60,
        }
    }
}

/// Build database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database path
    pub database: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: ConfigManager::data_dir().join("hydra.db"),
        }
    }
}

/// Snapshot settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Directory for evaluation and build-list snapshots
    pub dir: PathBuf,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            dir: ConfigManager::cache_dir().join("snapshots"),
        }
    }
}

/// Breakage classification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectConfig {
    /// Attribute patterns never reported (glob-like, matched anywhere)
    pub exclude: Vec<String>,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            exclude: [
                "tests.",
                "nixosTests.",
                "stdenvBootstrapTools",
                "pkgsCross.",
                "pkgsStatic.",
                "pkgsMusl.",
                "pkgsi686Linux.",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Annotation settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchConfig {
    /// nixpkgs checkout to annotate (defaults to the current directory)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nixpkgs: Option<PathBuf>,

    #[serde(flatten)]
    pub rules: PatchRules,
}
