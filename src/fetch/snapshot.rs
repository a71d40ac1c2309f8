//! JSON snapshots of evaluation and build listings for offline replay
//!
//! Snapshot file names are content-addressed from the request identity, so
//! different instances and jobsets never collide in one directory.

use crate::error::{NbError, NbResult};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Snapshot directory
#[derive(Debug, Clone)]
pub struct SnapshotCache {
    dir: PathBuf,
}

impl SnapshotCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot path of a jobset's evaluation list
    pub fn evals_path(&self, base_url: &str, jobset: &str) -> PathBuf {
        self.dir
            .join(format!("evals-{}.json", cache_key(&[base_url, jobset])))
    }

    /// Snapshot path of an evaluation's build list
    pub fn builds_path(&self, base_url: &str, eval_id: u64) -> PathBuf {
        self.dir.join(format!(
            "builds-{}.json",
            cache_key(&[base_url, &eval_id.to_string()])
        ))
    }

    pub fn save(&self, path: &Path, value: &Value) -> NbResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            NbError::io(format!("creating snapshot dir {}", self.dir.display()), e)
        })?;
        let content = serde_json::to_string(value)?;
        fs::write(path, content)
            .map_err(|e| NbError::io(format!("writing snapshot {}", path.display()), e))?;
        debug!("Saved snapshot {}", path.display());
        Ok(())
    }

    /// Load a snapshot; `what` names it in the error when absent
    pub fn load(&self, path: &Path, what: &str) -> NbResult<Value> {
        if !path.exists() {
            return Err(NbError::SnapshotMissing {
                what: what.to_string(),
                dir: self.dir.clone(),
            });
        }
        let content = fs::read_to_string(path)
            .map_err(|e| NbError::io(format!("reading snapshot {}", path.display()), e))?;
        debug!("Replaying snapshot {}", path.display());
        Ok(serde_json::from_str(&content)?)
    }
}

/// SHA-256 over the NUL-joined parts, first 16 hex chars
pub fn cache_key(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([0u8]);
        }
        hasher.update(part.as_bytes());
    }
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}
