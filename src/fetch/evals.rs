//! Evaluation and build-list fetchers

use crate::error::{NbError, NbResult};
use crate::fetch::client::{CiService, FetchError};
use crate::fetch::snapshot::SnapshotCache;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Whether to ask the CI service or replay the last snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    Live,
    Cached,
}

/// One entry of a jobset's evaluation list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalSummary {
    pub id: u64,
    pub timestamp: i64,
}

#[derive(Deserialize)]
struct EvalList {
    evals: Vec<EvalSummary>,
}

#[derive(Deserialize)]
struct EvalBuilds {
    builds: Vec<u64>,
}

/// Fetches a jobset's evaluation list, newest first
pub struct EvalFetcher<'a> {
    client: &'a dyn CiService,
    snapshots: &'a SnapshotCache,
}

impl<'a> EvalFetcher<'a> {
    pub fn new(client: &'a dyn CiService, snapshots: &'a SnapshotCache) -> Self {
        Self { client, snapshots }
    }

    pub async fn fetch(&self, jobset: &str, mode: FetchMode) -> NbResult<Vec<EvalSummary>> {
        let path = format!("/jobset/{}/evals", jobset);
        let snapshot = self.snapshots.evals_path(self.client.base_url(), jobset);

        let value = match mode {
            FetchMode::Cached => self.snapshots.load(&snapshot, "evaluations")?,
            FetchMode::Live => {
                let start = Instant::now();
                let value = self.client.get_json(&path).await?;
                info!("Requesting evaluations took {:?}", start.elapsed());
                if let Err(e) = self.snapshots.save(&snapshot, &value) {
                    warn!("Could not save evaluation snapshot: {}", e);
                }
                value
            }
        };

        let list: EvalList = decode(&path, value)?;
        info!("Number of evaluations: {}", list.evals.len());
        Ok(list.evals)
    }
}

/// Pick the evaluation to work on.
///
/// Without an explicit id this is element 0 of the list. That assumes the
/// service returns evaluations newest first, which it does today but does not
/// promise.
pub fn select_evaluation(
    evals: &[EvalSummary],
    jobset: &str,
    requested: Option<u64>,
) -> NbResult<EvalSummary> {
    match requested {
        Some(id) => evals
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or(NbError::EvaluationNotListed(id)),
        None => evals.first().cloned().ok_or_else(|| NbError::NoEvaluations {
            jobset: jobset.to_string(),
        }),
    }
}

/// Fetches the set of build ids in an evaluation
pub struct BuildListFetcher<'a> {
    client: &'a dyn CiService,
    snapshots: &'a SnapshotCache,
}

impl<'a> BuildListFetcher<'a> {
    pub fn new(client: &'a dyn CiService, snapshots: &'a SnapshotCache) -> Self {
        Self { client, snapshots }
    }

    pub async fn fetch(&self, eval_id: u64, mode: FetchMode) -> NbResult<BTreeSet<u64>> {
        let path = format!("/eval/{}", eval_id);
        let snapshot = self.snapshots.builds_path(self.client.base_url(), eval_id);

        let value = match mode {
            FetchMode::Cached => self
                .snapshots
                .load(&snapshot, &format!("builds of evaluation {}", eval_id))?,
            FetchMode::Live => {
                let value = self.client.get_json(&path).await?;
                if let Err(e) = self.snapshots.save(&snapshot, &value) {
                    warn!("Could not save build list snapshot: {}", e);
                }
                value
            }
        };

        let list: EvalBuilds = decode(&path, value)?;
        let builds: BTreeSet<u64> = list.builds.into_iter().collect();
        debug!("Evaluation {} has {} builds", eval_id, builds.len());
        Ok(builds)
    }
}

fn decode<T: serde::de::DeserializeOwned>(path: &str, value: Value) -> NbResult<T> {
    serde_json::from_value(value).map_err(|e| {
        NbError::Fetch(FetchError::Decode {
            url: path.to_string(),
            reason: e.to_string(),
        })
    })
}
