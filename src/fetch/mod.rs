//! Fetch pipeline: CI evaluation listings, per-build fetches and ingestion
//!
//! The evaluation being ingested is never implicit: every worker, parse and
//! record call receives it through a [`FetchContext`].

pub mod client;
pub mod evals;
pub mod parse;
pub mod pipeline;
pub mod pool;
pub mod snapshot;

#[cfg(test)]
pub(crate) mod fake;

pub use client::{CiService, FetchError, HydraClient};
pub use evals::{select_evaluation, BuildListFetcher, EvalFetcher, EvalSummary, FetchMode};
pub use parse::{parse_build, parse_latest_success, ShapeError};
pub use pipeline::{ingest_evaluation, refresh_missing_status, work_set, IngestSummary};
pub use pool::{BuildOutcome, BuildWorkerPool, PoolRun, Rejection};
pub use snapshot::SnapshotCache;

use crate::store::JobsetId;

/// The jobset and evaluation a build is being fetched through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchContext {
    pub jobset_id: JobsetId,
    pub eval_id: u64,
}
