//! Breakage classification over the build store
//!
//! Every (job, system) pair whose latest resolved build failed is either a
//! regression (it built at some point) or has never built. When local history
//! has no success the CI service's "latest successful build" endpoint is asked,
//! and a success found there is written back into the store.

pub mod rules;

pub use rules::ExclusionRules;

use crate::error::NbResult;
use crate::fetch::parse::parse_latest_success;
use crate::fetch::{CiService, FetchError};
use crate::platform::Platform;
use crate::store::{BuildRecord, BuildStatus, BuildStore, JobsetId};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, warn};

/// A pair that used to build and now fails
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Regression {
    pub job: String,
    pub system: Platform,
    pub build_id: u64,
    pub status: BuildStatus,
    pub last_success_build: u64,
    pub last_success_timestamp: i64,
}

/// A pair with no known successful build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NeverSucceeded {
    pub job: String,
    pub system: Platform,
    pub build_id: u64,
    pub status: BuildStatus,
}

/// Which classes of breakage to act on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakageKind {
    All,
    Regressed,
    NeverSuccessful,
}

/// Classification result
#[derive(Debug, Clone, Default, Serialize)]
pub struct BrokenReport {
    /// Oldest last success first
    pub regressed: Vec<Regression>,
    /// Sorted by attribute, then system
    pub never_successful: Vec<NeverSucceeded>,
    /// Pairs the oracle could not answer for
    pub skipped: usize,
}

impl BrokenReport {
    /// Drop the classes `kind` does not select
    pub fn retain_kind(&mut self, kind: BreakageKind) {
        match kind {
            BreakageKind::All => {}
            BreakageKind::Regressed => self.never_successful.clear(),
            BreakageKind::NeverSuccessful => self.regressed.clear(),
        }
    }

    /// Group broken pairs by attribute
    pub fn marking_plan(&self, kind: BreakageKind) -> BTreeMap<String, BTreeSet<Platform>> {
        let mut plan: BTreeMap<String, BTreeSet<Platform>> = BTreeMap::new();
        if matches!(kind, BreakageKind::All | BreakageKind::Regressed) {
            for r in &self.regressed {
                plan.entry(r.job.clone()).or_default().insert(r.system);
            }
        }
        if matches!(kind, BreakageKind::All | BreakageKind::NeverSuccessful) {
            for n in &self.never_successful {
                plan.entry(n.job.clone()).or_default().insert(n.system);
            }
        }
        plan
    }
}

/// Classifies broken (job, system) pairs of one jobset
pub struct BrokenDetector<'a> {
    oracle: &'a dyn CiService,
    jobset: &'a str,
    jobset_id: JobsetId,
    rules: &'a ExclusionRules,
}

impl<'a> BrokenDetector<'a> {
    pub fn new(
        oracle: &'a dyn CiService,
        jobset: &'a str,
        jobset_id: JobsetId,
        rules: &'a ExclusionRules,
    ) -> Self {
        Self {
            oracle,
            jobset,
            jobset_id,
            rules,
        }
    }

    pub async fn detect(&self, store: &mut BuildStore) -> NbResult<BrokenReport> {
        let mut report = BrokenReport::default();
        let mut seen: HashSet<(String, Platform, BuildStatus)> = HashSet::new();

        for latest in store.latest_per_job_system(self.jobset_id)? {
            let Some(status) = latest.status else {
                continue;
            };
            if !seen.insert((latest.job.clone(), latest.system, status)) {
                continue;
            }
            if self.rules.is_excluded(&latest.job) {
                debug!("Excluded {}", latest.job_name());
                continue;
            }
            if status.is_success() {
                continue;
            }

            let local = store.last_successful_build(self.jobset_id, &latest.job, latest.system)?;
            let success = match local {
                Some(success) => Some(success),
                None => match self.latest_success_from_oracle(&latest).await {
                    Ok(Some(success)) => {
                        backfill(store, &success)?;
                        Some(success)
                    }
                    Ok(None) => None,
                    Err(reason) => {
                        warn!("{}: oracle lookup failed: {}", latest.job_name(), reason);
                        report.skipped += 1;
                        continue;
                    }
                },
            };

            match success {
                Some(success) => report.regressed.push(Regression {
                    job: latest.job,
                    system: latest.system,
                    build_id: latest.id,
                    status,
                    last_success_build: success.id,
                    last_success_timestamp: success.eval_timestamp,
                }),
                None => report.never_successful.push(NeverSucceeded {
                    job: latest.job,
                    system: latest.system,
                    build_id: latest.id,
                    status,
                }),
            }
        }

        report.regressed.sort_by(|a, b| {
            a.last_success_timestamp
                .cmp(&b.last_success_timestamp)
                .then_with(|| a.job.cmp(&b.job))
                .then_with(|| a.system.cmp(&b.system))
        });
        report
            .never_successful
            .sort_by(|a, b| a.job.cmp(&b.job).then_with(|| a.system.cmp(&b.system)));

        debug!(
            "{} regressed, {} never successful, {} skipped",
            report.regressed.len(),
            report.never_successful.len(),
            report.skipped
        );
        Ok(report)
    }

    async fn latest_success_from_oracle(
        &self,
        latest: &BuildRecord,
    ) -> Result<Option<BuildRecord>, String> {
        let path = format!("/job/{}/{}/latest", self.jobset, latest.job_name());
        match self.oracle.get_json(&path).await {
            Ok(value) => parse_latest_success(&value, self.jobset_id).map_err(|e| e.to_string()),
            Err(FetchError::Status { status: 404, .. }) => Ok(None),
            Err(e) => Err(e.to_string()),
        }
    }
}

fn backfill(store: &mut BuildStore, success: &BuildRecord) -> NbResult<()> {
    match store.upsert_build_result(success) {
        Ok(outcome) => {
            debug!("Backfilled {} ({:?})", success.job_name(), outcome);
            Ok(())
        }
        Err(e) if e.is_scoped() => {
            warn!("Could not backfill build {}: {}", success.id, e);
            Ok(())
        }
        Err(e) => Err(e),
    }
}
