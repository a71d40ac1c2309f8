//! Ingestion: work-set computation and the single store-writing consumer

use crate::error::NbResult;
use crate::fetch::pool::{BuildOutcome, BuildWorkerPool, Rejection};
use crate::fetch::FetchContext;
use crate::store::{BuildStore, JobsetId, UpsertOutcome};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::AddAssign;
use tracing::{debug, info, warn};

/// Counts from one ingestion run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestSummary {
    /// Build ids in the evaluation(s)
    pub total: usize,
    /// Per-build requests issued
    pub requested: usize,
    pub inserted: usize,
    pub status_filled: usize,
    pub unchanged: usize,
    pub rejected: usize,
}

impl AddAssign for IngestSummary {
    fn add_assign(&mut self, other: Self) {
        self.total += other.total;
        self.requested += other.requested;
        self.inserted += other.inserted;
        self.status_filled += other.status_filled;
        self.unchanged += other.unchanged;
        self.rejected += other.rejected;
    }
}

/// Build ids that still need a request: unknown, or known but pending.
///
/// Ids resolved through this evaluation are skipped from one query; the
/// rest may have been recorded through an earlier evaluation and are
/// looked up one by one.
pub fn work_set(store: &BuildStore, eval_id: u64, build_ids: &BTreeSet<u64>) -> NbResult<Vec<u64>> {
    let known_in_eval = store.known_build_ids(eval_id)?;
    debug!(
        "{} builds of evaluation {} already resolved",
        known_in_eval.len(),
        eval_id
    );

    let mut work = Vec::new();
    for &id in build_ids {
        if known_in_eval.contains(&id) || store.is_resolved(id)? {
            continue;
        }
        work.push(id);
    }
    Ok(work)
}

/// Ingest an evaluation, fetching only what the store cannot answer yet.
///
/// `observe` is called after every consumed outcome with the number done
/// so far and the size of the work set.
pub async fn ingest_evaluation(
    store: &mut BuildStore,
    pool: &BuildWorkerPool,
    ctx: FetchContext,
    build_ids: &BTreeSet<u64>,
    observe: impl FnMut(usize, usize),
) -> NbResult<IngestSummary> {
    let work = work_set(store, ctx.eval_id, build_ids)?;
    info!(
        "Evaluation {}: {} builds, {} to check",
        ctx.eval_id,
        build_ids.len(),
        work.len()
    );

    let mut summary = consume(store, pool, ctx, work, observe).await?;
    summary.total = build_ids.len();
    Ok(summary)
}

/// Refetch every pending build of a jobset through its own evaluation
pub async fn refresh_missing_status(
    store: &mut BuildStore,
    pool: &BuildWorkerPool,
    jobset_id: JobsetId,
    mut observe: impl FnMut(usize, usize),
) -> NbResult<IngestSummary> {
    let mut by_eval: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
    for record in store.builds_missing_status()? {
        if record.jobset_id == jobset_id {
            by_eval.entry(record.eval_id).or_default().push(record.id);
        }
    }

    let mut summary = IngestSummary::default();
    for (eval_id, ids) in by_eval {
        let ctx = FetchContext { jobset_id, eval_id };
        summary.total += ids.len();
        summary += consume(store, pool, ctx, ids, &mut observe).await?;
    }
    info!("Refreshed {} pending builds", summary.requested);
    Ok(summary)
}

/// Drain the pool, writing each record sequentially
async fn consume(
    store: &mut BuildStore,
    pool: &BuildWorkerPool,
    ctx: FetchContext,
    work: Vec<u64>,
    mut observe: impl FnMut(usize, usize),
) -> NbResult<IngestSummary> {
    let mut summary = IngestSummary {
        requested: work.len(),
        ..IngestSummary::default()
    };
    let expected = work.len();
    let mut done = 0;

    let mut run = pool.start(ctx, work);
    while let Some(outcome) = run.next().await {
        match outcome {
            BuildOutcome::Parsed(record) => match store.upsert_build_result(&record) {
                Ok(UpsertOutcome::Inserted) => summary.inserted += 1,
                Ok(UpsertOutcome::StatusFilled) => summary.status_filled += 1,
                Ok(UpsertOutcome::Unchanged) => summary.unchanged += 1,
                Err(e) if e.is_scoped() => {
                    warn!("Build {} rejected: {}", record.id, e);
                    summary.rejected += 1;
                }
                Err(e) => return Err(e),
            },
            BuildOutcome::Rejected { build_id, reason } => {
                match &reason {
                    Rejection::Fetch(e) => warn!("Build {} skipped: {}", build_id, e),
                    Rejection::Shape(e) => info!("Build {} skipped: {}", build_id, e),
                }
                summary.rejected += 1;
            }
        }
        done += 1;
        observe(done, expected);
    }
    run.join().await;

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::fake::FakeCi;
    use crate::platform::Platform;
    use crate::store::{BuildRecord, BuildStatus};
    use std::sync::Arc;

    fn setup() -> (BuildStore, FetchContext) {
        let mut store = BuildStore::in_memory().unwrap();
        let jobset_id = store
            .ensure_jobset("https://hydra.example.org", "nixpkgs/trunk")
            .unwrap();
        (store, FetchContext { jobset_id, eval_id: 100 })
    }

    fn resolved(id: u64, ctx: FetchContext) -> BuildRecord {
        BuildRecord {
            id,
            jobset_id: ctx.jobset_id,
            eval_id: ctx.eval_id,
            eval_timestamp: 10,
            status: Some(BuildStatus::SUCCESS),
            job: format!("pkg{}", id),
            system: Platform::X86_64Linux,
        }
    }

    fn ci_with_builds(ids: &[u64], status: Option<i64>) -> FakeCi {
        ids.iter().fold(FakeCi::new(), |ci, &id| {
            ci.with_build(id, &format!("pkg{}.x86_64-linux", id), "x86_64-linux", status, 10)
        })
    }

    #[tokio::test]
    async fn only_unresolved_builds_are_requested() {
        let (mut store, ctx) = setup();
        store.upsert_build_result(&resolved(1, ctx)).unwrap();
        store.upsert_build_result(&resolved(2, ctx)).unwrap();

        let ci = Arc::new(ci_with_builds(&[1, 2, 3], Some(0)));
        let pool = BuildWorkerPool::new(ci.clone(), 4);
        let ids = BTreeSet::from([1, 2, 3]);

        let summary = ingest_evaluation(&mut store, &pool, ctx, &ids, |_, _| {})
            .await
            .unwrap();

        assert_eq!(ci.calls(), vec!["/build/3".to_string()]);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.requested, 1);
        assert_eq!(summary.inserted, 1);
    }

    #[test]
    fn builds_resolved_through_an_earlier_evaluation_are_skipped() {
        let (mut store, ctx) = setup();
        let earlier = FetchContext { eval_id: 99, ..ctx };
        store.upsert_build_result(&resolved(1, earlier)).unwrap();
        store.upsert_build_result(&resolved(2, ctx)).unwrap();
        let mut pending = resolved(3, ctx);
        pending.status = None;
        store.upsert_build_result(&pending).unwrap();

        let work = work_set(&store, ctx.eval_id, &BTreeSet::from([1, 2, 3, 4])).unwrap();
        assert_eq!(work, vec![3, 4]);
    }

    #[tokio::test]
    async fn reingesting_is_a_no_op() {
        let (mut store, ctx) = setup();
        let ci = Arc::new(ci_with_builds(&[1, 2, 3, 4], Some(1)));
        let pool = BuildWorkerPool::new(ci.clone(), 2);
        let ids = BTreeSet::from([1, 2, 3, 4]);

        let first = ingest_evaluation(&mut store, &pool, ctx, &ids, |_, _| {})
            .await
            .unwrap();
        assert_eq!(first.inserted, 4);

        let before = store.counts().unwrap();
        let second = ingest_evaluation(&mut store, &pool, ctx, &ids, |_, _| {})
            .await
            .unwrap();
        assert_eq!(second.requested, 0);
        assert_eq!(second.inserted + second.status_filled, 0);
        assert_eq!(store.counts().unwrap(), before);
        assert_eq!(ci.calls().len(), 4);
    }

    #[tokio::test]
    async fn pending_builds_are_refetched_and_filled() {
        let (mut store, ctx) = setup();
        let mut pending = resolved(7, ctx);
        pending.status = None;
        store.upsert_build_result(&pending).unwrap();

        let ci = Arc::new(ci_with_builds(&[7], Some(0)));
        let pool = BuildWorkerPool::new(ci.clone(), 2);
        let ids = BTreeSet::from([7]);

        let summary = ingest_evaluation(&mut store, &pool, ctx, &ids, |_, _| {})
            .await
            .unwrap();
        assert_eq!(summary.status_filled, 1);
        assert_eq!(
            store.build_by_id(7).unwrap().unwrap().status,
            Some(BuildStatus::SUCCESS)
        );
    }

    #[tokio::test]
    async fn rejections_are_counted_and_skipped() {
        let (mut store, ctx) = setup();
        let ci = FakeCi::new()
            .with_build(1, "hello.x86_64-linux", "x86_64-linux", Some(0), 10)
            .with_build(2, "hello.riscv64-linux", "riscv64-linux", Some(0), 10)
            .failing("/build/3");
        let pool = BuildWorkerPool::new(Arc::new(ci), 3);

        let mut progress = Vec::new();
        let summary = ingest_evaluation(
            &mut store,
            &pool,
            ctx,
            &BTreeSet::from([1, 2, 3]),
            |done, total| progress.push((done, total)),
        )
        .await
        .unwrap();

        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.rejected, 2);
        assert_eq!(progress.last(), Some(&(3, 3)));
        assert_eq!(store.counts().unwrap().builds, 1);
    }

    #[tokio::test]
    async fn refresh_only_touches_pending_builds_of_the_jobset() {
        let (mut store, ctx) = setup();
        let other = store
            .ensure_jobset("https://hydra.example.org", "nixpkgs/staging")
            .unwrap();

        let mut pending = resolved(5, ctx);
        pending.status = None;
        store.upsert_build_result(&pending).unwrap();

        let mut foreign = resolved(6, ctx);
        foreign.status = None;
        foreign.jobset_id = other;
        store.upsert_build_result(&foreign).unwrap();

        store.upsert_build_result(&resolved(8, ctx)).unwrap();

        let ci = Arc::new(ci_with_builds(&[5, 6, 8], Some(2)));
        let pool = BuildWorkerPool::new(ci.clone(), 2);

        let summary = refresh_missing_status(&mut store, &pool, ctx.jobset_id, |_, _| {})
            .await
            .unwrap();

        assert_eq!(ci.calls(), vec!["/build/5".to_string()]);
        assert_eq!(summary.status_filled, 1);
        assert_eq!(store.build_by_id(6).unwrap().unwrap().status, None);
    }
}
