//! Bounded worker pool for per-build fetches
//!
//! Workers share one work channel and one result channel. Each worker is
//! handed exactly one stop sentinel and answers with exactly one exit
//! sentinel; the consumer counts exit sentinels to know when draining is
//! complete.

use crate::fetch::client::{CiService, FetchError};
use crate::fetch::parse::{parse_build, ShapeError};
use crate::fetch::FetchContext;
use crate::store::BuildRecord;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

/// Why a build id produced no record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Fetch(FetchError),
    Shape(ShapeError),
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fetch(e) => write!(f, "{}", e),
            Self::Shape(e) => write!(f, "{}", e),
        }
    }
}

/// Result of fetching one build
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Parsed(BuildRecord),
    Rejected { build_id: u64, reason: Rejection },
}

enum WorkItem {
    Build(u64),
    Stop,
}

enum PoolMessage {
    Outcome(BuildOutcome),
    WorkerExited,
}

/// Fixed-size pool of fetch workers
pub struct BuildWorkerPool {
    client: Arc<dyn CiService>,
    concurrency: usize,
}

impl BuildWorkerPool {
    pub fn new(client: Arc<dyn CiService>, concurrency: usize) -> Self {
        Self {
            client,
            concurrency: concurrency.max(1),
        }
    }

    pub fn client(&self) -> &dyn CiService {
        &*self.client
    }

    /// Start fetching `build_ids`; drain the returned run for outcomes
    pub fn start(&self, ctx: FetchContext, build_ids: Vec<u64>) -> PoolRun {
        let workers = self.concurrency.min(build_ids.len());
        let (work_tx, work_rx) = unbounded_channel();
        let (result_tx, result_rx) = unbounded_channel();
        let work_rx = Arc::new(Mutex::new(work_rx));

        let handles = (0..workers)
            .map(|worker| {
                tokio::spawn(build_worker(
                    worker,
                    Arc::clone(&self.client),
                    ctx,
                    Arc::clone(&work_rx),
                    result_tx.clone(),
                ))
            })
            .collect();
        drop(result_tx);

        // The receiver is alive in every worker until its stop sentinel, so
        // these sends cannot fail.
        for id in build_ids {
            let _ = work_tx.send(WorkItem::Build(id));
        }
        for _ in 0..workers {
            let _ = work_tx.send(WorkItem::Stop);
        }

        debug!("Started {} fetch workers for evaluation {}", workers, ctx.eval_id);
        PoolRun {
            results: result_rx,
            workers,
            exited: 0,
            handles,
        }
    }

    /// Fetch everything and collect the outcomes
    pub async fn run(&self, ctx: FetchContext, build_ids: Vec<u64>) -> Vec<BuildOutcome> {
        let mut run = self.start(ctx, build_ids);
        let mut outcomes = Vec::new();
        while let Some(outcome) = run.next().await {
            outcomes.push(outcome);
        }
        run.join().await;
        outcomes
    }
}

/// Consumer side of a running pool
pub struct PoolRun {
    results: UnboundedReceiver<PoolMessage>,
    workers: usize,
    exited: usize,
    handles: Vec<JoinHandle<()>>,
}

impl PoolRun {
    /// Next outcome, or `None` once every worker has exited
    pub async fn next(&mut self) -> Option<BuildOutcome> {
        while self.exited < self.workers {
            match self.results.recv().await {
                Some(PoolMessage::Outcome(outcome)) => return Some(outcome),
                Some(PoolMessage::WorkerExited) => self.exited += 1,
                // Every sender is gone: a worker died without its sentinel.
                None => break,
            }
        }
        None
    }

    /// Wait for all worker tasks to finish
    pub async fn join(self) {
        for result in futures_util::future::join_all(self.handles).await {
            if let Err(e) = result {
                tracing::warn!("Fetch worker ended abnormally: {}", e);
            }
        }
    }
}

async fn build_worker(
    worker: usize,
    client: Arc<dyn CiService>,
    ctx: FetchContext,
    work: Arc<Mutex<UnboundedReceiver<WorkItem>>>,
    results: UnboundedSender<PoolMessage>,
) {
    loop {
        let item = work.lock().await.recv().await;
        match item {
            Some(WorkItem::Build(build_id)) => {
                let outcome = fetch_build(&*client, build_id, &ctx).await;
                if results.send(PoolMessage::Outcome(outcome)).is_err() {
                    break;
                }
            }
            Some(WorkItem::Stop) | None => break,
        }
    }
    debug!("Fetch worker {} exiting", worker);
    let _ = results.send(PoolMessage::WorkerExited);
}

/// Fetch and parse one build; never fails, only rejects
pub async fn fetch_build(client: &dyn CiService, build_id: u64, ctx: &FetchContext) -> BuildOutcome {
    let value = match client.get_json(&format!("/build/{}", build_id)).await {
        Ok(value) => value,
        Err(e) => {
            return BuildOutcome::Rejected {
                build_id,
                reason: Rejection::Fetch(e),
            }
        }
    };

    match parse_build(build_id, &value, ctx) {
        Ok(record) => BuildOutcome::Parsed(record),
        Err(e) => BuildOutcome::Rejected {
            build_id,
            reason: Rejection::Shape(e),
        },
    }
}
