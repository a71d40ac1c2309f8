//! Update command - ingest an evaluation's build results

use super::{hydra_client, open_store};
use crate::cli::args::UpdateArgs;
use crate::config::Config;
use crate::error::{NbError, NbResult};
use crate::fetch::{
    ingest_evaluation, refresh_missing_status, select_evaluation, BuildListFetcher,
    BuildWorkerPool, CiService, EvalFetcher, FetchContext, FetchMode, IngestSummary,
    SnapshotCache,
};
use crate::ui::{self, IngestProgress, TaskSpinner, UiContext};
use std::sync::Arc;

/// Execute the update command
pub async fn execute(args: UpdateArgs, config: &Config) -> NbResult<()> {
    let ctx = UiContext::detect();
    let concurrency = args.concurrency.unwrap_or(config.ci.concurrency);
    if concurrency == 0 {
        return Err(NbError::User("--concurrency must be at least 1".to_string()));
    }

    ui::banner(
        &ctx,
        &format!("Updating {} from {}", config.ci.jobset, config.ci.base_url),
    );

    let client: Arc<dyn CiService> = Arc::new(hydra_client(config));
    let (mut store, jobset_id) = open_store(config)?;
    let pool = BuildWorkerPool::new(Arc::clone(&client), concurrency);

    let summary = if args.missing_status {
        let progress = IngestProgress::new(&ctx, "Pending builds");
        let result = refresh_missing_status(&mut store, &pool, jobset_id, |done, total| {
            progress.update(done, total)
        })
        .await;
        progress.finish();
        result?
    } else {
        let mode = if args.use_cached {
            FetchMode::Cached
        } else {
            FetchMode::Live
        };
        let snapshots = SnapshotCache::new(&config.snapshot.dir);
        let mut spinner = TaskSpinner::new(&ctx);

        spinner.start("Fetching evaluations...");
        let evals = EvalFetcher::new(client.as_ref(), &snapshots)
            .fetch(&config.ci.jobset, mode)
            .await
            .inspect_err(|_| spinner.stop_error("Could not list evaluations"))?;
        let eval = select_evaluation(&evals, &config.ci.jobset, args.eval)
            .inspect_err(|_| spinner.stop_error("No usable evaluation"))?;
        spinner.stop(&format!("Using evaluation {}", eval.id));

        spinner.start("Fetching build list...");
        let build_ids = BuildListFetcher::new(client.as_ref(), &snapshots)
            .fetch(eval.id, mode)
            .await
            .inspect_err(|_| spinner.stop_error("Could not fetch the build list"))?;
        spinner.stop(&format!("{} builds in evaluation {}", build_ids.len(), eval.id));

        let fetch_ctx = FetchContext {
            jobset_id,
            eval_id: eval.id,
        };
        let progress = IngestProgress::new(&ctx, "Builds");
        let result = ingest_evaluation(&mut store, &pool, fetch_ctx, &build_ids, |done, total| {
            progress.update(done, total)
        })
        .await;
        progress.finish();
        result?
    };

    print_summary(&ctx, &summary);

    let problem = (summary.rejected > 0).then(|| {
        format!("{} builds could not be recorded (run with -v for details)", summary.rejected)
    });
    ui::conclude(&ctx, problem.as_deref(), "Build database up to date");
    Ok(())
}

fn print_summary(ctx: &UiContext, summary: &IngestSummary) {
    ui::heading(ctx, "Ingestion");
    ui::tally(
        ctx,
        &[
            ("builds", summary.total),
            ("requested", summary.requested),
            ("inserted", summary.inserted),
            ("status filled", summary.status_filled),
            ("unchanged", summary.unchanged),
            ("rejected", summary.rejected),
        ],
    );
}
