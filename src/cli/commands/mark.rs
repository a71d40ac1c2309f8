//! Mark command - annotate every broken package in a nixpkgs checkout

use super::{detect_broken, nixpkgs_root, open_store, show_attempt};
use crate::cli::args::MarkArgs;
use crate::config::Config;
use crate::detect::BreakageKind;
use crate::error::NbResult;
use crate::patch::{AnnotationPatcher, NixEvaluator};
use crate::platform::Platform;
use crate::ui::{self, Tone, UiContext};
use std::collections::BTreeSet;

/// Execute the mark command
pub async fn execute(args: MarkArgs, config: &Config) -> NbResult<()> {
    let ctx = UiContext::detect();
    let root = if args.dry_run {
        None
    } else {
        Some(nixpkgs_root(args.nixpkgs, config)?)
    };

    let (mut store, jobset_id) = open_store(config)?;
    let report = detect_broken(config, &mut store, jobset_id).await?;
    let plan = report.marking_plan(BreakageKind::from(args.kind));

    if plan.is_empty() {
        ui::step(&ctx, Tone::Ok, "No broken packages to mark");
        return Ok(());
    }

    let Some(root) = root else {
        ui::heading(&ctx, &format!("Would mark {} attributes", plan.len()));
        for (attr, platforms) in &plan {
            println!("  {} {}", attr, platform_list(platforms));
        }
        return Ok(());
    };

    ui::banner(
        &ctx,
        &format!("Marking {} attributes in {}", plan.len(), root.display()),
    );

    let evaluator = NixEvaluator::new(root);
    let mut patcher = AnnotationPatcher::new(&evaluator, &mut store, &config.patch.rules);
    let summary = patcher
        .mark_all(&plan, args.comment.as_deref(), |attr, result| {
            show_attempt(&ctx, attr, result)
        })
        .await?;

    ui::heading(&ctx, "Summary");
    ui::tally(
        &ctx,
        &[
            ("marked", summary.committed),
            ("already marked", summary.already_marked),
            ("failed", summary.failed),
        ],
    );

    let problem = (summary.failed > 0)
        .then(|| format!("{} attributes could not be marked", summary.failed));
    ui::conclude(&ctx, problem.as_deref(), "Done");
    Ok(())
}

fn platform_list(platforms: &BTreeSet<Platform>) -> String {
    platforms
        .iter()
        .map(Platform::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
