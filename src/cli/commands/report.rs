//! Report command - show stored build health and broken packages

use super::{detect_broken, open_store};
use crate::cli::args::{OutputFormat, ReportArgs};
use crate::config::Config;
use crate::detect::{BreakageKind, BrokenReport};
use crate::error::NbResult;
use crate::store::StoreCounts;
use crate::ui::{self, Tone, UiContext};
use chrono::DateTime;
use console::style;

/// Execute the report command
pub async fn execute(args: ReportArgs, config: &Config) -> NbResult<()> {
    let (mut store, jobset_id) = open_store(config)?;
    let kind = BreakageKind::from(args.kind);
    let mut report = detect_broken(config, &mut store, jobset_id).await?;
    report.retain_kind(kind);

    match args.format {
        OutputFormat::Table => print_table(config, &store.counts()?, &report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Plain => {
            for (attr, platforms) in report.marking_plan(kind) {
                for platform in platforms {
                    println!("{}.{}", attr, platform);
                }
            }
        }
    }

    Ok(())
}

fn print_table(config: &Config, counts: &StoreCounts, report: &BrokenReport) {
    let ctx = UiContext::detect();

    ui::heading(&ctx, &format!("{} on {}", config.ci.jobset, config.ci.base_url));
    ui::tally(
        &ctx,
        &[
            ("jobsets", counts.jobsets),
            ("builds", counts.builds),
            ("pending", counts.pending),
        ],
    );

    if report.regressed.is_empty() && report.never_successful.is_empty() {
        println!();
        ui::step(&ctx, Tone::Ok, "No broken packages");
    }

    if !report.regressed.is_empty() {
        ui::heading(&ctx, &format!("Regressed ({})", report.regressed.len()));
        for r in &report.regressed {
            println!(
                "  {:<50} {:<15} {} {}",
                r.job,
                r.system.to_string(),
                style(r.status.describe()).red(),
                style(format!(
                    "last success {} (build {})",
                    format_day(r.last_success_timestamp),
                    r.last_success_build
                ))
                .dim()
            );
        }
    }

    if !report.never_successful.is_empty() {
        ui::heading(
            &ctx,
            &format!("Never successful ({})", report.never_successful.len()),
        );
        for n in &report.never_successful {
            println!(
                "  {:<50} {:<15} {} {}",
                n.job,
                n.system.to_string(),
                style(n.status.describe()).red(),
                style(format!("build {}", n.build_id)).dim()
            );
        }
    }

    if report.skipped > 0 {
        println!();
        ui::step_detail(
            &ctx,
            Tone::Warn,
            &format!("{} pairs skipped", report.skipped),
            "the CI service did not answer for their last success",
        );
    }
}

fn format_day(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn days_from_unix_time() {
        assert_eq!(format_day(0), "1970-01-01");
        assert_eq!(format_day(1_700_000_000), "2023-11-14");
        assert_eq!(format_day(i64::MAX), i64::MAX.to_string());
    }
}
