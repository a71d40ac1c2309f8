//! Mark-attr command - annotate one attribute

use super::{nixpkgs_root, open_store, show_attempt};
use crate::cli::args::MarkAttrArgs;
use crate::config::Config;
use crate::error::NbResult;
use crate::patch::{parse_platforms, AnnotationPatcher, NixEvaluator};
use crate::ui::UiContext;

/// Execute the mark-attr command
pub async fn execute(args: MarkAttrArgs, config: &Config) -> NbResult<()> {
    let platforms = parse_platforms(&args.platforms)?;
    let root = nixpkgs_root(args.nixpkgs, config)?;
    let (mut store, _) = open_store(config)?;

    let evaluator = NixEvaluator::new(root);
    let outcome = AnnotationPatcher::new(&evaluator, &mut store, &config.patch.rules)
        .mark(&args.attr, &platforms, args.comment.as_deref())
        .await;

    if outcome.is_ok() {
        show_attempt(&UiContext::detect(), &args.attr, &outcome);
    }
    outcome.map(|_| ())
}
