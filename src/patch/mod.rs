//! `meta.broken` annotation of package source files

pub mod evaluator;
pub mod expression;
pub mod metadata;
pub mod patcher;

#[cfg(test)]
pub(crate) mod fake;

pub use evaluator::{validate_attribute, EvalError, Evaluator, NixEvaluator};
pub use expression::broken_expression;
pub use patcher::{AnnotationPatcher, MarkSummary, PatchOutcome, PatchRules, PatchState};

use crate::error::NbResult;
use crate::platform::Platform;
use std::collections::BTreeSet;

/// Parse platform identifiers, failing on the first unsupported one
pub fn parse_platforms<S: AsRef<str>>(names: &[S]) -> NbResult<BTreeSet<Platform>> {
    names.iter().map(|name| name.as_ref().parse()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NbError;

    #[test]
    fn parses_and_deduplicates() {
        let set = parse_platforms(&["x86_64-linux", "aarch64-darwin", "x86_64-linux"]).unwrap();
        assert_eq!(set, BTreeSet::from([Platform::Aarch64Darwin, Platform::X86_64Linux]));
    }

    #[test]
    fn unsupported_platform_fails() {
        let err = parse_platforms(&["x86_64-linux", "riscv64-linux"]).unwrap_err();
        assert!(matches!(err, NbError::UnsupportedPlatform(ref p) if p == "riscv64-linux"));
    }
}
