//! Attribute exclusion rules
//!
//! Patterns are glob-like and match anywhere in the attribute name, so
//! `tests.` excludes `nixosTests.tests.foo` as well as `tests.foo`.

use crate::error::{NbError, NbResult};
use globset::{Glob, GlobSet, GlobSetBuilder};

/// Compiled exclusion pattern list
#[derive(Debug, Clone)]
pub struct ExclusionRules {
    set: GlobSet,
    patterns: Vec<String>,
}

impl ExclusionRules {
    pub fn new(patterns: &[String]) -> NbResult<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(&format!("*{}*", pattern)).map_err(|e| NbError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|e| NbError::InvalidPattern {
            pattern: patterns.join(", "),
            reason: e.to_string(),
        })?;

        Ok(Self {
            set,
            patterns: patterns.to_vec(),
        })
    }

    /// Rules that exclude nothing
    pub fn none() -> Self {
        Self {
            set: GlobSet::empty(),
            patterns: Vec::new(),
        }
    }

    pub fn is_excluded(&self, attribute: &str) -> bool {
        self.set.is_match(attribute)
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}
