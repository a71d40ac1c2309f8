//! Transactional `meta.broken` annotation of a single attribute
//!
//! An attempt moves through Resolving, Validating, Editing and Verifying and
//! ends Committed, RolledBack or Rejected. The target file either ends up
//! exactly as staged and verified, or byte-identical to what it was.

use crate::error::{NbError, NbResult};
use crate::patch::evaluator::{validate_attribute, EvalError, Evaluator};
use crate::patch::expression::broken_expression;
use crate::patch::metadata::{self, LayoutError, Markers};
use crate::platform::Platform;
use crate::store::BuildStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Deny-lists and markers driving the patcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchRules {
    /// Line marker opening the metadata block
    pub start_marker: String,

    /// Marker the block's closing line must carry
    pub end_marker: String,

    /// Attribute substrings never patched (shared package-set files)
    pub deny_attrs: Vec<String>,

    /// File basename substrings never patched (generated files)
    pub deny_files: Vec<String>,

    /// Substrings marking an existing declaration as more than platform-only
    pub complex_markers: Vec<String>,
}

impl Default for PatchRules {
    fn default() -> Self {
        fn strings(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }

        Self {
            start_marker: "meta =".to_string(),
            end_marker: "};".to_string(),
            deny_attrs: strings(&[
                "python27Packages",
                "python39Packages",
                "python310Packages",
                "linuxPackages_",
                "rubyPackages_",
            ]),
            deny_files: strings(&["node-packages.nix", "generic-builder.nix"]),
            complex_markers: strings(&[
                "Static",
                "targetPlatform",
                "is32bit",
                "kernel",
                "with",
                "version",
                "meta",
                "python",
                "Support",
            ]),
        }
    }
}

/// Where an annotation attempt is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchState {
    Resolving,
    Validating,
    Editing,
    Verifying,
    Committed,
    RolledBack,
    Rejected,
}

impl fmt::Display for PatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Resolving => "resolving",
            Self::Validating => "validating",
            Self::Editing => "editing",
            Self::Verifying => "verifying",
            Self::Committed => "committed",
            Self::RolledBack => "rolled back",
            Self::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// Successful end of an attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    Committed { file: PathBuf, expression: String },
    /// Every requested platform already evaluates as broken; nothing written
    AlreadyMarked,
}

/// Counts from a batch of attempts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkSummary {
    pub committed: usize,
    pub already_marked: usize,
    pub failed: usize,
}

/// Rewrites metadata blocks, checked against an [`Evaluator`]
pub struct AnnotationPatcher<'a> {
    evaluator: &'a dyn Evaluator,
    store: &'a mut BuildStore,
    rules: &'a PatchRules,
}

impl<'a> AnnotationPatcher<'a> {
    pub fn new(evaluator: &'a dyn Evaluator, store: &'a mut BuildStore, rules: &'a PatchRules) -> Self {
        Self {
            evaluator,
            store,
            rules,
        }
    }

    /// Mark `attr` broken on `platforms`, keeping platforms already marked
    pub async fn mark(
        &mut self,
        attr: &str,
        platforms: &BTreeSet<Platform>,
        comment: Option<&str>,
    ) -> NbResult<PatchOutcome> {
        let result = self.attempt(attr, platforms, comment).await;
        match &result {
            Ok(PatchOutcome::Committed { .. }) => trace_state(attr, PatchState::Committed),
            Ok(PatchOutcome::AlreadyMarked) => {}
            Err(NbError::Verification { .. }) => trace_state(attr, PatchState::RolledBack),
            Err(_) => trace_state(attr, PatchState::Rejected),
        }
        result
    }

    /// Mark every attribute of `plan`, counting scoped failures.
    ///
    /// `observe` sees each attempt's result; a fatal error stops the batch.
    pub async fn mark_all(
        &mut self,
        plan: &BTreeMap<String, BTreeSet<Platform>>,
        comment: Option<&str>,
        mut observe: impl FnMut(&str, &NbResult<PatchOutcome>),
    ) -> NbResult<MarkSummary> {
        let mut summary = MarkSummary::default();
        for (attr, platforms) in plan {
            let result = self.mark(attr, platforms, comment).await;
            observe(attr, &result);
            match result {
                Ok(PatchOutcome::Committed { .. }) => summary.committed += 1,
                Ok(PatchOutcome::AlreadyMarked) => summary.already_marked += 1,
                Err(e) if e.is_scoped() => {
                    warn!("{}", e);
                    summary.failed += 1;
                }
                Err(e) => return Err(e),
            }
        }
        info!(
            "Marked {} attributes, {} already marked, {} failed",
            summary.committed, summary.already_marked, summary.failed
        );
        Ok(summary)
    }

    async fn attempt(
        &mut self,
        attr: &str,
        platforms: &BTreeSet<Platform>,
        comment: Option<&str>,
    ) -> NbResult<PatchOutcome> {
        trace_state(attr, PatchState::Resolving);
        if platforms.is_empty() {
            return Err(NbError::denied(attr, "no platforms requested"));
        }
        if comment.is_some_and(|c| c.contains(['\n', '\r'])) {
            return Err(NbError::denied(attr, "comment must fit on one line"));
        }
        validate_attribute(attr)?;
        if let Some(entry) = self.rules.deny_attrs.iter().find(|d| attr.contains(d.as_str())) {
            return Err(NbError::denied(attr, format!("attribute matches {}, skipped", entry)));
        }
        let file = self.resolve(attr).await?;
        self.check_file_allowed(attr, &file)?;

        trace_state(attr, PatchState::Validating);
        let original = fs::read_to_string(&file)
            .map_err(|e| NbError::attribute_io(attr, format!("reading {}", file.display()), e))?;
        let markers = Markers {
            start: &self.rules.start_marker,
            end: &self.rules.end_marker,
            complex: &self.rules.complex_markers,
        };
        let layout = metadata::scan(&original, &markers).map_err(|e| layout_error(attr, &file, e))?;

        let already = self.already_marked(attr).await?;
        if platforms.is_subset(&already) {
            info!("{} is already marked broken for {:?}", attr, already);
            return Ok(PatchOutcome::AlreadyMarked);
        }
        let target: BTreeSet<Platform> = platforms.union(&already).copied().collect();

        trace_state(attr, PatchState::Editing);
        let expression = broken_expression(&target);
        let staged = metadata::rewrite(&original, &layout, &expression, comment);
        if staged == original {
            return Err(NbError::NoMetadataBlock {
                attr: attr.to_string(),
                file,
            });
        }
        let backup = backup_path(&file);
        fs::copy(&file, &backup)
            .map_err(|e| NbError::attribute_io(attr, format!("backing up {}", file.display()), e))?;
        if let Err(e) = fs::write(&file, &staged) {
            restore(&file, &backup)?;
            return Err(NbError::attribute_io(attr, format!("writing {}", file.display()), e));
        }

        trace_state(attr, PatchState::Verifying);
        if let Err(e) = self.verify(attr, &target, &file).await {
            restore(&file, &backup)?;
            return Err(e);
        }

        fs::remove_file(&backup)
            .map_err(|e| NbError::attribute_io(attr, format!("removing {}", backup.display()), e))?;
        info!("{}: broken = {} ({})", attr, expression, file.display());
        Ok(PatchOutcome::Committed { file, expression })
    }

    /// Source file for `attr`, from the cache when the cached path still exists
    async fn resolve(&mut self, attr: &str) -> NbResult<PathBuf> {
        let cached = self.store.cached_attr_file(attr)?;
        if let Some(path) = &cached {
            if path.is_file() {
                debug!("{}: cached file {}", attr, path.display());
                return Ok(path.clone());
            }
            debug!("{}: cached file {} is gone", attr, path.display());
        }

        let file = self.evaluator.resolve_file(attr).await.map_err(|e| {
            e.into_nb(|reason| NbError::Resolution {
                attr: attr.to_string(),
                reason,
            })
        })?;

        if cached.as_deref() != Some(file.as_path()) {
            self.store.record_attr_file(attr, &file)?;
        }
        Ok(file)
    }

    fn check_file_allowed(&self, attr: &str, file: &Path) -> NbResult<()> {
        let basename = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match self.rules.deny_files.iter().find(|d| basename.contains(d.as_str())) {
            Some(entry) => Err(NbError::denied(attr, format!("file matches {}, skipped", entry))),
            None => Ok(()),
        }
    }

    /// Platforms on which `attr.meta.broken` is already true
    async fn already_marked(&self, attr: &str) -> NbResult<BTreeSet<Platform>> {
        let mut marked = BTreeSet::new();
        for &platform in Platform::all() {
            let value = self.broken_on(attr, platform).await.map_err(|e| {
                e.into_nb(|reason| NbError::Evaluation {
                    attr: attr.to_string(),
                    platform: platform.to_string(),
                    reason,
                })
            })?;
            match value {
                Value::Bool(true) => {
                    marked.insert(platform);
                }
                Value::Bool(false) => {}
                other => {
                    return Err(NbError::Evaluation {
                        attr: attr.to_string(),
                        platform: platform.to_string(),
                        reason: format!("meta.broken is {}", other),
                    })
                }
            }
        }
        Ok(marked)
    }

    async fn verify(&self, attr: &str, target: &BTreeSet<Platform>, file: &Path) -> NbResult<()> {
        for &platform in target {
            let failure = |reason: String| NbError::Verification {
                attr: attr.to_string(),
                platform: platform.to_string(),
                file: file.to_path_buf(),
                reason,
            };
            match self.broken_on(attr, platform).await {
                Ok(Value::Bool(true)) => debug!("{}: broken on {}", attr, platform),
                Ok(other) => return Err(failure(format!("meta.broken evaluates to {}", other))),
                Err(e) => return Err(e.into_nb(failure)),
            }
        }
        Ok(())
    }

    async fn broken_on(&self, attr: &str, platform: Platform) -> Result<Value, EvalError> {
        self.evaluator
            .evaluate(&format!("{}.meta.broken", attr), Some(platform))
            .await
    }
}

fn trace_state(attr: &str, state: PatchState) {
    debug!("{}: {}", attr, state);
}

fn layout_error(attr: &str, file: &Path, e: LayoutError) -> NbError {
    if e.is_missing_block() {
        NbError::NoMetadataBlock {
            attr: attr.to_string(),
            file: file.to_path_buf(),
        }
    } else {
        NbError::AmbiguousDeclaration {
            attr: attr.to_string(),
            file: file.to_path_buf(),
            reason: e.to_string(),
        }
    }
}

/// Sibling `<file>.bak`
pub fn backup_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

fn restore(file: &Path, backup: &Path) -> NbResult<()> {
    fs::rename(backup, file).map_err(|e| NbError::io(format!("restoring {}", file.display()), e))
}
