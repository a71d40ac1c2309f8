//! Evaluator double that reads `broken = …;` straight from the files it resolves

use crate::patch::evaluator::{EvalError, Evaluator};
use crate::patch::metadata::is_broken_declaration;
use crate::platform::{Arch, Os, Platform};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub(crate) struct FakeEvaluator {
    files: HashMap<String, PathBuf>,
    never_broken: HashSet<Platform>,
    failing_when_marked: HashSet<Platform>,
    calls: Mutex<Vec<String>>,
}

impl FakeEvaluator {
    pub(crate) fn new() -> Self {
        Self {
            files: HashMap::new(),
            never_broken: HashSet::new(),
            failing_when_marked: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_attr(mut self, attr: &str, file: &Path) -> Self {
        self.files.insert(attr.to_string(), file.to_path_buf());
        self
    }

    /// `meta.broken` reads false on `platform` whatever the file says
    pub(crate) fn never_broken_on(mut self, platform: Platform) -> Self {
        self.never_broken.insert(platform);
        self
    }

    /// Evaluation errors on `platform` once the file carries a declaration
    pub(crate) fn failing_after_edit(mut self, platform: Platform) -> Self {
        self.failing_when_marked.insert(platform);
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn file_of(&self, attr: &str) -> Result<&PathBuf, EvalError> {
        self.files
            .get(attr)
            .ok_or_else(|| EvalError::Failed(format!("attribute '{}' missing", attr)))
    }
}

#[async_trait]
impl Evaluator for FakeEvaluator {
    async fn resolve_file(&self, attribute: &str) -> Result<PathBuf, EvalError> {
        self.calls.lock().unwrap().push(format!("resolve {}", attribute));
        self.file_of(attribute).cloned()
    }

    async fn evaluate(
        &self,
        expression: &str,
        platform: Option<Platform>,
    ) -> Result<Value, EvalError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("eval {} {:?}", expression, platform));

        let attr = expression
            .strip_suffix(".meta.broken")
            .ok_or_else(|| EvalError::Failed(format!("cannot evaluate {}", expression)))?;
        let platform = platform.ok_or_else(|| EvalError::Failed("no platform".to_string()))?;
        let text = std::fs::read_to_string(self.file_of(attr)?)
            .map_err(|e| EvalError::Failed(e.to_string()))?;

        let declared = text
            .lines()
            .find(|line| is_broken_declaration(line))
            .and_then(|line| line.split_once('='))
            .map(|(_, rhs)| rhs.trim().trim_end_matches(';').to_string());

        if declared.is_some() && self.failing_when_marked.contains(&platform) {
            return Err(EvalError::Failed("infinite recursion encountered".to_string()));
        }
        if self.never_broken.contains(&platform) {
            return Ok(Value::Bool(false));
        }
        Ok(Value::Bool(
            declared.is_some_and(|expr| holds(&expr, platform)),
        ))
    }
}

fn holds(expression: &str, platform: Platform) -> bool {
    expression.split("||").any(|term| {
        term.trim()
            .trim_start_matches('(')
            .trim_end_matches(')')
            .split("&&")
            .all(|predicate| predicate_holds(predicate.trim(), platform))
    })
}

fn predicate_holds(predicate: &str, platform: Platform) -> bool {
    match predicate {
        "true" => true,
        "stdenv.hostPlatform.isLinux" => platform.os() == Os::Linux,
        "stdenv.hostPlatform.isDarwin" => platform.os() == Os::Darwin,
        "stdenv.hostPlatform.isAarch64" => platform.arch() == Arch::Aarch64,
        "stdenv.hostPlatform.isx86_64" => platform.arch() == Arch::X86_64,
        _ => false,
    }
}
