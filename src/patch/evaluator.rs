//! Evaluator seam: attribute resolution and expression evaluation
//!
//! [`NixEvaluator`] shells out to `nix-instantiate` inside the package tree.

use crate::error::{NbError, NbResult};
use crate::platform::Platform;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

const NIX_INSTANTIATE: &str = "nix-instantiate";

/// Why an evaluator request failed
#[derive(Error, Debug)]
pub enum EvalError {
    /// The evaluator could not be started at all
    #[error("could not run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The evaluator ran and reported an error
    #[error("{0}")]
    Failed(String),

    #[error("unexpected evaluator output: {0}")]
    Decode(String),
}

impl EvalError {
    /// Convert to the batch-fatal error when the evaluator is unusable,
    /// or to the attribute-scoped error built by `scoped` otherwise.
    pub fn into_nb(self, scoped: impl FnOnce(String) -> NbError) -> NbError {
        match self {
            Self::Spawn { program, source } => NbError::command_failed(program, source),
            other => scoped(other.to_string()),
        }
    }
}

/// Black-box oracle over the package tree
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Source file declaring the attribute's metadata
    async fn resolve_file(&self, attribute: &str) -> Result<PathBuf, EvalError>;

    /// Evaluate `expression` against the tree, optionally for a target platform
    async fn evaluate(
        &self,
        expression: &str,
        platform: Option<Platform>,
    ) -> Result<Value, EvalError>;
}

/// Reject attribute names that are unsafe to splice into an expression
pub fn validate_attribute(attribute: &str) -> NbResult<()> {
    let valid_chars = attribute
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '\'' | '.'));
    let well_formed = !attribute.is_empty()
        && !attribute.starts_with('.')
        && !attribute.ends_with('.')
        && !attribute.contains("..");

    if valid_chars && well_formed {
        Ok(())
    } else {
        Err(NbError::denied(attribute, "not a plain attribute path"))
    }
}

/// `nix-instantiate --eval` in a nixpkgs checkout
pub struct NixEvaluator {
    root: PathBuf,
}

impl NixEvaluator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn instantiate(&self, expression: &str) -> Result<Value, EvalError> {
        debug!("Evaluating in {}: {}", self.root.display(), expression);

        let output = Command::new(NIX_INSTANTIATE)
            .args(["--eval", "--json", "-E", expression])
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| EvalError::Spawn {
                program: NIX_INSTANTIATE.to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EvalError::Failed(diagnostic(&stderr)));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| EvalError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Evaluator for NixEvaluator {
    async fn resolve_file(&self, attribute: &str) -> Result<PathBuf, EvalError> {
        let expression = format!(
            "with import ./. {{}}; (builtins.unsafeGetAttrPos \"description\" {}.meta).file",
            attribute
        );
        match self.instantiate(&expression).await? {
            Value::String(file) => Ok(PathBuf::from(file)),
            other => Err(EvalError::Decode(format!("expected a path, got {}", other))),
        }
    }

    async fn evaluate(
        &self,
        expression: &str,
        platform: Option<Platform>,
    ) -> Result<Value, EvalError> {
        let expression = match platform {
            Some(platform) => format!(
                "with import ./. {{ localSystem = \"{}\"; }}; {}",
                platform, expression
            ),
            None => format!("with import ./. {{}}; {}", expression),
        };
        self.instantiate(&expression).await
    }
}

/// First meaningful line of evaluator stderr
fn diagnostic(stderr: &str) -> String {
    stderr
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && *line != "error:")
        .unwrap_or("evaluation failed")
        .to_string()
}
