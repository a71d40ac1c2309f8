//! Error types for nixpkgs-broken
//!
//! All modules use `NbResult<T>` as their return type. Failures that are
//! scoped to a single build record or a single attribute are reported by the
//! batch drivers and never abort a run; see [`NbError::is_scoped`].

use crate::fetch::{FetchError, ShapeError};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for nixpkgs-broken operations
pub type NbResult<T> = Result<T, NbError>;

/// All errors that can occur in nixpkgs-broken
#[derive(Error, Debug)]
pub enum NbError {
    // CI service errors
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Unexpected build shape: {0}")]
    Shape(#[from] ShapeError),

    #[error("No evaluations found for jobset {jobset}")]
    NoEvaluations { jobset: String },

    #[error("Evaluation {0} not found in the evaluation list")]
    EvaluationNotListed(u64),

    #[error("No snapshot for {what} in {dir}")]
    SnapshotMissing { what: String, dir: PathBuf },

    // Store errors
    #[error("Invalid build record {build_id}: {reason}")]
    Validation { build_id: u64, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    // Annotation errors
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("{attr}: {reason}")]
    Denied { attr: String, reason: String },

    #[error("{attr}: cannot locate source: {reason}")]
    Resolution { attr: String, reason: String },

    #[error("{attr}: couldn't check meta.broken for {platform}: {reason}")]
    Evaluation {
        attr: String,
        platform: String,
        reason: String,
    },

    #[error("{attr}: {reason} ({file})")]
    AmbiguousDeclaration {
        attr: String,
        file: PathBuf,
        reason: String,
    },

    #[error("{attr}: no metadata block in {file}")]
    NoMetadataBlock { attr: String, file: PathBuf },

    #[error("{attr}: verification failed for {platform}, restored {file}: {reason}")]
    Verification {
        attr: String,
        platform: String,
        file: PathBuf,
        reason: String,
    },

    #[error("{attr}: {context}: {source}")]
    AttributeIo {
        attr: String,
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Configuration errors
    #[error("Invalid pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl NbError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create an IO error confined to one attribute's patch attempt
    pub fn attribute_io(attr: &str, context: impl Into<String>, source: std::io::Error) -> Self {
        Self::AttributeIo {
            attr: attr.to_string(),
            context: context.into(),
            source,
        }
    }

    /// Create a denied error for an attribute
    pub fn denied(attr: &str, reason: impl Into<String>) -> Self {
        Self::Denied {
            attr: attr.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the error only affects one record or one attribute.
    ///
    /// Batch drivers count scoped errors and carry on; anything else is fatal.
    pub fn is_scoped(&self) -> bool {
        matches!(
            self,
            Self::Fetch(_)
                | Self::Shape(_)
                | Self::Validation { .. }
                | Self::UnsupportedPlatform(_)
                | Self::Denied { .. }
                | Self::Resolution { .. }
                | Self::Evaluation { .. }
                | Self::AmbiguousDeclaration { .. }
                | Self::NoMetadataBlock { .. }
                | Self::Verification { .. }
                | Self::AttributeIo { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::SnapshotMissing { .. } => Some("Run `update` once without --use-cached"),
            Self::NoEvaluations { .. } => Some("Check --base-url and --jobset"),
            Self::CommandFailed { .. } => Some("Is nix-instantiate on PATH?"),
            Self::AmbiguousDeclaration { .. } => Some("Edit the broken declaration by hand"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = NbError::NoEvaluations {
            jobset: "nixpkgs/trunk".to_string(),
        };
        assert!(err.to_string().contains("nixpkgs/trunk"));
    }

    #[test]
    fn error_hint() {
        let err = NbError::SnapshotMissing {
            what: "evaluations".to_string(),
            dir: PathBuf::from("/tmp"),
        };
        assert!(err.hint().unwrap().contains("--use-cached"));
    }

    #[test]
    fn error_scoped() {
        assert!(NbError::denied("python27Packages.foo", "denied").is_scoped());
        assert!(!NbError::Internal("boom".to_string()).is_scoped());

        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert!(NbError::attribute_io("hello", "reading default.nix", denied).is_scoped());
        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert!(!NbError::io("restoring default.nix", denied).is_scoped());
    }
}
