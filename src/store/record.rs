//! Persisted entities: jobsets, build results and their status codes

use crate::error::{NbError, NbResult};
use crate::platform::Platform;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Surrogate key of a (base URL, jobset name) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobsetId(pub i64);

impl fmt::Display for JobsetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Finished build status as reported by the CI service
///
/// A build that has not finished yet has no status at all (`None`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildStatus(pub i64);

impl BuildStatus {
    pub const SUCCESS: Self = Self(0);
    pub const FAILED: Self = Self(1);
    pub const DEPENDENCY_FAILED: Self = Self(2);

    pub fn code(&self) -> i64 {
        self.0
    }

    pub fn is_success(&self) -> bool {
        *self == Self::SUCCESS
    }

    /// Human-readable description of the status code
    pub fn describe(&self) -> String {
        let text = match self.0 {
            0 => "succeeded",
            1 => "failed",
            2 => "dependency failed",
            3 | 9 => "aborted",
            4 => "cancelled",
            6 => "failed with output",
            7 => "timed out",
            10 => "log limit exceeded",
            11 => "output limit exceeded",
            other => return format!("unknown ({})", other),
        };
        text.to_string()
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One build of one (job, system) pair in one evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    /// Remote build id, unique per CI instance
    pub id: u64,

    /// Jobset the build was observed in
    pub jobset_id: JobsetId,

    /// Evaluation the build was fetched through
    pub eval_id: u64,

    /// Seconds since epoch; drives every recency query
    pub eval_timestamp: i64,

    /// `None` while the build is pending
    pub status: Option<BuildStatus>,

    /// Package attribute, without the platform suffix
    pub job: String,

    pub system: Platform,
}

impl BuildRecord {
    /// Reject records that are missing required data before they reach storage
    pub fn validate(&self) -> NbResult<()> {
        let reason = if self.id == 0 {
            Some("missing build id")
        } else if self.eval_id == 0 {
            Some("missing evaluation id")
        } else if self.job.trim().is_empty() {
            Some("missing job name")
        } else if self.eval_timestamp < 0 {
            Some("negative timestamp")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(NbError::Validation {
                build_id: self.id,
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Full CI job name, `<attribute>.<system>`
    pub fn job_name(&self) -> String {
        format!("{}.{}", self.job, self.system)
    }
}

/// What an upsert did to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First sighting of the build
    Inserted,
    /// A pending build received its final status
    StatusFilled,
    /// Already known and nothing to fill in
    Unchanged,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> BuildRecord {
        BuildRecord {
            id: 42,
            jobset_id: JobsetId(1),
            eval_id: 7,
            eval_timestamp: 100,
            status: Some(BuildStatus::SUCCESS),
            job: "hello".to_string(),
            system: Platform::X86_64Linux,
        }
    }

    #[test]
    fn valid_record_passes() {
        assert!(record().validate().is_ok());
    }

    #[test]
    fn empty_job_is_rejected() {
        let mut rec = record();
        rec.job = " ".to_string();
        let err = rec.validate().unwrap_err();
        assert!(matches!(err, NbError::Validation { build_id: 42, .. }));
    }

    #[test]
    fn missing_eval_is_rejected() {
        let mut rec = record();
        rec.eval_id = 0;
        assert!(rec.validate().is_err());
    }

    #[test]
    fn status_descriptions() {
        assert_eq!(BuildStatus(0).describe(), "succeeded");
        assert_eq!(BuildStatus(7).describe(), "timed out");
        assert_eq!(BuildStatus(42).describe(), "unknown (42)");
        assert!(BuildStatus::SUCCESS.is_success());
        assert!(!BuildStatus::FAILED.is_success());
    }

    #[test]
    fn job_name_joins_system() {
        assert_eq!(record().job_name(), "hello.x86_64-linux");
    }
}
