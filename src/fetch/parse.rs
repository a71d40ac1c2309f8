//! Normalization of CI build documents into [`BuildRecord`]s

use crate::fetch::FetchContext;
use crate::platform::Platform;
use crate::store::{BuildRecord, BuildStatus, JobsetId};
use serde_json::Value;
use thiserror::Error;

/// A build document that cannot be turned into a record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("response is missing `{0}`")]
    MissingField(&'static str),

    #[error("field `{0}` has an unexpected type")]
    InvalidField(&'static str),

    #[error("job {job} has no platform suffix")]
    MissingSeparator { job: String },

    #[error("unknown platform {platform} in job {job}")]
    UnknownPlatform { job: String, platform: String },

    #[error("job {job} declares {declared} but was built on {actual}")]
    PlatformMismatch {
        job: String,
        declared: Platform,
        actual: String,
    },

    #[error("build belongs to no evaluation")]
    NoEvaluation,
}

/// Parse a `/build/{id}` document fetched through the evaluation in `ctx`.
///
/// The job name must split on its last `.` into attribute and one of the
/// supported platforms, and that platform must be the one the build ran on.
pub fn parse_build(
    build_id: u64,
    value: &Value,
    ctx: &FetchContext,
) -> Result<BuildRecord, ShapeError> {
    let job = required(value, "job")?
        .as_str()
        .ok_or(ShapeError::InvalidField("job"))?;

    let status = match required(value, "buildstatus")? {
        Value::Null => None,
        other => Some(BuildStatus(
            other.as_i64().ok_or(ShapeError::InvalidField("buildstatus"))?,
        )),
    };

    let timestamp = required(value, "timestamp")?
        .as_i64()
        .ok_or(ShapeError::InvalidField("timestamp"))?;

    let actual = required(value, "system")?
        .as_str()
        .ok_or(ShapeError::InvalidField("system"))?;

    let (attribute, declared) = job.rsplit_once('.').ok_or_else(|| ShapeError::MissingSeparator {
        job: job.to_string(),
    })?;

    // e.g. stdenvBootstrapTools.x86_64-darwin.dist ends in "dist"
    let declared = declared
        .parse::<Platform>()
        .map_err(|_| ShapeError::UnknownPlatform {
            job: job.to_string(),
            platform: declared.to_string(),
        })?;

    if declared.as_str() != actual {
        return Err(ShapeError::PlatformMismatch {
            job: job.to_string(),
            declared,
            actual: actual.to_string(),
        });
    }

    Ok(BuildRecord {
        id: build_id,
        jobset_id: ctx.jobset_id,
        eval_id: ctx.eval_id,
        eval_timestamp: timestamp,
        status,
        job: attribute.to_string(),
        system: declared,
    })
}

/// Parse the oracle's "latest successful build" document.
///
/// Returns `Ok(None)` when the service reports no such build. The
/// evaluation id is recovered from the build's most recent `jobsetevals`
/// entry, since the build was never fetched through one of our evaluations.
pub fn parse_latest_success(
    value: &Value,
    jobset_id: JobsetId,
) -> Result<Option<BuildRecord>, ShapeError> {
    if value.get("error").is_some() {
        return Ok(None);
    }

    let build_id = required(value, "id")?
        .as_u64()
        .ok_or(ShapeError::InvalidField("id"))?;

    let eval_id = required(value, "jobsetevals")?
        .as_array()
        .ok_or(ShapeError::InvalidField("jobsetevals"))?
        .iter()
        .filter_map(Value::as_u64)
        .max()
        .ok_or(ShapeError::NoEvaluation)?;

    let ctx = FetchContext { jobset_id, eval_id };
    let record = parse_build(build_id, value, &ctx)?;
    Ok(record.status.filter(BuildStatus::is_success).map(|_| record))
}

fn required<'a>(value: &'a Value, field: &'static str) -> Result<&'a Value, ShapeError> {
    value.get(field).ok_or(ShapeError::MissingField(field))
}
