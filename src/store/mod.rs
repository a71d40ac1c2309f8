//! Persistent build store backed by SQLite
//!
//! The store owns every persisted entity: jobsets, build results and the
//! attribute-to-file cache. Writers go through `&mut self`, so a single owner
//! (the ingest consumer) serializes all mutations.

pub mod record;

pub use record::{BuildRecord, BuildStatus, JobsetId, UpsertOutcome};

use crate::error::{NbError, NbResult};
use crate::platform::Platform;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS jobsets (
  jobset_id INTEGER PRIMARY KEY NOT NULL,
  url TEXT NOT NULL,
  jobset TEXT NOT NULL,
  UNIQUE(url, jobset)
);

CREATE TABLE IF NOT EXISTS build_results (
  build_id INTEGER PRIMARY KEY NOT NULL,
  jobset_id INTEGER NOT NULL,
  eval_id INTEGER NOT NULL,
  eval_timestamp INTEGER NOT NULL,
  status INTEGER,
  job TEXT NOT NULL,
  system TEXT NOT NULL,
  FOREIGN KEY (jobset_id) REFERENCES jobsets(jobset_id)
);

CREATE TABLE IF NOT EXISTS attr_files (
  attr_files_id INTEGER PRIMARY KEY NOT NULL,
  attribute TEXT NOT NULL UNIQUE,
  file TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_build_results_eval ON build_results(eval_id);
CREATE INDEX IF NOT EXISTS idx_build_results_job_system
  ON build_results(job, system, eval_timestamp);
";

const BUILD_COLUMNS: &str = "build_id, jobset_id, eval_id, eval_timestamp, status, job, system";

/// Row counts for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreCounts {
    pub jobsets: u64,
    pub builds: u64,
    pub pending: u64,
}

/// Build result store
pub struct BuildStore {
    conn: Connection,
}

impl BuildStore {
    /// Open (or create) a store at `path`
    pub fn open(path: &Path) -> NbResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                NbError::io(format!("creating database directory {}", parent.display()), e)
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        debug!("Opened build store at {}", path.display());
        Self::bootstrap(conn)
    }

    /// Open a throwaway in-memory store
    pub fn in_memory() -> NbResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::bootstrap(conn)
    }

    fn bootstrap(conn: Connection) -> NbResult<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }

    /// Get or create the surrogate id of a jobset
    pub fn ensure_jobset(&mut self, url: &str, jobset: &str) -> NbResult<JobsetId> {
        self.conn.execute(
            "INSERT OR IGNORE INTO jobsets (url, jobset) VALUES (?1, ?2)",
            params![url, jobset],
        )?;
        let id = self.conn.query_row(
            "SELECT jobset_id FROM jobsets WHERE url = ?1 AND jobset = ?2",
            params![url, jobset],
            |row| row.get(0),
        )?;
        Ok(JobsetId(id))
    }

    /// Insert a build, or fill in the status of a pending one.
    ///
    /// A status that is already set is never overwritten, and a pending
    /// status never replaces anything.
    pub fn upsert_build_result(&mut self, record: &BuildRecord) -> NbResult<UpsertOutcome> {
        record.validate()?;

        let tx = self.conn.transaction()?;
        let existing: Option<Option<i64>> = tx
            .query_row(
                "SELECT status FROM build_results WHERE build_id = ?1",
                params![record.id],
                |row| row.get(0),
            )
            .optional()?;

        let outcome = match existing {
            None => {
                tx.execute(
                    "INSERT INTO build_results
                        (build_id, jobset_id, eval_id, eval_timestamp, status, job, system)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        record.id,
                        record.jobset_id.0,
                        record.eval_id,
                        record.eval_timestamp,
                        record.status.map(|s| s.code()),
                        record.job,
                        record.system.as_str(),
                    ],
                )?;
                UpsertOutcome::Inserted
            }
            Some(None) => match record.status {
                Some(status) => {
                    tx.execute(
                        "UPDATE build_results SET status = ?1
                         WHERE build_id = ?2 AND status IS NULL",
                        params![status.code(), record.id],
                    )?;
                    UpsertOutcome::StatusFilled
                }
                None => UpsertOutcome::Unchanged,
            },
            Some(Some(_)) => UpsertOutcome::Unchanged,
        };
        tx.commit()?;

        Ok(outcome)
    }

    /// Ids recorded with a status through an evaluation
    pub fn known_build_ids(&self, eval_id: u64) -> NbResult<HashSet<u64>> {
        let mut stmt = self.conn.prepare(
            "SELECT build_id FROM build_results WHERE eval_id = ?1 AND status IS NOT NULL",
        )?;
        let ids = stmt
            .query_map(params![eval_id], |row| row.get(0))?
            .collect::<Result<HashSet<u64>, _>>()?;
        Ok(ids)
    }

    /// Whether a build is stored with a status, through any evaluation
    pub fn is_resolved(&self, id: u64) -> NbResult<bool> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT 1 FROM build_results WHERE build_id = ?1 AND status IS NOT NULL",
        )?;
        Ok(stmt.exists(params![id])?)
    }

    pub fn build_by_id(&self, id: u64) -> NbResult<Option<BuildRecord>> {
        let sql = format!("SELECT {BUILD_COLUMNS} FROM build_results WHERE build_id = ?1");
        let record = self
            .conn
            .query_row(&sql, params![id], map_build_row)
            .optional()?;
        Ok(record)
    }

    /// Latest resolved build of every (job, system) pair of a jobset.
    ///
    /// "Latest" means highest evaluation timestamp; equal timestamps are
    /// decided by the higher build id. Sorted by job, then system.
    pub fn latest_per_job_system(&self, jobset_id: JobsetId) -> NbResult<Vec<BuildRecord>> {
        let sql = format!(
            "SELECT {BUILD_COLUMNS} FROM (
                SELECT {BUILD_COLUMNS}, ROW_NUMBER() OVER (
                    PARTITION BY job, system
                    ORDER BY eval_timestamp DESC, build_id DESC
                ) AS rank
                FROM build_results
                WHERE status IS NOT NULL AND jobset_id = ?1
             )
             WHERE rank = 1
             ORDER BY job ASC, system ASC"
        );
        self.query_builds(&sql, params![jobset_id.0])
    }

    /// Most recent successful build of a (job, system) pair in a jobset
    pub fn last_successful_build(
        &self,
        jobset_id: JobsetId,
        job: &str,
        system: Platform,
    ) -> NbResult<Option<BuildRecord>> {
        let sql = format!(
            "SELECT {BUILD_COLUMNS} FROM build_results
             WHERE jobset_id = ?1 AND job = ?2 AND system = ?3 AND status = ?4
             ORDER BY eval_timestamp DESC, build_id DESC
             LIMIT 1"
        );
        let record = self
            .conn
            .query_row(
                &sql,
                params![jobset_id.0, job, system.as_str(), BuildStatus::SUCCESS.code()],
                map_build_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Builds that were still pending when last fetched
    pub fn builds_missing_status(&self) -> NbResult<Vec<BuildRecord>> {
        let sql = format!(
            "SELECT {BUILD_COLUMNS} FROM build_results
             WHERE status IS NULL
             ORDER BY build_id ASC"
        );
        self.query_builds(&sql, [])
    }

    /// Cached source file of an attribute, if one was recorded
    pub fn cached_attr_file(&self, attribute: &str) -> NbResult<Option<PathBuf>> {
        let file: Option<String> = self
            .conn
            .query_row(
                "SELECT file FROM attr_files WHERE attribute = ?1",
                params![attribute],
                |row| row.get(0),
            )
            .optional()?;
        Ok(file.map(PathBuf::from))
    }

    /// Remember an attribute's source file, replacing a stale entry
    pub fn record_attr_file(&mut self, attribute: &str, file: &Path) -> NbResult<()> {
        self.conn.execute(
            "INSERT INTO attr_files (attribute, file) VALUES (?1, ?2)
             ON CONFLICT(attribute) DO UPDATE SET file = excluded.file",
            params![attribute, file.to_string_lossy()],
        )?;
        Ok(())
    }

    pub fn counts(&self) -> NbResult<StoreCounts> {
        let count = |sql: &str| -> NbResult<u64> {
            Ok(self.conn.query_row(sql, [], |row| row.get(0))?)
        };
        Ok(StoreCounts {
            jobsets: count("SELECT COUNT(*) FROM jobsets")?,
            builds: count("SELECT COUNT(*) FROM build_results")?,
            pending: count("SELECT COUNT(*) FROM build_results WHERE status IS NULL")?,
        })
    }

    fn query_builds<P: rusqlite::Params>(&self, sql: &str, params: P) -> NbResult<Vec<BuildRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let records = stmt
            .query_map(params, map_build_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

fn map_build_row(row: &Row<'_>) -> rusqlite::Result<BuildRecord> {
    let system: String = row.get(6)?;
    let system = system
        .parse::<Platform>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

    Ok(BuildRecord {
        id: row.get(0)?,
        jobset_id: JobsetId(row.get(1)?),
        eval_id: row.get(2)?,
        eval_timestamp: row.get(3)?,
        status: row.get::<_, Option<i64>>(4)?.map(BuildStatus),
        job: row.get(5)?,
        system,
    })
}
