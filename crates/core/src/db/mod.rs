//! Join-run ledger: a small SQLite database recording one row per
//! engine invocation.
//!
//! The ledger is bookkeeping only -- engine outputs live in the produced
//! documents; this table answers "what ran, against which binary, with
//! which profile, and how did it end".

use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum schema version we know how to handle.
///
/// `0` means "no schema yet" (fresh DB).
const MIN_SUPPORTED_SCHEMA_VERSION: i32 = 0;

/// Latest schema version this crate knows about.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Error type for ledger operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// Underlying SQLite error.
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// The database was created with a newer schema version than we support.
    #[error(
        "Unsupported schema version {found}; supported range is {min_supported}..={max_supported}"
    )]
    UnsupportedSchemaVersion { found: i32, min_supported: i32, max_supported: i32 },
}

/// Convenience result type for ledger operations.
pub type DbResult<T> = Result<T, DbError>;

/// Terminal status of one engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
    /// The binary's inputs were unusable; the cell was skipped, not aborted.
    Rejected,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunStatus::Running),
            "succeeded" => Some(RunStatus::Succeeded),
            "failed" => Some(RunStatus::Failed),
            "rejected" => Some(RunStatus::Rejected),
            _ => None,
        }
    }
}

/// One engine invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRunRecord {
    /// Binary (or batch cell) identifier.
    pub binary: String,
    /// Engine name: "align" or "addr-join".
    pub engine: String,
    pub profile_id: String,
    pub binary_hash: Option<String>,
    pub status: RunStatus,
    pub started_at: String,
    pub finished_at: String,
}

impl JoinRunRecord {
    /// Start a record with both timestamps set to now (RFC 3339).
    pub fn begin(
        binary: impl Into<String>,
        engine: impl Into<String>,
        profile_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            binary: binary.into(),
            engine: engine.into(),
            profile_id: profile_id.into(),
            binary_hash: None,
            status: RunStatus::Running,
            started_at: now.clone(),
            finished_at: now,
        }
    }

    /// Mark the run finished with the given status, stamping the time.
    pub fn finish(mut self, status: RunStatus) -> Self {
        self.status = status;
        self.finished_at = Utc::now().to_rfc3339();
        self
    }
}

/// SQLite-backed run ledger.
///
/// A thin wrapper around `rusqlite::Connection` responsible for opening
/// the file, applying schema migrations, and small query helpers.
#[derive(Debug)]
pub struct RunDb {
    conn: Connection,
}

impl RunDb {
    /// Open (or create) a ledger at the given path and ensure the schema.
    pub fn open(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Insert a run record and return its row id.
    pub fn insert_run(&self, record: &JoinRunRecord) -> DbResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO join_runs (binary, engine, profile_id, binary_hash, status, started_at, finished_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                record.binary,
                record.engine,
                record.profile_id,
                record.binary_hash,
                record.status.as_str(),
                record.started_at,
                record.finished_at
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// List runs, optionally filtered by binary name (ordered by id).
    pub fn list_runs(&self, binary: Option<&str>) -> DbResult<Vec<JoinRunRecord>> {
        fn map_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<JoinRunRecord> {
            let status: String = row.get(4)?;
            Ok(JoinRunRecord {
                binary: row.get(0)?,
                engine: row.get(1)?,
                profile_id: row.get(2)?,
                binary_hash: row.get(3)?,
                status: RunStatus::parse(&status).unwrap_or(RunStatus::Failed),
                started_at: row.get(5)?,
                finished_at: row.get(6)?,
            })
        }

        let mut stmt = if binary.is_some() {
            self.conn.prepare(
                r#"
                SELECT binary, engine, profile_id, binary_hash, status, started_at, finished_at
                FROM join_runs
                WHERE binary = ?1
                ORDER BY id
                "#,
            )?
        } else {
            self.conn.prepare(
                r#"
                SELECT binary, engine, profile_id, binary_hash, status, started_at, finished_at
                FROM join_runs
                ORDER BY id
                "#,
            )?
        };

        let rows = if let Some(bin) = binary {
            stmt.query_map(params![bin], map_run)?
        } else {
            stmt.query_map([], map_run)?
        };

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

/// Apply schema migrations using `PRAGMA user_version` as the indicator.
///
/// Version map:
/// - 0: no schema
/// - 1: join_runs table
fn apply_migrations(conn: &Connection) -> DbResult<()> {
    let current_version = current_schema_version(conn)?;

    // Reject DBs created with a newer schema than we support.
    if current_version > CURRENT_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            found: current_version,
            min_supported: MIN_SUPPORTED_SCHEMA_VERSION,
            max_supported: CURRENT_SCHEMA_VERSION,
        });
    }

    if current_version == 0 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS join_runs (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                binary      TEXT NOT NULL,
                engine      TEXT NOT NULL,
                profile_id  TEXT NOT NULL,
                binary_hash TEXT,
                status      TEXT NOT NULL,
                started_at  TEXT NOT NULL,
                finished_at TEXT NOT NULL
            );

            PRAGMA user_version = 1;
            COMMIT;
            "#,
        )?;
    }

    Ok(())
}

/// Read the SQLite schema version from `PRAGMA user_version`.
fn current_schema_version(conn: &Connection) -> DbResult<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    Ok(version)
}
