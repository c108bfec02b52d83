// Store - durable, uniqueness-enforcing table of committed records
//
// Uniqueness is enforced by SQLite itself (UNIQUE constraints), never by an
// in-process lock: several processes may share one database file, and a
// constraint violation is how a duplicate is detected.

use crate::error::StoreError;
use crate::record::{title_case, Record, RecordRejection};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// How long a writer waits on a locked database before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// OUTCOMES
// ============================================================================

/// Result of a bulk-ingestion insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
    /// The record breaks a record invariant and was never written
    Rejected(RecordRejection),
}

/// Which unique key an insert collided with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKey {
    Code,
    Name,
}

/// Result of a direct (API-driven) insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(Record),
    Conflict(ConflictKey),
    Invalid(RecordRejection),
}

/// Which keys are unique
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UniquenessMode {
    /// Only `state_code` is unique
    #[default]
    Code,
    /// Both `state_code` and `state_name` are unique
    CodeAndName,
}

impl fmt::Display for UniquenessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniquenessMode::Code => write!(f, "unique codes"),
            UniquenessMode::CodeAndName => write!(f, "unique codes and names"),
        }
    }
}

/// What a single INSERT attempt came to, short of an engine failure
enum Attempt {
    Inserted,
    Conflict(ConflictKey),
    Rejected(RecordRejection),
}

// ============================================================================
// STORE
// ============================================================================

/// Handle to the SQLite store. Cheap to clone; every call opens its own
/// connection so handles can be used from any thread or process.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
    mode: UniquenessMode,
}

impl Store {
    /// Open (creating if needed) the store at `path` and make sure the schema exists.
    pub fn open(path: impl Into<PathBuf>, mode: UniquenessMode) -> Result<Self, StoreError> {
        let store = Store {
            path: path.into(),
            mode,
        };
        let conn = store.connect()?;
        setup_database(&conn, mode)?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> UniquenessMode {
        self.mode
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Insert unless a record with the same key exists. Atomic: with N
    /// concurrent callers on one code exactly one gets `Inserted`.
    pub fn insert_if_absent(&self, record: &Record) -> Result<InsertOutcome, StoreError> {
        let conn = self.connect()?;
        match try_insert(&conn, record)? {
            Attempt::Inserted => Ok(InsertOutcome::Inserted),
            Attempt::Conflict(key) => {
                debug!(%record, ?key, "already exists");
                Ok(InsertOutcome::AlreadyExists)
            }
            Attempt::Rejected(reason) => {
                warn!(%record, %reason, "refusing invalid record");
                Ok(InsertOutcome::Rejected(reason))
            }
        }
    }

    /// Insert a record supplied directly by a client.
    pub fn insert_new(&self, record: &Record) -> Result<CreateOutcome, StoreError> {
        let conn = self.connect()?;
        match try_insert(&conn, record)? {
            Attempt::Inserted => Ok(CreateOutcome::Created(record.clone())),
            Attempt::Conflict(key) => Ok(CreateOutcome::Conflict(key)),
            Attempt::Rejected(reason) => Ok(CreateOutcome::Invalid(reason)),
        }
    }

    /// Exact match on the title-cased name. With duplicate names allowed,
    /// the earliest inserted record wins.
    pub fn find_by_name(&self, name: &str) -> Result<Option<Record>, StoreError> {
        let conn = self.connect()?;
        let found = conn
            .query_row(
                "SELECT state_name, state_code FROM states
                 WHERE state_name = ?1
                 ORDER BY id LIMIT 1",
                [title_case(name.trim())],
                row_to_record,
            )
            .optional()?;
        Ok(found)
    }

    pub fn find_by_code(&self, code: &str) -> Result<Option<Record>, StoreError> {
        let conn = self.connect()?;
        let found = conn
            .query_row(
                "SELECT state_name, state_code FROM states WHERE state_code = ?1",
                [code.trim().to_uppercase()],
                row_to_record,
            )
            .optional()?;
        Ok(found)
    }

    /// All committed records in insertion order
    pub fn list_all(&self) -> Result<Vec<Record>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT state_name, state_code FROM states ORDER BY id")?;
        let records = stmt
            .query_map([], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM states", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn setup_database(conn: &Connection, mode: UniquenessMode) -> Result<(), StoreError> {
    // WAL lets readers proceed while one writer holds the lock
    let _journal: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS states (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            state_name TEXT NOT NULL CHECK (length(trim(state_name)) > 0),
            state_code TEXT NOT NULL UNIQUE CHECK (length(state_code) = 2),
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_states_name ON states(state_name)",
        [],
    )?;

    // The mode is decided per open: a lenient open lifts a strict one
    match mode {
        UniquenessMode::CodeAndName => {
            let created = conn.execute(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_states_name_unique ON states(state_name)",
                [],
            );
            match created {
                Ok(_) => {}
                Err(e) if is_constraint(&e, rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE) => {
                    return Err(StoreError::DuplicateNames);
                }
                Err(e) => return Err(e.into()),
            }
        }
        UniquenessMode::Code => {
            conn.execute("DROP INDEX IF EXISTS idx_states_name_unique", [])?;
        }
    }

    Ok(())
}

fn is_constraint(err: &rusqlite::Error, extended: i32) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation && e.extended_code == extended
    )
}

/// `Err` only when the engine itself failed; conflicts and invalid records
/// are per-record outcomes.
fn try_insert(conn: &Connection, record: &Record) -> Result<Attempt, StoreError> {
    if let Some(reason) = record.rejection() {
        return Ok(Attempt::Rejected(reason));
    }

    let result = conn.execute(
        "INSERT INTO states (state_name, state_code) VALUES (?1, ?2)",
        params![record.name(), record.code()],
    );

    match result {
        Ok(_) => Ok(Attempt::Inserted),
        Err(rusqlite::Error::SqliteFailure(err, msg))
            if err.code == ErrorCode::ConstraintViolation
                && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            let key = match msg.as_deref() {
                Some(m) if m.contains("state_name") => ConflictKey::Name,
                _ => ConflictKey::Code,
            };
            Ok(Attempt::Conflict(key))
        }
        Err(e) => Err(e.into()),
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<Record> {
    Ok(Record::from_stored(row.get(0)?, row.get(1)?))
}
