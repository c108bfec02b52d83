//! Typed errors for the ingestion pipeline.
//!
//! Record-level problems (validation rejects, duplicate keys) are not in
//! here: they are ordinary values routed into batch reports. Only failures
//! that abort a whole stage or call are errors.

use std::path::PathBuf;
use thiserror::Error;

/// Remote fetch failed: non-success status or transport error.
#[derive(Debug, Error)]
#[error("fetch failed{}: {cause}", status_suffix(.status))]
pub struct FetchError {
    /// HTTP status when the server answered, `None` for transport failures
    pub status: Option<u16>,
    pub cause: String,
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {})", code),
        None => String::new(),
    }
}

/// The store engine could not be reached or failed mid-operation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(#[from] rusqlite::Error),

    /// Strict name uniqueness was requested over a table that already
    /// holds the same name under two codes.
    #[error("cannot enforce unique state names: the store already holds duplicate names")]
    DuplicateNames,
}

/// Reading or writing an intermediate slot failed.
#[derive(Debug, Error)]
pub enum SlotError {
    #[error("slot I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("slot {path} is not a valid batch file: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("slot {path} failed checksum verification")]
    Checksum { path: PathBuf },
}

/// Pipeline stage names, used in errors and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Scrape,
    Verify,
    Commit,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Scrape => "scrape",
            Stage::Verify => "verify",
            Stage::Commit => "commit",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Stage-level failure. The stage aborts and earlier durable output is left as it was.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A stage ran before the stage that feeds it
    #[error("{stage} has no input: {slot} batch is missing, run the previous stage first")]
    MissingInput { stage: Stage, slot: &'static str },

    #[error(transparent)]
    Slot(#[from] SlotError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PipelineError {
    /// Caller can fix this by triggering stages in the right order
    pub fn is_client_correctable(&self) -> bool {
        matches!(self, PipelineError::MissingInput { .. })
    }
}
