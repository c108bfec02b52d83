// Durable intermediate slots between pipeline stages
//
// One JSON file per slot, overwritten on every write (last writer wins).
// Each file wraps its batch in an envelope with an id, a timestamp and a
// SHA-256 checksum of the batch body. Writes go to a temp file that is then
// renamed over the slot, so readers see either the old or the new batch.

use crate::error::SlotError;
use crate::record::{RawPair, Record};
use crate::validator::Rejected;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use uuid::Uuid;

// ============================================================================
// BATCHES
// ============================================================================

/// Raw extraction output, in table order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingBatch {
    pub entries: Vec<RawPair>,
}

/// Validation output for one staging batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedBatch {
    /// `batch_id` of the staging envelope this was derived from
    pub source_batch: Uuid,
    pub valid: Vec<Record>,
    pub invalid: Vec<Rejected>,
}

/// What actually lands on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub batch_id: Uuid,
    pub written_at: DateTime<Utc>,
    pub checksum: String,
    pub batch: T,
}

impl<T: Serialize> Envelope<T> {
    fn seal(batch: T) -> Result<Self, serde_json::Error> {
        let checksum = digest(&batch)?;
        Ok(Envelope {
            batch_id: Uuid::new_v4(),
            written_at: Utc::now(),
            checksum,
            batch,
        })
    }

    fn is_intact(&self) -> Result<bool, serde_json::Error> {
        Ok(digest(&self.batch)? == self.checksum)
    }
}

fn digest<T: Serialize>(batch: &T) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(batch)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

// ============================================================================
// SLOT
// ============================================================================

/// Single file holding the latest batch of one kind
#[derive(Debug, Clone)]
pub struct Slot<T> {
    name: &'static str,
    path: PathBuf,
    _batch: PhantomData<fn() -> T>,
}

pub type StagingSlot = Slot<StagingBatch>;
pub type VerifiedSlot = Slot<VerifiedBatch>;

impl<T: Serialize + DeserializeOwned> Slot<T> {
    pub fn new(name: &'static str, path: impl Into<PathBuf>) -> Self {
        Slot {
            name,
            path: path.into(),
            _batch: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace whatever the slot holds with `batch`.
    pub fn write(&self, batch: T) -> Result<Envelope<T>, SlotError> {
        let envelope = Envelope::seal(batch).map_err(|source| self.format_err(source))?;
        let json =
            serde_json::to_vec_pretty(&envelope).map_err(|source| self.format_err(source))?;

        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).map_err(|source| self.io_err(source))?;
            }
        }

        // Unique temp name so concurrent writers never share a temp file
        let tmp = self
            .path
            .with_extension(format!("{}.tmp", envelope.batch_id.simple()));
        fs::write(&tmp, &json).map_err(|source| self.io_err(source))?;
        if let Err(source) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(self.io_err(source));
        }

        Ok(envelope)
    }

    /// Latest batch, or `None` if nothing was ever written.
    pub fn read(&self) -> Result<Option<Envelope<T>>, SlotError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(self.io_err(source)),
        };

        let envelope: Envelope<T> =
            serde_json::from_slice(&bytes).map_err(|source| self.format_err(source))?;

        if !envelope.is_intact().map_err(|source| self.format_err(source))? {
            return Err(SlotError::Checksum {
                path: self.path.clone(),
            });
        }

        Ok(Some(envelope))
    }

    fn io_err(&self, source: std::io::Error) -> SlotError {
        SlotError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn format_err(&self, source: serde_json::Error) -> SlotError {
        SlotError::Format {
            path: self.path.clone(),
            source,
        }
    }
}
