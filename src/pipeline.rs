// Pipeline Orchestrator - scrape -> verify -> commit
//
// Stages never chain on their own. Each reads the previous stage's slot
// file and writes its own, so any stage can be re-run, inspected, or run
// in a later process. Re-running is always safe: slots are overwritten and
// commit only inserts what is absent.

use crate::config::Config;
use crate::error::{PipelineError, Stage, StoreError};
use crate::extractor;
use crate::fetcher::Fetcher;
use crate::record::{Record, RecordRejection};
use crate::slot::{Slot, StagingBatch, StagingSlot, VerifiedBatch, VerifiedSlot};
use crate::store::{ConflictKey, CreateOutcome, InsertOutcome, Store};
use crate::validator::{self, Rejected};
use anyhow::Context;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

// ============================================================================
// STAGE REPORTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScrapeReport {
    pub batch_id: Uuid,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub batch_id: Uuid,
    pub source_batch: Uuid,
    pub valid: usize,
    pub invalid: Vec<Rejected>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommitReport {
    pub batch_id: Uuid,
    pub inserted: usize,
    pub already_exists: usize,
    /// Records in the verified slot that the store refused as invalid
    pub rejected: usize,
}

/// Outcome of a direct create: validation runs before the store is touched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Invalid(RecordRejection),
    Created(Record),
    Conflict(ConflictKey),
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Everything the stages need, built once at startup and passed by reference
#[derive(Debug, Clone)]
pub struct Pipeline {
    source_url: String,
    fetcher: Fetcher,
    store: Store,
    staging: StagingSlot,
    verified: VerifiedSlot,
}

impl Pipeline {
    pub fn new(
        source_url: impl Into<String>,
        fetcher: Fetcher,
        store: Store,
        staging: StagingSlot,
        verified: VerifiedSlot,
    ) -> Self {
        Pipeline {
            source_url: source_url.into(),
            fetcher,
            store,
            staging,
            verified,
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("Failed to create data dir {}", config.data_dir.display()))?;
        if let Some(parent) = config.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database dir {}", parent.display())
                })?;
            }
        }

        let fetcher = Fetcher::new(config.fetch_timeout).context("Failed to build fetcher")?;
        let store = Store::open(&config.database_path, config.uniqueness)
            .with_context(|| format!("Failed to open store {}", config.database_path.display()))?;

        Ok(Pipeline::new(
            config.source_url.clone(),
            fetcher,
            store,
            Slot::new("staging", config.staging_path()),
            Slot::new("verified", config.verified_path()),
        ))
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn staging(&self) -> &StagingSlot {
        &self.staging
    }

    pub fn verified(&self) -> &VerifiedSlot {
        &self.verified
    }

    /// Stage 1: fetch, extract, overwrite the staging slot.
    ///
    /// A failed fetch leaves the previous staging batch untouched.
    pub async fn scrape(&self) -> Result<ScrapeReport, PipelineError> {
        let markup = self.fetcher.fetch(&self.source_url).await?;
        let entries = extractor::extract(&markup);
        if entries.is_empty() {
            warn!(url = %self.source_url, "source contained no table rows");
        }

        let count = entries.len();
        let envelope = self.staging.write(StagingBatch { entries })?;
        info!(batch_id = %envelope.batch_id, count, "scrape complete");

        Ok(ScrapeReport {
            batch_id: envelope.batch_id,
            count,
        })
    }

    /// Stage 2: validate the current staging batch, overwrite the verified slot.
    pub fn verify(&self) -> Result<VerifyReport, PipelineError> {
        let staging = self
            .staging
            .read()?
            .ok_or(PipelineError::MissingInput {
                stage: Stage::Verify,
                slot: self.staging.name(),
            })?;

        let partition = validator::validate(&staging.batch.entries);
        let valid = partition.valid.len();
        let invalid = partition.invalid.clone();

        let envelope = self.verified.write(VerifiedBatch {
            source_batch: staging.batch_id,
            valid: partition.valid,
            invalid: partition.invalid,
        })?;
        info!(
            batch_id = %envelope.batch_id,
            source_batch = %staging.batch_id,
            valid,
            invalid = invalid.len(),
            "verify complete"
        );

        Ok(VerifyReport {
            batch_id: envelope.batch_id,
            source_batch: staging.batch_id,
            valid,
            invalid,
        })
    }

    /// Stage 3: insert every valid record of the current verified batch
    /// that the store does not already have.
    ///
    /// Duplicates and invalid records are counted, not errors. A store
    /// failure aborts the stage; records inserted before it stay committed.
    pub fn commit(&self) -> Result<CommitReport, PipelineError> {
        let verified = self
            .verified
            .read()?
            .ok_or(PipelineError::MissingInput {
                stage: Stage::Commit,
                slot: self.verified.name(),
            })?;

        let mut report = CommitReport {
            batch_id: verified.batch_id,
            inserted: 0,
            already_exists: 0,
            rejected: 0,
        };

        for record in &verified.batch.valid {
            match self.store.insert_if_absent(record)? {
                InsertOutcome::Inserted => report.inserted += 1,
                InsertOutcome::AlreadyExists => report.already_exists += 1,
                InsertOutcome::Rejected(_) => report.rejected += 1,
            }
        }

        info!(
            batch_id = %report.batch_id,
            inserted = report.inserted,
            already_exists = report.already_exists,
            rejected = report.rejected,
            "commit complete"
        );

        Ok(report)
    }

    /// Validate and insert a single client-supplied record.
    pub fn add_state(&self, raw_name: &str, raw_code: &str) -> Result<AddOutcome, StoreError> {
        let record = match Record::parse(raw_name, raw_code) {
            Ok(record) => record,
            Err(reason) => return Ok(AddOutcome::Invalid(reason)),
        };

        Ok(match self.store.insert_new(&record)? {
            CreateOutcome::Created(record) => {
                info!(%record, "state added");
                AddOutcome::Created(record)
            }
            CreateOutcome::Conflict(key) => AddOutcome::Conflict(key),
            CreateOutcome::Invalid(reason) => AddOutcome::Invalid(reason),
        })
    }
}
