// State Registry - Core Library
// Scrape -> verify -> commit pipeline for region codes, shared by the CLI,
// the API server, and tests

pub mod config;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod pipeline;
pub mod record;
pub mod slot;
pub mod store;
pub mod validator;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use config::Config;
pub use error::{FetchError, PipelineError, SlotError, Stage, StoreError};
pub use extractor::extract;
pub use fetcher::Fetcher;
pub use pipeline::{AddOutcome, CommitReport, Pipeline, ScrapeReport, VerifyReport};
pub use record::{RawPair, Record, RecordRejection};
pub use slot::{Envelope, Slot, StagingBatch, StagingSlot, VerifiedBatch, VerifiedSlot};
pub use store::{ConflictKey, CreateOutcome, InsertOutcome, Store, UniquenessMode};
pub use validator::{validate, Partition, Rejected};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the fmt subscriber used by both binaries (`RUST_LOG`, default `info`)
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
}
