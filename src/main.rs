use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use state_registry::{
    init_tracing, AddOutcome, Config, ConflictKey, Envelope, Pipeline, Slot, StagingBatch,
    VerifiedBatch,
};

#[derive(Parser)]
#[command(name = "state-registry", version, about = "Scrape, verify and store region codes")]
struct Cli {
    /// Directory for slot files and the database (overrides DATA_DIR / DATABASE_PATH)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the source table into the staging slot
    Scrape,
    /// Validate the staging batch into the verified slot
    Verify,
    /// Insert the verified batch into the store
    Commit,
    /// Scrape, verify and commit, one after the other
    Run,
    /// List every committed state
    List,
    /// Look up a state by name
    Find { name: String },
    /// Add a single state
    Add { name: String, code: String },
    /// Show what the staging and verified slots hold
    Inspect,
    /// Show store statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(dir) = cli.data_dir {
        config.database_path = dir.join("states.db");
        config.data_dir = dir;
    }
    let pipeline = Pipeline::from_config(&config)?;

    match cli.command {
        Commands::Scrape => {
            let report = pipeline.scrape().await?;
            println!("✓ Scraped {} entries (batch {})", report.count, report.batch_id);
        }
        Commands::Verify => {
            let report = pipeline.verify()?;
            println!("✓ {} valid, {} rejected", report.valid, report.invalid.len());
            for rejected in &report.invalid {
                println!(
                    "  ✗ {:?} / {:?}: {}",
                    rejected.pair.name, rejected.pair.code, rejected.reason
                );
            }
        }
        Commands::Commit => {
            let report = pipeline.commit()?;
            println!(
                "✓ Inserted: {}, already present: {}, rejected: {}",
                report.inserted, report.already_exists, report.rejected
            );
        }
        Commands::Run => {
            let scraped = pipeline.scrape().await?;
            println!("✓ Scraped {} entries", scraped.count);
            let verified = pipeline.verify()?;
            println!("✓ {} valid, {} rejected", verified.valid, verified.invalid.len());
            let committed = pipeline.commit()?;
            println!(
                "✓ Inserted: {}, already present: {}, rejected: {}",
                committed.inserted, committed.already_exists, committed.rejected
            );
        }
        Commands::List => {
            let records = pipeline.store().list_all()?;
            for record in &records {
                println!("{:<40} {}", record.name(), record.code());
            }
            println!("\n{} states", records.len());
        }
        Commands::Find { name } => match pipeline.store().find_by_name(&name)? {
            Some(record) => println!("{}", record),
            None => {
                eprintln!("State not found: {}", name);
                std::process::exit(1);
            }
        },
        Commands::Add { name, code } => match pipeline.add_state(&name, &code)? {
            AddOutcome::Created(record) => println!("✓ Added {}", record),
            AddOutcome::Invalid(reason) => {
                eprintln!("Invalid state: {}", reason);
                std::process::exit(2);
            }
            AddOutcome::Conflict(key) => {
                let what = match key {
                    ConflictKey::Code => "code",
                    ConflictKey::Name => "name",
                };
                eprintln!("A state with that {} already exists", what);
                std::process::exit(1);
            }
        },
        Commands::Inspect => {
            describe("staging", pipeline.staging(), |b: &StagingBatch| {
                format!("{} entries", b.entries.len())
            });
            describe("verified", pipeline.verified(), |b: &VerifiedBatch| {
                format!(
                    "{} valid, {} rejected (from batch {})",
                    b.valid.len(),
                    b.invalid.len(),
                    b.source_batch
                )
            });
        }
        Commands::Stats => {
            println!("Source:   {}", pipeline.source_url());
            println!("Database: {}", pipeline.store().path().display());
            println!("Keys:     {}", pipeline.store().mode());
            println!("States:   {}", pipeline.store().count()?);
        }
    }

    Ok(())
}

/// Print one slot's envelope metadata; a broken slot is reported, not fatal
fn describe<T, F>(label: &str, slot: &Slot<T>, summary: F)
where
    T: serde::Serialize + serde::de::DeserializeOwned,
    F: Fn(&T) -> String,
{
    match slot.read() {
        Ok(Some(Envelope {
            batch_id,
            written_at,
            batch,
            ..
        })) => println!(
            "{:<9} {} written {} - {}",
            label,
            batch_id,
            written_at.to_rfc3339(),
            summary(&batch)
        ),
        Ok(None) => println!("{:<9} (empty)", label),
        Err(e) => println!("{:<9} unreadable: {}", label, e),
    }
}
