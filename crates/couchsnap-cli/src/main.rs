use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use couchsnap_core::{SnapshotConfig, SnapshotRun};
use couchsnap_couch::{CouchClient, ServiceConfig};

#[derive(Parser)]
#[command(name = "couchsnap")]
#[command(about = "Spool a CouchDB changes feed into an incremental snapshot file")]
#[command(version)]
struct Cli {
    /// Database to snapshot
    database: String,

    /// Include deletion tombstones in the output
    #[arg(long)]
    deletions: bool,

    /// Directory for snapshot and checkpoint files
    #[arg(long, default_value = ".")]
    dir: PathBuf,

    /// Number of changes requested per feed page
    #[arg(long, default_value = "1000")]
    batch_size: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("couchsnap=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let mut service = ServiceConfig::from_env()
        .context("Failed to load CouchDB connection settings from the environment")?;
    service.page_size = cli.batch_size;

    let client = CouchClient::new(service).context("Failed to build the CouchDB client")?;

    let run = SnapshotRun::new(SnapshotConfig {
        database: cli.database,
        include_deletions: cli.deletions,
        output_dir: cli.dir,
    });

    // Echo the output filename up front so wrapper scripts can pick it up.
    println!("{}", run.snapshot_path().display());

    let report = run.execute(&client).await.context("Snapshot run failed")?;

    println!("{}", report.meta_path.display());
    info!(
        db = %report.database,
        written = report.docs_written,
        skipped = report.items_skipped,
        "run finished"
    );

    Ok(())
}
