//! motorlog offline jobs
//!
//! The `motorlog` command runs the maintenance tasks that happen outside
//! normal application traffic:
//!
//! - `migrate`: apply outstanding migrations
//! - `status`: show applied and pending migrations
//! - `export`: write a snapshot of the database to a directory
//! - `import`: restore a snapshot into an empty database
//!
//! The database connection comes from the MOTORLOG_DB_* environment
//! variables; without them an in-memory database is used (only useful
//! for dry runs).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;

use motorlog_core::backup::{export_snapshot, import_snapshot};
use motorlog_core::migrations::migrations;
use motorlog_core::telemetry::init_tracing;
use motorlog_store::{Migrator, StoreHandle};

#[derive(Parser)]
#[command(name = "motorlog")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Vehicle logbook maintenance jobs", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply all outstanding migrations
    Migrate,

    /// Show which migrations are applied and which are pending
    Status,

    /// Export a snapshot of the database into a directory
    Export {
        /// Snapshot directory to write (created if missing)
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Restore a snapshot directory into an empty database
    Import {
        /// Snapshot directory to read
        #[arg(short, long)]
        from: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let db = StoreHandle::connect_from_env()
        .await
        .context("Failed to connect to the motorlog database")?;

    let result = match cli.command {
        Commands::Migrate => cmd_migrate(&db).await,
        Commands::Status => cmd_status(&db).await,
        Commands::Export { out } => cmd_export(&db, &out).await,
        Commands::Import { from } => cmd_import(&db, &from).await,
    };

    db.close().await.ok();
    result
}

async fn cmd_migrate(db: &StoreHandle) -> Result<()> {
    let migrator = Migrator::new(migrations())?;
    let report = migrator.run(db).await.context("Migration run failed")?;

    if report.applied.is_empty() {
        println!("✓ Database is up to date ({} migrations)", report.skipped.len());
    } else {
        println!("✓ Applied {} migration(s):", report.applied.len());
        for name in &report.applied {
            println!("    {name}");
        }
    }
    Ok(())
}

async fn cmd_status(db: &StoreHandle) -> Result<()> {
    let migrator = Migrator::new(migrations())?;
    let status = migrator.status(db).await?;

    println!("Migration status");
    println!("================");
    for record in &status.applied {
        println!(
            "  ✓ {} (applied {})",
            record.name,
            record.applied_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    for name in &status.pending {
        println!("  ○ {name} [pending]");
    }
    if status.applied.is_empty() && status.pending.is_empty() {
        println!("  No migrations declared.");
    }
    Ok(())
}

async fn cmd_export(db: &StoreHandle, out: &Path) -> Result<()> {
    let report = export_snapshot(db, out)
        .await
        .with_context(|| format!("Export to {} failed", out.display()))?;

    println!("✓ Snapshot exported to {}", out.display());
    println!("  Documents: {}", report.documents);
    println!("  Files:     {}", report.files);
    Ok(())
}

async fn cmd_import(db: &StoreHandle, from: &Path) -> Result<()> {
    let report = import_snapshot(db, from)
        .await
        .with_context(|| format!("Import from {} failed", from.display()))?;

    println!("✓ Snapshot imported from {}", from.display());
    println!("  Documents: {}", report.documents);
    println!("  Files:     {}", report.files);
    Ok(())
}
