//! # Retry Queue Inspector
//!
//! Command-line tool for reading the retry queue snapshot without starting the
//! application. Operations left `en_cours` by a crash are shown `en_attente`,
//! as the application would see them on restart. The file is never written.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use maison_core::config::ConfigLoader;
use maison_core::queue::{
    CallbackRegistry, JsonFileStore, MemoryStore, OperationStatus, QueueStore, RetryQueue,
    SystemClock,
};
use serde_json::json;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{debug, error, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "queue-inspect")]
#[command(about = "Inspect the Maison retry queue snapshot")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file (default: $MAISON_CONFIG, then built-in defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Queue file, overriding the configured persistence path
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Live breakdown by status and operation label
    Stats,

    /// List operations in queue order
    List {
        /// Only operations with this status (en_attente, en_cours, reussie, abandonnee)
        #[arg(short, long)]
        status: Option<String>,

        /// Maximum number of operations to print
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show one operation
    Show {
        /// Operation id
        id: u64,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _ = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();

    if let Err(e) = run(&cli) {
        error!("Queue inspection failed: {:#}", e);
        eprintln!("❌ {e:#}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let queue = open_queue(cli)?;

    let output = match &cli.command {
        Some(Commands::Stats) | None => {
            let stats = queue.stats();
            json!({
                "en_file": stats.en_file,
                "capacite": stats.capacite,
                "par_statut": stats.par_statut,
                "par_operation": stats.par_operation,
                "prochaine_tentative": queue.next_due_at(),
            })
        }
        Some(Commands::List { status, limit }) => {
            let status = status.as_deref().map(parse_status).transpose()?;
            serde_json::to_value(queue.list(status, *limit))?
        }
        Some(Commands::Show { id }) => match queue.get(*id) {
            Some(operation) => serde_json::to_value(operation)?,
            None => bail!("operation {id} not found"),
        },
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn open_queue(cli: &Cli) -> Result<RetryQueue> {
    let config = ConfigLoader::load(cli.config.as_deref()).context("loading configuration")?;
    let path = cli
        .file
        .clone()
        .unwrap_or_else(|| config.retry_queue.persistence_path.clone());
    if !path.exists() {
        bail!("queue file {} does not exist", path.display());
    }
    debug!(path = %path.display(), "Reading queue snapshot");

    let operations = JsonFileStore::new(&path)
        .load()
        .with_context(|| format!("reading queue file {}", path.display()))?;

    Ok(RetryQueue::with_parts(
        &config.retry_queue,
        Arc::new(MemoryStore::with_operations(operations)),
        Arc::new(CallbackRegistry::new()),
        Arc::new(SystemClock),
    ))
}

fn parse_status(raw: &str) -> Result<OperationStatus> {
    OperationStatus::parse(raw).with_context(|| format!("unknown status '{raw}'"))
}
