// services/cell-loader/src/main.rs
//
// Cell-Loader - bulk loads JSON-lines records into a wide-column table
// through the cellkit write buffer
//

mod config;
mod loader;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use cellkit::database::{MemoryConnectionFactory, MemoryStore};
use cellkit::{CellStore, StoreError};
use clap::Parser;
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "cell-loader")]
#[command(about = "Bulk loader for wide-column tables, one JSON record per line")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/cell-loader.yaml")]
    config: String,

    /// JSON-lines input; nothing is loaded when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Target table, overrides loader.table
    #[arg(short, long)]
    table: Option<String>,

    /// Mutations per batched put, overrides store.max_buffer_size
    #[arg(long)]
    buffer_size: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = config::load_config(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config))?;

    let level = &config.observability.log_level;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("cell_loader={level},cellkit={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Cell-Loader");
    info!("Configuration: {}", args.config);
    info!("Store quorum: {}", config.store.quorum());

    let table = args.table.unwrap_or_else(|| config.loader.table.clone());
    let mut store_config = config.store.clone();
    if let Some(size) = args.buffer_size {
        store_config.max_buffer_size = size;
    }

    let backend = MemoryStore::new();
    if config.loader.create_table {
        backend.create_table(&table);
        info!("Created table {}", table);
    }
    let factory = Arc::new(MemoryConnectionFactory::new(backend.clone()));

    let mut store = CellStore::connect(factory, store_config).await?;
    info!("Connected to store cluster");

    let Some(input) = args.input else {
        warn!("No --input given, nothing to load");
        return Ok(());
    };

    let file = tokio::fs::File::open(&input)
        .await
        .with_context(|| format!("opening {}", input.display()))?;

    let result = loader::BulkLoader::new(&mut store, table.as_str())
        .load(BufReader::new(file))
        .await;
    let stats = match result {
        Ok(stats) => stats,
        Err(e) => {
            if let Some(store_err) = e.downcast_ref::<StoreError>() {
                if store_err.is_transient() {
                    warn!("Load stopped on a transient store failure; already flushed rows are kept");
                }
            }
            return Err(e);
        }
    };

    info!(
        "Load complete: {} records, {} cells, {} skipped",
        stats.records, stats.cells, stats.skipped
    );
    if let Some(rows) = backend.row_count(&table) {
        info!("Table {} now holds {} rows", table, rows);
    }

    Ok(())
}
