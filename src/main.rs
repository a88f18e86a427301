use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;

use metalake::catalog::{Catalog, ObjectStoreCatalog};
use metalake::config::{LakehouseConfig, StoreBackend};
use metalake::logging;
use metalake::pipeline::Orchestrator;
use metalake::storage::{FsObjectStore, HttpObjectStore, InMemoryObjectStore, ObjectStore};

#[derive(Parser)]
#[command(name = "metalake")]
#[command(about = "Medallion lakehouse pipeline for the metal music review corpus")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk local CSV files and upload them to the landing zone
    Landing {
        /// Folder holding the source CSV files
        #[arg(long, default_value = "csv")]
        folder: PathBuf,
    },
    /// Capture landing chunks into deduplicated bronze tables
    Bronze,
    /// Validate, type and join bronze data into silver tables
    Silver,
    /// Build the gold analytics tables from the silver layer
    Gold,
    /// Run the full pipeline: landing, bronze, silver, gold
    Run {
        /// Folder holding the source CSV files
        #[arg(long, default_value = "csv")]
        folder: PathBuf,
    },
}

fn build_store(cfg: &LakehouseConfig) -> Arc<dyn ObjectStore> {
    match cfg.backend {
        StoreBackend::Memory => Arc::new(InMemoryObjectStore::new(&cfg.bucket)),
        StoreBackend::Fs => Arc::new(FsObjectStore::new(&cfg.data_root, &cfg.bucket)),
        StoreBackend::Http => Arc::new(HttpObjectStore::new(cfg)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let cfg = LakehouseConfig::from_env();

    let store = build_store(&cfg);
    let catalog: Arc<dyn Catalog> = Arc::new(ObjectStoreCatalog::new(
        store.clone(),
        &cfg.warehouse_root,
        &cfg.branch,
    ));
    let orchestrator = Orchestrator::new(cfg, store, catalog);

    let outcome = match cli.command {
        Commands::Landing { folder } => {
            println!("🔄 Running landing ingestion...");
            orchestrator.landing(&folder).await.map(|datasets| {
                let objects: usize = datasets.values().map(Vec::len).sum();
                println!("\n📊 Landing results:");
                println!("   Datasets: {}", datasets.len());
                println!("   Objects:  {}", objects);
            })
        }
        Commands::Bronze => {
            println!("🥉 Running bronze capture...");
            orchestrator.bronze().await.map(print_tables)
        }
        Commands::Silver => {
            println!("🥈 Running silver transforms...");
            orchestrator.silver().await.map(print_tables)
        }
        Commands::Gold => {
            println!("🥇 Running gold analytics...");
            orchestrator.gold().await.map(print_tables)
        }
        Commands::Run { folder } => {
            println!("🚀 Running full pipeline (landing → gold)...");
            orchestrator.run(&folder).await.map(|report| {
                let objects: usize = report.landing.values().map(Vec::len).sum();
                println!("\n📊 Pipeline results:");
                println!("   Landing objects: {}", objects);
                println!("   Tables written:  {}", report.tables_written());
                for (dataset, table) in report.gold.iter() {
                    println!("   • gold/{dataset}: {table}");
                }
            })
        }
    };

    if let Err(e) = outcome {
        error!("Pipeline failed: {}", e);
        println!("❌ Pipeline failed: {e}");
        return Err(e.into());
    }
    println!("✅ Done");
    Ok(())
}

fn print_tables(tables: std::collections::BTreeMap<String, String>) {
    println!("\n📊 Tables written: {}", tables.len());
    for (dataset, table) in tables.iter() {
        println!("   • {dataset}: {table}");
    }
}
