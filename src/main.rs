//! # Universal Search CLI (`usearch`)
//!
//! Operator interface for the indexing synchronizer and query pipeline.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `usearch init` | Create the catalog SQLite schema |
//! | `usearch health` | Probe engine reachability and collection state |
//! | `usearch backfill` | Full bulk reindex with progress logging |
//! | `usearch resync` | Incremental full resync (per-document upserts) |
//! | `usearch search "<query>"` | Run a ranked search from the terminal |
//! | `usearch serve` | Start the HTTP query surface |
//!
//! All commands accept `--config` pointing to a TOML configuration file.
//! Logging is controlled with `RUST_LOG` (e.g. `RUST_LOG=universal_search=debug`).

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use universal_search::clock::SystemClock;
use universal_search::config::{self, Config};
use universal_search::db;
use universal_search::error::EngineError;
use universal_search::index::typesense::TypesenseClient;
use universal_search::index::SearchIndex;
use universal_search::migrate;
use universal_search::models::{QueryFilters, StructuredQuery};
use universal_search::repository::SqliteCatalog;
use universal_search::scheduler::ResyncScheduler;
use universal_search::schema::{schema_matches, SchemaManager};
use universal_search::search;
use universal_search::server;
use universal_search::sync::Synchronizer;

/// Universal Search — content indexing synchronizer and multi-modal
/// query pipeline.
#[derive(Parser)]
#[command(
    name = "usearch",
    about = "Universal Search — keep a search index in sync with a content catalog and query it",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/usearch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the catalog database schema.
    ///
    /// Creates the SQLite tables the bundled catalog adapter reads
    /// (entities, entity_terms, commerce). Idempotent.
    Init,

    /// Check search engine reachability and collection state.
    ///
    /// Exits nonzero when the engine is unreachable or unhealthy, so it
    /// can gate deploys and cron jobs.
    Health,

    /// Fully reindex all published, indexable entities in bulk.
    ///
    /// Pages through the catalog in ID order and flushes documents to the
    /// engine's bulk import endpoint, reporting progress per batch.
    Backfill {
        /// Catalog page size.
        #[arg(long, default_value_t = 100)]
        per_page: u32,

        /// Documents per bulk import call.
        #[arg(long, default_value_t = 40)]
        batch: u32,
    },

    /// Run one incremental resync pass (per-document upserts).
    ///
    /// The same pass the debounced scheduler runs after configuration
    /// changes. Idempotent; safe to run alongside live indexing.
    Resync,

    /// Search from the terminal.
    ///
    /// Uses the index when it is reachable and falls back to the catalog
    /// text match otherwise, printing a degraded-results notice.
    Search {
        /// The search query string.
        query: String,

        /// Restrict to specific entity kinds (repeatable).
        #[arg(long = "type")]
        types: Vec<String>,

        /// Maximum number of results.
        #[arg(long, default_value_t = 24)]
        limit: u32,

        /// Result page (1-based).
        #[arg(long, default_value_t = 1)]
        page: u32,
    },

    /// Start the HTTP query surface and the background resync loop.
    Serve,
}

/// Wire up the synchronizer against the configured engine. Fails when the
/// engine is not configured, since every caller here exists to index.
async fn build_sync(config: &Config) -> Result<Arc<Synchronizer>> {
    let client = match TypesenseClient::new(&config.engine) {
        Ok(client) => client,
        Err(EngineError::NotConfigured) => anyhow::bail!(
            "Search engine connection is not configured. Set engine.host, engine.port and engine.api_key."
        ),
        Err(e) => anyhow::bail!("{}", e),
    };
    let index: Arc<dyn SearchIndex> = Arc::new(client);
    let schema = Arc::new(SchemaManager::new(
        index.clone(),
        &config.engine.collection,
    ));

    let pool = db::connect(&config.repository.path).await?;
    let repo = Arc::new(SqliteCatalog::new(pool));
    let clock = Arc::new(SystemClock);
    let scheduler = Arc::new(ResyncScheduler::new(
        Duration::from_secs(config.indexing.resync_delay_secs),
        clock,
    ));
    let types = Arc::new(std::sync::RwLock::new(config.indexing.types.clone()));

    Ok(Arc::new(Synchronizer::new(
        index,
        repo,
        schema,
        scheduler,
        types,
        config.indexing.page_size,
    )))
}

async fn run_health(config: &Config) -> Result<()> {
    let client = match TypesenseClient::new(&config.engine) {
        Ok(client) => client,
        Err(EngineError::NotConfigured) => anyhow::bail!(
            "Search engine connection is not configured. Set engine.host, engine.port and engine.api_key."
        ),
        Err(e) => anyhow::bail!("{}", e),
    };

    if let Err(e) = client.health().await {
        anyhow::bail!("Search engine health check failed: {}", e);
    }
    println!("Search engine at {} is healthy.", config.engine.base_url());

    let canonical = universal_search::schema::canonical_schema(&config.engine.collection);
    match client.retrieve_collection().await {
        Ok(Some(remote)) if schema_matches(&remote, &canonical) => {
            println!("Collection: {} (schema up to date)", config.engine.collection);
        }
        Ok(Some(_)) => {
            println!(
                "Collection: {} (schema out of date; next indexing run migrates it)",
                config.engine.collection
            );
        }
        Ok(None) => {
            println!(
                "Collection: {} (absent; next indexing run creates it)",
                config.engine.collection
            );
        }
        Err(e) => anyhow::bail!("Unable to inspect collection: {}", e),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.repository.path).await?;
            migrate::run_migrations(&pool).await?;
            println!("Catalog database initialized successfully.");
        }
        Commands::Health => {
            run_health(&cfg).await?;
        }
        Commands::Backfill { per_page, batch } => {
            run_health(&cfg).await?;
            let sync = build_sync(&cfg).await?;
            let total = sync.run_backfill(per_page, batch).await?;
            println!(
                "Indexed {} documents into collection \"{}\".",
                total, cfg.engine.collection
            );
        }
        Commands::Resync => {
            let sync = build_sync(&cfg).await?;
            let total = sync.run_resync().await?;
            println!("Resync complete: {} documents upserted.", total);
        }
        Commands::Search {
            query,
            types,
            limit,
            page,
        } => {
            let structured = StructuredQuery {
                query,
                filters: QueryFilters {
                    types,
                    ..QueryFilters::default()
                },
                limit,
                page,
                ..StructuredQuery::default()
            };
            search::run_search(&cfg, &structured).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
