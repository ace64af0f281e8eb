//! Listing Server Entry Point
//!
//! Three subcommands:
//! - `build`: embed the dataset and write the index artifacts
//! - `query`: run one search and print the JSON response
//! - `serve`: run the JSON-RPC tool server over stdio

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use listing_retrieval::{
    BatchEmbeddingBuilder, BuildOutcome, EmbeddingProvider, RecordStore, RetrievalConfig,
    RetrievalContext,
};
use listing_server::{ListingBackend, SearchRequest};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "listing-server")]
#[command(about = "Filtered semantic search over property listings")]
#[command(version)]
struct Args {
    /// JSON config file; flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Newline-delimited JSON listings
    #[arg(long, global = true)]
    dataset: Option<PathBuf>,

    /// Directory holding the index artifacts
    #[arg(long, global = true)]
    artifacts: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Embed every listing and write the index, embeddings and manifest
    Build {
        /// Descriptions per embedding batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Rebuild even when the artifacts are fresh
        #[arg(long)]
        force: bool,
    },

    /// Run a single search and print the results as JSON
    Query {
        /// What the guest is looking for
        text: String,

        #[arg(long)]
        max_price: Option<f64>,

        #[arg(long)]
        guests: Option<u32>,

        /// Required amenity; repeatable
        #[arg(long = "amenity")]
        amenities: Vec<String>,

        /// Maximum number of results
        #[arg(short)]
        k: Option<usize>,

        /// Word to favour when ordering results; repeatable
        #[arg(long = "prefer")]
        preferences: Vec<String>,
    },

    /// Serve the tool server over stdin/stdout
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries JSON
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "listing_server=info,listing_retrieval=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config(&args)?;

    match args.command {
        Command::Build { batch_size, force } => build(config, batch_size, force),
        Command::Query {
            text,
            max_price,
            guests,
            amenities,
            k,
            preferences,
        } => {
            let backend = open_backend(&config)?;
            let request = SearchRequest {
                query: text,
                max_price,
                num_guests: guests,
                accessibility_amenities: (!amenities.is_empty()).then_some(amenities),
                k,
                preferences,
            };
            let response = backend.search(request).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Command::Serve => {
            let backend = open_backend(&config)?;
            tracing::info!("Starting listing tool server");
            let mut server = listing_server::mcp::McpServer::new(Arc::new(backend));
            server.run().await.context("Tool server failed")
        }
    }
}

fn load_config(args: &Args) -> Result<RetrievalConfig> {
    let mut config = match &args.config {
        Some(path) => RetrievalConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RetrievalConfig::default(),
    };
    if let Some(dataset) = &args.dataset {
        config.dataset = dataset.clone();
    }
    if let Some(artifacts) = &args.artifacts {
        config.artifacts_dir = artifacts.clone();
    }
    Ok(config)
}

#[cfg(feature = "fastembed")]
fn provider(config: &RetrievalConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let engine = listing_retrieval::VectorEngine::local(config.model_cache_dir.as_deref())
        .context("Failed to load the embedding model")?;
    Ok(Arc::new(engine))
}

#[cfg(not(feature = "fastembed"))]
fn provider(_config: &RetrievalConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    anyhow::bail!("Built without an embedding model; enable the `fastembed` feature")
}

fn load_store(config: &RetrievalConfig) -> Result<RecordStore> {
    let store = RecordStore::from_jsonl(&config.dataset)
        .with_context(|| format!("Failed to read dataset {}", config.dataset.display()))?;
    tracing::info!("Loaded {} listings from {:?}", store.len(), config.dataset);
    Ok(store)
}

fn open_backend(config: &RetrievalConfig) -> Result<ListingBackend> {
    let store = load_store(config)?;
    let paths = config.artifact_paths();
    let context = RetrievalContext::open(store, &paths, provider(config)?).with_context(|| {
        format!(
            "Failed to open artifacts in {}; run `listing-server build` first",
            config.artifacts_dir.display()
        )
    })?;
    Ok(ListingBackend::with_config(Arc::new(context), config))
}

fn build(mut config: RetrievalConfig, batch_size: Option<usize>, force: bool) -> Result<()> {
    if let Some(batch_size) = batch_size {
        config.batch_size = batch_size;
    }
    let store = load_store(&config)?;
    let paths = config.artifact_paths();
    std::fs::create_dir_all(&config.artifacts_dir).with_context(|| {
        format!("Failed to create {}", config.artifacts_dir.display())
    })?;

    let builder = BatchEmbeddingBuilder::new(provider(&config)?, config.builder_config(force))?;
    match builder.build(&store, &paths).context("Build failed")? {
        BuildOutcome::Skipped { reason } => {
            tracing::info!("Artifacts kept: {}", reason);
        }
        BuildOutcome::Built(report) => {
            tracing::info!(
                "Indexed {} listings in {} batches ({}d, {})",
                report.manifest.records,
                report.batches,
                report.manifest.dimension,
                report.manifest.metric
            );
        }
    }
    Ok(())
}
