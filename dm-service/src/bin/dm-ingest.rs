//! Load reference documents into the DMancipate vector indexes.

use anyhow::Context;
use clap::Parser;
use dm_service::config::DmConfig;
use dm_service::models::IndexName;
use dm_service::services::ingestion::{
    DEFAULT_BATCH_SIZE, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_SEPARATOR,
};
use dm_service::services::{build_embedder, build_vector_store, Ingestor, TextSplitter};
use service_core::observability::init_tracing;
use std::path::{Path, PathBuf};

const SUPPORTED_EXTENSIONS: [&str; 3] = ["txt", "md", "markdown"];

#[derive(Parser, Debug)]
#[command(name = "dm-ingest", about = "Split, embed and upload documents to a DMancipate index")]
struct Args {
    /// Target index: rules, monsters, campaign-modules or campaign-history
    #[arg(short, long)]
    index: IndexName,

    /// Delete everything in the index before uploading
    #[arg(long)]
    clear: bool,

    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    #[arg(long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    chunk_overlap: usize,

    #[arg(long, default_value = DEFAULT_SEPARATOR)]
    separator: String,

    /// Chunks embedded per request
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// UTF-8 text or markdown files
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = DmConfig::load()?;

    init_tracing(
        "dm-ingest",
        &config.observability.log_level,
        config.observability.otlp_endpoint.as_deref(),
    );

    let embedder = build_embedder(&config.embeddings)?;
    let store = build_vector_store(&config.vector_store)?;
    let ingestor = Ingestor::new(embedder, store)
        .with_splitter(TextSplitter::new(
            args.separator.clone(),
            args.chunk_size,
            args.chunk_overlap,
        ))
        .with_batch_size(args.batch_size);

    if args.clear {
        ingestor.clear(args.index).await?;
    }

    let mut total = 0;
    for path in &args.files {
        if !is_supported(path) {
            tracing::warn!(file = %path.display(), "Unsupported file type, skipping");
            continue;
        }

        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let source_file = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        let written = ingestor.ingest_text(args.index, &source_file, &text).await?;
        tracing::info!(file = %source_file, index = %args.index, chunks = written, "Processed file");
        total += written;
    }

    tracing::info!(index = %args.index, chunks = total, "All files processed");
    Ok(())
}
