//! Loading reference documents into the vector indexes.

use crate::models::IndexName;
use crate::services::dungeon_master::DmError;
use crate::services::embeddings::Embedder;
use crate::services::vector_store::{VectorRecord, VectorStore, SOURCE_KEY};
use std::sync::Arc;

pub const DEFAULT_SEPARATOR: &str = "\n\n";
pub const DEFAULT_CHUNK_SIZE: usize = 600;
pub const DEFAULT_CHUNK_OVERLAP: usize = 150;
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Splits text on a fixed separator, then packs the pieces into chunks of at
/// most `chunk_size` characters that share up to `chunk_overlap` characters
/// with the previous chunk. A single piece longer than `chunk_size` becomes a
/// chunk of its own.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    separator: String,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_SEPARATOR, DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

impl TextSplitter {
    pub fn new(separator: impl Into<String>, chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            separator: separator.into(),
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size),
        }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        let pieces: Vec<&str> = if self.separator.is_empty() {
            vec![text]
        } else {
            text.split(self.separator.as_str()).filter(|s| !s.is_empty()).collect()
        };
        self.merge(&pieces)
    }

    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let sep_len = self.separator.chars().count();
        let mut chunks = Vec::new();
        let mut current: Vec<(&str, usize)> = Vec::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = piece.chars().count();
            let gap = if current.is_empty() { 0 } else { sep_len };

            if total + len + gap > self.chunk_size {
                if total > self.chunk_size {
                    tracing::warn!(
                        chunk_chars = total,
                        chunk_size = self.chunk_size,
                        "Created a chunk larger than the configured size"
                    );
                }
                if !current.is_empty() {
                    self.push_chunk(&mut chunks, &current);

                    // Drop leading pieces until what remains fits as overlap.
                    while total > self.chunk_overlap
                        || (total > 0 && total + len + sep_len > self.chunk_size)
                    {
                        let (_, first_len) = current.remove(0);
                        total -= first_len + if current.is_empty() { 0 } else { sep_len };
                    }
                }
            }

            current.push((*piece, len));
            total += len + if current.len() > 1 { sep_len } else { 0 };
        }

        self.push_chunk(&mut chunks, &current);
        chunks
    }

    fn push_chunk(&self, chunks: &mut Vec<String>, pieces: &[(&str, usize)]) {
        let joined = pieces
            .iter()
            .map(|(piece, _)| *piece)
            .collect::<Vec<_>>()
            .join(&self.separator);
        let trimmed = joined.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
    }
}

/// Splits documents, embeds the chunks and writes them to an index.
pub struct Ingestor {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    splitter: TextSplitter,
    batch_size: usize,
}

impl Ingestor {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            embedder,
            store,
            splitter: TextSplitter::default(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_splitter(mut self, splitter: TextSplitter) -> Self {
        self.splitter = splitter;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Remove every document from an index.
    pub async fn clear(&self, index: IndexName) -> Result<(), DmError> {
        self.store.clear(index).await?;
        tracing::info!(index = %index, "Cleared index");
        Ok(())
    }

    /// Ingest one document. Returns the number of chunks written.
    #[tracing::instrument(skip_all, fields(index = %index, source_file = %source_file))]
    pub async fn ingest_text(
        &self,
        index: IndexName,
        source_file: &str,
        text: &str,
    ) -> Result<usize, DmError> {
        let chunks = self.splitter.split(text);
        tracing::info!(chunks = chunks.len(), "Split document");

        let mut written = 0;
        for (batch_no, batch) in chunks.chunks(self.batch_size).enumerate() {
            let vectors = self.embedder.embed(batch).await?;
            let records: Vec<VectorRecord> = vectors
                .into_iter()
                .zip(batch)
                .enumerate()
                .map(|(i, (values, chunk))| {
                    VectorRecord::new(values, chunk.as_str())
                        .with_metadata(SOURCE_KEY, source_file)
                        .with_metadata("chunk", batch_no * self.batch_size + i)
                })
                .collect();

            written += self.store.upsert(index, records).await?;
            tracing::debug!(batch = batch_no, written, "Uploaded batch");
        }

        tracing::info!(written, "Document ingested");
        Ok(written)
    }
}
