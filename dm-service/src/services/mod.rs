pub mod dungeon_master;
pub mod embeddings;
pub mod ingestion;
pub mod metrics;
pub mod providers;
pub mod vector_store;

pub use dungeon_master::{DmError, DungeonMaster, RetrievedContext};
pub use embeddings::{build_embedder, Embedder, EmbeddingError};
pub use ingestion::{Ingestor, TextSplitter};
pub use providers::{build_provider, ChatMessage, LlmProvider, ProviderError};
pub use vector_store::{build_vector_store, Passage, VectorRecord, VectorStore, VectorStoreError};
