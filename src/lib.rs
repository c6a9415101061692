//! ragloom: a retrieval-augmented-generation pipeline.
//!
//! ```text
//! Ingestion
//!   raw text ──► ingestion::Chunker ──► chunks ──► EmbeddingProvider
//!                                                      │
//!                              stores::VectorStore.add ◄┘ (then save)
//!
//! Query
//!   query ──► EmbeddingProvider ──► stores::VectorStore.search
//!                                              │
//!   context string ◄───────────────────────────┘
//!        │
//!        └─► pipeline: retrieve ──► generate ──► record ──► reply
//! ```
//!
//! The crate is organized leaf-first:
//!
//! - [`ingestion`]: whitespace cleaning and overlapping-window chunking with
//!   positional metadata, plus the chunk → embed → store entrypoint.
//! - [`stores`]: the append-only vector store — parallel arrays, exact
//!   brute-force cosine top-k, three-artifact JSON persistence.
//! - [`providers`]: the narrow embedding/generation collaborator traits.
//! - [`pipeline`]: the fixed retrieve → generate → record orchestrator.
//! - [`recorder`]: durable stage-snapshot sinks.
//! - [`config`]: env-backed, eagerly validated settings.

pub mod config;
pub mod ingestion;
pub mod message;
pub mod pipeline;
pub mod providers;
pub mod recorder;
pub mod stores;
pub mod types;

pub use config::RagConfig;
pub use ingestion::{Chunk, Chunker, DocumentIngestor, IngestReport};
pub use message::Message;
pub use pipeline::{
    GenerateStage, PipelineOutcome, PipelineRequest, RagPipeline, RecordStage, RetrieveStage,
    RetrievedDoc,
};
pub use providers::{ChatProvider, EmbeddingProvider, MockEmbeddingProvider};
pub use recorder::{JsonlStateRecorder, NoopStateRecorder, StageSnapshot, StateRecorder};
pub use stores::{SearchHit, SharedVectorStore, VectorStore};
pub use types::{Metadata, RagError};
