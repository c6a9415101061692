//! Document ingestion: raw text in, indexed chunks out.
//!
//! ```text
//! raw text ──► clean + window (Chunker) ──► chunks
//!                                             │
//!                              EmbeddingProvider::embed_many
//!                                             │
//!                        VectorStore::add ◄───┘
//!                                 │
//!                           VectorStore::save
//! ```

pub mod chunker;

use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use crate::providers::EmbeddingProvider;
use crate::stores::SharedVectorStore;
use crate::types::{Metadata, RagError};

pub use chunker::{clean_text, Chunk, Chunker};

/// Summary of a completed ingestion.
#[derive(Clone, Debug)]
pub struct IngestReport {
    /// Chunks embedded and appended to the store in this call.
    pub chunks_indexed: usize,
    /// Total documents in the store after the append.
    pub store_len: usize,
}

/// Chunks documents, embeds them, and appends the batch to the vector store.
///
/// Unlike the retrieval stage, ingestion is an explicit caller entrypoint:
/// embedding and persistence failures propagate instead of degrading.
pub struct DocumentIngestor {
    chunker: Chunker,
    embedder: Arc<dyn EmbeddingProvider>,
    store: SharedVectorStore,
}

impl DocumentIngestor {
    pub fn new(
        chunker: Chunker,
        embedder: Arc<dyn EmbeddingProvider>,
        store: SharedVectorStore,
    ) -> Self {
        Self {
            chunker,
            embedder,
            store,
        }
    }

    /// Ingests raw text under the given source name.
    ///
    /// Each chunk is stored with `source`, `chunk_index`, `start_char`, and
    /// `end_char` metadata so retrieval hits can be traced back to their
    /// position in the document. The store is saved after a successful
    /// append; empty documents are a no-op.
    #[tracing::instrument(skip(self, raw_text))]
    pub async fn ingest_text(
        &self,
        raw_text: &str,
        source_name: &str,
    ) -> Result<IngestReport, RagError> {
        let chunks = self.chunker.chunk(raw_text, source_name);
        if chunks.is_empty() {
            tracing::info!(source = source_name, "document produced no chunks");
            let store_len = self.store.read().len();
            return Ok(IngestReport {
                chunks_indexed: 0,
                store_len,
            });
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed_many(&texts).await?;

        let metadata: Vec<Metadata> = chunks
            .iter()
            .map(|chunk| {
                let mut meta = Metadata::default();
                meta.insert("source".to_string(), json!(chunk.source_name));
                meta.insert("chunk_index".to_string(), json!(chunk.chunk_index));
                meta.insert("start_char".to_string(), json!(chunk.start_char));
                meta.insert("end_char".to_string(), json!(chunk.end_char));
                meta
            })
            .collect();

        let store_len = {
            let mut store = self.store.write();
            store.add(embeddings, texts, Some(metadata))?;
            store.save()?;
            store.len()
        };

        tracing::info!(
            source = source_name,
            chunks = chunks.len(),
            total = store_len,
            "ingested document"
        );
        Ok(IngestReport {
            chunks_indexed: chunks.len(),
            store_len,
        })
    }

    /// Reads a plain-text file and ingests it under its file name.
    ///
    /// Supported extensions: `.txt`, `.md`, `.text`. Anything else is
    /// rejected with [`RagError::Configuration`].
    pub async fn ingest_file(&self, path: impl AsRef<Path>) -> Result<IngestReport, RagError> {
        let path = path.as_ref();
        let text = extract_text(path).await?;
        let source_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.ingest_text(&text, &source_name).await
    }
}

/// Reads the text content of a supported document file.
pub async fn extract_text(path: &Path) -> Result<String, RagError> {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "txt" | "md" | "text" => tokio::fs::read_to_string(path)
            .await
            .map_err(|err| RagError::persistence(&format!("reading {}", path.display()), err)),
        other => Err(RagError::Configuration(format!(
            "unsupported file format: .{other}"
        ))),
    }
}
