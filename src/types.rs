//! Shared error taxonomy and common aliases for the ragloom pipeline.

use rustc_hash::FxHashMap;
use thiserror::Error;

/// Free-form metadata attached to stored documents, retrieval hits, and
/// pipeline state.
///
/// Keys are merged additively as the pipeline advances: later stages may add
/// or overwrite keys but never remove them.
pub type Metadata = FxHashMap<String, serde_json::Value>;

/// Creates an empty [`Metadata`] map.
pub fn new_metadata() -> Metadata {
    Metadata::default()
}

/// Errors surfaced by chunking, storage, and pipeline operations.
///
/// Collaborator failures (embedding, generation) carry the provider's message
/// rather than a source error because providers live behind object-safe
/// traits. Precondition violations on the vector store are typed so callers
/// can distinguish corruption risks from I/O trouble.
#[derive(Debug, Error)]
pub enum RagError {
    /// Invalid or missing configuration, validated eagerly at construction.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The embedding provider failed to produce a vector.
    #[error("embedding provider failure: {0}")]
    Embedding(String),

    /// The generation provider failed after exhausting retries.
    #[error("generation provider failure: {0}")]
    Generation(String),

    /// A vector's length does not match the store's fixed dimension.
    #[error("vector has dimension {actual}, store expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The parallel sequences handed to `add` have differing lengths.
    #[error(
        "parallel batch lengths differ: {vectors} vectors, {documents} documents, {metadata} metadata entries"
    )]
    BatchShapeMismatch {
        vectors: usize,
        documents: usize,
        metadata: usize,
    },

    /// I/O or (de)serialization failure while persisting or restoring state.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl RagError {
    /// Convenience constructor for persistence failures wrapping I/O errors.
    pub fn persistence(context: &str, err: impl std::fmt::Display) -> Self {
        RagError::Persistence(format!("{context}: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_offending_shapes() {
        let err = RagError::DimensionMismatch {
            expected: 1536,
            actual: 3,
        };
        assert_eq!(err.to_string(), "vector has dimension 3, store expects 1536");

        let err = RagError::BatchShapeMismatch {
            vectors: 2,
            documents: 3,
            metadata: 3,
        };
        assert!(err.to_string().contains("2 vectors"));
        assert!(err.to_string().contains("3 documents"));
    }
}
