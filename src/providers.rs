//! Narrow contracts for the external embedding and generation collaborators.
//!
//! The pipeline never talks to a model SDK directly; it depends on these two
//! traits and treats every failure behind them as a collaborator error
//! ([`RagError::Embedding`] / [`RagError::Generation`]). Implementations are
//! expected to be pure functions of their inputs from the pipeline's
//! perspective, so calls may run on worker tasks without touching shared
//! core state.

use async_trait::async_trait;

use crate::message::Message;
use crate::types::RagError;

/// Maps text to fixed-dimension float vectors.
///
/// The dimension is fixed per provider instance and must match the vector
/// store the embeddings are written to.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// The length of every vector this provider produces.
    fn dimension(&self) -> usize;

    /// Embeds a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f64>, RagError>;

    /// Embeds a batch of texts, preserving order.
    ///
    /// The default implementation embeds sequentially; providers with a
    /// batch endpoint should override it.
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, RagError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed_one(text).await?);
        }
        Ok(embeddings)
    }
}

/// Produces a reply from an ordered conversation transcript.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Completes the conversation, returning the assistant's reply text.
    async fn complete(&self, messages: &[Message]) -> Result<String, RagError>;
}

/// Deterministic hashed bag-of-words embedder for tests and demos.
///
/// Each lowercased word hashes to one dimension; the vector counts word
/// occurrences and is L2-normalized. Texts sharing words land near each
/// other, which is all the retrieval tests need. Not a semantic model.
///
/// # Examples
///
/// ```
/// use ragloom::providers::{EmbeddingProvider, MockEmbeddingProvider};
///
/// let provider = MockEmbeddingProvider::new(64);
/// assert_eq!(provider.dimension(), 64);
/// ```
#[derive(Clone, Debug)]
pub struct MockEmbeddingProvider {
    dimension: usize,
}

impl MockEmbeddingProvider {
    /// Creates a provider emitting vectors of the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_sync(&self, text: &str) -> Vec<f64> {
        let mut vector = vec![0.0f64; self.dimension];
        for word in text.split_whitespace() {
            let word = word
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if word.is_empty() {
                continue;
            }
            let axis = (fnv1a(&word) as usize) % self.dimension;
            vector[axis] += 1.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

/// FNV-1a, used instead of the std hasher so mock vectors are stable across
/// Rust releases and platforms.
fn fnv1a(text: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in text.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f64>, RagError> {
        Ok(self.embed_sync(text))
    }
}
