//! Runtime configuration for the ragloom pipeline.
//!
//! Settings resolve from the environment (with `.env` support via `dotenvy`)
//! and are validated eagerly: a misconfigured chunker or retriever fails at
//! startup with [`RagError::Configuration`] rather than misbehaving later.

use std::time::Duration;

use crate::types::RagError;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant with access to a document \
knowledge base. Use the provided context to answer user questions accurately. If the context \
doesn't contain relevant information, acknowledge this and provide the best answer you can \
based on your knowledge. Always cite which documents you're referencing when applicable.";

/// Tunable settings for ingestion, retrieval, generation, and persistence.
#[derive(Clone, Debug)]
pub struct RagConfig {
    /// Fixed embedding dimension enforced by the vector store.
    pub dimension: usize,
    /// Directory holding the persisted vector-store artifacts.
    pub storage_path: String,
    /// Target chunk window length in characters.
    pub chunk_size: usize,
    /// Characters of overlap between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of documents retrieved per query.
    pub top_k: usize,
    /// Prior turns forwarded to the generation provider.
    pub short_term_memory_window: usize,
    /// Generation attempts before surfacing the fallback reply.
    pub max_retry_attempts: u32,
    /// Base delay for exponential backoff between generation attempts.
    pub retry_delay: Duration,
    /// Per-attempt bound on the generation call.
    pub generation_timeout: Duration,
    /// Snapshot pipeline state after every stage, not just the record stage.
    pub record_all_stages: bool,
    /// System instruction prepended to every generation request.
    pub system_prompt: String,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            dimension: 1536,
            storage_path: "vector_store".to_string(),
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 5,
            short_term_memory_window: 5,
            max_retry_attempts: 3,
            retry_delay: Duration::from_millis(1000),
            generation_timeout: Duration::from_secs(30),
            record_all_stages: true,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl RagConfig {
    /// Resolves configuration from `RAGLOOM_*` environment variables,
    /// falling back to defaults for anything unset.
    ///
    /// Loads `.env` first so local overrides work without exporting.
    /// Returns [`RagError::Configuration`] for unparseable values or
    /// settings that fail [`validate`](Self::validate).
    pub fn from_env() -> Result<Self, RagError> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();
        if let Some(value) = env_parse::<usize>("RAGLOOM_DIMENSION")? {
            config.dimension = value;
        }
        if let Ok(value) = std::env::var("RAGLOOM_STORAGE_PATH") {
            config.storage_path = value;
        }
        if let Some(value) = env_parse::<usize>("RAGLOOM_CHUNK_SIZE")? {
            config.chunk_size = value;
        }
        if let Some(value) = env_parse::<usize>("RAGLOOM_CHUNK_OVERLAP")? {
            config.chunk_overlap = value;
        }
        if let Some(value) = env_parse::<usize>("RAGLOOM_TOP_K")? {
            config.top_k = value;
        }
        if let Some(value) = env_parse::<usize>("RAGLOOM_MEMORY_WINDOW")? {
            config.short_term_memory_window = value;
        }
        if let Some(value) = env_parse::<u32>("RAGLOOM_MAX_RETRY_ATTEMPTS")? {
            config.max_retry_attempts = value;
        }
        if let Some(value) = env_parse::<u64>("RAGLOOM_RETRY_DELAY_MS")? {
            config.retry_delay = Duration::from_millis(value);
        }
        if let Some(value) = env_parse::<u64>("RAGLOOM_GENERATION_TIMEOUT_SECS")? {
            config.generation_timeout = Duration::from_secs(value);
        }
        if let Some(value) = env_parse::<bool>("RAGLOOM_RECORD_ALL_STAGES")? {
            config.record_all_stages = value;
        }
        if let Ok(value) = std::env::var("RAGLOOM_SYSTEM_PROMPT") {
            config.system_prompt = value;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks the preconditions the chunker and retriever rely on.
    pub fn validate(&self) -> Result<(), RagError> {
        if self.dimension == 0 {
            return Err(RagError::Configuration(
                "dimension must be positive".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(RagError::Configuration(
                "chunk_size must be positive".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Configuration(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::Configuration(
                "top_k must be at least 1".to_string(),
            ));
        }
        if self.max_retry_attempts == 0 {
            return Err(RagError::Configuration(
                "max_retry_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Override the storage directory.
    #[must_use]
    pub fn with_storage_path(mut self, path: impl Into<String>) -> Self {
        self.storage_path = path.into();
        self
    }

    /// Override the embedding dimension.
    #[must_use]
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Override chunking geometry.
    #[must_use]
    pub fn with_chunking(mut self, chunk_size: usize, chunk_overlap: usize) -> Self {
        self.chunk_size = chunk_size;
        self.chunk_overlap = chunk_overlap;
        self
    }

    /// Override the number of retrieved documents per query.
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>, RagError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|err| RagError::Configuration(format!("{key}={raw} is invalid: {err}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        RagConfig::default().validate().unwrap();
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let config = RagConfig::default().with_chunking(100, 100);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));

        let config = RagConfig::default().with_chunking(100, 150);
        assert!(config.validate().is_err());

        let config = RagConfig::default().with_chunking(100, 99);
        config.validate().unwrap();
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let config = RagConfig::default().with_chunking(0, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_top_k_is_rejected() {
        let config = RagConfig::default().with_top_k(0);
        assert!(config.validate().is_err());
    }
}
