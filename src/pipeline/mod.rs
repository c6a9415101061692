//! The fixed retrieve → generate → record pipeline.
//!
//! A pipeline run threads a [`PipelineState`] through three stages in order,
//! with no branching and no loops. Stages return [`StagePartial`] updates
//! that the runner merges; the metadata map accumulates additively, so a
//! later stage can add or overwrite keys but never remove what an earlier
//! stage reported.
//!
//! Failure policy, stage by stage:
//!
//! - **retrieve** absorbs its own failures into an empty context plus a
//!   `retrieval_error` metadata key — the pipeline always continues.
//! - **generate** retries with backoff, then absorbs exhausted failures into
//!   a user-facing apology plus a `generation_error` key.
//! - **record** failures are logged and swallowed.
//!
//! The runner itself guarantees a reply string comes back for every run.

pub mod runner;
pub mod stages;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::message::Message;
use crate::types::{Metadata, RagError};

pub use runner::{PipelineOutcome, PipelineRequest, RagPipeline};
pub use stages::{GenerateStage, RecordStage, RetrieveStage};

/// A document surfaced by the retrieve stage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrievedDoc {
    /// Stored chunk text.
    pub content: String,
    /// Cosine similarity to the query.
    pub score: f64,
    /// Metadata stored alongside the chunk.
    pub metadata: Metadata,
}

/// Mutable state threaded through a single pipeline run.
#[derive(Clone, Debug, Default)]
pub struct PipelineState {
    /// The user's current question.
    pub query: String,
    /// Session this run belongs to.
    pub session_id: String,
    /// Prior conversation turns, oldest first, plus turns added by stages.
    pub messages: Vec<Message>,
    /// Documents surfaced by the retrieve stage.
    pub retrieved_docs: Vec<RetrievedDoc>,
    /// Formatted context string handed to generation.
    pub context: String,
    /// The assistant reply produced by the generate stage.
    pub response: String,
    /// Accumulating run metadata; add-only across stages.
    pub metadata: Metadata,
}

impl PipelineState {
    /// Merges a stage's partial update into the state.
    ///
    /// Messages append; metadata keys are inserted (add or overwrite, never
    /// remove); scalar fields replace when the stage set them.
    pub fn apply(&mut self, partial: StagePartial) {
        if let Some(docs) = partial.retrieved_docs {
            self.retrieved_docs = docs;
        }
        if let Some(context) = partial.context {
            self.context = context;
        }
        if let Some(response) = partial.response {
            self.response = response;
        }
        if let Some(messages) = partial.messages {
            self.messages.extend(messages);
        }
        if let Some(metadata) = partial.metadata {
            self.metadata.extend(metadata);
        }
    }
}

/// Partial state update returned by a stage.
///
/// All fields are optional so a stage only touches the state it owns.
#[derive(Clone, Debug, Default)]
pub struct StagePartial {
    pub retrieved_docs: Option<Vec<RetrievedDoc>>,
    pub context: Option<String>,
    pub response: Option<String>,
    /// Messages to append to the conversation (e.g., the assistant reply).
    pub messages: Option<Vec<Message>>,
    /// Metadata keys to merge into the accumulating run metadata.
    pub metadata: Option<Metadata>,
}

impl StagePartial {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_retrieved_docs(mut self, docs: Vec<RetrievedDoc>) -> Self {
        self.retrieved_docs = Some(docs);
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    #[must_use]
    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = Some(response.into());
        self
    }

    #[must_use]
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = Some(messages);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A single pipeline stage.
///
/// Stages read the current state and return a partial update; they never
/// mutate the state directly. An `Err` from a stage is treated as an
/// unhandled failure by the runner, which annotates metadata and falls back
/// to the apology reply — stages that can degrade gracefully should do so
/// themselves and return `Ok`.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stable stage name used in metadata keys and snapshots.
    fn name(&self) -> &'static str;

    /// Executes the stage against the current state.
    async fn run(&self, state: &PipelineState) -> Result<StagePartial, RagError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn apply_merges_metadata_additively() {
        let mut state = PipelineState::default();
        let mut first = Metadata::default();
        first.insert("retrieval_count".to_string(), json!(3));
        state.apply(StagePartial::new().with_metadata(first));

        let mut second = Metadata::default();
        second.insert("context_used".to_string(), json!(true));
        state.apply(StagePartial::new().with_metadata(second));

        assert_eq!(state.metadata.get("retrieval_count"), Some(&json!(3)));
        assert_eq!(state.metadata.get("context_used"), Some(&json!(true)));
    }

    #[test]
    fn apply_appends_messages_and_replaces_scalars() {
        let mut state = PipelineState {
            messages: vec![Message::user("hi")],
            ..Default::default()
        };
        state.apply(
            StagePartial::new()
                .with_response("hello")
                .with_messages(vec![Message::assistant("hello")]),
        );
        assert_eq!(state.response, "hello");
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[1].role, Message::ASSISTANT);
    }

    #[test]
    fn empty_partial_changes_nothing() {
        let mut state = PipelineState {
            response: "kept".to_string(),
            ..Default::default()
        };
        state.apply(StagePartial::new());
        assert_eq!(state.response, "kept");
    }
}
