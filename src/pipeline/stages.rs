//! The three concrete pipeline stages.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::message::Message;
use crate::providers::{ChatProvider, EmbeddingProvider};
use crate::recorder::{StageSnapshot, StateRecorder};
use crate::stores::SharedVectorStore;
use crate::types::{Metadata, RagError};

use super::{PipelineState, RetrievedDoc, Stage, StagePartial};

/// Reply surfaced when generation fails after exhausting retries.
pub const FALLBACK_REPLY: &str =
    "I apologize, but I encountered an error generating a response. Please try again.";

/// Embeds the query, searches the vector store, and formats the context
/// string for generation.
///
/// Failures here are non-fatal by contract: the stage degrades to an empty
/// context and reports the failure under the `retrieval_error` metadata key.
pub struct RetrieveStage {
    embedder: Arc<dyn EmbeddingProvider>,
    store: SharedVectorStore,
    top_k: usize,
}

impl RetrieveStage {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: SharedVectorStore, top_k: usize) -> Self {
        Self {
            embedder,
            store,
            top_k,
        }
    }

    /// Formats retrieved documents into the context block handed to
    /// generation: one `"Document i (relevance: score)"` block per hit,
    /// descending score, joined by blank lines.
    fn format_context(docs: &[RetrievedDoc]) -> String {
        docs.iter()
            .enumerate()
            .map(|(i, doc)| {
                format!(
                    "Document {} (relevance: {:.2}):\n{}",
                    i + 1,
                    doc.score,
                    doc.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[async_trait]
impl Stage for RetrieveStage {
    fn name(&self) -> &'static str {
        "retrieve"
    }

    async fn run(&self, state: &PipelineState) -> Result<StagePartial, RagError> {
        tracing::info!(query = %truncate(&state.query, 100), "retrieving documents");

        let query_embedding = match self.embedder.embed_one(&state.query).await {
            Ok(embedding) => embedding,
            Err(err) => {
                tracing::error!(%err, "query embedding failed, continuing without context");
                let mut metadata = Metadata::default();
                metadata.insert("retrieval_error".to_string(), json!(err.to_string()));
                return Ok(StagePartial::new()
                    .with_retrieved_docs(Vec::new())
                    .with_context("")
                    .with_metadata(metadata));
            }
        };

        // The guard is sync-only and dropped before the next await point.
        let hits = {
            let store = self.store.read();
            store.search(&query_embedding, self.top_k)
        };

        let retrieved_docs: Vec<RetrievedDoc> = hits
            .into_iter()
            .map(|hit| RetrievedDoc {
                content: hit.text,
                score: hit.score,
                metadata: hit.metadata,
            })
            .collect();

        let context = Self::format_context(&retrieved_docs);

        let mut metadata = Metadata::default();
        metadata.insert("retrieval_count".to_string(), json!(retrieved_docs.len()));
        if let Some(top) = retrieved_docs.first() {
            metadata.insert("top_score".to_string(), json!(top.score));
        }

        Ok(StagePartial::new()
            .with_retrieved_docs(retrieved_docs)
            .with_context(context)
            .with_metadata(metadata))
    }
}

/// Builds the transcript and calls the generation provider with bounded
/// retries, exponential backoff, and a per-attempt timeout.
///
/// Exhausted retries degrade to [`FALLBACK_REPLY`] with a
/// `generation_error` metadata key rather than failing the run.
pub struct GenerateStage {
    chat: Arc<dyn ChatProvider>,
    system_prompt: String,
    memory_window: usize,
    max_attempts: u32,
    retry_delay: Duration,
    timeout: Duration,
}

impl GenerateStage {
    pub fn new(
        chat: Arc<dyn ChatProvider>,
        system_prompt: impl Into<String>,
        memory_window: usize,
    ) -> Self {
        Self {
            chat,
            system_prompt: system_prompt.into(),
            memory_window,
            max_attempts: 3,
            retry_delay: Duration::from_millis(1000),
            timeout: Duration::from_secs(30),
        }
    }

    /// Override the retry policy (attempts and base backoff delay).
    #[must_use]
    pub fn with_retry(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    /// Override the per-attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Assembles the transcript: system instruction, the last
    /// `memory_window` prior turns, then the composite context/question
    /// turn. When the trailing prior turn is user-authored it is *replaced*
    /// by the composite so the model sees one merged turn instead of the
    /// raw query twice.
    fn build_transcript(&self, state: &PipelineState) -> Vec<Message> {
        let mut transcript = vec![Message::system(&self.system_prompt)];

        let window_start = state.messages.len().saturating_sub(self.memory_window);
        transcript.extend(state.messages[window_start..].iter().cloned());

        let composite = if state.context.is_empty() {
            Message::user(&format!("User question: {}", state.query))
        } else {
            Message::user(&format!(
                "Relevant context from documents:\n\n{}\n\nUser question: {}",
                state.context, state.query
            ))
        };

        match transcript.last() {
            Some(last) if last.has_role(Message::USER) => {
                let idx = transcript.len() - 1;
                transcript[idx] = composite;
            }
            _ => transcript.push(composite),
        }
        transcript
    }

    async fn complete_with_retry(&self, transcript: &[Message]) -> Result<String, RagError> {
        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            let call = self.chat.complete(transcript);
            let outcome = match tokio::time::timeout(self.timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(RagError::Generation(format!(
                    "timed out after {:?}",
                    self.timeout
                ))),
            };
            match outcome {
                Ok(reply) => return Ok(reply),
                Err(err) => {
                    tracing::warn!(attempt, %err, "generation attempt failed");
                    if attempt < self.max_attempts {
                        let backoff = self.retry_delay * 2u32.saturating_pow(attempt - 1);
                        tokio::time::sleep(backoff).await;
                    }
                    last_error = Some(err);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| RagError::Generation("no generation attempts were made".into())))
    }
}

#[async_trait]
impl Stage for GenerateStage {
    fn name(&self) -> &'static str {
        "generate"
    }

    async fn run(&self, state: &PipelineState) -> Result<StagePartial, RagError> {
        tracing::info!("generating response");

        let transcript = self.build_transcript(state);
        match self.complete_with_retry(&transcript).await {
            Ok(reply) => {
                let reply = reply.trim().to_string();
                let mut metadata = Metadata::default();
                metadata.insert("context_used".to_string(), json!(!state.context.is_empty()));
                Ok(StagePartial::new()
                    .with_response(reply.clone())
                    .with_messages(vec![Message::assistant(&reply)])
                    .with_metadata(metadata))
            }
            Err(err) => {
                tracing::error!(%err, "generation failed, returning fallback reply");
                let mut metadata = Metadata::default();
                metadata.insert("generation_error".to_string(), json!(err.to_string()));
                Ok(StagePartial::new()
                    .with_response(FALLBACK_REPLY)
                    .with_messages(vec![Message::assistant(FALLBACK_REPLY)])
                    .with_metadata(metadata))
            }
        }
    }
}

/// Takes the end-of-run snapshot through the configured recorder.
///
/// Recorder failures are logged and swallowed; observability must never
/// fail a chat request.
pub struct RecordStage {
    recorder: Arc<dyn StateRecorder>,
}

impl RecordStage {
    pub fn new(recorder: Arc<dyn StateRecorder>) -> Self {
        Self { recorder }
    }
}

#[async_trait]
impl Stage for RecordStage {
    fn name(&self) -> &'static str {
        "record"
    }

    async fn run(&self, state: &PipelineState) -> Result<StagePartial, RagError> {
        let snapshot = StageSnapshot::now(
            state.session_id.clone(),
            "complete",
            json!({
                "query": state.query,
                "response": state.response,
                "documents_used": state.retrieved_docs.len(),
                "metadata": state.metadata,
            }),
        );
        if let Err(err) = self.recorder.record(&snapshot).await {
            tracing::warn!(%err, "failed to record final pipeline state");
        }
        Ok(StagePartial::new())
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(query: &str, context: &str, messages: Vec<Message>) -> PipelineState {
        PipelineState {
            query: query.to_string(),
            context: context.to_string(),
            messages,
            ..Default::default()
        }
    }

    fn generate_stage() -> GenerateStage {
        struct Silent;
        #[async_trait]
        impl ChatProvider for Silent {
            async fn complete(&self, _messages: &[Message]) -> Result<String, RagError> {
                Ok(String::new())
            }
        }
        GenerateStage::new(Arc::new(Silent), "system prompt", 5)
    }

    #[test]
    fn context_formatting_matches_the_documented_shape() {
        let docs = vec![
            RetrievedDoc {
                content: "first passage".to_string(),
                score: 0.91234,
                metadata: Metadata::default(),
            },
            RetrievedDoc {
                content: "second passage".to_string(),
                score: 0.5,
                metadata: Metadata::default(),
            },
        ];
        let context = RetrieveStage::format_context(&docs);
        assert_eq!(
            context,
            "Document 1 (relevance: 0.91):\nfirst passage\n\nDocument 2 (relevance: 0.50):\nsecond passage"
        );
    }

    #[test]
    fn transcript_replaces_trailing_user_turn_with_composite() {
        let stage = generate_stage();
        let state = state_with(
            "what about dogs?",
            "Document 1 (relevance: 1.00):\ndogs are loyal",
            vec![
                Message::assistant("cats are independent"),
                Message::user("what about dogs?"),
            ],
        );
        let transcript = stage.build_transcript(&state);

        // system + assistant + composite; the raw trailing user turn is gone.
        assert_eq!(transcript.len(), 3);
        assert!(transcript[0].has_role(Message::SYSTEM));
        assert!(transcript[1].has_role(Message::ASSISTANT));
        assert!(transcript[2].has_role(Message::USER));
        assert!(transcript[2].content.contains("dogs are loyal"));
        assert!(transcript[2].content.contains("what about dogs?"));
        assert_eq!(
            transcript
                .iter()
                .filter(|m| m.content == "what about dogs?")
                .count(),
            0,
            "the bare query must not appear alongside the composite"
        );
    }

    #[test]
    fn transcript_appends_composite_after_assistant_turn() {
        let stage = generate_stage();
        let state = state_with(
            "and now?",
            "",
            vec![Message::assistant("previous answer")],
        );
        let transcript = stage.build_transcript(&state);
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript[2].content, "User question: and now?");
    }

    #[test]
    fn transcript_honors_the_memory_window() {
        let stage = generate_stage();
        let mut messages = Vec::new();
        for i in 0..12 {
            messages.push(Message::user(&format!("q{i}")));
            messages.push(Message::assistant(&format!("a{i}")));
        }
        let state = state_with("latest", "", messages);
        let transcript = stage.build_transcript(&state);

        // system + 5 windowed turns + appended composite (window ends on an
        // assistant turn).
        assert_eq!(transcript.len(), 7);
        assert_eq!(transcript[1].content, "a9");
        assert_eq!(transcript[6].content, "User question: latest");
    }

    #[test]
    fn bare_query_used_when_no_context_was_retrieved() {
        let stage = generate_stage();
        let state = state_with("standalone question", "", vec![]);
        let transcript = stage.build_transcript(&state);
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[1].content, "User question: standalone question");
    }
}
