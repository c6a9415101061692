//! Fixed-sequence pipeline runner.

use std::sync::Arc;

use serde_json::json;

use crate::message::Message;
use crate::recorder::{StageSnapshot, StateRecorder};
use crate::types::Metadata;

use super::stages::FALLBACK_REPLY;
use super::{PipelineState, RetrievedDoc, Stage};

/// A single pipeline invocation from an upstream caller.
#[derive(Clone, Debug, Default)]
pub struct PipelineRequest {
    /// The user's current question.
    pub query: String,
    /// Session to attribute the run to; a v4 UUID is minted when absent.
    pub session_id: Option<String>,
    /// Bounded prior conversation, oldest first.
    pub conversation_history: Vec<Message>,
}

impl PipelineRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    #[must_use]
    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.conversation_history = history;
        self
    }
}

/// What a pipeline run hands back to the caller.
#[derive(Clone, Debug)]
pub struct PipelineOutcome {
    /// The assistant reply (or the fallback apology).
    pub response: String,
    /// Session the run was attributed to.
    pub session_id: String,
    /// Documents the reply was grounded on.
    pub retrieved_docs: Vec<RetrievedDoc>,
    /// Accumulated run metadata, including any stage error annotations.
    pub metadata: Metadata,
}

/// Runs the fixed retrieve → generate → record sequence.
///
/// There is no branching: every run executes all three stages in order.
/// Stage failures are annotated in metadata rather than aborting the run,
/// and [`run`](RagPipeline::run) always produces a reply string — the
/// fallback apology when generation never succeeded.
///
/// # Examples
///
/// ```no_run
/// # use std::sync::Arc;
/// # use ragloom::pipeline::{PipelineRequest, RagPipeline, RetrieveStage, GenerateStage, RecordStage};
/// # async fn example(retrieve: RetrieveStage, generate: GenerateStage, record: RecordStage) {
/// let pipeline = RagPipeline::new(retrieve, generate, record);
/// let outcome = pipeline.run(PipelineRequest::new("What does the handbook say?")).await;
/// println!("{}", outcome.response);
/// # }
/// ```
pub struct RagPipeline {
    stages: Vec<Arc<dyn Stage>>,
    recorder: Option<Arc<dyn StateRecorder>>,
}

impl RagPipeline {
    /// Assembles the fixed three-stage sequence.
    pub fn new(
        retrieve: super::RetrieveStage,
        generate: super::GenerateStage,
        record: super::RecordStage,
    ) -> Self {
        Self {
            stages: vec![Arc::new(retrieve), Arc::new(generate), Arc::new(record)],
            recorder: None,
        }
    }

    /// Also snapshot state after every stage, not just at the record stage.
    #[must_use]
    pub fn with_stage_snapshots(mut self, recorder: Arc<dyn StateRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Executes one run.
    ///
    /// Never fails: stage errors land in `metadata` under
    /// `"{stage}_error"` keys, and a missing reply is replaced by the
    /// fallback apology.
    #[tracing::instrument(skip_all, fields(session_id))]
    pub async fn run(&self, request: PipelineRequest) -> PipelineOutcome {
        let session_id = request
            .session_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        tracing::Span::current().record("session_id", session_id.as_str());
        tracing::info!("running pipeline");

        let mut state = PipelineState {
            query: request.query,
            session_id: session_id.clone(),
            messages: request.conversation_history,
            ..Default::default()
        };
        state.metadata.insert(
            "start_time".to_string(),
            json!(chrono::Utc::now().to_rfc3339()),
        );

        for stage in &self.stages {
            match stage.run(&state).await {
                Ok(partial) => state.apply(partial),
                Err(err) => {
                    tracing::error!(stage = stage.name(), %err, "stage failed");
                    state.metadata.insert(
                        format!("{}_error", stage.name()),
                        json!(err.to_string()),
                    );
                }
            }

            if let Some(recorder) = &self.recorder {
                let snapshot = StageSnapshot::now(
                    state.session_id.clone(),
                    stage.name(),
                    json!({
                        "query": state.query,
                        "retrieved_count": state.retrieved_docs.len(),
                        "response_length": state.response.len(),
                        "metadata": state.metadata,
                    }),
                );
                if let Err(err) = recorder.record(&snapshot).await {
                    tracing::warn!(stage = stage.name(), %err, "stage snapshot failed");
                }
            }
        }

        if state.response.is_empty() {
            state.response = FALLBACK_REPLY.to_string();
        }

        PipelineOutcome {
            response: state.response,
            session_id,
            retrieved_docs: state.retrieved_docs,
            metadata: state.metadata,
        }
    }
}
