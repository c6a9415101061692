//! Durable stage-snapshot sinks for pipeline observability.
//!
//! The record stage (and, when configured, every stage) hands a
//! [`StageSnapshot`] to a [`StateRecorder`]. Recording is best-effort by
//! contract: the pipeline logs and swallows recorder failures, so a broken
//! sink can never fail a chat request.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::types::RagError;

/// Point-in-time snapshot of a pipeline stage's inputs and outputs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StageSnapshot {
    /// Session the pipeline run belongs to.
    pub session_id: String,
    /// Stage name: `retrieve`, `generate`, or `complete`.
    pub stage: String,
    /// When the snapshot was taken.
    pub recorded_at: DateTime<Utc>,
    /// Stage-specific payload (query, counts, scores, response summary).
    pub data: serde_json::Value,
}

impl StageSnapshot {
    /// Builds a snapshot stamped with the current time.
    pub fn now(session_id: impl Into<String>, stage: &str, data: serde_json::Value) -> Self {
        Self {
            session_id: session_id.into(),
            stage: stage.to_string(),
            recorded_at: Utc::now(),
            data,
        }
    }
}

/// Sink for durable stage snapshots.
#[async_trait]
pub trait StateRecorder: Send + Sync {
    /// Persists one snapshot.
    async fn record(&self, snapshot: &StageSnapshot) -> Result<(), RagError>;
}

/// Appends snapshots as JSON lines to a single file.
///
/// One line per snapshot keeps the format greppable and append-only; the
/// file is created on first write.
#[derive(Clone, Debug)]
pub struct JsonlStateRecorder {
    path: PathBuf,
}

impl JsonlStateRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl StateRecorder for JsonlStateRecorder {
    async fn record(&self, snapshot: &StageSnapshot) -> Result<(), RagError> {
        let mut line = serde_json::to_vec(snapshot)
            .map_err(|err| RagError::persistence("serializing stage snapshot", err))?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|err| RagError::persistence("opening snapshot log", err))?;
        file.write_all(&line)
            .await
            .map_err(|err| RagError::persistence("appending stage snapshot", err))?;
        Ok(())
    }
}

/// Recorder that drops every snapshot. Useful when observability is off.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopStateRecorder;

#[async_trait]
impl StateRecorder for NoopStateRecorder {
    async fn record(&self, _snapshot: &StageSnapshot) -> Result<(), RagError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn jsonl_recorder_appends_one_line_per_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("states.jsonl");
        let recorder = JsonlStateRecorder::new(&path);

        recorder
            .record(&StageSnapshot::now("sess-1", "retrieve", json!({"count": 2})))
            .await
            .unwrap();
        recorder
            .record(&StageSnapshot::now("sess-1", "complete", json!({"ok": true})))
            .await
            .unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: StageSnapshot = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.stage, "retrieve");
        assert_eq!(first.data, json!({"count": 2}));
    }

    #[tokio::test]
    async fn noop_recorder_always_succeeds() {
        let recorder = NoopStateRecorder;
        recorder
            .record(&StageSnapshot::now("sess", "generate", json!({})))
            .await
            .unwrap();
    }
}
