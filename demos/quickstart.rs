//! Minimal end-to-end walkthrough: ingest a document, ask a question.
//!
//! Uses the deterministic mock embedder and a canned chat provider so it
//! runs offline. Swap those two for real providers to talk to a model.
//!
//! Run with: `cargo run --example quickstart`

use std::sync::Arc;

use async_trait::async_trait;

use ragloom::{
    ChatProvider, Chunker, DocumentIngestor, GenerateStage, Message, MockEmbeddingProvider,
    NoopStateRecorder, PipelineRequest, RagConfig, RagError, RagPipeline, RecordStage,
    RetrieveStage, VectorStore,
};

/// Stand-in generation provider: quotes the first context line back.
struct CannedChat;

#[async_trait]
impl ChatProvider for CannedChat {
    async fn complete(&self, messages: &[Message]) -> Result<String, RagError> {
        let prompt = messages.last().map(|m| m.content.as_str()).unwrap_or("");
        let quoted = prompt.lines().nth(2).unwrap_or("(no context retrieved)");
        Ok(format!("Based on the documents: {quoted}"))
    }
}

#[tokio::main]
async fn main() -> Result<(), RagError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = RagConfig::default()
        .with_dimension(64)
        .with_chunking(120, 20)
        .with_top_k(2)
        .with_storage_path("target/quickstart_store");
    config.validate()?;

    let embedder = Arc::new(MockEmbeddingProvider::new(config.dimension));
    let store = VectorStore::open(config.dimension, &config.storage_path)?.into_shared();

    let ingestor = DocumentIngestor::new(
        Chunker::new(config.chunk_size, config.chunk_overlap)?,
        embedder.clone(),
        store.clone(),
    );
    let report = ingestor
        .ingest_text(
            "Employees may work remotely up to two days per week. Remote days must be \
             agreed with the team lead. Travel must be booked through the internal \
             portal at least ten days before departure. Expense reports are due within \
             two weeks of the trip.",
            "handbook.txt",
        )
        .await?;
    println!("indexed {} chunks", report.chunks_indexed);

    let pipeline = RagPipeline::new(
        RetrieveStage::new(embedder, store, config.top_k),
        GenerateStage::new(
            Arc::new(CannedChat),
            &config.system_prompt,
            config.short_term_memory_window,
        )
        .with_retry(config.max_retry_attempts, config.retry_delay)
        .with_timeout(config.generation_timeout),
        RecordStage::new(Arc::new(NoopStateRecorder)),
    );

    let outcome = pipeline
        .run(PipelineRequest::new("How far in advance must travel be booked?"))
        .await;

    println!("session: {}", outcome.session_id);
    for (i, doc) in outcome.retrieved_docs.iter().enumerate() {
        println!("hit {}: {:.2} | {}", i + 1, doc.score, doc.content);
    }
    println!("reply: {}", outcome.response);
    Ok(())
}
