//! Append-only in-memory vector store with brute-force cosine search and
//! durable three-artifact persistence.
//!
//! The store keeps three parallel sequences (vectors, document texts,
//! metadata) whose position is the sole join key. Every operation preserves
//! the equal-length invariant; `add` validates batch shape and per-vector
//! dimension eagerly so a bad caller cannot corrupt future queries.
//!
//! Search is exact: cosine similarity against every stored vector, O(n·D)
//! per query. That is deliberate — this store favors simplicity and
//! exactness over scale, and approximate indexing is out of scope.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::{Metadata, RagError};

/// Guards the cosine denominator against zero vectors.
const NORM_EPSILON: f64 = 1e-10;

const VECTORS_FILE: &str = "vectors.json";
const DOCUMENTS_FILE: &str = "documents.json";
const METADATA_FILE: &str = "metadata.json";

/// A single retrieval result: document text, cosine similarity in `[-1, 1]`,
/// and the metadata stored alongside the document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchHit {
    pub text: String,
    pub score: f64,
    pub metadata: Metadata,
}

/// Shared handle for a store accessed from multiple tasks.
///
/// All mutating (`add`, `clear`, `load`, `save`) and reading (`search`,
/// `len`) access goes through this single reader-writer lock so the three
/// parallel sequences are always observed as one atomic unit. Guards must
/// not be held across `.await` points.
pub type SharedVectorStore = Arc<RwLock<VectorStore>>;

/// Append-only collection of embedding records with top-k cosine search.
///
/// # Lifecycle
///
/// [`open`](VectorStore::open) constructs the store and attempts to restore
/// persisted state; a missing or unreadable artifact set degrades to an
/// empty store (the only recoverable failure path). From there `add` only
/// grows the collection, `save` persists without touching memory, and
/// `clear` resets to empty. There is no terminal state; lifetime is
/// process-bound.
///
/// # Examples
///
/// ```no_run
/// use ragloom::stores::VectorStore;
///
/// let mut store = VectorStore::open(3, "vector_store")?;
/// store.add(
///     vec![vec![1.0, 0.0, 0.0]],
///     vec!["hello world".to_string()],
///     None,
/// )?;
/// let hits = store.search(&[1.0, 0.0, 0.0], 1);
/// assert_eq!(hits[0].text, "hello world");
/// store.save()?;
/// # Ok::<(), ragloom::types::RagError>(())
/// ```
#[derive(Debug)]
pub struct VectorStore {
    dimension: usize,
    storage_path: PathBuf,
    vectors: Vec<Vec<f64>>,
    documents: Vec<String>,
    metadata: Vec<Metadata>,
}

impl VectorStore {
    /// Opens a store rooted at `storage_path`, creating the directory and
    /// restoring any persisted artifacts.
    ///
    /// Restore failures are logged and degrade to an empty store; only a
    /// failure to create the storage directory itself is surfaced, since
    /// nothing could ever be saved there.
    pub fn open(dimension: usize, storage_path: impl AsRef<Path>) -> Result<Self, RagError> {
        if dimension == 0 {
            return Err(RagError::Configuration(
                "dimension must be positive".to_string(),
            ));
        }
        let storage_path = storage_path.as_ref().to_path_buf();
        fs::create_dir_all(&storage_path)
            .map_err(|err| RagError::persistence("creating storage directory", err))?;

        let mut store = Self {
            dimension,
            storage_path,
            vectors: Vec::new(),
            documents: Vec::new(),
            metadata: Vec::new(),
        };
        match store.load() {
            Ok(true) => {
                tracing::info!(count = store.len(), "restored vector store from disk");
            }
            Ok(false) => {
                tracing::debug!("no persisted vector store found, starting empty");
            }
            Err(err) => {
                tracing::warn!(%err, "could not load vector store, starting fresh");
                store.reset_in_memory();
            }
        }
        Ok(store)
    }

    /// Wraps the store in the reader-writer lock used by the pipeline.
    pub fn into_shared(self) -> SharedVectorStore {
        Arc::new(RwLock::new(self))
    }

    /// The fixed embedding dimension every stored vector must match.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Count of stored documents (equal across all three sequences).
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Returns `true` when nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Appends a batch to the three parallel sequences, preserving order.
    ///
    /// `metadata` defaults to one empty map per document when omitted.
    /// The batch is validated before anything is appended, so a rejected
    /// call leaves the store untouched:
    ///
    /// - [`RagError::BatchShapeMismatch`] when the sequences differ in length
    /// - [`RagError::DimensionMismatch`] when any vector's length differs
    ///   from the store dimension
    pub fn add(
        &mut self,
        vectors: Vec<Vec<f64>>,
        documents: Vec<String>,
        metadata: Option<Vec<Metadata>>,
    ) -> Result<(), RagError> {
        let metadata =
            metadata.unwrap_or_else(|| documents.iter().map(|_| Metadata::default()).collect());

        if vectors.len() != documents.len() || metadata.len() != documents.len() {
            return Err(RagError::BatchShapeMismatch {
                vectors: vectors.len(),
                documents: documents.len(),
                metadata: metadata.len(),
            });
        }
        for vector in &vectors {
            if vector.len() != self.dimension {
                return Err(RagError::DimensionMismatch {
                    expected: self.dimension,
                    actual: vector.len(),
                });
            }
        }

        let added = documents.len();
        self.vectors.extend(vectors);
        self.documents.extend(documents);
        self.metadata.extend(metadata);

        tracing::info!(added, total = self.len(), "added documents to vector store");
        Ok(())
    }

    /// Returns the `min(k, len)` most similar documents, ranked by cosine
    /// similarity descending.
    ///
    /// An empty store returns an empty result, never an error. Exactly-equal
    /// scores are broken by insertion order, so results are deterministic.
    pub fn search(&self, query_vector: &[f64], k: usize) -> Vec<SearchHit> {
        if self.is_empty() || k == 0 {
            if self.is_empty() {
                tracing::warn!("search on empty vector store");
            }
            return Vec::new();
        }

        let query_norm = l2_norm(query_vector);
        let mut scored: Vec<(usize, f64)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(idx, vector)| {
                let similarity =
                    dot(vector, query_vector) / (l2_norm(vector) * query_norm + NORM_EPSILON);
                (idx, similarity)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(k);

        let hits: Vec<SearchHit> = scored
            .into_iter()
            .map(|(idx, score)| SearchHit {
                text: self.documents[idx].clone(),
                score,
                metadata: self.metadata[idx].clone(),
            })
            .collect();

        tracing::debug!(requested = k, returned = hits.len(), "vector store search");
        hits
    }

    /// Serializes the three artifacts to the storage directory.
    ///
    /// Each artifact is written to a temp file first; renames happen only
    /// after all three temp files were written, narrowing the torn-state
    /// window to the rename sequence. A concurrent [`load`](Self::load)
    /// that observes a partial set treats it as "no persisted state".
    ///
    /// Idempotent with respect to in-memory state. Failures propagate as
    /// [`RagError::Persistence`].
    pub fn save(&self) -> Result<(), RagError> {
        let artifacts: [(&str, Vec<u8>); 3] = [
            (
                VECTORS_FILE,
                serde_json::to_vec(&self.vectors)
                    .map_err(|err| RagError::persistence("serializing vectors", err))?,
            ),
            (
                DOCUMENTS_FILE,
                serde_json::to_vec(&self.documents)
                    .map_err(|err| RagError::persistence("serializing documents", err))?,
            ),
            (
                METADATA_FILE,
                serde_json::to_vec(&self.metadata)
                    .map_err(|err| RagError::persistence("serializing metadata", err))?,
            ),
        ];

        let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(artifacts.len());
        for (name, bytes) in &artifacts {
            let target = self.storage_path.join(name);
            let temp = self.storage_path.join(format!(".{name}.tmp"));
            fs::write(&temp, bytes)
                .map_err(|err| RagError::persistence(&format!("writing {name}"), err))?;
            staged.push((temp, target));
        }
        for (temp, target) in staged {
            fs::rename(&temp, &target).map_err(|err| {
                RagError::persistence(&format!("committing {}", target.display()), err)
            })?;
        }

        tracing::info!(count = self.len(), "vector store saved");
        Ok(())
    }

    /// Restores the three artifacts if and only if all three exist.
    ///
    /// Returns `Ok(true)` when state was restored, `Ok(false)` when no
    /// complete artifact set is present (partial presence counts as absent).
    /// Deserialization failures and invariant violations in the artifacts
    /// are errors; [`open`](Self::open) absorbs them into "start fresh",
    /// but direct callers get to decide.
    pub fn load(&mut self) -> Result<bool, RagError> {
        let vectors_path = self.storage_path.join(VECTORS_FILE);
        let documents_path = self.storage_path.join(DOCUMENTS_FILE);
        let metadata_path = self.storage_path.join(METADATA_FILE);

        if !(vectors_path.exists() && documents_path.exists() && metadata_path.exists()) {
            return Ok(false);
        }

        let vectors: Vec<Vec<f64>> = read_json(&vectors_path)?;
        let documents: Vec<String> = read_json(&documents_path)?;
        let metadata: Vec<Metadata> = read_json(&metadata_path)?;

        if vectors.len() != documents.len() || metadata.len() != documents.len() {
            return Err(RagError::Persistence(format!(
                "artifact lengths differ: {} vectors, {} documents, {} metadata entries",
                vectors.len(),
                documents.len(),
                metadata.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(RagError::Persistence(format!(
                "persisted vector has dimension {}, store expects {}",
                bad.len(),
                self.dimension
            )));
        }

        self.vectors = vectors;
        self.documents = documents;
        self.metadata = metadata;
        Ok(true)
    }

    /// Resets the in-memory sequences to empty.
    ///
    /// Persisted artifacts are untouched until the next [`save`](Self::save).
    pub fn clear(&mut self) {
        self.reset_in_memory();
        tracing::info!("vector store cleared");
    }

    fn reset_in_memory(&mut self) {
        self.vectors.clear();
        self.documents.clear();
        self.metadata.clear();
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn l2_norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, RagError> {
    let bytes = fs::read(path)
        .map_err(|err| RagError::persistence(&format!("reading {}", path.display()), err))?;
    serde_json::from_slice(&bytes)
        .map_err(|err| RagError::persistence(&format!("parsing {}", path.display()), err))
}
