//! Vector storage for retrieval.
//!
//! ```text
//!                  ┌──────────────────────┐
//!                  │     VectorStore      │
//!                  │  parallel sequences  │
//!                  │ vectors │ docs │ meta│
//!                  └──────┬───────┬───────┘
//!                 search  │       │ save / load
//!                         ▼       ▼
//!                   SearchHit   vectors.json
//!                   triples     documents.json
//!                               metadata.json
//! ```
//!
//! The store is deliberately exact and in-process: brute-force cosine
//! similarity over parallel arrays, persisted as three co-located JSON
//! artifacts that are written and read as a unit. Concurrent access goes
//! through [`SharedVectorStore`], a single reader-writer lock per store
//! instance.

pub mod vector;

pub use vector::{SearchHit, SharedVectorStore, VectorStore};
