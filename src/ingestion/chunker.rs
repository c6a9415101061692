//! Deterministic overlapping-window chunking with positional metadata.
//!
//! The chunker is a pure function of `(text, chunk_size, chunk_overlap)`: it
//! collapses whitespace once up front, then walks the cleaned text emitting
//! windows of roughly `chunk_size` characters that overlap by `chunk_overlap`.
//! Window boundaries snap backwards to the nearest space so words are never
//! split mid-window. All reported offsets are character offsets into the
//! *cleaned* text, not the caller's original string.

use serde::{Deserialize, Serialize};

use crate::types::RagError;

/// A bounded substring of a source document, the unit of embedding and
/// retrieval.
///
/// Chunks are immutable once produced and ordered by `chunk_index` within a
/// source. For a given document the `start_char` offsets are monotonically
/// non-decreasing and the union of `[start_char, end_char)` ranges covers the
/// cleaned text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Trimmed window content.
    pub content: String,
    /// Zero-based position of this chunk within its source document.
    pub chunk_index: usize,
    /// Start offset (characters, inclusive) into the cleaned text.
    pub start_char: usize,
    /// End offset (characters, exclusive) into the cleaned text.
    pub end_char: usize,
    /// Name of the originating document.
    pub source_name: String,
}

/// Splits cleaned text into overlapping windows suitable for independent
/// embedding.
///
/// # Examples
///
/// ```
/// use ragloom::ingestion::Chunker;
///
/// let chunker = Chunker::new(20, 5).unwrap();
/// let chunks = chunker.chunk("The quick brown fox jumps over the lazy dog", "pangram.txt");
/// assert_eq!(chunks.len(), 3);
/// assert_eq!(chunks[0].content, "The quick brown fox");
/// ```
#[derive(Clone, Debug)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    /// Creates a chunker, rejecting geometry that could stall the window
    /// cursor.
    ///
    /// Returns [`RagError::Configuration`] when `chunk_size` is zero or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, RagError> {
        if chunk_size == 0 {
            return Err(RagError::Configuration(
                "chunk_size must be positive".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::Configuration(format!(
                "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Target window length in characters.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Characters shared between consecutive windows.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Splits `text` into ordered chunks stamped with `source_name`.
    ///
    /// Whitespace runs are collapsed to single spaces and the ends trimmed
    /// before windowing. Non-final windows snap their end backwards to the
    /// nearest space strictly after the window start; windows that trim to
    /// nothing are dropped without consuming an index slot. Text shorter
    /// than `chunk_size` yields a single chunk spanning the whole cleaned
    /// text; empty or all-whitespace text yields no chunks.
    pub fn chunk(&self, text: &str, source_name: &str) -> Vec<Chunk> {
        let cleaned: Vec<char> = clean_text(text).chars().collect();
        let total = cleaned.len();

        let mut chunks = Vec::new();
        let mut chunk_index = 0usize;
        let mut start = 0usize;

        while start < total {
            let mut end = (start + self.chunk_size).min(total);

            // Snap non-final windows back to a word boundary when one exists
            // strictly inside the window.
            if start + self.chunk_size < total {
                if let Some(offset) = cleaned[start..end].iter().rposition(|c| *c == ' ') {
                    if offset > 0 {
                        end = start + offset;
                    }
                }
            }

            let content: String = cleaned[start..end].iter().collect();
            let content = content.trim();
            if !content.is_empty() {
                chunks.push(Chunk {
                    content: content.to_string(),
                    chunk_index,
                    start_char: start,
                    end_char: end,
                    source_name: source_name.to_string(),
                });
                chunk_index += 1;
            }

            start = if end < total {
                // The cursor must strictly advance even when the boundary
                // snap lands just past the window start.
                end.saturating_sub(self.chunk_overlap).max(start + 1)
            } else {
                end
            };
        }

        tracing::debug!(
            source = source_name,
            chunks = chunks.len(),
            "chunked document"
        );
        chunks
    }
}

/// Collapses whitespace runs to single spaces and trims the ends.
///
/// Applied once before windowing; chunk offsets refer to this cleaned form.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PANGRAM: &str = "The quick brown fox jumps over the lazy dog";

    #[test]
    fn rejects_degenerate_geometry() {
        assert!(Chunker::new(0, 0).is_err());
        assert!(Chunker::new(10, 10).is_err());
        assert!(Chunker::new(10, 15).is_err());
        assert!(Chunker::new(10, 9).is_ok());
    }

    #[test]
    fn cleaning_collapses_whitespace_and_trims() {
        assert_eq!(clean_text("  a\t\tb\n\nc  "), "a b c");
        assert_eq!(clean_text("already clean"), "already clean");
        assert_eq!(clean_text("   \n\t "), "");
    }

    #[test]
    fn short_text_yields_one_chunk_spanning_everything() {
        let chunker = Chunker::new(100, 10).unwrap();
        let chunks = chunker.chunk("just a short note", "note.txt");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "just a short note");
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].start_char, 0);
        assert_eq!(chunks[0].end_char, "just a short note".len());
        assert_eq!(chunks[0].source_name, "note.txt");
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunker = Chunker::new(10, 2).unwrap();
        assert!(chunker.chunk("", "empty.txt").is_empty());
        assert!(chunker.chunk("   \n\t  ", "blank.txt").is_empty());
    }

    #[test]
    fn pangram_splits_into_three_windows() {
        let chunker = Chunker::new(20, 5).unwrap();
        let chunks = chunker.chunk(PANGRAM, "pangram.txt");

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].content, "The quick brown fox");
        assert_eq!(chunks[1].content, "n fox jumps over");
        assert_eq!(chunks[2].content, "over the lazy dog");
        assert_eq!(
            chunks.iter().map(|c| c.chunk_index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn word_boundaries_are_preserved() {
        // Candidate end of the first window falls inside "ijkl"; the boundary
        // must snap back to the space instead of splitting the word.
        let chunker = Chunker::new(10, 2).unwrap();
        let chunks = chunker.chunk("abcdefgh ijkl", "words.txt");
        assert_eq!(chunks[0].content, "abcdefgh");
        assert_eq!(chunks[0].end_char, 8);
        assert!(chunks.iter().all(|c| c.content != "ijk"));
    }

    #[test]
    fn consecutive_chunks_overlap_by_the_configured_amount() {
        let chunker = Chunker::new(20, 5).unwrap();
        let chunks = chunker.chunk(PANGRAM, "pangram.txt");
        for pair in chunks.windows(2) {
            // Exact for non-final predecessors: the next start is derived
            // directly from the snapped end.
            assert_eq!(pair[0].end_char - pair[1].start_char, 5);
        }
    }

    #[test]
    fn ranges_cover_the_cleaned_text_without_gaps() {
        let chunker = Chunker::new(30, 8).unwrap();
        let text = "one two three four five six seven eight nine ten eleven twelve";
        let cleaned_len = clean_text(text).chars().count();
        let chunks = chunker.chunk(text, "counting.txt");

        let mut covered_until = 0usize;
        for chunk in &chunks {
            assert!(chunk.start_char <= covered_until, "gap before chunk");
            covered_until = covered_until.max(chunk.end_char);
        }
        assert_eq!(covered_until, cleaned_len);
    }

    #[test]
    fn start_offsets_never_regress() {
        let chunker = Chunker::new(12, 6).unwrap();
        let text = "aa bb cc dd ee ff gg hh ii jj kk ll mm nn oo pp";
        let chunks = chunker.chunk(text, "pairs.txt");
        for pair in chunks.windows(2) {
            assert!(pair[1].start_char >= pair[0].start_char);
            assert!(pair[1].start_char > pair[0].start_char || pair[1].end_char > pair[0].end_char);
        }
    }

    #[test]
    fn offsets_refer_to_cleaned_text() {
        let chunker = Chunker::new(15, 3).unwrap();
        let raw = "  spaced\t\tout\n\ncontent here  ";
        let cleaned = clean_text(raw);
        let chunks = chunker.chunk(raw, "spaced.txt");
        for chunk in &chunks {
            let window: String = cleaned
                .chars()
                .skip(chunk.start_char)
                .take(chunk.end_char - chunk.start_char)
                .collect();
            assert_eq!(window.trim(), chunk.content);
        }
    }

    #[test]
    fn no_chunk_is_empty_after_trim() {
        let chunker = Chunker::new(5, 2).unwrap();
        let chunks = chunker.chunk("a b c d e f g h i j", "letters.txt");
        assert!(chunks.iter().all(|c| !c.content.is_empty()));
    }
}
