//! Property tests for the chunker: coverage, overlap arithmetic, and
//! window ordering over randomized inputs.

use proptest::prelude::*;

use ragloom::ingestion::{clean_text, Chunker};

/// Random word-ish text: words of 1..=12 lowercase letters separated by
/// assorted whitespace, up to ~80 words.
fn arb_text() -> impl Strategy<Value = String> {
    prop::collection::vec(("[a-z]{1,12}", "[ \t\n]{1,3}"), 0..80).prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|(word, ws)| format!("{word}{ws}"))
            .collect::<String>()
    })
}

/// Valid geometry: positive chunk size, overlap strictly smaller.
fn arb_geometry() -> impl Strategy<Value = (usize, usize)> {
    (2usize..120).prop_flat_map(|size| (Just(size), 0usize..size))
}

proptest! {
    #[test]
    fn chunks_cover_every_character_of_the_cleaned_text(
        text in arb_text(),
        (chunk_size, chunk_overlap) in arb_geometry(),
    ) {
        let chunker = Chunker::new(chunk_size, chunk_overlap).unwrap();
        let cleaned_len = clean_text(&text).chars().count();
        let chunks = chunker.chunk(&text, "prop.txt");

        if cleaned_len == 0 {
            prop_assert!(chunks.is_empty());
            return Ok(());
        }

        // Ranges cover [0, cleaned_len) with no gaps between windows.
        let mut covered_until = 0usize;
        for chunk in &chunks {
            prop_assert!(chunk.start_char <= covered_until,
                "gap before window starting at {}", chunk.start_char);
            covered_until = covered_until.max(chunk.end_char);
        }
        prop_assert_eq!(covered_until, cleaned_len);
    }

    #[test]
    fn no_chunk_is_empty_and_indexes_are_dense(
        text in arb_text(),
        (chunk_size, chunk_overlap) in arb_geometry(),
    ) {
        let chunker = Chunker::new(chunk_size, chunk_overlap).unwrap();
        let chunks = chunker.chunk(&text, "prop.txt");

        for (i, chunk) in chunks.iter().enumerate() {
            prop_assert!(!chunk.content.is_empty());
            prop_assert_eq!(chunk.chunk_index, i);
            prop_assert!(chunk.end_char > chunk.start_char);
        }
    }

    #[test]
    fn start_offsets_are_monotonically_non_decreasing(
        text in arb_text(),
        (chunk_size, chunk_overlap) in arb_geometry(),
    ) {
        let chunker = Chunker::new(chunk_size, chunk_overlap).unwrap();
        let chunks = chunker.chunk(&text, "prop.txt");
        for pair in chunks.windows(2) {
            prop_assert!(pair[1].start_char >= pair[0].start_char);
        }
    }

    #[test]
    fn chunking_is_deterministic(
        text in arb_text(),
        (chunk_size, chunk_overlap) in arb_geometry(),
    ) {
        let chunker = Chunker::new(chunk_size, chunk_overlap).unwrap();
        prop_assert_eq!(
            chunker.chunk(&text, "prop.txt"),
            chunker.chunk(&text, "prop.txt")
        );
    }

    #[test]
    fn short_text_yields_at_most_one_chunk(
        text in "[a-z ]{0,20}",
        chunk_size in 21usize..100,
    ) {
        let chunker = Chunker::new(chunk_size, 0).unwrap();
        let chunks = chunker.chunk(&text, "prop.txt");
        prop_assert!(chunks.len() <= 1);
        if let Some(chunk) = chunks.first() {
            let cleaned = clean_text(&text);
            prop_assert_eq!(chunk.content.as_str(), cleaned.as_str());
        }
    }
}
