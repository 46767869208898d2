//! Property tests for fixed-size chunking.

use docrag::chunking::{Chunker, FixedSizeChunker};
use proptest::prelude::*;

/// Splitting with `(chunk_size, overlap)` covers the text without gaps, each
/// span is at most `chunk_size` characters, and consecutive spans share
/// exactly `overlap` characters until a span reaches the end of the text.
mod prop_fixed_size_overlap {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn spans_tile_the_text_with_exact_overlap(
            text in "[a-zé漢 ]{1,400}",
            chunk_size in 1usize..80,
            overlap_seed in 0usize..80,
        ) {
            prop_assume!(!text.trim().is_empty());
            let overlap = overlap_seed % chunk_size;
            let chars: Vec<char> = text.chars().collect();
            let spans = FixedSizeChunker::new(chunk_size, overlap).split(&text).unwrap();

            prop_assert!(!spans.is_empty());
            prop_assert_eq!(spans[0].start, 0);
            prop_assert_eq!(spans.last().unwrap().end, chars.len());

            for span in &spans {
                prop_assert!(span.end > span.start);
                prop_assert!(span.end - span.start <= chunk_size);
                let expected: String = chars[span.start..span.end].iter().collect();
                prop_assert_eq!(&span.text, &expected);
            }

            for pair in spans.windows(2) {
                prop_assert_eq!(pair[1].start, pair[0].start + chunk_size - overlap);
                if pair[0].end < chars.len() {
                    prop_assert_eq!(pair[0].end - pair[1].start, overlap);
                }
            }
        }

        #[test]
        fn splitting_is_deterministic(
            text in "\\PC{0,300}",
            chunk_size in 1usize..50,
        ) {
            let chunker = FixedSizeChunker::new(chunk_size, chunk_size / 3);
            prop_assert_eq!(chunker.split(&text).unwrap(), chunker.split(&text).unwrap());
        }
    }
}

#[test]
fn documented_boundaries_for_2500_characters() {
    let text = "a".repeat(2500);
    let spans = FixedSizeChunker::new(1000, 200).split(&text).unwrap();
    let starts: Vec<usize> = spans.iter().map(|s| s.start).collect();
    let ends: Vec<usize> = spans.iter().map(|s| s.end).collect();

    assert_eq!(starts, vec![0, 800, 1600, 2400]);
    assert_eq!(ends, vec![1000, 1800, 2500, 2500]);
}
