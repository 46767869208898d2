//! Property tests for in-memory vector store search ordering.

use docrag::document::{Locator, Segment, SourceMetadata};
use docrag::inmemory::InMemoryVectorStore;
use docrag::vectorstore::VectorStore;
use proptest::prelude::*;

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map(
        "non-zero embedding",
        |mut v| {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm < 1e-8 {
                return None;
            }
            for val in &mut v {
                *val /= norm;
            }
            Some(v)
        },
    )
}

/// Generate segments at distinct offsets so every id is unique.
fn arb_segments(dim: usize) -> impl Strategy<Value = Vec<Segment>> {
    proptest::collection::vec(("[a-z ]{5,30}", arb_normalized_embedding(dim)), 1..20).prop_map(
        |items| {
            items
                .into_iter()
                .enumerate()
                .map(|(i, (text, vector))| {
                    let metadata = SourceMetadata {
                        source: "doc_1.txt".to_string(),
                        locator: Locator::Offset(0),
                        start: i * 100,
                        end: i * 100 + text.chars().count(),
                    };
                    Segment::new(text, metadata).with_vector(vector)
                })
                .collect()
        },
    )
}

/// Search over an in-memory store returns at most `top_k` results (all of them
/// when fewer are stored) ordered by descending cosine similarity, with equal
/// scores in insertion order.
mod prop_inmemory_search_ordering {
    use super::*;

    const DIM: usize = 16;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ordered_descending_and_bounded_by_top_k(
            segments in arb_segments(DIM),
            query in arb_normalized_embedding(DIM),
            top_k in 1usize..25,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let results = rt.block_on(async {
                let store = InMemoryVectorStore::new();
                for segment in &segments {
                    store.upsert(segment).await.unwrap();
                }
                store.search(&query, top_k).await.unwrap()
            });

            prop_assert_eq!(results.len(), top_k.min(segments.len()));

            let position = |id: &str| segments.iter().position(|s| s.id == id).unwrap();
            for window in results.windows(2) {
                prop_assert!(
                    window[0].score >= window[1].score,
                    "results not in descending order: {} < {}",
                    window[0].score,
                    window[1].score,
                );
                if window[0].score == window[1].score {
                    prop_assert!(position(&window[0].segment.id) < position(&window[1].segment.id));
                }
            }
        }

        #[test]
        fn repeated_inserts_do_not_duplicate(
            segments in arb_segments(DIM),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (first, second, len) = rt.block_on(async {
                let store = InMemoryVectorStore::new();
                let mut first = 0;
                for segment in &segments {
                    first += usize::from(store.upsert_if_absent(segment).await.unwrap());
                }
                let mut second = 0;
                for segment in &segments {
                    second += usize::from(store.upsert_if_absent(segment).await.unwrap());
                }
                (first, second, store.len().await.unwrap())
            });

            prop_assert_eq!(first, segments.len());
            prop_assert_eq!(second, 0);
            prop_assert_eq!(len, segments.len());
        }
    }
}
