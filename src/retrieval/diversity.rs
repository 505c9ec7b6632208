//! Greedy maximal-marginal-relevance pass over ranked hits

use super::SearchHit;
use crate::stats::cosine_similarity;

/// Walk `hits` best first and keep a hit only if its cosine similarity to
/// every hit already kept is below `threshold`. Stops at `limit`.
///
/// Rejected hits are not used to fill up a short result.
pub fn diversify(hits: Vec<SearchHit>, threshold: f32, limit: usize) -> Vec<SearchHit> {
    let mut selected: Vec<SearchHit> = Vec::with_capacity(limit.min(hits.len()));

    for hit in hits {
        if selected.len() >= limit {
            break;
        }

        let redundant = selected.iter().any(|kept| {
            cosine_similarity(&kept.vector.embedding, &hit.vector.embedding) >= threshold
        });

        if redundant {
            tracing::debug!("Dropping near-duplicate hit {}", hit.vector_id());
        } else {
            selected.push(hit);
        }
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::MetricZ;
    use crate::catalog::fixtures::video;
    use crate::content::{ContentType, ContentVector, Fragment};

    fn hit(id: &str, embedding: Vec<f32>, score: f64) -> SearchHit {
        let vector = ContentVector::new(
            &video(id, "alice", 1),
            Fragment {
                content_type: ContentType::Hook,
                text: id.to_string(),
            },
            embedding,
            "hashing",
        );
        SearchHit {
            vector,
            similarity: 0.5,
            z: MetricZ::default(),
            time_decay: 1.0,
            final_score: score,
            explanation: String::new(),
        }
    }

    fn ids(hits: &[SearchHit]) -> Vec<&str> {
        hits.iter().map(|h| h.vector.video_id.as_str()).collect()
    }

    #[test]
    fn test_near_duplicates_dropped() {
        let hits = vec![
            hit("a", vec![1.0, 0.0], 0.9),
            hit("a-copy", vec![0.99, 0.01], 0.85),
            hit("b", vec![0.0, 1.0], 0.8),
        ];

        let kept = diversify(hits, 0.92, 10);
        assert_eq!(ids(&kept), vec!["a", "b"]);
    }

    #[test]
    fn test_pairwise_similarity_below_threshold() {
        let hits = vec![
            hit("a", vec![1.0, 0.0, 0.0], 0.9),
            hit("b", vec![0.7, 0.7, 0.0], 0.8),
            hit("c", vec![0.0, 1.0, 0.0], 0.7),
            hit("d", vec![0.0, 0.0, 1.0], 0.6),
        ];

        let kept = diversify(hits, 0.6, 10);
        for (i, x) in kept.iter().enumerate() {
            for y in &kept[i + 1..] {
                assert!(cosine_similarity(&x.vector.embedding, &y.vector.embedding) < 0.6);
            }
        }
        assert_eq!(ids(&kept), vec!["a", "c", "d"]);
    }

    #[test]
    fn test_no_backfill_past_limit() {
        let hits = vec![
            hit("a", vec![1.0, 0.0], 0.9),
            hit("a2", vec![1.0, 0.0], 0.8),
            hit("a3", vec![1.0, 0.0], 0.7),
        ];

        assert_eq!(ids(&diversify(hits.clone(), 0.92, 2)), vec!["a"]);
        assert_eq!(diversify(hits, 1.01, 2).len(), 2);
    }
}
