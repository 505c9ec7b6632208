//! Multi-factor ranking score

use super::SearchHit;
use crate::analytics::{MetricPopulations, MetricZ};
use crate::config::ScoringWeights;
use crate::storage::ScoredVector;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

/// `exp(-age / halflife)`, in (0, 1] and 1 at age 0
pub fn time_decay(age_days: f64, halflife_days: f64) -> f64 {
    let age = if age_days.is_finite() { age_days.max(0.0) } else { 0.0 };
    (-age / halflife_days.max(f64::EPSILON)).exp()
}

pub fn final_score(similarity: f32, z: &MetricZ, decay: f64, weights: &ScoringWeights) -> f64 {
    weights.similarity * similarity as f64 + z.composite(weights) + weights.recency * decay
}

/// Names the factor that contributed most to the score
pub fn explain(similarity: f32, z: &MetricZ, decay: f64, weights: &ScoringWeights) -> String {
    let contributions = [
        ("semantic similarity", weights.similarity * similarity as f64),
        ("retention", weights.retention * z.retention),
        ("saves", weights.saves * z.saves),
        ("follows", weights.follows * z.follows),
        ("for-you reach", weights.for_you * z.for_you),
        ("recency", weights.recency * decay),
    ];

    let (label, value) = contributions
        .iter()
        .copied()
        .fold(contributions[0], |best, c| if c.1 > best.1 { c } else { best });

    format!("Driven by {} (+{:.2})", label, value.max(0.0))
}

/// Score every candidate against the candidate population, best first
pub fn score_candidates(
    candidates: Vec<ScoredVector>,
    weights: &ScoringWeights,
    halflife_days: f64,
    now: DateTime<Utc>,
) -> Vec<SearchHit> {
    let populations = MetricPopulations::from_metrics(candidates.iter().map(|c| &c.vector.metrics));

    let mut hits: Vec<SearchHit> = candidates
        .into_iter()
        .map(|candidate| {
            let z = populations.z_scores(&candidate.vector.metrics);
            let decay = time_decay(candidate.vector.metrics.age_days(now), halflife_days);
            let similarity = candidate.similarity;

            SearchHit {
                final_score: final_score(similarity, &z, decay, weights),
                explanation: explain(similarity, &z, decay, weights),
                vector: candidate.vector,
                similarity,
                z,
                time_decay: decay,
            }
        })
        .collect();

    hits.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.vector.video_id.cmp(&b.vector.video_id))
            .then_with(|| a.vector.content_type.cmp(&b.vector.content_type))
    });
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::video;
    use crate::content::{ContentType, ContentVector, Fragment};
    use chrono::TimeZone;

    fn candidate(id: &str, days_ago: i64, saves: u64, similarity: f32) -> ScoredVector {
        let mut record = video(id, "alice", days_ago);
        record.saves = saves;
        let vector = ContentVector::new(
            &record,
            Fragment {
                content_type: ContentType::Hook,
                text: format!("hook {}", id),
            },
            vec![1.0, 0.0],
            "hashing",
        );
        ScoredVector { vector, similarity }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_time_decay_bounds() {
        assert_eq!(time_decay(0.0, 30.0), 1.0);
        assert_eq!(time_decay(-5.0, 30.0), 1.0);
        assert!((time_decay(30.0, 30.0) - (-1.0f64).exp()).abs() < 1e-12);

        let mut previous = time_decay(0.0, 30.0);
        for age in 1..400 {
            let decay = time_decay(age as f64, 30.0);
            assert!(decay > 0.0 && decay < previous);
            previous = decay;
        }
    }

    #[test]
    fn test_score_monotonic_in_similarity() {
        let weights = ScoringWeights::default();
        let z = MetricZ {
            retention: 0.3,
            saves: -1.2,
            follows: 0.0,
            for_you: 2.0,
        };

        let mut previous = f64::NEG_INFINITY;
        for step in 0..=20 {
            let similarity = -1.0 + step as f32 * 0.1;
            let score = final_score(similarity, &z, 0.5, &weights);
            assert!(score >= previous);
            previous = score;
        }
    }

    #[test]
    fn test_identical_metrics_score_by_similarity() {
        let hits = score_candidates(
            vec![candidate("a", 1, 20, 0.2), candidate("b", 1, 20, 0.9)],
            &ScoringWeights::default(),
            30.0,
            now(),
        );

        assert_eq!(hits[0].vector.video_id, "b");
        assert_eq!(hits[0].z, MetricZ::default());
        assert!(hits[0].explanation.contains("semantic similarity"));
    }

    #[test]
    fn test_metrics_can_outrank_similarity() {
        let hits = score_candidates(
            vec![
                candidate("plain", 1, 10, 0.6),
                candidate("saved", 1, 200, 0.55),
                candidate("other", 1, 10, 0.5),
            ],
            &ScoringWeights::default(),
            30.0,
            now(),
        );

        assert_eq!(hits[0].vector.video_id, "saved");
        assert!(hits[0].z.saves > 1.0);
    }

    #[test]
    fn test_recency_breaks_ties() {
        let hits = score_candidates(
            vec![candidate("old", 90, 20, 0.5), candidate("new", 0, 20, 0.5)],
            &ScoringWeights::default(),
            30.0,
            now(),
        );

        assert_eq!(hits[0].vector.video_id, "new");
        assert_eq!(hits[0].time_decay, 1.0);
    }
}
