//! Facet summaries over a search's filtered population

use crate::analytics::MetricPopulations;
use crate::config::ScoringWeights;
use crate::content::{ContentVector, DurationBucket};
use crate::stats::{mean, percentile};
use ahash::{HashSet, HashSetExt};
use serde::Serialize;
use std::collections::BTreeMap;

const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacetValue {
    pub value: String,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DurationFacet {
    pub bucket: DurationBucket,
    pub count: usize,
    pub avg_retention: Option<f64>,
    /// Mean weighted z-composite against the whole population
    pub avg_performance: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Percentiles {
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
}

impl Percentiles {
    fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        Some(Self {
            p50: percentile(values, 0.5),
            p75: percentile(values, 0.75),
            p90: percentile(values, 0.9),
        })
    }
}

/// `None` when no video has the metric
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricPercentiles {
    pub retention_pct: Option<Percentiles>,
    pub saves_per_1k: Option<Percentiles>,
    pub follows_per_1k: Option<Percentiles>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Facets {
    /// Distinct videos the facets were computed over
    pub video_count: usize,
    pub themes: Vec<FacetValue>,
    pub cta_types: Vec<FacetValue>,
    pub editing_styles: Vec<FacetValue>,
    pub durations: Vec<DurationFacet>,
    pub percentiles: MetricPercentiles,
}

/// Facets over every vector that matched the filters, counting each video once.
/// Tags and metrics are per video, so any of its fragments represents it.
pub fn compute_facets(population: &[ContentVector], weights: &ScoringWeights) -> Facets {
    let mut seen = HashSet::new();
    let videos: Vec<&ContentVector> = population
        .iter()
        .filter(|v| seen.insert(v.video_id.as_str()))
        .collect();

    if videos.is_empty() {
        return Facets::default();
    }

    let metric = |f: fn(&ContentVector) -> Option<f64>| -> Vec<f64> {
        videos.iter().filter_map(|v| f(v)).collect()
    };

    Facets {
        video_count: videos.len(),
        themes: distribution(videos.iter().map(|v| v.tags.theme.as_deref())),
        cta_types: distribution(videos.iter().map(|v| v.tags.cta_type.as_deref())),
        editing_styles: distribution(videos.iter().map(|v| v.tags.editing_style.as_deref())),
        durations: durations(&videos, weights),
        percentiles: MetricPercentiles {
            retention_pct: Percentiles::of(&metric(|v| v.metrics.retention_pct)),
            saves_per_1k: Percentiles::of(&metric(|v| v.metrics.saves_per_1k)),
            follows_per_1k: Percentiles::of(&metric(|v| v.metrics.follows_per_1k)),
        },
    }
}

/// Counts per tag value, most common first. Missing tags count as "unknown".
fn distribution<'a, I>(values: I) -> Vec<FacetValue>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut total = 0usize;
    for value in values {
        let key = value.map(str::to_lowercase).unwrap_or_else(|| UNKNOWN.to_string());
        *counts.entry(key).or_insert(0) += 1;
        total += 1;
    }

    let mut facet: Vec<FacetValue> = counts
        .into_iter()
        .map(|(value, count)| FacetValue {
            value,
            count,
            percentage: count as f64 / total as f64 * 100.0,
        })
        .collect();
    facet.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    facet
}

fn durations(videos: &[&ContentVector], weights: &ScoringWeights) -> Vec<DurationFacet> {
    let populations = MetricPopulations::from_metrics(videos.iter().map(|v| &v.metrics));

    DurationBucket::ALL
        .iter()
        .filter_map(|&bucket| {
            let members: Vec<&&ContentVector> = videos
                .iter()
                .filter(|v| DurationBucket::of(v.metrics.duration_seconds) == bucket)
                .collect();
            if members.is_empty() {
                return None;
            }

            let retention: Vec<f64> = members
                .iter()
                .filter_map(|v| v.metrics.retention_pct)
                .collect();
            let performance: Vec<f64> = members
                .iter()
                .map(|v| populations.z_scores(&v.metrics).composite(weights))
                .collect();

            Some(DurationFacet {
                bucket,
                count: members.len(),
                avg_retention: (!retention.is_empty()).then(|| mean(&retention)),
                avg_performance: mean(&performance),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::video;
    use crate::content::{ContentType, Fragment};

    fn vector(id: &str, content_type: ContentType, theme: Option<&str>, duration: f64) -> ContentVector {
        let mut record = video(id, "alice", 1);
        record.theme = theme.map(str::to_string);
        record.duration_seconds = duration;
        record.avg_time_watched = duration / 2.0;
        ContentVector::new(
            &record,
            Fragment {
                content_type,
                text: id.to_string(),
            },
            Vec::new(),
            "hashing",
        )
    }

    #[test]
    fn test_empty_population() {
        assert_eq!(compute_facets(&[], &ScoringWeights::default()), Facets::default());
    }

    #[test]
    fn test_theme_distribution_dedupes_videos() {
        let population = vec![
            vector("v1", ContentType::Hook, Some("Cooking"), 15.0),
            vector("v1", ContentType::Script, Some("Cooking"), 15.0),
            vector("v2", ContentType::Hook, Some("cooking"), 30.0),
            vector("v3", ContentType::Hook, None, 60.0),
        ];
        let facets = compute_facets(&population, &ScoringWeights::default());

        assert_eq!(facets.video_count, 3);
        assert_eq!(facets.themes[0].value, "cooking");
        assert_eq!(facets.themes[0].count, 2);
        assert_eq!(facets.themes[1].value, "unknown");
        assert_eq!(facets.cta_types.len(), 1);

        for facet in [&facets.themes, &facets.cta_types, &facets.editing_styles] {
            let total: f64 = facet.iter().map(|f| f.percentage).sum();
            assert!((total - 100.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_duration_buckets() {
        let mut population = vec![
            vector("v1", ContentType::Hook, None, 15.0),
            vector("v2", ContentType::Hook, None, 30.0),
            vector("v3", ContentType::Hook, None, 35.0),
            vector("v4", ContentType::Hook, None, 0.0),
        ];
        population[1].metrics.saves_per_1k = Some(60.0);
        population[2].metrics.saves_per_1k = Some(60.0);
        let facets = compute_facets(&population, &ScoringWeights::default());

        let buckets: Vec<(DurationBucket, usize)> =
            facets.durations.iter().map(|d| (d.bucket, d.count)).collect();
        assert_eq!(
            buckets,
            vec![(DurationBucket::Short, 2), (DurationBucket::Medium, 2)]
        );
        let short = &facets.durations[0];
        assert_eq!(short.avg_retention, Some(50.0));
        assert!(facets.durations[1].avg_performance > short.avg_performance);
    }

    #[test]
    fn test_percentiles() {
        let population: Vec<ContentVector> = (1..=5)
            .map(|i| {
                let mut v = vector(&format!("v{}", i), ContentType::Hook, None, 10.0 * i as f64);
                v.metrics.saves_per_1k = Some(i as f64 * 10.0);
                v
            })
            .collect();
        let facets = compute_facets(&population, &ScoringWeights::default());

        let saves = facets.percentiles.saves_per_1k.unwrap();
        assert_eq!(saves.p50, 30.0);
        assert_eq!(saves.p75, 40.0);
        assert!((saves.p90 - 46.0).abs() < 1e-9);
        assert!(facets.percentiles.follows_per_1k.is_some());
    }
}
