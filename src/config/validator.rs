use crate::config::Config;
use crate::error::{BrainError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every failure
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_retry(config, &mut errors);
        Self::validate_indexing(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_analytics(config, &mut errors);
        Self::validate_learning(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(BrainError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory cannot be empty",
            ));
        }

        if config.storage.database_file.is_empty() {
            errors.push(ValidationError::new(
                "storage.database_file",
                "Database file name cannot be empty",
            ));
        }

        if config.storage.pool_size == 0 {
            errors.push(ValidationError::new(
                "storage.pool_size",
                "Pool size must be greater than 0",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if config.embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "Dimension must be greater than 0",
            ));
        }

        if config.embedding.timeout_ms == 0 {
            errors.push(ValidationError::new(
                "embedding.timeout_ms",
                "Timeout must be greater than 0",
            ));
        }
    }

    fn validate_retry(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.retry.max_retries > 10 {
            errors.push(ValidationError::new(
                "retry.max_retries",
                format!(
                    "At most 10 retries are allowed, got {}",
                    config.retry.max_retries
                ),
            ));
        }

        if config.retry.base_delay_ms > config.retry.max_delay_ms {
            errors.push(ValidationError::new(
                "retry.base_delay_ms",
                "Base delay cannot exceed max delay",
            ));
        }
    }

    fn validate_indexing(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.indexing.max_concurrency == 0 {
            errors.push(ValidationError::new(
                "indexing.max_concurrency",
                "Concurrency must be greater than 0",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;

        if retrieval.oversample_factor == 0 {
            errors.push(ValidationError::new(
                "retrieval.oversample_factor",
                "Oversample factor must be greater than 0",
            ));
        }

        if retrieval.max_top_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.max_top_k",
                "max_top_k must be greater than 0",
            ));
        }

        if !(0.0..=1.0).contains(&retrieval.diversity_threshold) {
            errors.push(ValidationError::new(
                "retrieval.diversity_threshold",
                format!(
                    "Threshold must be within [0, 1], got {}",
                    retrieval.diversity_threshold
                ),
            ));
        }

        if retrieval.recency_halflife_days <= 0.0 {
            errors.push(ValidationError::new(
                "retrieval.recency_halflife_days",
                "Half-life must be positive",
            ));
        }

        let w = &retrieval.weights;
        if w.similarity <= 0.0 {
            errors.push(ValidationError::new(
                "retrieval.weights.similarity",
                "Similarity weight must be positive",
            ));
        }
        for (name, value) in [
            ("retention", w.retention),
            ("saves", w.saves),
            ("follows", w.follows),
            ("for_you", w.for_you),
            ("recency", w.recency),
        ] {
            if value < 0.0 || !value.is_finite() {
                errors.push(ValidationError::new(
                    format!("retrieval.weights.{}", name),
                    "Weight must be a non-negative number",
                ));
            }
        }
    }

    fn validate_analytics(config: &Config, errors: &mut Vec<ValidationError>) {
        let analytics = &config.analytics;

        if analytics.min_cluster_size < 3 {
            errors.push(ValidationError::new(
                "analytics.min_cluster_size",
                "Clusters need at least 3 members",
            ));
        }

        if !(0.0..=1.0).contains(&analytics.cluster_similarity_threshold) {
            errors.push(ValidationError::new(
                "analytics.cluster_similarity_threshold",
                "Threshold must be within [0, 1]",
            ));
        }

        if analytics.prediction_neighbors == 0 {
            errors.push(ValidationError::new(
                "analytics.prediction_neighbors",
                "Neighbor count must be greater than 0",
            ));
        }

        for (name, value) in [
            ("confidence_floor", analytics.confidence_floor),
            ("insight_confidence_floor", analytics.insight_confidence_floor),
        ] {
            if !(0.0..=100.0).contains(&value) {
                errors.push(ValidationError::new(
                    format!("analytics.{}", name),
                    "Confidence floors must be within [0, 100]",
                ));
            }
        }

        if analytics.anomaly_std_devs <= 0.0 {
            errors.push(ValidationError::new(
                "analytics.anomaly_std_devs",
                "Anomaly threshold must be positive",
            ));
        }
    }

    fn validate_learning(config: &Config, errors: &mut Vec<ValidationError>) {
        let learning = &config.learning;

        if !(0.0..=0.5).contains(&learning.learning_rate) {
            errors.push(ValidationError::new(
                "learning.learning_rate",
                "Learning rate must be within [0, 0.5]",
            ));
        }

        // Three weights must fit: 3 * min <= 1 <= 3 * max
        if learning.min_weight < 0.0
            || learning.min_weight >= learning.max_weight
            || learning.min_weight * 3.0 > 1.0
            || learning.max_weight * 3.0 < 1.0
        {
            errors.push(ValidationError::new(
                "learning.min_weight",
                "Weight bounds must satisfy 0 <= min < max and admit weights summing to 1",
            ));
        }
    }
}
