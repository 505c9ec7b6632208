//! Timeout and bounded exponential backoff around an embedding provider

use super::{EmbeddingError, EmbeddingProvider};
use crate::config::{EmbeddingConfig, RetryConfig};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Budget for a single call
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_millis(5_000),
            timeout: Duration::from_millis(10_000),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(retry: &RetryConfig, embedding: &EmbeddingConfig) -> Self {
        Self {
            max_retries: retry.max_retries,
            base_delay: Duration::from_millis(retry.base_delay_ms),
            max_delay: Duration::from_millis(retry.max_delay_ms),
            timeout: Duration::from_millis(embedding.timeout_ms),
        }
    }

    /// Sleep before retry number `attempt + 1`: base * 2^attempt, capped
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// The single path every embedding call takes. Transient failures are retried
/// with backoff; permanent ones fail on the first attempt.
#[derive(Clone)]
pub struct RetryingEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    policy: RetryPolicy,
}

impl RetryingEmbedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut attempt = 0u32;
        loop {
            match self.attempt(text).await {
                Ok(embedding) => return Ok(embedding),
                Err(e) if e.is_transient() && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay_for(attempt);
                    tracing::warn!(
                        "Embedding attempt {} failed ({}), retrying in {}ms",
                        attempt + 1,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let provider = Arc::clone(&self.provider);
        let text = text.to_string();
        let call = tokio::task::spawn_blocking(move || provider.embed(&text));

        match tokio::time::timeout(self.policy.timeout, call).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(EmbeddingError::GenerationError(format!(
                "Embedding task failed: {}",
                join_error
            ))),
            Err(_) => Err(EmbeddingError::Timeout(
                self.policy.timeout.as_millis() as u64
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` calls with the error built by `make_error`
    struct Flaky {
        calls: AtomicUsize,
        failures: usize,
        make_error: fn() -> EmbeddingError,
    }

    impl EmbeddingProvider for Flaky {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err((self.make_error)())
            } else {
                Ok(vec![1.0, 0.0])
            }
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "flaky"
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            timeout: Duration::from_secs(5),
        }
    }

    fn flaky(failures: usize, make_error: fn() -> EmbeddingError) -> Arc<Flaky> {
        Arc::new(Flaky {
            calls: AtomicUsize::new(0),
            failures,
            make_error,
        })
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(200));
        assert_eq!(policy.delay_for(1), Duration::from_millis(400));
        assert_eq!(policy.delay_for(2), Duration::from_millis(800));
        assert_eq!(policy.delay_for(10), Duration::from_millis(5_000));
        assert_eq!(policy.delay_for(40), Duration::from_millis(5_000));
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let provider = flaky(2, || EmbeddingError::Throttled("429".to_string()));
        let embedder = RetryingEmbedder::new(provider.clone(), fast_policy(3));

        assert_eq!(embedder.embed("hi").await.unwrap(), vec![1.0, 0.0]);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let provider = flaky(10, || EmbeddingError::Unavailable("503".to_string()));
        let embedder = RetryingEmbedder::new(provider.clone(), fast_policy(2));

        assert!(matches!(
            embedder.embed("hi").await,
            Err(EmbeddingError::Unavailable(_))
        ));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_fail_fast() {
        let provider = flaky(10, || EmbeddingError::InvalidInput("empty".to_string()));
        let embedder = RetryingEmbedder::new(provider.clone(), fast_policy(3));

        assert!(embedder.embed("hi").await.is_err());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    struct Slow;

    impl EmbeddingProvider for Slow {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            std::thread::sleep(Duration::from_millis(200));
            Ok(vec![1.0])
        }

        fn dimension(&self) -> usize {
            1
        }

        fn model_name(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_timeout_is_transient_and_bounded() {
        let policy = RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            timeout: Duration::from_millis(20),
        };
        let embedder = RetryingEmbedder::new(Arc::new(Slow), policy);

        assert!(matches!(
            embedder.embed("hi").await,
            Err(EmbeddingError::Timeout(20))
        ));
    }
}
