/// Embedding & Indexing
///
/// Architecture:
/// - EmbeddingProvider trait for abstraction
/// - FastEmbedProvider for local embedding (all-MiniLM-L6-v2, 384-dim)
/// - HashingEmbedder for fully offline operation
/// - RetryingEmbedder for timeouts and backoff around any provider
/// - Indexer for per-video and bulk (re)indexing
mod hashing;
mod indexer;
mod provider;
mod retry;

pub use hashing::{HashingEmbedder, HASHING_MODEL_NAME};
pub use indexer::{IndexFailure, Indexer, ReindexReport, VideoIndexOutcome};
pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
pub use retry::{RetryPolicy, RetryingEmbedder};

use crate::config::EmbeddingConfig;
use crate::error::Result;
use std::sync::Arc;

/// Build the provider named by the configuration
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = if config.model == HASHING_MODEL_NAME {
        Arc::new(HashingEmbedder::new(config.dimension)?)
    } else {
        let provider = FastEmbedProvider::new(&config.model)?;
        if provider.dimension() != config.dimension {
            tracing::warn!(
                "Configured dimension {} differs from {} ({}D), using the model's",
                config.dimension,
                config.model,
                provider.dimension()
            );
        }
        Arc::new(provider)
    };

    Ok(provider)
}
