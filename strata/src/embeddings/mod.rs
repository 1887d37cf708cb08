mod api;
mod provider;


use async_trait::async_trait;

use crate::error::Result;

pub use api::EmbeddingApiClient;
pub use provider::EmbeddingProvider;

/// Text to fixed-length vector. Implementations must keep blocking work off
/// the async executor.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}
