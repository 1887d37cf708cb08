mod api;
pub mod prompts;
mod provider;

use async_trait::async_trait;

use crate::error::Result;

pub(crate) use api::default_base_url;
pub use api::LlmApiClient;
pub use provider::{CompletionOptions, LlmBackend, LlmProvider};

/// Free-text classifier. Output is not guaranteed to be structured; callers
/// parse it defensively.
#[async_trait]
pub trait LlmJudge: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}
