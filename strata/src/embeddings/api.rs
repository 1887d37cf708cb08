use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::{parse_provider_model, EmbeddingsConfig};
use crate::error::{Result, StrataError};
use crate::llm::default_base_url;

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedVector>,
}

#[derive(Deserialize)]
struct EmbedVector {
    embedding: Vec<f32>,
}

/// How a failed embedding request should be handled.
enum Failure {
    Retry(StrataError),
    Fatal(StrataError),
}

/// One text per request against an OpenAI-compatible `/embeddings` endpoint.
#[derive(Clone)]
pub struct EmbeddingApiClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
    max_retries: u32,
}

impl EmbeddingApiClient {
    pub fn new(config: &EmbeddingsConfig) -> Result<Self> {
        let (provider, model) = parse_provider_model(&config.model);
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(provider).to_string());

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StrataError::Embedding(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            api_key: config.api_key.clone().filter(|key| !key.is_empty()),
            model: model.to_string(),
            dimensions: config.dimensions,
            max_retries: config.max_retries,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Embedding of `text`. Rate limits, 5xx and transport failures are
    /// retried; a vector of the wrong length is not.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(100 * 2_u64.pow(attempt - 1))).await;
            }

            let outcome = match self.send(text).await {
                Ok(response) => self.read(response).await,
                Err(e) => Err(Failure::Retry(StrataError::Embedding(format!(
                    "Request failed: {e}"
                )))),
            };

            match outcome {
                Ok(embedding) => return Ok(embedding),
                Err(Failure::Retry(e)) if attempt < self.max_retries => {
                    tracing::debug!(attempt, error = %e, model = %self.model, "Retrying embedding request");
                    last_error = Some(e);
                }
                Err(Failure::Retry(e)) | Err(Failure::Fatal(e)) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            StrataError::Embedding("Embedding request failed after retries".to_string())
        }))
    }

    async fn send(&self, text: &str) -> reqwest::Result<Response> {
        let request = self.client.post(&self.endpoint).json(&EmbedRequest {
            model: &self.model,
            input: text,
        });
        let request = match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        };
        request.send().await
    }

    async fn read(&self, response: Response) -> std::result::Result<Vec<f32>, Failure> {
        let status = response.status();
        if !status.is_success() {
            return Err(classify(status, response).await);
        }

        let body: EmbedResponse = response.json().await.map_err(|e| {
            Failure::Fatal(StrataError::Embedding(format!("Failed to parse response: {e}")))
        })?;
        let embedding = body
            .data
            .into_iter()
            .next()
            .map(|v| v.embedding)
            .ok_or_else(|| {
                Failure::Fatal(StrataError::Embedding("Response contained no embedding".to_string()))
            })?;

        if embedding.len() != self.dimensions {
            return Err(Failure::Fatal(StrataError::Embedding(format!(
                "Model {} returned {} dimensions, expected {}",
                self.model,
                embedding.len(),
                self.dimensions
            ))));
        }
        Ok(embedding)
    }
}

async fn classify(status: StatusCode, response: Response) -> Failure {
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok());
        tracing::warn!(?retry_after, "Embedding API rate limited");
        return Failure::Retry(StrataError::ApiRateLimit { retry_after });
    }

    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Failure::Fatal(StrataError::ApiAuth(body))
    } else if status.is_server_error() {
        Failure::Retry(StrataError::Embedding(format!("Server error {status}: {body}")))
    } else {
        Failure::Fatal(StrataError::Embedding(format!("API error {status}: {body}")))
    }
}
