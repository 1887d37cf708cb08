use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    error::{ApiError, OpenAIError},
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
    },
    Client,
};

use crate::config::{parse_llm_provider_model, LlmConfig};
use crate::error::{Result, StrataError};
use crate::llm::provider::CompletionOptions;

pub(crate) fn default_base_url(provider: &str) -> &'static str {
    match provider.to_lowercase().as_str() {
        "openrouter" => "https://openrouter.ai/api/v1",
        "ollama" => "http://localhost:11434/v1",
        "lmstudio" => "http://localhost:1234/v1",
        _ => "https://api.openai.com/v1",
    }
}

/// How a failed chat request should be handled.
enum Failure {
    Retry(StrataError),
    Fatal(StrataError),
}

/// OpenAI-compatible chat completion client with bounded retries.
#[derive(Clone)]
pub struct LlmApiClient {
    client: Client<OpenAIConfig>,
    base_url: String,
    model: String,
    max_retries: u32,
}

impl LlmApiClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let (provider, model) = parse_llm_provider_model(&config.model);
        let needs_api_key = !matches!(
            provider.to_lowercase().as_str(),
            "ollama" | "local" | "lmstudio"
        );

        if needs_api_key && config.api_key.is_none() {
            return Err(StrataError::Llm(format!(
                "API key required for provider {provider}"
            )));
        }

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(provider).to_string());
        let model = if provider.eq_ignore_ascii_case("local") {
            config.model.clone()
        } else {
            model.to_string()
        };

        let openai_config = OpenAIConfig::new()
            .with_api_base(base_url.clone())
            .with_api_key(config.api_key.clone().unwrap_or_default());

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StrataError::Llm(format!("Failed to create LLM HTTP client: {e}")))?;

        // async-openai retries internally with its own backoff; cap it at the
        // request timeout so our retry loop stays the one in charge.
        let backoff = backoff::ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(config.timeout_secs)),
            ..Default::default()
        };

        let client = Client::with_config(openai_config)
            .with_http_client(http_client)
            .with_backoff(backoff);

        Ok(Self {
            client,
            base_url,
            model,
            max_retries: config.max_retries,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn complete(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        options: Option<&CompletionOptions>,
    ) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(StrataError::Validation("Prompt cannot be empty".to_string()));
        }

        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(100 * 2_u64.pow(attempt - 1))).await;
            }

            let request = self.build_request(prompt, system_prompt, options)?;

            match self.client.chat().create(request).await {
                Ok(response) => return Self::extract_content(response),
                Err(error) => match Self::classify(error) {
                    Failure::Retry(e) if attempt < self.max_retries => {
                        tracing::debug!(attempt, error = %e, "Retrying LLM completion");
                        last_error = Some(e);
                    }
                    Failure::Retry(e) | Failure::Fatal(e) => return Err(e),
                },
            }
        }

        Err(last_error
            .unwrap_or_else(|| StrataError::Llm("LLM completion failed after retries".to_string())))
    }

    fn build_request(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        options: Option<&CompletionOptions>,
    ) -> Result<CreateChatCompletionRequest> {
        let mut messages = Vec::new();

        if let Some(system_prompt) = system_prompt.filter(|value| !value.trim().is_empty()) {
            messages.push(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system_prompt)
                    .build()
                    .map_err(|e| StrataError::Validation(format!("Invalid system prompt: {e}")))?
                    .into(),
            );
        }

        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()
                .map_err(|e| StrataError::Validation(format!("Invalid user prompt: {e}")))?
                .into(),
        );

        let mut request = CreateChatCompletionRequestArgs::default();
        request.model(self.model.clone()).messages(messages);

        if let Some(options) = options {
            if let Some(temperature) = options.temperature {
                request.temperature(temperature);
            }
            if let Some(max_tokens) = options.max_tokens {
                request.max_tokens(max_tokens);
            }
        }

        request
            .build()
            .map_err(|e| StrataError::Validation(format!("Invalid LLM completion request: {e}")))
    }

    fn extract_content(response: CreateChatCompletionResponse) -> Result<String> {
        let message = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| StrataError::Llm("LLM response contained no choices".to_string()))?
            .message
            .content
            .unwrap_or_default();

        if message.trim().is_empty() {
            return Err(StrataError::Llm(
                "LLM response contained empty content".to_string(),
            ));
        }

        Ok(message)
    }

    fn classify(error: OpenAIError) -> Failure {
        match error {
            OpenAIError::Reqwest(e) => match e.status() {
                Some(reqwest::StatusCode::TOO_MANY_REQUESTS) => {
                    Failure::Fatal(StrataError::LlmRateLimit { retry_after: None })
                }
                Some(status)
                    if status == reqwest::StatusCode::UNAUTHORIZED
                        || status == reqwest::StatusCode::FORBIDDEN =>
                {
                    Failure::Fatal(StrataError::ApiAuth(format!(
                        "LLM authentication failed: {e}"
                    )))
                }
                Some(status) if !status.is_server_error() => {
                    Failure::Fatal(StrataError::Llm(format!("LLM request failed: {e}")))
                }
                _ => Failure::Retry(StrataError::Llm(format!("LLM request failed: {e}"))),
            },
            OpenAIError::ApiError(api_error) => {
                if is_rate_limit(&api_error) {
                    Failure::Fatal(StrataError::LlmRateLimit { retry_after: None })
                } else if is_auth(&api_error) {
                    Failure::Fatal(StrataError::ApiAuth(format!(
                        "LLM authentication failed: {api_error}"
                    )))
                } else if api_error.r#type.is_none() && api_error.code.is_none() {
                    Failure::Retry(StrataError::Llm(format!("LLM API error: {api_error}")))
                } else {
                    Failure::Fatal(StrataError::Llm(format!("LLM API error: {api_error}")))
                }
            }
            OpenAIError::JSONDeserialize(e) => {
                Failure::Fatal(StrataError::Llm(format!("Failed to parse LLM response: {e}")))
            }
            OpenAIError::InvalidArgument(message) => Failure::Fatal(StrataError::Validation(message)),
            other => Failure::Fatal(StrataError::Llm(other.to_string())),
        }
    }
}

fn api_error_fields(api_error: &ApiError) -> (String, String, String) {
    (
        api_error.message.to_lowercase(),
        api_error.r#type.clone().unwrap_or_default().to_lowercase(),
        api_error.code.clone().unwrap_or_default().to_lowercase(),
    )
}

fn is_rate_limit(api_error: &ApiError) -> bool {
    let (message, error_type, code) = api_error_fields(api_error);
    message.contains("rate limit")
        || message.contains("too many requests")
        || error_type.contains("rate_limit")
        || code.contains("rate_limit")
        || code == "insufficient_quota"
}

fn is_auth(api_error: &ApiError) -> bool {
    let (message, error_type, code) = api_error_fields(api_error);
    message.contains("unauthorized")
        || message.contains("invalid api key")
        || code.contains("invalid_api_key")
        || error_type.contains("authentication")
}
