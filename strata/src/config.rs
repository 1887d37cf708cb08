use serde::Deserialize;
use std::env;
use uuid::Uuid;

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

fn parse_env_opt<T: std::str::FromStr>(var: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Ignoring.", val, var, e);
                None
            }
        },
        Err(_) => None,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub embeddings: EmbeddingsConfig,
    pub memory: MemoryConfig,
    pub contradiction: ContradictionConfig,
    pub learning: LearningConfig,
    pub llm: Option<LlmConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub auth_token: Option<String>,
    pub local_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    pub model: String,
    pub dimensions: usize,
    pub batch_size: usize,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

/// Settings for the three memory tiers.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    pub short_term_ttl_secs: u64,
    pub short_term_cache_size: usize,
    pub medium_term_collection: String,
    pub long_term_collection: String,
    /// Cosine similarity at or above which two facts are the same fact.
    pub duplicate_threshold: f32,
    /// How many nearest neighbours are compared during duplicate detection.
    pub duplicate_candidates: usize,
    pub long_term_importance_threshold: f32,
    pub default_tenant_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContradictionConfig {
    pub max_similar: usize,
    pub confidence_threshold: f32,
    pub max_llm_calls: usize,
}

/// Background learning worker pool
#[derive(Debug, Clone, Deserialize)]
pub struct LearningConfig {
    pub workers: usize,
    pub queue_size: usize,
}

/// LLM configuration for the contradiction judge
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            short_term_ttl_secs: 3600,
            short_term_cache_size: 1024,
            medium_term_collection: "medium_term_memory".to_string(),
            long_term_collection: "long_term_memory".to_string(),
            duplicate_threshold: 0.85,
            duplicate_candidates: 3,
            long_term_importance_threshold: 0.7,
            default_tenant_id: None,
        }
    }
}

impl Default for ContradictionConfig {
    fn default() -> Self {
        Self {
            max_similar: 10,
            confidence_threshold: 0.6,
            max_llm_calls: 3,
        }
    }
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_size: 256,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let memory_defaults = MemoryConfig::default();
        let contradiction_defaults = ContradictionConfig::default();
        let learning_defaults = LearningConfig::default();

        Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "file:strata.db".to_string()),
                auth_token: env::var("DATABASE_AUTH_TOKEN").ok(),
                local_path: env::var("DATABASE_LOCAL_PATH").ok(),
            },
            embeddings: EmbeddingsConfig {
                model: env::var("EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "BAAI/bge-small-en-v1.5".to_string()),
                dimensions: parse_env_or("EMBEDDING_DIMENSIONS", 384),
                batch_size: parse_env_or("EMBEDDING_BATCH_SIZE", 256),
                api_key: env::var("EMBEDDING_API_KEY").ok(),
                base_url: env::var("EMBEDDING_BASE_URL").ok(),
                timeout_secs: parse_env_or("EMBEDDING_TIMEOUT", 30),
                max_retries: parse_env_or("EMBEDDING_MAX_RETRIES", 3),
            },
            memory: MemoryConfig {
                short_term_ttl_secs: parse_env_or(
                    "SHORT_TERM_TTL_SECS",
                    memory_defaults.short_term_ttl_secs,
                ),
                short_term_cache_size: parse_env_or(
                    "SHORT_TERM_CACHE_SIZE",
                    memory_defaults.short_term_cache_size,
                ),
                medium_term_collection: env::var("MEDIUM_TERM_COLLECTION")
                    .unwrap_or(memory_defaults.medium_term_collection),
                long_term_collection: env::var("LONG_TERM_COLLECTION")
                    .unwrap_or(memory_defaults.long_term_collection),
                duplicate_threshold: parse_env_or(
                    "DUPLICATE_THRESHOLD",
                    memory_defaults.duplicate_threshold,
                ),
                duplicate_candidates: parse_env_or(
                    "DUPLICATE_CANDIDATES",
                    memory_defaults.duplicate_candidates,
                ),
                long_term_importance_threshold: parse_env_or(
                    "LONG_TERM_IMPORTANCE_THRESHOLD",
                    memory_defaults.long_term_importance_threshold,
                ),
                default_tenant_id: parse_env_opt("DEFAULT_TENANT_ID"),
            },
            contradiction: ContradictionConfig {
                max_similar: parse_env_or(
                    "CONTRADICTION_MAX_SIMILAR",
                    contradiction_defaults.max_similar,
                ),
                confidence_threshold: parse_env_or(
                    "CONTRADICTION_CONFIDENCE_THRESHOLD",
                    contradiction_defaults.confidence_threshold,
                ),
                max_llm_calls: parse_env_or(
                    "CONTRADICTION_MAX_LLM_CALLS",
                    contradiction_defaults.max_llm_calls,
                ),
            },
            learning: LearningConfig {
                workers: parse_env_or("LEARNING_WORKERS", learning_defaults.workers),
                queue_size: parse_env_or("LEARNING_QUEUE_SIZE", learning_defaults.queue_size),
            },
            llm: env::var("LLM_MODEL").ok().map(|model| LlmConfig {
                model,
                api_key: env::var("LLM_API_KEY").ok(),
                base_url: env::var("LLM_BASE_URL").ok(),
                timeout_secs: parse_env_or("LLM_TIMEOUT", 30),
                max_retries: parse_env_or("LLM_MAX_RETRIES", 3),
            }),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }
}

/// Known embedding providers that use OpenAI-compatible APIs
const KNOWN_PROVIDERS: &[&str] = &["openai", "openrouter", "ollama", "lmstudio", "local"];

/// Known LLM providers that use OpenAI-compatible APIs
pub const KNOWN_LLM_PROVIDERS: &[&str] = &["openai", "openrouter", "ollama", "lmstudio"];

/// Parse a model name into (provider, model) tuple.
pub fn parse_provider_model(model: &str) -> (&str, &str) {
    if let Some((prefix, rest)) = model.split_once('/') {
        let prefix_lower = prefix.to_lowercase();
        if KNOWN_PROVIDERS.contains(&prefix_lower.as_str()) {
            return (prefix, rest);
        }
    }
    // Default to local provider
    ("local", model)
}

/// Parse an LLM model name into (provider, model) tuple.
pub fn parse_llm_provider_model(model: &str) -> (&str, &str) {
    if let Some((prefix, rest)) = model.split_once('/') {
        let prefix_lower = prefix.to_lowercase();
        if KNOWN_LLM_PROVIDERS.contains(&prefix_lower.as_str()) {
            return (prefix, rest);
        }
    }
    ("local", model)
}
