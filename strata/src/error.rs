use thiserror::Error;

#[derive(Error, Debug)]
pub enum StrataError {
    #[error("Database error: {0}")]
    Database(#[from] libsql::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Collection already exists: {0}")]
    CollectionExists(String),

    /// Raised by the vector index when its tuning parameters reject a query
    /// (e.g. a search limit larger than the index allows).
    #[error("Vector index configuration error: {0}")]
    VectorIndex(String),

    #[error("No tenant could be resolved for session {session_id}")]
    MissingTenant { session_id: String },

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("API rate limit exceeded, retry after {retry_after:?} seconds")]
    ApiRateLimit { retry_after: Option<u64> },

    #[error("API authentication error: {0}")]
    ApiAuth(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    #[error("LLM rate limit exceeded, retry after {retry_after:?} seconds")]
    LlmRateLimit { retry_after: Option<u64> },

    #[error("Learning queue is full ({capacity} pending tasks)")]
    QueueFull { capacity: usize },

    #[error("Learning queue is shut down")]
    QueueClosed,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StrataError {
    /// Transient failures of a collaborator (database, vector store, embedding
    /// model, LLM). Read paths degrade on these instead of propagating them.
    pub fn is_infrastructure(&self) -> bool {
        !matches!(
            self,
            StrataError::MissingTenant { .. } | StrataError::Validation(_)
        )
    }

    pub fn is_vector_index(&self) -> bool {
        matches!(self, StrataError::VectorIndex(_))
    }
}

pub type Result<T> = std::result::Result<T, StrataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tenant_is_a_logic_error() {
        let error = StrataError::MissingTenant {
            session_id: "s1".to_string(),
        };
        assert!(!error.is_infrastructure());
        assert_eq!(
            error.to_string(),
            "No tenant could be resolved for session s1"
        );
    }

    #[test]
    fn test_vector_errors_are_infrastructure() {
        assert!(StrataError::VectorStore("down".to_string()).is_infrastructure());
        assert!(StrataError::VectorIndex("ef too small".to_string()).is_infrastructure());
        assert!(StrataError::VectorIndex("ef too small".to_string()).is_vector_index());
        assert!(!StrataError::Embedding("boom".to_string()).is_vector_index());
    }
}
