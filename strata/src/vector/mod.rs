//! Vector-store capability used by the medium- and long-term tiers.
//!
//! Entries live in named collections. Each entry carries a document, an
//! embedding and a typed [`EntryMetadata`] payload that is persisted as JSON.

mod libsql;
mod resolver;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use self::libsql::LibSqlVectorStore;
pub use resolver::{CreateStrategy, TenantCollectionResolver};

/// Resolved collection. Cheap to clone and cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionHandle {
    pub id: String,
    pub name: String,
}

/// Metadata attached to a collection when it is created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

/// Per-entry metadata. Vector metadata only holds scalars, so the session
/// list is stored as a comma-delimited string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance_score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learned_from_sessions: Option<String>,
}

const SESSION_DELIMITER: char = ',';

impl EntryMetadata {
    pub fn for_session(session_id: &str, tenant_id: &str) -> Self {
        Self {
            session_id: Some(session_id.to_string()),
            tenant_id: Some(tenant_id.to_string()),
            ..Self::default()
        }
    }

    pub fn for_fact(tenant_id: &str, importance_score: f32, sessions: &[String]) -> Self {
        Self {
            tenant_id: Some(tenant_id.to_string()),
            importance_score: Some(importance_score),
            learned_from_sessions: Some(join_sessions(sessions)),
            ..Self::default()
        }
    }

    pub fn sessions(&self) -> Vec<String> {
        self.learned_from_sessions
            .as_deref()
            .map(split_sessions)
            .unwrap_or_default()
    }
}

pub fn join_sessions(sessions: &[String]) -> String {
    sessions.join(&SESSION_DELIMITER.to_string())
}

pub fn split_sessions(value: &str) -> Vec<String> {
    value
        .split(SESSION_DELIMITER)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub document: String,
    pub embedding: Vec<f32>,
    pub metadata: EntryMetadata,
}

#[derive(Debug, Clone)]
pub struct VectorHit {
    pub id: String,
    pub document: String,
    pub embedding: Vec<f32>,
    pub metadata: EntryMetadata,
    /// Cosine similarity to the query vector.
    pub score: f32,
}

/// Metadata predicate applied during a similarity query.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorFilter {
    SessionEq(String),
    MinImportance(f32),
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn get_collection(&self, name: &str) -> Result<Option<CollectionHandle>>;

    /// Fails with `CollectionExists` when another caller created `name` first.
    async fn create_collection(
        &self,
        name: &str,
        metadata: &CollectionMetadata,
    ) -> Result<CollectionHandle>;

    /// Insert or replace entries by id.
    async fn upsert(&self, collection: &CollectionHandle, records: &[VectorRecord]) -> Result<()>;

    /// Most similar entries first.
    async fn query(
        &self,
        collection: &CollectionHandle,
        embedding: &[f32],
        limit: usize,
        filter: Option<&VectorFilter>,
    ) -> Result<Vec<VectorHit>>;

    async fn delete(&self, collection: &CollectionHandle, ids: &[String]) -> Result<u64>;
}
