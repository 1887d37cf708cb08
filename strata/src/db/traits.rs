use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{LongTermMemory, MediumTermMemory, ShortTermContext};

// ---------------------------------------------------------------------------
// Individual store traits
// ---------------------------------------------------------------------------

/// Session → tenant records.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn register_session(&self, session_id: &str, tenant_id: &Uuid) -> Result<()>;
    async fn tenant_for_session(&self, session_id: &str) -> Result<Option<Uuid>>;
}

/// Durable layer of the short-term cache.
#[async_trait]
pub trait ShortTermStore: Send + Sync {
    async fn upsert_short_term(&self, context: &ShortTermContext) -> Result<()>;
    /// Returns the row even when it has expired.
    async fn get_short_term(&self, session_id: &str) -> Result<Option<ShortTermContext>>;
    async fn delete_short_term(&self, session_id: &str) -> Result<bool>;
}

/// Linking rows of the medium-term tier.
#[async_trait]
pub trait MediumTermStore: Send + Sync {
    async fn create_medium_term(&self, memory: &MediumTermMemory) -> Result<()>;
    async fn list_medium_term(&self, session_id: &str) -> Result<Vec<MediumTermMemory>>;
    async fn delete_medium_term_by_session(&self, session_id: &str) -> Result<u64>;
}

/// Relational rows of the long-term knowledge base.
#[async_trait]
pub trait LongTermStore: Send + Sync {
    async fn create_long_term(&self, memory: &LongTermMemory) -> Result<()>;
    async fn get_long_term(&self, id: &str) -> Result<Option<LongTermMemory>>;
    async fn get_long_term_by_embedding_id(
        &self,
        tenant_id: &Uuid,
        embedding_id: &str,
    ) -> Result<Option<LongTermMemory>>;
    async fn get_long_term_by_content(
        &self,
        tenant_id: &Uuid,
        content: &str,
    ) -> Result<Option<LongTermMemory>>;
    async fn find_long_term_by_suffix(
        &self,
        tenant_id: &Uuid,
        suffix: &str,
    ) -> Result<Vec<LongTermMemory>>;
    async fn update_long_term_merge(&self, memory: &LongTermMemory) -> Result<()>;
    async fn count_long_term(&self, tenant_id: &Uuid) -> Result<u64>;
}

// ---------------------------------------------------------------------------
// Unified backend supertrait
// ---------------------------------------------------------------------------

/// A complete relational backend for every memory tier.
#[async_trait]
pub trait DatabaseBackend: SessionStore + ShortTermStore + MediumTermStore + LongTermStore {
    /// Sync with remote (e.g. Turso replication). No-op for local-only backends.
    async fn sync(&self) -> Result<()>;
}
