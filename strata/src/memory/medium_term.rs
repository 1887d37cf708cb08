use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::db::DatabaseBackend;
use crate::embeddings::Embedder;
use crate::error::{Result, StrataError};
use crate::models::{tenant_or_nil, MediumTermMemory};
use crate::vector::{
    CollectionHandle, EntryMetadata, TenantCollectionResolver, VectorFilter, VectorRecord,
};

/// Session-scoped semantic memory. Recall is best effort: every failure
/// below this layer is logged and turned into "nothing found".
pub struct MediumTermMemoryStore {
    embedder: Arc<dyn Embedder>,
    resolver: Arc<TenantCollectionResolver>,
    store: Arc<dyn DatabaseBackend>,
    base_collection: String,
    default_tenant: Option<Uuid>,
}

impl MediumTermMemoryStore {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        resolver: Arc<TenantCollectionResolver>,
        store: Arc<dyn DatabaseBackend>,
        base_collection: impl Into<String>,
        default_tenant: Option<Uuid>,
    ) -> Self {
        Self {
            embedder,
            resolver,
            store,
            base_collection: base_collection.into(),
            default_tenant,
        }
    }

    /// Embed and store `content` for the session. Returns the new memory id,
    /// or `None` when a collaborator is unavailable.
    pub async fn add(&self, session_id: &str, content: &str) -> Result<Option<String>> {
        if content.trim().is_empty() {
            return Err(StrataError::Validation(
                "Memory content cannot be empty".to_string(),
            ));
        }

        let tenant_id = self.session_tenant(session_id).await;
        let Some(collection) = self.collection(tenant_id).await else {
            return Ok(None);
        };

        let embedding = match self.embedder.embed(content).await {
            Ok(embedding) => embedding,
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Medium-term embedding failed");
                return Ok(None);
            }
        };

        let tenant = tenant_or_nil(tenant_id);
        let embedding_id = Uuid::new_v4().to_string();
        let record = VectorRecord {
            id: embedding_id.clone(),
            document: content.to_string(),
            embedding,
            metadata: EntryMetadata::for_session(session_id, &tenant.to_string()),
        };

        if let Err(e) = self.resolver.store().upsert(&collection, &[record]).await {
            tracing::warn!(session_id = %session_id, error = %e, "Medium-term vector upsert failed");
            return Ok(None);
        }

        let memory = MediumTermMemory {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            tenant_id: tenant,
            content: content.to_string(),
            embedding_id,
            created_at: Utc::now(),
        };

        if let Err(e) = self.store.create_medium_term(&memory).await {
            tracing::warn!(
                session_id = %session_id,
                embedding_id = %memory.embedding_id,
                error = %e,
                "Medium-term linking row not written, rolling back vector entry"
            );
            let ids = [memory.embedding_id.clone()];
            if let Err(e) = self.resolver.store().delete(&collection, &ids).await {
                tracing::warn!(embedding_id = %memory.embedding_id, error = %e, "Vector rollback failed");
            }
            return Ok(None);
        }

        tracing::debug!(session_id = %session_id, id = %memory.id, "Stored medium-term memory");
        Ok(Some(memory.id))
    }

    /// Top `n` memories of the session most similar to `query`. Never fails.
    pub async fn retrieve(&self, session_id: &str, query: &str, n: usize) -> Vec<String> {
        match self.try_retrieve(session_id, query, n).await {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Medium-term retrieval degraded");
                Vec::new()
            }
        }
    }

    async fn try_retrieve(&self, session_id: &str, query: &str, n: usize) -> Result<Vec<String>> {
        if n == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let tenant_id = self.session_tenant(session_id).await;
        let Some(collection) = self.collection(tenant_id).await else {
            return Ok(Vec::new());
        };

        let embedding = self.embedder.embed(query).await?;
        let filter = VectorFilter::SessionEq(session_id.to_string());
        let hits = self
            .resolver
            .store()
            .query(&collection, &embedding, n, Some(&filter))
            .await?;

        Ok(hits.into_iter().map(|hit| hit.document).collect())
    }

    /// Remove every memory of the session from both stores.
    pub async fn clear_session(&self, session_id: &str) -> Result<u64> {
        let memories = self.store.list_medium_term(session_id).await?;
        if memories.is_empty() {
            return Ok(0);
        }

        let tenant_id = self.session_tenant(session_id).await;
        if let Some(collection) = self.collection(tenant_id).await {
            let ids: Vec<String> = memories.iter().map(|m| m.embedding_id.clone()).collect();
            self.resolver.store().delete(&collection, &ids).await?;
        }

        let removed = self.store.delete_medium_term_by_session(session_id).await?;
        tracing::info!(session_id = %session_id, removed, "Cleared medium-term memories");
        Ok(removed)
    }

    async fn session_tenant(&self, session_id: &str) -> Option<Uuid> {
        match self.store.tenant_for_session(session_id).await {
            Ok(Some(tenant_id)) => Some(tenant_id),
            Ok(None) => self.default_tenant,
            Err(e) => {
                tracing::debug!(session_id = %session_id, error = %e, "Session tenant lookup failed");
                self.default_tenant
            }
        }
    }

    async fn collection(&self, tenant_id: Option<Uuid>) -> Option<CollectionHandle> {
        self.resolver
            .get_collection(&self.base_collection, tenant_id)
            .await
    }
}
