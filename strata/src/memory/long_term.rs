use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::config::MemoryConfig;
use crate::db::DatabaseBackend;
use crate::embeddings::Embedder;
use crate::error::{Result, StrataError};
use crate::intelligence::utils::{cosine_similarity, strip_category_prefix};
use crate::models::{clamp_importance, tenant_or_nil, LongTermMemory};
use crate::vector::{
    CollectionHandle, EntryMetadata, TenantCollectionResolver, VectorFilter, VectorHit,
    VectorRecord,
};

/// Result of [`LongTermMemoryStore::add`].
///
/// `created == false` with an id means the fact merged into an existing one;
/// without an id it means the tier was unavailable and nothing was stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddOutcome {
    pub created: bool,
    pub id: Option<String>,
}

impl AddOutcome {
    fn created(id: String) -> Self {
        Self {
            created: true,
            id: Some(id),
        }
    }

    fn merged(id: String) -> Self {
        Self {
            created: false,
            id: Some(id),
        }
    }

    fn skipped() -> Self {
        Self {
            created: false,
            id: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AddOptions {
    pub check_duplicates: bool,
    /// Overrides the configured duplicate threshold.
    pub threshold: Option<f32>,
}

impl Default for AddOptions {
    fn default() -> Self {
        Self {
            check_duplicates: true,
            threshold: None,
        }
    }
}

/// A long-term fact returned by similarity search.
#[derive(Debug, Clone, Serialize)]
pub struct LongTermHit {
    pub embedding_id: String,
    pub content: String,
    pub score: f32,
    pub importance_score: Option<f32>,
}

/// Cross-session knowledge base. Near-duplicate facts are merged into the
/// existing record instead of being inserted again.
pub struct LongTermMemoryStore {
    embedder: Arc<dyn Embedder>,
    resolver: Arc<TenantCollectionResolver>,
    store: Arc<dyn DatabaseBackend>,
    base_collection: String,
    duplicate_threshold: f32,
    duplicate_candidates: usize,
    importance_threshold: f32,
    default_tenant: Option<Uuid>,
}

impl LongTermMemoryStore {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        resolver: Arc<TenantCollectionResolver>,
        store: Arc<dyn DatabaseBackend>,
        config: &MemoryConfig,
    ) -> Self {
        Self {
            embedder,
            resolver,
            store,
            base_collection: config.long_term_collection.clone(),
            duplicate_threshold: config.duplicate_threshold,
            duplicate_candidates: config.duplicate_candidates.max(1),
            importance_threshold: config.long_term_importance_threshold,
            default_tenant: config.default_tenant_id,
        }
    }

    /// Whether a fact with this importance belongs in the long-term tier.
    pub fn should_store_in_long_term(&self, importance_score: f32) -> bool {
        importance_score >= self.importance_threshold
    }

    pub async fn add(
        &self,
        content: &str,
        learned_from_sessions: &[String],
        importance_score: f32,
        tenant_id: Option<Uuid>,
        options: AddOptions,
    ) -> Result<AddOutcome> {
        let content = content.trim();
        if content.is_empty() {
            return Err(StrataError::Validation(
                "Memory content cannot be empty".to_string(),
            ));
        }

        let importance_score = clamp_importance(importance_score);
        let tenant_id = tenant_id.or(self.default_tenant);
        let tenant = tenant_or_nil(tenant_id);

        let Some(collection) = self.collection(tenant_id).await else {
            return Ok(AddOutcome::skipped());
        };

        let embedding = match self.embedder.embed(content).await {
            Ok(embedding) => embedding,
            Err(e) => {
                tracing::warn!(error = %e, "Long-term embedding failed, fact not stored");
                return Ok(AddOutcome::skipped());
            }
        };

        if options.check_duplicates {
            let threshold = options.threshold.unwrap_or(self.duplicate_threshold);
            match self
                .merge_into_duplicate(
                    &collection,
                    &tenant,
                    &embedding,
                    learned_from_sessions,
                    importance_score,
                    threshold,
                )
                .await
            {
                Ok(Some(id)) => return Ok(AddOutcome::merged(id)),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Duplicate merge failed, fact not stored");
                    return Ok(AddOutcome::skipped());
                }
            }
        }

        let memory = LongTermMemory::new(
            Uuid::new_v4().to_string(),
            tenant,
            content.to_string(),
            Uuid::new_v4().to_string(),
            learned_from_sessions.to_vec(),
            importance_score,
        );

        let record = VectorRecord {
            id: memory.embedding_id.clone(),
            document: memory.content.clone(),
            embedding,
            metadata: fact_metadata(&memory),
        };

        if let Err(e) = self.resolver.store().upsert(&collection, &[record]).await {
            tracing::warn!(error = %e, "Long-term vector upsert failed, fact not stored");
            return Ok(AddOutcome::skipped());
        }

        if let Err(e) = self.store.create_long_term(&memory).await {
            tracing::warn!(id = %memory.id, error = %e, "Long-term row not written, rolling back vector entry");
            let ids = [memory.embedding_id.clone()];
            if let Err(e) = self.resolver.store().delete(&collection, &ids).await {
                tracing::warn!(embedding_id = %memory.embedding_id, error = %e, "Vector rollback failed");
            }
            return Ok(AddOutcome::skipped());
        }

        tracing::info!(
            id = %memory.id,
            tenant = %tenant,
            importance = memory.importance_score,
            "Stored long-term memory"
        );
        Ok(AddOutcome::created(memory.id))
    }

    /// Fold the new fact into the first stored fact it duplicates, if any.
    async fn merge_into_duplicate(
        &self,
        collection: &CollectionHandle,
        tenant: &Uuid,
        embedding: &[f32],
        sessions: &[String],
        importance_score: f32,
        threshold: f32,
    ) -> Result<Option<String>> {
        let candidates = match self
            .resolver
            .store()
            .query(collection, embedding, self.duplicate_candidates, None)
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(error = %e, "Duplicate check skipped");
                return Ok(None);
            }
        };

        for candidate in candidates {
            let similarity = if candidate.embedding.is_empty() {
                candidate.score
            } else {
                cosine_similarity(embedding, &candidate.embedding)
            };
            if similarity < threshold {
                continue;
            }

            let Some(mut existing) = self.locate_row(tenant, &candidate).await? else {
                tracing::debug!(embedding_id = %candidate.id, "Duplicate candidate has no row");
                continue;
            };

            existing.absorb(sessions, importance_score);
            self.store.update_long_term_merge(&existing).await?;

            let record = VectorRecord {
                id: candidate.id.clone(),
                document: candidate.document.clone(),
                embedding: candidate.embedding.clone(),
                metadata: fact_metadata(&existing),
            };
            if !record.embedding.is_empty() {
                if let Err(e) = self.resolver.store().upsert(collection, &[record]).await {
                    tracing::warn!(id = %existing.id, error = %e, "Vector metadata refresh failed");
                }
            }

            tracing::info!(
                id = %existing.id,
                similarity,
                sessions = existing.learned_from_sessions.len(),
                "Merged duplicate long-term memory"
            );
            return Ok(Some(existing.id));
        }

        Ok(None)
    }

    /// Find the relational row behind a vector hit: by embedding id, then by
    /// exact text, then by text with any category tag removed on both sides.
    async fn locate_row(&self, tenant: &Uuid, hit: &VectorHit) -> Result<Option<LongTermMemory>> {
        if let Some(row) = self
            .store
            .get_long_term_by_embedding_id(tenant, &hit.id)
            .await?
        {
            return Ok(Some(row));
        }

        if let Some(row) = self.store.get_long_term_by_content(tenant, &hit.document).await? {
            return Ok(Some(row));
        }

        let residual = strip_category_prefix(&hit.document);
        if residual.is_empty() {
            return Ok(None);
        }
        let rows = self.store.find_long_term_by_suffix(tenant, residual).await?;
        Ok(rows
            .into_iter()
            .find(|row| strip_category_prefix(&row.content) == residual))
    }

    /// Facts most similar to `query`, most similar first. Errors propagate.
    pub async fn search(
        &self,
        query: &str,
        n: usize,
        min_importance: Option<f32>,
        tenant_id: Option<Uuid>,
    ) -> Result<Vec<LongTermHit>> {
        if n == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let tenant_id = tenant_id.or(self.default_tenant);
        let Some(collection) = self.collection(tenant_id).await else {
            return Ok(Vec::new());
        };

        let embedding = self.embedder.embed(query).await?;
        let filter = min_importance.map(VectorFilter::MinImportance);
        let hits = self
            .resolver
            .store()
            .query(&collection, &embedding, n, filter.as_ref())
            .await?;

        Ok(hits
            .into_iter()
            .map(|hit| LongTermHit {
                embedding_id: hit.id,
                content: hit.document,
                score: hit.score,
                importance_score: hit.metadata.importance_score,
            })
            .collect())
    }

    /// Content of the facts most similar to `query`. Lower-layer failures,
    /// including vector index configuration errors, yield an empty list.
    pub async fn retrieve(
        &self,
        query: &str,
        n: usize,
        min_importance: Option<f32>,
        tenant_id: Option<Uuid>,
    ) -> Vec<String> {
        match self.search(query, n, min_importance, tenant_id).await {
            Ok(hits) => hits.into_iter().map(|hit| hit.content).collect(),
            Err(e) if e.is_vector_index() => {
                tracing::warn!(error = %e, n, "Vector index rejected long-term query");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Long-term retrieval degraded");
                Vec::new()
            }
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<LongTermMemory>> {
        self.store.get_long_term(id).await
    }

    pub async fn count(&self, tenant_id: Option<Uuid>) -> Result<u64> {
        let tenant = tenant_or_nil(tenant_id.or(self.default_tenant));
        self.store.count_long_term(&tenant).await
    }

    async fn collection(&self, tenant_id: Option<Uuid>) -> Option<CollectionHandle> {
        self.resolver
            .get_collection(&self.base_collection, tenant_id)
            .await
    }
}

fn fact_metadata(memory: &LongTermMemory) -> EntryMetadata {
    EntryMetadata::for_fact(
        &memory.tenant_id.to_string(),
        memory.importance_score,
        &memory.learned_from_sessions,
    )
}
