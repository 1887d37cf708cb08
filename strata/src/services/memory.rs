use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{Config, ContradictionConfig, LearningConfig, MemoryConfig};
use crate::db::{Database, DatabaseBackend, LibSqlBackend};
use crate::embeddings::{Embedder, EmbeddingProvider};
use crate::error::Result;
use crate::intelligence::{ContradictionCheck, ContradictionDetector, KnowledgeItem};
use crate::llm::{LlmJudge, LlmProvider};
use crate::memory::{
    AddOptions, AddOutcome, LongTermMemoryStore, MediumTermMemoryStore, ShortTermMemoryCache,
};
use crate::models::{LongTermMemory, ShortTermContext};
use crate::services::learning::LearningQueue;
use crate::vector::{LibSqlVectorStore, TenantCollectionResolver, VectorStore};

/// One tenant-aware memory subsystem: the three tiers, the contradiction
/// detector and the caches they own. Callers hold it by reference; nothing
/// here is global.
pub struct MemorySubsystem {
    backend: Arc<dyn DatabaseBackend>,
    resolver: Arc<TenantCollectionResolver>,
    short_term: ShortTermMemoryCache,
    medium_term: MediumTermMemoryStore,
    long_term: Arc<LongTermMemoryStore>,
    detector: Arc<ContradictionDetector>,
    contradiction: ContradictionConfig,
}

impl MemorySubsystem {
    /// Wire the subsystem from configuration: libsql for rows and vectors,
    /// the configured embedding model, and the LLM judge when one is set up.
    pub async fn from_config(config: &Config) -> Result<Self> {
        tracing::info!("Initializing database...");
        let db = Database::new(&config.database).await?;
        let vectors: Arc<dyn VectorStore> = Arc::new(LibSqlVectorStore::new(db.clone()));
        let backend: Arc<dyn DatabaseBackend> = Arc::new(LibSqlBackend::new(db));

        tracing::info!("Loading embedding model: {}...", config.embeddings.model);
        let embedder: Arc<dyn Embedder> = Arc::new(EmbeddingProvider::new(&config.embeddings)?);

        let llm = LlmProvider::new(config.llm.as_ref());
        let judge: Option<Arc<dyn LlmJudge>> = if llm.is_available() {
            Some(Arc::new(llm))
        } else {
            tracing::warn!("LLM unavailable - contradiction checks use heuristics only");
            None
        };

        Ok(Self::new(
            backend,
            vectors,
            embedder,
            judge,
            &config.memory,
            &config.contradiction,
        ))
    }

    pub fn new(
        backend: Arc<dyn DatabaseBackend>,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        judge: Option<Arc<dyn LlmJudge>>,
        memory: &MemoryConfig,
        contradiction: &ContradictionConfig,
    ) -> Self {
        let resolver = Arc::new(TenantCollectionResolver::new(vectors));

        let short_term = ShortTermMemoryCache::new(
            Arc::clone(&backend),
            memory.short_term_ttl_secs,
            memory.short_term_cache_size,
            memory.default_tenant_id,
        );
        let medium_term = MediumTermMemoryStore::new(
            Arc::clone(&embedder),
            Arc::clone(&resolver),
            Arc::clone(&backend),
            memory.medium_term_collection.clone(),
            memory.default_tenant_id,
        );
        let long_term = Arc::new(LongTermMemoryStore::new(
            embedder,
            Arc::clone(&resolver),
            Arc::clone(&backend),
            memory,
        ));
        let detector = Arc::new(ContradictionDetector::new(
            Arc::clone(&long_term),
            judge,
            contradiction.clone(),
        ));

        Self {
            backend,
            resolver,
            short_term,
            medium_term,
            long_term,
            detector,
            contradiction: contradiction.clone(),
        }
    }

    pub async fn register_session(&self, session_id: &str, tenant_id: &Uuid) -> Result<()> {
        self.backend.register_session(session_id, tenant_id).await
    }

    pub async fn get_short_term_memory(&self, session_id: &str) -> Option<ShortTermContext> {
        self.short_term.get(session_id).await
    }

    pub async fn update_short_term_memory(
        &self,
        session_id: &str,
        context_data: serde_json::Value,
        tenant_id: Option<Uuid>,
    ) -> Result<ShortTermContext> {
        self.short_term
            .update(session_id, context_data, tenant_id)
            .await
    }

    pub async fn add_medium_term_memory(
        &self,
        session_id: &str,
        content: &str,
    ) -> Result<Option<String>> {
        self.medium_term.add(session_id, content).await
    }

    pub async fn retrieve_medium_term_memory(
        &self,
        session_id: &str,
        query: &str,
        n: usize,
    ) -> Vec<String> {
        self.medium_term.retrieve(session_id, query, n).await
    }

    pub async fn add_long_term_memory(
        &self,
        content: &str,
        learned_from_sessions: &[String],
        importance_score: f32,
        tenant_id: Option<Uuid>,
        check_duplicates: bool,
        threshold: Option<f32>,
    ) -> Result<AddOutcome> {
        self.long_term
            .add(
                content,
                learned_from_sessions,
                importance_score,
                tenant_id,
                AddOptions {
                    check_duplicates,
                    threshold,
                },
            )
            .await
    }

    pub async fn retrieve_long_term_memory(
        &self,
        query: &str,
        n: usize,
        min_importance: Option<f32>,
        tenant_id: Option<Uuid>,
    ) -> Vec<String> {
        self.long_term
            .retrieve(query, n, min_importance, tenant_id)
            .await
    }

    pub async fn get_long_term_memory(&self, id: &str) -> Result<Option<LongTermMemory>> {
        self.long_term.get(id).await
    }

    pub fn should_store_in_long_term(&self, importance_score: f32) -> bool {
        self.long_term.should_store_in_long_term(importance_score)
    }

    pub async fn check_contradictions(
        &self,
        item: &KnowledgeItem,
        max_similar: Option<usize>,
        confidence_threshold: Option<f32>,
    ) -> ContradictionCheck {
        self.detector
            .check_with(
                item,
                max_similar.unwrap_or(self.contradiction.max_similar),
                confidence_threshold.unwrap_or(self.contradiction.confidence_threshold),
            )
            .await
    }

    /// Drop a session's short-term context and medium-term memories.
    /// Long-term facts learned from it are kept.
    pub async fn clear_session(&self, session_id: &str) -> Result<u64> {
        self.short_term.invalidate(session_id).await?;
        self.medium_term.clear_session(session_id).await
    }

    /// Start the background learning pool. Workers stop when `cancel` fires
    /// or when the queue is shut down.
    pub fn start_learning(&self, config: &LearningConfig, cancel: CancellationToken) -> LearningQueue {
        LearningQueue::start(
            Arc::clone(&self.long_term),
            Arc::clone(&self.detector),
            config,
            cancel,
        )
    }

    pub fn resolver(&self) -> &Arc<TenantCollectionResolver> {
        &self.resolver
    }

    pub fn long_term(&self) -> &Arc<LongTermMemoryStore> {
        &self.long_term
    }

    pub async fn sync(&self) -> Result<()> {
        self.backend.sync().await
    }
}
