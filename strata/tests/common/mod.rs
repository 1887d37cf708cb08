#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use tempfile::TempDir;

use strata::config::{ContradictionConfig, MemoryConfig};
use strata::db::{Database, DatabaseBackend, LibSqlBackend};
use strata::embeddings::Embedder;
use strata::error::{Result, StrataError};
use strata::llm::LlmJudge;
use strata::vector::{
    CollectionHandle, CollectionMetadata, LibSqlVectorStore, VectorFilter, VectorHit, VectorRecord,
    VectorStore,
};
use strata::MemorySubsystem;

static INIT: Once = Once::new();

/// Initialize tracing subscriber once for tests
pub fn init_test_logger() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

const DIMENSIONS: usize = 256;

/// Deterministic bag-of-words embedder: identical texts embed identically
/// and similarity grows with shared words.
pub struct HashEmbedder;

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; DIMENSIONS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() as usize) % DIMENSIONS] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(vector)
    }
}

/// Judge that replays scripted answers (repeating the last one) and counts calls.
pub struct ScriptedJudge {
    responses: Mutex<VecDeque<String>>,
    fallback: String,
    calls: AtomicUsize,
}

impl ScriptedJudge {
    pub fn always(response: &str) -> Arc<Self> {
        Self::script(&[], response)
    }

    pub fn script(responses: &[&str], fallback: &str) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.iter().map(|r| r.to_string()).collect()),
            fallback: fallback.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmJudge for ScriptedJudge {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.responses.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }
}

/// Vector store whose every call fails, as when the server is down.
pub struct UnavailableVectorStore;

fn unavailable<T>() -> Result<T> {
    Err(StrataError::VectorStore("connection refused".to_string()))
}

#[async_trait]
impl VectorStore for UnavailableVectorStore {
    async fn get_collection(&self, _name: &str) -> Result<Option<CollectionHandle>> {
        unavailable()
    }

    async fn create_collection(
        &self,
        _name: &str,
        _metadata: &CollectionMetadata,
    ) -> Result<CollectionHandle> {
        unavailable()
    }

    async fn upsert(&self, _collection: &CollectionHandle, _records: &[VectorRecord]) -> Result<()> {
        unavailable()
    }

    async fn query(
        &self,
        _collection: &CollectionHandle,
        _embedding: &[f32],
        _limit: usize,
        _filter: Option<&VectorFilter>,
    ) -> Result<Vec<VectorHit>> {
        unavailable()
    }

    async fn delete(&self, _collection: &CollectionHandle, _ids: &[String]) -> Result<u64> {
        unavailable()
    }
}

/// A subsystem over a fresh on-disk database. Keep the `TempDir` alive for
/// as long as the subsystem is used.
pub struct Harness {
    pub dir: TempDir,
    pub db: Database,
    pub memory: MemorySubsystem,
}

pub struct HarnessBuilder {
    memory: MemoryConfig,
    contradiction: ContradictionConfig,
    judge: Option<Arc<dyn LlmJudge>>,
    vectors: Option<Arc<dyn VectorStore>>,
    max_query_limit: Option<usize>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            memory: MemoryConfig::default(),
            contradiction: ContradictionConfig::default(),
            judge: None,
            vectors: None,
            max_query_limit: None,
        }
    }

    pub fn memory(mut self, memory: MemoryConfig) -> Self {
        self.memory = memory;
        self
    }

    pub fn judge(mut self, judge: Arc<dyn LlmJudge>) -> Self {
        self.judge = Some(judge);
        self
    }

    pub fn vectors(mut self, vectors: Arc<dyn VectorStore>) -> Self {
        self.vectors = Some(vectors);
        self
    }

    /// Cap on results per vector query for the default libSQL store.
    pub fn max_query_limit(mut self, limit: usize) -> Self {
        self.max_query_limit = Some(limit);
        self
    }

    pub async fn build(self) -> Harness {
        init_test_logger();
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_local(dir.path().join("strata.db"))
            .await
            .unwrap();
        let memory = self.build_on(&db);
        Harness { dir, db, memory }
    }

    /// Another subsystem instance over an existing database.
    pub fn build_on(self, db: &Database) -> MemorySubsystem {
        let max_query_limit = self.max_query_limit;
        let vectors = self.vectors.unwrap_or_else(|| {
            let store = LibSqlVectorStore::new(db.clone());
            match max_query_limit {
                Some(limit) => Arc::new(store.with_max_query_limit(limit)),
                None => Arc::new(store),
            }
        });
        let backend: Arc<dyn DatabaseBackend> = Arc::new(LibSqlBackend::new(db.clone()));

        MemorySubsystem::new(
            backend,
            vectors,
            Arc::new(HashEmbedder),
            self.judge,
            &self.memory,
            &self.contradiction,
        )
    }
}

pub async fn harness() -> Harness {
    HarnessBuilder::new().build().await
}
