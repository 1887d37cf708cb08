use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::LearningConfig;
use crate::error::{Result, StrataError};
use crate::intelligence::{ContradictionCheck, ContradictionDetector, KnowledgeItem};
use crate::memory::{AddOptions, LongTermMemoryStore};

pub type TaskId = String;

/// A fact handed over by the extraction pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningTask {
    pub content: String,
    pub learned_from_sessions: Vec<String>,
    pub importance_score: f32,
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed {
        created: bool,
        memory_id: Option<String>,
        contradiction: ContradictionCheck,
    },
    /// Below the long-term importance threshold; nothing was stored.
    Skipped { reason: String },
    Failed { error: String },
}

impl TaskStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, TaskStatus::Queued | TaskStatus::Running)
    }
}

type StatusMap = Arc<Mutex<LruCache<TaskId, TaskStatus>>>;

/// Bounded pool of workers that check new facts for contradictions and
/// learn them into the long-term store. Every submitted task gets an id
/// whose status can be polled until it is evicted by newer tasks.
pub struct LearningQueue {
    sender: Mutex<Option<mpsc::Sender<(TaskId, LearningTask)>>>,
    statuses: StatusMap,
    workers: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
    capacity: usize,
}

impl LearningQueue {
    pub fn start(
        long_term: Arc<LongTermMemoryStore>,
        detector: Arc<ContradictionDetector>,
        config: &LearningConfig,
        cancel: CancellationToken,
    ) -> Self {
        let capacity = config.queue_size.max(1);
        let (sender, receiver) = mpsc::channel::<(TaskId, LearningTask)>(capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        // Keep statuses for finished tasks well beyond the pending window.
        let tracked = NonZeroUsize::new(capacity.saturating_mul(16)).unwrap_or(NonZeroUsize::MIN);
        let statuses: StatusMap = Arc::new(Mutex::new(LruCache::new(tracked)));

        let worker_count = config.workers.max(1);
        let workers = (0..worker_count)
            .map(|worker| {
                let receiver = Arc::clone(&receiver);
                let statuses = Arc::clone(&statuses);
                let long_term = Arc::clone(&long_term);
                let detector = Arc::clone(&detector);
                let token = cancel.child_token();

                tokio::spawn(async move {
                    loop {
                        let next = tokio::select! {
                            biased;
                            _ = token.cancelled() => {
                                tracing::info!(worker, "Learning worker shutting down...");
                                break;
                            }
                            job = async { receiver.lock().await.recv().await } => job,
                        };
                        let Some((task_id, task)) = next else {
                            tracing::debug!(worker, "Learning queue drained");
                            break;
                        };

                        set_status(&statuses, &task_id, TaskStatus::Running);
                        let status = process(&long_term, &detector, &task).await;
                        if let TaskStatus::Failed { error } = &status {
                            tracing::error!(task_id = %task_id, error = %error, "Learning task failed");
                        }
                        set_status(&statuses, &task_id, status);
                    }
                })
            })
            .collect();

        tracing::info!(workers = worker_count, capacity, "Learning queue started");

        Self {
            sender: Mutex::new(Some(sender)),
            statuses,
            workers: tokio::sync::Mutex::new(workers),
            cancel,
            capacity,
        }
    }

    /// Enqueue a task without waiting. Fails when the queue is full or closed.
    pub fn submit(&self, task: LearningTask) -> Result<TaskId> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(StrataError::QueueClosed)?;

        let task_id = nanoid::nanoid!();
        // Record before sending so a fast worker never overwrites Running with Queued.
        set_status(&self.statuses, &task_id, TaskStatus::Queued);

        match sender.try_send((task_id.clone(), task)) {
            Ok(()) => Ok(task_id),
            Err(e) => {
                self.statuses
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .pop(&task_id);
                match e {
                    mpsc::error::TrySendError::Full(_) => Err(StrataError::QueueFull {
                        capacity: self.capacity,
                    }),
                    mpsc::error::TrySendError::Closed(_) => Err(StrataError::QueueClosed),
                }
            }
        }
    }

    pub fn status(&self, task_id: &str) -> Option<TaskStatus> {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .peek(task_id)
            .cloned()
    }

    /// Stop accepting tasks, let workers finish everything already queued,
    /// and wait for them.
    pub async fn shutdown(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.join().await;
    }

    /// Stop workers after their current task; queued tasks stay `Queued`.
    pub async fn cancel(&self) {
        self.cancel.cancel();
        self.join().await;
    }

    /// Drain like [`shutdown`](Self::shutdown) unless `interrupt` resolves
    /// first, in which case the workers are cancelled. The workers are
    /// joined exactly once either way.
    pub async fn shutdown_until<F>(&self, interrupt: F)
    where
        F: Future<Output = ()>,
    {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let join = self.join();
        tokio::pin!(join);
        tokio::select! {
            biased;
            _ = &mut join => return,
            _ = interrupt => {
                tracing::info!("Interrupted, cancelling learning workers...");
                self.cancel.cancel();
            }
        }
        join.await;
    }

    async fn join(&self) {
        let handles: Vec<_> = self.workers.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Learning worker panicked");
            }
        }
    }
}

fn set_status(statuses: &StatusMap, task_id: &str, status: TaskStatus) {
    statuses
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .put(task_id.to_string(), status);
}

async fn process(
    long_term: &LongTermMemoryStore,
    detector: &ContradictionDetector,
    task: &LearningTask,
) -> TaskStatus {
    if !long_term.should_store_in_long_term(task.importance_score) {
        return TaskStatus::Skipped {
            reason: format!(
                "importance {:.2} below long-term threshold",
                task.importance_score
            ),
        };
    }

    // Checked before the add so the fact is never compared with itself.
    let contradiction = detector
        .check(&KnowledgeItem::new(task.content.clone(), task.tenant_id))
        .await;

    match long_term
        .add(
            &task.content,
            &task.learned_from_sessions,
            task.importance_score,
            task.tenant_id,
            AddOptions::default(),
        )
        .await
    {
        Ok(outcome) => TaskStatus::Completed {
            created: outcome.created,
            memory_id: outcome.id,
            contradiction,
        },
        Err(e) => TaskStatus::Failed {
            error: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContradictionConfig, DatabaseConfig, MemoryConfig};
    use crate::db::{Database, DatabaseBackend, LibSqlBackend};
    use crate::embeddings::Embedder;
    use crate::vector::{LibSqlVectorStore, TenantCollectionResolver};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    /// Embeds by word presence; optionally blocks until a permit is released.
    struct GatedEmbedder {
        gate: Option<Arc<Semaphore>>,
    }

    #[async_trait]
    impl Embedder for GatedEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if let Some(gate) = &self.gate {
                let permit = gate
                    .acquire()
                    .await
                    .map_err(|e| StrataError::Internal(e.to_string()))?;
                permit.forget();
            }
            let mut vector = vec![0.0f32; 16];
            for word in text.split_whitespace() {
                let bucket = word.bytes().map(usize::from).sum::<usize>() % 16;
                vector[bucket] += 1.0;
            }
            Ok(vector)
        }
    }

    async fn setup(gate: Option<Arc<Semaphore>>) -> (Arc<LongTermMemoryStore>, Arc<ContradictionDetector>) {
        let db = Database::new(&DatabaseConfig {
            url: ":memory:".to_string(),
            auth_token: None,
            local_path: None,
        })
        .await
        .unwrap();
        let resolver = Arc::new(TenantCollectionResolver::new(Arc::new(
            LibSqlVectorStore::new(db.clone()),
        )));
        let backend: Arc<dyn DatabaseBackend> = Arc::new(LibSqlBackend::new(db));

        let long_term = Arc::new(LongTermMemoryStore::new(
            Arc::new(GatedEmbedder { gate }),
            resolver,
            backend,
            &MemoryConfig::default(),
        ));
        let detector = Arc::new(ContradictionDetector::new(
            Arc::clone(&long_term),
            None,
            ContradictionConfig::default(),
        ));
        (long_term, detector)
    }

    fn task(content: &str, importance_score: f32) -> LearningTask {
        LearningTask {
            content: content.to_string(),
            learned_from_sessions: vec!["s1".to_string()],
            importance_score,
            tenant_id: None,
        }
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_tasks() {
        let (long_term, detector) = setup(None).await;
        let queue = LearningQueue::start(
            Arc::clone(&long_term),
            detector,
            &LearningConfig::default(),
            CancellationToken::new(),
        );

        let stored = queue.submit(task("User lives in Lisbon", 0.9)).unwrap();
        let ignored = queue.submit(task("User said hello", 0.1)).unwrap();
        queue.shutdown().await;

        match queue.status(&stored) {
            Some(TaskStatus::Completed {
                created, memory_id, ..
            }) => {
                assert!(created);
                assert!(memory_id.is_some());
            }
            other => panic!("unexpected status: {other:?}"),
        }
        assert!(matches!(
            queue.status(&ignored),
            Some(TaskStatus::Skipped { .. })
        ));
        assert_eq!(long_term.count(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_rejected() {
        let (long_term, detector) = setup(None).await;
        let queue = LearningQueue::start(
            long_term,
            detector,
            &LearningConfig::default(),
            CancellationToken::new(),
        );
        queue.shutdown().await;

        let result = queue.submit(task("User likes tea", 0.9));
        assert!(matches!(result, Err(StrataError::QueueClosed)));
    }

    #[tokio::test]
    async fn test_full_queue_rejects_without_waiting() {
        let gate = Arc::new(Semaphore::new(0));
        let (long_term, detector) = setup(Some(Arc::clone(&gate))).await;
        let queue = LearningQueue::start(
            long_term,
            detector,
            &LearningConfig {
                workers: 1,
                queue_size: 1,
            },
            CancellationToken::new(),
        );

        let results: Vec<_> = (0..3)
            .map(|i| queue.submit(task(&format!("fact number {i}"), 0.9)))
            .collect();
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(StrataError::QueueFull { capacity: 1 }))));

        gate.add_permits(64);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_interrupted_shutdown_leaves_pending_tasks_queued() {
        let gate = Arc::new(Semaphore::new(0));
        let (long_term, detector) = setup(Some(Arc::clone(&gate))).await;
        let token = CancellationToken::new();
        let queue = LearningQueue::start(
            long_term,
            detector,
            &LearningConfig {
                workers: 1,
                queue_size: 4,
            },
            token.clone(),
        );

        let running = queue.submit(task("User lives in Lisbon", 0.9)).unwrap();
        let pending = queue.submit(task("User works as a nurse", 0.9)).unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while !matches!(queue.status(&running), Some(TaskStatus::Running)) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("worker never picked up the first task");

        // The blocked task may only finish once the workers have been told to stop.
        let release = tokio::spawn({
            let gate = Arc::clone(&gate);
            let token = token.clone();
            async move {
                token.cancelled().await;
                gate.add_permits(64);
            }
        });

        tokio::time::timeout(
            Duration::from_secs(5),
            queue.shutdown_until(std::future::ready(())),
        )
        .await
        .expect("interrupted shutdown did not finish");
        release.await.unwrap();

        assert!(token.is_cancelled());
        assert!(matches!(
            queue.status(&running),
            Some(TaskStatus::Completed { created: true, .. })
        ));
        assert!(matches!(queue.status(&pending), Some(TaskStatus::Queued)));
        assert!(matches!(
            queue.submit(task("User likes tea", 0.9)),
            Err(StrataError::QueueClosed)
        ));
    }

    #[tokio::test]
    async fn test_shutdown_until_without_interrupt_drains() {
        let (long_term, detector) = setup(None).await;
        let token = CancellationToken::new();
        let queue = LearningQueue::start(
            Arc::clone(&long_term),
            detector,
            &LearningConfig::default(),
            token.clone(),
        );

        let id = queue.submit(task("User lives in Lisbon", 0.9)).unwrap();
        queue.shutdown_until(std::future::pending()).await;

        assert!(!token.is_cancelled());
        assert!(queue.status(&id).is_some_and(|status| status.is_finished()));
        assert_eq!(long_term.count(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cancel_stops_idle_workers() {
        let (long_term, detector) = setup(None).await;
        let token = CancellationToken::new();
        let queue = LearningQueue::start(long_term, detector, &LearningConfig::default(), token.clone());

        tokio::time::timeout(Duration::from_secs(5), queue.cancel())
            .await
            .expect("workers did not stop");
        assert!(token.is_cancelled());
    }
}
