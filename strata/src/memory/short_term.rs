use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{Duration, Utc};
use lru::LruCache;
use uuid::Uuid;

use crate::db::DatabaseBackend;
use crate::error::{Result, StrataError};
use crate::models::ShortTermContext;

const MAX_TTL_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Per-session context with a TTL, held in an in-process LRU and written
/// through to the database.
///
/// Expiry is lazy: stale entries are never swept, only treated as absent by
/// [`get`](Self::get) regardless of which layer answers.
pub struct ShortTermMemoryCache {
    entries: Mutex<LruCache<String, ShortTermContext>>,
    store: Arc<dyn DatabaseBackend>,
    ttl: Duration,
    default_tenant: Option<Uuid>,
}

impl ShortTermMemoryCache {
    pub fn new(
        store: Arc<dyn DatabaseBackend>,
        ttl_secs: u64,
        capacity: usize,
        default_tenant: Option<Uuid>,
    ) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            store,
            ttl: Duration::seconds(ttl_secs.min(MAX_TTL_SECS) as i64),
            default_tenant,
        }
    }

    pub async fn get(&self, session_id: &str) -> Option<ShortTermContext> {
        let now = Utc::now();

        {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            match entries.get(session_id).cloned() {
                Some(context) if !context.is_expired_at(now) => return Some(context),
                Some(_) => {
                    entries.pop(session_id);
                }
                None => {}
            }
        }

        let durable = match self.store.get_short_term(session_id).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Short-term durable read failed");
                return None;
            }
        };

        let context = durable.filter(|c| !c.is_expired_at(now))?;
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(session_id.to_string(), context.clone());

        tracing::debug!(session_id = %session_id, "Short-term context repopulated from database");
        Some(context)
    }

    /// Replace the session's context and restart its TTL.
    ///
    /// The tenant is taken from `tenant_id`, then the configured default, then
    /// the session record. Failing all three is a caller error.
    pub async fn update(
        &self,
        session_id: &str,
        context_data: serde_json::Value,
        tenant_id: Option<Uuid>,
    ) -> Result<ShortTermContext> {
        let tenant_id = self.resolve_tenant(session_id, tenant_id).await?;

        let context = ShortTermContext {
            session_id: session_id.to_string(),
            tenant_id,
            context_data,
            expires_at: Utc::now() + self.ttl,
        };

        if let Err(e) = self.store.upsert_short_term(&context).await {
            tracing::warn!(
                session_id = %session_id,
                error = %e,
                "Short-term durable write failed, keeping in-process copy only"
            );
        }

        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(session_id.to_string(), context.clone());

        Ok(context)
    }

    /// Drop the session's context from both layers.
    pub async fn invalidate(&self, session_id: &str) -> Result<bool> {
        let cached = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop(session_id)
            .is_some();
        let durable = self.store.delete_short_term(session_id).await?;
        Ok(cached || durable)
    }

    async fn resolve_tenant(&self, session_id: &str, explicit: Option<Uuid>) -> Result<Uuid> {
        if let Some(tenant_id) = explicit {
            self.store.register_session(session_id, &tenant_id).await?;
            return Ok(tenant_id);
        }
        if let Some(tenant_id) = self.default_tenant {
            return Ok(tenant_id);
        }
        self.store
            .tenant_for_session(session_id)
            .await?
            .ok_or_else(|| StrataError::MissingTenant {
                session_id: session_id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::db::{Database, LibSqlBackend, SessionStore, ShortTermStore};
    use serde_json::json;

    async fn setup_backend() -> Arc<LibSqlBackend> {
        let db = Database::new(&DatabaseConfig {
            url: ":memory:".to_string(),
            auth_token: None,
            local_path: None,
        })
        .await
        .unwrap();
        Arc::new(LibSqlBackend::new(db))
    }

    #[tokio::test]
    async fn test_update_without_tenant_is_an_error() {
        let backend = setup_backend().await;
        let cache = ShortTermMemoryCache::new(backend, 60, 8, None);

        let result = cache.update("s1", json!({"topic": "travel"}), None).await;
        assert!(matches!(result, Err(StrataError::MissingTenant { .. })));
    }

    #[tokio::test]
    async fn test_tenant_falls_back_to_session_record() {
        let backend = setup_backend().await;
        let tenant = Uuid::new_v4();
        backend.register_session("s1", &tenant).await.unwrap();
        let cache = ShortTermMemoryCache::new(backend, 60, 8, None);

        let context = cache.update("s1", json!({"k": 1}), None).await.unwrap();
        assert_eq!(context.tenant_id, tenant);
    }

    #[tokio::test]
    async fn test_default_tenant_is_used() {
        let backend = setup_backend().await;
        let tenant = Uuid::new_v4();
        let cache = ShortTermMemoryCache::new(backend, 60, 8, Some(tenant));

        let context = cache.update("s1", json!({}), None).await.unwrap();
        assert_eq!(context.tenant_id, tenant);
    }

    #[tokio::test]
    async fn test_evicted_entry_is_served_from_database() {
        let backend = setup_backend().await;
        let tenant = Uuid::new_v4();
        let cache = ShortTermMemoryCache::new(backend, 60, 1, Some(tenant));

        cache.update("s1", json!({"n": 1}), None).await.unwrap();
        // Capacity 1: this evicts s1 from the in-process layer.
        cache.update("s2", json!({"n": 2}), None).await.unwrap();

        let context = cache.get("s1").await.unwrap();
        assert_eq!(context.context_data, json!({"n": 1}));
    }

    #[tokio::test]
    async fn test_expired_durable_row_reads_as_absent() {
        let backend = setup_backend().await;
        let tenant = Uuid::new_v4();
        backend
            .upsert_short_term(&ShortTermContext {
                session_id: "s1".to_string(),
                tenant_id: tenant,
                context_data: json!({"stale": true}),
                expires_at: Utc::now() - Duration::seconds(5),
            })
            .await
            .unwrap();
        let cache = ShortTermMemoryCache::new(backend, 60, 8, Some(tenant));

        assert!(cache.get("s1").await.is_none());
    }

    #[tokio::test]
    async fn test_update_overwrites_and_invalidate_removes() {
        let backend = setup_backend().await;
        let cache = ShortTermMemoryCache::new(backend, 60, 8, Some(Uuid::new_v4()));

        cache.update("s1", json!({"v": 1}), None).await.unwrap();
        cache.update("s1", json!({"v": 2}), None).await.unwrap();
        assert_eq!(cache.get("s1").await.unwrap().context_data, json!({"v": 2}));

        assert!(cache.invalidate("s1").await.unwrap());
        assert!(cache.get("s1").await.is_none());
        assert!(!cache.invalidate("s1").await.unwrap());
    }
}
