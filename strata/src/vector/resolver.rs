use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use uuid::Uuid;

use super::{CollectionHandle, CollectionMetadata, VectorStore};
use crate::error::{Result, StrataError};
use crate::models::{normalize_tenant, tenant_or_nil};

/// Ways of creating a missing collection, from the least to the most
/// demanding in terms of metadata the store must accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateStrategy {
    Bare,
    WithDistance,
    WithTenantMetadata,
}

impl CreateStrategy {
    pub const ORDERED: [CreateStrategy; 3] = [
        CreateStrategy::Bare,
        CreateStrategy::WithDistance,
        CreateStrategy::WithTenantMetadata,
    ];

    pub fn metadata(self, tenant_id: &Uuid) -> CollectionMetadata {
        match self {
            CreateStrategy::Bare => CollectionMetadata::default(),
            CreateStrategy::WithDistance => CollectionMetadata {
                distance: Some("cosine".to_string()),
                tenant_id: None,
            },
            CreateStrategy::WithTenantMetadata => CollectionMetadata {
                distance: Some("cosine".to_string()),
                tenant_id: Some(tenant_id.to_string()),
            },
        }
    }
}

/// Maps `(base_name, tenant)` to a collection and makes sure it exists.
///
/// Resolved handles are cached for the lifetime of the resolver, which is
/// owned by one memory subsystem instance.
pub struct TenantCollectionResolver {
    store: Arc<dyn VectorStore>,
    cache: Mutex<HashMap<String, CollectionHandle>>,
}

impl TenantCollectionResolver {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self {
            store,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// `{base_name}_{tenant}` with dashes replaced; an absent tenant uses the nil UUID.
    pub fn collection_name(base_name: &str, tenant_id: Option<Uuid>) -> String {
        format!(
            "{}_{}",
            base_name,
            normalize_tenant(&tenant_or_nil(tenant_id))
        )
    }

    /// Resolve the tenant's collection. `None` means the tier is unavailable
    /// and the caller should continue without it.
    pub async fn get_collection(
        &self,
        base_name: &str,
        tenant_id: Option<Uuid>,
    ) -> Option<CollectionHandle> {
        let name = Self::collection_name(base_name, tenant_id);
        self.ensure_collection(&name, &tenant_or_nil(tenant_id)).await
    }

    pub async fn ensure_collection(&self, name: &str, tenant_id: &Uuid) -> Option<CollectionHandle> {
        if let Some(handle) = self.cached(name) {
            return Some(handle);
        }

        match self.store.get_collection(name).await {
            Ok(Some(handle)) => return Some(self.remember(handle)),
            Ok(None) => {}
            Err(e) => {
                tracing::debug!(collection = %name, error = %e, "Collection lookup failed, will try to create");
            }
        }

        for strategy in CreateStrategy::ORDERED {
            match self.attempt(name, strategy, tenant_id).await {
                Ok(handle) => return Some(self.remember(handle)),
                Err(e) => {
                    tracing::debug!(
                        collection = %name,
                        strategy = ?strategy,
                        error = %e,
                        "Collection create strategy failed"
                    );
                }
            }
        }

        tracing::warn!(collection = %name, "Vector collection unavailable, tier degraded");
        None
    }

    /// Run a single create strategy. A concurrent creator winning the race
    /// counts as success once the collection can be read back.
    pub async fn attempt(
        &self,
        name: &str,
        strategy: CreateStrategy,
        tenant_id: &Uuid,
    ) -> Result<CollectionHandle> {
        match self
            .store
            .create_collection(name, &strategy.metadata(tenant_id))
            .await
        {
            Ok(handle) => Ok(handle),
            Err(StrataError::CollectionExists(_)) => self
                .store
                .get_collection(name)
                .await?
                .ok_or_else(|| StrataError::VectorStore(format!("collection {name} vanished"))),
            Err(e) => Err(e),
        }
    }

    fn cached(&self, name: &str) -> Option<CollectionHandle> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.get(name).cloned()
    }

    fn remember(&self, handle: CollectionHandle) -> CollectionHandle {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .entry(handle.name.clone())
            .or_insert(handle)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{VectorFilter, VectorHit, VectorRecord};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Store that rejects creation unless the metadata is rich enough, and
    /// optionally pretends another caller won the creation race.
    #[derive(Default)]
    struct PickyStore {
        accept_from: Option<CreateStrategyLevel>,
        race: bool,
        gets: AtomicUsize,
        creates: AtomicUsize,
        created: Mutex<Option<CollectionHandle>>,
    }

    #[derive(Clone, Copy, PartialEq, PartialOrd)]
    enum CreateStrategyLevel {
        Distance,
        Tenant,
    }

    fn level(metadata: &CollectionMetadata) -> Option<CreateStrategyLevel> {
        match (&metadata.distance, &metadata.tenant_id) {
            (_, Some(_)) => Some(CreateStrategyLevel::Tenant),
            (Some(_), None) => Some(CreateStrategyLevel::Distance),
            _ => None,
        }
    }

    #[async_trait]
    impl VectorStore for PickyStore {
        async fn get_collection(&self, _name: &str) -> Result<Option<CollectionHandle>> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            Ok(self.created.lock().unwrap().clone())
        }

        async fn create_collection(
            &self,
            name: &str,
            metadata: &CollectionMetadata,
        ) -> Result<CollectionHandle> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            let accepted = match (self.accept_from, level(metadata)) {
                (Some(min), Some(got)) => got >= min,
                _ => false,
            };
            if !accepted {
                return Err(StrataError::VectorStore("metadata rejected".to_string()));
            }
            let handle = CollectionHandle {
                id: format!("id-{name}"),
                name: name.to_string(),
            };
            *self.created.lock().unwrap() = Some(handle.clone());
            if self.race {
                return Err(StrataError::CollectionExists(name.to_string()));
            }
            Ok(handle)
        }

        async fn upsert(&self, _: &CollectionHandle, _: &[VectorRecord]) -> Result<()> {
            Ok(())
        }

        async fn query(
            &self,
            _: &CollectionHandle,
            _: &[f32],
            _: usize,
            _: Option<&VectorFilter>,
        ) -> Result<Vec<VectorHit>> {
            Ok(Vec::new())
        }

        async fn delete(&self, _: &CollectionHandle, _: &[String]) -> Result<u64> {
            Ok(0)
        }
    }

    #[test]
    fn test_collection_names_are_tenant_scoped() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let name_a = TenantCollectionResolver::collection_name("long_term_memory", Some(a));
        let name_b = TenantCollectionResolver::collection_name("long_term_memory", Some(b));
        assert_ne!(name_a, name_b);
        assert!(!name_a.contains('-'));
        assert_eq!(
            TenantCollectionResolver::collection_name("long_term_memory", None),
            "long_term_memory_00000000_0000_0000_0000_000000000000"
        );
    }

    #[test]
    fn test_strategies_add_metadata_progressively() {
        let tenant = Uuid::new_v4();
        let metas: Vec<_> = CreateStrategy::ORDERED
            .iter()
            .map(|s| s.metadata(&tenant))
            .collect();
        assert_eq!(metas[0], CollectionMetadata::default());
        assert!(metas[1].distance.is_some() && metas[1].tenant_id.is_none());
        assert_eq!(metas[2].tenant_id, Some(tenant.to_string()));
    }

    #[tokio::test]
    async fn test_later_strategy_succeeds_after_earlier_failures() {
        let store = Arc::new(PickyStore {
            accept_from: Some(CreateStrategyLevel::Tenant),
            ..Default::default()
        });
        let resolver = TenantCollectionResolver::new(store.clone());

        let handle = resolver.get_collection("facts", None).await.unwrap();
        assert_eq!(store.creates.load(Ordering::SeqCst), 3);

        // Served from the in-process cache afterwards.
        let again = resolver.get_collection("facts", None).await.unwrap();
        assert_eq!(handle, again);
        assert_eq!(store.gets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lost_creation_race_reads_back_existing() {
        let store = Arc::new(PickyStore {
            accept_from: Some(CreateStrategyLevel::Distance),
            race: true,
            ..Default::default()
        });
        let resolver = TenantCollectionResolver::new(store.clone());

        let handle = resolver.get_collection("facts", None).await;
        assert!(handle.is_some());
        assert_eq!(store.creates.load(Ordering::SeqCst), 2);
        assert_eq!(store.gets.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_total_failure_is_unavailable() {
        let store = Arc::new(PickyStore::default());
        let resolver = TenantCollectionResolver::new(store.clone());

        assert!(resolver.get_collection("facts", Some(Uuid::new_v4())).await.is_none());
        assert_eq!(store.creates.load(Ordering::SeqCst), 3);
    }
}
