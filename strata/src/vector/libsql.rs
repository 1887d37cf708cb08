use ::libsql::{params, Connection};
use async_trait::async_trait;
use chrono::Utc;

use super::{
    CollectionHandle, CollectionMetadata, EntryMetadata, VectorFilter, VectorHit, VectorRecord,
    VectorStore,
};
use crate::db::Database;
use crate::error::{Result, StrataError};

/// Largest result window a single query may request.
pub const DEFAULT_MAX_QUERY_LIMIT: usize = 1000;

/// Vector store backed by the same libsql database as the relational tiers.
/// Similarity is computed with `vector_distance_cos` over `vector32` blobs.
#[derive(Clone)]
pub struct LibSqlVectorStore {
    db: Database,
    max_query_limit: usize,
}

impl LibSqlVectorStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            max_query_limit: DEFAULT_MAX_QUERY_LIMIT,
        }
    }

    pub fn with_max_query_limit(mut self, limit: usize) -> Self {
        self.max_query_limit = limit.max(1);
        self
    }

    fn connect(&self) -> Result<Connection> {
        self.db.connect()
    }
}

fn map_query_error(error: ::libsql::Error) -> StrataError {
    let message = error.to_string();
    let lowered = message.to_lowercase();
    if lowered.contains("vector index") || lowered.contains("vector_top_k") {
        StrataError::VectorIndex(message)
    } else {
        StrataError::VectorStore(message)
    }
}

fn is_unique_violation(error: &::libsql::Error) -> bool {
    error.to_string().contains("UNIQUE constraint failed")
}

#[async_trait]
impl VectorStore for LibSqlVectorStore {
    async fn get_collection(&self, name: &str) -> Result<Option<CollectionHandle>> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(
                "SELECT id, name FROM vector_collections WHERE name = ?1",
                params![name],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(CollectionHandle {
                id: row.get(0)?,
                name: row.get(1)?,
            })),
            None => Ok(None),
        }
    }

    async fn create_collection(
        &self,
        name: &str,
        metadata: &CollectionMetadata,
    ) -> Result<CollectionHandle> {
        let conn = self.connect()?;
        let id = nanoid::nanoid!();

        let inserted = conn
            .execute(
                "INSERT INTO vector_collections (id, name, metadata, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    id.clone(),
                    name,
                    serde_json::to_string(metadata)?,
                    Utc::now().to_rfc3339()
                ],
            )
            .await;

        match inserted {
            Ok(_) => {
                tracing::debug!(collection = %name, "Created vector collection");
                Ok(CollectionHandle {
                    id,
                    name: name.to_string(),
                })
            }
            Err(e) if is_unique_violation(&e) => Err(StrataError::CollectionExists(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn upsert(&self, collection: &CollectionHandle, records: &[VectorRecord]) -> Result<()> {
        let conn = self.connect()?;
        let now = Utc::now().to_rfc3339();

        for record in records {
            conn.execute(
                r#"
                INSERT INTO vector_entries (collection_id, id, document, metadata, embedding, updated_at)
                VALUES (?1, ?2, ?3, ?4, vector32(?5), ?6)
                ON CONFLICT(collection_id, id) DO UPDATE SET
                    document = excluded.document,
                    metadata = excluded.metadata,
                    embedding = excluded.embedding,
                    updated_at = excluded.updated_at
                "#,
                params![
                    collection.id.clone(),
                    record.id.clone(),
                    record.document.clone(),
                    serde_json::to_string(&record.metadata)?,
                    serde_json::to_string(&record.embedding)?,
                    now.clone(),
                ],
            )
            .await
            .map_err(|e| StrataError::VectorStore(e.to_string()))?;
        }

        Ok(())
    }

    async fn query(
        &self,
        collection: &CollectionHandle,
        embedding: &[f32],
        limit: usize,
        filter: Option<&VectorFilter>,
    ) -> Result<Vec<VectorHit>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        if limit > self.max_query_limit {
            return Err(StrataError::VectorIndex(format!(
                "requested {limit} results but the index allows at most {}",
                self.max_query_limit
            )));
        }

        let embedding_json = serde_json::to_string(embedding)?;

        // ?1=collection, ?2=embedding, ?3=limit; the filter value (if any) is ?4
        let (filter_clause, filter_value) = match filter {
            Some(VectorFilter::SessionEq(session_id)) => (
                "AND json_extract(metadata, '$.session_id') = ?4",
                Some(::libsql::Value::from(session_id.clone())),
            ),
            Some(VectorFilter::MinImportance(min)) => (
                "AND json_extract(metadata, '$.importance_score') >= ?4",
                Some(::libsql::Value::from(f64::from(*min))),
            ),
            None => ("", None),
        };

        let sql = format!(
            r#"
            SELECT id, document, metadata, vector_extract(embedding),
                   1 - vector_distance_cos(embedding, vector32(?2)) AS score
            FROM vector_entries
            WHERE collection_id = ?1 {filter_clause}
            ORDER BY score DESC
            LIMIT ?3
            "#
        );

        let mut param_values: Vec<::libsql::Value> = vec![
            ::libsql::Value::from(collection.id.clone()),
            ::libsql::Value::from(embedding_json),
            ::libsql::Value::from(limit as i64),
        ];
        param_values.extend(filter_value);

        let conn = self.connect()?;
        let mut rows = conn
            .query(&sql, ::libsql::params_from_iter(param_values))
            .await
            .map_err(map_query_error)?;

        let mut hits = Vec::new();
        while let Some(row) = rows.next().await.map_err(map_query_error)? {
            let metadata: EntryMetadata =
                serde_json::from_str(&row.get::<String>(2)?).unwrap_or_default();
            let embedding: Vec<f32> =
                serde_json::from_str(&row.get::<String>(3)?).unwrap_or_default();

            hits.push(VectorHit {
                id: row.get(0)?,
                document: row.get(1)?,
                embedding,
                metadata,
                score: row.get::<f64>(4)? as f32,
            });
        }

        Ok(hits)
    }

    async fn delete(&self, collection: &CollectionHandle, ids: &[String]) -> Result<u64> {
        let conn = self.connect()?;
        let mut deleted = 0;
        for id in ids {
            deleted += conn
                .execute(
                    "DELETE FROM vector_entries WHERE collection_id = ?1 AND id = ?2",
                    params![collection.id.clone(), id.clone()],
                )
                .await?;
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;

    async fn setup_store() -> LibSqlVectorStore {
        let db = Database::new(&DatabaseConfig {
            url: ":memory:".to_string(),
            auth_token: None,
            local_path: None,
        })
        .await
        .unwrap();
        LibSqlVectorStore::new(db)
    }

    fn record(id: &str, embedding: Vec<f32>, metadata: EntryMetadata) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            document: format!("doc {id}"),
            embedding,
            metadata,
        }
    }

    #[tokio::test]
    async fn test_create_collection_twice_reports_exists() {
        let store = setup_store().await;
        let metadata = CollectionMetadata::default();
        store.create_collection("facts_a", &metadata).await.unwrap();

        let second = store.create_collection("facts_a", &metadata).await;
        assert!(matches!(second, Err(StrataError::CollectionExists(_))));
        assert!(store.get_collection("facts_a").await.unwrap().is_some());
        assert!(store.get_collection("facts_b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_orders_by_similarity_and_filters_by_session() {
        let store = setup_store().await;
        let handle = store
            .create_collection("sessions", &CollectionMetadata::default())
            .await
            .unwrap();

        store
            .upsert(
                &handle,
                &[
                    record("a", vec![1.0, 0.0, 0.0], EntryMetadata::for_session("s1", "t")),
                    record("b", vec![0.7, 0.7, 0.0], EntryMetadata::for_session("s1", "t")),
                    record("c", vec![1.0, 0.0, 0.0], EntryMetadata::for_session("s2", "t")),
                ],
            )
            .await
            .unwrap();

        let filter = VectorFilter::SessionEq("s1".to_string());
        let hits = store
            .query(&handle, &[1.0, 0.0, 0.0], 5, Some(&filter))
            .await
            .unwrap();

        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(hits[0].score > 0.99);
        assert_eq!(hits[0].embedding.len(), 3);
    }

    #[tokio::test]
    async fn test_importance_filter_and_upsert_replace() {
        let store = setup_store().await;
        let handle = store
            .create_collection("facts", &CollectionMetadata::default())
            .await
            .unwrap();
        let sessions = vec!["s1".to_string()];

        store
            .upsert(
                &handle,
                &[
                    record("low", vec![1.0, 0.0], EntryMetadata::for_fact("t", 0.2, &sessions)),
                    record("high", vec![1.0, 0.1], EntryMetadata::for_fact("t", 0.9, &sessions)),
                ],
            )
            .await
            .unwrap();

        let filter = VectorFilter::MinImportance(0.5);
        let hits = store
            .query(&handle, &[1.0, 0.0], 10, Some(&filter))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "high");

        store
            .upsert(
                &handle,
                &[record("low", vec![1.0, 0.0], EntryMetadata::for_fact("t", 0.6, &sessions))],
            )
            .await
            .unwrap();
        let hits = store
            .query(&handle, &[1.0, 0.0], 10, Some(&filter))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_oversized_query_is_an_index_error() {
        let store = setup_store().await.with_max_query_limit(4);
        let handle = store
            .create_collection("facts", &CollectionMetadata::default())
            .await
            .unwrap();

        let result = store.query(&handle, &[1.0, 0.0], 5, None).await;
        assert!(result.unwrap_err().is_vector_index());
    }

    #[tokio::test]
    async fn test_delete_counts_removed_entries() {
        let store = setup_store().await;
        let handle = store
            .create_collection("facts", &CollectionMetadata::default())
            .await
            .unwrap();
        store
            .upsert(&handle, &[record("a", vec![1.0], EntryMetadata::default())])
            .await
            .unwrap();

        let removed = store
            .delete(&handle, &["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
    }
}
