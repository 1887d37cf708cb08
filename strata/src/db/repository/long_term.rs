use chrono::Utc;
use libsql::{params, Connection};
use uuid::Uuid;

use crate::error::Result;
use crate::models::LongTermMemory;

use super::{parse_tenant, parse_timestamp};

const COLUMNS: &str = "id, tenant_id, content, embedding_id, learned_from_sessions, \
                       importance_score, created_at, updated_at";

pub struct LongTermRepository;

impl LongTermRepository {
    pub async fn create(conn: &Connection, memory: &LongTermMemory) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO long_term_memories (
                id, tenant_id, content, embedding_id, learned_from_sessions,
                importance_score, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                memory.id.clone(),
                memory.tenant_id.to_string(),
                memory.content.clone(),
                memory.embedding_id.clone(),
                serde_json::to_string(&memory.learned_from_sessions)?,
                f64::from(memory.importance_score),
                memory.created_at.to_rfc3339(),
                memory.updated_at.to_rfc3339(),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn get_by_id(conn: &Connection, id: &str) -> Result<Option<LongTermMemory>> {
        let sql = format!("SELECT {COLUMNS} FROM long_term_memories WHERE id = ?1");
        let mut rows = conn.query(&sql, params![id]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_memory(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn get_by_embedding_id(
        conn: &Connection,
        tenant_id: &Uuid,
        embedding_id: &str,
    ) -> Result<Option<LongTermMemory>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM long_term_memories WHERE tenant_id = ?1 AND embedding_id = ?2"
        );
        let mut rows = conn
            .query(&sql, params![tenant_id.to_string(), embedding_id])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_memory(&row)?)),
            None => Ok(None),
        }
    }

    /// Exact text match within a tenant. Oldest row wins if several exist.
    pub async fn get_by_content(
        conn: &Connection,
        tenant_id: &Uuid,
        content: &str,
    ) -> Result<Option<LongTermMemory>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM long_term_memories
             WHERE tenant_id = ?1 AND content = ?2
             ORDER BY created_at ASC LIMIT 1"
        );
        let mut rows = conn
            .query(&sql, params![tenant_id.to_string(), content])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_memory(&row)?)),
            None => Ok(None),
        }
    }

    /// Rows whose content ends with `suffix`, oldest first. Used to find a fact
    /// stored under a category tag that the new text lacks (or vice versa).
    pub async fn find_by_suffix(
        conn: &Connection,
        tenant_id: &Uuid,
        suffix: &str,
    ) -> Result<Vec<LongTermMemory>> {
        if suffix.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {COLUMNS} FROM long_term_memories
             WHERE tenant_id = ?1 AND length(content) >= length(?2)
               AND substr(content, length(content) - length(?2) + 1) = ?2
             ORDER BY created_at ASC"
        );
        let mut rows = conn
            .query(&sql, params![tenant_id.to_string(), suffix])
            .await?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            results.push(Self::row_to_memory(&row)?);
        }
        Ok(results)
    }

    /// Persist a merge: provenance list and importance only.
    pub async fn update_merge(conn: &Connection, memory: &LongTermMemory) -> Result<()> {
        let affected = conn
            .execute(
                r#"
                UPDATE long_term_memories
                SET learned_from_sessions = ?2, importance_score = ?3, updated_at = ?4
                WHERE id = ?1
                "#,
                params![
                    memory.id.clone(),
                    serde_json::to_string(&memory.learned_from_sessions)?,
                    f64::from(memory.importance_score),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await?;

        if affected == 0 {
            return Err(crate::error::StrataError::NotFound(format!(
                "Long-term memory {}",
                memory.id
            )));
        }
        Ok(())
    }

    pub async fn count_by_tenant(conn: &Connection, tenant_id: &Uuid) -> Result<u64> {
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM long_term_memories WHERE tenant_id = ?1",
                params![tenant_id.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)?.max(0) as u64),
            None => Ok(0),
        }
    }

    pub fn row_to_memory(row: &libsql::Row) -> Result<LongTermMemory> {
        Ok(LongTermMemory {
            id: row.get(0)?,
            tenant_id: parse_tenant(&row.get::<String>(1)?)?,
            content: row.get(2)?,
            embedding_id: row.get(3)?,
            learned_from_sessions: serde_json::from_str(&row.get::<String>(4)?)
                .unwrap_or_default(),
            importance_score: row.get::<f64>(5)? as f32,
            created_at: parse_timestamp(&row.get::<String>(6)?),
            updated_at: parse_timestamp(&row.get::<String>(7)?),
        })
    }
}
