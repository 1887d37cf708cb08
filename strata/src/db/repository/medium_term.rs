use libsql::{params, Connection};

use crate::error::Result;
use crate::models::MediumTermMemory;

use super::{parse_tenant, parse_timestamp};

pub struct MediumTermRepository;

impl MediumTermRepository {
    pub async fn create(conn: &Connection, memory: &MediumTermMemory) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO medium_term_memories (id, session_id, tenant_id, content, embedding_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                memory.id.clone(),
                memory.session_id.clone(),
                memory.tenant_id.to_string(),
                memory.content.clone(),
                memory.embedding_id.clone(),
                memory.created_at.to_rfc3339(),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn list_by_session(
        conn: &Connection,
        session_id: &str,
    ) -> Result<Vec<MediumTermMemory>> {
        let mut rows = conn
            .query(
                "SELECT id, session_id, tenant_id, content, embedding_id, created_at
                 FROM medium_term_memories WHERE session_id = ?1
                 ORDER BY created_at ASC",
                params![session_id],
            )
            .await?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            results.push(MediumTermMemory {
                id: row.get(0)?,
                session_id: row.get(1)?,
                tenant_id: parse_tenant(&row.get::<String>(2)?)?,
                content: row.get(3)?,
                embedding_id: row.get(4)?,
                created_at: parse_timestamp(&row.get::<String>(5)?),
            });
        }
        Ok(results)
    }

    pub async fn delete_by_session(conn: &Connection, session_id: &str) -> Result<u64> {
        let affected = conn
            .execute(
                "DELETE FROM medium_term_memories WHERE session_id = ?1",
                params![session_id],
            )
            .await?;
        Ok(affected)
    }
}
