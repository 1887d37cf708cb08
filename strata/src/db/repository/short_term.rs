use chrono::Utc;
use libsql::{params, Connection};

use crate::error::Result;
use crate::models::ShortTermContext;

use super::{parse_tenant, parse_timestamp};

pub struct ShortTermRepository;

impl ShortTermRepository {
    /// Insert or overwrite the single context row of a session.
    pub async fn upsert(conn: &Connection, context: &ShortTermContext) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO short_term_memories (session_id, tenant_id, context_data, expires_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(session_id) DO UPDATE SET
                tenant_id = excluded.tenant_id,
                context_data = excluded.context_data,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
            params![
                context.session_id.clone(),
                context.tenant_id.to_string(),
                serde_json::to_string(&context.context_data)?,
                context.expires_at.to_rfc3339(),
                Utc::now().to_rfc3339(),
            ],
        )
        .await?;
        Ok(())
    }

    /// Fetch the stored row regardless of expiry; callers decide what expired means.
    pub async fn get(conn: &Connection, session_id: &str) -> Result<Option<ShortTermContext>> {
        let mut rows = conn
            .query(
                "SELECT session_id, tenant_id, context_data, expires_at
                 FROM short_term_memories WHERE session_id = ?1",
                params![session_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(ShortTermContext {
                session_id: row.get(0)?,
                tenant_id: parse_tenant(&row.get::<String>(1)?)?,
                context_data: serde_json::from_str(&row.get::<String>(2)?)
                    .unwrap_or(serde_json::Value::Null),
                expires_at: parse_timestamp(&row.get::<String>(3)?),
            })),
            None => Ok(None),
        }
    }

    pub async fn delete(conn: &Connection, session_id: &str) -> Result<bool> {
        let affected = conn
            .execute(
                "DELETE FROM short_term_memories WHERE session_id = ?1",
                params![session_id],
            )
            .await?;
        Ok(affected > 0)
    }
}
