use chrono::Utc;
use libsql::{params, Connection};
use uuid::Uuid;

use crate::error::Result;

use super::parse_tenant;

pub struct SessionRepository;

impl SessionRepository {
    /// Record (or re-point) the tenant owning a session.
    pub async fn register(conn: &Connection, session_id: &str, tenant_id: &Uuid) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO sessions (session_id, tenant_id, created_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(session_id) DO UPDATE SET tenant_id = excluded.tenant_id
            "#,
            params![session_id, tenant_id.to_string(), Utc::now().to_rfc3339()],
        )
        .await?;
        Ok(())
    }

    pub async fn tenant_for(conn: &Connection, session_id: &str) -> Result<Option<Uuid>> {
        let mut rows = conn
            .query(
                "SELECT tenant_id FROM sessions WHERE session_id = ?1",
                params![session_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(parse_tenant(&row.get::<String>(0)?)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::init_schema;

    async fn setup_test_db() -> Connection {
        let conn = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .unwrap()
            .connect()
            .unwrap();
        init_schema(&conn).await.unwrap();
        conn
    }

    #[tokio::test]
    async fn test_unknown_session_has_no_tenant() {
        let conn = setup_test_db().await;
        assert!(SessionRepository::tenant_for(&conn, "nope")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_register_again_repoints_tenant() {
        let conn = setup_test_db().await;
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        SessionRepository::register(&conn, "s1", &first).await.unwrap();
        SessionRepository::register(&conn, "s1", &second).await.unwrap();

        assert_eq!(
            SessionRepository::tenant_for(&conn, "s1").await.unwrap(),
            Some(second)
        );
    }
}
