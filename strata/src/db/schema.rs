use libsql::Connection;

use crate::error::Result;

pub async fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Session records, the fallback source of a session's tenant
        CREATE TABLE IF NOT EXISTS sessions (
            session_id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_tenant_id ON sessions(tenant_id);

        -- Short-term context, one row per session, overwritten on update
        CREATE TABLE IF NOT EXISTS short_term_memories (
            session_id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            context_data TEXT NOT NULL DEFAULT '{}',
            expires_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        -- Session-scoped semantic memories (vector entry lives in the medium-term collection)
        CREATE TABLE IF NOT EXISTS medium_term_memories (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            tenant_id TEXT NOT NULL,
            content TEXT NOT NULL,
            embedding_id TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_medium_term_session_id ON medium_term_memories(session_id);

        -- Cross-session knowledge base
        CREATE TABLE IF NOT EXISTS long_term_memories (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            content TEXT NOT NULL,
            embedding_id TEXT NOT NULL,
            learned_from_sessions TEXT NOT NULL DEFAULT '[]',
            importance_score REAL NOT NULL DEFAULT 0.0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_long_term_tenant_content ON long_term_memories(tenant_id, content);
        CREATE INDEX IF NOT EXISTS idx_long_term_embedding_id ON long_term_memories(embedding_id);

        -- Vector store: named collections and their entries
        CREATE TABLE IF NOT EXISTS vector_collections (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS vector_entries (
            collection_id TEXT NOT NULL,
            id TEXT NOT NULL,
            document TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            embedding BLOB NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (collection_id, id),
            FOREIGN KEY (collection_id) REFERENCES vector_collections(id) ON DELETE CASCADE
        );
        "#,
    )
    .await?;

    Ok(())
}
