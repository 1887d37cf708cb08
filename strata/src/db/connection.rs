use libsql::{Builder, Connection};
use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::error::Result;

use super::schema;

#[derive(Debug, Clone)]
struct Pragmas {
    busy_timeout_ms: u64,
    journal_mode: &'static str,
    synchronous: &'static str,
}

impl Pragmas {
    fn from_env() -> Self {
        Self {
            busy_timeout_ms: std::env::var("DATABASE_BUSY_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(5000),
            journal_mode: normalize_journal_mode(
                &std::env::var("DATABASE_JOURNAL_MODE").unwrap_or_else(|_| "WAL".to_string()),
            ),
            synchronous: normalize_synchronous(
                &std::env::var("DATABASE_SYNCHRONOUS").unwrap_or_else(|_| "NORMAL".to_string()),
            ),
        }
    }
}

/// Handle to the relational store shared by every memory tier and the
/// libsql vector store.
#[derive(Clone)]
pub struct Database {
    db: Arc<libsql::Database>,
    /// In-memory databases vanish with their connection, so a single one is shared.
    shared: Option<Connection>,
    pragmas: Pragmas,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pragmas = Pragmas::from_env();

        let (db, in_memory) =
            if config.url.starts_with("libsql://") || config.url.starts_with("https://") {
                let db = if let Some(ref local_path) = config.local_path {
                    Builder::new_remote_replica(
                        local_path,
                        config.url.clone(),
                        config.auth_token.clone().unwrap_or_default(),
                    )
                    .build()
                    .await?
                } else {
                    Builder::new_remote(
                        config.url.clone(),
                        config.auth_token.clone().unwrap_or_default(),
                    )
                    .build()
                    .await?
                };
                (db, false)
            } else if config.url == ":memory:" {
                (Builder::new_local(":memory:").build().await?, true)
            } else {
                let path = config.url.strip_prefix("file:").unwrap_or(&config.url);
                (Builder::new_local(path).build().await?, false)
            };

        let shared = if in_memory { Some(db.connect()?) } else { None };

        let database = Self {
            db: Arc::new(db),
            shared,
            pragmas,
        };
        database.configure_database().await?;
        database.init_schema().await?;

        tracing::debug!(url = %config.url, "Database ready");
        Ok(database)
    }

    /// Open (and initialize) a local database file.
    pub async fn open_local(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let config = DatabaseConfig {
            url: format!("file:{}", path.as_ref().display()),
            auth_token: None,
            local_path: None,
        };
        Self::new(&config).await
    }

    pub fn connect(&self) -> Result<Connection> {
        match &self.shared {
            Some(conn) => Ok(conn.clone()),
            None => Ok(self.db.connect()?),
        }
    }

    async fn configure_database(&self) -> Result<()> {
        let conn = self.connect()?;

        let busy_timeout_sql = format!("PRAGMA busy_timeout = {}", self.pragmas.busy_timeout_ms);
        if let Err(error) = conn.execute_batch(&busy_timeout_sql).await {
            tracing::warn!(
                busy_timeout_ms = self.pragmas.busy_timeout_ms,
                error = %error,
                "Failed to set SQLite busy_timeout"
            );
        }

        if self.shared.is_none() {
            let journal_sql = format!("PRAGMA journal_mode = {}", self.pragmas.journal_mode);
            if let Err(error) = conn.execute_batch(&journal_sql).await {
                tracing::warn!(
                    mode = %self.pragmas.journal_mode,
                    error = %error,
                    "Failed to set SQLite journal_mode"
                );
            }
        }

        let synchronous_sql = format!("PRAGMA synchronous = {}", self.pragmas.synchronous);
        if let Err(error) = conn.execute_batch(&synchronous_sql).await {
            tracing::warn!(
                mode = %self.pragmas.synchronous,
                error = %error,
                "Failed to set SQLite synchronous pragma"
            );
        }

        Ok(())
    }

    async fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        schema::init_schema(&conn).await?;
        Ok(())
    }

    pub async fn sync(&self) -> Result<()> {
        if let Ok(sync) = self.db.sync().await {
            tracing::info!("Database synced: {:?}", sync);
        }
        Ok(())
    }
}

fn normalize_journal_mode(value: &str) -> &'static str {
    match value.trim().to_uppercase().as_str() {
        "DELETE" => "DELETE",
        "TRUNCATE" => "TRUNCATE",
        "PERSIST" => "PERSIST",
        "MEMORY" => "MEMORY",
        "WAL" => "WAL",
        "OFF" => "OFF",
        _ => "WAL",
    }
}

fn normalize_synchronous(value: &str) -> &'static str {
    match value.trim().to_uppercase().as_str() {
        "OFF" => "OFF",
        "NORMAL" => "NORMAL",
        "FULL" => "FULL",
        "EXTRA" => "EXTRA",
        _ => "NORMAL",
    }
}
