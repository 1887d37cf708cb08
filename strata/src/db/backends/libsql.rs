use crate::db::connection::Database;
use crate::db::repository::{
    LongTermRepository, MediumTermRepository, SessionRepository, ShortTermRepository,
};
use crate::db::traits::{
    DatabaseBackend, LongTermStore, MediumTermStore, SessionStore, ShortTermStore,
};
use crate::error::Result;
use crate::models::{LongTermMemory, MediumTermMemory, ShortTermContext};
use async_trait::async_trait;
use uuid::Uuid;

pub struct LibSqlBackend {
    db: Database,
}

impl LibSqlBackend {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl SessionStore for LibSqlBackend {
    async fn register_session(&self, session_id: &str, tenant_id: &Uuid) -> Result<()> {
        let conn = self.db.connect()?;
        SessionRepository::register(&conn, session_id, tenant_id).await
    }
    async fn tenant_for_session(&self, session_id: &str) -> Result<Option<Uuid>> {
        let conn = self.db.connect()?;
        SessionRepository::tenant_for(&conn, session_id).await
    }
}

#[async_trait]
impl ShortTermStore for LibSqlBackend {
    async fn upsert_short_term(&self, context: &ShortTermContext) -> Result<()> {
        let conn = self.db.connect()?;
        ShortTermRepository::upsert(&conn, context).await
    }
    async fn get_short_term(&self, session_id: &str) -> Result<Option<ShortTermContext>> {
        let conn = self.db.connect()?;
        ShortTermRepository::get(&conn, session_id).await
    }
    async fn delete_short_term(&self, session_id: &str) -> Result<bool> {
        let conn = self.db.connect()?;
        ShortTermRepository::delete(&conn, session_id).await
    }
}

#[async_trait]
impl MediumTermStore for LibSqlBackend {
    async fn create_medium_term(&self, memory: &MediumTermMemory) -> Result<()> {
        let conn = self.db.connect()?;
        MediumTermRepository::create(&conn, memory).await
    }
    async fn list_medium_term(&self, session_id: &str) -> Result<Vec<MediumTermMemory>> {
        let conn = self.db.connect()?;
        MediumTermRepository::list_by_session(&conn, session_id).await
    }
    async fn delete_medium_term_by_session(&self, session_id: &str) -> Result<u64> {
        let conn = self.db.connect()?;
        MediumTermRepository::delete_by_session(&conn, session_id).await
    }
}

#[async_trait]
impl LongTermStore for LibSqlBackend {
    async fn create_long_term(&self, memory: &LongTermMemory) -> Result<()> {
        let conn = self.db.connect()?;
        LongTermRepository::create(&conn, memory).await
    }
    async fn get_long_term(&self, id: &str) -> Result<Option<LongTermMemory>> {
        let conn = self.db.connect()?;
        LongTermRepository::get_by_id(&conn, id).await
    }
    async fn get_long_term_by_embedding_id(
        &self,
        tenant_id: &Uuid,
        embedding_id: &str,
    ) -> Result<Option<LongTermMemory>> {
        let conn = self.db.connect()?;
        LongTermRepository::get_by_embedding_id(&conn, tenant_id, embedding_id).await
    }
    async fn get_long_term_by_content(
        &self,
        tenant_id: &Uuid,
        content: &str,
    ) -> Result<Option<LongTermMemory>> {
        let conn = self.db.connect()?;
        LongTermRepository::get_by_content(&conn, tenant_id, content).await
    }
    async fn find_long_term_by_suffix(
        &self,
        tenant_id: &Uuid,
        suffix: &str,
    ) -> Result<Vec<LongTermMemory>> {
        let conn = self.db.connect()?;
        LongTermRepository::find_by_suffix(&conn, tenant_id, suffix).await
    }
    async fn update_long_term_merge(&self, memory: &LongTermMemory) -> Result<()> {
        let conn = self.db.connect()?;
        LongTermRepository::update_merge(&conn, memory).await
    }
    async fn count_long_term(&self, tenant_id: &Uuid) -> Result<u64> {
        let conn = self.db.connect()?;
        LongTermRepository::count_by_tenant(&conn, tenant_id).await
    }
}

#[async_trait]
impl DatabaseBackend for LibSqlBackend {
    async fn sync(&self) -> Result<()> {
        self.db.sync().await
    }
}
