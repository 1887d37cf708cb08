use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Volatile per-session context held by the short-term tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortTermContext {
    pub session_id: String,
    pub tenant_id: Uuid,
    pub context_data: serde_json::Value,
    pub expires_at: DateTime<Utc>,
}

impl ShortTermContext {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Linking row for a session-scoped semantic memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediumTermMemory {
    pub id: String,
    pub session_id: String,
    pub tenant_id: Uuid,
    pub content: String,
    pub embedding_id: String,
    pub created_at: DateTime<Utc>,
}

/// Cross-session fact in the durable knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LongTermMemory {
    pub id: String,
    pub tenant_id: Uuid,
    pub content: String,
    pub embedding_id: String,
    /// Append-only provenance; kept in first-seen order.
    pub learned_from_sessions: Vec<String>,
    pub importance_score: f32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LongTermMemory {
    pub fn new(
        id: String,
        tenant_id: Uuid,
        content: String,
        embedding_id: String,
        learned_from_sessions: Vec<String>,
        importance_score: f32,
    ) -> Self {
        let now = Utc::now();
        let mut memory = Self {
            id,
            tenant_id,
            content,
            embedding_id,
            learned_from_sessions: Vec::new(),
            importance_score: clamp_importance(importance_score),
            created_at: now,
            updated_at: now,
        };
        memory.merge_sessions(&learned_from_sessions);
        memory
    }

    /// Union `sessions` into the provenance list. Returns true if anything was added.
    pub fn merge_sessions(&mut self, sessions: &[String]) -> bool {
        let mut changed = false;
        for session in sessions {
            if !self.learned_from_sessions.iter().any(|s| s == session) {
                self.learned_from_sessions.push(session.clone());
                changed = true;
            }
        }
        changed
    }

    /// Merge a restatement of this fact: union sessions, keep the higher importance.
    pub fn absorb(&mut self, sessions: &[String], importance_score: f32) {
        self.merge_sessions(sessions);
        self.importance_score = self
            .importance_score
            .max(clamp_importance(importance_score));
        self.updated_at = Utc::now();
    }
}

pub fn clamp_importance(score: f32) -> f32 {
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, 1.0)
}
