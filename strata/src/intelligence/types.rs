use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContradictionType {
    /// Conflicting dates.
    Temporal,
    /// Conflicting categorical status or value.
    Direct,
    #[default]
    #[serde(other)]
    None,
}

/// Which stage produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectedBy {
    Heuristic,
    Llm,
}

/// A fact about to be learned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub content: String,
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
}

impl KnowledgeItem {
    pub fn new(content: impl Into<String>, tenant_id: Option<Uuid>) -> Self {
        Self {
            content: content.into(),
            tenant_id,
        }
    }
}

/// Verdict for one (new, existing) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContradictionReport {
    pub new_memory: String,
    pub existing_memory: String,
    pub is_contradiction: bool,
    pub confidence: f32,
    pub explanation: String,
    pub contradiction_type: ContradictionType,
    pub detected_by: DetectedBy,
}

/// Aggregate result of checking one new fact against the knowledge base.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContradictionCheck {
    pub has_contradiction: bool,
    pub contradictions: Vec<ContradictionReport>,
    /// Highest confidence among `contradictions`, 0 when there are none.
    pub confidence: f32,
    pub llm_calls: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ContradictionCheck {
    pub fn from_reports(contradictions: Vec<ContradictionReport>, llm_calls: usize) -> Self {
        let confidence = contradictions
            .iter()
            .map(|r| r.confidence)
            .fold(0.0f32, f32::max);

        Self {
            has_contradiction: !contradictions.is_empty(),
            contradictions,
            confidence,
            llm_calls,
            error: None,
        }
    }

    /// Non-contradiction result carrying the failure that prevented the check.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Judge output as the model is asked to produce it. Every field tolerates
/// the loose shapes models actually return ("true", "0.8", missing keys).
#[derive(Debug, Clone, Deserialize)]
pub struct JudgeVerdict {
    pub is_contradiction: LenientBool,
    #[serde(default)]
    pub confidence: Option<LenientNumber>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub contradiction_type: ContradictionType,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LenientBool {
    Bool(bool),
    Text(String),
}

impl LenientBool {
    pub fn value(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Text(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "1"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LenientNumber {
    Number(f32),
    Text(String),
}

impl LenientNumber {
    pub fn value(&self) -> Option<f32> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().trim_end_matches('%').parse::<f32>().ok().map(|v| {
                if v > 1.0 {
                    v / 100.0
                } else {
                    v
                }
            }),
        }
    }
}
