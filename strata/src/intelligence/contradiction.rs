//! Two-stage contradiction detection for new long-term facts.
//!
//! A pattern-based pre-filter catches conflicting dates and mutually
//! exclusive statuses without any model call. Only pairs it cannot decide,
//! and that look worth a closer look, are escalated to the LLM judge, with a
//! hard cap on calls per checked fact.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::config::ContradictionConfig;
use crate::error::Result;
use crate::intelligence::entities::Entities;
use crate::intelligence::types::{
    ContradictionCheck, ContradictionReport, ContradictionType, DetectedBy, JudgeVerdict,
    KnowledgeItem,
};
use crate::intelligence::utils::{contains_word, strip_category_prefix};
use crate::llm::prompts::contradiction_judge_prompt;
use crate::llm::LlmJudge;
use crate::memory::LongTermMemoryStore;

pub const TEMPORAL_CONFIDENCE: f32 = 0.9;
pub const DIRECT_CONFIDENCE: f32 = 0.85;
/// Confidence given to a judge answer that could only be read by keyword.
pub const KEYWORD_CONFIDENCE: f32 = 0.7;
/// Candidates ranked below this are only escalated when they carry values.
const TOP_CANDIDATES: usize = 3;

/// A set of statuses at most one of which can hold at a time.
#[derive(Debug, Clone)]
pub struct ExclusiveGroup {
    pub name: &'static str,
    pub members: &'static [&'static str],
}

const EXCLUSIVE_GROUPS: &[ExclusiveGroup] = &[
    ExclusiveGroup {
        name: "marital status",
        members: &["single", "married", "divorced", "widowed", "engaged"],
    },
    ExclusiveGroup {
        name: "employment",
        members: &["employed", "unemployed", "self-employed", "retired"],
    },
    ExclusiveGroup {
        name: "diet",
        members: &["vegan", "vegetarian", "pescatarian", "carnivore"],
    },
    ExclusiveGroup {
        name: "vital status",
        members: &["alive", "dead", "deceased"],
    },
    ExclusiveGroup {
        name: "sentiment",
        members: &["loves", "hates"],
    },
    ExclusiveGroup {
        name: "preference",
        members: &["likes", "dislikes"],
    },
    ExclusiveGroup {
        name: "state",
        members: &["enabled", "disabled"],
    },
    ExclusiveGroup {
        name: "activity",
        members: &["active", "inactive"],
    },
    ExclusiveGroup {
        name: "availability",
        members: &["open", "closed"],
    },
];

// Outermost braces, so a verdict with nested objects is taken whole.
static JSON_BLOCK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

/// Checks a new fact against similar facts already in the long-term store.
pub struct ContradictionDetector {
    long_term: Arc<LongTermMemoryStore>,
    judge: Option<Arc<dyn LlmJudge>>,
    config: ContradictionConfig,
}

impl ContradictionDetector {
    pub fn new(
        long_term: Arc<LongTermMemoryStore>,
        judge: Option<Arc<dyn LlmJudge>>,
        config: ContradictionConfig,
    ) -> Self {
        Self {
            long_term,
            judge,
            config,
        }
    }

    pub async fn check(&self, item: &KnowledgeItem) -> ContradictionCheck {
        self.check_with(
            item,
            self.config.max_similar,
            self.config.confidence_threshold,
        )
        .await
    }

    /// Never fails: any error becomes a non-contradiction result with `error` set.
    pub async fn check_with(
        &self,
        item: &KnowledgeItem,
        max_similar: usize,
        confidence_threshold: f32,
    ) -> ContradictionCheck {
        match self.run(item, max_similar, confidence_threshold).await {
            Ok(check) => {
                if check.has_contradiction {
                    tracing::info!(
                        found = check.contradictions.len(),
                        confidence = check.confidence,
                        llm_calls = check.llm_calls,
                        "Contradiction detected"
                    );
                }
                check
            }
            Err(e) => {
                tracing::warn!(error = %e, "Contradiction check failed");
                ContradictionCheck::failed(e.to_string())
            }
        }
    }

    async fn run(
        &self,
        item: &KnowledgeItem,
        max_similar: usize,
        confidence_threshold: f32,
    ) -> Result<ContradictionCheck> {
        let new_content = strip_category_prefix(&item.content);
        if new_content.is_empty() {
            return Ok(ContradictionCheck::default());
        }

        let candidates = self
            .long_term
            .search(new_content, max_similar, None, item.tenant_id)
            .await?;

        let new_entities = Entities::extract(new_content);
        let mut reports = Vec::new();
        let mut llm_calls = 0;

        for (rank, candidate) in candidates.iter().enumerate() {
            let existing = strip_category_prefix(&candidate.content);
            if existing.eq_ignore_ascii_case(new_content) {
                continue;
            }
            let existing_entities = Entities::extract(existing);

            if let Some((contradiction_type, confidence, explanation)) =
                fast_filter(new_content, existing, &new_entities, &existing_entities)
            {
                reports.push(ContradictionReport {
                    new_memory: item.content.clone(),
                    existing_memory: candidate.content.clone(),
                    is_contradiction: true,
                    confidence,
                    explanation,
                    contradiction_type,
                    detected_by: DetectedBy::Heuristic,
                });
                continue;
            }

            if !should_escalate(rank, &new_entities, &existing_entities) {
                continue;
            }
            let Some(judge) = &self.judge else {
                continue;
            };
            if llm_calls >= self.config.max_llm_calls {
                tracing::debug!(rank, "LLM call budget spent, skipping candidate");
                continue;
            }

            llm_calls += 1;
            let prompt = contradiction_judge_prompt(new_content, existing);
            let response = match judge.generate(&prompt).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(rank, error = %e, "Contradiction judge unavailable");
                    continue;
                }
            };

            let report = parse_judgement(&response, &item.content, &candidate.content);
            tracing::debug!(
                rank,
                is_contradiction = report.is_contradiction,
                confidence = report.confidence,
                "Judge verdict"
            );
            if report.is_contradiction && report.confidence >= confidence_threshold {
                reports.push(report);
            }
        }

        Ok(ContradictionCheck::from_reports(reports, llm_calls))
    }
}

/// Pattern-only verdict. Returns `(type, confidence, explanation)` on a hit.
pub fn fast_filter(
    new_content: &str,
    existing: &str,
    new_entities: &Entities,
    existing_entities: &Entities,
) -> Option<(ContradictionType, f32, String)> {
    if new_entities.dates_disjoint(existing_entities) {
        return Some((
            ContradictionType::Temporal,
            TEMPORAL_CONFIDENCE,
            format!(
                "Dates differ: {} vs {}",
                join(&new_entities.dates),
                join(&existing_entities.dates)
            ),
        ));
    }

    for group in EXCLUSIVE_GROUPS {
        let in_new = matching_members(group, new_content);
        let in_existing = matching_members(group, existing);
        if in_new.is_empty() || in_existing.is_empty() {
            continue;
        }
        if in_new.iter().all(|m| !in_existing.contains(m)) {
            return Some((
                ContradictionType::Direct,
                DIRECT_CONFIDENCE,
                format!(
                    "Conflicting {}: {} vs {}",
                    group.name,
                    in_new.join(", "),
                    in_existing.join(", ")
                ),
            ));
        }
    }

    None
}

fn matching_members(group: &ExclusiveGroup, text: &str) -> Vec<&'static str> {
    group
        .members
        .iter()
        .copied()
        .filter(|member| contains_word(text, member))
        .collect()
}

fn join(values: &std::collections::BTreeSet<String>) -> String {
    values.iter().cloned().collect::<Vec<_>>().join(", ")
}

/// Whether a pair the fast filter could not decide is worth an LLM call:
/// both sides carry dates or numbers that share no value, or the candidate is
/// among the closest few and neither side carries any such value.
pub fn should_escalate(rank: usize, new_entities: &Entities, existing: &Entities) -> bool {
    if new_entities.has_signal() && existing.has_signal() {
        return new_entities.values_disjoint(existing);
    }
    rank < TOP_CANDIDATES && !new_entities.has_signal() && !existing.has_signal()
}

/// Read a judge response: strict JSON, then the outermost `{...}` block, then
/// keywords. A block without `is_contradiction` is not a verdict. Never fails; unreadable output is a non-contradiction.
pub fn parse_judgement(response: &str, new_memory: &str, existing_memory: &str) -> ContradictionReport {
    let verdict = serde_json::from_str::<JudgeVerdict>(response.trim())
        .ok()
        .or_else(|| {
            JSON_BLOCK
                .find(response)
                .and_then(|m| serde_json::from_str::<JudgeVerdict>(m.as_str()).ok())
        });

    let (is_contradiction, confidence, explanation, contradiction_type) = match verdict {
        Some(verdict) => {
            let is_contradiction = verdict.is_contradiction.value();
            let confidence = verdict
                .confidence
                .and_then(|c| c.value())
                .filter(|c| c.is_finite())
                .map(|c| c.clamp(0.0, 1.0))
                .unwrap_or(if is_contradiction { KEYWORD_CONFIDENCE } else { 0.0 });
            (
                is_contradiction,
                confidence,
                verdict.explanation.unwrap_or_default(),
                verdict.contradiction_type,
            )
        }
        None => {
            let is_contradiction =
                contains_word(response, "yes") || contains_word(response, "true");
            (
                is_contradiction,
                if is_contradiction { KEYWORD_CONFIDENCE } else { 0.0 },
                response.trim().chars().take(200).collect(),
                ContradictionType::None,
            )
        }
    };

    ContradictionReport {
        new_memory: new_memory.to_string(),
        existing_memory: existing_memory.to_string(),
        is_contradiction,
        confidence,
        explanation,
        contradiction_type,
        detected_by: DetectedBy::Llm,
    }
}
