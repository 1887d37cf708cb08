mod common;

use std::sync::Arc;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use uuid::Uuid;

use strata::config::LearningConfig;
use strata::error::{Result, StrataError};
use strata::intelligence::{ContradictionType, DetectedBy, KnowledgeItem};
use strata::llm::LlmJudge;
use strata::{MemorySubsystem, TaskStatus};
use tokio_util::sync::CancellationToken;

use common::{HarnessBuilder, ScriptedJudge, UnavailableVectorStore};

const NO: &str = r#"{"is_contradiction": false, "confidence": 0.1, "explanation": "compatible"}"#;

async fn remember(memory: &MemorySubsystem, content: &str, tenant: Option<Uuid>) {
    let outcome = memory
        .add_long_term_memory(content, &["s1".to_string()], 0.9, tenant, false, None)
        .await
        .unwrap();
    assert!(outcome.created, "fact not stored: {content}");
}

struct DownJudge;

#[async_trait]
impl LlmJudge for DownJudge {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(StrataError::LlmUnavailable("connection refused".to_string()))
    }
}

#[tokio::test]
async fn test_conflicting_dates_are_caught_without_llm() {
    let judge = ScriptedJudge::always(NO);
    let h = HarnessBuilder::new().judge(judge.clone()).build().await;
    remember(&h.memory, "User's birthday is March 5, 1990", None).await;

    let check = h
        .memory
        .check_contradictions(
            &KnowledgeItem::new("User's birthday is April 10, 1990", None),
            None,
            None,
        )
        .await;

    assert!(check.has_contradiction);
    assert_eq!(check.contradictions.len(), 1);
    let report = &check.contradictions[0];
    assert_eq!(report.contradiction_type, ContradictionType::Temporal);
    assert_eq!(report.detected_by, DetectedBy::Heuristic);
    assert!((report.confidence - 0.9).abs() < 1e-6);
    assert_eq!(check.llm_calls, 0);
    assert_eq!(judge.calls(), 0);
}

#[tokio::test]
async fn test_same_date_in_another_format_is_not_temporal() {
    let judge = ScriptedJudge::always(NO);
    let h = HarnessBuilder::new().judge(judge.clone()).build().await;
    remember(&h.memory, "User moved to Berlin on 2021-06-01", None).await;

    let check = h
        .memory
        .check_contradictions(
            &KnowledgeItem::new("User moved to Berlin on June 1, 2021", None),
            None,
            None,
        )
        .await;

    assert!(!check.has_contradiction);
}

#[tokio::test]
async fn test_exclusive_status_is_a_direct_contradiction() {
    let judge = ScriptedJudge::always(NO);
    let h = HarnessBuilder::new().judge(judge.clone()).build().await;
    remember(&h.memory, "User is married", None).await;

    let check = h
        .memory
        .check_contradictions(&KnowledgeItem::new("User is single", None), None, None)
        .await;

    assert!(check.has_contradiction);
    assert_eq!(check.contradictions[0].contradiction_type, ContradictionType::Direct);
    assert_eq!(judge.calls(), 0);
}

#[tokio::test]
async fn test_undecided_pair_is_judged_by_llm() {
    let judge = ScriptedJudge::always(
        r#"Sure. {"is_contradiction": "yes", "confidence": "80%", "explanation": "different employers", "contradiction_type": "direct"}"#,
    );
    let h = HarnessBuilder::new().judge(judge.clone()).build().await;
    remember(&h.memory, "User works at Acme", None).await;

    let check = h
        .memory
        .check_contradictions(&KnowledgeItem::new("User works at Globex", None), None, None)
        .await;

    assert!(check.has_contradiction);
    assert_eq!(judge.calls(), 1);
    let report = &check.contradictions[0];
    assert_eq!(report.detected_by, DetectedBy::Llm);
    assert_eq!(report.explanation, "different employers");
    assert!((report.confidence - 0.8).abs() < 1e-6);
}

#[tokio::test]
async fn test_llm_calls_are_capped_per_check() {
    let judge = ScriptedJudge::always(NO);
    let h = HarnessBuilder::new().judge(judge.clone()).build().await;
    for km in 10..16 {
        remember(&h.memory, &format!("User runs {km} km every day"), None).await;
    }

    let check = h
        .memory
        .check_contradictions(&KnowledgeItem::new("User runs 5 km every day", None), None, None)
        .await;

    assert!(!check.has_contradiction);
    assert_eq!(check.llm_calls, 3);
    assert_eq!(judge.calls(), 3);
}

#[tokio::test]
async fn test_event_dates_conflict_on_fast_path() {
    let judge = ScriptedJudge::always(NO);
    let h = HarnessBuilder::new().judge(judge.clone()).build().await;
    remember(&h.memory, "event is March 10, 2025", None).await;

    let check = h
        .memory
        .check_contradictions(&KnowledgeItem::new("event is March 5, 2025", None), None, None)
        .await;

    assert!(check.has_contradiction);
    assert!((check.confidence - 0.9).abs() < 1e-6);
    assert_eq!(check.contradictions[0].contradiction_type, ContradictionType::Temporal);
    assert_eq!(judge.calls(), 0);
}

#[tokio::test]
async fn test_signal_free_candidates_escalate_only_top_three() {
    let judge = ScriptedJudge::always(NO);
    let h = HarnessBuilder::new().judge(judge.clone()).build().await;
    for hobby in ["hiking", "painting", "chess", "surfing", "baking", "knitting"] {
        remember(&h.memory, &format!("User enjoys {hobby}"), None).await;
    }

    let check = h
        .memory
        .check_contradictions(&KnowledgeItem::new("User enjoys cooking", None), None, None)
        .await;

    assert!(!check.has_contradiction);
    assert_eq!(judge.calls(), 3);
}

#[tokio::test]
async fn test_low_confidence_verdict_respects_threshold() {
    let judge = ScriptedJudge::always(r#"{"is_contradiction": true, "confidence": 0.4}"#);
    let h = HarnessBuilder::new().judge(judge.clone()).build().await;
    remember(&h.memory, "User prefers window seats", None).await;
    let item = KnowledgeItem::new("User prefers aisle seats", None);

    let strict = h.memory.check_contradictions(&item, None, None).await;
    assert!(!strict.has_contradiction);

    let lenient = h.memory.check_contradictions(&item, None, Some(0.3)).await;
    assert!(lenient.has_contradiction);
}

#[tokio::test]
async fn test_judge_failure_is_not_a_contradiction() {
    let h = HarnessBuilder::new()
        .judge(Arc::new(DownJudge))
        .build()
        .await;
    remember(&h.memory, "User works at Acme", None).await;

    let check = h
        .memory
        .check_contradictions(&KnowledgeItem::new("User works at Globex", None), None, None)
        .await;

    assert!(!check.has_contradiction);
    assert_eq!(check.llm_calls, 1);
    assert!(check.error.is_none());
}

#[tokio::test]
async fn test_identical_fact_is_not_compared() {
    let judge = ScriptedJudge::always(r#"{"is_contradiction": true, "confidence": 1.0}"#);
    let h = HarnessBuilder::new().judge(judge.clone()).build().await;
    remember(&h.memory, "User is married", None).await;

    let check = h
        .memory
        .check_contradictions(&KnowledgeItem::new("[FACT] User is married", None), None, None)
        .await;

    assert!(!check.has_contradiction);
    assert_eq!(judge.calls(), 0);
}

#[tokio::test]
async fn test_contradictions_do_not_cross_tenants() {
    let h = HarnessBuilder::new().build().await;
    let tenant_a = Some(Uuid::new_v4());
    let tenant_b = Some(Uuid::new_v4());
    remember(&h.memory, "User is vegan", tenant_a).await;

    let check = h
        .memory
        .check_contradictions(&KnowledgeItem::new("User is vegetarian", tenant_b), None, None)
        .await;
    assert!(!check.has_contradiction);

    let check = h
        .memory
        .check_contradictions(&KnowledgeItem::new("User is vegetarian", tenant_a), None, None)
        .await;
    assert!(check.has_contradiction);
}

#[tokio::test]
async fn test_unavailable_store_degrades_to_no_contradiction() {
    let judge = ScriptedJudge::always(NO);
    let h = HarnessBuilder::new()
        .judge(judge.clone())
        .vectors(Arc::new(UnavailableVectorStore))
        .build()
        .await;

    let check = h
        .memory
        .check_contradictions(&KnowledgeItem::new("User is single", None), None, None)
        .await;

    assert!(!check.has_contradiction);
    assert!(check.error.is_none());
    assert_eq!(judge.calls(), 0);
}

#[tokio::test]
async fn test_rejected_similarity_search_reports_error() {
    let judge = ScriptedJudge::always(NO);
    let h = HarnessBuilder::new()
        .judge(judge.clone())
        .max_query_limit(2)
        .build()
        .await;
    remember(&h.memory, "User is married", None).await;

    let check = h
        .memory
        .check_contradictions(&KnowledgeItem::new("User is single", None), None, None)
        .await;

    assert!(!check.has_contradiction);
    assert!(check.error.is_some());
    assert!(check.contradictions.is_empty());
    assert_eq!(judge.calls(), 0);
}

#[tokio::test]
async fn test_learning_queue_reports_contradiction_and_stores_fact() {
    let h = HarnessBuilder::new().build().await;
    remember(&h.memory, "User is employed", None).await;

    let queue = h
        .memory
        .start_learning(&LearningConfig::default(), CancellationToken::new());
    let task_id = queue
        .submit(strata::LearningTask {
            content: "User is retired".to_string(),
            learned_from_sessions: vec!["s2".to_string()],
            importance_score: 0.9,
            tenant_id: None,
        })
        .unwrap();
    queue.shutdown().await;

    match queue.status(&task_id) {
        Some(TaskStatus::Completed {
            created,
            contradiction,
            ..
        }) => {
            assert!(created);
            assert!(contradiction.has_contradiction);
        }
        other => panic!("unexpected status: {other:?}"),
    }
    assert_eq!(h.memory.long_term().count(None).await.unwrap(), 2);
}
