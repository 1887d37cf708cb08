//! Prompt templates for the contradiction judge.
//!
//! Templates use plain `format!()` interpolation so a missing variable is a
//! compile-time error.

/// System message sent with every judge request.
pub const JUDGE_SYSTEM_PROMPT: &str =
    "You compare two statements about the same user and decide whether they conflict. \
     Answer with a single JSON object and nothing else.";

/// Generate a prompt asking whether `new_fact` contradicts `existing_fact`.
///
/// The model is asked for `{is_contradiction, confidence, explanation,
/// contradiction_type}` but nothing guarantees it complies, so the response
/// must be parsed leniently.
///
/// # Arguments
/// * `new_fact` - The statement about to be learned
/// * `existing_fact` - A similar statement already in the knowledge base
///
/// # Example
/// ```
/// use strata::llm::prompts::contradiction_judge_prompt;
///
/// let prompt = contradiction_judge_prompt("User is married", "User is single");
/// assert!(prompt.contains("User is married"));
/// assert!(prompt.contains("contradiction_type"));
/// ```
pub fn contradiction_judge_prompt(new_fact: &str, existing_fact: &str) -> String {
    format!(
        r#"Do these two statements contradict each other?

Existing: {existing_fact}
New: {new_fact}

Statements that add detail, change topic, or can both be true are NOT contradictions.
Use "temporal" when they disagree on a date or time, "direct" when they disagree on a status or value, otherwise "none".

Respond with JSON only:
{{"is_contradiction": true|false, "confidence": 0.0-1.0, "explanation": "<one sentence>", "contradiction_type": "temporal"|"direct"|"none"}}"#
    )
}
