//! Data model for the agentic reading-passage pipeline.
//!
//! Everything here is a plain value type: requests are immutable inputs,
//! drafts are superseded rather than mutated, and the attempt log is
//! append-only so the final response can carry the full history.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// CEFR difficulty level of the target text (A1 easiest, C2 hardest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CefrLevel {
    A1,
    A2,
    B1,
    B2,
    C1,
    C2,
}

impl fmt::Display for CefrLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CefrLevel::A1 => "A1",
            CefrLevel::A2 => "A2",
            CefrLevel::B1 => "B1",
            CefrLevel::B2 => "B2",
            CefrLevel::C1 => "C1",
            CefrLevel::C2 => "C2",
        };
        write!(f, "{}", name)
    }
}

/// Immutable input describing one passage-generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub topic: String,
    pub cefr_level: CefrLevel,
    pub target_word_count: usize,
    pub tone: String,
    pub topic_hints: Option<String>,
    pub core_vocabulary: Vec<String>,
    pub max_retries: usize,
}

/// One section of the planned passage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlineSection {
    pub name: String,
    pub instructions: String,
}

/// Content plan produced once by the planner and read-only afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outline {
    pub title_suggestion: String,
    #[serde(default)]
    pub learning_objectives: Vec<String>,
    #[serde(default)]
    pub sections: Vec<OutlineSection>,
    #[serde(default)]
    pub recommended_vocabulary: Vec<String>,
}

/// A candidate passage. Produced fresh on every attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub title: String,
    pub passage: String,
}

/// Diagnostic snapshot computed by the auditor. Immutable once built.
///
/// Fields are `None` when the corresponding check could not run: the
/// readability score when the formula had no input to work with, the
/// grammar count when no grammar service is configured.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditReport {
    pub word_count: usize,
    pub flesch_score: Option<f64>,
    pub lexical_diversity: Option<f64>,
    pub grammar_error_count: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Accepted,
    Rejected,
    GeneratorFailed,
}

/// One entry in the append-only attempt log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt_number: usize,
    pub title: String,
    pub word_count: usize,
    pub report: AuditReport,
    pub errors: Vec<String>,
    pub status: AttemptStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Success,
    MaxRetriesReached,
}

/// Terminal value of the self-correction loop, built exactly once per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalResult {
    pub status: GenerationStatus,
    pub draft: Draft,
    pub outline: Outline,
    pub report: AuditReport,
    pub attempts: Vec<AttemptRecord>,
}

/// Merges the request's core vocabulary with the planner's recommendations
/// into the combined set used by every author call.
///
/// Set semantics are case- and order-insensitive: words are trimmed and
/// lowercased, duplicates collapse, and the result is fixed for the rest of
/// the request.
pub fn merge_vocabulary(core: &[String], recommended: &[String]) -> BTreeSet<String> {
    core.iter()
        .chain(recommended.iter())
        .map(|word| word.trim().to_lowercase())
        .filter(|word| !word.is_empty())
        .collect()
}
