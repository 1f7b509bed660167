//! The critic: pass/fail diagnostics for a candidate passage.
//!
//! Each check independently appends a human-readable error string, so a
//! single audit can report several failures at once. The error strings are
//! fed back verbatim into the next author prompt, which is why they are
//! written as instructions a model can act on.

use crate::grammar::{GrammarService, is_counted_category};
use crate::passage::{AuditReport, CefrLevel};
use crate::readability;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Word count must lie within ±25% of the target.
const WORD_COUNT_TOLERANCE: f64 = 0.25;
/// Below this unique/total ratio the passage is too repetitive.
const MIN_LEXICAL_DIVERSITY: f64 = 0.40;
/// No single token may claim more than this share of all tokens.
const MAX_TOKEN_SHARE: f64 = 0.08;
/// More grammar/typo matches than this fails the audit.
const GRAMMAR_ERROR_BUDGET: usize = 5;
const MIN_TITLE_CHARS: usize = 5;
const MIN_PASSAGE_CHARS: usize = 100;

/// Flesch reading-ease target per CEFR level; `None` uses a generic band.
pub fn reading_ease_band(level: Option<CefrLevel>) -> (f64, f64) {
    match level {
        Some(CefrLevel::A1) => (70.0, 100.0),
        Some(CefrLevel::A2) => (60.0, 80.0),
        Some(CefrLevel::B1) => (50.0, 65.0),
        Some(CefrLevel::B2) => (40.0, 55.0),
        Some(CefrLevel::C1) => (30.0, 45.0),
        Some(CefrLevel::C2) => (0.0, 40.0),
        None => (40.0, 60.0),
    }
}

/// Result of one audit run.
#[derive(Debug, Clone)]
pub struct AuditOutcome {
    pub passed: bool,
    pub report: AuditReport,
    pub errors: Vec<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PassageAuditor: Send + Sync {
    async fn audit(
        &self,
        passage: &str,
        title: &str,
        level: CefrLevel,
        target_word_count: usize,
    ) -> AuditOutcome;
}

/// The concrete auditor. Holds an optional grammar-service handle; when it
/// is absent the grammar check is skipped and the report field left empty.
pub struct TextAuditor {
    grammar: Option<Arc<dyn GrammarService>>,
}

impl TextAuditor {
    pub fn new(grammar: Option<Arc<dyn GrammarService>>) -> Self {
        Self { grammar }
    }
}

#[async_trait]
impl PassageAuditor for TextAuditor {
    async fn audit(
        &self,
        passage: &str,
        title: &str,
        level: CefrLevel,
        target_word_count: usize,
    ) -> AuditOutcome {
        let mut errors = Vec::new();
        let mut report = AuditReport::default();

        // 1. Word-count band.
        let actual = readability::word_count(passage);
        report.word_count = actual;
        let tolerance = (WORD_COUNT_TOLERANCE * target_word_count as f64).floor() as usize;
        let min = target_word_count.saturating_sub(tolerance);
        let max = target_word_count + tolerance;
        if actual < min || actual > max {
            errors.push(format!(
                "Word count {actual} is outside the allowed range {min}-{max} \
                 for a target of {target_word_count} words."
            ));
        }

        // 2. Readability band.
        let (ease_min, ease_max) = reading_ease_band(Some(level));
        match readability::flesch_reading_ease(passage) {
            Some(score) => {
                report.flesch_score = Some(score);
                if score < ease_min || score > ease_max {
                    errors.push(format!(
                        "Flesch reading ease {score:.1} is outside the {level} target \
                         range {ease_min:.0}-{ease_max:.0}."
                    ));
                }
            }
            None => {
                errors.push("Could not compute a readability score for the passage.".to_string());
            }
        }

        // 3. Lexical diversity and single-word overuse.
        let tokens = readability::tokens(passage);
        if let Some(diversity) = readability::lexical_diversity(&tokens) {
            report.lexical_diversity = Some(diversity);
            if diversity < MIN_LEXICAL_DIVERSITY {
                errors.push(format!(
                    "Lexical diversity {diversity:.2} is below {MIN_LEXICAL_DIVERSITY}; \
                     the passage repeats the same words too often."
                ));
            }
            if let Some((token, count)) = readability::most_frequent(&tokens) {
                let share = count as f64 / tokens.len() as f64;
                if share > MAX_TOKEN_SHARE {
                    errors.push(format!(
                        "The word '{token}' is overused: it appears {count} times, \
                         more than 8% of all words."
                    ));
                }
            }
        }

        // 4. Grammar, only when the service is configured. A failed call is
        // treated the same as no service: skipped, never an audit error.
        if let Some(grammar) = &self.grammar {
            match grammar.check(passage).await {
                Ok(matches) => {
                    let count = matches
                        .iter()
                        .filter(|m| is_counted_category(&m.category))
                        .count();
                    report.grammar_error_count = Some(count);
                    if count > GRAMMAR_ERROR_BUDGET {
                        errors.push(format!(
                            "Found {count} grammar or spelling errors; \
                             at most {GRAMMAR_ERROR_BUDGET} are allowed."
                        ));
                    }
                }
                Err(err) => {
                    warn!(error = %err, "grammar check unavailable, skipping");
                }
            }
        }

        // 5. Structural checks.
        if title.trim().is_empty() || title.chars().count() < MIN_TITLE_CHARS {
            errors.push(format!(
                "Title must be at least {MIN_TITLE_CHARS} characters long."
            ));
        }
        if passage.chars().count() < MIN_PASSAGE_CHARS {
            errors.push(format!(
                "Passage must be at least {MIN_PASSAGE_CHARS} characters long."
            ));
        }

        AuditOutcome {
            passed: errors.is_empty(),
            report,
            errors,
        }
    }
}
