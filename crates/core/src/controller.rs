//! Self-correction controller.
//!
//! Drives one request through PLANNING, then repeated GENERATING/AUDITING
//! cycles, until the auditor accepts a draft or the retry bound is reached.
//! The attempt log is append-only and its length always equals the number of
//! author invocations made.

use crate::audit::PassageAuditor;
use crate::author::{Author, AuthorError, PriorFailure};
use crate::llm::CompletionError;
use crate::passage::{
    AttemptRecord, AttemptStatus, AuditReport, Draft, FinalResult, GenerationRequest,
    GenerationStatus, merge_vocabulary,
};
use crate::planner::Planner;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Pause taken once after planning, before the first generation attempt.
    pub planning_cooldown: Duration,
    /// Pause taken before every attempt after the first.
    pub attempt_cooldown: Duration,
    /// When set, an author parse failure ends the loop immediately instead
    /// of consuming a retry. Off by default: a re-sampled completion often
    /// parses fine on the next attempt.
    pub abort_on_author_parse_failure: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            planning_cooldown: Duration::from_secs(5),
            attempt_cooldown: Duration::from_secs(3),
            abort_on_author_parse_failure: false,
        }
    }
}

/// Fatal failures: only the planning phase can produce these. Everything
/// that goes wrong inside the generate/audit cycle is absorbed into the
/// attempt log instead.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    /// Planning hit the completion service's quota. Maps to HTTP 429.
    #[error("completion quota exhausted while planning the outline")]
    QuotaExhausted,
    #[error("failed to plan the outline: {0}")]
    Planning(String),
    /// Every attempt failed before producing any draft at all, so there is
    /// no best-effort text to return.
    #[error("all generation attempts failed before producing a draft")]
    NoDraft,
}

pub struct PassageGenerator {
    planner: Arc<dyn Planner>,
    author: Arc<dyn Author>,
    auditor: Arc<dyn PassageAuditor>,
    config: GeneratorConfig,
}

impl PassageGenerator {
    pub fn new(
        planner: Arc<dyn Planner>,
        author: Arc<dyn Author>,
        auditor: Arc<dyn PassageAuditor>,
        config: GeneratorConfig,
    ) -> Self {
        Self {
            planner,
            author,
            auditor,
            config,
        }
    }

    /// Runs the full loop for one request. Sequential end to end: the only
    /// suspension points are external calls and the courtesy cooldowns.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<FinalResult, GenerateError> {
        // PLANNING: one shot, fatal on failure.
        let outline = self.planner.plan(request).await.map_err(|err| match err {
            CompletionError::RateLimited(_) => GenerateError::QuotaExhausted,
            CompletionError::Other(message) => GenerateError::Planning(message),
        })?;

        // The combined vocabulary is fixed from here on.
        let vocabulary = merge_vocabulary(&request.core_vocabulary, &outline.recommended_vocabulary);

        tokio::time::sleep(self.config.planning_cooldown).await;

        let max_retries = request.max_retries.max(1);
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut prior: Option<PriorFailure> = None;
        let mut best_effort: Option<(Draft, AuditReport, Vec<String>)> = None;

        for attempt_number in 1..=max_retries {
            if attempt_number > 1 {
                tokio::time::sleep(self.config.attempt_cooldown).await;
            }

            let draft = match self
                .author
                .write(&outline, &vocabulary, request, prior.clone())
                .await
            {
                Ok(draft) => draft,
                Err(err) => {
                    warn!(attempt = attempt_number, error = %err, "draft generation failed");
                    let parse_failure = err.is_parse_failure();
                    attempts.push(AttemptRecord {
                        attempt_number,
                        title: String::new(),
                        word_count: 0,
                        report: AuditReport::default(),
                        errors: vec![err.to_string()],
                        status: AttemptStatus::GeneratorFailed,
                    });
                    if parse_failure && self.config.abort_on_author_parse_failure {
                        break;
                    }
                    continue;
                }
            };

            // AUDITING.
            let outcome = self
                .auditor
                .audit(
                    &draft.passage,
                    &draft.title,
                    request.cefr_level,
                    request.target_word_count,
                )
                .await;

            attempts.push(AttemptRecord {
                attempt_number,
                title: draft.title.clone(),
                word_count: outcome.report.word_count,
                report: outcome.report.clone(),
                errors: outcome.errors.clone(),
                status: if outcome.passed {
                    AttemptStatus::Accepted
                } else {
                    AttemptStatus::Rejected
                },
            });

            if outcome.passed {
                // First passing attempt wins immediately.
                info!(attempt = attempt_number, "draft accepted");
                return Ok(FinalResult {
                    status: GenerationStatus::Success,
                    draft,
                    outline,
                    report: outcome.report,
                    attempts,
                });
            }

            info!(
                attempt = attempt_number,
                errors = outcome.errors.len(),
                "draft rejected"
            );
            prior = Some(PriorFailure {
                errors: outcome.errors.clone(),
                flesch_score: outcome.report.flesch_score,
            });
            best_effort = Some((draft, outcome.report, outcome.errors));
        }

        // Retries exhausted: return the last produced draft as best effort.
        match best_effort {
            Some((draft, report, _errors)) => Ok(FinalResult {
                status: GenerationStatus::MaxRetriesReached,
                draft,
                outline,
                report,
                attempts,
            }),
            None => Err(GenerateError::NoDraft),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditOutcome, MockPassageAuditor};
    use crate::author::MockAuthor;
    use crate::passage::CefrLevel;
    use crate::planner::MockPlanner;
    use crate::passage::Outline;

    fn request(max_retries: usize) -> GenerationRequest {
        GenerationRequest {
            topic: "Climate Change".to_string(),
            cefr_level: CefrLevel::B1,
            target_word_count: 150,
            tone: "neutral".to_string(),
            topic_hints: None,
            core_vocabulary: vec!["emission".to_string()],
            max_retries,
        }
    }

    fn outline() -> Outline {
        Outline {
            title_suggestion: "Our Changing Weather".to_string(),
            learning_objectives: vec![],
            sections: vec![],
            recommended_vocabulary: vec!["climate".to_string(), "Emission".to_string()],
        }
    }

    fn draft(n: usize) -> Draft {
        Draft {
            title: format!("Draft {n}"),
            passage: format!("Passage body number {n}."),
        }
    }

    fn passing_outcome() -> AuditOutcome {
        AuditOutcome {
            passed: true,
            report: AuditReport {
                word_count: 148,
                flesch_score: Some(58.0),
                lexical_diversity: Some(0.55),
                grammar_error_count: Some(1),
            },
            errors: vec![],
        }
    }

    fn failing_outcome(error: &str) -> AuditOutcome {
        AuditOutcome {
            passed: false,
            report: AuditReport {
                word_count: 90,
                flesch_score: Some(58.0),
                lexical_diversity: Some(0.30),
                grammar_error_count: None,
            },
            errors: vec![error.to_string()],
        }
    }

    fn planner_returning_outline() -> MockPlanner {
        let mut planner = MockPlanner::new();
        planner.expect_plan().returning(|_| Ok(outline()));
        planner
    }

    fn zero_cooldowns() -> GeneratorConfig {
        GeneratorConfig {
            planning_cooldown: Duration::ZERO,
            attempt_cooldown: Duration::ZERO,
            abort_on_author_parse_failure: false,
        }
    }

    fn generator(
        planner: MockPlanner,
        author: MockAuthor,
        auditor: MockPassageAuditor,
        config: GeneratorConfig,
    ) -> PassageGenerator {
        PassageGenerator::new(
            Arc::new(planner),
            Arc::new(author),
            Arc::new(auditor),
            config,
        )
    }

    #[tokio::test]
    async fn first_passing_attempt_wins_regardless_of_max_retries() {
        let mut author = MockAuthor::new();
        author
            .expect_write()
            .times(1)
            .returning(|_, _, _, _| Ok(draft(1)));
        let mut auditor = MockPassageAuditor::new();
        auditor
            .expect_audit()
            .times(1)
            .returning(|_, _, _, _| passing_outcome());

        let generator = generator(
            planner_returning_outline(),
            author,
            auditor,
            zero_cooldowns(),
        );
        let result = generator.generate(&request(10)).await.unwrap();

        assert_eq!(result.status, GenerationStatus::Success);
        assert_eq!(result.attempts.len(), 1);
        assert_eq!(result.attempts[0].status, AttemptStatus::Accepted);
        assert_eq!(result.draft.title, "Draft 1");
    }

    #[tokio::test]
    async fn always_rejecting_auditor_exhausts_exactly_max_retries() {
        let mut author = MockAuthor::new();
        let mut n = 0usize;
        author.expect_write().times(3).returning(move |_, _, _, _| {
            n += 1;
            Ok(draft(n))
        });
        let mut auditor = MockPassageAuditor::new();
        auditor
            .expect_audit()
            .times(3)
            .returning(|_, _, _, _| failing_outcome("Lexical diversity 0.30 is below 0.4"));

        let generator = generator(
            planner_returning_outline(),
            author,
            auditor,
            zero_cooldowns(),
        );
        let result = generator.generate(&request(3)).await.unwrap();

        assert_eq!(result.status, GenerationStatus::MaxRetriesReached);
        assert_eq!(result.attempts.len(), 3);
        assert!(result
            .attempts
            .iter()
            .all(|a| a.status == AttemptStatus::Rejected));
        // The last attempt's draft is the best-effort result.
        assert_eq!(result.draft.title, "Draft 3");
    }

    #[tokio::test]
    async fn attempt_numbers_increase_from_one() {
        let mut author = MockAuthor::new();
        author.expect_write().returning(|_, _, _, _| Ok(draft(0)));
        let mut auditor = MockPassageAuditor::new();
        auditor
            .expect_audit()
            .returning(|_, _, _, _| failing_outcome("rejected"));

        let generator = generator(
            planner_returning_outline(),
            author,
            auditor,
            zero_cooldowns(),
        );
        let result = generator.generate(&request(3)).await.unwrap();

        let numbers: Vec<usize> = result.attempts.iter().map(|a| a.attempt_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn author_failure_is_recorded_and_the_loop_continues() {
        let mut author = MockAuthor::new();
        let mut call = 0usize;
        author.expect_write().times(2).returning(move |_, _, _, _| {
            call += 1;
            if call == 1 {
                Err(AuthorError::Completion(CompletionError::Other(
                    "transport error".to_string(),
                )))
            } else {
                Ok(draft(2))
            }
        });
        let mut auditor = MockPassageAuditor::new();
        auditor
            .expect_audit()
            .times(1)
            .returning(|_, _, _, _| passing_outcome());

        let generator = generator(
            planner_returning_outline(),
            author,
            auditor,
            zero_cooldowns(),
        );
        let result = generator.generate(&request(3)).await.unwrap();

        assert_eq!(result.status, GenerationStatus::Success);
        assert_eq!(result.attempts.len(), 2);
        assert_eq!(result.attempts[0].status, AttemptStatus::GeneratorFailed);
        assert_eq!(result.attempts[1].status, AttemptStatus::Accepted);
    }

    #[tokio::test]
    async fn all_attempts_failing_to_generate_yields_no_draft() {
        let mut author = MockAuthor::new();
        author.expect_write().times(2).returning(|_, _, _, _| {
            Err(AuthorError::Completion(CompletionError::Other(
                "transport error".to_string(),
            )))
        });
        let auditor = MockPassageAuditor::new();

        let generator = generator(
            planner_returning_outline(),
            author,
            auditor,
            zero_cooldowns(),
        );
        let err = generator.generate(&request(2)).await.unwrap_err();
        assert!(matches!(err, GenerateError::NoDraft));
    }

    #[tokio::test]
    async fn parse_failure_short_circuits_when_the_flag_is_set() {
        let mut author = MockAuthor::new();
        author
            .expect_write()
            .times(1)
            .returning(|_, _, _, _| Err(AuthorError::Parse("not json".to_string())));
        let auditor = MockPassageAuditor::new();

        let config = GeneratorConfig {
            abort_on_author_parse_failure: true,
            ..zero_cooldowns()
        };
        let generator = generator(planner_returning_outline(), author, auditor, config);
        let err = generator.generate(&request(5)).await.unwrap_err();
        assert!(matches!(err, GenerateError::NoDraft));
    }

    #[tokio::test]
    async fn planner_quota_exhaustion_is_a_distinct_terminal_error() {
        let mut planner = MockPlanner::new();
        planner
            .expect_plan()
            .returning(|_| Err(CompletionError::RateLimited("quota exceeded".to_string())));

        let generator = generator(
            planner,
            MockAuthor::new(),
            MockPassageAuditor::new(),
            zero_cooldowns(),
        );
        let err = generator.generate(&request(3)).await.unwrap_err();
        assert!(matches!(err, GenerateError::QuotaExhausted));
    }

    #[tokio::test]
    async fn planner_parse_failure_is_a_generic_fatal_error() {
        let mut planner = MockPlanner::new();
        planner
            .expect_plan()
            .returning(|_| Err(CompletionError::Other("bad json".to_string())));

        let generator = generator(
            planner,
            MockAuthor::new(),
            MockPassageAuditor::new(),
            zero_cooldowns(),
        );
        let err = generator.generate(&request(3)).await.unwrap_err();
        assert!(matches!(err, GenerateError::Planning(_)));
    }

    #[tokio::test]
    async fn author_receives_the_merged_vocabulary_and_prior_errors() {
        let mut author = MockAuthor::new();
        let mut call = 0usize;
        author
            .expect_write()
            .times(2)
            .withf(|_, vocabulary, _, prior| {
                // Request vocab + planner vocab, case-insensitive dedupe.
                let merged_ok = vocabulary.len() == 2
                    && vocabulary.contains("climate")
                    && vocabulary.contains("emission");
                let prior_ok = match prior {
                    None => true,
                    Some(p) => p.errors.iter().any(|e| e.contains("diversity")),
                };
                merged_ok && prior_ok
            })
            .returning(move |_, _, _, _| {
                call += 1;
                Ok(draft(call))
            });
        let mut auditor = MockPassageAuditor::new();
        let mut audit_call = 0usize;
        auditor.expect_audit().times(2).returning(move |_, _, _, _| {
            audit_call += 1;
            if audit_call == 1 {
                failing_outcome("Lexical diversity 0.30 is below 0.4; too repetitive")
            } else {
                passing_outcome()
            }
        });

        let generator = generator(
            planner_returning_outline(),
            author,
            auditor,
            zero_cooldowns(),
        );
        let result = generator.generate(&request(3)).await.unwrap();

        assert_eq!(result.attempts.len(), 2);
        assert_eq!(result.attempts[0].status, AttemptStatus::Rejected);
        assert!(result.attempts[0].errors[0].contains("diversity"));
        assert_eq!(result.attempts[1].status, AttemptStatus::Accepted);
    }

    // Scenario from the acceptance checklist: B1 "Climate Change" request
    // whose first draft already satisfies the auditor.
    #[tokio::test]
    async fn climate_change_scenario_accepts_on_the_first_attempt() {
        let mut author = MockAuthor::new();
        author
            .expect_write()
            .times(1)
            .returning(|_, _, _, _| Ok(draft(1)));
        let mut auditor = MockPassageAuditor::new();
        auditor.expect_audit().times(1).returning(|_, _, _, _| AuditOutcome {
            passed: true,
            report: AuditReport {
                word_count: 148,
                flesch_score: Some(58.0),
                lexical_diversity: Some(0.55),
                grammar_error_count: Some(0),
            },
            errors: vec![],
        });

        let generator = generator(
            planner_returning_outline(),
            author,
            auditor,
            zero_cooldowns(),
        );
        let result = generator.generate(&request(3)).await.unwrap();

        assert_eq!(result.status, GenerationStatus::Success);
        assert_eq!(result.attempts.len(), 1);
        assert_eq!(result.report.word_count, 148);
    }
}
