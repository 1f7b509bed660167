//! The author: produces a title and passage for one attempt.
//!
//! The first attempt writes from the outline; later attempts write from the
//! previous audit's failure feedback. The prompt always forbids markup, so
//! the controller can treat the output as plain text.

use crate::audit::reading_ease_band;
use crate::backoff::{BackoffPolicy, call_with_backoff};
use crate::llm::{CompletionClient, CompletionError, extract_json};
use crate::passage::{CefrLevel, Draft, GenerationRequest, Outline};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::debug;

/// At most this many words of the combined vocabulary are put in the prompt.
const MAX_PROMPT_VOCABULARY: usize = 10;

/// Sentence-length and complexity guidance per CEFR level, embedded in the
/// first-attempt prompt.
pub fn sentence_guidance(level: CefrLevel) -> &'static str {
    match level {
        CefrLevel::A1 => {
            "Use very short sentences of 5-8 words. Present simple tense only. \
             No subordinate clauses."
        }
        CefrLevel::A2 => {
            "Use short sentences of 8-12 words. Present and past simple tenses. \
             Simple connectors like 'and', 'but', 'because'."
        }
        CefrLevel::B1 => {
            "Use sentences of 12-15 words on average. Mix simple and compound \
             sentences. Common linking words are fine."
        }
        CefrLevel::B2 => {
            "Use varied sentences of 15-20 words. Complex sentences with relative \
             clauses and conditionals are allowed."
        }
        CefrLevel::C1 => {
            "Use longer, sophisticated sentences. Advanced structures such as \
             inversion and participle clauses are welcome."
        }
        CefrLevel::C2 => {
            "Write with native-level complexity. Idiomatic language and nuanced, \
             layered sentence structures are expected."
        }
    }
}

/// Failure context from the previous attempt, carried into the next prompt.
#[derive(Debug, Clone)]
pub struct PriorFailure {
    pub errors: Vec<String>,
    pub flesch_score: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthorError {
    /// The completion came back but did not contain a usable draft.
    #[error("could not parse a draft from the completion output: {0}")]
    Parse(String),
    #[error(transparent)]
    Completion(#[from] CompletionError),
}

impl AuthorError {
    pub fn is_parse_failure(&self) -> bool {
        matches!(self, AuthorError::Parse(_))
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Author: Send + Sync {
    async fn write(
        &self,
        outline: &Outline,
        vocabulary: &BTreeSet<String>,
        request: &GenerationRequest,
        prior: Option<PriorFailure>,
    ) -> Result<Draft, AuthorError>;
}

/// Author backed by the hosted completion service and prompt templates.
pub struct LlmAuthor {
    client: Arc<dyn CompletionClient>,
    backoff: BackoffPolicy,
    prompts: Arc<HashMap<String, String>>,
}

impl LlmAuthor {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        backoff: BackoffPolicy,
        prompts: Arc<HashMap<String, String>>,
    ) -> Self {
        Self {
            client,
            backoff,
            prompts,
        }
    }

    fn template(&self, key: &str) -> Result<&String, AuthorError> {
        self.prompts.get(key).ok_or_else(|| {
            AuthorError::Completion(CompletionError::Other(format!(
                "missing prompt template: '{key}'"
            )))
        })
    }

    fn outline_summary(outline: &Outline) -> String {
        let mut summary = String::new();
        for (index, section) in outline.sections.iter().enumerate() {
            let _ = writeln!(
                summary,
                "{}. {} - {}",
                index + 1,
                section.name,
                section.instructions
            );
        }
        summary
    }

    fn vocabulary_list(vocabulary: &BTreeSet<String>) -> String {
        vocabulary
            .iter()
            .take(MAX_PROMPT_VOCABULARY)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn initial_prompt(
        &self,
        outline: &Outline,
        vocabulary: &BTreeSet<String>,
        request: &GenerationRequest,
    ) -> Result<String, AuthorError> {
        let (ease_min, ease_max) = reading_ease_band(Some(request.cefr_level));
        Ok(self
            .template("draft_initial")?
            .replace("{topic}", &request.topic)
            .replace("{cefr_level}", &request.cefr_level.to_string())
            .replace("{target_word_count}", &request.target_word_count.to_string())
            .replace("{tone}", &request.tone)
            .replace("{title_suggestion}", &outline.title_suggestion)
            .replace("{outline}", &Self::outline_summary(outline))
            .replace("{vocabulary}", &Self::vocabulary_list(vocabulary))
            .replace("{sentence_guidance}", sentence_guidance(request.cefr_level))
            .replace("{ease_min}", &format!("{ease_min:.0}"))
            .replace("{ease_max}", &format!("{ease_max:.0}")))
    }

    fn revision_prompt(
        &self,
        outline: &Outline,
        vocabulary: &BTreeSet<String>,
        request: &GenerationRequest,
        prior: &PriorFailure,
    ) -> Result<String, AuthorError> {
        let (ease_min, ease_max) = reading_ease_band(Some(request.cefr_level));
        let directive = match prior.flesch_score {
            Some(score) if score < ease_min => {
                "The previous draft was too difficult to read. Simplify: shorter \
                 sentences, more common words."
            }
            Some(score) if score > ease_max => {
                "The previous draft was too simple. Increase complexity: longer \
                 sentences, more advanced vocabulary."
            }
            _ => {
                "Keep the current level of complexity, but fix every problem \
                 listed below (repetition, grammar, word count)."
            }
        };

        // Prior audit errors go in verbatim; they are written as
        // instructions the model can act on.
        let errors = prior
            .errors
            .iter()
            .map(|error| format!("- {error}"))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(self
            .template("draft_revision")?
            .replace("{topic}", &request.topic)
            .replace("{cefr_level}", &request.cefr_level.to_string())
            .replace("{target_word_count}", &request.target_word_count.to_string())
            .replace("{title_suggestion}", &outline.title_suggestion)
            .replace("{vocabulary}", &Self::vocabulary_list(vocabulary))
            .replace("{directive}", directive)
            .replace("{errors}", &errors))
    }
}

#[async_trait]
impl Author for LlmAuthor {
    async fn write(
        &self,
        outline: &Outline,
        vocabulary: &BTreeSet<String>,
        request: &GenerationRequest,
        prior: Option<PriorFailure>,
    ) -> Result<Draft, AuthorError> {
        let prompt = match &prior {
            None => self.initial_prompt(outline, vocabulary, request)?,
            Some(failure) => self.revision_prompt(outline, vocabulary, request, failure)?,
        };
        debug!(revision = prior.is_some(), "requesting draft");

        let client = self.client.clone();
        let raw = call_with_backoff(&self.backoff, || {
            let client = client.clone();
            let prompt = prompt.clone();
            async move { client.complete(&prompt).await }
        })
        .await?;

        let mut draft: Draft = serde_json::from_str(extract_json(&raw))
            .map_err(|e| AuthorError::Parse(e.to_string()))?;

        draft.title = html_escape::decode_html_entities(&draft.title).into_owned();
        draft.passage = html_escape::decode_html_entities(&draft.passage).into_owned();
        Ok(draft)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockCompletionClient;
    use crate::passage::OutlineSection;

    fn request() -> GenerationRequest {
        GenerationRequest {
            topic: "Climate Change".to_string(),
            cefr_level: CefrLevel::B1,
            target_word_count: 150,
            tone: "neutral".to_string(),
            topic_hints: None,
            core_vocabulary: vec![],
            max_retries: 3,
        }
    }

    fn outline() -> Outline {
        Outline {
            title_suggestion: "Our Changing Weather".to_string(),
            learning_objectives: vec![],
            sections: vec![OutlineSection {
                name: "Intro".to_string(),
                instructions: "set the scene".to_string(),
            }],
            recommended_vocabulary: vec![],
        }
    }

    fn vocabulary(words: &[&str]) -> BTreeSet<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    fn prompts() -> Arc<HashMap<String, String>> {
        let mut map = HashMap::new();
        map.insert(
            "draft_initial".to_string(),
            "Write about {topic} at {cefr_level} ({ease_min}-{ease_max}), \
             {target_word_count} words. Outline: {outline} Vocabulary: {vocabulary}. \
             {sentence_guidance}"
                .to_string(),
        );
        map.insert(
            "draft_revision".to_string(),
            "Revise the {cefr_level} passage about {topic}. {directive}\n{errors}".to_string(),
        );
        Arc::new(map)
    }

    fn draft_json() -> String {
        r#"{"title": "Our Weather &amp; Us", "passage": "Rain falls more often now."}"#.to_string()
    }

    fn author_with(client: MockCompletionClient) -> LlmAuthor {
        LlmAuthor::new(Arc::new(client), BackoffPolicy::default(), prompts())
    }

    #[tokio::test]
    async fn first_attempt_prompt_carries_outline_guidance_and_band() {
        let mut client = MockCompletionClient::new();
        client
            .expect_complete()
            .withf(|prompt: &str| {
                prompt.contains("Climate Change")
                    && prompt.contains("50-65")
                    && prompt.contains("150 words")
                    && prompt.contains("Intro - set the scene")
                    && prompt.contains("12-15 words")
            })
            .returning(|_| Ok(draft_json()));

        let author = author_with(client);
        let draft = author
            .write(&outline(), &vocabulary(&["climate"]), &request(), None)
            .await
            .unwrap();
        assert_eq!(draft.title, "Our Weather & Us");
    }

    #[tokio::test]
    async fn prompt_vocabulary_is_capped_at_ten_words() {
        let words: Vec<String> = (0..15).map(|n| format!("word{n:02}")).collect();
        let refs: Vec<&str> = words.iter().map(|s| s.as_str()).collect();
        let vocab = vocabulary(&refs);

        let mut client = MockCompletionClient::new();
        client
            .expect_complete()
            .withf(|prompt: &str| prompt.contains("word09") && !prompt.contains("word10"))
            .returning(|_| Ok(draft_json()));

        let author = author_with(client);
        author
            .write(&outline(), &vocab, &request(), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn low_flesch_revision_instructs_simplification() {
        let mut client = MockCompletionClient::new();
        client
            .expect_complete()
            .withf(|prompt: &str| prompt.contains("Simplify") && prompt.contains("- too hard"))
            .returning(|_| Ok(draft_json()));

        let prior = PriorFailure {
            errors: vec!["too hard".to_string()],
            flesch_score: Some(30.0),
        };
        let author = author_with(client);
        author
            .write(&outline(), &vocabulary(&[]), &request(), Some(prior))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn high_flesch_revision_instructs_more_complexity() {
        let mut client = MockCompletionClient::new();
        client
            .expect_complete()
            .withf(|prompt: &str| prompt.contains("Increase complexity"))
            .returning(|_| Ok(draft_json()));

        let prior = PriorFailure {
            errors: vec!["too easy".to_string()],
            flesch_score: Some(90.0),
        };
        let author = author_with(client);
        author
            .write(&outline(), &vocabulary(&[]), &request(), Some(prior))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn in_band_flesch_revision_keeps_complexity_and_lists_errors_verbatim() {
        let mut client = MockCompletionClient::new();
        client
            .expect_complete()
            .withf(|prompt: &str| {
                prompt.contains("Keep the current level of complexity")
                    && prompt.contains("- Word count 90 is outside the allowed range")
                    && prompt.contains("- The word 'rain' is overused")
            })
            .returning(|_| Ok(draft_json()));

        let prior = PriorFailure {
            errors: vec![
                "Word count 90 is outside the allowed range 113-187 for a target of 150 words."
                    .to_string(),
                "The word 'rain' is overused: it appears 12 times, more than 8% of all words."
                    .to_string(),
            ],
            flesch_score: Some(58.0),
        };
        let author = author_with(client);
        author
            .write(&outline(), &vocabulary(&[]), &request(), Some(prior))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unparseable_draft_is_a_parse_failure() {
        let mut client = MockCompletionClient::new();
        client
            .expect_complete()
            .returning(|_| Ok("no json here".to_string()));

        let author = author_with(client);
        let err = author
            .write(&outline(), &vocabulary(&[]), &request(), None)
            .await
            .unwrap_err();
        assert!(err.is_parse_failure());
    }

    #[tokio::test]
    async fn completion_failure_is_not_a_parse_failure() {
        let mut client = MockCompletionClient::new();
        client
            .expect_complete()
            .returning(|_| Err(CompletionError::Other("boom".to_string())));

        let author = author_with(client);
        let err = author
            .write(&outline(), &vocabulary(&[]), &request(), None)
            .await
            .unwrap_err();
        assert!(!err.is_parse_failure());
    }
}
