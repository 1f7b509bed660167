//! The architect: turns a generation request into a structured content plan.
//!
//! One completion call per request, wrapped in the backoff adapter. Planner
//! failure is fatal to the whole request, so the error keeps the quota/other
//! distinction for the caller to map onto HTTP status codes.

use crate::backoff::{BackoffPolicy, call_with_backoff};
use crate::llm::{CompletionClient, CompletionError, extract_json};
use crate::passage::{GenerationRequest, Outline};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, request: &GenerationRequest) -> Result<Outline, CompletionError>;
}

/// Planner backed by the hosted completion service and a prompt template.
pub struct LlmPlanner {
    client: Arc<dyn CompletionClient>,
    backoff: BackoffPolicy,
    prompts: Arc<HashMap<String, String>>,
}

impl LlmPlanner {
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

    fn build_prompt(&self, request: &GenerationRequest) -> Result<String, CompletionError> {
        let template = self.prompts.get("outline").ok_or_else(|| {
            CompletionError::Other("missing prompt template: 'outline'".to_string())
        })?;
        Ok(template
            .replace("{topic}", &request.topic)
            .replace("{cefr_level}", &request.cefr_level.to_string())
            .replace("{target_word_count}", &request.target_word_count.to_string())
            .replace("{tone}", &request.tone)
            .replace(
                "{topic_hints}",
                request.topic_hints.as_deref().unwrap_or("none"),
            ))
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn plan(&self, request: &GenerationRequest) -> Result<Outline, CompletionError> {
        let prompt = self.build_prompt(request)?;

        let client = self.client.clone();
        let raw = call_with_backoff(&self.backoff, || {
            let client = client.clone();
            let prompt = prompt.clone();
            async move { client.complete(&prompt).await }
        })
        .await?;

        let mut outline: Outline = serde_json::from_str(extract_json(&raw)).map_err(|e| {
            CompletionError::Other(format!("outline response was not valid JSON: {e}"))
        })?;

        // Titles come back with HTML entities from some providers.
        outline.title_suggestion =
            html_escape::decode_html_entities(&outline.title_suggestion).into_owned();

        info!(
            topic = %request.topic,
            sections = outline.sections.len(),
            vocabulary = outline.recommended_vocabulary.len(),
            "outline planned"
        );
        Ok(outline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockCompletionClient;
    use crate::passage::CefrLevel;

    fn request() -> GenerationRequest {
        GenerationRequest {
            topic: "Climate Change".to_string(),
            cefr_level: CefrLevel::B1,
            target_word_count: 150,
            tone: "neutral".to_string(),
            topic_hints: Some("focus on daily life".to_string()),
            core_vocabulary: vec!["emission".to_string()],
            max_retries: 3,
        }
    }

    fn prompts() -> Arc<HashMap<String, String>> {
        let mut map = HashMap::new();
        map.insert(
            "outline".to_string(),
            "Plan a {cefr_level} passage about {topic}, {target_word_count} words, \
             tone {tone}. Hints: {topic_hints}."
                .to_string(),
        );
        Arc::new(map)
    }

    fn outline_json() -> String {
        r#"{
            "title_suggestion": "Weather &amp; Change",
            "learning_objectives": ["understand causes"],
            "sections": [{"name": "Intro", "instructions": "set the scene"}],
            "recommended_vocabulary": ["climate", "sustainable"]
        }"#
        .to_string()
    }

    #[tokio::test]
    async fn plan_parses_fenced_json_and_decodes_entities() {
        let mut client = MockCompletionClient::new();
        client
            .expect_complete()
            .withf(|prompt: &str| {
                prompt.contains("Climate Change")
                    && prompt.contains("B1")
                    && prompt.contains("150")
                    && prompt.contains("focus on daily life")
            })
            .returning(|_| Ok(format!("```json\n{}\n```", outline_json())));

        let planner = LlmPlanner::new(Arc::new(client), BackoffPolicy::default(), prompts());
        let outline = planner.plan(&request()).await.unwrap();

        assert_eq!(outline.title_suggestion, "Weather & Change");
        assert_eq!(outline.sections.len(), 1);
        assert_eq!(outline.recommended_vocabulary, vec!["climate", "sustainable"]);
    }

    #[tokio::test]
    async fn plan_surfaces_quota_exhaustion_distinctly() {
        let mut client = MockCompletionClient::new();
        client
            .expect_complete()
            .returning(|_| Err(CompletionError::RateLimited("quota exceeded".to_string())));

        let planner = LlmPlanner::new(
            Arc::new(client),
            BackoffPolicy {
                max_attempts: 1,
                ..BackoffPolicy::default()
            },
            prompts(),
        );
        let err = planner.plan(&request()).await.unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn plan_fails_on_unparseable_json() {
        let mut client = MockCompletionClient::new();
        client
            .expect_complete()
            .returning(|_| Ok("this is not json".to_string()));

        let planner = LlmPlanner::new(Arc::new(client), BackoffPolicy::default(), prompts());
        let err = planner.plan(&request()).await.unwrap_err();
        assert!(!err.is_rate_limited());
        assert!(err.to_string().contains("not valid JSON"));
    }

    #[tokio::test]
    async fn plan_fails_when_template_is_missing() {
        let client = MockCompletionClient::new();
        let planner = LlmPlanner::new(
            Arc::new(client),
            BackoffPolicy::default(),
            Arc::new(HashMap::new()),
        );
        let err = planner.plan(&request()).await.unwrap_err();
        assert!(err.to_string().contains("outline"));
    }
}
