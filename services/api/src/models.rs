//! API Models
//!
//! Request and response payloads for the HTTP surface, with `utoipa`
//! annotations for the generated OpenAPI documentation. Field names on the
//! generate-reading payload match the upstream Node service's wire format.

use bandforge_core::passage::{
    AttemptRecord, AuditReport, CefrLevel, FinalResult, GenerationRequest, GenerationStatus,
    Outline,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

fn default_word_count() -> usize {
    150
}

fn default_tone() -> String {
    "neutral".to_string()
}

fn default_max_retries() -> usize {
    3
}

fn default_cefr_level() -> CefrLevel {
    CefrLevel::B1
}

/// Body of `POST /api/agentic/generate-reading`.
#[derive(Deserialize, ToSchema)]
pub struct GenerateReadingPayload {
    #[schema(example = "Climate Change")]
    pub topic: String,
    #[serde(default = "default_cefr_level")]
    #[schema(value_type = String, example = "B1")]
    pub cefr_level: CefrLevel,
    #[serde(default = "default_word_count", rename = "wordCount")]
    #[schema(example = 150)]
    pub word_count: usize,
    #[serde(default = "default_tone")]
    pub tone: String,
    #[serde(default, rename = "topicHints")]
    pub topic_hints: Option<String>,
    #[serde(default, rename = "core_vocab")]
    pub core_vocab: Vec<String>,
    #[serde(default = "default_max_retries", rename = "maxRetries")]
    pub max_retries: usize,
}

impl From<GenerateReadingPayload> for GenerationRequest {
    fn from(payload: GenerateReadingPayload) -> Self {
        GenerationRequest {
            topic: payload.topic,
            cefr_level: payload.cefr_level,
            target_word_count: payload.word_count.max(1),
            tone: payload.tone,
            topic_hints: payload.topic_hints,
            core_vocabulary: payload.core_vocab,
            max_retries: payload.max_retries.max(1),
        }
    }
}

/// Response of `POST /api/agentic/generate-reading`.
///
/// `max_retries_reached` is still a 200: callers must inspect `status` and
/// the `warning` field to detect the degraded outcome.
#[derive(Serialize, ToSchema)]
pub struct GenerateReadingResponse {
    #[schema(value_type = String, example = "success")]
    pub status: GenerationStatus,
    pub title: String,
    pub passage: String,
    pub word_count: usize,
    #[schema(value_type = Object)]
    pub report: AuditReport,
    #[schema(value_type = Object)]
    pub outline: Outline,
    #[schema(value_type = Vec<Object>)]
    pub attempts: Vec<AttemptRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl From<FinalResult> for GenerateReadingResponse {
    fn from(result: FinalResult) -> Self {
        let warning = match result.status {
            GenerationStatus::Success => None,
            GenerationStatus::MaxRetriesReached => Some(format!(
                "The passage did not meet all quality checks after {} attempts; \
                 returning the last draft as best effort.",
                result.attempts.len()
            )),
        };
        GenerateReadingResponse {
            status: result.status,
            title: result.draft.title,
            passage: result.draft.passage,
            word_count: result.report.word_count,
            report: result.report,
            outline: result.outline,
            attempts: result.attempts,
            warning,
        }
    }
}

/// Body of `POST /api/writing/check`.
#[derive(Deserialize, ToSchema)]
pub struct WritingCheckPayload {
    pub text: String,
    #[serde(default = "default_topic")]
    #[schema(example = "General Writing")]
    pub topic: String,
}

fn default_topic() -> String {
    "General Writing".to_string()
}

/// Response of `POST /api/speaking/conversation`.
#[derive(Serialize, ToSchema)]
pub struct ConversationResponse {
    pub user_transcript: String,
    pub ai_response_text: String,
    /// URL under `/static/` of the synthesized examiner audio.
    pub ai_audio_url: String,
    pub correction: String,
}

/// Response of `GET /health`.
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub grammar_available: bool,
    pub transcription_available: bool,
    pub synthesis_available: bool,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}
