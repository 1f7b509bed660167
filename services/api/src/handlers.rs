//! Axum Handlers for the REST API
//!
//! This module contains the logic for the passage-generation, writing-check,
//! and speaking endpoints. It uses `utoipa` doc comments to generate OpenAPI
//! documentation.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use bandforge_core::backoff::{BackoffPolicy, call_with_backoff};
use bandforge_core::controller::GenerateError;
use bandforge_core::grammar::{GrammarMatch, is_counted_category};
use bandforge_core::llm::{CompletionError, extract_json};
use bandforge_core::readability::analyze_text;
use serde_json::Value;
use std::io::Write;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    models::{
        ConversationResponse, ErrorResponse, GenerateReadingPayload, GenerateReadingResponse,
        HealthResponse, WritingCheckPayload,
    },
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    TooManyRequests(String),
    ServiceUnavailable(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::TooManyRequests(message) => {
                (StatusCode::TOO_MANY_REQUESTS, Json(ErrorResponse { message })).into_response()
            }
            ApiError::ServiceUnavailable(message) => {
                (StatusCode::SERVICE_UNAVAILABLE, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

fn completion_error(err: CompletionError) -> ApiError {
    match err {
        CompletionError::RateLimited(message) => ApiError::TooManyRequests(message),
        CompletionError::Other(message) => {
            ApiError::InternalServerError(anyhow::anyhow!(message))
        }
    }
}

fn template<'a>(state: &'a AppState, name: &str) -> Result<&'a str, ApiError> {
    state
        .prompts
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| {
            ApiError::InternalServerError(anyhow::anyhow!("prompt template '{}' not loaded", name))
        })
}

/// Summarizes grammar matches for the feedback prompt: the count against
/// the strict categories and a short detail list.
fn grammar_evidence(matches: &[GrammarMatch]) -> (usize, String) {
    let counted: Vec<&GrammarMatch> = matches
        .iter()
        .filter(|m| is_counted_category(&m.category))
        .collect();
    let details = counted
        .iter()
        .take(5)
        .map(|m| format!("{} (near \"{}\")", m.message, m.context))
        .collect::<Vec<_>>()
        .join("; ");
    (counted.len(), details)
}

/// Generate a reading passage through the agentic planning/drafting/auditing loop.
#[utoipa::path(
    post,
    path = "/api/agentic/generate-reading",
    request_body = GenerateReadingPayload,
    responses(
        (status = 200, description = "Passage generated (inspect status for best-effort results)", body = GenerateReadingResponse),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 429, description = "Completion quota exhausted", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn generate_reading(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<GenerateReadingPayload>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.topic.trim().is_empty() {
        return Err(ApiError::BadRequest("Topic is required".to_string()));
    }

    let request = payload.into();
    info!("Starting agentic generation");

    let result = state.generator.generate(&request).await.map_err(|err| match err {
        GenerateError::QuotaExhausted => ApiError::TooManyRequests(
            "The completion service quota is exhausted; try again later.".to_string(),
        ),
        other => ApiError::InternalServerError(anyhow::anyhow!(other)),
    })?;

    Ok(Json(GenerateReadingResponse::from(result)))
}

/// Evaluate a student essay with local analysis evidence plus an LLM examiner.
#[utoipa::path(
    post,
    path = "/api/writing/check",
    request_body = WritingCheckPayload,
    responses(
        (status = 200, description = "Structured writing feedback"),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 429, description = "Completion quota exhausted", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn writing_check(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<WritingCheckPayload>,
) -> Result<Json<Value>, ApiError> {
    if payload.text.trim().is_empty() {
        return Err(ApiError::BadRequest("Text is required".to_string()));
    }

    let analysis = analyze_text(&payload.text);

    // A failed grammar call degrades to "no evidence", not a failed request.
    let (grammar_count, grammar_details) = match &state.grammar {
        Some(grammar) => match grammar.check(&payload.text).await {
            Ok(matches) => grammar_evidence(&matches),
            Err(err) => {
                warn!("Grammar check failed, continuing without it: {err:#}");
                (0, "unavailable".to_string())
            }
        },
        None => (0, "unavailable".to_string()),
    };

    let starters = if analysis.repeated_starters.is_empty() {
        "none".to_string()
    } else {
        analysis
            .repeated_starters
            .iter()
            .map(|(word, count)| format!("{word} x{count}"))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let prompt = template(&state, "writing_feedback")?
        .replace("{topic}", &payload.topic)
        .replace("{text}", &payload.text)
        .replace("{grammar_error_count}", &grammar_count.to_string())
        .replace("{grammar_details}", &grammar_details)
        .replace(
            "{reading_ease}",
            &analysis
                .reading_ease
                .map(|score| format!("{score:.1}"))
                .unwrap_or_else(|| "n/a".to_string()),
        )
        .replace("{repeated_starters}", &starters);

    let policy = BackoffPolicy::default();
    let completion = Arc::clone(&state.completion);
    let raw = call_with_backoff(&policy, || {
        let completion = Arc::clone(&completion);
        let prompt = prompt.clone();
        async move { completion.complete(&prompt).await }
    })
    .await
    .map_err(completion_error)?;

    let feedback: Value = serde_json::from_str(extract_json(&raw))
        .map_err(|e| ApiError::InternalServerError(anyhow::anyhow!("unparseable feedback: {e}")))?;

    Ok(Json(feedback))
}

/// Pulls the audio part out of a multipart upload into a temp file the
/// OpenAI client can read. The suffix keeps the original extension so the
/// audio format survives.
async fn save_audio_part(multipart: &mut Multipart) -> Result<tempfile::NamedTempFile, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        if field.name() != Some("audio") {
            continue;
        }
        let suffix = field
            .file_name()
            .and_then(|name| name.rsplit_once('.').map(|(_, ext)| format!(".{ext}")))
            .unwrap_or_else(|| ".wav".to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read audio upload: {e}")))?;
        if bytes.is_empty() {
            return Err(ApiError::BadRequest("Audio upload is empty".to_string()));
        }
        let mut file = tempfile::Builder::new().suffix(&suffix).tempfile()?;
        file.write_all(&bytes)?;
        file.flush()?;
        return Ok(file);
    }
    Err(ApiError::BadRequest(
        "Multipart field 'audio' is required".to_string(),
    ))
}

/// Score a spoken answer: transcribe it, then let the examiner model judge
/// both the transcript and the raw audio.
#[utoipa::path(
    post,
    path = "/api/speaking/check",
    responses(
        (status = 200, description = "Structured speaking feedback"),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 429, description = "Completion quota exhausted", body = ErrorResponse),
        (status = 503, description = "Speech services are not configured", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn speaking_check(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let transcriber = state.transcriber.as_ref().ok_or_else(|| {
        ApiError::ServiceUnavailable("Speech transcription is not configured".to_string())
    })?;

    let audio = save_audio_part(&mut multipart).await?;

    let transcript = transcriber
        .transcribe(audio.path())
        .await
        .map_err(|e| ApiError::InternalServerError(e.into()))?;
    info!("Transcribed {} characters of speech", transcript.len());

    let prompt = template(&state, "speaking_feedback")?.replace("{transcript}", &transcript);

    let raw = state
        .completion
        .complete_with_audio(&prompt, audio.path())
        .await
        .map_err(completion_error)?;

    let feedback: Value = serde_json::from_str(extract_json(&raw))
        .map_err(|e| ApiError::InternalServerError(anyhow::anyhow!("unparseable feedback: {e}")))?;

    Ok(Json(feedback))
}

/// One turn of a mock speaking interview: transcribe the student, generate
/// the examiner's reply, and synthesize it to audio.
#[utoipa::path(
    post,
    path = "/api/speaking/conversation",
    responses(
        (status = 200, description = "Examiner turn", body = ConversationResponse),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 429, description = "Completion quota exhausted", body = ErrorResponse),
        (status = 503, description = "Speech services are not configured", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn conversation(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<ConversationResponse>, ApiError> {
    let transcriber = state.transcriber.as_ref().ok_or_else(|| {
        ApiError::ServiceUnavailable("Speech transcription is not configured".to_string())
    })?;
    let synthesizer = state.synthesizer.as_ref().ok_or_else(|| {
        ApiError::ServiceUnavailable("Speech synthesis is not configured".to_string())
    })?;

    let mut history = String::new();
    let mut audio: Option<tempfile::NamedTempFile> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        match field.name() {
            Some("history") => {
                history = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Unreadable history: {e}")))?;
            }
            Some("audio") => {
                let suffix = field
                    .file_name()
                    .and_then(|name| name.rsplit_once('.').map(|(_, ext)| format!(".{ext}")))
                    .unwrap_or_else(|| ".wav".to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read audio upload: {e}")))?;
                if bytes.is_empty() {
                    return Err(ApiError::BadRequest("Audio upload is empty".to_string()));
                }
                let mut file = tempfile::Builder::new().suffix(&suffix).tempfile()?;
                file.write_all(&bytes)?;
                file.flush()?;
                audio = Some(file);
            }
            _ => {}
        }
    }
    let audio = audio.ok_or_else(|| {
        ApiError::BadRequest("Multipart field 'audio' is required".to_string())
    })?;

    let user_transcript = transcriber
        .transcribe(audio.path())
        .await
        .map_err(|e| ApiError::InternalServerError(e.into()))?;

    let prompt = template(&state, "conversation")?
        .replace("{history}", if history.is_empty() { "(start of interview)" } else { &history })
        .replace("{user_text}", &user_transcript);

    let raw = state
        .completion
        .complete(&prompt)
        .await
        .map_err(completion_error)?;

    let turn: Value = serde_json::from_str(extract_json(&raw)).map_err(|e| {
        ApiError::InternalServerError(anyhow::anyhow!("unparseable examiner turn: {e}"))
    })?;
    let ai_response_text = turn
        .get("examiner_response_text")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ApiError::InternalServerError(anyhow::anyhow!(
                "examiner turn is missing 'examiner_response_text'"
            ))
        })?
        .to_string();
    let correction = turn
        .get("correction_tip")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let file_name = synthesizer
        .synthesize(&ai_response_text)
        .await
        .map_err(|e| ApiError::InternalServerError(e.into()))?;

    Ok(Json(ConversationResponse {
        user_transcript,
        ai_response_text,
        ai_audio_url: format!("/static/{file_name}"),
        correction,
    }))
}

/// Service liveness and which optional backends are wired up.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service health", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        grammar_available: state.grammar.is_some(),
        transcription_available: state.transcriber.is_some(),
        synthesis_available: state.synthesizer.is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grammar_match(category: &str, message: &str) -> GrammarMatch {
        GrammarMatch {
            category: category.to_string(),
            message: message.to_string(),
            context: "he go to school".to_string(),
            replacements: vec!["goes".to_string()],
        }
    }

    #[test]
    fn grammar_evidence_counts_only_strict_categories() {
        let matches = vec![
            grammar_match("GRAMMAR", "Subject-verb agreement"),
            grammar_match("STYLE", "Wordy phrase"),
            grammar_match("TYPOS", "Possible spelling mistake"),
        ];
        let (count, details) = grammar_evidence(&matches);
        assert_eq!(count, 2);
        assert!(details.contains("Subject-verb agreement"));
        assert!(!details.contains("Wordy phrase"));
    }

    #[test]
    fn grammar_evidence_caps_the_detail_list() {
        let matches: Vec<GrammarMatch> = (0..8)
            .map(|i| grammar_match("GRAMMAR", &format!("error {i}")))
            .collect();
        let (count, details) = grammar_evidence(&matches);
        assert_eq!(count, 8);
        assert!(details.contains("error 4"));
        assert!(!details.contains("error 5"));
    }

    #[test]
    fn grammar_evidence_is_empty_for_no_matches() {
        let (count, details) = grammar_evidence(&[]);
        assert_eq!(count, 0);
        assert!(details.is_empty());
    }
}
