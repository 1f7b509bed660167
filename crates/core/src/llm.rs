//! Completion-service client.
//!
//! `CompletionClient` is the single seam between the pipeline and the hosted
//! model: it takes a prompt (optionally with attached audio) and returns the
//! raw completion text. Quota/rate exhaustion is surfaced as a distinct error
//! variant so callers can retry or map it to HTTP 429 instead of treating it
//! as a bug.

use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessageContentPartAudioArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionRequestUserMessageContent, CreateChatCompletionRequestArgs, InputAudio,
        InputAudioFormat,
    },
};
use async_trait::async_trait;
use base64::Engine;
use std::path::Path;

#[derive(Debug, Clone, thiserror::Error)]
pub enum CompletionError {
    /// The service refused the call because of usage limits. Retryable.
    #[error("completion service quota or rate limit exhausted: {0}")]
    RateLimited(String),
    /// Any other failure: transport, bad request, malformed response.
    #[error("completion service call failed: {0}")]
    Other(String),
}

impl CompletionError {
    /// Classifies a raw error message into the quota/other taxonomy.
    pub fn from_message(message: String) -> Self {
        if is_quota_error(&message) {
            CompletionError::RateLimited(message)
        } else {
            CompletionError::Other(message)
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, CompletionError::RateLimited(_))
    }
}

/// Decides whether an error message describes quota/rate exhaustion.
///
/// Substring matching against provider error text is fragile, so the
/// strategy lives in exactly one place. Every retry decision goes through
/// this function.
pub fn is_quota_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("429")
        || lower.contains("quota")
        || lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("resource_exhausted")
        || lower.contains("too many requests")
}

/// Strips a markdown code fence from a completion response, if present.
///
/// Models regularly wrap requested JSON in ```json fences even when told
/// not to; callers strip before parsing.
pub fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix("```").unwrap_or(trimmed);
    trimmed.trim()
}

/// A generic client for the hosted completion service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Sends a prompt and returns the raw completion text.
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;

    /// Sends a prompt together with an attached audio file, for feedback
    /// paths that need the model to hear the recording.
    async fn complete_with_audio(
        &self,
        prompt: &str,
        audio_path: &Path,
    ) -> Result<String, CompletionError>;
}

/// `CompletionClient` implementation for any OpenAI-compatible API,
/// including Gemini's OpenAI-compatibility endpoint.
pub struct OpenAICompatibleClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAICompatibleClient {
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
        }
    }

    fn first_choice_text(
        response: async_openai::types::CreateChatCompletionResponse,
    ) -> Result<String, CompletionError> {
        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| {
                CompletionError::Other("completion response had no text content".to_string())
            })
    }
}

#[async_trait]
impl CompletionClient for OpenAICompatibleClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![
                ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt)
                    .build()
                    .map_err(|e| CompletionError::Other(e.to_string()))?
                    .into(),
            ])
            .build()
            .map_err(|e| CompletionError::Other(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| CompletionError::from_message(e.to_string()))?;

        Self::first_choice_text(response)
    }

    async fn complete_with_audio(
        &self,
        prompt: &str,
        audio_path: &Path,
    ) -> Result<String, CompletionError> {
        let bytes = tokio::fs::read(audio_path)
            .await
            .map_err(|e| CompletionError::Other(format!("could not read audio file: {e}")))?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);

        let format = match audio_path.extension().and_then(|ext| ext.to_str()) {
            Some("wav") => InputAudioFormat::Wav,
            _ => InputAudioFormat::Mp3,
        };

        let content = ChatCompletionRequestUserMessageContent::Array(vec![
            ChatCompletionRequestMessageContentPartTextArgs::default()
                .text(prompt)
                .build()
                .map_err(|e| CompletionError::Other(e.to_string()))?
                .into(),
            ChatCompletionRequestMessageContentPartAudioArgs::default()
                .input_audio(InputAudio {
                    data: encoded,
                    format,
                })
                .build()
                .map_err(|e| CompletionError::Other(e.to_string()))?
                .into(),
        ]);

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![
                ChatCompletionRequestUserMessageArgs::default()
                    .content(content)
                    .build()
                    .map_err(|e| CompletionError::Other(e.to_string()))?
                    .into(),
            ])
            .build()
            .map_err(|e| CompletionError::Other(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| CompletionError::from_message(e.to_string()))?;

        Self::first_choice_text(response)
    }
}
