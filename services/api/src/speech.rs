//! Speech Services
//!
//! Transcription and text-to-speech wrappers around the OpenAI audio
//! endpoints. Both sit behind traits so handlers can be tested with mocks
//! and so the server can run without speech support when no OpenAI key is
//! configured.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{CreateSpeechRequestArgs, CreateTranscriptionRequestArgs, SpeechModel, Voice};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("Transcription failed: {0}")]
    Transcription(String),
    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),
}

/// Converts recorded speech into text.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscriptionService: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> Result<String, SpeechError>;
}

/// Renders text to an audio artifact on disk, returning the file name.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SynthesisService: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<String, SpeechError>;
}

/// Whisper-backed transcription via the OpenAI audio API.
pub struct WhisperClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl WhisperClient {
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl TranscriptionService for WhisperClient {
    async fn transcribe(&self, audio_path: &Path) -> Result<String, SpeechError> {
        let request = CreateTranscriptionRequestArgs::default()
            .file(audio_path.to_string_lossy().to_string())
            .model(&self.model)
            .build()
            .map_err(|e| SpeechError::Transcription(e.to_string()))?;

        let response = self
            .client
            .audio()
            .transcribe(request)
            .await
            .map_err(|e| SpeechError::Transcription(e.to_string()))?;

        Ok(response.text)
    }
}

/// OpenAI text-to-speech writing MP3 artifacts into a static directory.
pub struct TtsClient {
    client: Client<OpenAIConfig>,
    model: SpeechModel,
    voice: Voice,
    output_dir: PathBuf,
}

impl TtsClient {
    pub fn new(client: Client<OpenAIConfig>, model: &str, voice: &str, output_dir: PathBuf) -> Self {
        Self {
            client,
            model: parse_model(model),
            voice: parse_voice(voice),
            output_dir,
        }
    }
}

fn parse_model(name: &str) -> SpeechModel {
    match name {
        "tts-1" => SpeechModel::Tts1,
        "tts-1-hd" => SpeechModel::Tts1Hd,
        other => SpeechModel::Other(other.to_string()),
    }
}

/// Maps a configured voice name onto the API's voice set, falling back to
/// `alloy` for unknown names.
fn parse_voice(name: &str) -> Voice {
    match name.to_lowercase().as_str() {
        "echo" => Voice::Echo,
        "fable" => Voice::Fable,
        "onyx" => Voice::Onyx,
        "nova" => Voice::Nova,
        "shimmer" => Voice::Shimmer,
        _ => Voice::Alloy,
    }
}

#[async_trait]
impl SynthesisService for TtsClient {
    async fn synthesize(&self, text: &str) -> Result<String, SpeechError> {
        let request = CreateSpeechRequestArgs::default()
            .input(text)
            .model(self.model.clone())
            .voice(self.voice.clone())
            .build()
            .map_err(|e| SpeechError::Synthesis(e.to_string()))?;

        let response = self
            .client
            .audio()
            .speech(request)
            .await
            .map_err(|e| SpeechError::Synthesis(e.to_string()))?;

        let file_name = format!("{}.mp3", Uuid::new_v4());
        let output_path = self.output_dir.join(&file_name);
        response
            .save(&output_path)
            .await
            .map_err(|e| SpeechError::Synthesis(e.to_string()))?;

        Ok(file_name)
    }
}
