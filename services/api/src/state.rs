//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources like the passage generator and service clients.

use crate::config::Config;
use crate::speech::{SynthesisService, TranscriptionService};
use bandforge_core::{
    controller::PassageGenerator, grammar::GrammarService, llm::CompletionClient,
};
use std::collections::HashMap;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
/// All fields are public to be accessible from other modules.
#[derive(Clone)]
pub struct AppState {
    pub generator: Arc<PassageGenerator>,
    pub completion: Arc<dyn CompletionClient>,
    /// Absent when LanguageTool is disabled by configuration.
    pub grammar: Option<Arc<dyn GrammarService>>,
    /// Absent when no OpenAI key is configured; speaking endpoints 503.
    pub transcriber: Option<Arc<dyn TranscriptionService>>,
    pub synthesizer: Option<Arc<dyn SynthesisService>>,
    pub prompts: Arc<HashMap<String, String>>,
    pub config: Arc<Config>,
}
