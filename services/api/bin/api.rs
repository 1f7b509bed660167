//! Main Entrypoint for the Bandforge API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing shared services (completion, grammar, speech clients).
//! 3. Wiring the planner, author, and auditor into the passage generator.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::Client;
use async_openai::config::OpenAIConfig;
use bandforge_api::{
    config::{Config, Provider},
    router::create_router,
    speech::{SynthesisService, TranscriptionService, TtsClient, WhisperClient},
    state::AppState,
};
use bandforge_core::{
    audit::TextAuditor,
    author::LlmAuthor,
    backoff::BackoffPolicy,
    controller::{GeneratorConfig, PassageGenerator},
    grammar::{GrammarService, LanguageToolClient},
    llm::{CompletionClient, OpenAICompatibleClient},
    planner::LlmPlanner,
};
use std::{collections::HashMap, fs, net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// A helper function to load prompts from a directory.
fn load_prompts(prompts_path: &std::path::Path) -> anyhow::Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    for entry in std::fs::read_dir(prompts_path)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let content = fs::read_to_string(&path)?;
            prompts.insert(prompt_key, content);
        }
    }
    Ok(prompts)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Shared Services ---
    let prompts = Arc::new(load_prompts(&config.prompts_path)?);
    for required in ["outline", "draft_initial", "draft_revision"] {
        anyhow::ensure!(
            prompts.contains_key(required),
            "{required}.md not found in prompts directory"
        );
    }

    fs::create_dir_all(&config.static_dir)
        .context("Failed to create the static audio directory")?;

    let completion: Arc<dyn CompletionClient> = match &config.provider {
        Provider::OpenAI => {
            info!("Using OpenAI provider.");
            let api_key = config.openai_api_key.as_ref().unwrap();
            let openai_config = OpenAIConfig::new()
                .with_api_key(api_key)
                .with_api_base("https://api.openai.com/v1/");
            Arc::new(OpenAICompatibleClient::new(
                openai_config,
                config.chat_model.clone(),
            ))
        }
        Provider::Gemini => {
            info!("Using Gemini provider.");
            let api_key = config.gemini_api_key.as_ref().unwrap();
            let openai_config = OpenAIConfig::new()
                .with_api_key(api_key)
                .with_api_base("https://generativelanguage.googleapis.com/v1beta/openai");
            Arc::new(OpenAICompatibleClient::new(
                openai_config,
                config.chat_model.clone(),
            ))
        }
    };

    let grammar: Option<Arc<dyn GrammarService>> = config
        .languagetool_url
        .as_ref()
        .map(|url| Arc::new(LanguageToolClient::new(url.clone())) as Arc<dyn GrammarService>);
    if grammar.is_none() {
        info!("LanguageTool is disabled; grammar checks will be skipped.");
    }

    // Speech always goes through the OpenAI audio endpoints, so it needs an
    // OpenAI key even when Gemini handles the text completions.
    let (transcriber, synthesizer): (
        Option<Arc<dyn TranscriptionService>>,
        Option<Arc<dyn SynthesisService>>,
    ) = match &config.openai_api_key {
        Some(api_key) => {
            let audio_client =
                Client::with_config(OpenAIConfig::new().with_api_key(api_key.clone()));
            (
                Some(Arc::new(WhisperClient::new(
                    audio_client.clone(),
                    config.transcription_model.clone(),
                ))),
                Some(Arc::new(TtsClient::new(
                    audio_client,
                    &config.tts_model,
                    &config.tts_voice,
                    config.static_dir.clone(),
                ))),
            )
        }
        None => {
            info!("No OPENAI_API_KEY set; speaking endpoints will be unavailable.");
            (None, None)
        }
    };

    // --- 4. Wire the Passage Generator ---
    let backoff = BackoffPolicy::default();
    let planner = Arc::new(LlmPlanner::new(
        Arc::clone(&completion),
        backoff.clone(),
        Arc::clone(&prompts),
    ));
    let author = Arc::new(LlmAuthor::new(
        Arc::clone(&completion),
        backoff,
        Arc::clone(&prompts),
    ));
    let auditor = Arc::new(TextAuditor::new(grammar.clone()));
    let generator = Arc::new(PassageGenerator::new(
        planner,
        author,
        auditor,
        GeneratorConfig::default(),
    ));

    let app_state = Arc::new(AppState {
        generator,
        completion,
        grammar,
        transcriber,
        synthesizer,
        prompts,
        config: Arc::new(config.clone()),
    });

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        provider = ?config.provider,
        model = %config.chat_model,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
