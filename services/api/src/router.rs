//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, the static audio artifacts, and the OpenAPI
//! documentation.

use crate::{
    handlers,
    models::{
        ConversationResponse, ErrorResponse, GenerateReadingPayload, GenerateReadingResponse,
        HealthResponse, WritingCheckPayload,
    },
    state::AppState,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::services::ServeDir;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::generate_reading,
        handlers::writing_check,
        handlers::speaking_check,
        handlers::conversation,
        handlers::health,
    ),
    components(
        schemas(
            GenerateReadingPayload,
            GenerateReadingResponse,
            WritingCheckPayload,
            ConversationResponse,
            HealthResponse,
            ErrorResponse
        )
    ),
    tags(
        (name = "Bandforge API", description = "Agentic passage generation and IELTS-style feedback")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let static_dir = app_state.config.static_dir.clone();

    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route(
            "/api/agentic/generate-reading",
            post(handlers::generate_reading),
        )
        .route("/api/writing/check", post(handlers::writing_check))
        .route("/api/speaking/check", post(handlers::speaking_check))
        .route("/api/speaking/conversation", post(handlers::conversation))
        .route("/health", get(handlers::health))
        // Apply the state ONLY to this group of routes.
        .with_state(app_state);

    // Merge the stateful routes with the stateless ones: synthesized audio
    // under /static and the Swagger UI.
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest_service("/static", ServeDir::new(static_dir))
        .merge(api_router)
}
