//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        analysis_llm::OpenAiAnalysisAdapter, chat_llm::OpenAiChatAdapter,
        history::FileHistoryStore, specialists_llm::OpenAiSpecialistAdapter,
    },
    config::Config,
    error::ApiError,
    web::{
        create_session_handler, current_session_handler, delete_session_handler,
        find_specialists_handler, list_sessions_handler, rest::ApiDoc, select_session_handler,
        send_message_handler,
        state::{AppState, ConsultationState},
    },
};
use async_openai::{config::OpenAIConfig, Client};
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::{delete, get, post},
    Router,
};
use skin_consult_core::{controller::ConversationController, store::SessionStore};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use tower_http::cors::CorsLayer;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Restore the Session History ---
    let history = Arc::new(FileHistoryStore::new(config.history_path.clone()));
    let store = SessionStore::load(history).await?;
    info!(
        "Session history restored from {} ({} sessions)",
        config.history_path.display(),
        store.sessions().len()
    );

    // --- 3. Initialize Service Adapters ---
    let openai_config = OpenAIConfig::new().with_api_key(
        config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| ApiError::Internal("OPENAI_API_KEY is required".to_string()))?,
    );
    let openai_client = Client::with_config(openai_config);

    let analysis_adapter = Arc::new(OpenAiAnalysisAdapter::new(
        openai_client.clone(),
        config.analysis_model.clone(),
    ));
    let chat_adapter = Arc::new(OpenAiChatAdapter::new(
        openai_client.clone(),
        config.chat_model.clone(),
    ));
    let specialist_adapter = Arc::new(OpenAiSpecialistAdapter::new(
        openai_client.clone(),
        config.specialist_model.clone(),
    ));

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        consultation: Arc::new(Mutex::new(ConsultationState {
            store,
            controller: ConversationController::new(),
        })),
        analysis_adapter,
        chat_adapter,
        specialist_adapter,
        config: config.clone(),
    });

    // --- 5. CORS for the Browser Client ---
    let cors = CorsLayer::new()
        .allow_origin(
            config
                .allowed_origin
                .parse::<HeaderValue>()
                .map_err(|e| ApiError::Internal(format!("Invalid ALLOWED_ORIGIN: {}", e)))?,
        )
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    // --- 6. Create the Web Router ---
    let api_router = Router::new()
        .route(
            "/sessions",
            get(list_sessions_handler).post(create_session_handler),
        )
        .route("/sessions/current", get(current_session_handler))
        .route("/sessions/{id}", delete(delete_session_handler))
        .route("/sessions/{id}/select", post(select_session_handler))
        .route("/sessions/{id}/messages", post(send_message_handler))
        .route("/specialists", get(find_specialists_handler))
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
