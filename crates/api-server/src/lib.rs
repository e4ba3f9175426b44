use analysis_core::AnalysisError;
use analysis_orchestrator::AnalysisOrchestrator;
use axum::{
    error_handling::HandleErrorLayer,
    http::{HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    BoxError, Json, Router,
};
use llm_client::{CompletionProvider, FinancialAssistant, GroqClient, LlmError};
use polygon_client::PolygonClient;
use serde::Serialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod analysis_routes;
pub mod chat_routes;
pub mod config;
pub mod market_routes;
pub mod request_id;
pub mod sessions;
pub mod twilio;
pub mod whatsapp_routes;
pub mod ws_routes;

#[cfg(test)]
mod test_support;

pub use config::ServerConfig;
pub use sessions::SessionStore;
pub use ws_routes::MarketFeed;

/// Uniform JSON envelope for every REST response.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Handler error carrying the HTTP status it renders with.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn with_status(status: StatusCode, error: anyhow::Error) -> Self {
        Self { status, error }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, anyhow::anyhow!(message.into()))
    }

    pub fn llm_unavailable() -> Self {
        Self::with_status(
            StatusCode::SERVICE_UNAVAILABLE,
            anyhow::anyhow!("LLM features are disabled: GROQ_API_KEY is not configured"),
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

fn analysis_status(err: &AnalysisError) -> StatusCode {
    match err {
        AnalysisError::DataUnavailable(_) => StatusCode::NOT_FOUND,
        AnalysisError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        AnalysisError::Computation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AnalysisError::ExternalService(_) => StatusCode::BAD_GATEWAY,
    }
}

fn llm_status(err: &LlmError) -> StatusCode {
    match err {
        LlmError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
        LlmError::NoDocument => StatusCode::BAD_REQUEST,
        _ => StatusCode::BAD_GATEWAY,
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let error = err.into();
        let status = if let Some(e) = error.downcast_ref::<AnalysisError>() {
            analysis_status(e)
        } else if let Some(e) = error.downcast_ref::<LlmError>() {
            llm_status(e)
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self { status, error }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("Request failed ({}): {:#}", self.status, self.error);
        } else {
            tracing::debug!("Request rejected ({}): {:#}", self.status, self.error);
        }
        (self.status, Json(ApiResponse::error(format!("{:#}", self.error)))).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub orchestrator: Arc<AnalysisOrchestrator>,
    /// `None` when no LLM key is configured.
    pub assistant: Option<FinancialAssistant>,
    pub sessions: SessionStore,
    pub market_feed: MarketFeed,
    pub twilio: Option<twilio::TwilioClient>,
}

impl AppState {
    pub fn assistant(&self) -> Result<&FinancialAssistant, AppError> {
        self.assistant.as_ref().ok_or_else(AppError::llm_unavailable)
    }

    pub fn require_llm(&self) -> Result<(), AppError> {
        if self.orchestrator.has_llm() {
            Ok(())
        } else {
            Err(AppError::llm_unavailable())
        }
    }
}

async fn health_check(axum::extract::State(state): axum::extract::State<AppState>) -> Json<ApiResponse<serde_json::Value>> {
    Json(ApiResponse::success(serde_json::json!({
        "status": "ok",
        "llm_enabled": state.orchestrator.has_llm(),
        "whatsapp_enabled": state.twilio.is_some(),
        "sessions": state.sessions.len(),
        "overview_ready": state.market_feed.latest().is_some(),
    })))
}

async fn handle_timeout(err: BoxError) -> (StatusCode, Json<ApiResponse<()>>) {
    if err.is::<tower::timeout::error::Elapsed>() {
        (StatusCode::REQUEST_TIMEOUT, Json(ApiResponse::error("Request timed out")))
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(format!("Unhandled error: {}", err))),
        )
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE])
}

/// Every route with its middleware stack.
pub fn build_router(state: AppState) -> Router {
    let timeout = state.config.request_timeout;
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/health", get(health_check))
        .merge(chat_routes::chat_routes())
        .merge(analysis_routes::analysis_routes())
        .merge(market_routes::market_routes())
        .merge(whatsapp_routes::whatsapp_routes())
        .merge(ws_routes::ws_routes())
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_timeout))
                .timeout(timeout),
        )
        .layer(middleware::from_fn(request_id::request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(request_id::request_span::<axum::body::Body>))
        .layer(cors)
        .with_state(state)
}

/// Assemble state from config: market data client, optional LLM and
/// Twilio clients, orchestrator and the overview feed.
pub fn build_state(config: ServerConfig) -> anyhow::Result<AppState> {
    let polygon = Arc::new(PolygonClient::new(config.polygon_api_key.clone(), config.polygon_rate_limit));

    let llm: Option<Arc<dyn CompletionProvider>> = match GroqClient::from_config(&config.llm) {
        Ok(client) => Some(Arc::new(client)),
        Err(LlmError::NotConfigured) => {
            tracing::warn!("GROQ_API_KEY not set; chat and narrative endpoints will return 503");
            None
        }
        Err(e) => return Err(e.into()),
    };

    let orchestrator = Arc::new(AnalysisOrchestrator::new(
        polygon,
        llm.clone(),
        config.llm.narrative_model.clone(),
    ));
    let assistant = llm.map(|provider| FinancialAssistant::new(provider, config.llm.chat_model.clone()));

    let twilio = match &config.twilio {
        Some(cfg) => Some(twilio::TwilioClient::new(cfg.clone())?),
        None => {
            tracing::info!("Twilio credentials not set; WhatsApp media handling disabled");
            None
        }
    };

    Ok(AppState {
        config: Arc::new(config),
        orchestrator,
        assistant,
        sessions: SessionStore::new(),
        market_feed: MarketFeed::new(),
        twilio,
    })
}

fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(env_filter()).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter()).init();
    }
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ServerConfig::from_env()?;
    let port = config.port;
    let state = build_state(config)?;

    ws_routes::spawn_overview_poller(
        state.orchestrator.clone(),
        state.market_feed.clone(),
        analysis_orchestrator::default_categories(),
        state.config.overview_poll,
        state.config.overview_backoff,
    );
    state.sessions.spawn_idle_sweeper(state.config.session_idle);

    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("🚀 API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
