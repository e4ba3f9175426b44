use analysis_orchestrator::{normalize_symbol, NarratedAnalysis, PipelineConfig, QuickAnalysis, StockRecommendation};
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::{ApiResponse, AppError, AppState};

/// Most symbols a single request may fan out to.
pub const MAX_SYMBOLS_PER_REQUEST: usize = 20;

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub symbol: String,
    #[serde(default)]
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct NarrativeRequest {
    pub symbol: String,
    #[serde(default)]
    pub days: Option<i64>,
    #[serde(default)]
    pub trials: Option<usize>,
    #[serde(default)]
    pub horizon: Option<usize>,
    #[serde(default)]
    pub initial_capital: Option<f64>,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RecommendationsQuery {
    pub symbols: Option<String>,
}

pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/api/analyze", post(analyze))
        .route("/api/narrative", post(narrative))
        .route("/api/recommendations", get(recommendations))
}

impl NarrativeRequest {
    fn pipeline_config(&self, default_days: i64) -> Result<PipelineConfig, AppError> {
        let defaults = PipelineConfig {
            lookback_days: default_days,
            ..PipelineConfig::default()
        };
        let config = PipelineConfig {
            lookback_days: self.days.unwrap_or(defaults.lookback_days),
            trials: self.trials.unwrap_or(defaults.trials),
            horizon: self.horizon.unwrap_or(defaults.horizon),
            initial_capital: self.initial_capital.unwrap_or(defaults.initial_capital),
            seed: self.seed,
        };

        if !(1..=10_000).contains(&config.trials) {
            return Err(AppError::bad_request("trials must be between 1 and 10000"));
        }
        if !(1..=2_520).contains(&config.horizon) {
            return Err(AppError::bad_request("horizon must be between 1 and 2520 trading days"));
        }
        Ok(config)
    }
}

/// Comma-separated tickers, normalized. Any invalid ticker, or more than
/// [`MAX_SYMBOLS_PER_REQUEST`] of them, rejects the whole list.
pub fn parse_symbols(raw: Option<&str>) -> Result<Vec<String>, AppError> {
    let symbols = raw
        .unwrap_or_default()
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(normalize_symbol)
        .collect::<Result<Vec<_>, _>>()?;

    if symbols.len() > MAX_SYMBOLS_PER_REQUEST {
        return Err(AppError::bad_request(format!(
            "At most {} symbols per request",
            MAX_SYMBOLS_PER_REQUEST
        )));
    }
    Ok(symbols)
}

/// Indicator records for the lookback with a short narrative.
async fn analyze(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<ApiResponse<QuickAnalysis>>, AppError> {
    state.require_llm()?;
    let days = req.days.unwrap_or(state.config.lookback_days);
    let analysis = state.orchestrator.quick_analysis(&req.symbol, days).await?;
    Ok(Json(ApiResponse::success(analysis)))
}

/// Full pipeline output with the long narrative.
async fn narrative(
    State(state): State<AppState>,
    Json(req): Json<NarrativeRequest>,
) -> Result<Json<ApiResponse<NarratedAnalysis>>, AppError> {
    state.require_llm()?;
    let config = req.pipeline_config(state.config.lookback_days)?;
    let narrated = state.orchestrator.narrate(&req.symbol, &config).await?;
    Ok(Json(ApiResponse::success(narrated)))
}

async fn recommendations(
    State(state): State<AppState>,
    Query(query): Query<RecommendationsQuery>,
) -> Result<Json<ApiResponse<Vec<StockRecommendation>>>, AppError> {
    state.require_llm()?;
    let symbols = parse_symbols(query.symbols.as_deref())?;
    if symbols.is_empty() {
        return Err(AppError::bad_request("symbols query parameter is required, e.g. ?symbols=AAPL,MSFT"));
    }

    let config = PipelineConfig {
        lookback_days: state.config.lookback_days,
        ..PipelineConfig::default()
    };
    let recs = state.orchestrator.recommendations(&symbols, &config).await;
    Ok(Json(ApiResponse::success(recs)))
}
