use analysis_core::NewsArticle;
use analysis_orchestrator::{default_categories, OverviewStock, StockDetail};
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::analysis_routes::parse_symbols;
use crate::{ApiResponse, AppError, AppState};

#[derive(Debug, Deserialize)]
pub struct NewsQuery {
    pub symbols: Option<String>,
}

pub fn market_routes() -> Router<AppState> {
    Router::new()
        .route("/api/stock/:symbol", get(stock_detail))
        .route("/api/market-data", get(market_data))
        .route("/api/news", get(news))
}

async fn stock_detail(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<StockDetail>>, AppError> {
    let detail = state.orchestrator.stock_detail(&symbol).await?;
    Ok(Json(ApiResponse::success(detail)))
}

/// Overview keyed by category. Served from the poller's latest snapshot
/// when there is one, otherwise fetched on demand.
async fn market_data(State(state): State<AppState>) -> Json<ApiResponse<BTreeMap<String, Vec<OverviewStock>>>> {
    let overview = match state.market_feed.latest() {
        Some(overview) => overview,
        None => state.orchestrator.market_overview(&default_categories()).await,
    };

    let by_category = overview
        .categories
        .into_iter()
        .map(|c| (c.category, c.stocks))
        .collect();
    Json(ApiResponse::success(by_category))
}

/// News for the given symbols, or general market news without any.
async fn news(
    State(state): State<AppState>,
    Query(query): Query<NewsQuery>,
) -> Result<Json<ApiResponse<Vec<NewsArticle>>>, AppError> {
    let symbols = parse_symbols(query.symbols.as_deref())?;
    let articles = if symbols.is_empty() {
        state.orchestrator.news(None).await?
    } else {
        state.orchestrator.news_for_symbols(&symbols).await
    };
    Ok(Json(ApiResponse::success(articles)))
}
