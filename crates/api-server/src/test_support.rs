//! Router-level fakes and request helpers for the handler tests.

use analysis_core::{AnalysisError, Bar, CompanyProfile, MarketDataProvider, NewsArticle, Quote, Timeframe};
use analysis_orchestrator::AnalysisOrchestrator;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{Duration, TimeZone, Utc};
use llm_client::{CompletionProvider, CompletionRequest, FinancialAssistant, LlmResult};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use crate::{AppState, MarketFeed, ServerConfig, SessionStore};

pub fn trending_bars(n: usize, start: f64, slope: f64) -> Vec<Bar> {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 21, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let bump = if i % 2 == 1 { 0.3 * slope } else { 0.0 };
            let close = start + slope * i as f64 + bump;
            Bar {
                timestamp: t0 + Duration::days(i as i64),
                open: close - 0.5 * slope,
                high: close + slope.abs(),
                low: close - slope.abs(),
                close,
                volume: 1_000_000.0 + (i % 5) as f64 * 10_000.0,
            }
        })
        .collect()
}

pub fn article(id: &str, title: &str, minutes: i64) -> NewsArticle {
    NewsArticle {
        id: id.to_string(),
        title: title.to_string(),
        author: None,
        published_utc: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes),
        article_url: format!("https://news.example/{}", id),
        description: None,
        image_url: None,
        source: Some("Example Wire".to_string()),
        tickers: Vec::new(),
    }
}

#[derive(Default)]
pub struct FakeMarket {
    bars: HashMap<String, Vec<Bar>>,
    profiles: HashMap<String, String>,
    news: HashMap<String, Vec<NewsArticle>>,
}

impl FakeMarket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.bars.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_profile(mut self, symbol: &str, name: &str) -> Self {
        self.profiles.insert(symbol.to_string(), name.to_string());
        self
    }

    pub fn with_news(mut self, symbol: &str, articles: Vec<NewsArticle>) -> Self {
        self.news.insert(symbol.to_string(), articles);
        self
    }
}

#[async_trait]
impl MarketDataProvider for FakeMarket {
    async fn get_bars(&self, symbol: &str, _timeframe: Timeframe, _days_back: i64) -> Result<Vec<Bar>, AnalysisError> {
        Ok(self.bars.get(symbol).cloned().unwrap_or_default())
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, AnalysisError> {
        self.bars
            .get(symbol)
            .and_then(|bars| bars.last())
            .map(|bar| Quote::from_bar(symbol, bar))
            .ok_or_else(|| AnalysisError::DataUnavailable(format!("No snapshot for {}", symbol)))
    }

    async fn get_company_profile(&self, symbol: &str) -> Result<CompanyProfile, AnalysisError> {
        self.profiles
            .get(symbol)
            .map(|name| CompanyProfile {
                symbol: symbol.to_string(),
                name: name.clone(),
                ..CompanyProfile::default()
            })
            .ok_or_else(|| AnalysisError::DataUnavailable(format!("No details for {}", symbol)))
    }

    async fn get_news(&self, symbol: Option<&str>, _limit: u32) -> Result<Vec<NewsArticle>, AnalysisError> {
        Ok(match symbol {
            Some(s) => self.news.get(s).cloned().unwrap_or_default(),
            None => self.news.values().flatten().cloned().collect(),
        })
    }
}

/// Completion provider with a canned reply that records what it was asked.
pub struct ScriptedLlm {
    reply: String,
    seen: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    pub fn last(&self) -> CompletionRequest {
        self.seen.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedLlm {
    async fn complete(&self, request: CompletionRequest) -> LlmResult<String> {
        self.seen.lock().unwrap().push(request);
        Ok(self.reply.clone())
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }
}

pub fn test_config() -> ServerConfig {
    ServerConfig::from_lookup(|key| (key == "POLYGON_API_KEY").then(|| "test-key".to_string())).unwrap()
}

pub fn test_state(reply: Option<&str>) -> (AppState, Option<Arc<ScriptedLlm>>) {
    test_state_with(FakeMarket::new(), reply)
}

/// State over a fake market; `reply` switches the LLM on.
pub fn test_state_with(market: FakeMarket, reply: Option<&str>) -> (AppState, Option<Arc<ScriptedLlm>>) {
    let llm = reply.map(|r| {
        Arc::new(ScriptedLlm {
            reply: r.to_string(),
            seen: Mutex::new(Vec::new()),
        })
    });
    let provider = llm.clone().map(|l| l as Arc<dyn CompletionProvider>);

    let orchestrator = AnalysisOrchestrator::new(Arc::new(market), provider.clone(), "narrative-model".to_string());
    let state = AppState {
        config: Arc::new(test_config()),
        orchestrator: Arc::new(orchestrator),
        assistant: provider.map(|p| FinancialAssistant::new(p, "chat-model")),
        sessions: SessionStore::new(),
        market_feed: MarketFeed::new(),
        twilio: None,
    };
    (state, llm)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

pub async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

pub async fn post_json(app: Router, uri: &str, payload: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();
    send(app, request).await
}

/// POST a urlencoded form and return the raw text body.
pub async fn post_form(app: Router, uri: &str, fields: &[(&str, &str)]) -> (StatusCode, String) {
    post_form_with_headers(app, uri, fields, &[]).await
}

pub async fn post_form_with_headers(
    app: Router,
    uri: &str,
    fields: &[(&str, &str)],
    headers: &[(&str, &str)],
) -> (StatusCode, String) {
    let body = fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, form_encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder.body(Body::from(body)).unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

fn form_encode(value: &str) -> String {
    value
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => (b as char).to_string(),
            b' ' => "+".to_string(),
            _ => format!("%{:02X}", b),
        })
        .collect()
}
