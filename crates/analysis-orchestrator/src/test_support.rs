//! In-crate fakes for the market data and completion providers.

use analysis_core::{AnalysisError, Bar, CompanyProfile, MarketDataProvider, NewsArticle, Quote, Timeframe};
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use llm_client::{CompletionProvider, CompletionRequest, LlmResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Daily bars climbing `slope` per day from `start`, with a small bump on
/// odd days so returns are not all alike. A zero slope is perfectly flat.
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
                volume: if slope == 0.0 { 0.0 } else { 1_000_000.0 + (i % 5) as f64 * 10_000.0 },
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
    news_calls: AtomicUsize,
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

    pub fn news_calls(&self) -> usize {
        self.news_calls.load(Ordering::SeqCst)
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
                market_cap: Some(1.0e12),
                ..CompanyProfile::default()
            })
            .ok_or_else(|| AnalysisError::DataUnavailable(format!("No details for {}", symbol)))
    }

    async fn get_news(&self, symbol: Option<&str>, _limit: u32) -> Result<Vec<NewsArticle>, AnalysisError> {
        self.news_calls.fetch_add(1, Ordering::SeqCst);
        match symbol {
            Some("FAIL") => Err(AnalysisError::ExternalService("news feed down".to_string())),
            Some(s) => Ok(self.news.get(s).cloned().unwrap_or_default()),
            None => Ok(self.news.values().flatten().cloned().collect()),
        }
    }
}

/// Answers every completion with a fixed reply and records the requests.
pub struct ScriptedProvider {
    reply: String,
    seen: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn last(&self) -> CompletionRequest {
        self.seen.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, request: CompletionRequest) -> LlmResult<String> {
        self.seen.lock().unwrap().push(request);
        Ok(self.reply.clone())
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }
}
