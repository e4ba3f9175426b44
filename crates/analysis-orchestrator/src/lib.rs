use analysis_core::{
    AnalysisError, AnalysisResult, Bar, CompanyProfile, MarketDataProvider, NewsArticle, Quote, Timeframe,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};
use llm_client::CompletionProvider;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use technical_analysis::IndicatorTable;

pub mod narrative;
pub mod pipeline;
pub mod recommendation;
pub mod sentiment;

#[cfg(test)]
mod test_support;

pub use narrative::NarrativeBuilder;
pub use pipeline::{AnalysisPipeline, FullAnalysis, PipelineConfig};
pub use recommendation::{
    extract_recommendation, key_insights, ConfidenceMetrics, StockRecommendation, TradeAction,
    TradeRecommendation,
};
pub use sentiment::{summarize_headlines, Polarity, SentimentStatus, SentimentSummary};

const CACHE_TTL_SECS: i64 = 300;
const NEWS_LIMIT: u32 = 10;
const NEWS_FANOUT: usize = 10;
const RECOMMENDATION_FANOUT: usize = 5;
const OVERVIEW_FANOUT: usize = 10;

/// Internal cache entry with timestamp
struct CacheEntry<T> {
    data: T,
    cached_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        (now - self.cached_at).num_seconds() < CACHE_TTL_SECS
    }
}

impl<T: Clone> CacheEntry<T> {
    fn fresh(&self) -> Option<T> {
        self.is_fresh(Utc::now()).then(|| self.data.clone())
    }
}

/// Insert `data` under `key`, dropping every expired entry first.
fn store<T>(cache: &DashMap<String, CacheEntry<T>>, key: String, data: T) {
    let now = Utc::now();
    cache.retain(|_, entry| entry.is_fresh(now));
    cache.insert(key, CacheEntry { data, cached_at: now });
}

/// A named group of symbols shown together in the market overview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketCategory {
    pub name: String,
    pub symbols: Vec<String>,
}

impl MarketCategory {
    pub fn new(name: &str, symbols: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
        }
    }
}

pub fn default_categories() -> Vec<MarketCategory> {
    vec![
        MarketCategory::new("large-cap", &["AAPL", "MSFT", "GOOGL", "AMZN"]),
        MarketCategory::new("mid-cap", &["AMD", "UBER", "SNAP", "DASH"]),
        MarketCategory::new("small-cap", &["PLTR", "RBLX", "HOOD", "COIN"]),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverviewStock {
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub change: f64,
    pub volume: f64,
    pub high: f64,
    pub low: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySnapshot {
    pub category: String,
    pub stocks: Vec<OverviewStock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketOverview {
    pub categories: Vec<CategorySnapshot>,
    pub generated_at: DateTime<Utc>,
}

/// Full analysis plus its narrative.
#[derive(Debug, Clone, Serialize)]
pub struct NarratedAnalysis {
    #[serde(flatten)]
    pub analysis: FullAnalysis,
    pub narrative: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuickMetadata {
    pub data_points: usize,
    pub start_date: String,
    pub end_date: String,
    pub generated_at: DateTime<Utc>,
}

/// Indicator records with a short narrative, as served by `/api/analyze`.
#[derive(Debug, Clone, Serialize)]
pub struct QuickAnalysis {
    pub symbol: String,
    pub company_name: String,
    pub historical_data: IndicatorTable,
    pub narrative: String,
    pub metadata: QuickMetadata,
}

/// Latest quote, reference data and intraday bars for one symbol.
#[derive(Debug, Clone, Serialize)]
pub struct StockDetail {
    pub symbol: String,
    pub name: String,
    pub quote: Quote,
    pub market_cap: Option<f64>,
    pub historical: Vec<Bar>,
}

pub struct AnalysisOrchestrator {
    provider: Arc<dyn MarketDataProvider>,
    llm: Option<Arc<dyn CompletionProvider>>,
    narrator: NarrativeBuilder,
    /// Cache news articles per symbol (5-min TTL)
    news_cache: DashMap<String, CacheEntry<Vec<NewsArticle>>>,
    /// Cache company profiles per symbol (5-min TTL)
    profile_cache: DashMap<String, CacheEntry<CompanyProfile>>,
}

impl AnalysisOrchestrator {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        llm: Option<Arc<dyn CompletionProvider>>,
        narrative_model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            llm,
            narrator: NarrativeBuilder::new(narrative_model),
            news_cache: DashMap::new(),
            profile_cache: DashMap::new(),
        }
    }

    pub fn has_llm(&self) -> bool {
        self.llm.is_some()
    }

    pub fn provider(&self) -> &Arc<dyn MarketDataProvider> {
        &self.provider
    }

    fn llm(&self) -> AnalysisResult<&dyn CompletionProvider> {
        self.llm
            .as_deref()
            .ok_or_else(|| AnalysisError::ExternalService("LLM API key is not configured".to_string()))
    }

    async fn daily_bars(&self, symbol: &str, days_back: i64) -> AnalysisResult<Vec<Bar>> {
        if days_back <= 0 {
            return Err(AnalysisError::InvalidInput(format!("Lookback must be positive, got {} days", days_back)));
        }
        let bars = self.provider.get_bars(symbol, Timeframe::Day1, days_back).await?;
        if bars.is_empty() {
            return Err(AnalysisError::DataUnavailable(format!("No data found for symbol {}", symbol)));
        }
        Ok(bars)
    }

    /// Fetch daily history and run the whole numeric pipeline.
    pub async fn analyze(&self, symbol: &str, request: &PipelineConfig) -> AnalysisResult<FullAnalysis> {
        let symbol = normalize_symbol(symbol)?;
        tracing::info!("Starting analysis for {} ({} days)", symbol, request.lookback_days);

        let bars = self.daily_bars(&symbol, request.lookback_days).await?;
        let pipeline = AnalysisPipeline::new(request);
        let task_symbol = symbol.clone();

        tokio::task::spawn_blocking(move || pipeline.run(&task_symbol, &bars))
            .await
            .map_err(|e| AnalysisError::Computation(format!("Analysis task for {} failed: {}", symbol, e)))?
    }

    /// Analysis plus the full LLM narrative.
    pub async fn narrate(&self, symbol: &str, request: &PipelineConfig) -> AnalysisResult<NarratedAnalysis> {
        let llm = self.llm()?;
        let analysis = self.analyze(symbol, request).await?;
        let narrative = self.narrator.narrate_full(llm, &analysis.symbol, &analysis).await?;
        Ok(NarratedAnalysis { analysis, narrative })
    }

    /// Indicator records and the short "current metrics" narrative.
    pub async fn quick_analysis(&self, symbol: &str, days_back: i64) -> AnalysisResult<QuickAnalysis> {
        let llm = self.llm()?;
        let symbol = normalize_symbol(symbol)?;

        let (bars, profile) = tokio::join!(self.daily_bars(&symbol, days_back), self.company_profile(&symbol));
        let table = AnalysisPipeline::new(&PipelineConfig::default()).indicators(&bars?)?;
        let last = table
            .last()
            .ok_or_else(|| AnalysisError::DataUnavailable(format!("No data found for symbol {}", symbol)))?;

        let narrative = self.narrator.narrate_quick(llm, &symbol, last).await?;
        let metadata = QuickMetadata {
            data_points: table.len(),
            start_date: table.rows.first().map(|r| r.date.clone()).unwrap_or_default(),
            end_date: last.date.clone(),
            generated_at: Utc::now(),
        };

        Ok(QuickAnalysis {
            symbol,
            company_name: profile.name,
            historical_data: table,
            narrative,
            metadata,
        })
    }

    /// Reference data for a symbol; falls back to the bare symbol as the
    /// name when the provider has nothing.
    pub async fn company_profile(&self, symbol: &str) -> CompanyProfile {
        if let Some(profile) = self.profile_cache.get(symbol).and_then(|e| e.fresh()) {
            return profile;
        }

        match self.provider.get_company_profile(symbol).await {
            Ok(profile) => {
                store(&self.profile_cache, symbol.to_string(), profile.clone());
                profile
            }
            Err(e) => {
                tracing::debug!("No company profile for {}: {}", symbol, e);
                CompanyProfile {
                    symbol: symbol.to_string(),
                    name: symbol.to_string(),
                    ..CompanyProfile::default()
                }
            }
        }
    }

    /// News for one symbol, or general market news for `None`.
    pub async fn news(&self, symbol: Option<&str>) -> AnalysisResult<Vec<NewsArticle>> {
        let symbol = symbol.map(normalize_symbol).transpose()?;
        let cache_key = symbol.clone().unwrap_or_else(|| "*".to_string());
        if let Some(articles) = self.news_cache.get(&cache_key).and_then(|e| e.fresh()) {
            return Ok(articles);
        }

        let articles = self.provider.get_news(symbol.as_deref(), NEWS_LIMIT).await?;
        store(&self.news_cache, cache_key, articles.clone());
        Ok(articles)
    }

    /// News for many symbols, newest first, without duplicates. Symbols
    /// whose fetch fails are skipped.
    pub async fn news_for_symbols(&self, symbols: &[String]) -> Vec<NewsArticle> {
        let batches: Vec<Vec<NewsArticle>> = stream::iter(symbols.to_vec())
            .map(|symbol| async move {
                match self.news(Some(&symbol)).await {
                    Ok(articles) => articles,
                    Err(e) => {
                        tracing::warn!("News fetch failed for {}: {}", symbol, e);
                        Vec::new()
                    }
                }
            })
            .buffer_unordered(NEWS_FANOUT)
            .collect()
            .await;

        let mut merged: Vec<NewsArticle> = batches.into_iter().flatten().collect();
        merged.sort_by(|a, b| b.published_utc.cmp(&a.published_utc));
        let mut seen = std::collections::HashSet::new();
        merged.retain(|a| seen.insert(a.id.clone()));
        merged
    }

    /// Narrated recommendation per symbol, best Sharpe first. A symbol that
    /// fails is logged and left out.
    pub async fn recommendations(&self, symbols: &[String], request: &PipelineConfig) -> Vec<StockRecommendation> {
        let results: Vec<Option<StockRecommendation>> = stream::iter(symbols.to_vec())
            .map(|symbol| async move {
                match self.recommend(&symbol, request).await {
                    Ok(rec) => Some(rec),
                    Err(e) => {
                        tracing::warn!("Recommendation failed for {}: {}", symbol, e);
                        None
                    }
                }
            })
            .buffer_unordered(RECOMMENDATION_FANOUT)
            .collect()
            .await;

        let mut recs: Vec<StockRecommendation> = results.into_iter().flatten().collect();
        recs.sort_by(|a, b| {
            b.confidence_metrics
                .technical_score
                .total_cmp(&a.confidence_metrics.technical_score)
        });
        recs
    }

    async fn recommend(&self, symbol: &str, request: &PipelineConfig) -> AnalysisResult<StockRecommendation> {
        let symbol = normalize_symbol(symbol)?;
        let (narrated, profile, news) = tokio::join!(
            self.narrate(&symbol, request),
            self.company_profile(&symbol),
            self.news(Some(&symbol)),
        );
        let NarratedAnalysis { analysis, narrative } = narrated?;
        let news = news.unwrap_or_else(|e| {
            tracing::debug!("No news for {}: {}", symbol, e);
            Vec::new()
        });

        let current_price = analysis.indicators.last().map(|r| r.close).unwrap_or_default();
        Ok(StockRecommendation {
            symbol: analysis.symbol.clone(),
            name: profile.name,
            current_price,
            recommendation: extract_recommendation(&narrative, current_price),
            sentiment: summarize_headlines(&news),
            confidence_metrics: ConfidenceMetrics {
                technical_score: analysis.backtest.metrics.sharpe_ratio,
                risk_score: analysis.risk_metrics.var_95,
                return_potential: analysis.risk_metrics.expected_return,
                overall_confidence: analysis.confidence.overall_confidence,
            },
            key_insights: key_insights(&narrative),
            insights: narrative,
        })
    }

    /// Latest quotes per category. Symbols whose quote fails are skipped.
    pub async fn market_overview(&self, categories: &[MarketCategory]) -> MarketOverview {
        let mut snapshots = Vec::with_capacity(categories.len());
        for category in categories {
            let stocks: Vec<Option<OverviewStock>> = stream::iter(category.symbols.clone())
                .map(|symbol| async move { self.overview_stock(&symbol).await })
                .buffered(OVERVIEW_FANOUT)
                .collect()
                .await;
            snapshots.push(CategorySnapshot {
                category: category.name.clone(),
                stocks: stocks.into_iter().flatten().collect(),
            });
        }

        MarketOverview {
            categories: snapshots,
            generated_at: Utc::now(),
        }
    }

    async fn overview_stock(&self, raw: &str) -> Option<OverviewStock> {
        let symbol = normalize_symbol(raw)
            .map_err(|e| tracing::warn!("Skipping overview entry: {}", e))
            .ok()?;
        let (quote, profile) = tokio::join!(self.provider.get_quote(&symbol), self.company_profile(&symbol));
        match quote {
            Ok(q) => Some(OverviewStock {
                symbol: q.symbol,
                name: profile.name,
                price: q.price,
                change: q.change,
                volume: q.volume,
                high: q.high,
                low: q.low,
            }),
            Err(e) => {
                tracing::warn!("Error fetching {}: {}", symbol, e);
                None
            }
        }
    }

    /// Latest quote plus today's minute bars.
    pub async fn stock_detail(&self, symbol: &str) -> AnalysisResult<StockDetail> {
        let symbol = normalize_symbol(symbol)?;
        let (quote, profile, bars) = tokio::join!(
            self.provider.get_quote(&symbol),
            self.company_profile(&symbol),
            self.provider.get_bars(&symbol, Timeframe::Minute1, 1),
        );
        let quote = quote?;
        let historical = bars.unwrap_or_else(|e| {
            tracing::debug!("No intraday bars for {}: {}", symbol, e);
            Vec::new()
        });

        Ok(StockDetail {
            symbol,
            name: profile.name,
            quote,
            market_cap: profile.market_cap,
            historical,
        })
    }

    pub async fn quote(&self, symbol: &str) -> AnalysisResult<Quote> {
        self.provider.get_quote(&normalize_symbol(symbol)?).await
    }
}

/// Upper-cased ticker; rejects anything that is not 1-10 letters, digits,
/// dots or dashes.
pub fn normalize_symbol(symbol: &str) -> AnalysisResult<String> {
    let symbol = symbol.trim().to_ascii_uppercase();
    let valid = !symbol.is_empty()
        && symbol.len() <= 10
        && symbol.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    if valid {
        Ok(symbol)
    } else {
        Err(AnalysisError::InvalidInput(format!("Invalid symbol '{}'", symbol)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{article, trending_bars, FakeMarket, ScriptedProvider};

    fn small_request() -> PipelineConfig {
        PipelineConfig {
            trials: 100,
            horizon: 20,
            seed: Some(11),
            ..PipelineConfig::default()
        }
    }

    fn orchestrator(market: FakeMarket, reply: Option<&str>) -> (Arc<FakeMarket>, AnalysisOrchestrator) {
        let market = Arc::new(market);
        let llm = reply.map(|r| ScriptedProvider::new(r) as Arc<dyn CompletionProvider>);
        let orch = AnalysisOrchestrator::new(market.clone(), llm, "narrative-model");
        (market, orch)
    }

    #[tokio::test]
    async fn test_analyze_runs_pipeline() {
        let (_, orch) = orchestrator(FakeMarket::new().with_bars("AAPL", trending_bars(100, 150.0, 0.3)), None);
        let analysis = orch.analyze("aapl", &small_request()).await.unwrap();
        assert_eq!(analysis.symbol, "AAPL");
        assert_eq!(analysis.indicators.len(), 100);
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_unavailable() {
        let (_, orch) = orchestrator(FakeMarket::new(), None);
        let err = orch.analyze("ZZZZ", &small_request()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::DataUnavailable(_)));
    }

    #[tokio::test]
    async fn test_invalid_symbol_is_rejected() {
        let (_, orch) = orchestrator(FakeMarket::new(), None);
        let err = orch.analyze("AAPL; DROP", &small_request()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_narrate_requires_llm() {
        let (_, orch) = orchestrator(FakeMarket::new().with_bars("AAPL", trending_bars(50, 10.0, 0.1)), None);
        let err = orch.narrate("AAPL", &small_request()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::ExternalService(_)));
        assert!(!orch.has_llm());
    }

    #[tokio::test]
    async fn test_quick_analysis() {
        let market = FakeMarket::new()
            .with_bars("MSFT", trending_bars(60, 300.0, 1.0))
            .with_profile("MSFT", "Microsoft Corp");
        let (_, orch) = orchestrator(market, Some("<think>hmm</think>Strong uptrend."));

        let quick = orch.quick_analysis("MSFT", 60).await.unwrap();
        assert_eq!(quick.company_name, "Microsoft Corp");
        assert_eq!(quick.narrative, "Strong uptrend.");
        assert_eq!(quick.metadata.data_points, 60);
        assert_eq!(quick.metadata.end_date, quick.historical_data.last().unwrap().date);
    }

    #[tokio::test]
    async fn test_company_profile_falls_back_to_symbol() {
        let (_, orch) = orchestrator(FakeMarket::new(), None);
        let profile = orch.company_profile("NOPE").await;
        assert_eq!(profile.name, "NOPE");
        assert!(profile.market_cap.is_none());
    }

    #[tokio::test]
    async fn test_news_is_cached() {
        let market = FakeMarket::new().with_news("AAPL", vec![article("a1", "Apple beats", 0)]);
        let (market, orch) = orchestrator(market, None);

        orch.news(Some("AAPL")).await.unwrap();
        orch.news(Some("AAPL")).await.unwrap();
        assert_eq!(market.news_calls(), 1);

        orch.news(None).await.unwrap();
        assert_eq!(market.news_calls(), 2);
    }

    #[tokio::test]
    async fn test_news_for_symbols_merges_newest_first() {
        let market = FakeMarket::new()
            .with_news("AAPL", vec![article("a1", "old", 0), article("shared", "both", 5)])
            .with_news("MSFT", vec![article("m1", "newest", 9), article("shared", "both", 5)]);
        let (_, orch) = orchestrator(market, None);

        let merged = orch
            .news_for_symbols(&["AAPL".to_string(), "MSFT".to_string(), "FAIL".to_string()])
            .await;
        let ids: Vec<&str> = merged.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "shared", "a1"]);
    }

    #[tokio::test]
    async fn test_recommendations_sorted_and_failures_skipped() {
        let market = FakeMarket::new()
            .with_bars("UP", trending_bars(120, 50.0, 0.5))
            .with_bars("DOWN", trending_bars(120, 120.0, -0.5))
            .with_news("UP", vec![article("u1", "Shares rally on record profit", 1)]);
        let (_, orch) = orchestrator(market, Some("Recommendation: accumulate. Target $400."));

        let symbols = vec!["UP".to_string(), "DOWN".to_string(), "MISSING".to_string()];
        let recs = orch.recommendations(&symbols, &small_request()).await;

        assert_eq!(recs.len(), 2);
        assert!(recs[0].confidence_metrics.technical_score >= recs[1].confidence_metrics.technical_score);
        let up = recs.iter().find(|r| r.symbol == "UP").unwrap();
        assert_eq!(up.sentiment.status, SentimentStatus::Bullish);
        assert_eq!(up.recommendation.action, TradeAction::Buy);
        assert_eq!(up.key_insights, "accumulate");
    }

    #[tokio::test]
    async fn test_market_overview_skips_failed_quotes() {
        let market = FakeMarket::new()
            .with_bars("AAPL", trending_bars(5, 190.0, 1.0))
            .with_profile("AAPL", "Apple Inc.");
        let (_, orch) = orchestrator(market, None);

        let overview = orch
            .market_overview(&[MarketCategory::new("large-cap", &["AAPL", "GONE"])])
            .await;
        assert_eq!(overview.categories.len(), 1);
        let stocks = &overview.categories[0].stocks;
        assert_eq!(stocks.len(), 1);
        assert_eq!(stocks[0].name, "Apple Inc.");
        assert_eq!(stocks[0].price, 194.0);
    }

    #[tokio::test]
    async fn test_fanouts_run_on_spawned_tasks() {
        let market = FakeMarket::new()
            .with_bars("AAPL", trending_bars(5, 190.0, 1.0))
            .with_news("AAPL", vec![article("a1", "Apple beats", 0)]);
        let (_, orch) = orchestrator(market, None);
        let orch = Arc::new(orch);

        let overview = tokio::spawn({
            let orch = orch.clone();
            async move { orch.market_overview(&[MarketCategory::new("large-cap", &["AAPL"])]).await }
        });
        let news = tokio::spawn({
            let orch = orch.clone();
            async move { orch.news_for_symbols(&["AAPL".to_string()]).await }
        });

        assert_eq!(overview.await.unwrap().categories[0].stocks.len(), 1);
        assert_eq!(news.await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_news_symbols_are_normalized() {
        let market = FakeMarket::new().with_news("AAPL", vec![article("a1", "Apple beats", 0)]);
        let (market, orch) = orchestrator(market, None);

        assert_eq!(orch.news(Some(" aapl ")).await.unwrap().len(), 1);
        assert!(matches!(
            orch.news(Some("../../v3/x?junk")).await,
            Err(AnalysisError::InvalidInput(_))
        ));

        let merged = orch
            .news_for_symbols(&["../../v3/x1".to_string(), "aapl".to_string()])
            .await;
        assert_eq!(merged.len(), 1);
        assert_eq!(market.news_calls(), 1);
        assert_eq!(orch.news_cache.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_cache_entries_are_evicted() {
        let (_, orch) = orchestrator(FakeMarket::new().with_news("AAPL", Vec::new()), None);
        orch.news_cache.insert(
            "OLD".to_string(),
            CacheEntry {
                data: Vec::new(),
                cached_at: Utc::now() - chrono::Duration::seconds(CACHE_TTL_SECS + 60),
            },
        );

        orch.news(Some("AAPL")).await.unwrap();
        assert!(!orch.news_cache.contains_key("OLD"));
        assert!(orch.news_cache.contains_key("AAPL"));
    }

    #[test]
    fn test_default_categories() {
        let cats = default_categories();
        let names: Vec<&str> = cats.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["large-cap", "mid-cap", "small-cap"]);
        assert!(cats.iter().all(|c| c.symbols.len() == 4));
    }

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol(" brk.b ").unwrap(), "BRK.B");
        assert!(normalize_symbol("").is_err());
        assert!(normalize_symbol("TOOLONGSYMBOL").is_err());
    }
}
