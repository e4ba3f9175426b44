use async_trait::async_trait;
use crate::{AnalysisError, Bar, CompanyProfile, NewsArticle, Quote, Timeframe};

/// Source of OHLCV history, company reference data and news.
///
/// Implementations must return bars ordered by timestamp with no duplicate
/// dates. An unknown symbol yields an empty vector, not an error; the caller
/// decides whether that is fatal.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn get_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        days_back: i64,
    ) -> Result<Vec<Bar>, AnalysisError>;

    /// Most recent trade-level quote for the current session.
    async fn get_quote(&self, symbol: &str) -> Result<Quote, AnalysisError>;

    async fn get_company_profile(&self, symbol: &str) -> Result<CompanyProfile, AnalysisError>;

    async fn get_news(&self, symbol: Option<&str>, limit: u32) -> Result<Vec<NewsArticle>, AnalysisError>;
}
