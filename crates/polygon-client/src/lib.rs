use analysis_core::{AnalysisError, Bar, CompanyProfile, MarketDataProvider, NewsArticle, Quote, Timeframe};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const BASE_URL: &str = "https://api.polygon.io";

/// Hands out request slots so that no more than `capacity` requests start
/// within any one minute.
#[derive(Clone)]
struct RateLimiter {
    issued: Arc<Mutex<VecDeque<Instant>>>,
    capacity: usize,
    period: Duration,
}

impl RateLimiter {
    fn new(capacity: usize, period: Duration) -> Self {
        Self {
            issued: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
            period,
        }
    }

    fn per_minute(capacity: usize) -> Self {
        Self::new(capacity, Duration::from_secs(60))
    }

    /// Reserve the next slot and sleep until it opens.
    async fn acquire(&self) {
        let slot = {
            let mut issued = self.issued.lock().await;
            let now = Instant::now();
            while issued.front().is_some_and(|&t| now.duration_since(t) >= self.period) {
                issued.pop_front();
            }
            let slot = if issued.len() < self.capacity {
                now
            } else {
                // The slot frees up one period after the request `capacity` places back.
                issued[issued.len() - self.capacity] + self.period
            };
            issued.push_back(slot);
            slot
        };

        let wait = slot.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            tracing::debug!("Polygon rate limit reached, next request in {:.1}s", wait.as_secs_f64());
            tokio::time::sleep_until(slot).await;
        }
    }
}

/// Polygon.io REST client for bars, quotes, reference data and news.
#[derive(Clone)]
pub struct PolygonClient {
    api_key: String,
    client: Client,
    limiter: RateLimiter,
}

impl PolygonClient {
    /// `rate_limit` is requests per minute; the free tier allows 5.
    pub fn new(api_key: String, rate_limit: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key,
            client,
            limiter: RateLimiter::per_minute(rate_limit),
        }
    }

    /// GET `path` with the API key appended and decode the JSON body.
    /// A 404 maps to `DataUnavailable` described by `context`. A 429 is
    /// returned at once as `ExternalService` with the server's `Retry-After`.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        context: &str,
    ) -> Result<T, AnalysisError> {
        let url = format!("{}{}", BASE_URL, path);

        self.limiter.acquire().await;
        let response = self
            .client
            .get(&url)
            .query(&[("apiKey", self.api_key.as_str())])
            .query(query)
            .send()
            .await
            .map_err(|e| AnalysisError::ExternalService(format!("{} request failed: {}", context, e)))?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                let err = throttled(context, retry_after(response.headers()));
                tracing::warn!("{}", err);
                Err(err)
            }
            StatusCode::NOT_FOUND => Err(AnalysisError::DataUnavailable(context.to_string())),
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                Err(AnalysisError::ExternalService(format!("{}: HTTP {}: {}", context, status, body)))
            }
            _ => response
                .json()
                .await
                .map_err(|e| AnalysisError::ExternalService(format!("{}: bad payload: {}", context, e))),
        }
    }

    /// Bars between two dates, oldest first with repeated timestamps removed.
    pub async fn get_aggregates(
        &self,
        symbol: &str,
        multiplier: u32,
        timespan: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bar>, AnalysisError> {
        let path = format!(
            "/v2/aggs/ticker/{}/range/{}/{}/{}/{}",
            symbol,
            multiplier,
            timespan,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );
        let query = [
            ("adjusted", "true".to_string()),
            ("sort", "asc".to_string()),
            ("limit", "50000".to_string()),
        ];
        let payload: AggregateResponse = self
            .get_json(&path, &query, &format!("No bars for {}", symbol))
            .await?;

        let bars = payload
            .results
            .into_iter()
            .filter_map(|r| {
                DateTime::from_timestamp_millis(r.t).map(|timestamp| Bar {
                    timestamp,
                    open: r.o,
                    high: r.h,
                    low: r.l,
                    close: r.c,
                    volume: r.v,
                })
            })
            .collect();
        Ok(normalize_bars(bars))
    }

    /// Latest articles, for one ticker or the whole market.
    pub async fn fetch_news(&self, symbol: Option<&str>, limit: u32) -> Result<Vec<NewsArticle>, AnalysisError> {
        let mut query = vec![("limit", limit.to_string()), ("order", "desc".to_string())];
        if let Some(ticker) = symbol {
            query.push(("ticker", ticker.to_string()));
        }
        let payload: NewsResponse = self.get_json("/v2/reference/news", &query, "News").await?;

        Ok(payload.results.into_iter().map(NewsArticle::from).collect())
    }

    pub async fn get_ticker_details(&self, symbol: &str) -> Result<TickerDetails, AnalysisError> {
        let path = format!("/v3/reference/tickers/{}", symbol);
        let payload: TickerDetailsResponse = self
            .get_json(&path, &[], &format!("Unknown ticker {}", symbol))
            .await?;
        Ok(payload.results)
    }

    /// Last trade, today's session and the previous session for one ticker.
    pub async fn get_snapshot(&self, symbol: &str) -> Result<SnapshotTicker, AnalysisError> {
        let path = format!("/v2/snapshot/locale/us/markets/stocks/tickers/{}", symbol);
        let payload: SnapshotResponse = self
            .get_json(&path, &[], &format!("No snapshot for {}", symbol))
            .await?;
        Ok(payload.ticker)
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Polygon throttled the request; the caller decides whether to try again.
fn throttled(context: &str, retry_after: Option<Duration>) -> AnalysisError {
    let hint = match retry_after {
        Some(wait) => format!("retry after {}s", wait.as_secs()),
        None => "no Retry-After given".to_string(),
    };
    AnalysisError::ExternalService(format!("{}: rate limited by Polygon (HTTP 429, {})", context, hint))
}

impl From<NewsResult> for NewsArticle {
    fn from(r: NewsResult) -> Self {
        let published_utc = DateTime::parse_from_rfc3339(&r.published_utc)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        NewsArticle {
            id: r.id,
            title: r.title,
            author: r.author,
            published_utc,
            article_url: r.article_url,
            description: r.description,
            image_url: r.image_url,
            source: r.publisher.map(|p| p.name),
            tickers: r.tickers,
        }
    }
}

#[async_trait]
impl MarketDataProvider for PolygonClient {
    async fn get_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        days_back: i64,
    ) -> Result<Vec<Bar>, AnalysisError> {
        let (multiplier, span) = timeframe.to_span();
        let to = Utc::now();
        let from = to - ChronoDuration::days(days_back.max(1));
        tracing::debug!("Fetching {} {}x{} bars for {} days", symbol, multiplier, span, days_back);
        self.get_aggregates(symbol, multiplier, span, from, to).await
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, AnalysisError> {
        let snapshot = self.get_snapshot(symbol).await?;
        snapshot_to_quote(symbol, &snapshot)
            .ok_or_else(|| AnalysisError::DataUnavailable(format!("No quote data for {}", symbol)))
    }

    async fn get_company_profile(&self, symbol: &str) -> Result<CompanyProfile, AnalysisError> {
        let details = self.get_ticker_details(symbol).await?;
        Ok(CompanyProfile {
            symbol: details.ticker,
            name: details.name,
            market: Some(details.market),
            exchange: details.primary_exchange,
            market_cap: details.market_cap,
            currency: details.currency_name,
        })
    }

    async fn get_news(&self, symbol: Option<&str>, limit: u32) -> Result<Vec<NewsArticle>, AnalysisError> {
        self.fetch_news(symbol, limit).await
    }
}

/// Sort by timestamp and drop repeated timestamps, keeping the first.
fn normalize_bars(mut bars: Vec<Bar>) -> Vec<Bar> {
    bars.sort_by_key(|b| b.timestamp);
    bars.dedup_by_key(|b| b.timestamp);
    bars
}

/// Prefer the last trade price; fall back to today's close, then the
/// previous session's close (pre-market).
fn snapshot_to_quote(symbol: &str, snap: &SnapshotTicker) -> Option<Quote> {
    let day = snap.day.as_ref().filter(|d| d.c.unwrap_or(0.0) > 0.0).or(snap.prev_day.as_ref())?;
    let price = snap
        .last_trade
        .as_ref()
        .and_then(|lt| lt.p)
        .or(day.c)?;
    let open = day.o.unwrap_or(price);
    let change = snap.todays_change_perc.unwrap_or_else(|| {
        if open != 0.0 {
            (price - open) / open * 100.0
        } else {
            0.0
        }
    });
    let timestamp = snap
        .updated
        .and_then(|ns| DateTime::from_timestamp_millis(ns / 1_000_000))
        .unwrap_or_else(Utc::now);

    Some(Quote {
        symbol: symbol.to_string(),
        price,
        change,
        volume: day.v.unwrap_or(0.0),
        high: day.h.unwrap_or(price),
        low: day.l.unwrap_or(price),
        timestamp,
    })
}

// Response structures
#[derive(Debug, Deserialize)]
struct AggregateResponse {
    #[serde(default)]
    results: Vec<AggregateResult>,
}

#[derive(Debug, Deserialize)]
struct AggregateResult {
    t: i64, // timestamp
    o: f64, // open
    h: f64, // high
    l: f64, // low
    c: f64, // close
    v: f64, // volume
}

#[derive(Debug, Deserialize)]
struct NewsResponse {
    #[serde(default)]
    results: Vec<NewsResult>,
}

#[derive(Debug, Deserialize)]
struct NewsResult {
    id: String,
    title: String,
    author: Option<String>,
    published_utc: String,
    article_url: String,
    description: Option<String>,
    image_url: Option<String>,
    publisher: Option<NewsPublisher>,
    #[serde(default)]
    tickers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct NewsPublisher {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TickerDetailsResponse {
    results: TickerDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerDetails {
    pub ticker: String,
    pub name: String,
    pub market: String,
    pub locale: String,
    pub primary_exchange: Option<String>,
    #[serde(rename = "type")]
    pub ticker_type: Option<String>,
    pub active: bool,
    pub currency_name: Option<String>,
    pub market_cap: Option<f64>,
}

// Snapshot types
#[derive(Debug, Deserialize)]
struct SnapshotResponse {
    ticker: SnapshotTicker,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotTicker {
    pub day: Option<SnapshotDay>,
    #[serde(rename = "lastTrade")]
    pub last_trade: Option<SnapshotLastTrade>,
    #[serde(rename = "prevDay")]
    pub prev_day: Option<SnapshotDay>,
    #[serde(rename = "todaysChange")]
    pub todays_change: Option<f64>,
    #[serde(rename = "todaysChangePerc")]
    pub todays_change_perc: Option<f64>,
    /// Nanoseconds since the epoch.
    pub updated: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDay {
    pub o: Option<f64>,
    pub h: Option<f64>,
    pub l: Option<f64>,
    pub c: Option<f64>,
    pub v: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotLastTrade {
    pub p: Option<f64>,
    pub s: Option<i64>,
    pub t: Option<i64>,
}
