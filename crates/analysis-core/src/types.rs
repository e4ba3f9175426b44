use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV bar data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Trading date in `YYYY-MM-DD` form, as used for record keys.
    pub fn date(&self) -> String {
        self.timestamp.format("%Y-%m-%d").to_string()
    }
}

/// Latest trade-level view of a symbol, used by the market overview feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    /// Percent change from the session open.
    pub change: f64,
    pub volume: f64,
    pub high: f64,
    pub low: f64,
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    /// Build a quote from the most recent intraday bar.
    pub fn from_bar(symbol: &str, bar: &Bar) -> Self {
        let change = if bar.open != 0.0 {
            (bar.close - bar.open) / bar.open * 100.0
        } else {
            0.0
        };
        Self {
            symbol: symbol.to_string(),
            price: bar.close,
            change,
            volume: bar.volume,
            high: bar.high,
            low: bar.low,
            timestamp: bar.timestamp,
        }
    }
}

/// Company reference data
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub symbol: String,
    pub name: String,
    pub market: Option<String>,
    pub exchange: Option<String>,
    pub market_cap: Option<f64>,
    pub currency: Option<String>,
}

/// News article
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsArticle {
    pub id: String,
    pub title: String,
    pub author: Option<String>,
    pub published_utc: DateTime<Utc>,
    pub article_url: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub source: Option<String>,
    pub tickers: Vec<String>,
}

/// Timeframe for bar requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeframe {
    Minute1,
    Minute5,
    Hour1,
    Day1,
    Week1,
}

impl Timeframe {
    pub fn to_minutes(&self) -> i64 {
        match self {
            Timeframe::Minute1 => 1,
            Timeframe::Minute5 => 5,
            Timeframe::Hour1 => 60,
            Timeframe::Day1 => 1440,
            Timeframe::Week1 => 10080,
        }
    }

    /// Polygon-style `(multiplier, timespan)` pair.
    pub fn to_span(&self) -> (u32, &'static str) {
        match self {
            Timeframe::Minute1 => (1, "minute"),
            Timeframe::Minute5 => (5, "minute"),
            Timeframe::Hour1 => (1, "hour"),
            Timeframe::Day1 => (1, "day"),
            Timeframe::Week1 => (1, "week"),
        }
    }
}
