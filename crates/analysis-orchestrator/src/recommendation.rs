use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::sentiment::SentimentSummary;

const UPSIDE_TRIGGER: f64 = 1.05;
const DOWNSIDE_TRIGGER: f64 = 0.95;
const STOP_DISTANCE: f64 = 0.05;

static DOLLAR_AMOUNT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$(\d+\.?\d*)").expect("valid amount pattern"));

/// Labelled conclusion lines, in priority order: every match of the first
/// pattern comes before the second.
static CONCLUSIONS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        r"(?i)(?:final decision|trading decision|recommendation):\s*([^.\n]+)",
        r"(?i)(?:overall|summary|conclusion):\s*([^.\n]+)",
        r"(?i)(?:key actions|action points):\s*([^.\n]+)",
    ]
    .map(|pattern| Regex::new(pattern).expect("valid conclusion pattern"))
});

static MARKUP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[#*`]").expect("valid markup pattern"));
static SENTENCE_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?]+").expect("valid sentence pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeRecommendation {
    pub action: TradeAction,
    pub target_price: f64,
    pub stop_loss: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceMetrics {
    /// Backtest Sharpe ratio.
    pub technical_score: f64,
    /// Monte Carlo VaR 95.
    pub risk_score: f64,
    /// Monte Carlo expected terminal return.
    pub return_potential: f64,
    pub overall_confidence: f64,
}

/// One symbol's row in the recommendation list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockRecommendation {
    pub symbol: String,
    pub name: String,
    pub current_price: f64,
    pub recommendation: TradeRecommendation,
    pub sentiment: SentimentSummary,
    pub confidence_metrics: ConfidenceMetrics,
    pub insights: String,
    pub key_insights: String,
}

/// Every `$<digits>[.<digits>]` amount in the text.
pub fn dollar_amounts(text: &str) -> Vec<f64> {
    DOLLAR_AMOUNT
        .captures_iter(text)
        .filter_map(|caps| caps[1].trim_end_matches('.').parse().ok())
        .collect()
}

/// Derive an action from the price targets quoted in a narrative. Amounts
/// equal to the current price (to the cent) are not targets.
pub fn extract_recommendation(insights: &str, current_price: f64) -> TradeRecommendation {
    let targets: Vec<f64> = dollar_amounts(insights)
        .into_iter()
        .filter(|p| (p - current_price).abs() >= 0.005)
        .collect();

    if targets.is_empty() {
        return TradeRecommendation {
            action: TradeAction::Hold,
            target_price: current_price,
            stop_loss: current_price * (1.0 - STOP_DISTANCE),
        };
    }

    let target_price = targets.iter().sum::<f64>() / targets.len() as f64;
    let (action, stop_loss) = if target_price > current_price * UPSIDE_TRIGGER {
        (TradeAction::Buy, current_price * (1.0 - STOP_DISTANCE))
    } else if target_price < current_price * DOWNSIDE_TRIGGER {
        (TradeAction::Sell, current_price * (1.0 + STOP_DISTANCE))
    } else {
        (TradeAction::Hold, current_price * (1.0 - STOP_DISTANCE))
    };

    TradeRecommendation {
        action,
        target_price,
        stop_loss,
    }
}

/// Short conclusion pulled from a narrative: labelled conclusion lines
/// joined with ` | `, else the last sentence longer than 30 characters,
/// else the first 200 characters.
pub fn key_insights(text: &str) -> String {
    let conclusions: Vec<String> = CONCLUSIONS
        .iter()
        .flat_map(|re| re.captures_iter(text))
        .map(|caps| MARKUP.replace_all(&caps[1], "").trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();

    if !conclusions.is_empty() {
        return conclusions.join(" | ");
    }

    if let Some(sentence) = SENTENCE_END
        .split(text)
        .map(str::trim)
        .filter(|s| s.chars().count() > 30)
        .last()
    {
        return sentence.to_string();
    }

    let head: String = text.chars().take(200).collect();
    format!("{}...", head)
}
