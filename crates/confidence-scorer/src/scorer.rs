use analysis_core::{AnalysisError, AnalysisResult};
use backtest_engine::BacktestMetrics;
use quant_analysis::{RiskMetrics, SimulationSummary};
use serde::{Deserialize, Serialize};
use technical_analysis::IndicatorTable;

use crate::skewtest::skewtest;

const VOLUME_WINDOW: usize = 20;
const STABILITY_WINDOW: usize = 252;

/// Interpretation tier of an overall confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    VeryHigh,
    High,
    Moderate,
    Low,
    VeryLow,
    /// The price never moved, so no sub-score carries information.
    Neutral,
}

impl ConfidenceLevel {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 0.8 => ConfidenceLevel::VeryHigh,
            s if s >= 0.6 => ConfidenceLevel::High,
            s if s >= 0.4 => ConfidenceLevel::Moderate,
            s if s >= 0.2 => ConfidenceLevel::Low,
            _ => ConfidenceLevel::VeryLow,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::VeryHigh => "Very High Confidence",
            ConfidenceLevel::High => "High Confidence",
            ConfidenceLevel::Moderate => "Moderate Confidence",
            ConfidenceLevel::Low => "Low Confidence",
            ConfidenceLevel::VeryLow => "Very Low Confidence",
            ConfidenceLevel::Neutral => "Neutral (no price movement)",
        }
    }
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TechnicalBreakdown {
    pub trend_agreement: f64,
    pub rsi_confidence: f64,
    pub macd_strength: f64,
    pub trend_strength: f64,
    pub volume_confidence: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticalBreakdown {
    pub skewness: f64,
    pub volatility: f64,
    pub var_confidence: f64,
    pub interval_confidence: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketBreakdown {
    pub sharpe_ratio: f64,
    pub win_rate: f64,
    pub market_stability: f64,
    pub excess_return: f64,
}

/// A sub-score with the components it was weighted from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentScore<B> {
    pub score: f64,
    pub breakdown: B,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceReport {
    pub overall_confidence: f64,
    pub level: ConfidenceLevel,
    pub interpretation: String,
    pub technical_confidence: ComponentScore<TechnicalBreakdown>,
    pub statistical_confidence: ComponentScore<StatisticalBreakdown>,
    pub market_confidence: ComponentScore<MarketBreakdown>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceWeights {
    pub technical: f64,
    pub statistical: f64,
    pub market: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            technical: 0.3,
            statistical: 0.4,
            market: 0.3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfidenceScorer {
    weights: ConfidenceWeights,
}

impl ConfidenceScorer {
    pub fn new(weights: ConfidenceWeights) -> Self {
        Self { weights }
    }

    pub fn score(
        &self,
        table: &IndicatorTable,
        summary: &SimulationSummary,
        risk: &RiskMetrics,
        backtest: &BacktestMetrics,
    ) -> AnalysisResult<ConfidenceReport> {
        if table.is_empty() {
            return Err(AnalysisError::InvalidInput(
                "Confidence scoring needs at least one indicator row".to_string(),
            ));
        }

        let technical_confidence = self.technical(table)?;
        let statistical_confidence = self.statistical(summary, risk);
        let market_confidence = self.market(table, backtest);

        let overall_confidence = unit(
            technical_confidence.score * self.weights.technical
                + statistical_confidence.score * self.weights.statistical
                + market_confidence.score * self.weights.market,
        );

        let level = if table.is_flat() {
            ConfidenceLevel::Neutral
        } else {
            ConfidenceLevel::from_score(overall_confidence)
        };

        tracing::debug!(
            "Confidence {:.3} ({}) technical {:.3} statistical {:.3} market {:.3}",
            overall_confidence,
            level,
            technical_confidence.score,
            statistical_confidence.score,
            market_confidence.score
        );

        Ok(ConfidenceReport {
            overall_confidence,
            level,
            interpretation: level.as_str().to_string(),
            technical_confidence,
            statistical_confidence,
            market_confidence,
        })
    }

    pub fn technical(&self, table: &IndicatorTable) -> AnalysisResult<ComponentScore<TechnicalBreakdown>> {
        let last = table
            .last()
            .ok_or_else(|| AnalysisError::InvalidInput("Empty indicator table".to_string()))?;

        let trend_agreement = if (last.sma_50 > last.sma_200) == (last.ema_20 > last.sma_50) {
            1.0
        } else {
            0.0
        };

        let rsi_confidence = 1.0 - (50.0 - last.rsi).abs() / 50.0;

        let macd_strength = match (last.macd == 0.0, last.macd_histogram == 0.0) {
            (true, true) => 0.5,
            (true, false) => 1.0,
            _ => (last.macd_histogram / last.macd).abs().min(1.0),
        };

        let trend_strength = (last.adx / 50.0).min(1.0);

        let volumes = table.volumes();
        let recent = &volumes[volumes.len().saturating_sub(VOLUME_WINDOW)..];
        let avg_volume = recent.iter().sum::<f64>() / recent.len() as f64;
        let volume_confidence = if avg_volume > 0.0 {
            (last.volume / avg_volume).min(1.5) / 1.5
        } else {
            0.0
        };

        let breakdown = TechnicalBreakdown {
            trend_agreement,
            rsi_confidence: unit(rsi_confidence),
            macd_strength: unit(macd_strength),
            trend_strength: unit(trend_strength),
            volume_confidence: unit(volume_confidence),
        };
        let score = unit(
            0.25 * breakdown.trend_agreement
                + 0.15 * breakdown.rsi_confidence
                + 0.20 * breakdown.macd_strength
                + 0.25 * breakdown.trend_strength
                + 0.15 * breakdown.volume_confidence,
        );

        Ok(ComponentScore { score, breakdown })
    }

    pub fn statistical(
        &self,
        summary: &SimulationSummary,
        risk: &RiskMetrics,
    ) -> ComponentScore<StatisticalBreakdown> {
        let changes: Vec<f64> = summary
            .mean_path
            .windows(2)
            .filter(|w| w[0] != 0.0)
            .map(|w| w[1] / w[0] - 1.0)
            .filter(|c| c.is_finite())
            .collect();
        let skewness = match skewtest(&changes) {
            Some(test) => test.p_value.min(0.05) / 0.05,
            None => 0.5,
        };

        let volatility = (1.0 - risk.return_volatility.min(0.5) / 0.5).max(0.0);

        let var_confidence = if risk.var_99 != 0.0 {
            (risk.var_95 / risk.var_99).abs().min(1.0)
        } else {
            0.0
        };

        let interval_confidence = match (
            summary.mean_path.last(),
            summary.upper_95.last(),
            summary.lower_95.last(),
        ) {
            (Some(&mean), Some(&upper), Some(&lower)) if mean != 0.0 => {
                (1.0 - (upper - lower) / mean).max(0.0)
            }
            _ => 0.0,
        };

        let breakdown = StatisticalBreakdown {
            skewness: unit(skewness),
            volatility: unit(volatility),
            var_confidence: unit(var_confidence),
            interval_confidence: unit(interval_confidence),
        };
        let score = unit(
            0.25 * (breakdown.skewness
                + breakdown.volatility
                + breakdown.var_confidence
                + breakdown.interval_confidence),
        );

        ComponentScore { score, breakdown }
    }

    pub fn market(&self, table: &IndicatorTable, backtest: &BacktestMetrics) -> ComponentScore<MarketBreakdown> {
        let sharpe_ratio = backtest.sharpe_ratio / 3.0;
        let win_rate = backtest.win_rate;

        let volatilities = table.volatilities();
        let recent = &volatilities[volatilities.len().saturating_sub(STABILITY_WINDOW)..];
        let peak = recent.iter().copied().fold(0.0_f64, f64::max);
        let market_stability = match recent.last() {
            Some(&current) if peak > 0.0 => 1.0 - current / peak,
            _ => 0.0,
        };

        let excess_return = backtest.excess_return / 0.2;

        let breakdown = MarketBreakdown {
            sharpe_ratio: unit(sharpe_ratio),
            win_rate: unit(win_rate),
            market_stability: unit(market_stability),
            excess_return: unit(excess_return),
        };
        let score = unit(
            0.3 * breakdown.sharpe_ratio
                + 0.3 * breakdown.win_rate
                + 0.2 * breakdown.market_stability
                + 0.2 * breakdown.excess_return,
        );

        ComponentScore { score, breakdown }
    }
}

/// Clamp into [0, 1]; undefined values score 0.
fn unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
