use analysis_core::stats::std_dev;
use analysis_core::{AnalysisError, AnalysisResult};
use technical_analysis::IndicatorTable;

use crate::models::*;

/// Replays a per-date signal series as a long/short/flat position against
/// close-to-close returns.
#[derive(Debug, Clone, Default)]
pub struct SignalBacktester {
    config: BacktestConfig,
}

impl SignalBacktester {
    pub fn new(config: BacktestConfig) -> Self {
        Self { config }
    }

    pub fn with_capital(initial_capital: f64) -> Self {
        Self::new(BacktestConfig {
            initial_capital,
            ..BacktestConfig::default()
        })
    }

    /// Backtest the signals carried by an indicator table.
    pub fn run_table(&self, table: &IndicatorTable) -> AnalysisResult<BacktestResult> {
        let dates: Vec<String> = table.rows.iter().map(|r| r.date.clone()).collect();
        self.run(&dates, &table.closes(), &table.signals())
    }

    /// The return realized on date t is the position taken at t-1 times the
    /// market return of t, so a signal never trades on its own bar.
    pub fn run(&self, dates: &[String], closes: &[f64], signals: &[i8]) -> AnalysisResult<BacktestResult> {
        let capital = self.config.initial_capital;
        if !(capital.is_finite() && capital > 0.0) {
            return Err(AnalysisError::InvalidInput(format!(
                "Initial capital must be positive, got {}",
                capital
            )));
        }
        if dates.len() != closes.len() || closes.len() != signals.len() {
            return Err(AnalysisError::InvalidInput(format!(
                "Length mismatch: {} dates, {} closes, {} signals",
                dates.len(),
                closes.len(),
                signals.len()
            )));
        }
        if closes.is_empty() {
            return Err(AnalysisError::InvalidInput("Nothing to backtest".to_string()));
        }

        let n = closes.len();
        let mut market_returns = Vec::with_capacity(n);
        let mut strategy_returns = Vec::with_capacity(n);
        for i in 0..n {
            if i == 0 {
                market_returns.push(0.0);
                strategy_returns.push(0.0);
                continue;
            }
            let market = if closes[i - 1] != 0.0 {
                closes[i] / closes[i - 1] - 1.0
            } else {
                0.0
            };
            market_returns.push(market);
            strategy_returns.push(signals[i - 1] as f64 * market);
        }

        let mut records = Vec::with_capacity(n);
        let mut cum_market = 1.0;
        let mut cum_strategy = 1.0;
        let mut peak = f64::NEG_INFINITY;
        let mut max_drawdown = 0.0_f64;

        for i in 0..n {
            cum_market *= 1.0 + market_returns[i];
            cum_strategy *= 1.0 + strategy_returns[i];
            let portfolio_value = capital * cum_strategy;
            peak = peak.max(portfolio_value);
            let drawdown = if peak != 0.0 { portfolio_value / peak - 1.0 } else { 0.0 };
            max_drawdown = max_drawdown.min(drawdown);

            records.push(BacktestRecord {
                date: dates[i].clone(),
                position: signals[i],
                market_return: market_returns[i],
                strategy_return: strategy_returns[i],
                cum_market_return: cum_market,
                cum_strategy_return: cum_strategy,
                portfolio_value,
                drawdown,
            });
        }

        let total_return = cum_strategy - 1.0;
        let market_return = cum_market - 1.0;

        let volatility = std_dev(&strategy_returns) * self.config.trading_days.sqrt();
        let sharpe_ratio = if volatility > 0.0 && volatility.is_finite() {
            (total_return - self.config.risk_free_rate) / volatility
        } else {
            0.0
        };

        let active = strategy_returns.iter().filter(|r| **r != 0.0).count();
        let wins = strategy_returns.iter().filter(|r| **r > 0.0).count();
        let win_rate = if active > 0 { wins as f64 / active as f64 } else { 0.0 };

        let metrics = BacktestMetrics {
            total_return,
            market_return,
            excess_return: total_return - market_return,
            sharpe_ratio,
            max_drawdown,
            win_rate,
            final_portfolio_value: capital * cum_strategy,
        };

        tracing::debug!(
            "Backtest over {} rows: total {:.4}, market {:.4}, sharpe {:.3}",
            n,
            total_return,
            market_return,
            sharpe_ratio
        );

        Ok(BacktestResult {
            initial_capital: capital,
            metrics,
            records,
        })
    }
}
