use serde::{Deserialize, Serialize};

/// Configuration for a backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    /// Annual risk-free rate subtracted from the total return in the Sharpe ratio.
    pub risk_free_rate: f64,
    pub trading_days: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            risk_free_rate: 0.02,
            trading_days: 252.0,
        }
    }
}

/// One dated step of the replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRecord {
    pub date: String,
    /// Signal held at the close of this date: -1 short, 0 flat, 1 long.
    pub position: i8,
    /// Close-to-close return; 0 on the first date, which has no prior close.
    pub market_return: f64,
    pub strategy_return: f64,
    pub cum_market_return: f64,
    pub cum_strategy_return: f64,
    pub portfolio_value: f64,
    pub drawdown: f64,
}

/// Summary performance of a completed replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestMetrics {
    pub total_return: f64,
    pub market_return: f64,
    pub excess_return: f64,
    pub sharpe_ratio: f64,
    /// Most negative peak-to-trough change, <= 0.
    pub max_drawdown: f64,
    /// Share of positive returns among nonzero strategy returns, 0-1.
    pub win_rate: f64,
    pub final_portfolio_value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub initial_capital: f64,
    pub metrics: BacktestMetrics,
    pub records: Vec<BacktestRecord>,
}
