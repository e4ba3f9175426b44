use analysis_core::stats::{mean, percentile_sorted, sort_floats, std_dev};
use analysis_core::{AnalysisError, AnalysisResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand::distributions::Distribution;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;
use statrs::statistics::Statistics;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloConfig {
    pub trials: usize,
    /// Forecast length in trading days.
    pub horizon: usize,
    /// Fixed seed for reproducible ensembles; fresh entropy when `None`.
    pub seed: Option<u64>,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            trials: 1000,
            horizon: 252,
            seed: None,
        }
    }
}

/// Geometric Brownian motion projection from the last observed close.
#[derive(Debug, Clone, Default)]
pub struct MonteCarloSimulator {
    config: MonteCarloConfig,
}

/// Daily log-return drift and volatility estimated from history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftEstimate {
    pub mu: f64,
    pub sigma: f64,
}

/// Simulated closing prices. Each path starts at the last observed close
/// (day 0) and runs `horizon` days.
#[derive(Debug, Clone)]
pub struct SimulationEnsemble {
    pub last_price: f64,
    pub drift: DriftEstimate,
    paths: Vec<Vec<f64>>,
}

/// Per-day series across trials, indexed by forecast day 0..=horizon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationSummary {
    pub mean_path: Vec<f64>,
    /// 95th percentile path
    pub upper_95: Vec<f64>,
    /// 5th percentile path
    pub lower_95: Vec<f64>,
    pub max_path: Vec<f64>,
    pub min_path: Vec<f64>,
}

/// Risk metrics over terminal returns relative to the last close.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub var_95: f64,
    pub var_99: f64,
    pub expected_shortfall: f64,
    pub expected_return: f64,
    pub return_volatility: f64,
}

impl MonteCarloSimulator {
    pub fn new(config: MonteCarloConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MonteCarloConfig {
        &self.config
    }

    /// Run the ensemble from a close series (oldest first).
    pub fn simulate(&self, closes: &[f64]) -> AnalysisResult<SimulationEnsemble> {
        let MonteCarloConfig { trials, horizon, seed } = self.config;
        if trials == 0 || horizon == 0 {
            return Err(AnalysisError::InvalidInput(
                "Monte Carlo needs at least one trial and one forecast day".to_string(),
            ));
        }

        let last_price = *closes
            .last()
            .ok_or_else(|| AnalysisError::InvalidInput("No closing prices to simulate from".to_string()))?;
        let drift = estimate_drift(closes)?;

        let standard = Normal::new(0.0, 1.0).map_err(|e| AnalysisError::Computation(e.to_string()))?;

        // One seed per trial, drawn in order from the master generator.
        let mut master = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let trial_seeds: Vec<u64> = (0..trials).map(|_| master.gen()).collect();

        let paths: Vec<Vec<f64>> = trial_seeds
            .par_iter()
            .map(|&trial_seed| {
                let mut rng = StdRng::seed_from_u64(trial_seed);
                let mut path = Vec::with_capacity(horizon + 1);
                let mut price = last_price;
                path.push(price);
                for _ in 0..horizon {
                    let shock = drift.mu + drift.sigma * standard.sample(&mut rng);
                    price *= shock.exp();
                    path.push(price);
                }
                path
            })
            .collect();

        tracing::debug!(
            "Simulated {} paths over {} days (mu={:.6}, sigma={:.6})",
            trials,
            horizon,
            drift.mu,
            drift.sigma
        );

        Ok(SimulationEnsemble {
            last_price,
            drift,
            paths,
        })
    }
}

/// Mean and sample standard deviation of daily log returns. A single close
/// gives a flat projection.
pub fn estimate_drift(closes: &[f64]) -> AnalysisResult<DriftEstimate> {
    if let Some(bad) = closes.iter().find(|c| !(c.is_finite() && **c > 0.0)) {
        return Err(AnalysisError::InvalidInput(format!(
            "Closing prices must be positive, got {}",
            bad
        )));
    }

    let log_returns: Vec<f64> = closes.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
    let (mu, sigma) = match log_returns.len() {
        0 => (0.0, 0.0),
        1 => (log_returns[0], 0.0),
        _ => (log_returns.iter().mean(), log_returns.iter().std_dev()),
    };

    Ok(DriftEstimate { mu, sigma })
}

impl SimulationEnsemble {
    pub fn trials(&self) -> usize {
        self.paths.len()
    }

    pub fn horizon(&self) -> usize {
        self.paths.first().map(|p| p.len() - 1).unwrap_or(0)
    }

    /// Simulated prices of every trial on forecast day `day`.
    pub fn day(&self, day: usize) -> Vec<f64> {
        self.paths.iter().filter_map(|p| p.get(day).copied()).collect()
    }

    pub fn terminal_prices(&self) -> Vec<f64> {
        self.paths.iter().filter_map(|p| p.last().copied()).collect()
    }

    pub fn terminal_returns(&self) -> Vec<f64> {
        self.terminal_prices()
            .into_iter()
            .map(|p| (p - self.last_price) / self.last_price)
            .collect()
    }

    /// Per-day mean, 5th/95th percentiles and extremes across trials. Day 0
    /// is the last observed close in every series.
    pub fn summary(&self) -> SimulationSummary {
        let start = self.last_price;
        let per_day: Vec<(f64, f64, f64, f64, f64)> = (0..=self.horizon())
            .into_par_iter()
            .map(|d| {
                if d == 0 {
                    return (start, start, start, start, start);
                }
                let mut prices = self.day(d);
                sort_floats(&mut prices);
                (
                    mean(&prices),
                    percentile_sorted(&prices, 95.0),
                    percentile_sorted(&prices, 5.0),
                    prices.last().copied().unwrap_or(0.0),
                    prices.first().copied().unwrap_or(0.0),
                )
            })
            .collect();

        let mut summary = SimulationSummary::default();
        for (avg, upper, lower, max, min) in per_day {
            summary.mean_path.push(avg);
            summary.upper_95.push(upper);
            summary.lower_95.push(lower);
            summary.max_path.push(max);
            summary.min_path.push(min);
        }
        summary
    }

    pub fn risk_metrics(&self) -> RiskMetrics {
        let mut returns = self.terminal_returns();
        sort_floats(&mut returns);

        let var_95 = percentile_sorted(&returns, 5.0);
        let var_99 = percentile_sorted(&returns, 1.0);
        let tail: Vec<f64> = returns.iter().copied().filter(|r| *r <= var_95).collect();

        RiskMetrics {
            var_95,
            var_99,
            expected_shortfall: mean(&tail),
            expected_return: mean(&returns),
            return_volatility: std_dev(&returns),
        }
    }
}
