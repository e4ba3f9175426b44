use analysis_core::{AnalysisError, AnalysisResult, Bar};
use backtest_engine::{BacktestConfig, BacktestResult, SignalBacktester};
use confidence_scorer::{ConfidenceReport, ConfidenceScorer};
use quant_analysis::{DriftEstimate, MonteCarloConfig, MonteCarloSimulator, RiskMetrics, SimulationSummary};
use serde::{Deserialize, Serialize};
use technical_analysis::{IndicatorEngine, IndicatorTable};

/// Knobs for one analysis request. Every field has a sensible default so a
/// caller only overrides what it cares about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub lookback_days: i64,
    pub trials: usize,
    pub horizon: usize,
    pub initial_capital: f64,
    /// Fixed Monte Carlo seed; fresh entropy per request when `None`.
    pub seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let mc = MonteCarloConfig::default();
        Self {
            lookback_days: 365,
            trials: mc.trials,
            horizon: mc.horizon,
            initial_capital: BacktestConfig::default().initial_capital,
            seed: None,
        }
    }
}

/// Everything computed for one symbol in one request.
#[derive(Debug, Clone, Serialize)]
pub struct FullAnalysis {
    pub symbol: String,
    pub indicators: IndicatorTable,
    pub drift: DriftEstimate,
    pub simulation: SimulationSummary,
    pub risk_metrics: RiskMetrics,
    pub backtest: BacktestResult,
    pub confidence: ConfidenceReport,
}

/// Indicators → Monte Carlo → backtest → confidence, all request-scoped.
#[derive(Debug, Clone)]
pub struct AnalysisPipeline {
    engine: IndicatorEngine,
    simulator: MonteCarloSimulator,
    backtester: SignalBacktester,
    scorer: ConfidenceScorer,
}

impl AnalysisPipeline {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            engine: IndicatorEngine::new(),
            simulator: MonteCarloSimulator::new(MonteCarloConfig {
                trials: config.trials,
                horizon: config.horizon,
                seed: config.seed,
            }),
            backtester: SignalBacktester::with_capital(config.initial_capital),
            scorer: ConfidenceScorer::default(),
        }
    }

    pub fn indicators(&self, bars: &[Bar]) -> AnalysisResult<IndicatorTable> {
        self.engine.compute(bars)
    }

    /// Runs every stage; the first failing stage aborts the whole analysis.
    pub fn run(&self, symbol: &str, bars: &[Bar]) -> AnalysisResult<FullAnalysis> {
        if bars.is_empty() {
            return Err(AnalysisError::DataUnavailable(format!("No data found for symbol {}", symbol)));
        }

        let indicators = self.engine.compute(bars)?;
        let ensemble = self.simulator.simulate(&indicators.closes())?;
        let simulation = ensemble.summary();
        let risk_metrics = ensemble.risk_metrics();
        let backtest = self.backtester.run_table(&indicators)?;
        let confidence = self
            .scorer
            .score(&indicators, &simulation, &risk_metrics, &backtest.metrics)?;

        tracing::debug!(
            "{}: {} rows, sharpe {:.3}, confidence {:.3}",
            symbol,
            indicators.len(),
            backtest.metrics.sharpe_ratio,
            confidence.overall_confidence
        );

        Ok(FullAnalysis {
            symbol: symbol.to_string(),
            indicators,
            drift: ensemble.drift,
            simulation,
            risk_metrics,
            backtest,
            confidence,
        })
    }
}
