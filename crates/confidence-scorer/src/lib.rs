//! Confidence Scorer
//!
//! Maps the indicator table, Monte Carlo output and backtest metrics into
//! technical, statistical and market sub-scores plus a weighted overall score,
//! all in [0, 1].

pub mod scorer;
pub mod skewtest;

pub use scorer::{
    ComponentScore, ConfidenceLevel, ConfidenceReport, ConfidenceScorer, ConfidenceWeights,
    MarketBreakdown, StatisticalBreakdown, TechnicalBreakdown,
};
pub use skewtest::{skewtest, SkewTest};
