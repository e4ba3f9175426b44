use analysis_core::{AnalysisError, AnalysisResult, Bar};
use serde::{Deserialize, Serialize};

use crate::indicators::*;
use crate::signals::generate_signals;

/// One dated row of the indicator table: the OHLCV bar plus every derived
/// column and the trading signal. All values are gap-filled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRow {
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub sma_50: f64,
    pub sma_200: f64,
    pub ema_20: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_histogram: f64,
    pub rsi: f64,
    pub stoch_k: f64,
    pub stoch_d: f64,
    pub bb_upper: f64,
    pub bb_middle: f64,
    pub bb_lower: f64,
    pub bb_width: f64,
    pub obv: f64,
    pub adi: f64,
    pub upper_channel: f64,
    pub lower_channel: f64,
    /// Close-to-close return. Row 0 has no prior close and carries the
    /// row-1 return like every other warm-up gap; backtest records use 0
    /// for that day instead.
    pub daily_return: f64,
    pub volatility: f64,
    pub adx: f64,
    pub trend_strength: f64,
    pub signal: i8,
}

/// Indicator table in input order. Serializes as a list of records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndicatorTable {
    pub rows: Vec<IndicatorRow>,
}

impl IndicatorTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn last(&self) -> Option<&IndicatorRow> {
        self.rows.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.volume).collect()
    }

    pub fn volatilities(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.volatility).collect()
    }

    pub fn signals(&self) -> Vec<i8> {
        self.rows.iter().map(|r| r.signal).collect()
    }

    /// True when every close equals the first one.
    pub fn is_flat(&self) -> bool {
        match self.rows.first() {
            Some(first) => self.rows.iter().all(|r| r.close == first.close),
            None => true,
        }
    }
}

/// Window lengths for the derived columns.
#[derive(Debug, Clone)]
pub struct IndicatorConfig {
    pub short_ma: usize,
    pub long_ma: usize,
    pub ema: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub rsi: usize,
    pub stoch_k: usize,
    pub stoch_d: usize,
    pub bollinger: usize,
    pub bollinger_std: f64,
    pub channel: usize,
    pub volatility: usize,
    pub adx: usize,
    pub trading_days: f64,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            short_ma: 50,
            long_ma: 200,
            ema: 20,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            rsi: 14,
            stoch_k: 14,
            stoch_d: 3,
            bollinger: 20,
            bollinger_std: 2.0,
            channel: 20,
            volatility: 20,
            adx: 14,
            trading_days: 252.0,
        }
    }
}

/// Turns an OHLCV series into a gap-free indicator table with signals.
#[derive(Debug, Clone, Default)]
pub struct IndicatorEngine {
    config: IndicatorConfig,
}

impl IndicatorEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: IndicatorConfig) -> Self {
        Self { config }
    }

    pub fn compute(&self, bars: &[Bar]) -> AnalysisResult<IndicatorTable> {
        validate(bars)?;
        let cfg = &self.config;

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

        let sma_50 = sma(&closes, cfg.short_ma);
        let sma_200 = sma(&closes, cfg.long_ma);
        let ema_20 = fill_gaps(ema(&closes, cfg.ema));
        let macd_result = macd(&closes, cfg.macd_fast, cfg.macd_slow, cfg.macd_signal);
        let rsi_values = fill_gaps(rsi(&closes, cfg.rsi));
        let stoch = stochastic(bars, cfg.stoch_k, cfg.stoch_d);
        let bb = bollinger_bands(&closes, cfg.bollinger, cfg.bollinger_std);
        let obv_values = obv(bars);
        let adi_values = adi(bars);
        let (upper_channel, lower_channel) = price_channels(bars, cfg.channel);
        let returns = daily_returns(&closes);
        let volatility = fill_gaps(rolling_volatility(&returns, cfg.volatility, cfg.trading_days));
        let adx_result = adx(bars, cfg.adx);
        let trend = fill_gaps(trend_strength(&sma_50, &sma_200));

        let macd_line = fill_gaps(macd_result.macd_line);
        let macd_signal = fill_gaps(macd_result.signal_line);
        let macd_histogram = fill_gaps(macd_result.histogram);
        let stoch_k = fill_gaps(stoch.k);
        let stoch_d = fill_gaps(stoch.d);
        let bb_upper = fill_gaps(bb.upper);
        let bb_middle = fill_gaps(bb.middle);
        let bb_lower = fill_gaps(bb.lower);
        let bb_width = fill_gaps(bb.width);
        let daily_return = fill_gaps(returns);

        let mut rows: Vec<IndicatorRow> = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| IndicatorRow {
                date: bar.date(),
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
                sma_50: sma_50[i],
                sma_200: sma_200[i],
                ema_20: ema_20[i],
                macd: macd_line[i],
                macd_signal: macd_signal[i],
                macd_histogram: macd_histogram[i],
                rsi: rsi_values[i],
                stoch_k: stoch_k[i],
                stoch_d: stoch_d[i],
                bb_upper: bb_upper[i],
                bb_middle: bb_middle[i],
                bb_lower: bb_lower[i],
                bb_width: bb_width[i],
                obv: obv_values[i],
                adi: adi_values[i],
                upper_channel: upper_channel[i],
                lower_channel: lower_channel[i],
                daily_return: daily_return[i],
                volatility: volatility[i],
                adx: adx_result.adx[i],
                trend_strength: trend[i],
                signal: 0,
            })
            .collect();

        let signals = generate_signals(&rows);
        for (row, signal) in rows.iter_mut().zip(signals) {
            row.signal = signal;
        }

        tracing::debug!("Computed indicator table with {} rows", rows.len());
        Ok(IndicatorTable { rows })
    }
}

fn validate(bars: &[Bar]) -> AnalysisResult<()> {
    if bars.is_empty() {
        return Err(AnalysisError::InvalidInput(
            "At least one bar is required to compute indicators".to_string(),
        ));
    }
    if let Some(bad) = bars
        .iter()
        .find(|b| ![b.open, b.high, b.low, b.close, b.volume].iter().all(|v| v.is_finite()))
    {
        return Err(AnalysisError::InvalidInput(format!(
            "Non-finite value in bar dated {}",
            bad.date()
        )));
    }
    if let Some(pair) = bars.windows(2).find(|w| w[1].timestamp <= w[0].timestamp) {
        return Err(AnalysisError::InvalidInput(format!(
            "Bars must be strictly increasing in time ({} follows {})",
            pair[1].date(),
            pair[0].date()
        )));
    }
    Ok(())
}
