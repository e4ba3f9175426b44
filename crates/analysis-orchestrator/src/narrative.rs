use llm_client::{strip_reasoning, CompletionProvider, CompletionRequest, LlmResult};
use technical_analysis::IndicatorRow;

use crate::pipeline::FullAnalysis;

const FULL_SECTIONS: &str = "Please provide a comprehensive analysis including:
1. Overall Trend Analysis and Strength (with confidence assessment)
2. Momentum Analysis (RSI, Stochastic, MACD) and reliability
3. Volatility Assessment and Risk Levels
4. Monte Carlo Simulation Insights and Prediction Confidence
5. Backtesting Performance Analysis and Strategy Reliability
6. Support/Resistance Levels and Potential Breakouts
7. Short-term and Medium-term Technical Outlook
8. Trading Strategy Recommendations with Confidence Levels

For each analysis component, please indicate the confidence level and explain the factors contributing to that confidence assessment.";

const QUICK_SECTIONS: &str = "Please provide a detailed technical analysis including:
1. Overall Trend Analysis
2. Key Technical Signals
3. Support/Resistance Levels
4. Risk Assessment
5. Short-term Outlook";

/// Renders pipeline output into narrative prompts and sends them to the
/// narrative model.
#[derive(Clone)]
pub struct NarrativeBuilder {
    model: String,
}

impl NarrativeBuilder {
    pub fn new(model: impl Into<String>) -> Self {
        Self { model: model.into() }
    }

    pub fn full_prompt(symbol: &str, analysis: &FullAnalysis) -> String {
        let Some(row) = analysis.indicators.last() else {
            return format!("Comprehensive Technical Analysis for {}\n\n{}", symbol, FULL_SECTIONS);
        };
        let conf = &analysis.confidence;
        let tech = &conf.technical_confidence;
        let stat = &conf.statistical_confidence;
        let market = &conf.market_confidence;

        let mut prompt = format!(
            "Comprehensive Technical Analysis for {symbol}

Confidence Assessment:
- Overall Analysis Confidence: {:.2} ({})
- Technical Analysis Confidence: {:.2}
- Statistical Analysis Confidence: {:.2}
- Market Analysis Confidence: {:.2}

Key Confidence Factors:
- Trend Agreement: {:.2}
- Volume Confirmation: {:.2}
- Statistical Reliability: {:.2}
- Market Stability: {:.2}

Price Metrics:
- Current Price: ${:.2}
- Daily Return: {:.2}%
- Volume: {}

Moving Averages:
- 50-day MA: ${:.2}
- 200-day MA: ${:.2}
- 20-day EMA: ${:.2}

Momentum Indicators:
- RSI: {:.2}
- Stochastic K: {:.2}
- Stochastic D: {:.2}

Trend Indicators:
- MACD: {:.2}
- MACD Signal: {:.2}
- MACD Histogram: {:.2}
- ADX: {:.2}
- Trend Strength: {:.2}

Volatility Metrics:
- Current Volatility: {:.2}%
- Bollinger Width: {:.2}
- Upper BB: ${:.2}
- Lower BB: ${:.2}
",
            conf.overall_confidence,
            conf.interpretation,
            tech.score,
            stat.score,
            market.score,
            tech.breakdown.trend_agreement,
            tech.breakdown.volume_confidence,
            stat.breakdown.skewness,
            market.breakdown.market_stability,
            row.close,
            row.daily_return * 100.0,
            group_thousands(row.volume),
            row.sma_50,
            row.sma_200,
            row.ema_20,
            row.rsi,
            row.stoch_k,
            row.stoch_d,
            row.macd,
            row.macd_signal,
            row.macd_histogram,
            row.adx,
            row.trend_strength,
            row.volatility * 100.0,
            row.bb_width,
            row.bb_upper,
            row.bb_lower,
        );

        let sim = &analysis.simulation;
        if let (Some(mean), Some(lower), Some(upper)) =
            (sim.mean_path.last(), sim.lower_95.last(), sim.upper_95.last())
        {
            let risk = &analysis.risk_metrics;
            prompt.push_str(&format!(
                "
Monte Carlo Simulation Results:
- Expected Price ({} trading days): ${:.2}
- 95% Confidence Interval: ${:.2} to ${:.2}

Risk Metrics (Confidence: {:.2}):
- 95% VaR: {:.2}%
- 99% VaR: {:.2}%
- Expected Shortfall: {:.2}%
- Expected Return: {:.2}%
- Return Volatility: {:.2}%
",
                sim.mean_path.len().saturating_sub(1),
                mean,
                lower,
                upper,
                stat.score,
                risk.var_95 * 100.0,
                risk.var_99 * 100.0,
                risk.expected_shortfall * 100.0,
                risk.expected_return * 100.0,
                risk.return_volatility * 100.0,
            ));
        }

        let bt = &analysis.backtest.metrics;
        prompt.push_str(&format!(
            "
Backtesting Results (Confidence: {:.2}):
- Total Strategy Return: {:.2}%
- Market Return: {:.2}%
- Excess Return: {:.2}%
- Sharpe Ratio: {:.2}
- Maximum Drawdown: {:.2}%
- Win Rate: {:.2}%

{}",
            market.score,
            bt.total_return * 100.0,
            bt.market_return * 100.0,
            bt.excess_return * 100.0,
            bt.sharpe_ratio,
            bt.max_drawdown * 100.0,
            bt.win_rate * 100.0,
            FULL_SECTIONS,
        ));

        prompt
    }

    pub fn quick_prompt(symbol: &str, row: &IndicatorRow) -> String {
        format!(
            "Comprehensive Technical Analysis for {}

Current Metrics:
- Price: ${:.2}
- RSI: {:.2}
- MACD: {:.2}
- Volatility: {:.2}%

{}",
            symbol,
            row.close,
            row.rsi,
            row.macd,
            row.volatility * 100.0,
            QUICK_SECTIONS
        )
    }

    pub async fn narrate_full(
        &self,
        provider: &dyn CompletionProvider,
        symbol: &str,
        analysis: &FullAnalysis,
    ) -> LlmResult<String> {
        self.send(provider, Self::full_prompt(symbol, analysis), 4096).await
    }

    pub async fn narrate_quick(
        &self,
        provider: &dyn CompletionProvider,
        symbol: &str,
        row: &IndicatorRow,
    ) -> LlmResult<String> {
        self.send(provider, Self::quick_prompt(symbol, row), 2000).await
    }

    async fn send(&self, provider: &dyn CompletionProvider, prompt: String, max_tokens: u32) -> LlmResult<String> {
        let request = CompletionRequest::new(&self.model, prompt)
            .temperature(0.7)
            .max_tokens(max_tokens)
            .top_p(0.95);
        let raw = provider.complete(request).await?;
        Ok(strip_reasoning(&raw))
    }
}

/// `1234567.8` → `"1,234,568"`.
fn group_thousands(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if rounded < 0.0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{AnalysisPipeline, PipelineConfig};
    use crate::test_support::{trending_bars, ScriptedProvider};

    fn analysis() -> FullAnalysis {
        let config = PipelineConfig {
            trials: 100,
            horizon: 20,
            seed: Some(3),
            ..PipelineConfig::default()
        };
        AnalysisPipeline::new(&config)
            .run("MSFT", &trending_bars(80, 300.0, 0.8))
            .unwrap()
    }

    #[test]
    fn test_full_prompt_sections() {
        let analysis = analysis();
        let prompt = NarrativeBuilder::full_prompt("MSFT", &analysis);

        assert!(prompt.starts_with("Comprehensive Technical Analysis for MSFT"));
        assert!(prompt.contains(&format!("({})", analysis.confidence.interpretation)));
        assert!(prompt.contains("Monte Carlo Simulation Results:"));
        assert!(prompt.contains("- Expected Price (20 trading days): $"));
        assert!(prompt.contains("Backtesting Results (Confidence:"));
        assert!(prompt.contains("8. Trading Strategy Recommendations with Confidence Levels"));
    }

    #[test]
    fn test_quick_prompt() {
        let row = IndicatorRow {
            close: 187.456,
            rsi: 61.234,
            macd: -1.5,
            volatility: 0.2345,
            ..IndicatorRow::default()
        };
        let prompt = NarrativeBuilder::quick_prompt("AAPL", &row);
        assert!(prompt.contains("- Price: $187.46"));
        assert!(prompt.contains("- RSI: 61.23"));
        assert!(prompt.contains("- MACD: -1.50"));
        assert!(prompt.contains("- Volatility: 23.45%"));
        assert!(prompt.ends_with("5. Short-term Outlook"));
    }

    #[tokio::test]
    async fn test_narration_strips_reasoning() {
        let provider = ScriptedProvider::new("<think>checking RSI</think>\nUptrend intact.");
        let builder = NarrativeBuilder::new("narrative-model");

        let text = builder.narrate_full(provider.as_ref(), "MSFT", &analysis()).await.unwrap();
        assert_eq!(text, "Uptrend intact.");

        let req = provider.last();
        assert_eq!(req.model, "narrative-model");
        assert_eq!(req.max_tokens, 4096);
        assert_eq!(req.top_p, Some(0.95));
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0.0), "0");
        assert_eq!(group_thousands(999.4), "999");
        assert_eq!(group_thousands(1234567.8), "1,234,568");
        assert_eq!(group_thousands(-1000.0), "-1,000");
    }
}
