use analysis_core::Bar;

/// A derived column aligned with its input: one slot per row, `None` during
/// warm-up or where the value is undefined.
pub type Series = Vec<Option<f64>>;

/// Simple Moving Average with a window that shrinks over the first
/// `period - 1` rows, so every row has a value.
pub fn sma(data: &[f64], period: usize) -> Vec<f64> {
    let period = period.max(1);
    let mut result = Vec::with_capacity(data.len());
    let mut sum = 0.0;

    for i in 0..data.len() {
        sum += data[i];
        if i >= period {
            sum -= data[i - period];
        }
        let n = (i + 1).min(period);
        result.push(sum / n as f64);
    }
    result
}

/// Exponential Moving Average seeded with the first observation.
/// Values before the `period`-th observation are `None`.
pub fn ema(data: &[f64], period: usize) -> Series {
    let observed: Series = data.iter().map(|&v| Some(v)).collect();
    ema_of(&observed, period)
}

/// EMA over the observations of a series that may start with gaps. The
/// smoothing starts at the first present value and the warm-up counts
/// observations rather than rows.
fn ema_of(data: &[Option<f64>], period: usize) -> Series {
    let period = period.max(1);
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut result = Vec::with_capacity(data.len());
    let mut current: Option<f64> = None;
    let mut seen = 0usize;

    for value in data {
        if let Some(v) = value {
            seen += 1;
            current = Some(match current {
                Some(prev) => alpha * v + (1.0 - alpha) * prev,
                None => *v,
            });
        }
        result.push(if seen >= period { current } else { None });
    }
    result
}

/// Relative Strength Index with Wilder smoothing (alpha = 1 / period).
pub fn rsi(data: &[f64], period: usize) -> Series {
    let period = period.max(1);
    let alpha = 1.0 / period as f64;
    let mut result = Vec::with_capacity(data.len());
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;

    for i in 0..data.len() {
        let change = if i == 0 { 0.0 } else { data[i] - data[i - 1] };
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);

        if i == 0 {
            avg_gain = gain;
            avg_loss = loss;
        } else {
            avg_gain = alpha * gain + (1.0 - alpha) * avg_gain;
            avg_loss = alpha * loss + (1.0 - alpha) * avg_loss;
        }

        if i + 1 < period {
            result.push(None);
            continue;
        }

        let value = if avg_gain == 0.0 && avg_loss == 0.0 {
            50.0
        } else if avg_loss == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
        };
        result.push(Some(value));
    }

    result
}

/// MACD result
#[derive(Debug, Clone)]
pub struct MacdResult {
    pub macd_line: Series,
    pub signal_line: Series,
    pub histogram: Series,
}

/// Moving Average Convergence Divergence
pub fn macd(data: &[f64], fast_period: usize, slow_period: usize, signal_period: usize) -> MacdResult {
    let fast = ema(data, fast_period);
    let slow = ema(data, slow_period);

    let macd_line: Series = fast
        .iter()
        .zip(&slow)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();
    let signal_line = ema_of(&macd_line, signal_period);
    let histogram = macd_line
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| Some((*m)? - (*s)?))
        .collect();

    MacdResult {
        macd_line,
        signal_line,
        histogram,
    }
}

/// Bollinger Bands result
#[derive(Debug, Clone)]
pub struct BollingerBands {
    pub upper: Series,
    pub middle: Series,
    pub lower: Series,
    /// (upper - lower) / middle
    pub width: Series,
}

/// Bollinger Bands over a full window, using the population standard deviation.
pub fn bollinger_bands(data: &[f64], period: usize, std_dev: f64) -> BollingerBands {
    let period = period.max(1);
    let n = data.len();
    let mut upper = Vec::with_capacity(n);
    let mut middle = Vec::with_capacity(n);
    let mut lower = Vec::with_capacity(n);
    let mut width = Vec::with_capacity(n);

    for i in 0..n {
        if i + 1 < period {
            upper.push(None);
            middle.push(None);
            lower.push(None);
            width.push(None);
            continue;
        }
        let window = &data[i + 1 - period..=i];
        let mid = window.iter().sum::<f64>() / period as f64;
        let variance = window.iter().map(|x| (x - mid).powi(2)).sum::<f64>() / period as f64;
        let band = std_dev * variance.sqrt();

        upper.push(Some(mid + band));
        middle.push(Some(mid));
        lower.push(Some(mid - band));
        width.push(if mid != 0.0 { Some(2.0 * band / mid) } else { None });
    }

    BollingerBands {
        upper,
        middle,
        lower,
        width,
    }
}

/// Stochastic Oscillator result
#[derive(Debug, Clone)]
pub struct StochasticResult {
    pub k: Series,
    pub d: Series,
}

/// Stochastic Oscillator. %K is 50 when the window's range is empty.
pub fn stochastic(bars: &[Bar], k_period: usize, d_period: usize) -> StochasticResult {
    let k_period = k_period.max(1);
    let d_period = d_period.max(1);
    let mut k = Vec::with_capacity(bars.len());

    for i in 0..bars.len() {
        if i + 1 < k_period {
            k.push(None);
            continue;
        }
        let window = &bars[i + 1 - k_period..=i];
        let highest = window.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
        let lowest = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);

        let value = if highest == lowest {
            50.0
        } else {
            (100.0 * (bars[i].close - lowest) / (highest - lowest)).clamp(0.0, 100.0)
        };
        k.push(Some(value));
    }

    let mut d = Vec::with_capacity(k.len());
    for i in 0..k.len() {
        if i + 1 < d_period {
            d.push(None);
            continue;
        }
        let window: Option<Vec<f64>> = k[i + 1 - d_period..=i].iter().copied().collect();
        d.push(window.map(|w| w.iter().sum::<f64>() / d_period as f64));
    }

    StochasticResult { k, d }
}

/// On-Balance Volume: starts at the first bar's volume, adds volume on up
/// closes, subtracts on down closes, carries over on flat closes.
pub fn obv(bars: &[Bar]) -> Vec<f64> {
    if bars.is_empty() {
        return vec![];
    }

    let mut obv_values = Vec::with_capacity(bars.len());
    let mut current_obv = bars[0].volume;
    obv_values.push(current_obv);

    for i in 1..bars.len() {
        if bars[i].close > bars[i - 1].close {
            current_obv += bars[i].volume;
        } else if bars[i].close < bars[i - 1].close {
            current_obv -= bars[i].volume;
        }
        obv_values.push(current_obv);
    }

    obv_values
}

/// Accumulation/Distribution Index. The money-flow multiplier is 0 on bars
/// with no range.
pub fn adi(bars: &[Bar]) -> Vec<f64> {
    let mut total = 0.0;
    bars.iter()
        .map(|b| {
            let range = b.high - b.low;
            let clv = if range != 0.0 {
                ((b.close - b.low) - (b.high - b.close)) / range
            } else {
                0.0
            };
            total += clv * b.volume;
            total
        })
        .collect()
}

/// Simple period-over-period returns; the first row has none.
pub fn daily_returns(data: &[f64]) -> Series {
    (0..data.len())
        .map(|i| {
            if i == 0 || data[i - 1] == 0.0 {
                None
            } else {
                Some(data[i] / data[i - 1] - 1.0)
            }
        })
        .collect()
}

/// Annualized rolling volatility: sample standard deviation of the returns
/// present in each trailing window, scaled by sqrt(periods_per_year).
pub fn rolling_volatility(returns: &[Option<f64>], window: usize, periods_per_year: f64) -> Series {
    let window = window.max(1);
    (0..returns.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let present: Vec<f64> = returns[start..=i].iter().flatten().copied().collect();
            if present.len() < 2 {
                return None;
            }
            Some(analysis_core::stats::std_dev(&present) * periods_per_year.sqrt())
        })
        .collect()
}

/// Trailing mean over up to `window` rows, skipping gaps. `None` when the
/// window holds no values.
fn rolling_mean_present(data: &[Option<f64>], window: usize) -> Series {
    let window = window.max(1);
    (0..data.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let present: Vec<f64> = data[start..=i].iter().flatten().copied().collect();
            if present.is_empty() {
                None
            } else {
                Some(present.iter().sum::<f64>() / present.len() as f64)
            }
        })
        .collect()
}

/// ADX result
#[derive(Debug, Clone)]
pub struct AdxResult {
    pub adx: Vec<f64>,
    pub plus_di: Series,
    pub minus_di: Series,
}

/// Average Directional Index. Smoothing is a trailing mean over `period`
/// rows. Zero denominators leave DI/DX undefined; DX gaps are filled before
/// the final average, so ADX is defined on every row.
pub fn adx(bars: &[Bar], period: usize) -> AdxResult {
    let n = bars.len();
    let mut tr: Series = Vec::with_capacity(n);
    let mut plus_dm: Series = Vec::with_capacity(n);
    let mut minus_dm: Series = Vec::with_capacity(n);

    for i in 0..n {
        if i == 0 {
            tr.push(None);
            plus_dm.push(Some(0.0));
            minus_dm.push(Some(0.0));
            continue;
        }
        let (cur, prev) = (&bars[i], &bars[i - 1]);
        let range = (cur.high - cur.low)
            .max((cur.high - prev.close).abs())
            .max((cur.low - prev.close).abs());
        tr.push(Some(range));

        let up_move = cur.high - prev.high;
        let down_move = prev.low - cur.low;
        plus_dm.push(Some(if up_move > down_move { up_move.max(0.0) } else { 0.0 }));
        minus_dm.push(Some(if down_move > up_move { down_move.max(0.0) } else { 0.0 }));
    }

    let atr = rolling_mean_present(&tr, period);
    let plus_smoothed = rolling_mean_present(&plus_dm, period);
    let minus_smoothed = rolling_mean_present(&minus_dm, period);

    let directional = |dm: &Series| -> Series {
        dm.iter()
            .zip(&atr)
            .map(|(d, a)| match (d, a) {
                (Some(d), Some(a)) if *a != 0.0 => Some(100.0 * d / a),
                _ => None,
            })
            .collect()
    };
    let plus_di = directional(&plus_smoothed);
    let minus_di = directional(&minus_smoothed);

    let dx: Series = plus_di
        .iter()
        .zip(&minus_di)
        .map(|(p, m)| match (p, m) {
            (Some(p), Some(m)) if p + m != 0.0 => Some(100.0 * (p - m).abs() / (p + m)),
            _ => None,
        })
        .collect();

    let dx_filled: Series = fill_gaps(dx).into_iter().map(Some).collect();
    let adx = rolling_mean_present(&dx_filled, period)
        .into_iter()
        .map(|v| v.unwrap_or(0.0))
        .collect();

    AdxResult {
        adx,
        plus_di,
        minus_di,
    }
}

/// |short - long| / long, undefined when the long average is 0.
pub fn trend_strength(short_ma: &[f64], long_ma: &[f64]) -> Series {
    short_ma
        .iter()
        .zip(long_ma)
        .map(|(s, l)| if *l != 0.0 { Some((s - l).abs() / l) } else { None })
        .collect()
}

/// Rolling highest high and lowest low over up to `window` rows.
pub fn price_channels(bars: &[Bar], window: usize) -> (Vec<f64>, Vec<f64>) {
    let window = window.max(1);
    let mut upper = Vec::with_capacity(bars.len());
    let mut lower = Vec::with_capacity(bars.len());

    for i in 0..bars.len() {
        let start = (i + 1).saturating_sub(window);
        let slice = &bars[start..=i];
        upper.push(slice.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max));
        lower.push(slice.iter().map(|b| b.low).fold(f64::INFINITY, f64::min));
    }

    (upper, lower)
}

/// Replace gaps (and non-finite values) by carrying the last value forward,
/// then the first value backward, then 0.
pub fn fill_gaps(series: Series) -> Vec<f64> {
    let mut carried: Series = Vec::with_capacity(series.len());
    let mut last = None;
    for value in series {
        let value = value.filter(|v| v.is_finite());
        if value.is_some() {
            last = value;
        }
        carried.push(last);
    }

    let first = carried.iter().flatten().next().copied().unwrap_or(0.0);
    carried.into_iter().map(|v| v.unwrap_or(first)).collect()
}
