use crate::table::IndicatorRow;

pub const RSI_OVERSOLD: f64 = 30.0;
pub const RSI_OVERBOUGHT: f64 = 70.0;

/// Signed vote of the four indicator rules for one row: RSI extremes, MACD
/// against its signal line, the 50/200 average cross and Bollinger breakouts.
pub fn vote(row: &IndicatorRow) -> i32 {
    let mut votes = 0;

    if row.rsi < RSI_OVERSOLD {
        votes += 1;
    } else if row.rsi > RSI_OVERBOUGHT {
        votes -= 1;
    }

    votes += cmp_vote(row.macd, row.macd_signal);
    votes += cmp_vote(row.sma_50, row.sma_200);

    if row.close < row.bb_lower {
        votes += 1;
    } else if row.close > row.bb_upper {
        votes -= 1;
    }

    votes
}

/// Trading signal in {-1, 0, 1}: the sign of the vote sum.
pub fn signal(row: &IndicatorRow) -> i8 {
    vote(row).signum() as i8
}

/// Signal series for a whole table, one entry per row.
pub fn generate_signals(rows: &[IndicatorRow]) -> Vec<i8> {
    rows.iter().map(signal).collect()
}

fn cmp_vote(a: f64, b: f64) -> i32 {
    if a > b {
        1
    } else if a < b {
        -1
    } else {
        0
    }
}
