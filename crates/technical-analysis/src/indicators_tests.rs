#[cfg(test)]
mod tests {
    use super::super::indicators::*;
    use super::super::table::*;
    use analysis_core::{AnalysisError, Bar};
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone, Utc};

    // Helper function to create sample price data
    fn sample_prices() -> Vec<f64> {
        vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08,
            45.89, 46.03, 45.61, 46.28, 46.28, 46.00, 46.03, 46.41, 46.22, 45.64,
        ]
    }

    fn bars_from(ohlc: &[(f64, f64, f64, f64)], volume: f64) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
        ohlc.iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| Bar {
                timestamp: start + Duration::days(i as i64),
                open,
                high,
                low,
                close,
                volume,
            })
            .collect()
    }

    // Helper function to create sample bars
    fn sample_bars() -> Vec<Bar> {
        let prices: Vec<(f64, f64, f64, f64)> = (0..15)
            .map(|i| {
                let open = 100.0 + i as f64;
                (open, open + 2.0, open - 1.0, open + 1.0)
            })
            .collect();
        bars_from(&prices, 1_000_000.0)
    }

    /// A year of oscillating, drifting prices with varying volume.
    fn wave_bars(n: usize) -> Vec<Bar> {
        let ohlc: Vec<(f64, f64, f64, f64)> = (0..n)
            .map(|i| {
                let t = i as f64;
                let close = 100.0 + 0.05 * t + 8.0 * (t / 9.0).sin();
                let open = close - (t / 4.0).cos();
                (open, open.max(close) + 1.0, open.min(close) - 1.0, close)
            })
            .collect();
        let mut bars = bars_from(&ohlc, 0.0);
        for (i, bar) in bars.iter_mut().enumerate() {
            bar.volume = 1_000_000.0 + 50_000.0 * ((i % 7) as f64);
        }
        bars
    }

    fn flat_bars(n: usize) -> Vec<Bar> {
        bars_from(&vec![(100.0, 100.0, 100.0, 100.0); n], 0.0)
    }

    #[test]
    fn test_sma_shrinking_window() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = sma(&data, 3);

        assert_eq!(result.len(), 5);
        assert_relative_eq!(result[0], 1.0); // window of one
        assert_relative_eq!(result[1], 1.5); // (1+2)/2
        assert_relative_eq!(result[2], 2.0); // (1+2+3)/3
        assert_relative_eq!(result[4], 4.0); // (3+4+5)/3
    }

    #[test]
    fn test_ema_warm_up_and_seed() {
        let data = vec![1.0, 2.0, 3.0, 4.0];
        let result = ema(&data, 3);

        assert_eq!(result.len(), 4);
        assert!(result[0].is_none());
        assert!(result[1].is_none());
        // seeded at 1.0, alpha 0.5: 1.5, then 2.25
        assert_relative_eq!(result[2].unwrap(), 2.25);
        assert_relative_eq!(result[3].unwrap(), 3.125);
    }

    #[test]
    fn test_ema_empty_data() {
        assert!(ema(&[], 5).is_empty());
    }

    #[test]
    fn test_ema_increases_with_uptrend() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        let result: Vec<f64> = ema(&data, 3).into_iter().flatten().collect();

        assert_eq!(result.len(), 8);
        for i in 1..result.len() {
            assert!(result[i] > result[i - 1]);
        }
    }

    #[test]
    fn test_rsi_bounds_and_warm_up() {
        let prices = sample_prices();
        let result = rsi(&prices, 14);

        assert_eq!(result.len(), prices.len());
        assert!(result[12].is_none());
        assert!(result[13].is_some());
        for value in result.iter().flatten() {
            assert!((0.0..=100.0).contains(value));
        }
    }

    #[test]
    fn test_rsi_extremes() {
        let uptrend: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let downtrend: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();

        assert_relative_eq!(rsi(&uptrend, 14).last().unwrap().unwrap(), 100.0);
        assert_relative_eq!(rsi(&downtrend, 14).last().unwrap().unwrap(), 0.0);
    }

    #[test]
    fn test_rsi_no_movement_is_neutral() {
        let result = rsi(&[50.0; 20], 14);
        assert_relative_eq!(result.last().unwrap().unwrap(), 50.0);
    }

    #[test]
    fn test_macd_signal_counts_macd_observations() {
        let prices: Vec<f64> = (0..40).map(|i| 100.0 + (i as f64 / 3.0).sin()).collect();
        let result = macd(&prices, 12, 26, 9);

        assert_eq!(result.macd_line.len(), 40);
        assert!(result.macd_line[24].is_none());
        assert!(result.macd_line[25].is_some());
        assert!(result.signal_line[32].is_none());
        assert!(result.signal_line[33].is_some());

        // Histogram is macd_line - signal_line wherever both exist
        for i in 33..40 {
            let expected = result.macd_line[i].unwrap() - result.signal_line[i].unwrap();
            assert_relative_eq!(result.histogram[i].unwrap(), expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_bollinger_bands_ordering() {
        let prices = sample_prices();
        let result = bollinger_bands(&prices, 10, 2.0);

        assert!(result.upper[8].is_none());
        for i in 9..prices.len() {
            let (u, m, l) = (result.upper[i].unwrap(), result.middle[i].unwrap(), result.lower[i].unwrap());
            assert!(u > m && m > l);
            assert_relative_eq!(result.width[i].unwrap(), (u - l) / m, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_bollinger_uses_population_std() {
        let prices = vec![1.0, 2.0, 3.0, 4.0];
        let result = bollinger_bands(&prices, 4, 2.0);
        // population std of 1..4 is sqrt(1.25)
        assert_relative_eq!(result.upper[3].unwrap(), 2.5 + 2.0 * 1.25f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_bollinger_bands_flat_prices() {
        let result = bollinger_bands(&[100.0; 20], 10, 2.0);
        for i in 9..20 {
            assert_relative_eq!(result.width[i].unwrap(), 0.0);
        }
    }

    #[test]
    fn test_stochastic_bounds() {
        let bars = wave_bars(60);
        let result = stochastic(&bars, 14, 3);

        assert!(result.k[12].is_none());
        assert!(result.k[13].is_some());
        assert!(result.d[14].is_none());
        assert!(result.d[15].is_some());
        for value in result.k.iter().chain(result.d.iter()).flatten() {
            assert!((0.0..=100.0).contains(value));
        }
    }

    #[test]
    fn test_stochastic_empty_range_is_fifty() {
        let result = stochastic(&flat_bars(20), 14, 3);
        assert_relative_eq!(result.k[19].unwrap(), 50.0);
        assert_relative_eq!(result.d[19].unwrap(), 50.0);
    }

    #[test]
    fn test_obv_starts_at_first_volume() {
        let bars = sample_bars();
        let result = obv(&bars);

        assert_eq!(result.len(), bars.len());
        assert_relative_eq!(result[0], bars[0].volume);
    }

    #[test]
    fn test_obv_increases_on_up_days() {
        let bars = sample_bars();
        let result = obv(&bars);

        for i in 1..result.len() {
            assert!(result[i] > result[i - 1]);
        }
    }

    #[test]
    fn test_obv_decreases_on_down_days() {
        let mut bars = sample_bars();
        let n = bars.len();
        for (i, bar) in bars.iter_mut().enumerate() {
            bar.close = 200.0 - i as f64;
        }
        let result = obv(&bars);

        assert_eq!(result.len(), n);
        for i in 1..result.len() {
            assert!(result[i] < result[i - 1]);
        }
    }

    #[test]
    fn test_obv_unchanged_on_flat_days() {
        let result = obv(&flat_bars(5));
        assert!(result.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_adi_money_flow() {
        let bars = bars_from(
            &[
                (10.0, 12.0, 10.0, 12.0), // close at high: +volume
                (10.0, 10.0, 10.0, 10.0), // no range: 0
                (10.0, 12.0, 10.0, 10.0), // close at low: -volume
            ],
            100.0,
        );
        let result = adi(&bars);
        assert_eq!(result, vec![100.0, 100.0, 0.0]);
    }

    #[test]
    fn test_volatility_needs_two_returns() {
        let closes = vec![100.0, 101.0, 99.0, 102.0];
        let returns = daily_returns(&closes);
        let vol = rolling_volatility(&returns, 20, 252.0);

        assert!(returns[0].is_none());
        assert!(vol[0].is_none());
        assert!(vol[1].is_none());
        let expected = analysis_core::stats::std_dev(&[0.01, 99.0 / 101.0 - 1.0]) * 252f64.sqrt();
        assert_relative_eq!(vol[2].unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_adx_uptrend() {
        let ohlc: Vec<(f64, f64, f64, f64)> = (0..40)
            .map(|i| {
                let base = 100.0 + 2.0 * i as f64;
                (base, base + 1.5, base - 0.5, base + 1.0)
            })
            .collect();
        let result = adx(&bars_from(&ohlc, 1000.0), 14);

        let last = result.adx.len() - 1;
        assert!(result.plus_di[last].unwrap() > result.minus_di[last].unwrap());
        assert!(result.adx[last] > 50.0);
        assert!(result.adx.iter().all(|v| (0.0..=100.0).contains(v)));
    }

    #[test]
    fn test_adx_flat_series_is_zero() {
        let result = adx(&flat_bars(30), 14);
        assert!(result.adx.iter().all(|v| *v == 0.0));
        assert!(result.plus_di.iter().all(|v| v.is_none()));
    }

    #[test]
    fn test_price_channels() {
        let bars = sample_bars();
        let (upper, lower) = price_channels(&bars, 3);
        assert_relative_eq!(upper[0], bars[0].high);
        assert_relative_eq!(upper[5], bars[5].high);
        assert_relative_eq!(lower[5], bars[3].low);
    }

    #[test]
    fn test_fill_gaps_priority() {
        let filled = fill_gaps(vec![None, Some(2.0), None, Some(f64::NAN), Some(5.0), None]);
        assert_eq!(filled, vec![2.0, 2.0, 2.0, 2.0, 5.0, 5.0]);
        assert_eq!(fill_gaps(vec![None, None]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_table_preserves_rows_and_has_no_gaps() {
        let bars = wave_bars(260);
        let table = IndicatorEngine::new().compute(&bars).unwrap();

        assert_eq!(table.len(), bars.len());
        for (row, bar) in table.rows.iter().zip(&bars) {
            assert_eq!(row.date, bar.date());
            let record = serde_json::to_value(row).unwrap();
            for (column, value) in record.as_object().unwrap() {
                assert!(!value.is_null(), "column {} missing on {}", column, row.date);
            }
        }
    }

    #[test]
    fn test_first_daily_return_is_back_filled() {
        let table = IndicatorEngine::new().compute(&wave_bars(30)).unwrap();
        let r = &table.rows;
        assert_relative_eq!(r[1].daily_return, r[1].close / r[0].close - 1.0, epsilon = 1e-12);
        assert_eq!(r[0].daily_return, r[1].daily_return);
    }

    #[test]
    fn test_table_bounds() {
        let table = IndicatorEngine::new().compute(&wave_bars(260)).unwrap();
        for row in &table.rows {
            assert!((0.0..=100.0).contains(&row.rsi));
            assert!((0.0..=100.0).contains(&row.stoch_k));
            assert!((0.0..=100.0).contains(&row.stoch_d));
            assert!((0.0..=100.0).contains(&row.adx));
            assert!([-1, 0, 1].contains(&row.signal));
            assert!(row.upper_channel >= row.lower_channel);
        }
    }

    #[test]
    fn test_table_flat_series() {
        let table = IndicatorEngine::new().compute(&flat_bars(30)).unwrap();

        assert!(table.is_flat());
        for row in &table.rows {
            assert_relative_eq!(row.rsi, 50.0);
            assert_relative_eq!(row.adx, 0.0);
            assert_relative_eq!(row.stoch_k, 50.0);
            assert_relative_eq!(row.volatility, 0.0);
            assert_relative_eq!(row.trend_strength, 0.0);
            assert_eq!(row.signal, 0);
        }
    }

    #[test]
    fn test_table_single_bar() {
        let bars = bars_from(&[(10.0, 11.0, 9.0, 10.5)], 500.0);
        let table = IndicatorEngine::new().compute(&bars).unwrap();

        assert_eq!(table.len(), 1);
        let row = table.last().unwrap();
        assert_relative_eq!(row.sma_50, 10.5);
        assert_relative_eq!(row.sma_200, 10.5);
        assert_relative_eq!(row.obv, 500.0);
        assert_relative_eq!(row.daily_return, 0.0);
    }

    #[test]
    fn test_table_rejects_bad_input() {
        let engine = IndicatorEngine::new();
        assert!(matches!(engine.compute(&[]), Err(AnalysisError::InvalidInput(_))));

        let mut bars = sample_bars();
        bars.swap(2, 3);
        assert!(matches!(engine.compute(&bars), Err(AnalysisError::InvalidInput(_))));

        let mut bars = sample_bars();
        bars[4].close = f64::NAN;
        assert!(matches!(engine.compute(&bars), Err(AnalysisError::InvalidInput(_))));
    }

    #[test]
    fn test_table_serializes_as_records() {
        let table = IndicatorEngine::new().compute(&sample_bars()).unwrap();
        let json = serde_json::to_value(&table).unwrap();

        let records = json.as_array().unwrap();
        assert_eq!(records.len(), 15);
        assert_eq!(records[0]["date"], "2023-01-02");
        assert!(records[0]["macd_histogram"].is_number());
    }
}
