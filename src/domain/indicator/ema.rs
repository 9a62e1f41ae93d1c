//! Exponential Moving Average of close.
//!
//! Seeded at index n-1 with the SMA of the first n closes, then
//! EMA[i] = C[i]*k + EMA[i-1]*(1-k) with k = 2/(n+1).

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::Bar;

pub fn calculate_ema(bars: &[Bar], period: usize) -> IndicatorSeries {
    let k = 2.0 / (period as f64 + 1.0);
    let mut state: Option<f64> = None;

    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            if period == 0 || i + 1 < period {
                return IndicatorPoint::undefined(bar.timestamp);
            }
            let next = match state {
                None => bars[..period].iter().map(|b| b.close).sum::<f64>() / period as f64,
                Some(prev) => bar.close * k + prev * (1.0 - k),
            };
            state = Some(next);
            IndicatorPoint::simple(bar.timestamp, next)
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Ema(period),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn closes(prices: &[f64]) -> Vec<Bar> {
        let t0 = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        prices
            .iter()
            .zip(0..)
            .map(|(&close, h)| Bar {
                timestamp: t0 + chrono::Duration::hours(h),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 10.0,
            })
            .collect()
    }

    #[test]
    fn seeded_with_sma_then_smoothed() {
        // k = 0.5 for n = 3
        let series = calculate_ema(&closes(&[10.0, 20.0, 30.0, 40.0, 10.0]), 3);
        let got: Vec<Option<f64>> = (0..5).map(|i| series.simple_at(i)).collect();
        assert_eq!(got, vec![None, None, Some(20.0), Some(30.0), Some(20.0)]);
    }

    #[test]
    fn period_one_tracks_close() {
        let series = calculate_ema(&closes(&[3.0, 8.0, 5.0]), 1);
        assert_eq!(series.simple_at(1), Some(8.0));
        assert_eq!(series.simple_at(2), Some(5.0));
    }

    #[test]
    fn flat_input_is_flat_output() {
        let series = calculate_ema(&closes(&[7.0; 20]), 5);
        assert!((4..20).all(|i| (series.simple_at(i).unwrap() - 7.0).abs() < 1e-12));
    }

    #[test]
    fn too_short_or_zero_period_is_all_undefined() {
        let bars = closes(&[1.0, 2.0]);
        for period in [0, 3] {
            let series = calculate_ema(&bars, period);
            assert_eq!(series.values.len(), 2);
            assert!(series.values.iter().all(|p| !p.valid));
        }
    }
}
