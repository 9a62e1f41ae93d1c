//! Bollinger Bands indicator.
//!
//! Bollinger Bands consist of:
//! - Middle: Simple Moving Average (SMA) of typical price over n periods
//! - Upper: Middle + (multiplier × StdDev)
//! - Lower: Middle - (multiplier × StdDev)
//!
//! Where StdDev is the sample standard deviation (divides by N-1, as a
//! pandas rolling `std()` does), so a one-bar window is always undefined.
//!
//! Band width is (upper - lower) / middle and is undefined when the middle
//! band is zero.
//!
//! Warmup: first (period-1) bars are invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::Bar;

/// (upper, middle, lower) per bar, `None` inside the warm-up window.
pub fn bands(bars: &[Bar], period: usize, stddev_mult_x100: u32) -> Vec<Option<(f64, f64, f64)>> {
    let mult = stddev_mult_x100 as f64 / 100.0;

    (0..bars.len())
        .map(|i| {
            if period < 2 || i + 1 < period {
                return None;
            }
            let window = &bars[i + 1 - period..=i];
            let middle = window.iter().map(|b| b.typical_price()).sum::<f64>() / period as f64;
            let variance = window
                .iter()
                .map(|b| {
                    let diff = b.typical_price() - middle;
                    diff * diff
                })
                .sum::<f64>()
                / (period - 1) as f64;
            let stddev = variance.sqrt();
            Some((middle + mult * stddev, middle, middle - mult * stddev))
        })
        .collect()
}

/// Normalised band width per bar.
pub fn width(bars: &[Bar], period: usize, stddev_mult_x100: u32) -> Vec<Option<f64>> {
    bands(bars, period, stddev_mult_x100)
        .into_iter()
        .map(|b| {
            let (upper, middle, lower) = b?;
            if middle == 0.0 {
                None
            } else {
                Some((upper - lower) / middle)
            }
        })
        .collect()
}

pub fn calculate_bollinger(bars: &[Bar], period: usize, stddev_mult_x100: u32) -> IndicatorSeries {
    let values = bars
        .iter()
        .zip(bands(bars, period, stddev_mult_x100))
        .map(|(bar, b)| match b {
            Some((upper, middle, lower)) => IndicatorPoint {
                timestamp: bar.timestamp,
                valid: true,
                value: IndicatorValue::Bollinger {
                    upper,
                    middle,
                    lower,
                },
            },
            None => IndicatorPoint {
                timestamp: bar.timestamp,
                valid: false,
                value: IndicatorValue::Bollinger {
                    upper: 0.0,
                    middle: 0.0,
                    lower: 0.0,
                },
            },
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Bollinger {
            period,
            stddev_mult_x100,
        },
        values,
    }
}

pub fn calculate_width(bars: &[Bar], period: usize, stddev_mult_x100: u32) -> IndicatorSeries {
    let values = bars
        .iter()
        .zip(width(bars, period, stddev_mult_x100))
        .map(|(bar, w)| match w {
            Some(v) => IndicatorPoint::simple(bar.timestamp, v),
            None => IndicatorPoint::undefined(bar.timestamp),
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::BollingerWidth {
            period,
            stddev_mult_x100,
        },
        values,
    }
}
