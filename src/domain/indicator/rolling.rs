//! Trailing-window statistics over derived series.
//!
//! A window produces a value only when every input inside it is defined,
//! matching a pandas `rolling(window)` with `min_periods == window`.
//! Quantiles interpolate linearly between order statistics.

use crate::domain::indicator::bollinger::width;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::Bar;

fn full_window(input: &[Option<f64>], end: usize, window: usize) -> Option<Vec<f64>> {
    if window == 0 || end + 1 < window {
        return None;
    }
    input[end + 1 - window..=end].iter().copied().collect()
}

pub fn rolling_mean(input: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    (0..input.len())
        .map(|i| {
            let values = full_window(input, i, window)?;
            Some(values.iter().sum::<f64>() / window as f64)
        })
        .collect()
}

/// Linear-interpolated quantile of an unsorted sample; `q` in [0, 1].
pub fn quantile(values: &mut [f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let pos = q.clamp(0.0, 1.0) * (values.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(values[lo] + (values[hi] - values[lo]) * frac)
}

pub fn rolling_quantile(input: &[Option<f64>], window: usize, q: f64) -> Vec<Option<f64>> {
    (0..input.len())
        .map(|i| {
            let mut values = full_window(input, i, window)?;
            quantile(&mut values, q)
        })
        .collect()
}

fn to_series(bars: &[Bar], indicator_type: IndicatorType, raw: Vec<Option<f64>>) -> IndicatorSeries {
    let values = bars
        .iter()
        .zip(raw)
        .map(|(bar, v)| match v {
            Some(v) => IndicatorPoint::simple(bar.timestamp, v),
            None => IndicatorPoint::undefined(bar.timestamp),
        })
        .collect();
    IndicatorSeries {
        indicator_type,
        values,
    }
}

pub fn calculate_volume_mean(bars: &[Bar], window: usize) -> IndicatorSeries {
    let volume: Vec<Option<f64>> = bars.iter().map(|b| Some(b.volume)).collect();
    to_series(
        bars,
        IndicatorType::VolumeMean(window),
        rolling_mean(&volume, window),
    )
}

pub fn calculate_width_mean(
    bars: &[Bar],
    period: usize,
    stddev_mult_x100: u32,
    window: usize,
) -> IndicatorSeries {
    let widths = width(bars, period, stddev_mult_x100);
    to_series(
        bars,
        IndicatorType::BollingerWidthMean {
            period,
            stddev_mult_x100,
            window,
        },
        rolling_mean(&widths, window),
    )
}

pub fn calculate_width_quantile(
    bars: &[Bar],
    period: usize,
    stddev_mult_x100: u32,
    window: usize,
    quantile_x1000: u32,
) -> IndicatorSeries {
    let widths = width(bars, period, stddev_mult_x100);
    let q = quantile_x1000 as f64 / 1000.0;
    to_series(
        bars,
        IndicatorType::BollingerWidthQuantile {
            period,
            stddev_mult_x100,
            window,
            quantile_x1000,
        },
        rolling_quantile(&widths, window, q),
    )
}
