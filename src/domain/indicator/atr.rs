//! Average True Range (Wilder).
//!
//! TR[0] = high - low, TR[i] = max(H-L, |H-C[i-1]|, |L-C[i-1]|).
//! Seed ATR at index (n-1) with the mean of the first n TR values, then
//! ATR[i] = (ATR[i-1] * (n-1) + TR[i]) / n.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::Bar;

/// True range per bar; the first bar has no previous close and uses high - low.
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| bar.true_range(i.checked_sub(1).map(|p| bars[p].close)))
        .collect()
}

/// Wilder smoothing over a series whose leading values may be undefined.
///
/// The seed is the simple mean of the first `period` defined values. A gap
/// after the seed makes every later output undefined.
pub fn wilder_smooth(input: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; input.len()];
    if period == 0 {
        return out;
    }
    let Some(start) = input.iter().position(|v| v.is_some()) else {
        return out;
    };
    let seed_idx = start + period - 1;
    if seed_idx >= input.len() {
        return out;
    }

    let mut sum = 0.0;
    for value in &input[start..=seed_idx] {
        match value {
            Some(v) => sum += v,
            None => return out,
        }
    }
    let mut smoothed = sum / period as f64;
    out[seed_idx] = Some(smoothed);

    for i in seed_idx + 1..input.len() {
        let Some(v) = input[i] else {
            break;
        };
        smoothed = (smoothed * (period - 1) as f64 + v) / period as f64;
        out[i] = Some(smoothed);
    }
    out
}

pub fn calculate_atr(bars: &[Bar], period: usize) -> IndicatorSeries {
    let tr: Vec<Option<f64>> = true_range(bars).into_iter().map(Some).collect();
    let smoothed = wilder_smooth(&tr, period);

    let values = bars
        .iter()
        .zip(smoothed)
        .map(|(bar, atr)| match atr {
            Some(v) => IndicatorPoint::simple(bar.timestamp, v),
            None => IndicatorPoint::undefined(bar.timestamp),
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Atr(period),
        values,
    }
}
