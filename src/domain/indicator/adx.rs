//! ADX (Average Directional Index) indicator with Wilder smoothing.
//!
//! Steps:
//! 1. Compute +DM and -DM from consecutive bars
//! 2. Smooth +DM, -DM, and TR using Wilder smoothing
//! 3. +DI = 100 * smoothed(+DM) / smoothed(TR)
//! 4. -DI = 100 * smoothed(-DM) / smoothed(TR)
//! 5. DX = 100 * |+DI - -DI| / (+DI + -DI)
//! 6. ADX = Wilder-smoothed DX
//!
//! Warmup: first (2n - 1) bars are invalid.

use crate::domain::indicator::atr::wilder_smooth;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::Bar;

pub fn calculate_adx(bars: &[Bar], period: usize) -> IndicatorSeries {
    let n = bars.len();
    let mut plus_dm = vec![None; n];
    let mut minus_dm = vec![None; n];
    let mut tr = vec![None; n];

    for i in 1..n {
        let high_diff = bars[i].high - bars[i - 1].high;
        let low_diff = bars[i - 1].low - bars[i].low;

        plus_dm[i] = Some(if high_diff > low_diff && high_diff > 0.0 {
            high_diff
        } else {
            0.0
        });
        minus_dm[i] = Some(if low_diff > high_diff && low_diff > 0.0 {
            low_diff
        } else {
            0.0
        });
        tr[i] = Some(bars[i].true_range(Some(bars[i - 1].close)));
    }

    let smooth_tr = wilder_smooth(&tr, period);
    let smooth_plus = wilder_smooth(&plus_dm, period);
    let smooth_minus = wilder_smooth(&minus_dm, period);

    let dx: Vec<Option<f64>> = (0..n)
        .map(|i| {
            let (tr, plus, minus) = (smooth_tr[i]?, smooth_plus[i]?, smooth_minus[i]?);
            if tr == 0.0 {
                return Some(0.0);
            }
            let plus_di = 100.0 * plus / tr;
            let minus_di = 100.0 * minus / tr;
            let di_sum = plus_di + minus_di;
            if di_sum == 0.0 {
                Some(0.0)
            } else {
                Some(100.0 * (plus_di - minus_di).abs() / di_sum)
            }
        })
        .collect();

    let adx = wilder_smooth(&dx, period);

    let values = bars
        .iter()
        .zip(adx)
        .map(|(bar, v)| match v {
            Some(v) => IndicatorPoint::simple(bar.timestamp, v.clamp(0.0, 100.0)),
            None => IndicatorPoint::undefined(bar.timestamp),
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Adx(period),
        values,
    }
}
