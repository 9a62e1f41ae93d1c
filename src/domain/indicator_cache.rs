//! Indicator cache: computes and stores every derived series a strategy
//! reads, keyed by [`IndicatorType`].
//!
//! Series are pure functions of the bar history, so growing the history and
//! rebuilding never changes a value that was already defined.

use crate::domain::indicator::{
    IndicatorSeries, IndicatorType, IndicatorValue, adx, atr, bollinger, ema, rolling, rsi, sma,
};
use crate::domain::ohlcv::Bar;
use crate::domain::rule::IndicatorField;
use chrono::NaiveDateTime;
use std::collections::{HashMap, HashSet};

/// Compute one indicator series over the full bar history.
pub fn compute_series(indicator_type: IndicatorType, bars: &[Bar]) -> IndicatorSeries {
    match indicator_type {
        IndicatorType::Sma(n) => sma::calculate_sma(bars, n),
        IndicatorType::Ema(n) => ema::calculate_ema(bars, n),
        IndicatorType::Rsi(n) => rsi::calculate_rsi(bars, n),
        IndicatorType::Atr(n) => atr::calculate_atr(bars, n),
        IndicatorType::Adx(n) => adx::calculate_adx(bars, n),
        IndicatorType::Bollinger {
            period,
            stddev_mult_x100,
        } => bollinger::calculate_bollinger(bars, period, stddev_mult_x100),
        IndicatorType::BollingerWidth {
            period,
            stddev_mult_x100,
        } => bollinger::calculate_width(bars, period, stddev_mult_x100),
        IndicatorType::BollingerWidthMean {
            period,
            stddev_mult_x100,
            window,
        } => rolling::calculate_width_mean(bars, period, stddev_mult_x100, window),
        IndicatorType::BollingerWidthQuantile {
            period,
            stddev_mult_x100,
            window,
            quantile_x1000,
        } => rolling::calculate_width_quantile(
            bars,
            period,
            stddev_mult_x100,
            window,
            quantile_x1000,
        ),
        IndicatorType::VolumeMean(window) => rolling::calculate_volume_mean(bars, window),
    }
}

pub fn compute_indicators(
    bars: &[Bar],
    types: &[IndicatorType],
) -> HashMap<IndicatorType, IndicatorSeries> {
    let unique: HashSet<IndicatorType> = types.iter().copied().collect();
    unique
        .into_iter()
        .map(|t| (t, compute_series(t, bars)))
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct IndicatorCache {
    types: Vec<IndicatorType>,
    series: HashMap<IndicatorType, IndicatorSeries>,
    time_index: HashMap<NaiveDateTime, usize>,
    bar_count: usize,
}

impl IndicatorCache {
    pub fn build(bars: &[Bar], types: &[IndicatorType]) -> Self {
        let mut unique = Vec::with_capacity(types.len());
        for t in types {
            if !unique.contains(t) {
                unique.push(*t);
            }
        }
        let mut cache = Self {
            types: unique,
            ..Self::default()
        };
        cache.extend(bars);
        cache
    }

    /// Rebuild every series against a (usually longer) bar history.
    pub fn extend(&mut self, bars: &[Bar]) {
        self.series = compute_indicators(bars, &self.types);
        self.time_index = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.timestamp, i))
            .collect();
        self.bar_count = bars.len();
    }

    pub fn bar_count(&self) -> usize {
        self.bar_count
    }

    pub fn types(&self) -> &[IndicatorType] {
        &self.types
    }

    pub fn series(&self, indicator_type: &IndicatorType) -> Option<&IndicatorSeries> {
        self.series.get(indicator_type)
    }

    /// Defined value at `index`; `None` for unknown series, warm-up bars and
    /// out-of-range indices.
    pub fn point(&self, indicator_type: &IndicatorType, index: usize) -> Option<&IndicatorValue> {
        self.series.get(indicator_type)?.defined_at(index)
    }

    pub fn simple(&self, indicator_type: &IndicatorType, index: usize) -> Option<f64> {
        self.series.get(indicator_type)?.simple_at(index)
    }

    pub fn value(
        &self,
        indicator_type: &IndicatorType,
        field: IndicatorField,
        index: usize,
    ) -> Option<f64> {
        self.point(indicator_type, index)?.field(field)
    }

    /// Bar index for a timestamp, used to recover a trade's entry bar.
    pub fn snapshot_at(&self, timestamp: NaiveDateTime) -> Option<usize> {
        self.time_index.get(&timestamp).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_bars(prices: &[f64]) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        prices
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                timestamp: start + chrono::Duration::hours(i as i64),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn build_deduplicates_types() {
        let bars = make_bars(&[1.0, 2.0, 3.0]);
        let cache = IndicatorCache::build(
            &bars,
            &[IndicatorType::Sma(2), IndicatorType::Sma(2), IndicatorType::Ema(2)],
        );
        assert_eq!(cache.types().len(), 2);
        assert_eq!(cache.bar_count(), 3);
    }

    #[test]
    fn simple_reads_defined_values_only() {
        let bars = make_bars(&[1.0, 2.0, 3.0]);
        let cache = IndicatorCache::build(&bars, &[IndicatorType::Sma(2)]);
        assert_eq!(cache.simple(&IndicatorType::Sma(2), 0), None);
        assert_eq!(cache.simple(&IndicatorType::Sma(2), 1), Some(1.5));
        assert_eq!(cache.simple(&IndicatorType::Sma(2), 5), None);
        assert_eq!(cache.simple(&IndicatorType::Sma(3), 2), None);
    }

    #[test]
    fn value_reads_band_fields() {
        let bars = make_bars(&[10.0, 12.0, 11.0]);
        let bb = IndicatorType::Bollinger {
            period: 3,
            stddev_mult_x100: 200,
        };
        let cache = IndicatorCache::build(&bars, &[bb, IndicatorType::Sma(3)]);
        let upper = cache.value(&bb, IndicatorField::BollingerUpper, 2).unwrap();
        let middle = cache.value(&bb, IndicatorField::BollingerMiddle, 2).unwrap();
        let lower = cache.value(&bb, IndicatorField::BollingerLower, 2).unwrap();
        assert!(upper > middle && middle > lower);
        assert_eq!(cache.value(&bb, IndicatorField::Value, 2), None);
        assert_eq!(
            cache.value(&IndicatorType::Sma(3), IndicatorField::Value, 2),
            Some(11.0)
        );
    }

    #[test]
    fn extend_keeps_existing_values() {
        let prices: Vec<f64> = (0..40).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0).collect();
        let mut cache = IndicatorCache::build(&make_bars(&prices[..25]), &[IndicatorType::Rsi(14)]);
        let before: Vec<Option<f64>> = (0..25)
            .map(|i| cache.simple(&IndicatorType::Rsi(14), i))
            .collect();

        cache.extend(&make_bars(&prices));
        assert_eq!(cache.bar_count(), 40);
        for (i, v) in before.iter().enumerate() {
            assert_eq!(*v, cache.simple(&IndicatorType::Rsi(14), i));
        }
    }

    #[test]
    fn snapshot_at_finds_timestamps() {
        let bars = make_bars(&[1.0, 2.0, 3.0]);
        let cache = IndicatorCache::build(&bars, &[]);
        assert_eq!(cache.snapshot_at(bars[2].timestamp), Some(2));
        assert_eq!(
            cache.snapshot_at(bars[2].timestamp + chrono::Duration::minutes(30)),
            None
        );
    }

    #[test]
    fn compute_indicators_covers_every_family() {
        let prices: Vec<f64> = (0..80).map(|i| 100.0 + (i as f64 * 0.3).sin() * 4.0).collect();
        let bars = make_bars(&prices);
        let types = [
            IndicatorType::Sma(10),
            IndicatorType::Ema(10),
            IndicatorType::Rsi(14),
            IndicatorType::Atr(14),
            IndicatorType::Adx(14),
            IndicatorType::Bollinger {
                period: 20,
                stddev_mult_x100: 200,
            },
            IndicatorType::BollingerWidth {
                period: 20,
                stddev_mult_x100: 200,
            },
            IndicatorType::BollingerWidthMean {
                period: 20,
                stddev_mult_x100: 200,
                window: 10,
            },
            IndicatorType::BollingerWidthQuantile {
                period: 20,
                stddev_mult_x100: 200,
                window: 10,
                quantile_x1000: 250,
            },
            IndicatorType::VolumeMean(30),
        ];
        let computed = compute_indicators(&bars, &types);
        for t in &types {
            let series = &computed[t];
            assert_eq!(series.values.len(), 80);
            let first_valid = series.values.iter().position(|p| p.valid);
            assert_eq!(first_valid, Some(t.warmup()), "{}", t);
        }
    }
}
