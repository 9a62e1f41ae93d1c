//! Technical indicator implementations.
//!
//! This module provides types for representing indicator values and series:
//! - `IndicatorPoint`: A single point in an indicator time series
//! - `IndicatorValue`: Enum for different indicator output shapes
//! - `IndicatorType`: Enum for indicator identity + parameters (serves as HashMap key)
//! - `IndicatorSeries`: A time series of indicator values
//!
//! Every series carries one point per input bar. Points inside the warm-up
//! window have `valid == false` and must be read as "undefined".

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod rolling;
pub mod rsi;
pub mod sma;

use crate::domain::rule::IndicatorField;
use chrono::NaiveDateTime;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub timestamp: NaiveDateTime,
    pub valid: bool,
    pub value: IndicatorValue,
}

impl IndicatorPoint {
    pub fn simple(timestamp: NaiveDateTime, value: f64) -> Self {
        Self {
            timestamp,
            valid: value.is_finite(),
            value: IndicatorValue::Simple(value),
        }
    }

    pub fn undefined(timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp,
            valid: false,
            value: IndicatorValue::Simple(0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorValue {
    Simple(f64),
    Bollinger { upper: f64, middle: f64, lower: f64 },
}

impl IndicatorValue {
    /// One scalar out of the value; `None` when the field does not apply.
    pub fn field(&self, field: IndicatorField) -> Option<f64> {
        match (self, field) {
            (IndicatorValue::Simple(v), IndicatorField::Value) => Some(*v),
            (IndicatorValue::Bollinger { upper, .. }, IndicatorField::BollingerUpper) => {
                Some(*upper)
            }
            (IndicatorValue::Bollinger { middle, .. }, IndicatorField::BollingerMiddle) => {
                Some(*middle)
            }
            (IndicatorValue::Bollinger { lower, .. }, IndicatorField::BollingerLower) => {
                Some(*lower)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Sma(usize),
    Ema(usize),
    Rsi(usize),
    Atr(usize),
    Adx(usize),
    Bollinger {
        period: usize,
        stddev_mult_x100: u32,
    },
    /// (upper - lower) / middle
    BollingerWidth {
        period: usize,
        stddev_mult_x100: u32,
    },
    BollingerWidthMean {
        period: usize,
        stddev_mult_x100: u32,
        window: usize,
    },
    BollingerWidthQuantile {
        period: usize,
        stddev_mult_x100: u32,
        window: usize,
        quantile_x1000: u32,
    },
    VolumeMean(usize),
}

impl IndicatorType {
    /// Index of the first bar that can carry a defined value.
    pub fn warmup(&self) -> usize {
        match *self {
            IndicatorType::Sma(n)
            | IndicatorType::Ema(n)
            | IndicatorType::Atr(n)
            | IndicatorType::VolumeMean(n) => n.saturating_sub(1),
            IndicatorType::Rsi(n) => n,
            IndicatorType::Adx(n) => (2 * n).saturating_sub(1),
            IndicatorType::Bollinger { period, .. }
            | IndicatorType::BollingerWidth { period, .. } => period.saturating_sub(1),
            IndicatorType::BollingerWidthMean { period, window, .. }
            | IndicatorType::BollingerWidthQuantile { period, window, .. } => {
                period.saturating_sub(1) + window.saturating_sub(1)
            }
        }
    }

    /// Whether the indicator is bounded to [0, 100].
    pub fn is_oscillator(&self) -> bool {
        matches!(self, IndicatorType::Rsi(_) | IndicatorType::Adx(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    /// The point at `index` if it exists and is inside the defined range.
    pub fn defined_at(&self, index: usize) -> Option<&IndicatorValue> {
        self.values
            .get(index)
            .filter(|p| p.valid)
            .map(|p| &p.value)
    }

    /// Scalar value at `index`, `None` for undefined points or band values.
    pub fn simple_at(&self, index: usize) -> Option<f64> {
        match self.defined_at(index)? {
            IndicatorValue::Simple(v) => Some(*v),
            IndicatorValue::Bollinger { .. } => None,
        }
    }
}

fn mult_display(x100: u32) -> f64 {
    x100 as f64 / 100.0
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Sma(period) => write!(f, "SMA({})", period),
            IndicatorType::Ema(period) => write!(f, "EMA({})", period),
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::Atr(period) => write!(f, "ATR({})", period),
            IndicatorType::Adx(period) => write!(f, "ADX({})", period),
            IndicatorType::Bollinger {
                period,
                stddev_mult_x100,
            } => write!(f, "BOLLINGER({},{})", period, mult_display(*stddev_mult_x100)),
            IndicatorType::BollingerWidth {
                period,
                stddev_mult_x100,
            } => write!(f, "BB_WIDTH({},{})", period, mult_display(*stddev_mult_x100)),
            IndicatorType::BollingerWidthMean {
                period,
                stddev_mult_x100,
                window,
            } => write!(
                f,
                "BB_WIDTH_MEAN({},{},{})",
                period,
                mult_display(*stddev_mult_x100),
                window
            ),
            IndicatorType::BollingerWidthQuantile {
                period,
                stddev_mult_x100,
                window,
                quantile_x1000,
            } => write!(
                f,
                "BB_WIDTH_QUANTILE({},{},{},{})",
                period,
                mult_display(*stddev_mult_x100),
                window,
                *quantile_x1000 as f64 / 1000.0
            ),
            IndicatorType::VolumeMean(window) => write!(f, "VOLUME_MEAN({})", window),
        }
    }
}
