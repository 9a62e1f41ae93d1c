//! Regime classification: per-bar trending/ranging label.
//!
//! A bar is `Trend` when the regime indicator is at or above the threshold
//! for its instrument and `Range` otherwise. Instruments may carry their own
//! threshold through the override table.

use crate::domain::indicator::IndicatorType;
use crate::domain::indicator_cache::IndicatorCache;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Regime {
    Trend,
    Range,
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Regime::Trend => write!(f, "TREND"),
            Regime::Range => write!(f, "RANGE"),
        }
    }
}

impl FromStr for Regime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TREND" | "TRENDING" => Ok(Regime::Trend),
            "RANGE" | "RANGING" => Ok(Regime::Range),
            other => Err(format!("unknown regime '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegimeConfig {
    pub indicator: IndicatorType,
    pub threshold: f64,
    /// Instrument symbol → threshold.
    pub overrides: HashMap<String, f64>,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            indicator: IndicatorType::Adx(14),
            threshold: 25.0,
            overrides: HashMap::new(),
        }
    }
}

impl RegimeConfig {
    pub fn threshold_for(&self, instrument: &str) -> f64 {
        self.overrides
            .get(instrument)
            .copied()
            .unwrap_or(self.threshold)
    }
}

pub struct RegimeClassifier<'a> {
    config: &'a RegimeConfig,
    indicators: &'a IndicatorCache,
}

impl<'a> RegimeClassifier<'a> {
    pub fn new(config: &'a RegimeConfig, indicators: &'a IndicatorCache) -> Self {
        Self { config, indicators }
    }

    /// Label for one bar; `None` only while the regime indicator is undefined.
    pub fn classify(&self, bar_index: usize, instrument: &str) -> Option<Regime> {
        let value = self.indicators.simple(&self.config.indicator, bar_index)?;
        if value >= self.config.threshold_for(instrument) {
            Some(Regime::Trend)
        } else {
            Some(Regime::Range)
        }
    }

    /// Labels for every bar in the cache.
    pub fn classify_all(&self, instrument: &str) -> Vec<Option<Regime>> {
        (0..self.indicators.bar_count())
            .map(|i| self.classify(i, instrument))
            .collect()
    }
}
