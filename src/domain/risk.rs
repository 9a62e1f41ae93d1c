//! Position risk management: initial stop, trailing ratchet and the
//! per-bar exit checks.
//!
//! Per bar, against the bar close:
//! 1. Stop in force hit → `stop_loss` (Open) or `trailing_stop` (Trailing)
//! 2. Open → Trailing once profit exceeds `trailing_offset`
//! 3. Trailing stop ratchets toward price, by ATR multiple or by a fixed
//!    `trailing_pct` of price; it never loosens
//! 4. Tag early-exit rule while in profit
//! 5. Minimal-ROI table
//! 6. Loss timeout
//! 7. Exit signal for the position's side

use crate::domain::indicator::IndicatorType;
use crate::domain::indicator_cache::IndicatorCache;
use crate::domain::position::{ExitReason, Position, PositionState};
use crate::domain::rule::Rule;
use crate::domain::rule_eval::{EvalContext, evaluate};
use crate::domain::signal::{ExitSignal, Side};
use chrono::NaiveDateTime;
use std::collections::HashMap;
use tracing::{debug, warn};

pub const DEFAULT_EARLY_EXIT_REASON: &str = "early_exit";

/// Risk parameters that may differ per entry tag.
#[derive(Debug, Clone, PartialEq)]
pub struct TagRisk {
    pub stop_multiplier: f64,
    pub trailing_multiplier: f64,
    /// Trail a fixed fraction of price instead of an ATR multiple.
    pub trailing_pct: Option<f64>,
    /// Checked only while the trade is in profit.
    pub early_exit: Option<Rule>,
    pub early_exit_reason: String,
}

impl Default for TagRisk {
    fn default() -> Self {
        Self {
            stop_multiplier: 2.0,
            trailing_multiplier: 2.0,
            trailing_pct: None,
            early_exit: None,
            early_exit_reason: DEFAULT_EARLY_EXIT_REASON.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskConfig {
    pub atr: IndicatorType,
    pub trailing_offset: f64,
    pub fallback_stop_pct: f64,
    pub hard_stop_pct: Option<f64>,
    pub loss_timeout_bars: Option<usize>,
    /// (bars held, minimum profit ratio), ascending by bars held.
    pub roi: Vec<(usize, f64)>,
    pub default: TagRisk,
    pub tags: HashMap<String, TagRisk>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            atr: IndicatorType::Atr(14),
            trailing_offset: 0.0,
            fallback_stop_pct: 0.99,
            hard_stop_pct: None,
            loss_timeout_bars: None,
            roi: Vec::new(),
            default: TagRisk::default(),
            tags: HashMap::new(),
        }
    }
}

impl RiskConfig {
    pub fn for_tag(&self, tag: &str) -> &TagRisk {
        self.tags.get(tag).unwrap_or(&self.default)
    }

    /// Minimum profit ratio required after `bars_held` bars, if any entry applies.
    pub fn roi_threshold(&self, bars_held: usize) -> Option<f64> {
        self.roi
            .iter()
            .filter(|(bars, _)| *bars <= bars_held)
            .max_by_key(|(bars, _)| *bars)
            .map(|(_, ratio)| *ratio)
    }

    /// Every rule referenced by the risk layer.
    pub fn early_exit_rules(&self) -> impl Iterator<Item = &Rule> {
        std::iter::once(&self.default)
            .chain(self.tags.values())
            .filter_map(|t| t.early_exit.as_ref())
    }
}

/// Widen-only clamp: the stop must not sit further from entry than `pct`.
fn cap_stop(side: Side, entry_price: f64, stop: f64, pct: f64) -> f64 {
    let limit = entry_price * (1.0 - side.sign() * pct);
    match side {
        Side::Long => stop.max(limit),
        Side::Short => stop.min(limit),
    }
}

/// Tighten-only move of `current` toward `candidate`.
pub fn ratchet(side: Side, current: f64, candidate: f64) -> f64 {
    match side {
        Side::Long => current.max(candidate),
        Side::Short => current.min(candidate),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RiskDecision {
    Hold { stop_price: f64 },
    Close { reason: ExitReason, price: f64 },
}

pub struct PositionRiskManager<'a> {
    config: &'a RiskConfig,
    indicators: &'a IndicatorCache,
}

impl<'a> PositionRiskManager<'a> {
    pub fn new(config: &'a RiskConfig, indicators: &'a IndicatorCache) -> Self {
        Self { config, indicators }
    }

    /// Initial stop from the entry bar's ATR; falls back to the widest stop
    /// when the entry bar or its ATR cannot be found.
    pub fn initial_stop(
        &self,
        instrument: &str,
        side: Side,
        tag: &str,
        entry_time: NaiveDateTime,
        entry_price: f64,
    ) -> f64 {
        let tag_risk = self.config.for_tag(tag);
        let atr = self
            .indicators
            .snapshot_at(entry_time)
            .and_then(|index| self.indicators.simple(&self.config.atr, index));

        let stop = match atr {
            Some(atr) => entry_price - side.sign() * atr * tag_risk.stop_multiplier,
            None => {
                let stop = entry_price * (1.0 - side.sign() * self.config.fallback_stop_pct);
                warn!(
                    instrument,
                    %entry_time,
                    entry_price,
                    fallback_stop = stop,
                    "entry bar ATR unavailable, using fallback stop"
                );
                stop
            }
        };

        match self.config.hard_stop_pct {
            Some(pct) => cap_stop(side, entry_price, stop, pct),
            None => stop,
        }
    }

    pub fn open(
        &self,
        instrument: &str,
        side: Side,
        tag: &str,
        entry_index: usize,
        entry_time: NaiveDateTime,
        entry_price: f64,
    ) -> Position {
        let stop = self.initial_stop(instrument, side, tag, entry_time, entry_price);
        Position {
            instrument: instrument.to_string(),
            entry_index,
            entry_time,
            entry_price,
            side,
            tag: tag.to_string(),
            initial_stop: stop,
            stop_price: stop,
            state: PositionState::Open,
        }
    }

    /// Advance `position` by one bar. Returns `None` once the position is
    /// closing or the bar does not exist.
    pub fn update(
        &self,
        position: &mut Position,
        bar_index: usize,
        ctx: &EvalContext<'_>,
        exit_signal: Option<&ExitSignal>,
    ) -> Option<RiskDecision> {
        if position.is_closing() {
            return None;
        }
        let price = ctx.bars.get(bar_index)?.close;

        if position.stop_hit(price) {
            let reason = match position.state {
                PositionState::Trailing => ExitReason::TrailingStop,
                _ => ExitReason::StopLoss,
            };
            return Some(self.close(position, reason, price));
        }

        let profit = position.profit_ratio(price);
        if position.state == PositionState::Open && profit > self.config.trailing_offset {
            position.state = PositionState::Trailing;
        }

        let tag_risk = self.config.for_tag(&position.tag);
        if position.state == PositionState::Trailing {
            let candidate = match tag_risk.trailing_pct {
                Some(pct) => Some(price * (1.0 - position.side.sign() * pct)),
                None => self
                    .indicators
                    .simple(&self.config.atr, bar_index)
                    .map(|atr| price - position.side.sign() * atr * tag_risk.trailing_multiplier),
            };
            if let Some(candidate) = candidate {
                let stop = ratchet(position.side, position.stop_price, candidate);
                if stop != position.stop_price {
                    debug!(
                        instrument = %position.instrument,
                        bar_index,
                        from = position.stop_price,
                        to = stop,
                        "stop ratcheted"
                    );
                    position.stop_price = stop;
                }
            }
        }

        if profit > 0.0 {
            if let Some(rule) = &tag_risk.early_exit {
                if evaluate(rule, ctx, bar_index) {
                    let reason = ExitReason::EarlyExit(tag_risk.early_exit_reason.clone());
                    return Some(self.close(position, reason, price));
                }
            }
        }

        let held = position.bars_held(bar_index);
        if let Some(min_profit) = self.config.roi_threshold(held) {
            if profit >= min_profit {
                return Some(self.close(position, ExitReason::Roi, price));
            }
        }

        if let Some(timeout) = self.config.loss_timeout_bars {
            if held >= timeout && profit < 0.0 {
                return Some(self.close(position, ExitReason::LossTimeout, price));
            }
        }

        if exit_signal.is_some_and(|exit| exit.side == position.side) {
            return Some(self.close(position, ExitReason::ExitSignal, price));
        }

        Some(RiskDecision::Hold {
            stop_price: position.stop_price,
        })
    }

    fn close(&self, position: &mut Position, reason: ExitReason, price: f64) -> RiskDecision {
        position.state = PositionState::Closing;
        RiskDecision::Close { reason, price }
    }
}
