//! Position tracking and lifecycle.

use crate::domain::signal::Side;
use chrono::NaiveDateTime;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionState {
    Open,
    Trailing,
    /// Terminal; the position no longer changes.
    Closing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExitReason {
    StopLoss,
    TrailingStop,
    /// Early-exit rule with its configured label.
    EarlyExit(String),
    Roi,
    LossTimeout,
    ExitSignal,
}

impl ExitReason {
    pub fn as_str(&self) -> &str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TrailingStop => "trailing_stop",
            ExitReason::EarlyExit(reason) => reason,
            ExitReason::Roi => "roi",
            ExitReason::LossTimeout => "loss_timeout",
            ExitReason::ExitSignal => "exit_signal",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub instrument: String,
    pub entry_index: usize,
    pub entry_time: NaiveDateTime,
    pub entry_price: f64,
    pub side: Side,
    pub tag: String,
    pub initial_stop: f64,
    pub stop_price: f64,
    pub state: PositionState,
}

impl Position {
    /// Profit as a fraction of entry price, positive when the trade is winning.
    pub fn profit_ratio(&self, price: f64) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        self.side.sign() * (price - self.entry_price) / self.entry_price
    }

    /// True when `price` is at or beyond the stop on the losing side.
    pub fn stop_hit(&self, price: f64) -> bool {
        match self.side {
            Side::Long => price <= self.stop_price,
            Side::Short => price >= self.stop_price,
        }
    }

    pub fn bars_held(&self, bar_index: usize) -> usize {
        bar_index.saturating_sub(self.entry_index)
    }

    pub fn is_closing(&self) -> bool {
        self.state == PositionState::Closing
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub instrument: String,
    pub side: Side,
    pub tag: String,
    pub entry_index: usize,
    pub entry_time: NaiveDateTime,
    pub entry_price: f64,
    pub exit_index: usize,
    pub exit_time: NaiveDateTime,
    pub exit_price: f64,
    pub exit_reason: ExitReason,
    pub profit_ratio: f64,
}

impl ClosedTrade {
    pub fn from_position(
        position: &Position,
        exit_index: usize,
        exit_time: NaiveDateTime,
        exit_price: f64,
        exit_reason: ExitReason,
    ) -> Self {
        Self {
            instrument: position.instrument.clone(),
            side: position.side,
            tag: position.tag.clone(),
            entry_index: position.entry_index,
            entry_time: position.entry_time,
            entry_price: position.entry_price,
            exit_index,
            exit_time,
            exit_price,
            profit_ratio: position.profit_ratio(exit_price),
            exit_reason,
        }
    }

    pub fn bars_held(&self) -> usize {
        self.exit_index.saturating_sub(self.entry_index)
    }
}
