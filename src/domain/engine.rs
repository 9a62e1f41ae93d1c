//! Bar-by-bar evaluation driver.
//!
//! Runs indicators, regime labels, signals and risk for one instrument and
//! accepts every entry signal while flat, so at most one position is open at
//! a time. Entries fill at the signal bar's close.

use crate::domain::error::EngineError;
use crate::domain::indicator_cache::IndicatorCache;
use crate::domain::ohlcv::Bar;
use crate::domain::position::{ClosedTrade, ExitReason, Position};
use crate::domain::regime::{Regime, RegimeClassifier};
use crate::domain::risk::{PositionRiskManager, RiskDecision};
use crate::domain::signal::{ExitSignal, Signal, SignalEvaluator};
use crate::domain::strategy::Strategy;
use crate::ports::data_port::DataPort;
use chrono::NaiveDateTime;
use tracing::{info, warn};

/// Everything decided for one instrument on one bar.
#[derive(Debug, Clone, PartialEq)]
pub struct BarDecision {
    pub instrument: String,
    pub bar_index: usize,
    pub timestamp: NaiveDateTime,
    pub close: f64,
    pub regime: Option<Regime>,
    pub entry: Signal,
    /// Exit for the side held coming into the bar; when flat, the first
    /// exit that fired (long before short).
    pub exit: Option<ExitSignal>,
    /// Stop in force after this bar, if a position is open.
    pub stop_price: Option<f64>,
    pub exit_reason: Option<ExitReason>,
}

#[derive(Debug, Clone)]
pub struct EvaluationReport {
    pub instrument: String,
    pub decisions: Vec<BarDecision>,
    pub trades: Vec<ClosedTrade>,
    /// Still open after the last bar.
    pub open_position: Option<Position>,
}

impl EvaluationReport {
    /// Bars on which a position was opened.
    pub fn entry_indices(&self) -> Vec<usize> {
        self.trades
            .iter()
            .map(|t| t.entry_index)
            .chain(self.open_position.iter().map(|p| p.entry_index))
            .collect()
    }
}

/// Evaluate `strategy` over one instrument's full history.
pub fn evaluate_instrument(strategy: &Strategy, instrument: &str, bars: &[Bar]) -> EvaluationReport {
    let indicators = IndicatorCache::build(bars, &strategy.required_indicators());
    let regimes = RegimeClassifier::new(&strategy.regime, &indicators).classify_all(instrument);
    let signals = SignalEvaluator::new(
        &strategy.entries,
        &strategy.exits,
        strategy.tie_break,
        bars,
        &indicators,
        &regimes,
    );
    let risk = PositionRiskManager::new(&strategy.risk, &indicators);
    let ctx = signals.context(instrument);

    let mut decisions = Vec::with_capacity(bars.len());
    let mut trades = Vec::new();
    let mut position: Option<Position> = None;

    for (i, bar) in bars.iter().enumerate() {
        let bar_signals = signals.evaluate(i, instrument);
        let mut exit_reason = None;
        let mut closed_this_bar = false;
        let exit = match &position {
            Some(pos) => bar_signals.exit_for(pos.side).cloned(),
            None => bar_signals.exits.first().cloned(),
        };

        if let Some(pos) = position.as_mut() {
            match risk.update(pos, i, &ctx, exit.as_ref()) {
                Some(RiskDecision::Close { reason, price }) => {
                    let trade = ClosedTrade::from_position(pos, i, bar.timestamp, price, reason.clone());
                    info!(
                        instrument,
                        bar_index = i,
                        side = %trade.side,
                        tag = %trade.tag,
                        exit_price = price,
                        profit_ratio = trade.profit_ratio,
                        reason = %reason,
                        "position closed"
                    );
                    trades.push(trade);
                    exit_reason = Some(reason);
                    position = None;
                    closed_this_bar = true;
                }
                Some(RiskDecision::Hold { .. }) | None => {}
            }
        }

        if position.is_none() && !closed_this_bar {
            if let Some(side) = bar_signals.entry.direction.side() {
                let tag = bar_signals.entry.tag.as_deref().unwrap_or_default();
                let pos = risk.open(instrument, side, tag, i, bar.timestamp, bar.close);
                info!(
                    instrument,
                    bar_index = i,
                    %side,
                    tag,
                    entry_price = bar.close,
                    stop_price = pos.stop_price,
                    "position opened"
                );
                position = Some(pos);
            }
        }

        decisions.push(BarDecision {
            instrument: instrument.to_string(),
            bar_index: i,
            timestamp: bar.timestamp,
            close: bar.close,
            regime: regimes.get(i).copied().flatten(),
            entry: bar_signals.entry,
            exit,
            stop_price: position.as_ref().map(|p| p.stop_price),
            exit_reason,
        });
    }

    EvaluationReport {
        instrument: instrument.to_string(),
        decisions,
        trades,
        open_position: position,
    }
}

#[derive(Debug, Default)]
pub struct UniverseReport {
    pub reports: Vec<EvaluationReport>,
    /// Instruments that could not be evaluated, with the reason.
    pub failures: Vec<(String, EngineError)>,
}

impl UniverseReport {
    pub fn decisions(&self) -> impl Iterator<Item = &BarDecision> {
        self.reports.iter().flat_map(|r| &r.decisions)
    }

    pub fn trades(&self) -> impl Iterator<Item = &ClosedTrade> {
        self.reports.iter().flat_map(|r| &r.trades)
    }
}

/// Evaluate every instrument independently. A failing instrument is logged
/// and skipped.
pub fn run_universe(
    strategy: &Strategy,
    data: &dyn DataPort,
    instruments: &[String],
) -> UniverseReport {
    let mut out = UniverseReport::default();
    for instrument in instruments {
        match data.fetch_bars(instrument) {
            Ok(bars) => {
                let report = evaluate_instrument(strategy, instrument, &bars);
                info!(
                    instrument = %instrument,
                    bars = bars.len(),
                    trades = report.trades.len(),
                    "instrument evaluated"
                );
                out.reports.push(report);
            }
            Err(e) => {
                warn!(instrument = %instrument, error = %e, "skipping instrument");
                out.failures.push((instrument.clone(), e));
            }
        }
    }
    out
}
