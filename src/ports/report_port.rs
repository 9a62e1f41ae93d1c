//! Result output port trait.

use crate::domain::engine::BarDecision;
use crate::domain::error::EngineError;
use crate::domain::position::ClosedTrade;

/// Port for writing evaluation results.
pub trait ReportPort {
    fn write_decisions(&self, decisions: &[BarDecision]) -> Result<(), EngineError>;

    fn write_trades(&self, trades: &[ClosedTrade]) -> Result<(), EngineError>;
}
