//! Data access port trait.

use crate::domain::error::EngineError;
use crate::domain::ohlcv::Bar;

pub trait DataPort {
    /// Time-ordered bars for one instrument.
    fn fetch_bars(&self, instrument: &str) -> Result<Vec<Bar>, EngineError>;

    fn list_instruments(&self) -> Result<Vec<String>, EngineError>;
}
