//! CSV report adapter: `decisions.csv` and `trades.csv` in an output directory.

use crate::domain::engine::BarDecision;
use crate::domain::error::EngineError;
use crate::domain::position::ClosedTrade;
use crate::ports::report_port::ReportPort;
use std::fs;
use std::path::PathBuf;

pub const DECISIONS_FILE: &str = "decisions.csv";
pub const TRADES_FILE: &str = "trades.csv";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const DECISION_HEADER: [&str; 11] = [
    "instrument",
    "bar_index",
    "timestamp",
    "close",
    "regime",
    "entry",
    "entry_tag",
    "exit",
    "exit_tag",
    "stop_price",
    "exit_reason",
];

const TRADE_HEADER: [&str; 11] = [
    "instrument",
    "side",
    "tag",
    "entry_time",
    "entry_price",
    "exit_time",
    "exit_price",
    "bars_held",
    "exit_reason",
    "profit_ratio",
    "entry_index",
];

pub struct CsvReportAdapter {
    output_dir: PathBuf,
}

impl CsvReportAdapter {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    fn writer(&self, file: &str) -> Result<csv::Writer<fs::File>, EngineError> {
        fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(file);
        Ok(csv::Writer::from_path(path).map_err(std::io::Error::from)?)
    }
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

impl ReportPort for CsvReportAdapter {
    fn write_decisions(&self, decisions: &[BarDecision]) -> Result<(), EngineError> {
        let mut wtr = self.writer(DECISIONS_FILE)?;
        wtr.write_record(DECISION_HEADER)
            .map_err(std::io::Error::from)?;
        for d in decisions {
            wtr.write_record([
                d.instrument.clone(),
                d.bar_index.to_string(),
                d.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                d.close.to_string(),
                opt(d.regime),
                d.entry.direction.to_string(),
                opt(d.entry.tag.as_deref()),
                opt(d.exit.as_ref().map(|e| e.side)),
                opt(d.exit.as_ref().map(|e| e.tag.as_str())),
                opt(d.stop_price),
                opt(d.exit_reason.as_ref()),
            ])
            .map_err(std::io::Error::from)?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn write_trades(&self, trades: &[ClosedTrade]) -> Result<(), EngineError> {
        let mut wtr = self.writer(TRADES_FILE)?;
        wtr.write_record(TRADE_HEADER)
            .map_err(std::io::Error::from)?;
        for t in trades {
            wtr.write_record([
                t.instrument.clone(),
                t.side.to_string(),
                t.tag.clone(),
                t.entry_time.format(TIMESTAMP_FORMAT).to_string(),
                t.entry_price.to_string(),
                t.exit_time.format(TIMESTAMP_FORMAT).to_string(),
                t.exit_price.to_string(),
                t.bars_held().to_string(),
                t.exit_reason.to_string(),
                format!("{:.6}", t.profit_ratio),
                t.entry_index.to_string(),
            ])
            .map_err(std::io::Error::from)?;
        }
        wtr.flush()?;
        Ok(())
    }
}
