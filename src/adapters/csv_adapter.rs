//! CSV bar data adapter.
//!
//! One file per instrument, `<SYMBOL>.csv` with `/` in the symbol written as
//! `_`, columns `timestamp,open,high,low,close,volume`.

use crate::domain::error::EngineError;
use crate::domain::ohlcv::Bar;
use crate::ports::data_port::DataPort;
use chrono::{NaiveDate, NaiveDateTime};
use std::fs;
use std::path::PathBuf;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, instrument: &str) -> PathBuf {
        self.base_path
            .join(format!("{}.csv", instrument.replace('/', "_")))
    }
}

fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, DATETIME_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn parse_field(
    record: &csv::StringRecord,
    index: usize,
    name: &str,
    instrument: &str,
    line: u64,
) -> Result<f64, EngineError> {
    let raw = record.get(index).ok_or_else(|| EngineError::DataFormat {
        instrument: instrument.to_string(),
        reason: format!("line {}: missing {} column", line, name),
    })?;
    let value: f64 = raw.trim().parse().map_err(|e| EngineError::DataFormat {
        instrument: instrument.to_string(),
        reason: format!("line {}: invalid {} value '{}': {}", line, name, raw, e),
    })?;
    if !value.is_finite() {
        return Err(EngineError::DataFormat {
            instrument: instrument.to_string(),
            reason: format!("line {}: non-finite {} value", line, name),
        });
    }
    Ok(value)
}

impl DataPort for CsvAdapter {
    fn fetch_bars(&self, instrument: &str) -> Result<Vec<Bar>, EngineError> {
        let path = self.csv_path(instrument);
        if !path.is_file() {
            return Err(EngineError::NoData {
                instrument: instrument.to_string(),
            });
        }
        let content = fs::read_to_string(&path)?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for result in rdr.records() {
            let record = result.map_err(|e| EngineError::DataFormat {
                instrument: instrument.to_string(),
                reason: format!("CSV parse error: {}", e),
            })?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            let raw_ts = record.get(0).unwrap_or("");
            let timestamp = parse_timestamp(raw_ts).ok_or_else(|| EngineError::DataFormat {
                instrument: instrument.to_string(),
                reason: format!("line {}: invalid timestamp '{}'", line, raw_ts),
            })?;

            bars.push(Bar {
                timestamp,
                open: parse_field(&record, 1, "open", instrument, line)?,
                high: parse_field(&record, 2, "high", instrument, line)?,
                low: parse_field(&record, 3, "low", instrument, line)?,
                close: parse_field(&record, 4, "close", instrument, line)?,
                volume: parse_field(&record, 5, "volume", instrument, line)?,
            });
        }

        if bars.is_empty() {
            return Err(EngineError::NoData {
                instrument: instrument.to_string(),
            });
        }

        bars.sort_by_key(|b| b.timestamp);
        if let Some(pair) = bars.windows(2).find(|w| w[0].timestamp == w[1].timestamp) {
            return Err(EngineError::DataFormat {
                instrument: instrument.to_string(),
                reason: format!("duplicate timestamp {}", pair[0].timestamp),
            });
        }
        Ok(bars)
    }

    fn list_instruments(&self) -> Result<Vec<String>, EngineError> {
        let mut instruments = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if let Some(stem) = name.strip_suffix(".csv") {
                instruments.push(stem.replace('_', "/"));
            }
        }
        instruments.sort();
        Ok(instruments)
    }
}
