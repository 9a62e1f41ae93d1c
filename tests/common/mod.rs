#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use regimetrader::adapters::file_config_adapter::FileConfigAdapter;
use regimetrader::domain::error::EngineError;
pub use regimetrader::domain::ohlcv::Bar;
use regimetrader::domain::strategy::{Strategy, build_strategy};
use regimetrader::ports::data_port::DataPort;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<Bar>>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, instrument: &str, bars: Vec<Bar>) -> Self {
        self.data.insert(instrument.to_string(), bars);
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(&self, instrument: &str) -> Result<Vec<Bar>, EngineError> {
        match self.data.get(instrument) {
            Some(bars) if !bars.is_empty() => Ok(bars.clone()),
            _ => Err(EngineError::NoData {
                instrument: instrument.to_string(),
            }),
        }
    }

    fn list_instruments(&self) -> Result<Vec<String>, EngineError> {
        let mut out: Vec<String> = self.data.keys().cloned().collect();
        out.sort();
        Ok(out)
    }
}

pub fn ts(i: usize) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + chrono::Duration::hours(i as i64)
}

pub fn make_bar(i: usize, high: f64, low: f64, close: f64) -> Bar {
    Bar {
        timestamp: ts(i),
        open: close,
        high,
        low,
        close,
        volume: 1000.0,
    }
}

/// Bars with a constant two-point range around each close.
pub fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| make_bar(i, c + 1.0, c - 1.0, c))
        .collect()
}

/// 30 bars flat at 100, then +1 per bar up to 130.
pub fn flat_then_rise() -> Vec<f64> {
    let mut closes = vec![100.0; 30];
    closes.extend((1..=30).map(|k| 100.0 + k as f64));
    closes
}

/// 60 bars rising linearly from 100 to 130.
pub fn linear_rise() -> Vec<f64> {
    (0..60).map(|i| 100.0 + 30.0 * i as f64 / 59.0).collect()
}

pub fn strategy_from_ini(content: &str) -> Strategy {
    build_strategy(&FileConfigAdapter::from_string(content).unwrap()).unwrap()
}

pub fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

pub fn write_bars_csv(dir: &Path, instrument: &str, bars: &[Bar]) {
    let mut content = String::from("timestamp,open,high,low,close,volume\n");
    for b in bars {
        content.push_str(&format!(
            "{},{},{},{},{},{}\n",
            b.timestamp.format("%Y-%m-%d %H:%M:%S"),
            b.open,
            b.high,
            b.low,
            b.close,
            b.volume
        ));
    }
    fs::write(dir.join(format!("{}.csv", instrument.replace('/', "_"))), content).unwrap();
}
