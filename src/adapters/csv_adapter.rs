//! CSV bar file adapter.
//!
//! Files carry `datetime,open,high,low,close,volume` with a header row.
//! Timestamps are `%Y-%m-%d %H:%M:%S` or plain `%Y-%m-%d` (midnight).

use crate::domain::bar::Bar;
use crate::domain::error::TraderError;
use crate::ports::data_port::DataPort;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::fs;
use std::path::{Path, PathBuf};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct CsvAdapter {
    base_path: PathBuf,
    bars_pattern: String,
}

impl CsvAdapter {
    /// `bars_pattern` names the base bar file, e.g. `{symbol}_5m.csv`.
    pub fn new(base_path: PathBuf, bars_pattern: &str) -> Self {
        Self {
            base_path,
            bars_pattern: bars_pattern.to_string(),
        }
    }

    fn resolve(&self, pattern: &str, symbol: &str) -> PathBuf {
        let name = pattern.replace("{symbol}", symbol);
        let path = Path::new(&name);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }
}

pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, DATETIME_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, DATE_FORMAT)
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

fn parse_number(
    record: &csv::StringRecord,
    index: usize,
    column: &str,
    line: u64,
) -> Result<f64, TraderError> {
    record
        .get(index)
        .ok_or_else(|| TraderError::Data {
            reason: format!("line {}: missing {} column", line, column),
        })?
        .trim()
        .parse()
        .map_err(|e| TraderError::Data {
            reason: format!("line {}: invalid {} value: {}", line, column, e),
        })
}

/// Parse a bar file, returning bars sorted by timestamp.
pub fn read_bars(path: &Path) -> Result<Vec<Bar>, TraderError> {
    let content = fs::read_to_string(path).map_err(|e| TraderError::Data {
        reason: format!("failed to read {}: {}", path.display(), e),
    })?;
    parse_bars(&content).map_err(|e| match e {
        TraderError::Data { reason } => TraderError::Data {
            reason: format!("{}: {}", path.display(), reason),
        },
        other => other,
    })
}

pub fn parse_bars(content: &str) -> Result<Vec<Bar>, TraderError> {
    let mut rdr = csv::Reader::from_reader(content.as_bytes());
    let mut bars = Vec::new();

    for result in rdr.records() {
        let record = result.map_err(|e| TraderError::Data {
            reason: format!("CSV parse error: {}", e),
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let ts_str = record.get(0).ok_or_else(|| TraderError::Data {
            reason: format!("line {}: missing datetime column", line),
        })?;
        let timestamp = parse_timestamp(ts_str).ok_or_else(|| TraderError::Data {
            reason: format!("line {}: invalid datetime '{}'", line, ts_str),
        })?;

        bars.push(Bar {
            timestamp,
            open: parse_number(&record, 1, "open", line)?,
            high: parse_number(&record, 2, "high", line)?,
            low: parse_number(&record, 3, "low", line)?,
            close: parse_number(&record, 4, "close", line)?,
            volume: parse_number(&record, 5, "volume", line)?,
        });
    }

    bars.sort_by_key(|b| b.timestamp);
    bars.dedup_by_key(|b| b.timestamp);
    Ok(bars)
}

impl DataPort for CsvAdapter {
    fn fetch_bars(&self, symbol: &str) -> Result<Vec<Bar>, TraderError> {
        let path = self.resolve(&self.bars_pattern, symbol);
        if !path.exists() {
            return Err(TraderError::NoData {
                symbol: symbol.to_string(),
            });
        }
        read_bars(&path)
    }

    fn fetch_direct(&self, file_pattern: &str, symbol: &str) -> Result<Vec<Bar>, TraderError> {
        read_bars(&self.resolve(file_pattern, symbol))
    }
}
