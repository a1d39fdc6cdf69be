//! File-bridge broker adapter.
//!
//! An external process keeps two CSV files current; both are re-read on every
//! pull.
//!
//! - quotes: `symbol,price,volume`, where volume is cumulative for the
//!   session. A row with symbol `CASH` carries the account cash in `price`.
//!   Empty fields mean "no value".
//! - positions: `symbol,size,price` with signed size (short < 0).

use crate::domain::error::TraderError;
use crate::ports::broker_port::{BrokerPort, BrokerPosition, Quote};
use std::fs;
use std::path::{Path, PathBuf};

const CASH_SYMBOL: &str = "CASH";

pub struct FileBrokerAdapter {
    quotes_path: PathBuf,
    positions_path: Option<PathBuf>,
}

impl FileBrokerAdapter {
    pub fn new(quotes_path: PathBuf, positions_path: Option<PathBuf>) -> Self {
        Self {
            quotes_path,
            positions_path,
        }
    }

    fn read(path: &Path) -> Result<String, TraderError> {
        fs::read_to_string(path).map_err(|e| TraderError::Broker {
            reason: format!("failed to read {}: {}", path.display(), e),
        })
    }

    fn quotes(&self) -> Result<Vec<Quote>, TraderError> {
        parse_quotes(&Self::read(&self.quotes_path)?)
    }
}

fn optional_number(
    field: Option<&str>,
    column: &str,
    line: u64,
) -> Result<Option<f64>, TraderError> {
    match field.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => v.parse().map(Some).map_err(|e| TraderError::Broker {
            reason: format!("line {}: invalid {} '{}': {}", line, column, v, e),
        }),
    }
}

pub fn parse_quotes(content: &str) -> Result<Vec<Quote>, TraderError> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(content.as_bytes());
    let mut quotes = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| TraderError::Broker {
            reason: format!("quotes CSV parse error: {}", e),
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let Some(symbol) = record.get(0).map(str::trim).filter(|s| !s.is_empty()) else {
            continue;
        };
        quotes.push(Quote {
            symbol: symbol.to_string(),
            price: optional_number(record.get(1), "price", line)?,
            cumulative_volume: optional_number(record.get(2), "volume", line)?,
        });
    }
    Ok(quotes)
}

pub fn parse_positions(content: &str) -> Result<Vec<BrokerPosition>, TraderError> {
    let mut rdr = csv::Reader::from_reader(content.as_bytes());
    let mut positions = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| TraderError::Broker {
            reason: format!("positions CSV parse error: {}", e),
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let Some(symbol) = record.get(0).map(str::trim).filter(|s| !s.is_empty()) else {
            continue;
        };
        let size = optional_number(record.get(1), "size", line)?.unwrap_or(0.0);
        let price = optional_number(record.get(2), "price", line)?.unwrap_or(0.0);
        positions.push(BrokerPosition {
            symbol: symbol.to_string(),
            size,
            price,
        });
    }
    Ok(positions)
}

impl BrokerPort for FileBrokerAdapter {
    fn latest_quote(&self, symbol: &str) -> Result<Option<Quote>, TraderError> {
        Ok(self.quotes()?.into_iter().find(|q| q.symbol == symbol))
    }

    fn cash(&self) -> Result<Option<f64>, TraderError> {
        Ok(self
            .quotes()?
            .into_iter()
            .find(|q| q.symbol == CASH_SYMBOL)
            .and_then(|q| q.price))
    }

    fn positions(&self) -> Result<Vec<BrokerPosition>, TraderError> {
        match &self.positions_path {
            Some(path) if path.exists() => parse_positions(&Self::read(path)?),
            // no file means the broker reports no open positions
            _ => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn quotes_with_gaps_and_cash() {
        let quotes =
            parse_quotes("symbol,price,volume\nBHP,45.20,120000\nCBA,,\nCASH,250000\n").unwrap();
        assert_eq!(quotes.len(), 3);
        assert_eq!(quotes[0].price, Some(45.2));
        assert_eq!(quotes[0].cumulative_volume, Some(120_000.0));
        assert_eq!(quotes[1].price, None);
        assert_eq!(quotes[2].symbol, "CASH");
        assert_eq!(quotes[2].cumulative_volume, None);
    }

    #[test]
    fn bad_price_is_broker_error() {
        assert!(matches!(
            parse_quotes("symbol,price,volume\nBHP,abc,1\n"),
            Err(TraderError::Broker { .. })
        ));
    }

    #[test]
    fn adapter_rereads_files() {
        let dir = TempDir::new().unwrap();
        let quotes = dir.path().join("quotes.csv");
        let positions = dir.path().join("positions.csv");
        fs::write(&quotes, "symbol,price,volume\nBHP,45.0,100\nCASH,1000\n").unwrap();
        let broker = FileBrokerAdapter::new(quotes.clone(), Some(positions.clone()));

        assert_eq!(broker.latest_quote("BHP").unwrap().unwrap().price, Some(45.0));
        assert_eq!(broker.latest_quote("XYZ").unwrap(), None);
        assert_eq!(broker.cash().unwrap(), Some(1000.0));
        assert!(broker.positions().unwrap().is_empty());

        fs::write(&quotes, "symbol,price,volume\nBHP,46.0,180\n").unwrap();
        fs::write(&positions, "symbol,size,price\nBHP,-100,45.5\n").unwrap();
        assert_eq!(broker.latest_quote("BHP").unwrap().unwrap().cumulative_volume, Some(180.0));
        assert_eq!(broker.cash().unwrap(), None);
        let held = broker.positions().unwrap();
        assert_eq!(held.len(), 1);
        assert!((held[0].size + 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_quotes_file_is_error() {
        let broker = FileBrokerAdapter::new(PathBuf::from("/nonexistent/quotes.csv"), None);
        assert!(broker.latest_quote("BHP").is_err());
    }
}
