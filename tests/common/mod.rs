#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use mtftrader::domain::bar::Bar;
use mtftrader::domain::error::TraderError;
use mtftrader::ports::data_port::DataPort;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct MockDataPort {
    pub bars: HashMap<String, Vec<Bar>>,
    pub direct: HashMap<String, Vec<Bar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            bars: HashMap::new(),
            direct: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.bars.insert(symbol.to_string(), bars);
        self
    }

    /// Register a direct feed under its resolved name (`{symbol}` substituted).
    pub fn with_direct(mut self, resolved: &str, bars: Vec<Bar>) -> Self {
        self.direct.insert(resolved.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(&self, symbol: &str) -> Result<Vec<Bar>, TraderError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(TraderError::Data {
                reason: reason.clone(),
            });
        }
        self.bars
            .get(symbol)
            .cloned()
            .ok_or_else(|| TraderError::NoData {
                symbol: symbol.to_string(),
            })
    }

    fn fetch_direct(&self, file_pattern: &str, symbol: &str) -> Result<Vec<Bar>, TraderError> {
        let resolved = file_pattern.replace("{symbol}", symbol);
        self.direct
            .get(&resolved)
            .cloned()
            .ok_or(TraderError::NoData {
                symbol: resolved,
            })
    }
}

pub fn session_start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 4)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap()
}

pub fn make_bar(
    timestamp: NaiveDateTime,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
) -> Bar {
    Bar {
        timestamp,
        open,
        high,
        low,
        close,
        volume,
    }
}

/// Five-minute bars with a ±1 range around each close.
pub fn five_minute_series(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            make_bar(
                session_start() + Duration::minutes(5 * i as i64),
                c,
                c + 1.0,
                c - 1.0,
                c,
                1_000.0,
            )
        })
        .collect()
}

pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    path
}

/// Long-only trend follower on 5m/15m/60m with ATR(2) exits.
pub const TREND_STRATEGY_INI: &str = r#"
[strategy]
name = trend
short_enabled = false

[timeframe.short]
unit = minutes
multiplier = 5

[timeframe.medium]
unit = minutes
multiplier = 15

[timeframe.long]
unit = minutes
multiplier = 60

[entry]
long_1 = short: sma(1) > sma(3)

[exit]
stop_loss_timeframe = short
stop_loss_atr_period = 2
stop_loss_multiplier = 2
take_profit_timeframe = short
take_profit_atr_period = 2
take_profit_multiplier = 5

[sizing]
risk_per_trade = 0.01
max_notional_per_trade = 1000000
"#;
