//! Engine configuration.
//!
//! Reads and validates the `[engine]`, `[backtest]`, `[live]` and `[sqlite]`
//! sections before any symbol is started.

use std::collections::BTreeMap;

use crate::domain::error::TraderError;
use crate::domain::execution::ExecutionConfig;
use crate::domain::orchestrator::{EngineSettings, RunMode};
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_BARS_PATTERN: &str = "{symbol}.csv";
pub const DEFAULT_STALE_NOTIFICATION_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq)]
pub struct LiveConfig {
    pub quotes_file: Option<String>,
    pub positions_file: Option<String>,
    pub poll_interval_secs: u64,
    pub sync_interval_secs: u64,
    pub stale_notification_secs: u64,
    pub broker_timeout_ms: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        LiveConfig {
            quotes_file: None,
            positions_file: None,
            poll_interval_secs: 1,
            sync_interval_secs: 1,
            stale_notification_secs: DEFAULT_STALE_NOTIFICATION_SECS as u64,
            broker_timeout_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub symbols: Vec<String>,
    /// Strategy file per symbol; `strategy.<SYMBOL>` overrides `strategy`.
    pub strategy_files: BTreeMap<String, String>,
    pub data_dir: String,
    pub bars_pattern: String,
    pub initial_cash: f64,
    pub execution: ExecutionConfig,
    pub live: LiveConfig,
    pub sqlite_path: Option<String>,
}

impl EngineConfig {
    pub fn load(config: &dyn ConfigPort) -> Result<Self, TraderError> {
        validate_engine_config(config)?;

        let symbols = parse_symbols(config);
        let default_strategy = config.get_string("engine", "strategy");
        let mut strategy_files = BTreeMap::new();
        for symbol in &symbols {
            let key = format!("strategy.{}", symbol.to_lowercase());
            let path = config
                .get_string("engine", &key)
                .or_else(|| default_strategy.clone())
                .ok_or_else(|| TraderError::ConfigMissing {
                    section: "engine".to_string(),
                    key: "strategy".to_string(),
                })?;
            strategy_files.insert(symbol.clone(), path.trim().to_string());
        }

        let defaults = LiveConfig::default();
        Ok(EngineConfig {
            symbols,
            strategy_files,
            data_dir: config
                .get_string("engine", "data_dir")
                .unwrap_or_else(|| ".".to_string()),
            bars_pattern: config
                .get_string("engine", "bars_pattern")
                .unwrap_or_else(|| DEFAULT_BARS_PATTERN.to_string()),
            initial_cash: config.get_double("backtest", "initial_cash", 1_000_000.0),
            execution: ExecutionConfig {
                commission_pct: config.get_double("backtest", "commission_pct", 0.0),
                slippage_pct: config.get_double(
                    "backtest",
                    "slippage_pct",
                    ExecutionConfig::default().slippage_pct,
                ),
            },
            live: LiveConfig {
                quotes_file: config.get_string("live", "quotes_file"),
                positions_file: config.get_string("live", "positions_file"),
                poll_interval_secs: read_u64(
                    config,
                    "live",
                    "poll_interval_secs",
                    defaults.poll_interval_secs,
                ),
                sync_interval_secs: read_u64(
                    config,
                    "live",
                    "sync_interval_secs",
                    defaults.sync_interval_secs,
                ),
                stale_notification_secs: read_u64(
                    config,
                    "live",
                    "stale_notification_secs",
                    defaults.stale_notification_secs,
                ),
                broker_timeout_ms: read_u64(
                    config,
                    "live",
                    "broker_timeout_ms",
                    defaults.broker_timeout_ms,
                ),
            },
            sqlite_path: config
                .get_string("sqlite", "path")
                .filter(|p| !p.trim().is_empty()),
        })
    }

    pub fn settings(&self, mode: RunMode) -> EngineSettings {
        EngineSettings {
            mode,
            initial_cash: self.initial_cash,
            execution: self.execution.clone(),
        }
    }

    pub fn strategy_file(&self, symbol: &str) -> Option<&str> {
        self.strategy_files.get(symbol).map(String::as_str)
    }
}

fn read_u64(config: &dyn ConfigPort, section: &str, key: &str, default: u64) -> u64 {
    config.get_int(section, key, default as i64).max(0) as u64
}

fn parse_symbols(config: &dyn ConfigPort) -> Vec<String> {
    config
        .get_string("engine", "symbols")
        .map(|s| {
            s.split(',')
                .map(|c| c.trim().to_uppercase())
                .filter(|c| !c.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

pub fn validate_engine_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    validate_symbols(config)?;
    validate_initial_cash(config)?;
    validate_commission(config)?;
    validate_slippage(config)?;
    validate_live_intervals(config)?;
    Ok(())
}

/// Checks needed only by `live`: the broker bridge files must be named.
pub fn validate_live_config(config: &EngineConfig) -> Result<(), TraderError> {
    if config.live.quotes_file.as_deref().is_none_or(|f| f.trim().is_empty()) {
        return Err(TraderError::ConfigMissing {
            section: "live".to_string(),
            key: "quotes_file".to_string(),
        });
    }
    Ok(())
}

fn validate_symbols(config: &dyn ConfigPort) -> Result<(), TraderError> {
    if parse_symbols(config).is_empty() {
        return Err(TraderError::ConfigMissing {
            section: "engine".to_string(),
            key: "symbols".to_string(),
        });
    }
    Ok(())
}

fn validate_initial_cash(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let value = config.get_double("backtest", "initial_cash", 1_000_000.0);
    if value <= 0.0 {
        return Err(TraderError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "initial_cash".to_string(),
            reason: "initial_cash must be positive".to_string(),
        });
    }
    Ok(())
}

fn validate_commission(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let pct = config.get_double("backtest", "commission_pct", 0.0);
    if pct < 0.0 {
        return Err(TraderError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "commission_pct".to_string(),
            reason: "commission_pct must be non-negative".to_string(),
        });
    }
    Ok(())
}

fn validate_slippage(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let value = config.get_double("backtest", "slippage_pct", 0.0);
    if value < 0.0 {
        return Err(TraderError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "slippage_pct".to_string(),
            reason: "slippage_pct must be non-negative".to_string(),
        });
    }
    Ok(())
}

fn validate_live_intervals(config: &dyn ConfigPort) -> Result<(), TraderError> {
    for key in ["poll_interval_secs", "sync_interval_secs", "broker_timeout_ms"] {
        if config.get_int("live", key, 1) < 1 {
            return Err(TraderError::ConfigInvalid {
                section: "live".to_string(),
                key: key.to_string(),
                reason: format!("{} must be at least 1", key),
            });
        }
    }
    if config.get_int("live", "stale_notification_secs", DEFAULT_STALE_NOTIFICATION_SECS) < 0 {
        return Err(TraderError::ConfigInvalid {
            section: "live".to_string(),
            key: "stale_notification_secs".to_string(),
            reason: "stale_notification_secs must be non-negative".to_string(),
        });
    }
    Ok(())
}
