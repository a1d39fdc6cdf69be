//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_broker_adapter::FileBrokerAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::log_notifier::LogNotifier;
use crate::domain::backtest::{BacktestReport, run_backtest as replay_symbols};
use crate::domain::config_validation::{EngineConfig, validate_live_config};
use crate::domain::error::TraderError;
use crate::domain::orchestrator::RunMode;
use crate::domain::strategy::StrategyDefinition;
use crate::domain::strategy_loader::load_strategy;
use crate::domain::timeframe::{TimeframeName, TimeframeSource};
use crate::live::runtime::{LiveContext, run_live, shutdown_on_ctrl_c};
use crate::live::wall_clock;
use crate::ports::position_store::PositionStore;

#[derive(Parser, Debug)]
#[command(name = "mtftrader", about = "Multi-timeframe strategy execution engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay historical bars through every configured symbol
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Run a single configured symbol
        #[arg(long)]
        symbol: Option<String>,
        /// Write the closed trades to this CSV file
        #[arg(short, long)]
        trades: Option<PathBuf>,
    },
    /// Pre-roll on history, then trade from the broker bridge until Ctrl-C
    Live {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Validate a strategy file
    Validate {
        #[arg(short, long)]
        strategy: PathBuf,
    },
    /// List persisted positions
    Positions {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            symbol,
            trades,
        } => run_backtest(&config, symbol.as_deref(), trades.as_ref()),
        Command::Live { config } => run_live_session(&config),
        Command::Validate { strategy } => run_validate(&strategy),
        Command::Positions { config } => run_positions(&config),
    }
}

/// Print an error, with a caret under the offending character for
/// condition parse failures, and map it to the process exit code.
pub fn report_error(err: &TraderError) -> ExitCode {
    match err {
        TraderError::ConditionParse { key, input, source } => {
            eprintln!(
                "error: failed to parse {}:\n{}",
                key,
                source.display_with_context(input)
            );
        }
        other => eprintln!("error: {other}"),
    }
    ExitCode::from(err)
}

pub fn load_strategy_file(path: &Path) -> Result<StrategyDefinition, TraderError> {
    let config = FileConfigAdapter::from_file(path)?;
    load_strategy(&config)
}

fn load_engine(config_path: &Path) -> Result<(FileConfigAdapter, EngineConfig), TraderError> {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = FileConfigAdapter::from_file(config_path)?;
    let engine = EngineConfig::load(&adapter)?;
    Ok((adapter, engine))
}

/// Strategy loader keyed by symbol, reading the file configured for it.
fn strategy_for<'a>(
    engine: &'a EngineConfig,
) -> impl Fn(&str) -> Result<StrategyDefinition, TraderError> + 'a {
    move |symbol| {
        let path = engine
            .strategy_file(symbol)
            .ok_or_else(|| TraderError::ConfigMissing {
                section: "engine".to_string(),
                key: format!("strategy.{}", symbol.to_lowercase()),
            })?;
        load_strategy_file(Path::new(path))
    }
}

#[cfg(feature = "sqlite")]
fn open_store(
    config: &FileConfigAdapter,
    engine: &EngineConfig,
) -> Result<Option<Arc<dyn PositionStore>>, TraderError> {
    use crate::adapters::sqlite_adapter::SqlitePositionStore;

    if engine.sqlite_path.is_none() {
        return Ok(None);
    }
    let store = SqlitePositionStore::from_config(config)?;
    Ok(Some(Arc::new(store)))
}

#[cfg(not(feature = "sqlite"))]
fn open_store(
    _config: &FileConfigAdapter,
    engine: &EngineConfig,
) -> Result<Option<Arc<dyn PositionStore>>, TraderError> {
    if engine.sqlite_path.is_some() {
        warn!("[sqlite] path set but the sqlite feature is disabled; positions are not persisted");
    }
    Ok(None)
}

fn run_backtest(
    config_path: &Path,
    symbol: Option<&str>,
    trades_path: Option<&PathBuf>,
) -> ExitCode {
    let (adapter, engine) = match load_engine(config_path) {
        Ok(loaded) => loaded,
        Err(e) => return report_error(&e),
    };

    let symbols = match symbol {
        Some(s) => {
            let wanted = s.trim().to_uppercase();
            if !engine.symbols.contains(&wanted) {
                return report_error(&TraderError::ConfigInvalid {
                    section: "engine".to_string(),
                    key: "symbols".to_string(),
                    reason: format!("{wanted} is not configured"),
                });
            }
            vec![wanted]
        }
        None => engine.symbols.clone(),
    };

    let store = match open_store(&adapter, &engine) {
        Ok(s) => s,
        Err(e) => return report_error(&e),
    };
    let data = CsvAdapter::new(PathBuf::from(&engine.data_dir), &engine.bars_pattern);
    let settings = engine.settings(RunMode::Backtest);

    eprintln!("Replaying {} symbol(s)...", symbols.len());
    let report = replay_symbols(&symbols, strategy_for(&engine), &data, &settings, store.as_ref());
    print_report(&report);

    if let Some(path) = trades_path {
        if let Err(e) = write_trades(path, &report) {
            return report_error(&e);
        }
        eprintln!("Trades written to {}", path.display());
    }

    if report.results.is_empty() {
        eprintln!("error: no symbol completed");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn print_report(report: &BacktestReport) {
    println!(
        "{:<10} {:<16} {:>8} {:>7} {:>8} {:>10} {:>14} {:>14}",
        "symbol", "strategy", "bars", "trades", "win%", "pf", "realized", "cash"
    );
    for r in &report.results {
        let pf = if r.summary.profit_factor.is_finite() {
            format!("{:.2}", r.summary.profit_factor)
        } else {
            "inf".to_string()
        };
        println!(
            "{:<10} {:<16} {:>8} {:>7} {:>7.1}% {:>10} {:>14.2} {:>14.2}",
            r.symbol,
            r.strategy,
            r.bars,
            r.summary.total,
            r.summary.win_rate * 100.0,
            pf,
            r.realized_pnl,
            r.final_cash
        );
        if let Some(pos) = &r.open_position {
            println!(
                "  open {} {} @ {:.4} (stop {:.4}, target {:.4})",
                pos.side, pos.size, pos.entry_price, pos.stop_price, pos.target_price
            );
        }
    }
    for f in &report.failures {
        println!("{:<10} skipped: {}", f.symbol, f.reason);
    }
    println!(
        "total: {} trades, realized {:.2}",
        report.total_trades(),
        report.total_realized_pnl()
    );
}

pub fn write_trades(path: &Path, report: &BacktestReport) -> Result<(), TraderError> {
    let mut writer = csv::Writer::from_path(path).map_err(std::io::Error::from)?;
    writer
        .write_record([
            "symbol",
            "side",
            "size",
            "entry_time",
            "entry_price",
            "exit_time",
            "exit_price",
            "pnl",
            "exit_reason",
            "entry_reason",
        ])
        .map_err(std::io::Error::from)?;
    for trade in report.results.iter().flat_map(|r| r.trades.iter()) {
        writer
            .write_record([
                trade.symbol.clone(),
                trade.side.to_string(),
                trade.size.to_string(),
                trade.entry_time.format("%Y-%m-%d %H:%M:%S").to_string(),
                trade.entry_price.to_string(),
                trade.exit_time.format("%Y-%m-%d %H:%M:%S").to_string(),
                trade.exit_price.to_string(),
                format!("{:.2}", trade.pnl),
                trade.exit_reason.to_string(),
                trade.entry_reason.clone(),
            ])
            .map_err(std::io::Error::from)?;
    }
    writer.flush()?;
    Ok(())
}

fn run_live_session(config_path: &Path) -> ExitCode {
    let (adapter, engine) = match load_engine(config_path) {
        Ok(loaded) => loaded,
        Err(e) => return report_error(&e),
    };
    if let Err(e) = validate_live_config(&engine) {
        return report_error(&e);
    }

    let loader = strategy_for(&engine);
    let mut symbols = Vec::new();
    for symbol in &engine.symbols {
        match loader(symbol) {
            Ok(strategy) => symbols.push((symbol.clone(), strategy)),
            Err(e) => {
                eprintln!("{symbol}: strategy not loaded");
                let _ = report_error(&e);
            }
        }
    }
    if symbols.is_empty() {
        eprintln!("error: no symbol has a usable strategy");
        return ExitCode::from(4);
    }

    let store = match open_store(&adapter, &engine) {
        Ok(Some(s)) => Some(s),
        Ok(None) => {
            warn!("no [sqlite] path configured; positions are not persisted");
            None
        }
        Err(e) => return report_error(&e),
    };

    let quotes = engine.live.quotes_file.clone().unwrap_or_default();
    let broker = FileBrokerAdapter::new(
        PathBuf::from(quotes),
        engine.live.positions_file.as_ref().map(PathBuf::from),
    );
    let context = LiveContext {
        broker: Arc::new(broker),
        sink: Arc::new(LogNotifier),
        store,
        config: engine.live.clone(),
        clock: wall_clock,
    };
    let data = CsvAdapter::new(PathBuf::from(&engine.data_dir), &engine.bars_pattern);
    let settings = engine.settings(RunMode::Live);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => return report_error(&TraderError::Io(e)),
    };
    let outcome = runtime.block_on(async {
        let shutdown = shutdown_on_ctrl_c();
        run_live(symbols, settings, &data, context, shutdown).await
    });

    match outcome {
        Ok(outcome) => {
            for orch in &outcome.orchestrators {
                match orch.position() {
                    Some(pos) => println!(
                        "{:<10} {} {} @ {:.4}",
                        orch.symbol(),
                        pos.side,
                        pos.size,
                        pos.entry_price
                    ),
                    None => println!("{:<10} flat", orch.symbol()),
                }
            }
            info!("live session ended");
            ExitCode::SUCCESS
        }
        Err(e) => report_error(&e),
    }
}

fn run_validate(strategy_path: &Path) -> ExitCode {
    eprintln!("Validating strategy: {}", strategy_path.display());
    let strategy = match load_strategy_file(strategy_path) {
        Ok(s) => s,
        Err(e) => return report_error(&e),
    };

    eprintln!("\nStrategy: {}", strategy.name);
    eprintln!("\nTimeframes:");
    for name in [TimeframeName::Short, TimeframeName::Medium, TimeframeName::Long] {
        let tf = strategy.timeframe(name);
        let source = match &tf.source {
            TimeframeSource::Resample => "resample".to_string(),
            TimeframeSource::Direct { file_pattern } => format!("direct {file_pattern}"),
        };
        eprintln!("  {:<7} {} x {:?} ({})", name.to_string(), tf.multiplier, tf.unit, source);
    }

    for (label, enabled, conditions) in [
        ("Entry Long", strategy.trading_mode.long_enabled, &strategy.entry_long),
        ("Entry Short", strategy.trading_mode.short_enabled, &strategy.entry_short),
    ] {
        if !enabled {
            eprintln!("\n{label}: disabled");
            continue;
        }
        eprintln!("\n{label}:");
        for condition in conditions {
            eprintln!("  {condition}");
        }
    }

    eprintln!("\nExits:");
    eprintln!(
        "  stop loss:   {} x atr({}) on {}",
        strategy.stop_loss.multiplier, strategy.stop_loss.atr_period, strategy.stop_loss.timeframe
    );
    eprintln!(
        "  take profit: {} x atr({}) on {}",
        strategy.take_profit.multiplier,
        strategy.take_profit.atr_period,
        strategy.take_profit.timeframe
    );

    let mut indicators: Vec<String> = strategy
        .indicator_keys()
        .iter()
        .map(|k| k.to_string())
        .collect();
    indicators.sort();
    indicators.dedup();
    eprintln!("\nIndicators to compute:");
    for ind in &indicators {
        eprintln!("  {ind}");
    }

    eprintln!("\nStrategy configuration is valid.");
    ExitCode::SUCCESS
}

fn run_positions(config_path: &Path) -> ExitCode {
    let (adapter, engine) = match load_engine(config_path) {
        Ok(loaded) => loaded,
        Err(e) => return report_error(&e),
    };
    let store = match open_store(&adapter, &engine) {
        Ok(Some(s)) => s,
        Ok(None) => {
            return report_error(&TraderError::ConfigMissing {
                section: "sqlite".to_string(),
                key: "path".to_string(),
            });
        }
        Err(e) => return report_error(&e),
    };
    let records = match store.load_all() {
        Ok(r) => r,
        Err(e) => return report_error(&e),
    };
    if records.is_empty() {
        eprintln!("No persisted positions");
    }
    for r in &records {
        println!(
            "{:<10} {:>12} @ {:<12} since {}",
            r.symbol,
            r.size,
            r.price,
            r.entry_time.format("%Y-%m-%d %H:%M:%S")
        );
    }
    ExitCode::SUCCESS
}
