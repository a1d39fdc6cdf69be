//! Historical replay.
//!
//! Each symbol gets its own orchestrator and is replayed independently. A
//! symbol whose strategy or data fails to load is reported and skipped.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::domain::bar::Bar;
use crate::domain::error::TraderError;
use crate::domain::orchestrator::{EngineSettings, StrategyOrchestrator};
use crate::domain::position::{ClosedTrade, Position};
use crate::domain::strategy::StrategyDefinition;
use crate::domain::timeframe::{TimeframeName, TimeframeSource};
use crate::ports::data_port::DataPort;
use crate::ports::position_store::PositionStore;

#[derive(Debug, Clone, PartialEq)]
pub struct TradeSummary {
    pub total: usize,
    pub won: usize,
    pub lost: usize,
    pub breakeven: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub total_pnl: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
}

impl TradeSummary {
    pub fn compute(trades: &[ClosedTrade]) -> Self {
        let mut won = 0usize;
        let mut lost = 0usize;
        let mut breakeven = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;

        for trade in trades {
            let pnl = trade.pnl;
            if pnl > 0.0 {
                won += 1;
                total_wins += pnl;
                largest_win = largest_win.max(pnl);
            } else if pnl < 0.0 {
                lost += 1;
                total_losses += pnl.abs();
                largest_loss = largest_loss.max(pnl.abs());
            } else {
                breakeven += 1;
            }
        }

        let total = trades.len();
        let win_rate = if total > 0 {
            won as f64 / total as f64
        } else {
            0.0
        };
        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        TradeSummary {
            total,
            won,
            lost,
            breakeven,
            win_rate,
            profit_factor,
            total_pnl: total_wins - total_losses,
            largest_win,
            largest_loss,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SymbolResult {
    pub symbol: String,
    pub strategy: String,
    pub bars: usize,
    pub trades: Vec<ClosedTrade>,
    pub final_cash: f64,
    pub realized_pnl: f64,
    pub commissions: f64,
    /// Still open at the end of the data.
    pub open_position: Option<Position>,
    pub summary: TradeSummary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolFailure {
    pub symbol: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct BacktestReport {
    pub results: Vec<SymbolResult>,
    pub failures: Vec<SymbolFailure>,
}

impl BacktestReport {
    pub fn total_trades(&self) -> usize {
        self.results.iter().map(|r| r.trades.len()).sum()
    }

    pub fn total_realized_pnl(&self) -> f64 {
        self.results.iter().map(|r| r.realized_pnl).sum()
    }
}

/// Build an orchestrator with every direct feed the strategy names preloaded.
pub fn build_orchestrator(
    symbol: &str,
    strategy: StrategyDefinition,
    settings: EngineSettings,
    data: &dyn DataPort,
) -> Result<StrategyOrchestrator, TraderError> {
    let mut direct = Vec::new();
    for name in [TimeframeName::Medium, TimeframeName::Long] {
        if let TimeframeSource::Direct { file_pattern } = &strategy.timeframe(name).source {
            let bars = data.fetch_direct(file_pattern, symbol)?;
            info!(symbol, timeframe = %name, bars = bars.len(), "direct feed loaded");
            direct.push((name, bars));
        }
    }
    let mut orchestrator = StrategyOrchestrator::new(symbol, strategy, settings);
    for (name, bars) in direct {
        orchestrator = orchestrator.with_direct_feed(name, bars);
    }
    Ok(orchestrator)
}

pub fn replay(orchestrator: &mut StrategyOrchestrator, bars: &[Bar]) {
    for bar in bars {
        orchestrator.on_base_bar(bar);
    }
    orchestrator.flush();
}

pub fn run_symbol(
    symbol: &str,
    strategy: StrategyDefinition,
    settings: EngineSettings,
    data: &dyn DataPort,
    store: Option<&Arc<dyn PositionStore>>,
) -> Result<SymbolResult, TraderError> {
    let bars = data.fetch_bars(symbol)?;
    if bars.is_empty() {
        return Err(TraderError::NoData {
            symbol: symbol.to_string(),
        });
    }
    let strategy_name = strategy.name.clone();
    let mut orchestrator = build_orchestrator(symbol, strategy, settings, data)?;
    if let Some(store) = store {
        if let Some(record) = store.load(symbol)? {
            orchestrator.restore(record);
        }
    }

    replay(&mut orchestrator, &bars);

    let trades = orchestrator.trades().to_vec();
    let account = orchestrator.account();
    let result = SymbolResult {
        symbol: symbol.to_string(),
        strategy: strategy_name,
        bars: bars.len(),
        summary: TradeSummary::compute(&trades),
        final_cash: account.cash,
        realized_pnl: account.realized_pnl,
        commissions: account.commissions,
        open_position: orchestrator.position().cloned(),
        trades,
    };
    info!(
        symbol,
        bars = result.bars,
        trades = result.trades.len(),
        final_cash = result.final_cash,
        "replay complete"
    );
    Ok(result)
}

pub fn run_backtest<F>(
    symbols: &[String],
    load_strategy: F,
    data: &dyn DataPort,
    settings: &EngineSettings,
    store: Option<&Arc<dyn PositionStore>>,
) -> BacktestReport
where
    F: Fn(&str) -> Result<StrategyDefinition, TraderError>,
{
    let mut report = BacktestReport::default();
    for symbol in symbols {
        let outcome = load_strategy(symbol)
            .and_then(|strategy| run_symbol(symbol, strategy, settings.clone(), data, store));
        match outcome {
            Ok(result) => report.results.push(result),
            Err(e) => {
                error!(symbol = %symbol, error = %e, "symbol skipped");
                report.failures.push(SymbolFailure {
                    symbol: symbol.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }
    if report.results.is_empty() && !symbols.is_empty() {
        warn!("no symbol completed");
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::execution::ExecutionConfig;
    use crate::domain::orchestrator::RunMode;
    use crate::domain::position::{ExitReason, Side};
    use crate::domain::strategy::fixtures::sample_strategy;
    use chrono::{Duration, NaiveDate, NaiveDateTime};
    use std::collections::HashMap;

    struct MemoryData {
        bars: HashMap<String, Vec<Bar>>,
    }

    impl DataPort for MemoryData {
        fn fetch_bars(&self, symbol: &str) -> Result<Vec<Bar>, TraderError> {
            self.bars
                .get(symbol)
                .cloned()
                .ok_or_else(|| TraderError::Data {
                    reason: format!("no file for {}", symbol),
                })
        }

        fn fetch_direct(&self, file_pattern: &str, symbol: &str) -> Result<Vec<Bar>, TraderError> {
            self.fetch_bars(&file_pattern.replace("{symbol}", symbol))
        }
    }

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    /// Flat at 100 for four bars, then a steady climb of 2 per bar.
    fn rally() -> Vec<Bar> {
        (0..11)
            .map(|i| {
                let close = if i < 4 { 100.0 } else { 100.0 + 2.0 * (i - 3) as f64 };
                Bar {
                    timestamp: start() + Duration::minutes(5 * i),
                    open: close,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 500.0,
                }
            })
            .collect()
    }

    fn settings() -> EngineSettings {
        EngineSettings {
            mode: RunMode::Backtest,
            initial_cash: 100_000.0,
            execution: ExecutionConfig {
                commission_pct: 0.0,
                slippage_pct: 0.0,
            },
        }
    }

    #[test]
    fn summary_counts() {
        let at = start();
        let trade = |pnl: f64| ClosedTrade {
            symbol: "X".into(),
            side: Side::Long,
            size: 1.0,
            entry_price: 1.0,
            exit_price: 1.0,
            entry_time: at,
            exit_time: at,
            pnl,
            exit_reason: ExitReason::StopLoss,
            entry_reason: String::new(),
        };
        let summary = TradeSummary::compute(&[trade(30.0), trade(-10.0), trade(0.0), trade(10.0)]);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.won, 2);
        assert_eq!(summary.lost, 1);
        assert!((summary.win_rate - 0.5).abs() < f64::EPSILON);
        assert!((summary.profit_factor - 4.0).abs() < f64::EPSILON);
        assert!((summary.total_pnl - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_summary() {
        let summary = TradeSummary::compute(&[]);
        assert_eq!(summary.total, 0);
        assert!((summary.profit_factor - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn failing_symbol_is_skipped() {
        let data = MemoryData {
            bars: HashMap::from([("GOOD".to_string(), rally())]),
        };
        let symbols = vec!["GOOD".to_string(), "MISSING".to_string(), "BADSTRAT".to_string()];
        let report = run_backtest(
            &symbols,
            |symbol| {
                if symbol == "BADSTRAT" {
                    Err(TraderError::UnknownIndicator { name: "foo".into() })
                } else {
                    Ok(sample_strategy(&["short: sma(1) > sma(3)"], &[]))
                }
            },
            &data,
            &settings(),
            None,
        );
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].symbol, "MISSING");
        assert_eq!(report.failures[1].symbol, "BADSTRAT");
    }

    #[test]
    fn rally_opens_long_position() {
        let data = MemoryData {
            bars: HashMap::from([("GOOD".to_string(), rally())]),
        };
        let strategy = sample_strategy(&["short: sma(1) > sma(3)"], &[]);
        let result = run_symbol("GOOD", strategy, settings(), &data, None).unwrap();
        assert_eq!(result.bars, 11);
        let position = result.open_position.expect("long still open");
        assert_eq!(position.side, Side::Long);
        assert!(result.trades.is_empty());
        // trailing stop followed the climb
        assert!(position.stop_price > position.entry_price - 4.0);
    }

    #[test]
    fn direct_feed_errors_fail_the_symbol() {
        let data = MemoryData {
            bars: HashMap::from([("GOOD".to_string(), rally())]),
        };
        let mut strategy = sample_strategy(&["short: sma(1) > sma(3)"], &[]);
        strategy.timeframes[2].source = TimeframeSource::Direct {
            file_pattern: "{symbol}_daily".into(),
        };
        assert!(run_symbol("GOOD", strategy, settings(), &data, None).is_err());
    }
}
