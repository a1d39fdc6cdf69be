//! End-to-end tests across the domain, adapters and live runtime.
//!
//! Tests cover:
//! - Bar synthesis (tick aggregation, 5m -> 60m resampling)
//! - Indicator edge cases (ADX on flat and trending series, VWAP session reset)
//! - Risk sizing
//! - Replay with stop-loss exits and the one-pending-order invariant
//! - Broker reconciliation through the file bridge
//! - SQLite persistence across a restart

mod common;

use approx::assert_relative_eq;
use chrono::Duration;
use common::*;
use mtftrader::adapters::file_config_adapter::FileConfigAdapter;
use mtftrader::domain::backtest::{run_backtest, run_symbol};
use mtftrader::domain::bar::Bar;
use mtftrader::domain::execution::ExecutionConfig;
use mtftrader::domain::orchestrator::{EngineSettings, RunMode, StateKind, StrategyOrchestrator};
use mtftrader::domain::position::{ExitReason, Side};
use mtftrader::domain::strategy::StrategyDefinition;
use mtftrader::domain::strategy_loader::load_strategy;

fn trend_strategy() -> StrategyDefinition {
    let config = FileConfigAdapter::from_string(TREND_STRATEGY_INI).unwrap();
    load_strategy(&config).unwrap()
}

fn frictionless(mode: RunMode) -> EngineSettings {
    EngineSettings {
        mode,
        initial_cash: 100_000.0,
        execution: ExecutionConfig {
            commission_pct: 0.0,
            slippage_pct: 0.0,
        },
    }
}

/// Flat, a one-bar pop that fires the entry, a quiet fill bar, then a crash
/// through the stop.
fn pop_then_crash() -> Vec<Bar> {
    let mut bars = five_minute_series(&[100.0, 100.0, 100.0, 100.0, 101.0, 101.0]);
    bars.push(make_bar(
        session_start() + Duration::minutes(30),
        100.0,
        101.0,
        95.0,
        96.0,
        1_000.0,
    ));
    bars
}

mod bar_synthesis {
    use super::*;
    use mtftrader::domain::bar_aggregator::{BarAggregator, Tick};
    use mtftrader::domain::resampler::TimeframeResampler;
    use mtftrader::domain::timeframe::{TimeUnit, TimeframeDef, TimeframeName};
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn aggregated_bars_are_ordered_and_keep_all_volume(
            steps in prop::collection::vec((1i64..600, 1.0f64..1000.0, 0u32..100), 1..200)
        ) {
            let five_minutes = TimeframeDef::new(TimeframeName::Short, TimeUnit::Minutes, 5);
            let mut agg = BarAggregator::new(five_minutes);
            let mut now = session_start();
            let mut cumulative = 0.0;
            let mut bars = Vec::new();
            for (dt, price, added) in steps {
                now += Duration::seconds(dt);
                cumulative += f64::from(added);
                let tick = Tick {
                    timestamp: now,
                    price: Some(price),
                    cumulative_volume: Some(cumulative),
                };
                bars.extend(agg.update(&tick));
            }
            bars.extend(agg.flush());

            for pair in bars.windows(2) {
                prop_assert!(pair[0].timestamp < pair[1].timestamp);
            }
            for bar in &bars {
                prop_assert!(bar.low <= bar.open && bar.open <= bar.high);
                prop_assert!(bar.low <= bar.close && bar.close <= bar.high);
                prop_assert!(bar.volume >= 0.0);
            }
            let total: f64 = bars.iter().map(|b| b.volume).sum();
            prop_assert!((total - cumulative).abs() < 1e-6);
        }
    }

    #[test]
    fn five_minute_bars_resample_to_hours() {
        let bars: Vec<Bar> = (0..24)
            .map(|i| {
                let base = 50.0 + i as f64;
                make_bar(
                    session_start() + Duration::minutes(5 * i),
                    base,
                    base + 3.0,
                    base - 2.0,
                    base + 1.0,
                    10.0 + i as f64,
                )
            })
            .collect();
        let hour = TimeframeDef::new(TimeframeName::Long, TimeUnit::Hours, 1);
        let mut hourly = TimeframeResampler::resample(hour);

        let mut out = Vec::new();
        for bar in &bars {
            out.extend(hourly.on_base_bar(bar, Duration::minutes(5)));
        }
        assert_eq!(out.len(), 1, "the second hour closes only on flush");
        out.extend(hourly.flush());
        assert_eq!(out.len(), 2);

        for (hour, chunk) in out.iter().zip(bars.chunks(12)) {
            assert_eq!(hour.timestamp, chunk[0].timestamp + Duration::hours(1));
            assert_relative_eq!(hour.open, chunk[0].open);
            assert_relative_eq!(hour.close, chunk[11].close);
            let high = chunk.iter().map(|b| b.high).fold(f64::MIN, f64::max);
            let low = chunk.iter().map(|b| b.low).fold(f64::MAX, f64::min);
            assert_relative_eq!(hour.high, high);
            assert_relative_eq!(hour.low, low);
            let volume: f64 = chunk.iter().map(|b| b.volume).sum();
            assert_relative_eq!(hour.volume, volume);
        }
    }
}

mod indicator_edges {
    use super::*;
    use mtftrader::domain::indicator::adx::Adx;
    use mtftrader::domain::indicator::vwap::Vwap;

    #[test]
    fn adx_on_flat_series_is_zero() {
        let mut adx = Adx::new(5);
        let mut last = None;
        for i in 0..30 {
            last = adx.update(&make_bar(
                session_start() + Duration::minutes(5 * i),
                10.0,
                10.0,
                10.0,
                10.0,
                1.0,
            ));
        }
        let out = last.expect("ready after warm-up");
        assert_relative_eq!(out.adx, 0.0);
        assert_relative_eq!(out.plus_di, 0.0);
        assert_relative_eq!(out.minus_di, 0.0);
    }

    #[test]
    fn adx_on_steady_rise_is_fully_directional() {
        let mut adx = Adx::new(5);
        let mut last = None;
        for i in 0..40 {
            let c = 100.0 + i as f64;
            last = adx.update(&make_bar(
                session_start() + Duration::minutes(5 * i),
                c,
                c + 1.0,
                c - 1.0,
                c,
                1.0,
            ));
        }
        let out = last.expect("ready after warm-up");
        assert!(out.plus_di > out.minus_di);
        assert_relative_eq!(out.minus_di, 0.0);
        assert_relative_eq!(out.adx, 100.0, epsilon = 1e-6);
    }

    #[test]
    fn vwap_resets_on_new_day() {
        let mut vwap = Vwap::new();
        let day1 = session_start();
        vwap.update(&make_bar(day1, 10.0, 12.0, 8.0, 10.0, 100.0));
        let v = vwap
            .update(&make_bar(day1 + Duration::minutes(5), 20.0, 22.0, 18.0, 20.0, 300.0))
            .unwrap();
        assert_relative_eq!(v, 17.5);

        let day2 = day1 + Duration::days(1);
        let v = vwap
            .update(&make_bar(day2, 30.0, 33.0, 27.0, 30.0, 50.0))
            .unwrap();
        assert_relative_eq!(v, 30.0);
    }
}

mod sizing {
    use mtftrader::domain::order::position_size;
    use mtftrader::domain::strategy::SizingSpec;

    #[test]
    fn risk_budget_divided_by_stop_distance() {
        let sizing = SizingSpec {
            risk_per_trade: 0.01,
            max_notional_per_trade: 1_000_000.0,
        };
        let size = position_size(100_000.0, &sizing, 2.0, 50.0).unwrap();
        assert!((size - 500.0).abs() < 1e-9);
    }

    #[test]
    fn notional_cap_wins_when_smaller() {
        let sizing = SizingSpec {
            risk_per_trade: 0.01,
            max_notional_per_trade: 5_000.0,
        };
        let size = position_size(100_000.0, &sizing, 2.0, 50.0).unwrap();
        assert!((size - 100.0).abs() < 1e-9);
    }

    #[test]
    fn zero_risk_distance_gives_no_size() {
        assert!(position_size(100_000.0, &SizingSpec::default(), 0.0, 50.0).is_none());
    }
}

mod replay {
    use super::*;

    #[test]
    fn pop_then_crash_books_one_stop_loss() {
        let data = MockDataPort::new().with_bars("BHP", pop_then_crash());
        let settings = frictionless(RunMode::Backtest);
        let result = run_symbol("BHP", trend_strategy(), settings, &data, None).unwrap();

        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.side, Side::Long);
        assert_eq!(trade.exit_reason, ExitReason::StopLoss);
        assert_relative_eq!(trade.entry_price, 101.0);
        assert_relative_eq!(trade.exit_price, 97.0);
        assert_relative_eq!(trade.size, 250.0);
        assert_relative_eq!(trade.pnl, -1_000.0);
        assert_relative_eq!(result.final_cash, 99_000.0);
        assert!(result.open_position.is_none());
        assert_eq!(result.summary.lost, 1);
    }

    #[test]
    fn at_most_one_pending_order_and_never_beside_an_entry() {
        let mut orch =
            StrategyOrchestrator::new("BHP", trend_strategy(), frictionless(RunMode::Backtest));
        for bar in pop_then_crash() {
            orch.on_base_bar(&bar);
            let pending = orch.pending_order().is_some();
            match orch.state_kind() {
                StateKind::EntryPending => {
                    assert!(pending);
                    assert!(orch.position().is_none());
                    assert!(orch.tentative_levels().is_some());
                }
                StateKind::ExitPending => assert!(pending && orch.position().is_some()),
                StateKind::Open => {
                    assert!(!pending);
                    assert!(orch.oco().is_some());
                }
                StateKind::Flat | StateKind::Restoring => assert!(!pending),
            }
        }
    }

    #[test]
    fn failures_are_reported_per_symbol() {
        let data = MockDataPort::new()
            .with_bars("BHP", pop_then_crash())
            .with_error("CBA", "corrupt file");
        let symbols = vec!["BHP".to_string(), "CBA".to_string(), "WBC".to_string()];
        let report = run_backtest(
            &symbols,
            |_| Ok(trend_strategy()),
            &data,
            &frictionless(RunMode::Backtest),
            None,
        );
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures[0].reason.contains("corrupt file"));
        assert_eq!(report.total_trades(), 1);
    }
}

mod reconciliation {
    use super::*;
    use mtftrader::adapters::file_broker_adapter::FileBrokerAdapter;
    use mtftrader::adapters::log_notifier::LogNotifier;
    use mtftrader::domain::reconcile::ReconcileAction;
    use mtftrader::live::notifier::spawn_notifier;
    use mtftrader::live::synchronizer::sync_once;
    use mtftrader::live::wall_clock;
    use mtftrader::live::worker::spawn_worker;
    use mtftrader::ports::broker_port::BrokerPort;
    use mtftrader::ports::notification_port::NotificationSink;
    use std::sync::Arc;

    #[tokio::test]
    async fn file_bridge_position_is_adopted() {
        let dir = tempfile::TempDir::new().unwrap();
        let quotes = write_file(
            dir.path(),
            "quotes.csv",
            "symbol,price,volume\nBHP,50,1000\nCASH,42000,\n",
        );
        let positions = write_file(dir.path(), "positions.csv", "symbol,size,price\nBHP,100,50\n");
        let broker: Arc<dyn BrokerPort> =
            Arc::new(FileBrokerAdapter::new(quotes, Some(positions.clone())));

        let mut orch =
            StrategyOrchestrator::new("BHP", trend_strategy(), frictionless(RunMode::Live));
        for bar in five_minute_series(&[50.0, 50.0, 50.0]) {
            orch.on_base_bar(&bar);
        }
        orch.enter_live_phase();
        let sink: Arc<dyn NotificationSink> = Arc::new(LogNotifier);
        let (notifier, _) = spawn_notifier(sink, chrono::Duration::seconds(300), wall_clock);
        let (worker, task) = spawn_worker(orch, notifier, wall_clock);
        let workers = vec![worker.clone()];

        let changed = sync_once(&broker, &workers, std::time::Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(
            changed,
            vec![(
                "BHP".to_string(),
                ReconcileAction::Inject {
                    size: 100.0,
                    price: 50.0
                }
            )]
        );
        let snap = worker.snapshot().await.unwrap();
        assert_eq!(snap.state, StateKind::Open);
        assert_relative_eq!(snap.cash, 42_000.0);

        write_file(dir.path(), "positions.csv", "symbol,size,price\nBHP,-30,52\n");
        let changed = sync_once(&broker, &workers, std::time::Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(
            changed,
            vec![(
                "BHP".to_string(),
                ReconcileAction::Overwrite {
                    size: -30.0,
                    price: 52.0
                }
            )]
        );
        let pos = worker.snapshot().await.unwrap().position.unwrap();
        assert_eq!(pos.side, Side::Short);
        assert_relative_eq!(pos.stop_price, 56.0);

        worker.shutdown().await;
        task.await.unwrap();
    }
}

#[cfg(feature = "sqlite")]
mod persistence {
    use super::*;
    use mtftrader::adapters::sqlite_adapter::SqlitePositionStore;
    use mtftrader::live::runtime::preroll;
    use mtftrader::ports::broker_port::BrokerPosition;
    use mtftrader::ports::position_store::PositionStore;
    use std::sync::Arc;

    #[test]
    fn position_survives_restart_and_saves_idempotently() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = dir.path().join("positions.db");
        let db = db.to_str().unwrap();
        let history = MockDataPort::new().with_bars("BHP", five_minute_series(&[50.0, 50.0, 50.0]));

        {
            let store: Arc<dyn PositionStore> = Arc::new(SqlitePositionStore::open(db, 2).unwrap());
            let settings = frictionless(RunMode::Live);
            let mut orch =
                preroll("BHP", trend_strategy(), settings, &history, Some(&store)).unwrap();
            let broker = BrokerPosition {
                symbol: "BHP".into(),
                size: 100.0,
                price: 50.0,
            };
            orch.reconcile(Some(&broker), session_start() + chrono::Duration::minutes(20));
            assert!(!orch.has_pending_persistence());
        }

        let store: Arc<dyn PositionStore> = Arc::new(SqlitePositionStore::open(db, 2).unwrap());
        let records = store.load_all().unwrap();
        assert_eq!(records.len(), 1);
        let saved = records[0].clone();
        assert_relative_eq!(saved.size, 100.0);

        let settings = frictionless(RunMode::Live);
        let orch = preroll("BHP", trend_strategy(), settings, &history, Some(&store)).unwrap();
        let pos = orch.position().expect("restored");
        assert_relative_eq!(pos.size, 100.0);
        assert_relative_eq!(pos.entry_price, 50.0);
        assert_eq!(pos.entry_time, saved.entry_time);

        store.save(&saved).unwrap();
        store.save(&saved).unwrap();
        assert_eq!(store.load_all().unwrap(), vec![saved]);
    }
}
