//! Periodic broker reconciliation.
//!
//! The broker is the source of truth. Every cycle pulls positions and cash
//! and hands each symbol's slice to its worker; the worker decides what to
//! change. A failed pull skips the whole cycle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::domain::error::TraderError;
use crate::domain::reconcile::ReconcileAction;
use crate::live::call_broker;
use crate::live::worker::WorkerHandle;
use crate::ports::broker_port::BrokerPort;

/// Run one reconciliation cycle; returns the actions that changed state.
pub async fn sync_once(
    broker: &Arc<dyn BrokerPort>,
    workers: &[WorkerHandle],
    timeout: Duration,
) -> Result<Vec<(String, ReconcileAction)>, TraderError> {
    let positions = call_broker(broker.clone(), "positions", timeout, |b| b.positions()).await?;
    let cash = match call_broker(broker.clone(), "cash", timeout, |b| b.cash()).await {
        Ok(cash) => cash,
        Err(e) => {
            warn!(error = %e, "cash unavailable, keeping local figure");
            None
        }
    };

    let mut changed = Vec::new();
    for worker in workers {
        let held = positions
            .iter()
            .find(|p| p.symbol.eq_ignore_ascii_case(worker.symbol()))
            .cloned();
        match worker.reconcile(held, cash).await {
            Ok(Some(ReconcileAction::InSync)) => {}
            Ok(Some(action)) => {
                info!(symbol = worker.symbol(), ?action, "reconciled with broker");
                changed.push((worker.symbol().to_string(), action));
            }
            Ok(None) => debug!(symbol = worker.symbol(), "still in pre-roll"),
            Err(e) => warn!(symbol = worker.symbol(), error = %e, "reconcile skipped"),
        }
    }
    Ok(changed)
}

pub async fn run_synchronizer(
    broker: Arc<dyn BrokerPort>,
    workers: Vec<WorkerHandle>,
    sync_interval: Duration,
    timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(sync_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = sync_once(&broker, &workers, timeout).await {
                    warn!(error = %e, "broker sync cycle skipped");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("synchronizer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::log_notifier::LogNotifier;
    use crate::domain::bar::Bar;
    use crate::domain::orchestrator::{EngineSettings, RunMode, StateKind, StrategyOrchestrator};
    use crate::domain::strategy::fixtures::sample_strategy;
    use crate::live::notifier::spawn_notifier;
    use crate::live::wall_clock;
    use crate::live::worker::spawn_worker;
    use crate::ports::broker_port::{BrokerPosition, Quote};
    use chrono::NaiveDate;
    use std::sync::Mutex;

    struct FakeBroker {
        positions: Mutex<Vec<BrokerPosition>>,
        down: bool,
    }

    impl BrokerPort for FakeBroker {
        fn latest_quote(&self, _symbol: &str) -> Result<Option<Quote>, TraderError> {
            Ok(None)
        }
        fn cash(&self) -> Result<Option<f64>, TraderError> {
            Ok(Some(5_000.0))
        }
        fn positions(&self) -> Result<Vec<BrokerPosition>, TraderError> {
            if self.down {
                return Err(TraderError::Broker {
                    reason: "connection refused".into(),
                });
            }
            Ok(self.positions.lock().unwrap().clone())
        }
    }

    fn live_worker(symbol: &str) -> (WorkerHandle, tokio::task::JoinHandle<StrategyOrchestrator>) {
        let mut orch = StrategyOrchestrator::new(
            symbol,
            sample_strategy(&[], &[]),
            EngineSettings {
                mode: RunMode::Live,
                ..EngineSettings::default()
            },
        );
        let start = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        for i in 0..3 {
            orch.on_base_bar(&Bar {
                timestamp: start + chrono::Duration::minutes(5 * i),
                open: 50.0,
                high: 51.0,
                low: 49.0,
                close: 50.0,
                volume: 100.0,
            });
        }
        orch.enter_live_phase();
        let (notifier, _) = spawn_notifier(
            Arc::new(LogNotifier),
            chrono::Duration::seconds(300),
            wall_clock,
        );
        spawn_worker(orch, notifier, wall_clock)
    }

    #[tokio::test]
    async fn broker_position_is_injected_then_flattened() {
        let fake = Arc::new(FakeBroker {
            positions: Mutex::new(vec![BrokerPosition {
                symbol: "bhp".into(),
                size: 100.0,
                price: 50.0,
            }]),
            down: false,
        });
        let broker: Arc<dyn BrokerPort> = fake.clone();
        let (bhp, bhp_task) = live_worker("BHP");
        let (cba, cba_task) = live_worker("CBA");
        let workers = vec![bhp.clone(), cba.clone()];

        let changed = sync_once(&broker, &workers, Duration::from_secs(1)).await.unwrap();
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
        let snap = bhp.snapshot().await.unwrap();
        assert_eq!(snap.state, StateKind::Open);
        assert!((snap.cash - 5_000.0).abs() < f64::EPSILON);
        assert_eq!(cba.snapshot().await.unwrap().state, StateKind::Flat);

        assert!(sync_once(&broker, &workers, Duration::from_secs(1)).await.unwrap().is_empty());

        fake.positions.lock().unwrap().clear();
        let changed = sync_once(&broker, &workers, Duration::from_secs(1)).await.unwrap();
        assert_eq!(changed, vec![("BHP".to_string(), ReconcileAction::Flatten)]);
        assert_eq!(bhp.snapshot().await.unwrap().trades, 1);

        for w in &workers {
            w.shutdown().await;
        }
        bhp_task.await.unwrap();
        cba_task.await.unwrap();
    }

    #[tokio::test]
    async fn failed_pull_leaves_workers_untouched() {
        let broker: Arc<dyn BrokerPort> = Arc::new(FakeBroker {
            positions: Mutex::new(Vec::new()),
            down: true,
        });
        let (bhp, task) = live_worker("BHP");
        let result = sync_once(&broker, std::slice::from_ref(&bhp), Duration::from_secs(1)).await;
        assert!(matches!(result, Err(TraderError::Broker { .. })));
        let snap = bhp.snapshot().await.unwrap();
        assert_eq!(snap.state, StateKind::Flat);
        assert!((snap.cash - 1_000_000.0).abs() < f64::EPSILON);
        bhp.shutdown().await;
        task.await.unwrap();
    }
}
