//! Live session wiring: pre-roll, task start-up and ordered shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::domain::backtest::build_orchestrator;
use crate::domain::config_validation::LiveConfig;
use crate::domain::error::TraderError;
use crate::domain::orchestrator::{EngineSettings, StrategyOrchestrator};
use crate::domain::strategy::StrategyDefinition;
use crate::live::Clock;
use crate::live::ingest::{QuoteIngest, run_ingest};
use crate::live::notifier::{NotifierStats, spawn_notifier};
use crate::live::synchronizer::run_synchronizer;
use crate::live::worker::spawn_worker;
use crate::ports::broker_port::BrokerPort;
use crate::ports::data_port::DataPort;
use crate::ports::notification_port::NotificationSink;
use crate::ports::position_store::PositionStore;

/// Everything outside the engine that a live session talks to.
pub struct LiveContext {
    pub broker: Arc<dyn BrokerPort>,
    pub sink: Arc<dyn NotificationSink>,
    pub store: Option<Arc<dyn PositionStore>>,
    pub config: LiveConfig,
    pub clock: Clock,
}

pub struct LiveOutcome {
    pub orchestrators: Vec<StrategyOrchestrator>,
    pub notifications: NotifierStats,
}

/// Warm up one symbol on its stored history and hand it over to live mode.
///
/// A persisted position is restored before the replay, so its exit levels
/// come from the same indicator state the live bars will continue. A symbol
/// with no history starts cold.
pub fn preroll(
    symbol: &str,
    strategy: StrategyDefinition,
    settings: EngineSettings,
    data: &dyn DataPort,
    store: Option<&Arc<dyn PositionStore>>,
) -> Result<StrategyOrchestrator, TraderError> {
    let history = match data.fetch_bars(symbol) {
        Ok(bars) => bars,
        Err(TraderError::NoData { .. }) => {
            warn!(symbol, "no history, starting cold");
            Vec::new()
        }
        Err(e) => return Err(e),
    };

    let mut orchestrator = build_orchestrator(symbol, strategy, settings, data)?;
    if let Some(store) = store {
        orchestrator = orchestrator.with_store(store.clone());
        if let Some(record) = store.load(symbol)? {
            orchestrator.restore(record);
        }
    }

    for bar in &history {
        orchestrator.on_base_bar(bar);
    }
    orchestrator.enter_live_phase();
    info!(
        symbol,
        bars = history.len(),
        state = ?orchestrator.state_kind(),
        "pre-roll complete"
    );
    Ok(orchestrator)
}

/// Run until `shutdown` flips to true, then stop ingest first, drain the
/// workers, and let the notifier empty its queues.
pub async fn run_live(
    symbols: Vec<(String, StrategyDefinition)>,
    settings: EngineSettings,
    data: &dyn DataPort,
    context: LiveContext,
    mut shutdown: watch::Receiver<bool>,
) -> Result<LiveOutcome, TraderError> {
    let LiveContext {
        broker,
        sink,
        store,
        config,
        clock,
    } = context;
    let timeout = Duration::from_millis(config.broker_timeout_ms.max(1));
    let stale_after = chrono::Duration::seconds(config.stale_notification_secs as i64);

    let (notifier, notifier_task) = spawn_notifier(sink, stale_after, clock);

    let mut workers = Vec::new();
    let mut worker_tasks = Vec::new();
    let mut ingest_tasks = Vec::new();
    for (symbol, strategy) in symbols {
        let base = strategy.base().clone();
        let orchestrator = match preroll(
            &symbol,
            strategy,
            settings.clone(),
            data,
            store.as_ref(),
        ) {
            Ok(o) => o,
            Err(e) => {
                error!(symbol = %symbol, error = %e, "symbol not started");
                continue;
            }
        };
        let (worker, task) = spawn_worker(orchestrator, notifier.clone(), clock);
        let ingest = QuoteIngest::new(base, broker.clone(), worker.clone(), timeout, clock);
        ingest_tasks.push(tokio::spawn(run_ingest(
            ingest,
            Duration::from_secs(config.poll_interval_secs.max(1)),
            shutdown.clone(),
        )));
        workers.push(worker);
        worker_tasks.push(task);
    }
    if workers.is_empty() {
        return Err(TraderError::Data {
            reason: "no symbol could be started".to_string(),
        });
    }
    info!(symbols = workers.len(), "live session running");

    let sync_task = tokio::spawn(run_synchronizer(
        broker.clone(),
        workers.clone(),
        Duration::from_secs(config.sync_interval_secs.max(1)),
        timeout,
        shutdown.clone(),
    ));

    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }
    info!("shutdown requested");

    for task in ingest_tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "ingest task failed");
        }
    }
    if let Err(e) = sync_task.await {
        warn!(error = %e, "synchronizer task failed");
    }

    for worker in &workers {
        worker.shutdown().await;
    }
    let mut orchestrators = Vec::new();
    for task in worker_tasks {
        match task.await {
            Ok(orchestrator) => orchestrators.push(orchestrator),
            Err(e) => warn!(error = %e, "worker task failed"),
        }
    }
    drop(workers);
    drop(notifier);

    let notifications = notifier_task.await.unwrap_or_else(|e| {
        warn!(error = %e, "notifier task failed");
        NotifierStats::default()
    });
    info!(
        delivered = notifications.delivered,
        dropped_stale = notifications.dropped_stale,
        failed = notifications.failed,
        "live session stopped"
    );
    Ok(LiveOutcome {
        orchestrators,
        notifications,
    })
}

/// Shutdown signal that flips on Ctrl-C.
pub fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received");
                let _ = tx.send(true);
            }
            Err(e) => {
                error!(error = %e, "cannot listen for interrupt");
                std::future::pending::<()>().await;
            }
        }
    });
    rx
}
