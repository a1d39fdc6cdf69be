//! Per-symbol worker task.
//!
//! The worker is the only code that touches its orchestrator. Bars, broker
//! reconciliation and snapshot requests all arrive as messages, so a
//! synchronizer override can never interleave with bar processing.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::domain::bar::Bar;
use crate::domain::error::TraderError;
use crate::domain::orchestrator::{StateKind, StrategyOrchestrator};
use crate::domain::position::Position;
use crate::domain::reconcile::ReconcileAction;
use crate::live::Clock;
use crate::live::notifier::NotifierHandle;
use crate::ports::broker_port::BrokerPosition;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug)]
pub enum WorkerMessage {
    Bar(Bar),
    /// Reply is `None` while the symbol is still in pre-roll.
    Reconcile {
        broker: Option<BrokerPosition>,
        cash: Option<f64>,
        reply: oneshot::Sender<Option<ReconcileAction>>,
    },
    Snapshot(oneshot::Sender<WorkerSnapshot>),
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSnapshot {
    pub symbol: String,
    pub state: StateKind,
    pub position: Option<Position>,
    pub live: bool,
    pub trades: usize,
    pub cash: f64,
}

#[derive(Clone)]
pub struct WorkerHandle {
    symbol: String,
    tx: mpsc::Sender<WorkerMessage>,
}

fn worker_gone(symbol: &str) -> TraderError {
    TraderError::Broker {
        reason: format!("worker for {} has stopped", symbol),
    }
}

impl WorkerHandle {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub async fn send_bar(&self, bar: Bar) -> Result<(), TraderError> {
        self.tx
            .send(WorkerMessage::Bar(bar))
            .await
            .map_err(|_| worker_gone(&self.symbol))
    }

    pub async fn reconcile(
        &self,
        broker: Option<BrokerPosition>,
        cash: Option<f64>,
    ) -> Result<Option<ReconcileAction>, TraderError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WorkerMessage::Reconcile {
                broker,
                cash,
                reply,
            })
            .await
            .map_err(|_| worker_gone(&self.symbol))?;
        rx.await.map_err(|_| worker_gone(&self.symbol))
    }

    pub async fn snapshot(&self) -> Result<WorkerSnapshot, TraderError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WorkerMessage::Snapshot(reply))
            .await
            .map_err(|_| worker_gone(&self.symbol))?;
        rx.await.map_err(|_| worker_gone(&self.symbol))
    }

    pub async fn shutdown(&self) {
        if self.tx.send(WorkerMessage::Shutdown).await.is_err() {
            debug!(symbol = %self.symbol, "worker already stopped");
        }
    }
}

/// Spawn the worker; the join handle yields the orchestrator back on exit.
/// `clock` stamps reconciliations.
pub fn spawn_worker(
    orchestrator: StrategyOrchestrator,
    notifier: NotifierHandle,
    clock: Clock,
) -> (WorkerHandle, JoinHandle<StrategyOrchestrator>) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let handle = WorkerHandle {
        symbol: orchestrator.symbol().to_string(),
        tx,
    };
    let task = tokio::spawn(run_worker(orchestrator, rx, notifier, clock));
    (handle, task)
}

fn snapshot_of(orchestrator: &StrategyOrchestrator) -> WorkerSnapshot {
    WorkerSnapshot {
        symbol: orchestrator.symbol().to_string(),
        state: orchestrator.state_kind(),
        position: orchestrator.position().cloned(),
        live: orchestrator.is_live(),
        trades: orchestrator.trades().len(),
        cash: orchestrator.account().cash,
    }
}

async fn run_worker(
    mut orchestrator: StrategyOrchestrator,
    mut rx: mpsc::Receiver<WorkerMessage>,
    notifier: NotifierHandle,
    clock: Clock,
) -> StrategyOrchestrator {
    while let Some(message) = rx.recv().await {
        match message {
            WorkerMessage::Bar(bar) => {
                orchestrator.on_base_bar(&bar);
            }
            WorkerMessage::Reconcile {
                broker,
                cash,
                reply,
            } => {
                let action = if orchestrator.is_live() {
                    if let Some(cash) = cash {
                        orchestrator.sync_cash(cash);
                    }
                    Some(orchestrator.reconcile(broker.as_ref(), clock()))
                } else {
                    None
                };
                let _ = reply.send(action);
            }
            WorkerMessage::Snapshot(reply) => {
                let _ = reply.send(snapshot_of(&orchestrator));
            }
            WorkerMessage::Shutdown => break,
        }
        notifier.dispatch(orchestrator.take_notifications());
    }
    info!(symbol = %orchestrator.symbol(), trades = orchestrator.trades().len(), "worker stopped");
    orchestrator
}
