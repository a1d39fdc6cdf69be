//! Quote polling and base-bar assembly for one symbol.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::domain::bar_aggregator::{BarAggregator, Tick};
use crate::domain::error::TraderError;
use crate::domain::timeframe::TimeframeDef;
use crate::live::worker::WorkerHandle;
use crate::live::{Clock, call_broker};
use crate::ports::broker_port::BrokerPort;

pub struct QuoteIngest {
    symbol: String,
    aggregator: BarAggregator,
    broker: Arc<dyn BrokerPort>,
    worker: WorkerHandle,
    timeout: Duration,
    clock: Clock,
}

impl QuoteIngest {
    pub fn new(
        base: TimeframeDef,
        broker: Arc<dyn BrokerPort>,
        worker: WorkerHandle,
        timeout: Duration,
        clock: Clock,
    ) -> Self {
        QuoteIngest {
            symbol: worker.symbol().to_string(),
            aggregator: BarAggregator::new(base),
            broker,
            worker,
            timeout,
            clock,
        }
    }

    /// Pull one quote and forward a completed bar, if any. Broker failures
    /// skip the poll; only a stopped worker is an error.
    pub async fn poll_once(&mut self) -> Result<(), TraderError> {
        let symbol = self.symbol.clone();
        let quote = call_broker(self.broker.clone(), "latest_quote", self.timeout, move |b| {
            b.latest_quote(&symbol)
        })
        .await;

        let quote = match quote {
            Ok(Some(q)) => q,
            Ok(None) => {
                debug!(symbol = %self.symbol, "no quote");
                return Ok(());
            }
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, "quote poll failed");
                return Ok(());
            }
        };

        let tick = Tick {
            timestamp: (self.clock)(),
            price: quote.price,
            cumulative_volume: quote.cumulative_volume,
        };
        if let Some(bar) = self.aggregator.update(&tick) {
            debug!(
                symbol = %self.symbol,
                ts = %bar.timestamp,
                close = bar.close,
                "base bar complete"
            );
            self.worker.send_bar(bar).await?;
        }
        Ok(())
    }

    /// Emit the bar in progress.
    pub async fn finish(&mut self) -> Result<(), TraderError> {
        if let Some(bar) = self.aggregator.flush() {
            self.worker.send_bar(bar).await?;
        }
        Ok(())
    }
}

pub async fn run_ingest(
    mut ingest: QuoteIngest,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(symbol = %ingest.symbol, ?poll_interval, "quote ingest started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = ingest.poll_once().await {
                    warn!(symbol = %ingest.symbol, error = %e, "ingest stopping");
                    return;
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    if let Err(e) = ingest.finish().await {
        warn!(symbol = %ingest.symbol, error = %e, "final bar not delivered");
    }
    info!(symbol = %ingest.symbol, "quote ingest stopped");
}
