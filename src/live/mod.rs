//! Live trading runtime.
//!
//! One worker task per symbol owns its orchestrator; everything else talks to
//! it over channels. Broker calls are blocking and run on the blocking pool
//! under a timeout.

pub mod ingest;
pub mod notifier;
pub mod runtime;
pub mod synchronizer;
pub mod worker;

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;

use crate::domain::error::TraderError;
use crate::ports::broker_port::BrokerPort;

/// Source of "now" for tick timestamps and staleness checks.
pub type Clock = fn() -> NaiveDateTime;

pub fn wall_clock() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Run a blocking broker call with a deadline.
pub async fn call_broker<T, F>(
    broker: Arc<dyn BrokerPort>,
    operation: &str,
    timeout: Duration,
    call: F,
) -> Result<T, TraderError>
where
    T: Send + 'static,
    F: FnOnce(&dyn BrokerPort) -> Result<T, TraderError> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(move || call(broker.as_ref()));
    match tokio::time::timeout(timeout, task).await {
        Err(_) => Err(TraderError::Timeout {
            operation: operation.to_string(),
            millis: timeout.as_millis() as u64,
        }),
        Ok(Err(join)) => Err(TraderError::Broker {
            reason: format!("{} task failed: {}", operation, join),
        }),
        Ok(Ok(result)) => result,
    }
}
