//! Notification dispatch.
//!
//! Two queues; urgent messages are always drained first. A notification
//! whose event is older than the staleness threshold at delivery time is
//! dropped, so a catch-up burst after a stall does not spam the sink.

use std::sync::Arc;

use chrono::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::notification::Notification;
use crate::live::Clock;
use crate::ports::notification_port::NotificationSink;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifierStats {
    pub delivered: usize,
    pub dropped_stale: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct NotifierHandle {
    urgent: mpsc::UnboundedSender<Notification>,
    normal: mpsc::UnboundedSender<Notification>,
}

impl NotifierHandle {
    pub fn dispatch(&self, notifications: Vec<Notification>) {
        for notification in notifications {
            let queue = if notification.urgent {
                &self.urgent
            } else {
                &self.normal
            };
            if queue.send(notification).is_err() {
                debug!("notifier stopped, notification discarded");
            }
        }
    }
}

pub fn spawn_notifier(
    sink: Arc<dyn NotificationSink>,
    stale_after: Duration,
    clock: Clock,
) -> (NotifierHandle, JoinHandle<NotifierStats>) {
    let (urgent_tx, urgent_rx) = mpsc::unbounded_channel();
    let (normal_tx, normal_rx) = mpsc::unbounded_channel();
    let handle = NotifierHandle {
        urgent: urgent_tx,
        normal: normal_tx,
    };
    let task = tokio::spawn(run_notifier(sink, stale_after, clock, urgent_rx, normal_rx));
    (handle, task)
}

async fn run_notifier(
    sink: Arc<dyn NotificationSink>,
    stale_after: Duration,
    clock: Clock,
    mut urgent_rx: mpsc::UnboundedReceiver<Notification>,
    mut normal_rx: mpsc::UnboundedReceiver<Notification>,
) -> NotifierStats {
    let mut stats = NotifierStats::default();
    loop {
        let notification = tokio::select! {
            biased;
            Some(n) = urgent_rx.recv() => n,
            Some(n) = normal_rx.recv() => n,
            else => break,
        };

        if notification.is_stale(clock(), stale_after) {
            debug!(
                subject = %notification.subject,
                at = %notification.event_time,
                "stale notification dropped"
            );
            stats.dropped_stale += 1;
            continue;
        }

        let sink = sink.clone();
        let delivered = tokio::task::spawn_blocking(move || sink.send(&notification)).await;
        match delivered {
            Ok(Ok(())) => stats.delivered += 1,
            Ok(Err(e)) => {
                warn!(error = %e, "notification delivery failed");
                stats.failed += 1;
            }
            Err(e) => {
                warn!(error = %e, "notification task failed");
                stats.failed += 1;
            }
        }
    }
    stats
}
