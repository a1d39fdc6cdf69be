//! Notification sink that writes to the tracing log.
//!
//! Stands in for the email transport; urgent messages go out at warn level so
//! they survive a quiet filter.

use tracing::{info, warn};

use crate::domain::error::TraderError;
use crate::domain::notification::Notification;
use crate::ports::notification_port::NotificationSink;

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn send(&self, notification: &Notification) -> Result<(), TraderError> {
        let body = notification.body.replace('\n', " | ");
        let at = notification.event_time;
        let subject = &notification.subject;
        if notification.urgent {
            warn!(target: "mtftrader::notify", %at, %subject, %body, "urgent notification");
        } else {
            info!(target: "mtftrader::notify", %at, %subject, %body, "notification");
        }
        Ok(())
    }
}
