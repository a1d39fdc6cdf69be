//! Notification sink port trait.

use crate::domain::error::TraderError;
use crate::domain::notification::Notification;

pub trait NotificationSink: Send + Sync {
    fn send(&self, notification: &Notification) -> Result<(), TraderError>;
}
