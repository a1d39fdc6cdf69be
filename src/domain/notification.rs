//! Outbound trade notifications.

use chrono::{Duration, NaiveDateTime};

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
    pub urgent: bool,
    /// When the triggering information became known: the end of the bar
    /// that produced it, or the time of a broker reconciliation.
    pub event_time: NaiveDateTime,
}

impl Notification {
    pub fn urgent(subject: String, body: String, event_time: NaiveDateTime) -> Self {
        Notification {
            subject,
            body,
            urgent: true,
            event_time,
        }
    }

    pub fn normal(subject: String, body: String, event_time: NaiveDateTime) -> Self {
        Notification {
            subject,
            body,
            urgent: false,
            event_time,
        }
    }

    /// True when the event is older than `threshold` at `now`.
    pub fn is_stale(&self, now: NaiveDateTime, threshold: Duration) -> bool {
        now - self.event_time > threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn staleness_threshold() {
        let n = Notification::urgent("s".into(), "b".into(), at(10, 0));
        let threshold = Duration::seconds(300);
        assert!(!n.is_stale(at(10, 5), threshold));
        assert!(n.is_stale(at(10, 6), threshold));
    }
}
