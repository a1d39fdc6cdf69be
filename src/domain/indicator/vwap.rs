//! Session VWAP: cumulative(typical price × volume) / cumulative volume.
//!
//! Accumulators reset whenever the session date changes. The session is the
//! calendar date of the bar's start, so bars stamped with their bucket end
//! carry that bucket length as a label offset.

use chrono::{Duration, NaiveDate};

use crate::domain::bar::Bar;

#[derive(Debug, Clone, Default)]
pub struct Vwap {
    label_offset: Duration,
    session: Option<NaiveDate>,
    cum_pv: f64,
    cum_volume: f64,
    current: Option<f64>,
}

impl Vwap {
    pub fn new() -> Self {
        Self::default()
    }

    /// For bars labelled with the end of a bucket `interval` long.
    pub fn end_labelled(interval: Duration) -> Self {
        Vwap {
            label_offset: interval,
            ..Self::default()
        }
    }

    pub fn update(&mut self, bar: &Bar) -> Option<f64> {
        let date = (bar.timestamp - self.label_offset).date();
        let typical = bar.typical_price();
        if self.session != Some(date) {
            self.session = Some(date);
            self.cum_pv = 0.0;
            self.cum_volume = 0.0;
        }
        self.cum_pv += typical * bar.volume;
        self.cum_volume += bar.volume;

        self.current = Some(if self.cum_volume > 0.0 {
            self.cum_pv / self.cum_volume
        } else {
            typical
        });
        self.current
    }

    pub fn value(&self) -> Option<f64> {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(day: u32, hour: u32, high: f64, low: f64, close: f64, volume: f64) -> Bar {
        Bar {
            timestamp: NaiveDate::from_ymd_opt(2024, 1, day)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
            open: close,
            high,
            low,
            close,
            volume,
        }
    }

    #[test]
    fn volume_weighted_within_session() {
        let mut vwap = Vwap::new();
        vwap.update(&bar(2, 10, 10.0, 10.0, 10.0, 100.0));
        let v = vwap.update(&bar(2, 11, 20.0, 20.0, 20.0, 300.0)).unwrap();
        assert!((v - 17.5).abs() < 1e-12);
    }

    #[test]
    fn zero_volume_first_bar_seeds_with_typical_price() {
        let mut vwap = Vwap::new();
        let v = vwap.update(&bar(2, 10, 12.0, 9.0, 10.5, 0.0)).unwrap();
        assert!((v - 10.5).abs() < 1e-12);
    }

    #[test]
    fn new_date_starts_new_session() {
        let mut vwap = Vwap::new();
        vwap.update(&bar(2, 23, 10.0, 10.0, 10.0, 100.0));
        let v = vwap.update(&bar(3, 0, 20.0, 20.0, 20.0, 100.0)).unwrap();
        assert!((v - 20.0).abs() < 1e-12);
    }

    #[test]
    fn end_labelled_midnight_bar_closes_previous_session() {
        // 23:00-00:00 bucket is stamped 00:00 of the next day.
        let mut vwap = Vwap::end_labelled(Duration::hours(1));
        vwap.update(&bar(2, 23, 10.0, 10.0, 10.0, 100.0));
        let v = vwap.update(&bar(3, 0, 20.0, 20.0, 20.0, 100.0)).unwrap();
        assert!((v - 15.0).abs() < 1e-12);

        let v = vwap.update(&bar(3, 1, 30.0, 30.0, 30.0, 100.0)).unwrap();
        assert!((v - 30.0).abs() < 1e-12);
    }
}
