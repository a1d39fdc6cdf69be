//! Per-symbol indicator set.
//!
//! Holds exactly one live instance per `IndicatorKey` and one cross series per
//! `CrossKey`. Each closed bar updates only the instances of its own timeframe.

use std::collections::HashMap;

use chrono::Duration;
use tracing::debug;

use crate::domain::bar::Bar;
use crate::domain::condition::CrossKey;
use crate::domain::indicator::cross::CrossSeries;
use crate::domain::indicator::{Indicator, IndicatorKey, IndicatorRef, IndicatorSpec};
use crate::domain::strategy::{ExitSpec, StrategyDefinition};
use crate::domain::timeframe::{TimeframeName, TimeframeSource};

#[derive(Debug, Default)]
pub struct IndicatorEngine {
    instances: HashMap<IndicatorKey, Indicator>,
    order: [Vec<IndicatorKey>; 3],
    crosses: HashMap<CrossKey, CrossSeries>,
    cross_order: [Vec<CrossKey>; 3],
    last_bar: [Option<Bar>; 3],
    bar_count: [usize; 3],
    label_offset: [Duration; 3],
}

impl IndicatorEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiate everything the strategy's conditions and exit specs read.
    pub fn from_strategy(strategy: &StrategyDefinition) -> Self {
        let mut engine = Self::new();
        // Resampled bars are stamped with their bucket end.
        for name in [TimeframeName::Medium, TimeframeName::Long] {
            let def = strategy.timeframe(name);
            if def.source == TimeframeSource::Resample {
                engine.label_offset[name.index()] = def.interval();
            }
        }
        for key in strategy.indicator_keys() {
            engine.register(key);
        }
        for key in strategy.cross_keys() {
            engine.register_cross(key);
        }
        debug!(
            strategy = %strategy.name,
            indicators = engine.instances.len(),
            crosses = engine.crosses.len(),
            "indicator set built"
        );
        engine
    }

    pub fn register(&mut self, key: IndicatorKey) {
        if self.instances.contains_key(&key) {
            return;
        }
        let offset = self.label_offset[key.timeframe.index()];
        self.instances
            .insert(key.clone(), Indicator::labelled(&key.spec, offset));
        self.order[key.timeframe.index()].push(key);
    }

    pub fn register_cross(&mut self, key: CrossKey) {
        if self.crosses.contains_key(&key) {
            return;
        }
        for spec in [&key.fast.spec, &key.slow.spec] {
            self.register(IndicatorKey {
                timeframe: key.timeframe,
                spec: spec.clone(),
            });
        }
        self.crosses.insert(key.clone(), CrossSeries::new());
        self.cross_order[key.timeframe.index()].push(key);
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn cross_count(&self) -> usize {
        self.crosses.len()
    }

    /// Advance every instance of `timeframe` by one closed bar.
    pub fn on_bar(&mut self, timeframe: TimeframeName, bar: &Bar) {
        let slot = timeframe.index();
        for key in &self.order[slot] {
            if let Some(indicator) = self.instances.get_mut(key) {
                indicator.update(bar);
            }
        }
        for key in &self.cross_order[slot] {
            let fast = read(&self.instances, timeframe, &key.fast);
            let slow = read(&self.instances, timeframe, &key.slow);
            if let Some(series) = self.crosses.get_mut(key) {
                series.update(fast, slow);
            }
        }
        self.last_bar[slot] = Some(bar.clone());
        self.bar_count[slot] += 1;
    }

    pub fn value(&self, timeframe: TimeframeName, indicator: &IndicatorRef) -> Option<f64> {
        read(&self.instances, timeframe, indicator)
    }

    pub fn cross(&self, key: &CrossKey) -> Option<i8> {
        self.crosses.get(key).and_then(CrossSeries::value)
    }

    pub fn last_bar(&self, timeframe: TimeframeName) -> Option<&Bar> {
        self.last_bar[timeframe.index()].as_ref()
    }

    pub fn bar_count(&self, timeframe: TimeframeName) -> usize {
        self.bar_count[timeframe.index()]
    }

    /// Current ATR for an exit spec; `None` while warming up or non-positive.
    pub fn exit_atr(&self, exit: &ExitSpec) -> Option<f64> {
        let atr = self.value(
            exit.timeframe,
            &IndicatorRef::new(IndicatorSpec::Atr(exit.atr_period)),
        )?;
        (atr > 1e-9).then_some(atr)
    }
}

fn read(
    instances: &HashMap<IndicatorKey, Indicator>,
    timeframe: TimeframeName,
    indicator: &IndicatorRef,
) -> Option<f64> {
    let key = IndicatorKey {
        timeframe,
        spec: indicator.spec.clone(),
    };
    instances
        .get(&key)?
        .current()?
        .field(indicator.field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::IndicatorField;
    use crate::domain::strategy::fixtures::sample_strategy;
    use chrono::NaiveDate;

    fn bars(closes: &[f64]) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2024, 2, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::flat(start + Duration::minutes(5 * i as i64), c, 100.0))
            .collect()
    }

    fn key(tf: TimeframeName, spec: IndicatorSpec) -> IndicatorKey {
        IndicatorKey {
            timeframe: tf,
            spec,
        }
    }

    #[test]
    fn duplicate_keys_share_one_instance() {
        let mut engine = IndicatorEngine::new();
        engine.register(key(TimeframeName::Short, IndicatorSpec::Ema(5)));
        engine.register(key(TimeframeName::Short, IndicatorSpec::Ema(5)));
        engine.register(key(TimeframeName::Medium, IndicatorSpec::Ema(5)));
        assert_eq!(engine.len(), 2);
    }

    #[test]
    fn bars_only_update_their_timeframe() {
        let mut engine = IndicatorEngine::new();
        engine.register(key(TimeframeName::Short, IndicatorSpec::Sma(2)));
        engine.register(key(TimeframeName::Medium, IndicatorSpec::Sma(2)));
        for bar in bars(&[1.0, 3.0]) {
            engine.on_bar(TimeframeName::Short, &bar);
        }
        let sma = IndicatorRef::new(IndicatorSpec::Sma(2));
        assert_eq!(engine.value(TimeframeName::Short, &sma), Some(2.0));
        assert_eq!(engine.value(TimeframeName::Medium, &sma), None);
        assert!(engine.last_bar(TimeframeName::Medium).is_none());
        assert_eq!(engine.bar_count(TimeframeName::Short), 2);
    }

    #[test]
    fn cross_series_registers_its_operands() {
        let mut engine = IndicatorEngine::new();
        let cross = CrossKey {
            timeframe: TimeframeName::Short,
            fast: IndicatorRef::new(IndicatorSpec::Sma(1)),
            slow: IndicatorRef::new(IndicatorSpec::Sma(3)),
        };
        engine.register_cross(cross.clone());
        engine.register_cross(cross.clone());
        assert_eq!(engine.len(), 2);
        assert_eq!(engine.cross_count(), 1);

        let mut values = Vec::new();
        for bar in bars(&[10.0, 10.0, 10.0, 9.0, 12.0]) {
            engine.on_bar(TimeframeName::Short, &bar);
            values.push(engine.cross(&cross));
        }
        // sma(3) ready at bar 3; diffs: 0, -1/3, then positive
        assert_eq!(values, vec![None, None, None, Some(-1), Some(1)]);
    }

    #[test]
    fn resampled_vwap_keys_session_on_bucket_start() {
        let strategy = sample_strategy(&[], &[]);
        let mut engine = IndicatorEngine::from_strategy(&strategy);
        engine.register(key(TimeframeName::Short, IndicatorSpec::Vwap));
        engine.register(key(TimeframeName::Long, IndicatorSpec::Vwap));

        let day = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let late = day.and_hms_opt(23, 0, 0).unwrap();
        let midnight = late + Duration::hours(1);
        for tf in [TimeframeName::Short, TimeframeName::Long] {
            engine.on_bar(tf, &Bar::flat(late, 10.0, 100.0));
            engine.on_bar(tf, &Bar::flat(midnight, 20.0, 100.0));
        }

        let vwap = IndicatorRef::new(IndicatorSpec::Vwap);
        // The 60m bar stamped 00:00 covers 23:00-00:00 of the first day.
        let long = engine.value(TimeframeName::Long, &vwap).unwrap();
        assert!((long - 15.0).abs() < 1e-12);
        // Base bars are start-labelled, so 00:00 opens a new session.
        let short = engine.value(TimeframeName::Short, &vwap).unwrap();
        assert!((short - 20.0).abs() < 1e-12);
    }

    #[test]
    fn multi_line_field_read() {
        let mut engine = IndicatorEngine::new();
        let spec = IndicatorSpec::Bollinger {
            period: 2,
            stddev_mult_x100: 100,
        };
        engine.register(key(TimeframeName::Short, spec.clone()));
        for bar in bars(&[1.0, 3.0]) {
            engine.on_bar(TimeframeName::Short, &bar);
        }
        let upper = IndicatorRef {
            spec,
            field: IndicatorField::BollingerUpper,
        };
        assert_eq!(engine.value(TimeframeName::Short, &upper), Some(3.0));
    }
}
