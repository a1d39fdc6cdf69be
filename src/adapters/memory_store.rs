//! In-memory position store, for runs without a database and for tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::domain::error::TraderError;
use crate::domain::position::PersistedPositionRecord;
use crate::ports::position_store::PositionStore;

#[derive(Default)]
pub struct MemoryPositionStore {
    records: Mutex<BTreeMap<String, PersistedPositionRecord>>,
    /// When set, every write fails; lets tests exercise the retry path.
    fail_writes: Mutex<bool>,
}

impl MemoryPositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        if let Ok(mut flag) = self.fail_writes.lock() {
            *flag = fail;
        }
    }

    fn check_writable(&self) -> Result<(), TraderError> {
        let failing = self.fail_writes.lock().map(|f| *f).unwrap_or(true);
        if failing {
            return Err(TraderError::Persistence {
                reason: "store unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn poisoned() -> TraderError {
        TraderError::Persistence {
            reason: "position store lock poisoned".to_string(),
        }
    }
}

impl PositionStore for MemoryPositionStore {
    fn load_all(&self) -> Result<Vec<PersistedPositionRecord>, TraderError> {
        let records = self.records.lock().map_err(|_| Self::poisoned())?;
        Ok(records.values().cloned().collect())
    }

    fn save(&self, record: &PersistedPositionRecord) -> Result<(), TraderError> {
        self.check_writable()?;
        let mut records = self.records.lock().map_err(|_| Self::poisoned())?;
        records.insert(record.symbol.clone(), record.clone());
        Ok(())
    }

    fn delete(&self, symbol: &str) -> Result<(), TraderError> {
        self.check_writable()?;
        let mut records = self.records.lock().map_err(|_| Self::poisoned())?;
        records.remove(symbol);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(symbol: &str) -> PersistedPositionRecord {
        PersistedPositionRecord {
            symbol: symbol.to_string(),
            size: 5.0,
            price: 10.0,
            entry_time: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn keyed_by_symbol() {
        let store = MemoryPositionStore::new();
        store.save(&record("B")).unwrap();
        store.save(&record("A")).unwrap();
        store.save(&record("A")).unwrap();
        let all = store.load_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].symbol, "A");
    }

    #[test]
    fn failing_writes() {
        let store = MemoryPositionStore::new();
        store.set_fail_writes(true);
        assert!(store.save(&record("A")).is_err());
        store.set_fail_writes(false);
        assert!(store.save(&record("A")).is_ok());
        assert!(store.load("A").unwrap().is_some());
    }
}
