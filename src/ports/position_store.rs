//! Durable open-position store port trait.

use crate::domain::error::TraderError;
use crate::domain::position::PersistedPositionRecord;

/// Keyed by symbol. Implementations serialize their own writes.
pub trait PositionStore: Send + Sync {
    fn load_all(&self) -> Result<Vec<PersistedPositionRecord>, TraderError>;

    fn load(&self, symbol: &str) -> Result<Option<PersistedPositionRecord>, TraderError> {
        Ok(self.load_all()?.into_iter().find(|r| r.symbol == symbol))
    }

    /// Insert or replace.
    fn save(&self, record: &PersistedPositionRecord) -> Result<(), TraderError>;

    fn delete(&self, symbol: &str) -> Result<(), TraderError>;
}
