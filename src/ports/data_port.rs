//! Historical bar source port trait.

use crate::domain::bar::Bar;
use crate::domain::error::TraderError;

pub trait DataPort {
    /// Base-timeframe bars for `symbol`, sorted by timestamp.
    fn fetch_bars(&self, symbol: &str) -> Result<Vec<Bar>, TraderError>;

    /// An independently supplied feed; `file_pattern` contains `{symbol}`.
    fn fetch_direct(&self, file_pattern: &str, symbol: &str) -> Result<Vec<Bar>, TraderError>;
}
