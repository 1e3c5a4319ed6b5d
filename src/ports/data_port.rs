//! Market data port.

use chrono::NaiveDate;

use crate::domain::error::TradelabError;
use crate::domain::ohlcv::Bar;

pub trait DataPort {
    /// Bars for `symbol` in ascending time order, limited to the inclusive
    /// date range when bounds are given.
    fn fetch_bars(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Bar>, TradelabError>;

    fn list_symbols(&self) -> Result<Vec<String>, TradelabError>;
}
