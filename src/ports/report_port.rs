//! Report output port.

use std::path::Path;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::TradelabError;
use crate::domain::strategy::Strategy;

pub trait ReportPort {
    fn write(
        &self,
        result: &BacktestResult,
        strategy: &Strategy,
        output_path: &Path,
    ) -> Result<(), TradelabError>;
}
