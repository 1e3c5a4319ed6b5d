//! Pattern detectors over OHLC sequences.

pub mod candlestick;
pub mod chart;

use serde::Serialize;

pub use candlestick::{
    CandlestickDetector, CandlestickPattern, PatternDetection, PatternMatch, PatternSignal,
    PatternSignalKind, PatternStrength, get_pattern_signal,
};
pub use chart::{ChartPattern, ChartPatternDetector, ChartPatternKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternBias {
    Bullish,
    Bearish,
    Neutral,
}
