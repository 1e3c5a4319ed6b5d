//! OHLCV bar representation.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Placeholder used by volume-weighted indicators when a bar carries no volume.
pub const DEFAULT_VOLUME: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub time: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<f64>,
}

impl Bar {
    pub fn new(time: NaiveDateTime, open: f64, high: f64, low: f64, close: f64) -> Self {
        Bar {
            time,
            open,
            high,
            low,
            close,
            volume: None,
        }
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn volume_or_default(&self) -> f64 {
        self.volume.unwrap_or(DEFAULT_VOLUME)
    }

    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// (high + low) / 2
    pub fn median_price(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn upper_shadow(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn lower_shadow(&self) -> f64 {
        self.open.min(self.close) - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// high >= max(open, close), low <= min(open, close), high >= low
    pub fn is_consistent(&self) -> bool {
        self.high >= self.open.max(self.close)
            && self.low <= self.open.min(self.close)
            && self.high >= self.low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_bar() -> Bar {
        Bar::new(
            NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            100.0,
            110.0,
            90.0,
            105.0,
        )
        .with_volume(50_000.0)
    }

    #[test]
    fn typical_price() {
        let bar = sample_bar();
        let expected = (110.0 + 90.0 + 105.0) / 3.0;
        assert!((bar.typical_price() - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn true_range_hl_dominates() {
        let bar = sample_bar();
        // high-low=20, |high-100|=10, |low-100|=10 → 20
        assert!((bar.true_range(100.0) - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn true_range_gap_up() {
        let bar = sample_bar();
        // high-low=20, |110-70|=40, |90-70|=20 → 40
        assert!((bar.true_range(70.0) - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn true_range_gap_down() {
        let bar = sample_bar();
        // high-low=20, |110-130|=20, |90-130|=40 → 40
        assert!((bar.true_range(130.0) - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn candle_geometry() {
        let bar = sample_bar();
        assert!((bar.body() - 5.0).abs() < f64::EPSILON);
        assert!((bar.range() - 20.0).abs() < f64::EPSILON);
        assert!((bar.upper_shadow() - 5.0).abs() < f64::EPSILON);
        assert!((bar.lower_shadow() - 10.0).abs() < f64::EPSILON);
        assert!(bar.is_bullish());
        assert!(bar.is_consistent());
    }

    #[test]
    fn missing_volume_uses_placeholder() {
        let mut bar = sample_bar();
        assert!((bar.volume_or_default() - 50_000.0).abs() < f64::EPSILON);
        bar.volume = None;
        assert!((bar.volume_or_default() - DEFAULT_VOLUME).abs() < f64::EPSILON);
    }

    #[test]
    fn inconsistent_bar_detected() {
        let mut bar = sample_bar();
        bar.high = 95.0;
        assert!(!bar.is_consistent());
    }
}
