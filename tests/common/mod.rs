#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;
use tradelab::domain::error::TradelabError;
pub use tradelab::domain::ohlcv::Bar;
use tradelab::ports::data_port::DataPort;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<Bar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Bar>, TradelabError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(TradelabError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .filter(|b| {
                        let d = b.time.date();
                        start.is_none_or(|s| d >= s) && end.is_none_or(|e| d <= e)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_symbols(&self) -> Result<Vec<String>, TradelabError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn day(i: usize) -> NaiveDateTime {
    date(2024, 1, 1).and_hms_opt(0, 0, 0).unwrap() + Duration::days(i as i64)
}

/// One bar per day with a one-point range around each close.
pub fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| Bar::new(day(i), c, c + 0.5, c - 0.5, c).with_volume(1000.0))
        .collect()
}

pub fn rising_bars(n: usize, start: f64, step: f64) -> Vec<Bar> {
    let closes: Vec<f64> = (0..n).map(|i| start + step * i as f64).collect();
    bars_from_closes(&closes)
}

/// Oscillating closes, enough movement to trigger RSI and crossover rules.
pub fn wave_bars(n: usize) -> Vec<Bar> {
    let closes: Vec<f64> = (0..n)
        .map(|i| 100.0 + (i as f64 * 0.25).sin() * 8.0 + i as f64 * 0.05)
        .collect();
    bars_from_closes(&closes)
}

pub fn write_csv(dir: &Path, symbol: &str, bars: &[Bar]) {
    let mut content = String::from("time,open,high,low,close,volume\n");
    for b in bars {
        writeln!(
            content,
            "{},{},{},{},{},{}",
            b.time.format("%Y-%m-%d"),
            b.open,
            b.high,
            b.low,
            b.close,
            b.volume_or_default()
        )
        .unwrap();
    }
    std::fs::write(dir.join(format!("{}.csv", symbol)), content).unwrap();
}
