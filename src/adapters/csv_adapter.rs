//! CSV bar files: `{data_dir}/{symbol}.csv` with header
//! `time,open,high,low,close[,volume]`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::{debug, warn};

use crate::domain::error::TradelabError;
use crate::domain::ohlcv::Bar;
use crate::ports::data_port::DataPort;

pub struct CsvAdapter {
    base_path: PathBuf,
}

fn data_error(reason: impl Into<String>) -> TradelabError {
    TradelabError::Data {
        reason: reason.into(),
    }
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` (or with a `T`) and RFC 3339.
/// RFC 3339 offsets are normalized to UTC.
pub fn parse_time(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(time) = NaiveDateTime::parse_from_str(value, format) {
            return Some(time);
        }
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.naive_utc())
}

fn parse_number(
    record: &csv::StringRecord,
    index: usize,
    name: &str,
    line: u64,
) -> Result<f64, TradelabError> {
    let raw = record
        .get(index)
        .ok_or_else(|| data_error(format!("line {}: missing {} column", line, name)))?;
    raw.trim()
        .parse()
        .map_err(|e| data_error(format!("line {}: invalid {} value '{}': {}", line, name, raw, e)))
}

/// Read every bar in a CSV file, sorted by time.
pub fn read_bars(path: &Path) -> Result<Vec<Bar>, TradelabError> {
    let content = fs::read_to_string(path)
        .map_err(|e| data_error(format!("failed to read {}: {}", path.display(), e)))?;

    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());
    let headers = rdr
        .headers()
        .map_err(|e| data_error(format!("CSV header error: {}", e)))?
        .clone();
    let column = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
    let time_col = column("time")
        .or_else(|| column("date"))
        .ok_or_else(|| data_error(format!("{}: no time column", path.display())))?;
    let mut price_cols = [0usize; 4];
    for (slot, name) in price_cols.iter_mut().zip(["open", "high", "low", "close"]) {
        *slot = column(name)
            .ok_or_else(|| data_error(format!("{}: no {} column", path.display(), name)))?;
    }
    let volume_col = column("volume");

    let mut bars = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| data_error(format!("CSV parse error: {}", e)))?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let raw_time = record.get(time_col).unwrap_or_default();
        let time = parse_time(raw_time)
            .ok_or_else(|| data_error(format!("line {}: invalid time '{}'", line, raw_time)))?;
        let [open, high, low, close] = [
            parse_number(&record, price_cols[0], "open", line)?,
            parse_number(&record, price_cols[1], "high", line)?,
            parse_number(&record, price_cols[2], "low", line)?,
            parse_number(&record, price_cols[3], "close", line)?,
        ];

        let mut bar = Bar::new(time, open, high, low, close);
        if let Some(col) = volume_col
            && record.get(col).is_some_and(|v| !v.trim().is_empty())
        {
            bar = bar.with_volume(parse_number(&record, col, "volume", line)?);
        }
        if !bar.is_consistent() {
            warn!(line, time = %time, "bar high/low do not bracket open/close");
        }
        bars.push(bar);
    }

    bars.sort_by_key(|b| b.time);
    debug!(path = %path.display(), bars = bars.len(), "loaded bars");
    Ok(bars)
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol))
    }
}

impl DataPort for CsvAdapter {
    fn fetch_bars(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Bar>, TradelabError> {
        let mut bars = read_bars(&self.csv_path(symbol))?;
        bars.retain(|b| {
            let date = b.time.date();
            start.is_none_or(|s| date >= s) && end.is_none_or(|e| date <= e)
        });
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, TradelabError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| {
            data_error(format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ))
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| data_error(format!("directory entry error: {}", e)))?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "csv")
                && let Some(stem) = path.file_stem()
            {
                symbols.push(stem.to_string_lossy().into_owned());
            }
        }
        symbols.sort();
        Ok(symbols)
    }
}
