//! JSON report adapter implementing ReportPort.
//!
//! Writes one pretty-printed document holding the strategy definition, the
//! backtest options, metrics, trades and equity curve.

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::domain::backtest::{BacktestOptions, BacktestResult, Trade};
use crate::domain::error::TradelabError;
use crate::domain::metrics::{EquityPoint, PerformanceMetrics};
use crate::domain::strategy::{
    MarketConditions, PerformanceCounters, RiskManagement, Strategy, TimeFilter,
};
use crate::ports::report_port::ReportPort;

#[derive(Serialize)]
struct StrategySection<'a> {
    id: &'a str,
    name: &'a str,
    description: &'a str,
    entry_conditions: Vec<String>,
    exit_conditions: Vec<String>,
    risk_management: &'a RiskManagement,
    market_conditions: &'a MarketConditions,
    time_filter: Option<&'a TimeFilter>,
    parameters: &'a std::collections::BTreeMap<String, f64>,
    performance: &'a PerformanceCounters,
}

#[derive(Serialize)]
struct BacktestReport<'a> {
    backtest_id: &'a str,
    strategy: StrategySection<'a>,
    options: &'a BacktestOptions,
    initial_capital: f64,
    final_capital: f64,
    bars_evaluated: usize,
    bars_skipped: usize,
    metrics: &'a PerformanceMetrics,
    trades: &'a [Trade],
    equity_curve: &'a [EquityPoint],
}

fn build_report<'a>(result: &'a BacktestResult, strategy: &'a Strategy) -> BacktestReport<'a> {
    BacktestReport {
        backtest_id: &result.id,
        strategy: StrategySection {
            id: &strategy.id,
            name: &strategy.name,
            description: &strategy.description,
            entry_conditions: strategy.entry_conditions.iter().map(|c| c.to_string()).collect(),
            exit_conditions: strategy.exit_conditions.iter().map(|c| c.to_string()).collect(),
            risk_management: &strategy.risk_management,
            market_conditions: &strategy.market_conditions,
            time_filter: strategy.time_filter.as_ref(),
            parameters: &strategy.parameters,
            performance: &strategy.performance,
        },
        options: &result.options,
        initial_capital: result.initial_capital,
        final_capital: result.final_capital,
        bars_evaluated: result.bars_evaluated,
        bars_skipped: result.bars_skipped,
        metrics: &result.metrics,
        trades: &result.trades,
        equity_curve: &result.equity_curve,
    }
}

/// Render the report without touching the filesystem.
pub fn render_json(result: &BacktestResult, strategy: &Strategy) -> Result<String, TradelabError> {
    serde_json::to_string_pretty(&build_report(result, strategy)).map_err(|e| {
        TradelabError::Report {
            reason: format!("failed to serialize report: {}", e),
        }
    })
}

pub struct JsonReportAdapter;

impl JsonReportAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JsonReportAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportPort for JsonReportAdapter {
    fn write(
        &self,
        result: &BacktestResult,
        strategy: &Strategy,
        output_path: &Path,
    ) -> Result<(), TradelabError> {
        let json = render_json(result, strategy)?;
        if let Some(parent) = output_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(output_path, json).map_err(|e| TradelabError::Report {
            reason: format!("failed to write {}: {}", output_path.display(), e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::backtest::run_backtest;
    use crate::domain::ohlcv::Bar;
    use crate::domain::strategy::StrategyTemplate;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn bars(n: usize) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..n)
            .map(|i| {
                let c = 100.0 + (i as f64 * 0.3).sin() * 5.0;
                Bar::new(start + chrono::Duration::days(i as i64), c, c + 1.0, c - 1.0, c)
            })
            .collect()
    }

    fn sample() -> (BacktestResult, Strategy) {
        let strategy = Strategy::from_config(
            "strategy_1",
            StrategyTemplate::RsiMeanReversion.config(),
        );
        let result = run_backtest("backtest_1", &strategy, &bars(120), &BacktestOptions::default());
        (result, strategy)
    }

    #[test]
    fn render_contains_sections() {
        let (result, strategy) = sample();
        let json = render_json(&result, &strategy).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["backtest_id"], "backtest_1");
        assert_eq!(value["strategy"]["id"], "strategy_1");
        assert_eq!(value["strategy"]["entry_conditions"].as_array().unwrap().len(), 1);
        assert!(value["metrics"]["total_return"].is_number());
        assert_eq!(
            value["equity_curve"].as_array().unwrap().len(),
            result.equity_curve.len()
        );
        assert_eq!(value["bars_evaluated"], result.bars_evaluated);
    }

    #[test]
    fn write_creates_parent_directories() {
        let (result, strategy) = sample();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reports").join("run.json");

        JsonReportAdapter::new().write(&result, &strategy, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"trades\""));
    }
}
