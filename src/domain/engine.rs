//! Strategy engine: per-bar decisions and the strategy/backtest registry.
//!
//! `StrategyEvaluator` is stateless per call. It computes every indicator a
//! strategy reads once over the whole bar slice, then answers `evaluate(index)`
//! for any bar. `StrategyEngine` owns strategies and completed backtests and
//! hands out deterministic ids.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info};

use crate::domain::backtest::{BacktestOptions, BacktestResult, run_backtest};
use crate::domain::condition::{Condition, validate_condition};
use crate::domain::condition_eval::{
    ConditionResult, MarketData, RiskMetrics, compute_risk_metrics, detect_regime,
    evaluate_conditions, regime_indicators,
};
use crate::domain::error::TradelabError;
use crate::domain::indicator::{IndicatorSeries, IndicatorType};
use crate::domain::indicator_helpers::compute_indicators;
use crate::domain::ohlcv::Bar;
use crate::domain::pattern::{CandlestickDetector, PatternDetection};
use crate::domain::strategy::{Strategy, StrategyConfig, StrategyTemplate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalAction {
    Hold,
    Buy,
    Sell,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategySignal {
    pub time: NaiveDateTime,
    pub action: SignalAction,
    pub confidence: f64,
    /// Entry results followed by exit results.
    pub signals: Vec<ConditionResult>,
    pub risk_metrics: RiskMetrics,
}

pub struct StrategyEvaluator<'a> {
    strategy: &'a Strategy,
    bars: &'a [Bar],
    indicators: HashMap<IndicatorType, IndicatorSeries>,
    patterns: Vec<PatternDetection>,
}

impl<'a> StrategyEvaluator<'a> {
    pub fn new(strategy: &'a Strategy, bars: &'a [Bar]) -> Self {
        let mut types = strategy.indicators();
        for t in regime_indicators() {
            if !types.contains(&t) {
                types.push(t);
            }
        }
        let patterns = if strategy.uses_patterns() {
            CandlestickDetector::default().detect(bars)
        } else {
            Vec::new()
        };
        StrategyEvaluator {
            strategy,
            bars,
            indicators: compute_indicators(bars, &types),
            patterns,
        }
    }

    fn regime_series(&self, t: &IndicatorType) -> Result<&IndicatorSeries, TradelabError> {
        self.indicators
            .get(t)
            .ok_or_else(|| TradelabError::evaluation(format!("indicator {} was not computed", t)))
    }

    pub fn evaluate(&self, index: usize) -> Result<StrategySignal, TradelabError> {
        let bar = self.bars.get(index).ok_or_else(|| {
            TradelabError::evaluation(format!(
                "bar {} out of range ({} bars)",
                index,
                self.bars.len()
            ))
        })?;

        let [adx_type, atr_type] = regime_indicators();
        let regime = detect_regime(
            self.regime_series(&adx_type)?,
            self.regime_series(&atr_type)?,
            index,
        );
        let risk_metrics = compute_risk_metrics(
            self.bars,
            index,
            regime,
            &self.strategy.risk_management,
        );
        let hold = |signals: Vec<ConditionResult>, risk_metrics: RiskMetrics| StrategySignal {
            time: bar.time,
            action: SignalAction::Hold,
            confidence: 0.0,
            signals,
            risk_metrics,
        };

        if !self.strategy.trades_at(bar.time) {
            debug!(time = %bar.time, "outside time filter");
            return Ok(hold(Vec::new(), risk_metrics));
        }
        if !self.strategy.market_conditions.allows(&regime) {
            debug!(time = %bar.time, ?regime, "market regime not allowed");
            return Ok(hold(Vec::new(), risk_metrics));
        }

        let data = MarketData::new(self.bars, &self.indicators, &self.patterns);
        let entry = evaluate_conditions(&self.strategy.entry_conditions, &data, index)?;
        let exit = evaluate_conditions(&self.strategy.exit_conditions, &data, index)?;

        let (action, confidence) = match (entry.triggered, exit.triggered) {
            (true, false) => (SignalAction::Buy, entry.confidence),
            (false, true) => (SignalAction::Sell, exit.confidence),
            (true, true) if entry.confidence > exit.confidence => {
                (SignalAction::Buy, entry.confidence)
            }
            (true, true) if exit.confidence > entry.confidence => {
                (SignalAction::Sell, exit.confidence)
            }
            _ => (SignalAction::Hold, 0.0),
        };

        let mut signals = entry.results;
        signals.extend(exit.results);
        Ok(StrategySignal {
            time: bar.time,
            action,
            confidence,
            signals,
            risk_metrics,
        })
    }
}

/// Owns strategies and completed backtests.
#[derive(Debug, Default)]
pub struct StrategyEngine {
    strategies: HashMap<String, Strategy>,
    backtest_results: HashMap<String, BacktestResult>,
    next_strategy: usize,
    next_backtest: usize,
}

impl StrategyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate every condition, then register the strategy under a fresh id.
    pub fn create_strategy(&mut self, config: StrategyConfig) -> Result<String, TradelabError> {
        for condition in config.entry_conditions.iter().chain(&config.exit_conditions) {
            validate_condition(condition)?;
        }
        self.next_strategy += 1;
        let id = format!("strategy_{}", self.next_strategy);
        info!(strategy = %id, name = %config.name, "strategy created");
        self.strategies
            .insert(id.clone(), Strategy::from_config(id.clone(), config));
        Ok(id)
    }

    pub fn create_from_template(&mut self, name: &str) -> Result<String, TradelabError> {
        let template =
            StrategyTemplate::from_name(name).ok_or_else(|| TradelabError::UnknownStrategy {
                id: name.to_string(),
            })?;
        self.create_strategy(template.config())
    }

    fn strategy_mut(&mut self, id: &str) -> Result<&mut Strategy, TradelabError> {
        self.strategies
            .get_mut(id)
            .ok_or_else(|| TradelabError::UnknownStrategy { id: id.to_string() })
    }

    pub fn add_entry_condition(
        &mut self,
        id: &str,
        condition: Condition,
    ) -> Result<(), TradelabError> {
        validate_condition(&condition)?;
        self.strategy_mut(id)?.entry_conditions.push(condition);
        Ok(())
    }

    pub fn add_exit_condition(
        &mut self,
        id: &str,
        condition: Condition,
    ) -> Result<(), TradelabError> {
        validate_condition(&condition)?;
        self.strategy_mut(id)?.exit_conditions.push(condition);
        Ok(())
    }

    pub fn get_strategy(&self, id: &str) -> Result<&Strategy, TradelabError> {
        self.strategies
            .get(id)
            .ok_or_else(|| TradelabError::UnknownStrategy { id: id.to_string() })
    }

    /// Strategies ordered by id number.
    pub fn strategies(&self) -> Vec<&Strategy> {
        let mut all: Vec<&Strategy> = self.strategies.values().collect();
        all.sort_by_key(|s| {
            s.id.trim_start_matches("strategy_")
                .parse::<usize>()
                .unwrap_or(usize::MAX)
        });
        all
    }

    /// Decision for the last bar of `bars`.
    pub fn evaluate_strategy(
        &self,
        id: &str,
        bars: &[Bar],
    ) -> Result<StrategySignal, TradelabError> {
        let strategy = self.get_strategy(id)?;
        let Some(last) = bars.len().checked_sub(1) else {
            return Err(TradelabError::InsufficientData {
                symbol: strategy.name.clone(),
                bars: 0,
                minimum: 1,
            });
        };
        StrategyEvaluator::new(strategy, bars).evaluate(last)
    }

    /// Run a backtest, store its result and update the strategy's counters.
    pub fn backtest(
        &mut self,
        id: &str,
        bars: &[Bar],
        options: &BacktestOptions,
    ) -> Result<&BacktestResult, TradelabError> {
        let backtest_id = format!("backtest_{}", self.next_backtest + 1);
        let result = run_backtest(&backtest_id, self.get_strategy(id)?, bars, options);
        self.next_backtest += 1;

        let strategy = self.strategy_mut(id)?;
        strategy.performance.backtests_run += 1;
        strategy.performance.total_trades += result.trades.len();
        strategy.performance.last_total_return = Some(result.metrics.total_return);
        strategy.performance.last_win_rate = Some(result.metrics.win_rate);

        self.backtest_results.insert(backtest_id.clone(), result);
        self.get_backtest(&backtest_id)
    }

    pub fn get_backtest(&self, id: &str) -> Result<&BacktestResult, TradelabError> {
        self.backtest_results
            .get(id)
            .ok_or_else(|| TradelabError::UnknownBacktest { id: id.to_string() })
    }
}
