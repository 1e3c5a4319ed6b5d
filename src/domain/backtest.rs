//! Bar-by-bar backtest simulator.
//!
//! Replays a bar slice from `WARMUP_BARS` onward, holding at most one long
//! position. Stops and targets are checked before exit signals, and an open
//! position is force-closed on the last bar. Capital tracks realized cash:
//! entry commission leaves it on entry, and net P&L less the entry commission
//! arrives on exit, so `final_capital == initial_capital + Σ net_pnl`.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::engine::{SignalAction, StrategyEvaluator};
use crate::domain::metrics::{EquityPoint, PerformanceMetrics};
use crate::domain::ohlcv::Bar;
use crate::domain::strategy::Strategy;

/// Bars skipped before the first evaluation.
pub const WARMUP_BARS: usize = 50;
/// A buy signal must exceed this confidence to open a position.
pub const ENTRY_CONFIDENCE: f64 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestOptions {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub initial_capital: f64,
    /// Fraction of notional charged on entry and again on exit.
    pub commission: f64,
}

impl Default for BacktestOptions {
    fn default() -> Self {
        BacktestOptions {
            start_date: None,
            end_date: None,
            initial_capital: 10_000.0,
            commission: 0.001,
        }
    }
}

impl BacktestOptions {
    pub fn includes(&self, time: NaiveDateTime) -> bool {
        let date = time.date();
        self.start_date.is_none_or(|s| date >= s) && self.end_date.is_none_or(|e| date <= e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Signal,
    EndOfData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub entry_time: NaiveDateTime,
    pub exit_time: NaiveDateTime,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub entry_confidence: f64,
    pub gross_pnl: f64,
    pub commission: f64,
    pub net_pnl: f64,
    /// Net P&L relative to the entry notional, in percent.
    pub return_pct: f64,
    pub exit_reason: ExitReason,
}

#[derive(Debug, Clone, Serialize)]
pub struct BacktestResult {
    pub id: String,
    pub strategy_id: String,
    pub options: BacktestOptions,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub metrics: PerformanceMetrics,
    pub initial_capital: f64,
    pub final_capital: f64,
    pub bars_evaluated: usize,
    /// Bars whose evaluation failed and were treated as hold.
    pub bars_skipped: usize,
}

#[derive(Debug, Clone)]
struct OpenPosition {
    entry_time: NaiveDateTime,
    entry_price: f64,
    quantity: f64,
    entry_commission: f64,
    stop_loss: Option<f64>,
    take_profit: Option<f64>,
    confidence: f64,
}

impl OpenPosition {
    fn unrealized(&self, price: f64) -> f64 {
        (price - self.entry_price) * self.quantity
    }

    fn exit_trigger(&self, price: f64) -> Option<ExitReason> {
        if self.stop_loss.is_some_and(|stop| price <= stop) {
            Some(ExitReason::StopLoss)
        } else if self.take_profit.is_some_and(|take| price >= take) {
            Some(ExitReason::TakeProfit)
        } else {
            None
        }
    }
}

struct Simulation {
    capital: f64,
    commission: f64,
    position: Option<OpenPosition>,
    trades: Vec<Trade>,
    equity_curve: Vec<EquityPoint>,
}

impl Simulation {
    fn open(&mut self, bar: &Bar, fraction: f64, confidence: f64, strategy: &Strategy) {
        let price = bar.close;
        if price <= 0.0 {
            return;
        }
        let quantity = (self.capital * fraction / price).floor();
        if quantity < 1.0 {
            debug!(time = %bar.time, capital = self.capital, "buy signal too small to fill");
            return;
        }
        let entry_commission = quantity * price * self.commission;
        self.capital -= entry_commission;

        let risk = &strategy.risk_management;
        let position = OpenPosition {
            entry_time: bar.time,
            entry_price: price,
            quantity,
            entry_commission,
            stop_loss: (risk.stop_loss > 0.0).then(|| price * (1.0 - risk.stop_loss)),
            take_profit: (risk.take_profit > 0.0).then(|| price * (1.0 + risk.take_profit)),
            confidence,
        };
        debug!(time = %bar.time, price, quantity, "open position");
        self.position = Some(position);
    }

    fn close(&mut self, bar: &Bar, reason: ExitReason) {
        let Some(position) = self.position.take() else {
            return;
        };
        let price = bar.close;
        let gross_pnl = position.unrealized(price);
        let exit_commission = position.quantity * price * self.commission;
        self.capital += gross_pnl - exit_commission;

        let commission = position.entry_commission + exit_commission;
        let net_pnl = gross_pnl - commission;
        let notional = position.entry_price * position.quantity;
        debug!(time = %bar.time, price, net_pnl, ?reason, "close position");

        self.trades.push(Trade {
            entry_time: position.entry_time,
            exit_time: bar.time,
            entry_price: position.entry_price,
            exit_price: price,
            quantity: position.quantity,
            stop_loss: position.stop_loss,
            take_profit: position.take_profit,
            entry_confidence: position.confidence,
            gross_pnl,
            commission,
            net_pnl,
            return_pct: if notional > 0.0 {
                net_pnl / notional * 100.0
            } else {
                0.0
            },
            exit_reason: reason,
        });
    }

    fn mark(&mut self, bar: &Bar) {
        let unrealized = self
            .position
            .as_ref()
            .map(|p| p.unrealized(bar.close))
            .unwrap_or(0.0);
        self.equity_curve.push(EquityPoint {
            date: bar.time,
            value: self.capital + unrealized,
        });
    }
}

/// Run `strategy` over the bars inside the option's date range.
///
/// Fewer than `WARMUP_BARS + 1` bars in range yields a result with no trades.
pub fn run_backtest(
    id: &str,
    strategy: &Strategy,
    bars: &[Bar],
    options: &BacktestOptions,
) -> BacktestResult {
    let bars: Vec<Bar> = bars
        .iter()
        .filter(|b| options.includes(b.time))
        .cloned()
        .collect();
    info!(
        backtest = id,
        strategy = %strategy.id,
        bars = bars.len(),
        initial_capital = options.initial_capital,
        "backtest started"
    );

    let evaluator = StrategyEvaluator::new(strategy, &bars);
    let mut sim = Simulation {
        capital: options.initial_capital,
        commission: options.commission,
        position: None,
        trades: Vec::new(),
        equity_curve: Vec::new(),
    };
    let mut bars_evaluated = 0;
    let mut bars_skipped = 0;

    for (index, bar) in bars.iter().enumerate().skip(WARMUP_BARS) {
        bars_evaluated += 1;
        let (action, confidence) = match evaluator.evaluate(index) {
            Ok(signal) => (signal.action, signal.confidence),
            Err(e) => {
                warn!(backtest = id, index, error = %e, "evaluation failed, holding");
                bars_skipped += 1;
                (SignalAction::Hold, 0.0)
            }
        };

        match sim.position.as_ref() {
            Some(position) => {
                let reason = position.exit_trigger(bar.close).or(
                    (action == SignalAction::Sell).then_some(ExitReason::Signal),
                );
                if let Some(reason) = reason {
                    sim.close(bar, reason);
                }
            }
            None if action == SignalAction::Buy && confidence > ENTRY_CONFIDENCE => {
                sim.open(bar, strategy.risk_management.position_size, confidence, strategy);
            }
            None => {}
        }
        sim.mark(bar);
    }

    if let Some(last) = bars.last()
        && sim.position.is_some()
    {
        sim.close(last, ExitReason::EndOfData);
        if let Some(point) = sim.equity_curve.last_mut() {
            point.value = sim.capital;
        }
    }

    let pnls: Vec<f64> = sim.trades.iter().map(|t| t.net_pnl).collect();
    let metrics = PerformanceMetrics::compute(
        options.initial_capital,
        sim.capital,
        &pnls,
        &sim.equity_curve,
    );
    info!(
        backtest = id,
        trades = sim.trades.len(),
        final_capital = sim.capital,
        total_return = metrics.total_return,
        "backtest finished"
    );

    BacktestResult {
        id: id.to_string(),
        strategy_id: strategy.id.clone(),
        options: options.clone(),
        trades: sim.trades,
        equity_curve: sim.equity_curve,
        metrics,
        initial_capital: options.initial_capital,
        final_capital: sim.capital,
        bars_evaluated,
        bars_skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::condition::{Condition, Operand, Operator};
    use crate::domain::strategy::{RiskManagement, StrategyConfig};
    use chrono::NaiveDate;

    fn time(i: usize) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + chrono::Duration::days(i as i64)
    }

    fn make_bars(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::new(time(i), c, c + 0.5, c - 0.5, c).with_volume(1_000.0))
            .collect()
    }

    fn close_strategy(entry_above: f64, exit_below: f64, risk: RiskManagement) -> Strategy {
        Strategy::from_config(
            "strategy_1",
            StrategyConfig {
                name: "threshold".into(),
                entry_conditions: vec![Condition::compare(
                    Operand::Close,
                    Operator::Gte,
                    Operand::Constant(entry_above),
                )],
                exit_conditions: vec![Condition::compare(
                    Operand::Close,
                    Operator::Lte,
                    Operand::Constant(exit_below),
                )],
                risk_management: risk,
                ..StrategyConfig::default()
            },
        )
    }

    fn no_stops() -> RiskManagement {
        RiskManagement {
            stop_loss: 0.0,
            take_profit: 0.0,
            position_size: 0.5,
            ..RiskManagement::default()
        }
    }

    fn assert_capital_invariant(result: &BacktestResult) {
        let total: f64 = result.trades.iter().map(|t| t.net_pnl).sum();
        assert!((result.final_capital - (result.initial_capital + total)).abs() < 1e-6);
    }

    #[test]
    fn option_defaults() {
        let o = BacktestOptions::default();
        assert!((o.initial_capital - 10_000.0).abs() < f64::EPSILON);
        assert!((o.commission - 0.001).abs() < f64::EPSILON);
        assert!(o.includes(time(0)));
    }

    #[test]
    fn too_few_bars_trade_nothing() {
        let strategy = close_strategy(0.0, -1.0, no_stops());
        let result = run_backtest(
            "backtest_1",
            &strategy,
            &make_bars(&[100.0; 50]),
            &BacktestOptions::default(),
        );
        assert!(result.trades.is_empty());
        assert!(result.equity_curve.is_empty());
        assert_eq!(result.bars_evaluated, 0);
        assert!((result.final_capital - 10_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn signal_entry_and_exit() {
        let mut closes = vec![90.0; 55];
        closes.extend([100.0, 102.0, 104.0, 80.0, 80.0]);
        let strategy = close_strategy(100.0, 85.0, no_stops());
        let options = BacktestOptions::default();
        let result = run_backtest("backtest_1", &strategy, &make_bars(&closes), &options);

        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.entry_time, time(55));
        assert_eq!(trade.exit_time, time(58));
        assert_eq!(trade.exit_reason, ExitReason::Signal);
        // floor(10000 * 0.5 / 100)
        assert!((trade.quantity - 50.0).abs() < f64::EPSILON);
        assert!((trade.gross_pnl - (-1000.0)).abs() < 1e-9);
        assert!((trade.commission - (50.0 * 100.0 * 0.001 + 50.0 * 80.0 * 0.001)).abs() < 1e-9);
        assert_capital_invariant(&result);
        assert_eq!(result.equity_curve.len(), 10);
    }

    #[test]
    fn stop_loss_beats_signal() {
        let mut closes = vec![90.0; 55];
        closes.extend([100.0, 94.0, 94.0]);
        let risk = RiskManagement {
            stop_loss: 0.05,
            take_profit: 0.0,
            position_size: 0.5,
            ..RiskManagement::default()
        };
        let strategy = close_strategy(100.0, 95.0, risk);
        let result = run_backtest("b", &strategy, &make_bars(&closes), &BacktestOptions::default());
        assert_eq!(result.trades[0].exit_reason, ExitReason::StopLoss);
        assert_eq!(result.trades[0].exit_time, time(56));
        assert_capital_invariant(&result);
    }

    #[test]
    fn take_profit_exit() {
        let mut closes = vec![90.0; 55];
        closes.extend([100.0, 105.0, 111.0, 112.0]);
        let risk = RiskManagement {
            stop_loss: 0.05,
            take_profit: 0.10,
            position_size: 0.5,
            ..RiskManagement::default()
        };
        let strategy = close_strategy(100.0, 0.0, risk);
        let result = run_backtest("b", &strategy, &make_bars(&closes), &BacktestOptions::default());
        assert_eq!(result.trades[0].exit_reason, ExitReason::TakeProfit);
        assert_eq!(result.trades[0].exit_time, time(57));
        // re-entry on the next bar, closed at the end
        assert_eq!(result.trades.len(), 2);
        assert_eq!(result.trades[1].exit_reason, ExitReason::EndOfData);
        assert_capital_invariant(&result);
    }

    #[test]
    fn end_of_data_closes_position() {
        let mut closes = vec![90.0; 55];
        closes.extend([100.0, 101.0, 102.0]);
        let strategy = close_strategy(100.0, 0.0, no_stops());
        let result = run_backtest("b", &strategy, &make_bars(&closes), &BacktestOptions::default());
        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::EndOfData);
        assert_eq!(trade.exit_time, time(57));
        let last = result.equity_curve.last().unwrap();
        assert!((last.value - result.final_capital).abs() < 1e-9);
        assert_capital_invariant(&result);
    }

    #[test]
    fn date_range_filters_bars() {
        let closes = vec![100.0; 120];
        let strategy = close_strategy(100.0, 0.0, no_stops());
        let options = BacktestOptions {
            start_date: Some(time(10).date()),
            end_date: Some(time(69).date()),
            ..BacktestOptions::default()
        };
        let result = run_backtest("b", &strategy, &make_bars(&closes), &options);
        assert_eq!(result.bars_evaluated, 10);
        assert_eq!(result.trades[0].entry_time, time(60));
    }

    #[test]
    fn repeated_runs_are_identical() {
        let closes: Vec<f64> = (0..200)
            .map(|i| 100.0 + (i as f64 * 0.2).sin() * 10.0)
            .collect();
        let strategy = close_strategy(108.0, 92.0, RiskManagement::default());
        let bars = make_bars(&closes);
        let a = run_backtest("b", &strategy, &bars, &BacktestOptions::default());
        let b = run_backtest("b", &strategy, &bars, &BacktestOptions::default());
        assert_eq!(a.trades, b.trades);
        assert_eq!(a.metrics, b.metrics);
        assert_eq!(a.equity_curve, b.equity_curve);
        assert!(!a.trades.is_empty());
        assert_capital_invariant(&a);
    }
}
