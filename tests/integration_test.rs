//! End-to-end tests across the domain: data port, engine, backtest,
//! patterns and the portfolio manager.

mod common;

use std::collections::HashMap;

use approx::assert_relative_eq;
use common::*;
use proptest::prelude::*;
use tradelab::domain::backtest::BacktestOptions;
use tradelab::domain::condition::{Condition, Operand, Operator};
use tradelab::domain::condition_eval::{MarketData, evaluate_condition};
use tradelab::domain::engine::{SignalAction, StrategyEngine};
use tradelab::domain::error::TradelabError;
use tradelab::domain::indicator::momentum::calculate_rsi;
use tradelab::domain::indicator::volatility::calculate_bollinger;
use tradelab::domain::indicator::{IndicatorField, IndicatorSeries, IndicatorType};
use tradelab::domain::indicator::series::sma;
use tradelab::domain::pattern::{CandlestickDetector, CandlestickPattern};
use tradelab::domain::portfolio::{PortfolioManager, PositionRequest};
use tradelab::domain::position::Side;
use tradelab::domain::sizing::RiskSettings;
use tradelab::ports::data_port::DataPort;

mod engine_pipeline {
    use super::*;

    #[test]
    fn golden_cross_on_short_uptrend_never_sells() {
        let port = MockDataPort::new().with_bars("UP", rising_bars(60, 100.0, 1.0));
        let bars = port.fetch_bars("UP", None, None).unwrap();

        let mut engine = StrategyEngine::new();
        let id = engine.create_from_template("golden_cross").unwrap();
        let signal = engine.evaluate_strategy(&id, &bars).unwrap();
        assert_ne!(signal.action, SignalAction::Sell);
        assert_eq!(signal.action, SignalAction::Hold);

        // SMA(200) never warms up on 60 bars
        let result = engine.backtest(&id, &bars, &BacktestOptions::default()).unwrap();
        assert!(result.trades.is_empty());
        assert_eq!(result.bars_evaluated, 10);
        assert_relative_eq!(result.final_capital, 10_000.0);
    }

    #[test]
    fn backtest_is_idempotent() {
        let bars = wave_bars(250);
        let mut engine = StrategyEngine::new();
        let id = engine.create_from_template("rsi_mean_reversion").unwrap();

        let first = engine.backtest(&id, &bars, &BacktestOptions::default()).unwrap().clone();
        let second = engine.backtest(&id, &bars, &BacktestOptions::default()).unwrap().clone();

        assert_ne!(first.id, second.id);
        assert_eq!(first.trades, second.trades);
        assert_eq!(first.equity_curve, second.equity_curve);
        assert_eq!(first.metrics, second.metrics);
        assert_eq!(engine.get_strategy(&id).unwrap().performance.backtests_run, 2);
    }

    #[test]
    fn backtest_capital_matches_trade_pnl() {
        let bars = wave_bars(300);
        let mut engine = StrategyEngine::new();
        for template in ["rsi_mean_reversion", "macd_momentum", "bollinger_reversion"] {
            let id = engine.create_from_template(template).unwrap();
            let result = engine.backtest(&id, &bars, &BacktestOptions::default()).unwrap();
            let total: f64 = result.trades.iter().map(|t| t.net_pnl).sum();
            assert_relative_eq!(
                result.final_capital,
                result.initial_capital + total,
                epsilon = 1e-6
            );
            for trade in &result.trades {
                assert!(trade.exit_time >= trade.entry_time);
                assert!(trade.quantity >= 1.0);
            }
        }
    }

    #[test]
    fn unknown_ids_are_errors() {
        let mut engine = StrategyEngine::new();
        assert!(matches!(
            engine.create_from_template("moon_shot"),
            Err(TradelabError::UnknownStrategy { .. })
        ));
        assert!(matches!(
            engine.get_backtest("backtest_9"),
            Err(TradelabError::UnknownBacktest { .. })
        ));
    }

    #[test]
    fn data_port_errors_surface() {
        let port = MockDataPort::new().with_error("BAD", "connection reset");
        let err = port.fetch_bars("BAD", None, None).unwrap_err();
        assert!(matches!(err, TradelabError::Data { .. }));
    }

    #[test]
    fn data_port_date_filter() {
        let port = MockDataPort::new().with_bars("UP", rising_bars(30, 10.0, 1.0));
        let bars = port
            .fetch_bars("UP", Some(date(2024, 1, 11)), Some(date(2024, 1, 20)))
            .unwrap();
        assert_eq!(bars.len(), 10);
        assert_eq!(port.list_symbols().unwrap(), vec!["UP"]);
    }
}

mod patterns {
    use super::*;

    #[test]
    fn doji_found_in_sequence() {
        let mut bars: Vec<Bar> = (0..20)
            .map(|i| {
                let o = 100.0 + i as f64;
                Bar::new(day(i), o, o + 2.5, o - 0.5, o + 2.0)
            })
            .collect();
        // open = close = price, high and low 10 away
        bars[10] = Bar::new(day(10), 110.0, 120.0, 100.0, 110.0);

        let detections = CandlestickDetector::default().detect(&bars);
        let dojis: Vec<usize> = detections
            .iter()
            .filter(|d| d.has(CandlestickPattern::Doji))
            .map(|d| d.index)
            .collect();
        assert_eq!(dojis, vec![10]);
    }
}

mod portfolio {
    use super::*;

    #[test]
    fn fixed_percent_sizing_end_to_end() {
        let mut manager = PortfolioManager::new();
        let pid = manager
            .create_portfolio("main", 10_000.0, RiskSettings::default(), day(0))
            .unwrap();
        let mut request = PositionRequest::new("AAPL", Side::Long, 50.0, day(1));
        request.stop_loss = Some(45.0);

        assert_relative_eq!(manager.size_position(&pid, &request).unwrap(), 20.0);
        assert!(manager.validate_position(&pid, &request).unwrap());

        let position_id = manager.add_position(&pid, &request).unwrap();
        let closed = manager.close_position(&position_id, 55.0, day(5), "signal").unwrap();
        // 20 * 5 gross less 1.00 entry and 1.10 exit commission
        assert_relative_eq!(closed.realized_pnl.unwrap(), 97.9, epsilon = 1e-9);

        let summary = manager.portfolio_summary(&pid).unwrap();
        assert_eq!(summary.open_positions, 0);
        assert_eq!(summary.closed_positions, 1);
        assert_relative_eq!(summary.current_capital, 10_097.9, epsilon = 1e-9);
    }
}

proptest! {
    #[test]
    fn sma_length_and_window_mean(
        values in prop::collection::vec(1.0f64..1000.0, 1..120),
        period in 1usize..30,
    ) {
        let out = sma(&values, period);
        if values.len() < period {
            prop_assert!(out.is_empty());
        } else {
            prop_assert_eq!(out.len(), values.len() - period + 1);
            for (j, v) in out.iter().enumerate() {
                let mean = values[j..j + period].iter().sum::<f64>() / period as f64;
                prop_assert!((v - mean).abs() <= 1e-9 * mean.abs().max(1.0));
            }
        }
    }

    #[test]
    fn rsi_stays_in_range(
        closes in prop::collection::vec(1.0f64..500.0, 2..150),
        period in 1usize..20,
    ) {
        let series = calculate_rsi(&bars_from_closes(&closes), period);
        for v in series.primary_values() {
            prop_assert!((0.0..=100.0).contains(&v), "rsi {} out of range", v);
        }
    }

    #[test]
    fn bollinger_percent_b_pinned_to_bands(
        prefix in prop::collection::vec(1.0f64..500.0, 0..20),
        prev in 60.0f64..500.0,
        gap in 0.01f64..50.0,
        falling in any::<bool>(),
    ) {
        // a two-bar window with one stddev puts the last close on a band
        let last = if falling { prev - gap } else { prev + gap };
        let mut closes = prefix;
        closes.extend([prev, last]);
        let series = calculate_bollinger(&bars_from_closes(&closes), 2, 1.0);
        let point = series.latest().unwrap().value;
        let percent_b = point.field(IndicatorField::PercentB).unwrap();
        let expected = if falling { 0.0 } else { 1.0 };
        prop_assert!((percent_b - expected).abs() < 1e-9, "%B {} at {}", percent_b, last);
    }

    #[test]
    fn crossover_is_strict(
        prev in 0.0f64..200.0,
        current in 0.0f64..200.0,
        threshold in 0.0f64..200.0,
    ) {
        let bars = bars_from_closes(&[prev, current]);
        let indicators: HashMap<IndicatorType, IndicatorSeries> = HashMap::new();
        let data = MarketData::new(&bars, &indicators, &[]);

        let over = Condition::compare(
            Operand::Close,
            Operator::CrossOver,
            Operand::Constant(threshold),
        );
        let result = evaluate_condition(&over, &data, 1).unwrap();
        prop_assert_eq!(result.triggered, prev <= threshold && current > threshold);

        let under = Condition::compare(
            Operand::Close,
            Operator::CrossUnder,
            Operand::Constant(threshold),
        );
        let result = evaluate_condition(&under, &data, 1).unwrap();
        prop_assert_eq!(result.triggered, prev >= threshold && current < threshold);
    }
}
