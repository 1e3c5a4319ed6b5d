//! Strategy configuration, templates and per-strategy bookkeeping.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde::Serialize;

use crate::domain::condition::{Condition, IndicatorRef, Operand, Operator, referenced_indicators};
use crate::domain::condition_eval::MarketRegime;
use crate::domain::indicator::{IndicatorField, IndicatorType};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskManagement {
    /// Fractional stop distance below entry, e.g. 0.05.
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Fraction of current capital committed per position.
    pub position_size: f64,
    pub max_drawdown: f64,
    pub max_positions: usize,
}

impl Default for RiskManagement {
    fn default() -> Self {
        RiskManagement {
            stop_loss: 0.05,
            take_profit: 0.10,
            position_size: 0.10,
            max_drawdown: 0.20,
            max_positions: 1,
        }
    }
}

/// Market regimes a strategy is willing to trade in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MarketConditions {
    pub trending: bool,
    pub ranging: bool,
    pub volatile: bool,
    pub low_volatile: bool,
}

impl Default for MarketConditions {
    fn default() -> Self {
        MarketConditions {
            trending: true,
            ranging: true,
            volatile: true,
            low_volatile: true,
        }
    }
}

impl MarketConditions {
    pub fn allows(&self, regime: &MarketRegime) -> bool {
        let trend_ok = if regime.trending {
            self.trending
        } else {
            self.ranging
        };
        let volatility_ok = if regime.volatile {
            self.volatile
        } else {
            self.low_volatile
        };
        trend_ok && volatility_ok
    }
}

/// Restrict trading to a time-of-day window and a set of weekdays.
/// An unset bound or an empty weekday list imposes no restriction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TimeFilter {
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub weekdays: Vec<Weekday>,
}

impl TimeFilter {
    pub fn allows(&self, time: NaiveDateTime) -> bool {
        if !self.weekdays.is_empty() && !self.weekdays.contains(&time.weekday()) {
            return false;
        }
        let t = NaiveTime::from_hms_opt(time.hour(), time.minute(), time.second())
            .unwrap_or_default();
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) if start <= end => t >= start && t <= end,
            // window wraps past midnight
            (Some(start), Some(end)) => t >= start || t <= end,
            (Some(start), None) => t >= start,
            (None, Some(end)) => t <= end,
            (None, None) => true,
        }
    }
}

/// Everything needed to create a strategy. Unset fields keep their defaults.
#[derive(Debug, Clone, Default)]
pub struct StrategyConfig {
    pub name: String,
    pub description: String,
    pub entry_conditions: Vec<Condition>,
    pub exit_conditions: Vec<Condition>,
    pub risk_management: RiskManagement,
    pub market_conditions: MarketConditions,
    pub parameters: BTreeMap<String, f64>,
    pub time_filter: Option<TimeFilter>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceCounters {
    pub backtests_run: usize,
    pub total_trades: usize,
    pub last_total_return: Option<f64>,
    pub last_win_rate: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Strategy {
    pub id: String,
    pub name: String,
    pub description: String,
    pub entry_conditions: Vec<Condition>,
    pub exit_conditions: Vec<Condition>,
    pub risk_management: RiskManagement,
    pub market_conditions: MarketConditions,
    pub parameters: BTreeMap<String, f64>,
    pub time_filter: Option<TimeFilter>,
    pub performance: PerformanceCounters,
}

impl Strategy {
    pub fn from_config(id: impl Into<String>, config: StrategyConfig) -> Self {
        Strategy {
            id: id.into(),
            name: config.name,
            description: config.description,
            entry_conditions: config.entry_conditions,
            exit_conditions: config.exit_conditions,
            risk_management: config.risk_management,
            market_conditions: config.market_conditions,
            parameters: config.parameters,
            time_filter: config.time_filter,
            performance: PerformanceCounters::default(),
        }
    }

    /// Indicators read by any entry or exit condition.
    pub fn indicators(&self) -> Vec<IndicatorType> {
        referenced_indicators(self.entry_conditions.iter().chain(&self.exit_conditions))
    }

    pub fn uses_patterns(&self) -> bool {
        self.entry_conditions
            .iter()
            .chain(&self.exit_conditions)
            .any(Condition::uses_patterns)
    }

    pub fn trades_at(&self, time: NaiveDateTime) -> bool {
        self.time_filter.as_ref().is_none_or(|f| f.allows(time))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyTemplate {
    GoldenCross,
    RsiMeanReversion,
    MacdMomentum,
    BollingerReversion,
}

fn indicator(indicator_type: IndicatorType) -> Operand {
    Operand::Indicator(IndicatorRef::value(indicator_type))
}

fn indicator_field(indicator_type: IndicatorType, field: IndicatorField) -> Operand {
    Operand::Indicator(IndicatorRef::new(indicator_type, field))
}

impl StrategyTemplate {
    pub fn all() -> &'static [StrategyTemplate] {
        &[
            StrategyTemplate::GoldenCross,
            StrategyTemplate::RsiMeanReversion,
            StrategyTemplate::MacdMomentum,
            StrategyTemplate::BollingerReversion,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            StrategyTemplate::GoldenCross => "golden_cross",
            StrategyTemplate::RsiMeanReversion => "rsi_mean_reversion",
            StrategyTemplate::MacdMomentum => "macd_momentum",
            StrategyTemplate::BollingerReversion => "bollinger_reversion",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_ascii_lowercase();
        Self::all().iter().copied().find(|t| t.name() == lower)
    }

    pub fn config(&self) -> StrategyConfig {
        let (description, entry, exit) = match self {
            StrategyTemplate::GoldenCross => {
                let fast = || indicator(IndicatorType::Sma(50));
                let slow = || indicator(IndicatorType::Sma(200));
                (
                    "SMA(50) crossing SMA(200)",
                    vec![Condition::compare(fast(), Operator::CrossOver, slow())],
                    vec![Condition::compare(fast(), Operator::CrossUnder, slow())],
                )
            }
            StrategyTemplate::RsiMeanReversion => {
                let rsi = || indicator(IndicatorType::Rsi(14));
                (
                    "RSI(14) leaving oversold and overbought zones",
                    vec![Condition::compare(
                        rsi(),
                        Operator::CrossOver,
                        Operand::Constant(30.0),
                    )],
                    vec![Condition::compare(
                        rsi(),
                        Operator::CrossUnder,
                        Operand::Constant(70.0),
                    )],
                )
            }
            StrategyTemplate::MacdMomentum => {
                let macd = IndicatorType::Macd {
                    fast: 12,
                    slow: 26,
                    signal: 9,
                };
                let line = || indicator(macd.clone());
                let signal = || indicator_field(macd.clone(), IndicatorField::Signal);
                (
                    "MACD crossing its signal line above EMA(50)",
                    vec![
                        Condition::compare(line(), Operator::CrossOver, signal()).with_weight(2.0),
                        Condition::compare(
                            Operand::Close,
                            Operator::Gt,
                            indicator(IndicatorType::Ema(50)),
                        ),
                    ],
                    vec![Condition::compare(line(), Operator::CrossUnder, signal())],
                )
            }
            StrategyTemplate::BollingerReversion => {
                let bands = IndicatorType::Bollinger {
                    period: 20,
                    stddev_mult_x100: 200,
                };
                (
                    "Close below the lower band, exit above the middle band",
                    vec![Condition::compare(
                        Operand::Close,
                        Operator::Lt,
                        indicator_field(bands.clone(), IndicatorField::Lower),
                    )],
                    vec![Condition::compare(
                        Operand::Close,
                        Operator::Gt,
                        indicator_field(bands, IndicatorField::Middle),
                    )],
                )
            }
        };

        StrategyConfig {
            name: self.name().to_string(),
            description: description.to_string(),
            entry_conditions: entry,
            exit_conditions: exit,
            ..StrategyConfig::default()
        }
    }
}

impl fmt::Display for StrategyTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
