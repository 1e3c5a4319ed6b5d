//! Condition evaluation against bars, pre-computed indicators and pattern detections.
//!
//! # Evaluation Semantics
//!
//! - `>`, `<`, `>=`, `<=`, `==`, `!=`, `between`: must hold on each of the last
//!   `lookback` bars ending at the evaluated bar; the score comes from that bar
//! - `crossover`/`crossunder`: compare the evaluated bar with the one before it,
//!   `prev <= target && current > target` (mirrored for crossunder); false at bar 0
//! - A value still in its warm-up window never triggers
//! - `>`/`<` scores scale with the distance past the threshold, capped at 1;
//!   every other operator scores 1 when triggered
//! - A condition set triggers when its weighted confidence exceeds
//!   `CONFIDENCE_THRESHOLD`; an empty set never triggers

use std::collections::HashMap;

use serde::Serialize;

use crate::domain::condition::{Condition, IndicatorRef, Operand, Operator, Threshold};
use crate::domain::error::TradelabError;
use crate::domain::indicator::series::sample_stddev;
use crate::domain::indicator::{IndicatorField, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::Bar;
use crate::domain::pattern::PatternDetection;
use crate::domain::pattern::candlestick::detection_at;
use crate::domain::strategy::RiskManagement;

const EPSILON: f64 = 1e-9;

/// Weighted confidence a condition set must exceed to trigger.
pub const CONFIDENCE_THRESHOLD: f64 = 0.6;
/// `>`/`<` scores reach 1 once the value is 10% past its threshold.
const SCORE_SCALE: f64 = 10.0;

pub const REGIME_PERIOD: usize = 14;
pub const TREND_ADX_THRESHOLD: f64 = 25.0;
pub const VOLATILE_ATR_RATIO: f64 = 1.5;
pub const VOLATILITY_WINDOW: usize = 20;
const TRADING_DAYS: f64 = 252.0;

/// Everything a condition can read, for one bar slice.
#[derive(Debug, Clone, Copy)]
pub struct MarketData<'a> {
    pub bars: &'a [Bar],
    pub indicators: &'a HashMap<IndicatorType, IndicatorSeries>,
    pub patterns: &'a [PatternDetection],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionResult {
    pub condition: String,
    pub triggered: bool,
    pub score: f64,
    pub current: Option<f64>,
    pub target: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionSetResult {
    pub triggered: bool,
    pub confidence: f64,
    pub results: Vec<ConditionResult>,
}

impl<'a> MarketData<'a> {
    pub fn new(
        bars: &'a [Bar],
        indicators: &'a HashMap<IndicatorType, IndicatorSeries>,
        patterns: &'a [PatternDetection],
    ) -> Self {
        MarketData {
            bars,
            indicators,
            patterns,
        }
    }

    fn series(&self, indicator_type: &IndicatorType) -> Result<&'a IndicatorSeries, TradelabError> {
        self.indicators.get(indicator_type).ok_or_else(|| {
            TradelabError::evaluation(format!("indicator {} was not computed", indicator_type))
        })
    }

    /// Value of `operand` at `index`, or `None` during an indicator's warm-up.
    pub fn resolve(&self, operand: &Operand, index: usize) -> Result<Option<f64>, TradelabError> {
        let bar = self.bars.get(index).ok_or_else(|| {
            TradelabError::evaluation(format!(
                "bar {} out of range ({} bars)",
                index,
                self.bars.len()
            ))
        })?;
        let value = match operand {
            Operand::Open => Some(bar.open),
            Operand::High => Some(bar.high),
            Operand::Low => Some(bar.low),
            Operand::Close => Some(bar.close),
            Operand::Volume => Some(bar.volume_or_default()),
            Operand::Constant(v) => Some(*v),
            Operand::Indicator(r) => self.resolve_indicator(r, index)?,
            Operand::Pattern(p) => {
                if detection_at(self.patterns, index).is_some_and(|d| d.has(*p)) {
                    Some(1.0)
                } else {
                    Some(0.0)
                }
            }
            Operand::PatternScore => Some(
                detection_at(self.patterns, index)
                    .map(PatternDetection::net_score)
                    .unwrap_or(0.0),
            ),
        };
        Ok(value.filter(|v| v.is_finite()))
    }

    fn resolve_indicator(
        &self,
        r: &IndicatorRef,
        index: usize,
    ) -> Result<Option<f64>, TradelabError> {
        let series = self.series(&r.indicator_type)?;
        if !r.indicator_type.shape().supports(r.field) {
            return Err(TradelabError::evaluation(format!(
                "{} has no field '{}'",
                r.indicator_type,
                r.field.name()
            )));
        }
        Ok(series.value_at(index, r.field))
    }
}

fn compare(operator: Operator, current: f64, target: f64) -> bool {
    match operator {
        Operator::Gt => current > target,
        Operator::Lt => current < target,
        Operator::Gte => current >= target,
        Operator::Lte => current <= target,
        Operator::Eq => (current - target).abs() < EPSILON,
        Operator::Ne => (current - target).abs() >= EPSILON,
        Operator::CrossOver | Operator::CrossUnder | Operator::Between => false,
    }
}

fn score(operator: Operator, current: f64, target: f64) -> f64 {
    match operator {
        Operator::Gt | Operator::Lt => {
            ((current - target).abs() / target.abs().max(1.0) * SCORE_SCALE).min(1.0)
        }
        _ => 1.0,
    }
}

fn holds_at(
    condition: &Condition,
    data: &MarketData<'_>,
    index: usize,
) -> Result<Option<(bool, f64, Option<f64>)>, TradelabError> {
    let Some(current) = data.resolve(&condition.indicator, index)? else {
        return Ok(None);
    };
    match &condition.threshold {
        Threshold::Range { lower, upper } => {
            Ok(Some((current >= *lower && current <= *upper, current, None)))
        }
        Threshold::Value(other) => Ok(data
            .resolve(other, index)?
            .map(|target| (compare(condition.operator, current, target), current, Some(target)))),
    }
}

/// Evaluate one condition at bar `index`.
///
/// Returns `Err` only for setup problems (an indicator missing from `data`,
/// an unsupported field, an out-of-range bar); warm-up values simply do not trigger.
pub fn evaluate_condition(
    condition: &Condition,
    data: &MarketData<'_>,
    index: usize,
) -> Result<ConditionResult, TradelabError> {
    let mut result = ConditionResult {
        condition: condition.to_string(),
        triggered: false,
        score: 0.0,
        current: data.resolve(&condition.indicator, index)?,
        target: match &condition.threshold {
            Threshold::Value(other) => data.resolve(other, index)?,
            Threshold::Range { .. } => None,
        },
    };

    if condition.operator.is_cross() {
        if index == 0 {
            return Ok(result);
        }
        let Threshold::Value(other) = &condition.threshold else {
            return Err(TradelabError::condition("crossover requires a single threshold value"));
        };
        let prev = (
            data.resolve(&condition.indicator, index - 1)?,
            data.resolve(other, index - 1)?,
        );
        if let ((Some(prev_cur), Some(prev_target)), Some(cur), Some(target)) =
            (prev, result.current, result.target)
        {
            result.triggered = match condition.operator {
                Operator::CrossOver => prev_cur <= prev_target && cur > target,
                _ => prev_cur >= prev_target && cur < target,
            };
        }
        result.score = if result.triggered { 1.0 } else { 0.0 };
        return Ok(result);
    }

    let lookback = condition.lookback.max(1);
    if index + 1 < lookback {
        return Ok(result);
    }
    for bar in (index + 1 - lookback..=index).rev() {
        match holds_at(condition, data, bar)? {
            Some((true, _, _)) => {}
            _ => return Ok(result),
        }
    }

    result.triggered = true;
    result.score = match (result.current, result.target) {
        (Some(cur), Some(target)) => score(condition.operator, cur, target),
        _ => 1.0,
    };
    Ok(result)
}

/// Weighted confidence over a condition set: `Σ score·weight / Σ weight` of the
/// triggered conditions, triggering above `CONFIDENCE_THRESHOLD`.
pub fn evaluate_conditions(
    conditions: &[Condition],
    data: &MarketData<'_>,
    index: usize,
) -> Result<ConditionSetResult, TradelabError> {
    if conditions.is_empty() {
        return Ok(ConditionSetResult {
            triggered: false,
            confidence: 0.0,
            results: Vec::new(),
        });
    }

    let mut results = Vec::with_capacity(conditions.len());
    let mut weighted = 0.0;
    let mut total_weight = 0.0;
    for condition in conditions {
        let result = evaluate_condition(condition, data, index)?;
        total_weight += condition.weight;
        if result.triggered {
            weighted += result.score * condition.weight;
        }
        results.push(result);
    }

    let confidence = if total_weight > 0.0 {
        weighted / total_weight
    } else {
        0.0
    };
    Ok(ConditionSetResult {
        triggered: confidence > CONFIDENCE_THRESHOLD,
        confidence,
        results,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MarketRegime {
    pub trending: bool,
    pub volatile: bool,
    pub adx: Option<f64>,
    pub atr: Option<f64>,
}

/// Indicators `detect_regime` and `compute_risk_metrics` read.
pub fn regime_indicators() -> [IndicatorType; 2] {
    [
        IndicatorType::Adx(REGIME_PERIOD),
        IndicatorType::Atr(REGIME_PERIOD),
    ]
}

/// Trending when ADX exceeds 25; volatile when ATR exceeds 1.5× the mean of its
/// last 20 values. Either flag is false while its inputs are warming up.
pub fn detect_regime(adx: &IndicatorSeries, atr: &IndicatorSeries, index: usize) -> MarketRegime {
    let adx_now = adx.value_at(index, IndicatorField::Value);
    let atr_now = atr.value_at(index, IndicatorField::Value);

    let volatile = match atr_now {
        Some(current) if index + 1 >= atr.offset() + VOLATILITY_WINDOW => {
            let end = index + 1 - atr.offset();
            let window = &atr.values[end - VOLATILITY_WINDOW..end];
            let average =
                window.iter().map(|p| p.value.primary()).sum::<f64>() / VOLATILITY_WINDOW as f64;
            current > VOLATILE_ATR_RATIO * average
        }
        _ => false,
    };

    MarketRegime {
        trending: adx_now.is_some_and(|v| v > TREND_ADX_THRESHOLD),
        volatile,
        adx: adx_now,
        atr: atr_now,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskMetrics {
    pub atr: Option<f64>,
    /// Annualized volatility of the last 20 close-to-close returns.
    pub volatility: Option<f64>,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
    pub risk_reward_ratio: f64,
    /// Fraction of capital to commit; halved in a volatile regime.
    pub suggested_position: f64,
    pub regime: MarketRegime,
}

pub fn compute_risk_metrics(
    bars: &[Bar],
    index: usize,
    regime: MarketRegime,
    risk: &RiskManagement,
) -> RiskMetrics {
    let close = bars.get(index).map(|b| b.close).unwrap_or(0.0);

    let volatility = (index >= VOLATILITY_WINDOW).then(|| {
        let returns: Vec<f64> = bars[index - VOLATILITY_WINDOW..=index]
            .windows(2)
            .filter(|w| w[0].close != 0.0)
            .map(|w| w[1].close / w[0].close - 1.0)
            .collect();
        sample_stddev(&returns) * TRADING_DAYS.sqrt()
    });

    let risk_reward_ratio = if risk.stop_loss > 0.0 {
        risk.take_profit / risk.stop_loss
    } else {
        0.0
    };
    let suggested_position = if regime.volatile {
        risk.position_size / 2.0
    } else {
        risk.position_size
    };

    RiskMetrics {
        atr: regime.atr,
        volatility,
        stop_loss_price: close * (1.0 - risk.stop_loss),
        take_profit_price: close * (1.0 + risk.take_profit),
        risk_reward_ratio,
        suggested_position,
        regime,
    }
}
