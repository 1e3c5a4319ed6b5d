//! Condition model for strategy entry and exit rules.
//!
//! - `Operand`: what is compared (price fields, constants, indicator fields, patterns)
//! - `Operator`: the comparison applied between the operand and its threshold
//! - `Threshold`: a single operand, or a numeric range for `Between`
//! - `Condition`: one weighted rule with a lookback
//!
//! Conditions render back to the DSL accepted by `condition_parser::parse`.

use std::fmt;

use crate::domain::error::TradelabError;
use crate::domain::indicator::{IndicatorField, IndicatorType};
use crate::domain::pattern::CandlestickPattern;

pub const DEFAULT_WEIGHT: f64 = 1.0;
pub const DEFAULT_LOOKBACK: usize = 1;

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Open,
    High,
    Low,
    Close,
    Volume,
    Constant(f64),
    Indicator(IndicatorRef),
    /// 1.0 when the pattern fired on the bar, else 0.0.
    Pattern(CandlestickPattern),
    /// Bullish minus bearish pattern strength on the bar.
    PatternScore,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorRef {
    pub indicator_type: IndicatorType,
    pub field: IndicatorField,
}

impl IndicatorRef {
    pub fn new(indicator_type: IndicatorType, field: IndicatorField) -> Self {
        IndicatorRef {
            indicator_type,
            field,
        }
    }

    pub fn value(indicator_type: IndicatorType) -> Self {
        Self::new(indicator_type, IndicatorField::Value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Gt,
    Lt,
    Gte,
    Lte,
    Eq,
    Ne,
    CrossOver,
    CrossUnder,
    Between,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Threshold {
    Value(Operand),
    Range { lower: f64, upper: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub indicator: Operand,
    pub operator: Operator,
    pub threshold: Threshold,
    pub weight: f64,
    pub lookback: usize,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Gte => ">=",
            Operator::Lte => "<=",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::CrossOver => "crossover",
            Operator::CrossUnder => "crossunder",
            Operator::Between => "between",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let op = match symbol.trim().to_ascii_lowercase().as_str() {
            ">" => Operator::Gt,
            "<" => Operator::Lt,
            ">=" => Operator::Gte,
            "<=" => Operator::Lte,
            "==" => Operator::Eq,
            "!=" => Operator::Ne,
            "crossover" => Operator::CrossOver,
            "crossunder" => Operator::CrossUnder,
            "between" => Operator::Between,
            _ => return None,
        };
        Some(op)
    }

    /// DSL keyword for this operator.
    pub fn keyword(&self) -> &'static str {
        match self {
            Operator::Gt => "ABOVE",
            Operator::Lt => "BELOW",
            Operator::Gte => "GTE",
            Operator::Lte => "LTE",
            Operator::Eq => "EQUALS",
            Operator::Ne => "NOT_EQUALS",
            Operator::CrossOver => "CROSSOVER",
            Operator::CrossUnder => "CROSSUNDER",
            Operator::Between => "BETWEEN",
        }
    }

    pub fn is_cross(&self) -> bool {
        matches!(self, Operator::CrossOver | Operator::CrossUnder)
    }
}

impl Condition {
    pub fn new(indicator: Operand, operator: Operator, threshold: Threshold) -> Self {
        Condition {
            indicator,
            operator,
            threshold,
            weight: DEFAULT_WEIGHT,
            lookback: DEFAULT_LOOKBACK,
        }
    }

    /// Binary comparison against another operand.
    pub fn compare(indicator: Operand, operator: Operator, other: Operand) -> Self {
        Self::new(indicator, operator, Threshold::Value(other))
    }

    pub fn between(indicator: Operand, lower: f64, upper: f64) -> Self {
        Self::new(indicator, Operator::Between, Threshold::Range { lower, upper })
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_lookback(mut self, lookback: usize) -> Self {
        self.lookback = lookback;
        self
    }

    /// Every indicator this condition reads, in order of appearance.
    pub fn indicators(&self) -> Vec<&IndicatorType> {
        let mut out = Vec::new();
        if let Operand::Indicator(r) = &self.indicator {
            out.push(&r.indicator_type);
        }
        if let Threshold::Value(Operand::Indicator(r)) = &self.threshold {
            out.push(&r.indicator_type);
        }
        out
    }

    pub fn uses_patterns(&self) -> bool {
        let is_pattern = |o: &Operand| matches!(o, Operand::Pattern(_) | Operand::PatternScore);
        is_pattern(&self.indicator)
            || matches!(&self.threshold, Threshold::Value(o) if is_pattern(o))
    }
}

/// Distinct indicators read by `conditions`, in first-use order.
pub fn referenced_indicators<'a>(
    conditions: impl IntoIterator<Item = &'a Condition>,
) -> Vec<IndicatorType> {
    let mut out: Vec<IndicatorType> = Vec::new();
    for condition in conditions {
        for indicator in condition.indicators() {
            if !out.contains(indicator) {
                out.push(indicator.clone());
            }
        }
    }
    out
}

fn validate_operand(operand: &Operand) -> Result<(), TradelabError> {
    match operand {
        Operand::Constant(v) if !v.is_finite() => Err(TradelabError::condition(format!(
            "constant must be finite, got {}",
            v
        ))),
        Operand::Indicator(r) => {
            r.indicator_type.validate().map_err(TradelabError::condition)?;
            if !r.indicator_type.shape().supports(r.field) {
                return Err(TradelabError::condition(format!(
                    "{} has no field '{}'",
                    r.indicator_type,
                    r.field.name()
                )));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Reject conditions that can never be evaluated meaningfully.
pub fn validate_condition(condition: &Condition) -> Result<(), TradelabError> {
    if !condition.weight.is_finite() || condition.weight <= 0.0 {
        return Err(TradelabError::condition(format!(
            "weight must be positive, got {}",
            condition.weight
        )));
    }
    if condition.lookback == 0 {
        return Err(TradelabError::condition("lookback must be at least 1"));
    }

    validate_operand(&condition.indicator)?;

    match (&condition.operator, &condition.threshold) {
        (Operator::Between, Threshold::Range { lower, upper }) => {
            if !lower.is_finite() || !upper.is_finite() {
                return Err(TradelabError::condition("between bounds must be finite"));
            }
            if lower > upper {
                return Err(TradelabError::condition(format!(
                    "between lower bound {} exceeds upper bound {}",
                    lower, upper
                )));
            }
            Ok(())
        }
        (Operator::Between, Threshold::Value(_)) => Err(TradelabError::condition(
            "between requires a lower and upper bound",
        )),
        (op, Threshold::Range { .. }) => Err(TradelabError::condition(format!(
            "operator '{}' requires a single threshold value",
            op.symbol()
        ))),
        (_, Threshold::Value(other)) => validate_operand(other),
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Open => f.write_str("open"),
            Operand::High => f.write_str("high"),
            Operand::Low => f.write_str("low"),
            Operand::Close => f.write_str("close"),
            Operand::Volume => f.write_str("volume"),
            Operand::Constant(v) => write!(f, "{}", v),
            Operand::Indicator(r) if r.field == IndicatorField::Value => {
                write!(f, "{}", r.indicator_type)
            }
            Operand::Indicator(r) => write!(f, "{}.{}", r.indicator_type, r.field.name()),
            Operand::Pattern(p) => write!(f, "PATTERN({})", p),
            Operand::PatternScore => f.write_str("PATTERN_SCORE"),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.threshold {
            Threshold::Range { lower, upper } => write!(
                f,
                "{}({}, {}, {})",
                self.operator.keyword(),
                self.indicator,
                lower,
                upper
            ),
            Threshold::Value(other) => write!(
                f,
                "{}({}, {})",
                self.operator.keyword(),
                self.indicator,
                other
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sma(period: usize) -> Operand {
        Operand::Indicator(IndicatorRef::value(IndicatorType::Sma(period)))
    }

    #[test]
    fn defaults() {
        let c = Condition::compare(Operand::Close, Operator::Gt, Operand::Constant(100.0));
        assert!((c.weight - 1.0).abs() < f64::EPSILON);
        assert_eq!(c.lookback, 1);
        assert!(validate_condition(&c).is_ok());
    }

    #[test]
    fn operator_symbols_round_trip() {
        for op in [
            Operator::Gt,
            Operator::Lt,
            Operator::Gte,
            Operator::Lte,
            Operator::Eq,
            Operator::Ne,
            Operator::CrossOver,
            Operator::CrossUnder,
            Operator::Between,
        ] {
            assert_eq!(Operator::from_symbol(op.symbol()), Some(op));
        }
        assert_eq!(Operator::from_symbol("CrossOver"), Some(Operator::CrossOver));
        assert_eq!(Operator::from_symbol("=>"), None);
    }

    #[test]
    fn rejects_bad_weight_and_lookback() {
        let base = Condition::compare(Operand::Close, Operator::Gt, Operand::Constant(1.0));
        assert!(validate_condition(&base.clone().with_weight(0.0)).is_err());
        assert!(validate_condition(&base.clone().with_weight(f64::NAN)).is_err());
        assert!(validate_condition(&base.clone().with_lookback(0)).is_err());
        assert!(validate_condition(&base.with_lookback(3)).is_ok());
    }

    #[test]
    fn between_requires_ordered_range() {
        assert!(validate_condition(&Condition::between(Operand::Close, 1.0, 2.0)).is_ok());
        assert!(validate_condition(&Condition::between(Operand::Close, 2.0, 1.0)).is_err());

        let wrong = Condition::new(
            Operand::Close,
            Operator::Between,
            Threshold::Value(Operand::Constant(1.0)),
        );
        assert!(validate_condition(&wrong).is_err());

        let range_on_gt = Condition::new(
            Operand::Close,
            Operator::Gt,
            Threshold::Range {
                lower: 1.0,
                upper: 2.0,
            },
        );
        assert!(validate_condition(&range_on_gt).is_err());
    }

    #[test]
    fn rejects_unsupported_field() {
        let c = Condition::compare(
            Operand::Indicator(IndicatorRef::new(
                IndicatorType::Sma(20),
                IndicatorField::Signal,
            )),
            Operator::Gt,
            Operand::Constant(0.0),
        );
        let err = validate_condition(&c).unwrap_err();
        assert!(err.to_string().contains("no field 'signal'"));
    }

    #[test]
    fn rejects_zero_period_on_threshold_side() {
        let c = Condition::compare(Operand::Close, Operator::Gt, sma(0));
        assert!(validate_condition(&c).is_err());
    }

    #[test]
    fn referenced_indicators_are_distinct() {
        let conditions = vec![
            Condition::compare(sma(50), Operator::CrossOver, sma(200)),
            Condition::compare(sma(50), Operator::CrossUnder, sma(200)),
            Condition::compare(Operand::Close, Operator::Gt, sma(20)),
        ];
        assert_eq!(
            referenced_indicators(&conditions),
            vec![
                IndicatorType::Sma(50),
                IndicatorType::Sma(200),
                IndicatorType::Sma(20)
            ]
        );
    }

    #[test]
    fn display_renders_dsl() {
        let c = Condition::compare(sma(50), Operator::CrossOver, sma(200));
        assert_eq!(c.to_string(), "CROSSOVER(SMA(50), SMA(200))");

        let macd = Operand::Indicator(IndicatorRef::new(
            IndicatorType::Macd {
                fast: 12,
                slow: 26,
                signal: 9,
            },
            IndicatorField::Signal,
        ));
        let c = Condition::compare(macd, Operator::Lte, Operand::Constant(-0.5));
        assert_eq!(c.to_string(), "LTE(MACD(12,26,9).signal, -0.5)");

        let c = Condition::between(Operand::Close, 10.0, 20.5);
        assert_eq!(c.to_string(), "BETWEEN(close, 10, 20.5)");

        let c = Condition::compare(
            Operand::Pattern(CandlestickPattern::Hammer),
            Operator::Eq,
            Operand::Constant(1.0),
        );
        assert_eq!(c.to_string(), "EQUALS(PATTERN(hammer), 1)");
        assert!(c.uses_patterns());
    }
}
