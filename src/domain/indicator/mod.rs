//! Technical indicator types and implementations.
//!
//! This module provides types for representing indicator values and series:
//! - `IndicatorPoint`: A single point in an indicator time series
//! - `IndicatorValue`: Enum for different indicator output shapes
//! - `IndicatorType`: Enum for indicator identity + parameters (serves as HashMap key)
//! - `IndicatorField`: Named field of a structured value, checked against `ValueShape`
//! - `IndicatorSeries`: A time series of indicator values aligned to the tail of its bars
//!
//! Every series is suffix-aligned: value `j` belongs to bar
//! `source_len - values.len() + j`. Warm-up bars produce no value at all.

pub mod momentum;
pub mod series;
pub mod trend;
pub mod volatility;
pub mod volume;

use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

use crate::domain::ohlcv::Bar;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorPoint {
    pub time: NaiveDateTime,
    pub value: IndicatorValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorValue {
    Simple(f64),
    Macd {
        line: f64,
        signal: f64,
        histogram: f64,
    },
    Stochastic {
        k: f64,
        d: f64,
    },
    Bollinger {
        upper: f64,
        middle: f64,
        lower: f64,
        bandwidth: f64,
        percent_b: f64,
        squeeze: bool,
    },
    Channel {
        upper: f64,
        middle: f64,
        lower: f64,
    },
    Directional {
        adx: f64,
        plus_di: f64,
        minus_di: f64,
    },
    Aroon {
        up: f64,
        down: f64,
        oscillator: f64,
    },
    Trend {
        value: f64,
        uptrend: bool,
    },
    Regression {
        value: f64,
        slope: f64,
        r_squared: f64,
    },
    Ichimoku {
        tenkan: f64,
        kijun: f64,
        span_a: f64,
        span_b: f64,
    },
    Pivot {
        pivot: f64,
        r1: f64,
        r2: f64,
        r3: f64,
        s1: f64,
        s2: f64,
        s3: f64,
    },
    WithSignal {
        value: f64,
        signal: f64,
    },
}

/// The output shape of an indicator, independent of its numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueShape {
    Simple,
    Macd,
    Stochastic,
    Bollinger,
    Channel,
    Directional,
    Aroon,
    Trend,
    Regression,
    Ichimoku,
    Pivot,
    WithSignal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorField {
    Value,
    Signal,
    Histogram,
    K,
    D,
    Upper,
    Middle,
    Lower,
    Bandwidth,
    PercentB,
    Squeeze,
    PlusDi,
    MinusDi,
    Up,
    Down,
    Direction,
    Slope,
    RSquared,
    Tenkan,
    Kijun,
    SpanA,
    SpanB,
    R1,
    R2,
    R3,
    S1,
    S2,
    S3,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum IndicatorType {
    Sma(usize),
    Ema(usize),
    Wma(usize),
    Hma(usize),
    Dema(usize),
    Tema(usize),
    Vwma(usize),
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    Adx(usize),
    Aroon(usize),
    Psar {
        step_x1000: u32,
        max_x1000: u32,
    },
    SuperTrend {
        period: usize,
        mult_x100: u32,
    },
    LinearRegression(usize),
    PolynomialRegression {
        period: usize,
        degree: usize,
    },
    Ichimoku {
        tenkan: usize,
        kijun: usize,
        senkou: usize,
    },
    Pivot,
    Rsi(usize),
    Stochastic {
        k_period: usize,
        d_period: usize,
        smooth: usize,
    },
    StochRsi {
        rsi_period: usize,
        stoch_period: usize,
        k_smooth: usize,
        d_smooth: usize,
    },
    WilliamsR(usize),
    Roc(usize),
    UltimateOscillator {
        short: usize,
        medium: usize,
        long: usize,
    },
    Trix(usize),
    Cmo(usize),
    DeMarker(usize),
    Fisher(usize),
    Stc {
        cycle: usize,
        fast: usize,
        slow: usize,
    },
    Kst,
    Bollinger {
        period: usize,
        stddev_mult_x100: u32,
    },
    Keltner {
        period: usize,
        atr_period: usize,
        mult_x100: u32,
    },
    Donchian(usize),
    Envelope {
        period: usize,
        pct_x100: u32,
    },
    Atr(usize),
    Natr(usize),
    VolatilityStop {
        period: usize,
        mult_x100: u32,
    },
    HistoricalVolatility(usize),
    ChaikinVolatility {
        period: usize,
        roc_period: usize,
    },
    Choppiness(usize),
    Vhf(usize),
    Stddev(usize),
    Obv,
    Vpt,
    Mfi(usize),
    AdLine,
    ChaikinOscillator {
        fast: usize,
        slow: usize,
    },
    Vwap,
    Klinger {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    ForceIndex(usize),
    EaseOfMovement(usize),
}

#[derive(Debug, Clone, Serialize)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub source_len: usize,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorValue {
    pub fn shape(&self) -> ValueShape {
        match self {
            IndicatorValue::Simple(_) => ValueShape::Simple,
            IndicatorValue::Macd { .. } => ValueShape::Macd,
            IndicatorValue::Stochastic { .. } => ValueShape::Stochastic,
            IndicatorValue::Bollinger { .. } => ValueShape::Bollinger,
            IndicatorValue::Channel { .. } => ValueShape::Channel,
            IndicatorValue::Directional { .. } => ValueShape::Directional,
            IndicatorValue::Aroon { .. } => ValueShape::Aroon,
            IndicatorValue::Trend { .. } => ValueShape::Trend,
            IndicatorValue::Regression { .. } => ValueShape::Regression,
            IndicatorValue::Ichimoku { .. } => ValueShape::Ichimoku,
            IndicatorValue::Pivot { .. } => ValueShape::Pivot,
            IndicatorValue::WithSignal { .. } => ValueShape::WithSignal,
        }
    }

    /// Read one field. Boolean fields read as 1.0 / 0.0 (`Direction` as 1.0 / -1.0).
    pub fn field(&self, field: IndicatorField) -> Option<f64> {
        use IndicatorField as F;
        let v = match (*self, field) {
            (IndicatorValue::Simple(v), F::Value) => v,

            (IndicatorValue::Macd { line, .. }, F::Value) => line,
            (IndicatorValue::Macd { signal, .. }, F::Signal) => signal,
            (IndicatorValue::Macd { histogram, .. }, F::Histogram) => histogram,

            (IndicatorValue::Stochastic { k, .. }, F::Value | F::K) => k,
            (IndicatorValue::Stochastic { d, .. }, F::D | F::Signal) => d,

            (IndicatorValue::Bollinger { upper, .. }, F::Upper) => upper,
            (IndicatorValue::Bollinger { middle, .. }, F::Value | F::Middle) => middle,
            (IndicatorValue::Bollinger { lower, .. }, F::Lower) => lower,
            (IndicatorValue::Bollinger { bandwidth, .. }, F::Bandwidth) => bandwidth,
            (IndicatorValue::Bollinger { percent_b, .. }, F::PercentB) => percent_b,
            (IndicatorValue::Bollinger { squeeze, .. }, F::Squeeze) => bool_value(squeeze),

            (IndicatorValue::Channel { upper, .. }, F::Upper) => upper,
            (IndicatorValue::Channel { middle, .. }, F::Value | F::Middle) => middle,
            (IndicatorValue::Channel { lower, .. }, F::Lower) => lower,

            (IndicatorValue::Directional { adx, .. }, F::Value) => adx,
            (IndicatorValue::Directional { plus_di, .. }, F::PlusDi) => plus_di,
            (IndicatorValue::Directional { minus_di, .. }, F::MinusDi) => minus_di,

            (IndicatorValue::Aroon { oscillator, .. }, F::Value) => oscillator,
            (IndicatorValue::Aroon { up, .. }, F::Up) => up,
            (IndicatorValue::Aroon { down, .. }, F::Down) => down,

            (IndicatorValue::Trend { value, .. }, F::Value) => value,
            (IndicatorValue::Trend { uptrend, .. }, F::Direction) => {
                if uptrend {
                    1.0
                } else {
                    -1.0
                }
            }

            (IndicatorValue::Regression { value, .. }, F::Value) => value,
            (IndicatorValue::Regression { slope, .. }, F::Slope) => slope,
            (IndicatorValue::Regression { r_squared, .. }, F::RSquared) => r_squared,

            (IndicatorValue::Ichimoku { tenkan, .. }, F::Value | F::Tenkan) => tenkan,
            (IndicatorValue::Ichimoku { kijun, .. }, F::Kijun) => kijun,
            (IndicatorValue::Ichimoku { span_a, .. }, F::SpanA) => span_a,
            (IndicatorValue::Ichimoku { span_b, .. }, F::SpanB) => span_b,

            (IndicatorValue::Pivot { pivot, .. }, F::Value) => pivot,
            (IndicatorValue::Pivot { r1, .. }, F::R1) => r1,
            (IndicatorValue::Pivot { r2, .. }, F::R2) => r2,
            (IndicatorValue::Pivot { r3, .. }, F::R3) => r3,
            (IndicatorValue::Pivot { s1, .. }, F::S1) => s1,
            (IndicatorValue::Pivot { s2, .. }, F::S2) => s2,
            (IndicatorValue::Pivot { s3, .. }, F::S3) => s3,

            (IndicatorValue::WithSignal { value, .. }, F::Value) => value,
            (IndicatorValue::WithSignal { signal, .. }, F::Signal) => signal,

            _ => return None,
        };
        Some(v)
    }

    /// The default (`Value`) field. Every shape supports it.
    pub fn primary(&self) -> f64 {
        self.field(IndicatorField::Value).unwrap_or(f64::NAN)
    }
}

fn bool_value(flag: bool) -> f64 {
    if flag { 1.0 } else { 0.0 }
}

impl ValueShape {
    pub fn fields(&self) -> &'static [IndicatorField] {
        use IndicatorField as F;
        match self {
            ValueShape::Simple => &[F::Value],
            ValueShape::Macd => &[F::Value, F::Signal, F::Histogram],
            ValueShape::Stochastic => &[F::Value, F::K, F::D, F::Signal],
            ValueShape::Bollinger => &[
                F::Value,
                F::Upper,
                F::Middle,
                F::Lower,
                F::Bandwidth,
                F::PercentB,
                F::Squeeze,
            ],
            ValueShape::Channel => &[F::Value, F::Upper, F::Middle, F::Lower],
            ValueShape::Directional => &[F::Value, F::PlusDi, F::MinusDi],
            ValueShape::Aroon => &[F::Value, F::Up, F::Down],
            ValueShape::Trend => &[F::Value, F::Direction],
            ValueShape::Regression => &[F::Value, F::Slope, F::RSquared],
            ValueShape::Ichimoku => &[F::Value, F::Tenkan, F::Kijun, F::SpanA, F::SpanB],
            ValueShape::Pivot => &[F::Value, F::R1, F::R2, F::R3, F::S1, F::S2, F::S3],
            ValueShape::WithSignal => &[F::Value, F::Signal],
        }
    }

    pub fn supports(&self, field: IndicatorField) -> bool {
        self.fields().contains(&field)
    }
}

impl IndicatorField {
    /// Parse a field name as written after the dot in `MACD(12,26,9).signal`.
    pub fn from_name(name: &str) -> Option<Self> {
        let field = match name.to_ascii_lowercase().as_str() {
            "value" | "line" | "adx" | "oscillator" | "pivot" | "fisher" | "kst" | "kvo" => {
                IndicatorField::Value
            }
            "signal" | "trigger" => IndicatorField::Signal,
            "histogram" | "hist" => IndicatorField::Histogram,
            "k" => IndicatorField::K,
            "d" => IndicatorField::D,
            "upper" => IndicatorField::Upper,
            "middle" => IndicatorField::Middle,
            "lower" => IndicatorField::Lower,
            "bandwidth" => IndicatorField::Bandwidth,
            "percent_b" | "pct_b" => IndicatorField::PercentB,
            "squeeze" => IndicatorField::Squeeze,
            "plus_di" => IndicatorField::PlusDi,
            "minus_di" => IndicatorField::MinusDi,
            "up" => IndicatorField::Up,
            "down" => IndicatorField::Down,
            "direction" => IndicatorField::Direction,
            "slope" => IndicatorField::Slope,
            "r_squared" | "rsq" => IndicatorField::RSquared,
            "tenkan" => IndicatorField::Tenkan,
            "kijun" => IndicatorField::Kijun,
            "span_a" => IndicatorField::SpanA,
            "span_b" => IndicatorField::SpanB,
            "r1" => IndicatorField::R1,
            "r2" => IndicatorField::R2,
            "r3" => IndicatorField::R3,
            "s1" => IndicatorField::S1,
            "s2" => IndicatorField::S2,
            "s3" => IndicatorField::S3,
            _ => return None,
        };
        Some(field)
    }

    pub fn name(&self) -> &'static str {
        match self {
            IndicatorField::Value => "value",
            IndicatorField::Signal => "signal",
            IndicatorField::Histogram => "histogram",
            IndicatorField::K => "k",
            IndicatorField::D => "d",
            IndicatorField::Upper => "upper",
            IndicatorField::Middle => "middle",
            IndicatorField::Lower => "lower",
            IndicatorField::Bandwidth => "bandwidth",
            IndicatorField::PercentB => "percent_b",
            IndicatorField::Squeeze => "squeeze",
            IndicatorField::PlusDi => "plus_di",
            IndicatorField::MinusDi => "minus_di",
            IndicatorField::Up => "up",
            IndicatorField::Down => "down",
            IndicatorField::Direction => "direction",
            IndicatorField::Slope => "slope",
            IndicatorField::RSquared => "r_squared",
            IndicatorField::Tenkan => "tenkan",
            IndicatorField::Kijun => "kijun",
            IndicatorField::SpanA => "span_a",
            IndicatorField::SpanB => "span_b",
            IndicatorField::R1 => "r1",
            IndicatorField::R2 => "r2",
            IndicatorField::R3 => "r3",
            IndicatorField::S1 => "s1",
            IndicatorField::S2 => "s2",
            IndicatorField::S3 => "s3",
        }
    }
}

impl IndicatorType {
    pub fn shape(&self) -> ValueShape {
        match self {
            IndicatorType::Macd { .. } => ValueShape::Macd,
            IndicatorType::Stochastic { .. } | IndicatorType::StochRsi { .. } => {
                ValueShape::Stochastic
            }
            IndicatorType::Bollinger { .. } => ValueShape::Bollinger,
            IndicatorType::Keltner { .. }
            | IndicatorType::Donchian(_)
            | IndicatorType::Envelope { .. } => ValueShape::Channel,
            IndicatorType::Adx(_) => ValueShape::Directional,
            IndicatorType::Aroon(_) => ValueShape::Aroon,
            IndicatorType::Psar { .. }
            | IndicatorType::SuperTrend { .. }
            | IndicatorType::VolatilityStop { .. } => ValueShape::Trend,
            IndicatorType::LinearRegression(_) | IndicatorType::PolynomialRegression { .. } => {
                ValueShape::Regression
            }
            IndicatorType::Ichimoku { .. } => ValueShape::Ichimoku,
            IndicatorType::Pivot => ValueShape::Pivot,
            IndicatorType::Fisher(_) | IndicatorType::Kst | IndicatorType::Klinger { .. } => {
                ValueShape::WithSignal
            }
            _ => ValueShape::Simple,
        }
    }

    /// Every period-like parameter must be positive.
    pub fn validate(&self) -> Result<(), String> {
        let periods: Vec<usize> = match self {
            IndicatorType::Sma(p)
            | IndicatorType::Ema(p)
            | IndicatorType::Wma(p)
            | IndicatorType::Hma(p)
            | IndicatorType::Dema(p)
            | IndicatorType::Tema(p)
            | IndicatorType::Vwma(p)
            | IndicatorType::Adx(p)
            | IndicatorType::Aroon(p)
            | IndicatorType::LinearRegression(p)
            | IndicatorType::Rsi(p)
            | IndicatorType::WilliamsR(p)
            | IndicatorType::Roc(p)
            | IndicatorType::Trix(p)
            | IndicatorType::Cmo(p)
            | IndicatorType::DeMarker(p)
            | IndicatorType::Fisher(p)
            | IndicatorType::Donchian(p)
            | IndicatorType::Atr(p)
            | IndicatorType::Natr(p)
            | IndicatorType::HistoricalVolatility(p)
            | IndicatorType::Choppiness(p)
            | IndicatorType::Vhf(p)
            | IndicatorType::Stddev(p)
            | IndicatorType::Mfi(p)
            | IndicatorType::ForceIndex(p)
            | IndicatorType::EaseOfMovement(p) => vec![*p],
            IndicatorType::Macd { fast, slow, signal } => {
                if fast >= slow {
                    return Err(format!("{}: fast period must be below slow period", self));
                }
                vec![*fast, *slow, *signal]
            }
            IndicatorType::Psar {
                step_x1000,
                max_x1000,
            } => {
                if *step_x1000 == 0 || step_x1000 > max_x1000 {
                    return Err(format!("{}: step must be positive and at most max", self));
                }
                vec![]
            }
            IndicatorType::SuperTrend { period, .. }
            | IndicatorType::Bollinger { period, .. }
            | IndicatorType::Envelope { period, .. }
            | IndicatorType::VolatilityStop { period, .. } => vec![*period],
            IndicatorType::PolynomialRegression { period, degree } => {
                if *degree == 0 || *degree > 5 {
                    return Err(format!("{}: degree must be between 1 and 5", self));
                }
                vec![*period]
            }
            IndicatorType::Ichimoku {
                tenkan,
                kijun,
                senkou,
            } => vec![*tenkan, *kijun, *senkou],
            IndicatorType::Stochastic {
                k_period,
                d_period,
                smooth,
            } => vec![*k_period, *d_period, *smooth],
            IndicatorType::StochRsi {
                rsi_period,
                stoch_period,
                k_smooth,
                d_smooth,
            } => vec![*rsi_period, *stoch_period, *k_smooth, *d_smooth],
            IndicatorType::UltimateOscillator {
                short,
                medium,
                long,
            } => vec![*short, *medium, *long],
            IndicatorType::Stc { cycle, fast, slow } => {
                if fast >= slow {
                    return Err(format!("{}: fast period must be below slow period", self));
                }
                vec![*cycle, *fast, *slow]
            }
            IndicatorType::Keltner {
                period, atr_period, ..
            } => vec![*period, *atr_period],
            IndicatorType::ChaikinVolatility { period, roc_period } => vec![*period, *roc_period],
            IndicatorType::ChaikinOscillator { fast, slow } => {
                if fast >= slow {
                    return Err(format!("{}: fast period must be below slow period", self));
                }
                vec![*fast, *slow]
            }
            IndicatorType::Klinger { fast, slow, signal } => {
                if fast >= slow {
                    return Err(format!("{}: fast period must be below slow period", self));
                }
                vec![*fast, *slow, *signal]
            }
            IndicatorType::Pivot
            | IndicatorType::Kst
            | IndicatorType::Obv
            | IndicatorType::Vpt
            | IndicatorType::AdLine
            | IndicatorType::Vwap => vec![],
        };

        if periods.contains(&0) {
            return Err(format!("{}: periods must be positive", self));
        }
        Ok(())
    }

    /// Build an indicator from its DSL name and numeric arguments.
    ///
    /// Missing trailing arguments take the indicator's conventional defaults.
    pub fn from_parts(name: &str, args: &[f64]) -> Result<Self, String> {
        let upper = name.to_ascii_uppercase();
        let a = Args {
            name: &upper,
            args,
        };

        let indicator = match upper.as_str() {
            "SMA" => IndicatorType::Sma(a.period(0, 20)?),
            "EMA" => IndicatorType::Ema(a.period(0, 20)?),
            "WMA" => IndicatorType::Wma(a.period(0, 20)?),
            "HMA" => IndicatorType::Hma(a.period(0, 20)?),
            "DEMA" => IndicatorType::Dema(a.period(0, 20)?),
            "TEMA" => IndicatorType::Tema(a.period(0, 20)?),
            "VWMA" => IndicatorType::Vwma(a.period(0, 20)?),
            "MACD" => IndicatorType::Macd {
                fast: a.period(0, 12)?,
                slow: a.period(1, 26)?,
                signal: a.period(2, 9)?,
            },
            "ADX" | "DMI" => IndicatorType::Adx(a.period(0, 14)?),
            "AROON" => IndicatorType::Aroon(a.period(0, 25)?),
            "PSAR" => IndicatorType::Psar {
                step_x1000: a.scaled(0, 0.02, 1000.0)?,
                max_x1000: a.scaled(1, 0.2, 1000.0)?,
            },
            "SUPERTREND" => IndicatorType::SuperTrend {
                period: a.period(0, 10)?,
                mult_x100: a.scaled(1, 3.0, 100.0)?,
            },
            "LINREG" => IndicatorType::LinearRegression(a.period(0, 14)?),
            "POLYREG" => IndicatorType::PolynomialRegression {
                period: a.period(0, 20)?,
                degree: a.period(1, 2)?,
            },
            "ICHIMOKU" => IndicatorType::Ichimoku {
                tenkan: a.period(0, 9)?,
                kijun: a.period(1, 26)?,
                senkou: a.period(2, 52)?,
            },
            "PIVOT" => IndicatorType::Pivot,
            "RSI" => IndicatorType::Rsi(a.period(0, 14)?),
            "STOCHASTIC" | "STOCH" => IndicatorType::Stochastic {
                k_period: a.period(0, 14)?,
                d_period: a.period(1, 3)?,
                smooth: a.period(2, 1)?,
            },
            "STOCHRSI" => IndicatorType::StochRsi {
                rsi_period: a.period(0, 14)?,
                stoch_period: a.period(1, 14)?,
                k_smooth: a.period(2, 3)?,
                d_smooth: a.period(3, 3)?,
            },
            "WILLR" => IndicatorType::WilliamsR(a.period(0, 14)?),
            "ROC" => IndicatorType::Roc(a.period(0, 12)?),
            "ULTOSC" => IndicatorType::UltimateOscillator {
                short: a.period(0, 7)?,
                medium: a.period(1, 14)?,
                long: a.period(2, 28)?,
            },
            "TRIX" => IndicatorType::Trix(a.period(0, 15)?),
            "CMO" => IndicatorType::Cmo(a.period(0, 14)?),
            "DEMARKER" => IndicatorType::DeMarker(a.period(0, 14)?),
            "FISHER" => IndicatorType::Fisher(a.period(0, 10)?),
            "STC" => IndicatorType::Stc {
                cycle: a.period(0, 10)?,
                fast: a.period(1, 23)?,
                slow: a.period(2, 50)?,
            },
            "KST" => IndicatorType::Kst,
            "BOLLINGER" | "BB" => IndicatorType::Bollinger {
                period: a.period(0, 20)?,
                stddev_mult_x100: a.scaled(1, 2.0, 100.0)?,
            },
            "KELTNER" => IndicatorType::Keltner {
                period: a.period(0, 20)?,
                atr_period: a.period(1, 10)?,
                mult_x100: a.scaled(2, 2.0, 100.0)?,
            },
            "DONCHIAN" => IndicatorType::Donchian(a.period(0, 20)?),
            "ENVELOPE" => IndicatorType::Envelope {
                period: a.period(0, 20)?,
                pct_x100: a.scaled(1, 2.5, 100.0)?,
            },
            "ATR" => IndicatorType::Atr(a.period(0, 14)?),
            "NATR" => IndicatorType::Natr(a.period(0, 14)?),
            "VOLSTOP" => IndicatorType::VolatilityStop {
                period: a.period(0, 20)?,
                mult_x100: a.scaled(1, 2.0, 100.0)?,
            },
            "HV" => IndicatorType::HistoricalVolatility(a.period(0, 20)?),
            "CHAIKINVOL" => IndicatorType::ChaikinVolatility {
                period: a.period(0, 10)?,
                roc_period: a.period(1, 10)?,
            },
            "CHOP" => IndicatorType::Choppiness(a.period(0, 14)?),
            "VHF" => IndicatorType::Vhf(a.period(0, 28)?),
            "STDDEV" => IndicatorType::Stddev(a.period(0, 20)?),
            "OBV" => IndicatorType::Obv,
            "VPT" => IndicatorType::Vpt,
            "MFI" => IndicatorType::Mfi(a.period(0, 14)?),
            "AD" => IndicatorType::AdLine,
            "CHAIKINOSC" => IndicatorType::ChaikinOscillator {
                fast: a.period(0, 3)?,
                slow: a.period(1, 10)?,
            },
            "VWAP" => IndicatorType::Vwap,
            "KLINGER" => IndicatorType::Klinger {
                fast: a.period(0, 34)?,
                slow: a.period(1, 55)?,
                signal: a.period(2, 13)?,
            },
            "FORCE" => IndicatorType::ForceIndex(a.period(0, 13)?),
            "EOM" => IndicatorType::EaseOfMovement(a.period(0, 14)?),
            _ => return Err(format!("unknown indicator '{}'", name)),
        };

        let expected = indicator.arity();
        if args.len() > expected {
            return Err(format!(
                "{} takes at most {} argument(s), got {}",
                upper,
                expected,
                args.len()
            ));
        }

        indicator.validate()?;
        Ok(indicator)
    }

    fn arity(&self) -> usize {
        match self {
            IndicatorType::Pivot
            | IndicatorType::Kst
            | IndicatorType::Obv
            | IndicatorType::Vpt
            | IndicatorType::AdLine
            | IndicatorType::Vwap => 0,
            IndicatorType::Psar { .. }
            | IndicatorType::SuperTrend { .. }
            | IndicatorType::PolynomialRegression { .. }
            | IndicatorType::Bollinger { .. }
            | IndicatorType::Envelope { .. }
            | IndicatorType::VolatilityStop { .. }
            | IndicatorType::ChaikinVolatility { .. }
            | IndicatorType::ChaikinOscillator { .. } => 2,
            IndicatorType::Macd { .. }
            | IndicatorType::Ichimoku { .. }
            | IndicatorType::Stochastic { .. }
            | IndicatorType::UltimateOscillator { .. }
            | IndicatorType::Stc { .. }
            | IndicatorType::Keltner { .. }
            | IndicatorType::Klinger { .. } => 3,
            IndicatorType::StochRsi { .. } => 4,
            _ => 1,
        }
    }
}

struct Args<'a> {
    name: &'a str,
    args: &'a [f64],
}

impl Args<'_> {
    fn period(&self, idx: usize, default: usize) -> Result<usize, String> {
        match self.args.get(idx) {
            None => Ok(default),
            Some(&v) if v >= 0.0 && v.fract() == 0.0 => Ok(v as usize),
            Some(&v) => Err(format!(
                "{}: argument {} must be a non-negative integer, got {}",
                self.name,
                idx + 1,
                v
            )),
        }
    }

    fn scaled(&self, idx: usize, default: f64, scale: f64) -> Result<u32, String> {
        let v = self.args.get(idx).copied().unwrap_or(default);
        if !v.is_finite() || v < 0.0 {
            return Err(format!(
                "{}: argument {} must be a non-negative number, got {}",
                self.name,
                idx + 1,
                v
            ));
        }
        Ok((v * scale).round() as u32)
    }
}

impl IndicatorSeries {
    pub fn empty(indicator_type: IndicatorType, source_len: usize) -> Self {
        IndicatorSeries {
            indicator_type,
            source_len,
            values: Vec::new(),
        }
    }

    /// Attach `values` to the last `values.len()` bars.
    pub fn from_tail(
        indicator_type: IndicatorType,
        bars: &[Bar],
        values: Vec<IndicatorValue>,
    ) -> Self {
        debug_assert!(values.len() <= bars.len());
        let offset = bars.len().saturating_sub(values.len());
        let values = bars[offset..]
            .iter()
            .zip(values)
            .map(|(bar, value)| IndicatorPoint {
                time: bar.time,
                value,
            })
            .collect();
        IndicatorSeries {
            indicator_type,
            source_len: bars.len(),
            values,
        }
    }

    pub fn from_simple_tail(indicator_type: IndicatorType, bars: &[Bar], values: Vec<f64>) -> Self {
        Self::from_tail(
            indicator_type,
            bars,
            values.into_iter().map(IndicatorValue::Simple).collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of leading bars without a value.
    pub fn offset(&self) -> usize {
        self.source_len.saturating_sub(self.values.len())
    }

    pub fn point_at(&self, bar_index: usize) -> Option<&IndicatorPoint> {
        if bar_index >= self.source_len {
            return None;
        }
        bar_index
            .checked_sub(self.offset())
            .and_then(|j| self.values.get(j))
    }

    pub fn value_at(&self, bar_index: usize, field: IndicatorField) -> Option<f64> {
        self.point_at(bar_index)?.value.field(field)
    }

    pub fn latest(&self) -> Option<&IndicatorPoint> {
        self.values.last()
    }

    /// The `Value` field of every point, in order.
    pub fn primary_values(&self) -> Vec<f64> {
        self.values.iter().map(|p| p.value.primary()).collect()
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Sma(period) => write!(f, "SMA({})", period),
            IndicatorType::Ema(period) => write!(f, "EMA({})", period),
            IndicatorType::Wma(period) => write!(f, "WMA({})", period),
            IndicatorType::Hma(period) => write!(f, "HMA({})", period),
            IndicatorType::Dema(period) => write!(f, "DEMA({})", period),
            IndicatorType::Tema(period) => write!(f, "TEMA({})", period),
            IndicatorType::Vwma(period) => write!(f, "VWMA({})", period),
            IndicatorType::Macd { fast, slow, signal } => {
                write!(f, "MACD({},{},{})", fast, slow, signal)
            }
            IndicatorType::Adx(period) => write!(f, "ADX({})", period),
            IndicatorType::Aroon(period) => write!(f, "AROON({})", period),
            IndicatorType::Psar {
                step_x1000,
                max_x1000,
            } => write!(
                f,
                "PSAR({},{})",
                *step_x1000 as f64 / 1000.0,
                *max_x1000 as f64 / 1000.0
            ),
            IndicatorType::SuperTrend { period, mult_x100 } => {
                write!(f, "SUPERTREND({},{})", period, *mult_x100 as f64 / 100.0)
            }
            IndicatorType::LinearRegression(period) => write!(f, "LINREG({})", period),
            IndicatorType::PolynomialRegression { period, degree } => {
                write!(f, "POLYREG({},{})", period, degree)
            }
            IndicatorType::Ichimoku {
                tenkan,
                kijun,
                senkou,
            } => write!(f, "ICHIMOKU({},{},{})", tenkan, kijun, senkou),
            IndicatorType::Pivot => write!(f, "PIVOT"),
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::Stochastic {
                k_period,
                d_period,
                smooth,
            } => write!(f, "STOCHASTIC({},{},{})", k_period, d_period, smooth),
            IndicatorType::StochRsi {
                rsi_period,
                stoch_period,
                k_smooth,
                d_smooth,
            } => write!(
                f,
                "STOCHRSI({},{},{},{})",
                rsi_period, stoch_period, k_smooth, d_smooth
            ),
            IndicatorType::WilliamsR(period) => write!(f, "WILLR({})", period),
            IndicatorType::Roc(period) => write!(f, "ROC({})", period),
            IndicatorType::UltimateOscillator {
                short,
                medium,
                long,
            } => write!(f, "ULTOSC({},{},{})", short, medium, long),
            IndicatorType::Trix(period) => write!(f, "TRIX({})", period),
            IndicatorType::Cmo(period) => write!(f, "CMO({})", period),
            IndicatorType::DeMarker(period) => write!(f, "DEMARKER({})", period),
            IndicatorType::Fisher(period) => write!(f, "FISHER({})", period),
            IndicatorType::Stc { cycle, fast, slow } => {
                write!(f, "STC({},{},{})", cycle, fast, slow)
            }
            IndicatorType::Kst => write!(f, "KST"),
            IndicatorType::Bollinger {
                period,
                stddev_mult_x100,
            } => {
                let mult = *stddev_mult_x100 as f64 / 100.0;
                write!(f, "BOLLINGER({},{})", period, mult)
            }
            IndicatorType::Keltner {
                period,
                atr_period,
                mult_x100,
            } => write!(
                f,
                "KELTNER({},{},{})",
                period,
                atr_period,
                *mult_x100 as f64 / 100.0
            ),
            IndicatorType::Donchian(period) => write!(f, "DONCHIAN({})", period),
            IndicatorType::Envelope { period, pct_x100 } => {
                write!(f, "ENVELOPE({},{})", period, *pct_x100 as f64 / 100.0)
            }
            IndicatorType::Atr(period) => write!(f, "ATR({})", period),
            IndicatorType::Natr(period) => write!(f, "NATR({})", period),
            IndicatorType::VolatilityStop { period, mult_x100 } => {
                write!(f, "VOLSTOP({},{})", period, *mult_x100 as f64 / 100.0)
            }
            IndicatorType::HistoricalVolatility(period) => write!(f, "HV({})", period),
            IndicatorType::ChaikinVolatility { period, roc_period } => {
                write!(f, "CHAIKINVOL({},{})", period, roc_period)
            }
            IndicatorType::Choppiness(period) => write!(f, "CHOP({})", period),
            IndicatorType::Vhf(period) => write!(f, "VHF({})", period),
            IndicatorType::Stddev(period) => write!(f, "STDDEV({})", period),
            IndicatorType::Obv => write!(f, "OBV"),
            IndicatorType::Vpt => write!(f, "VPT"),
            IndicatorType::Mfi(period) => write!(f, "MFI({})", period),
            IndicatorType::AdLine => write!(f, "AD"),
            IndicatorType::ChaikinOscillator { fast, slow } => {
                write!(f, "CHAIKINOSC({},{})", fast, slow)
            }
            IndicatorType::Vwap => write!(f, "VWAP"),
            IndicatorType::Klinger { fast, slow, signal } => {
                write!(f, "KLINGER({},{},{})", fast, slow, signal)
            }
            IndicatorType::ForceIndex(period) => write!(f, "FORCE({})", period),
            IndicatorType::EaseOfMovement(period) => write!(f, "EOM({})", period),
        }
    }
}
