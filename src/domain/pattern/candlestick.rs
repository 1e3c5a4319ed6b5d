//! Candlestick pattern recognition.
//!
//! Single-, two- and three-candle predicates are evaluated over a sliding
//! three-bar window starting at index 2. Only bars where something fires are
//! reported.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

use super::PatternBias;
use crate::domain::ohlcv::Bar;

pub const DEFAULT_DOJI_THRESHOLD: f64 = 0.1;
/// Dominance factor between bullish and bearish scores in `get_pattern_signal`.
pub const DOMINANCE_RATIO: f64 = 1.5;
/// A dominant score above this is reported as strong.
pub const STRONG_SCORE: u32 = 5;

const TWEEZER_TOLERANCE: f64 = 0.002;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandlestickPattern {
    Doji,
    DragonflyDoji,
    GravestoneDoji,
    Hammer,
    InvertedHammer,
    HangingMan,
    ShootingStar,
    SpinningTop,
    BullishMarubozu,
    BearishMarubozu,
    BullishEngulfing,
    BearishEngulfing,
    PiercingLine,
    DarkCloudCover,
    BullishHarami,
    BearishHarami,
    TweezerTop,
    TweezerBottom,
    MorningStar,
    EveningStar,
    ThreeWhiteSoldiers,
    ThreeBlackCrows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternStrength {
    Weak = 1,
    Moderate = 2,
    Strong = 3,
    VeryStrong = 4,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternMatch {
    pub pattern: CandlestickPattern,
    pub bias: PatternBias,
    pub strength: PatternStrength,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternDetection {
    pub index: usize,
    pub time: NaiveDateTime,
    pub patterns: Vec<PatternMatch>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternSignalKind {
    StrongBullish,
    Bullish,
    Neutral,
    Bearish,
    StrongBearish,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternSignal {
    pub signal: PatternSignalKind,
    pub bullish_score: u32,
    pub bearish_score: u32,
}

const ALL_PATTERNS: [CandlestickPattern; 22] = [
    CandlestickPattern::Doji,
    CandlestickPattern::DragonflyDoji,
    CandlestickPattern::GravestoneDoji,
    CandlestickPattern::Hammer,
    CandlestickPattern::InvertedHammer,
    CandlestickPattern::HangingMan,
    CandlestickPattern::ShootingStar,
    CandlestickPattern::SpinningTop,
    CandlestickPattern::BullishMarubozu,
    CandlestickPattern::BearishMarubozu,
    CandlestickPattern::BullishEngulfing,
    CandlestickPattern::BearishEngulfing,
    CandlestickPattern::PiercingLine,
    CandlestickPattern::DarkCloudCover,
    CandlestickPattern::BullishHarami,
    CandlestickPattern::BearishHarami,
    CandlestickPattern::TweezerTop,
    CandlestickPattern::TweezerBottom,
    CandlestickPattern::MorningStar,
    CandlestickPattern::EveningStar,
    CandlestickPattern::ThreeWhiteSoldiers,
    CandlestickPattern::ThreeBlackCrows,
];

impl CandlestickPattern {
    pub fn all() -> &'static [CandlestickPattern] {
        &ALL_PATTERNS
    }

    pub fn name(&self) -> &'static str {
        match self {
            CandlestickPattern::Doji => "doji",
            CandlestickPattern::DragonflyDoji => "dragonfly_doji",
            CandlestickPattern::GravestoneDoji => "gravestone_doji",
            CandlestickPattern::Hammer => "hammer",
            CandlestickPattern::InvertedHammer => "inverted_hammer",
            CandlestickPattern::HangingMan => "hanging_man",
            CandlestickPattern::ShootingStar => "shooting_star",
            CandlestickPattern::SpinningTop => "spinning_top",
            CandlestickPattern::BullishMarubozu => "bullish_marubozu",
            CandlestickPattern::BearishMarubozu => "bearish_marubozu",
            CandlestickPattern::BullishEngulfing => "bullish_engulfing",
            CandlestickPattern::BearishEngulfing => "bearish_engulfing",
            CandlestickPattern::PiercingLine => "piercing_line",
            CandlestickPattern::DarkCloudCover => "dark_cloud_cover",
            CandlestickPattern::BullishHarami => "bullish_harami",
            CandlestickPattern::BearishHarami => "bearish_harami",
            CandlestickPattern::TweezerTop => "tweezer_top",
            CandlestickPattern::TweezerBottom => "tweezer_bottom",
            CandlestickPattern::MorningStar => "morning_star",
            CandlestickPattern::EveningStar => "evening_star",
            CandlestickPattern::ThreeWhiteSoldiers => "three_white_soldiers",
            CandlestickPattern::ThreeBlackCrows => "three_black_crows",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        ALL_PATTERNS.iter().copied().find(|p| p.name() == lower)
    }

    pub fn bias(&self) -> PatternBias {
        match self {
            CandlestickPattern::Doji | CandlestickPattern::SpinningTop => PatternBias::Neutral,
            CandlestickPattern::DragonflyDoji
            | CandlestickPattern::Hammer
            | CandlestickPattern::InvertedHammer
            | CandlestickPattern::BullishMarubozu
            | CandlestickPattern::BullishEngulfing
            | CandlestickPattern::PiercingLine
            | CandlestickPattern::BullishHarami
            | CandlestickPattern::TweezerBottom
            | CandlestickPattern::MorningStar
            | CandlestickPattern::ThreeWhiteSoldiers => PatternBias::Bullish,
            CandlestickPattern::GravestoneDoji
            | CandlestickPattern::HangingMan
            | CandlestickPattern::ShootingStar
            | CandlestickPattern::BearishMarubozu
            | CandlestickPattern::BearishEngulfing
            | CandlestickPattern::DarkCloudCover
            | CandlestickPattern::BearishHarami
            | CandlestickPattern::TweezerTop
            | CandlestickPattern::EveningStar
            | CandlestickPattern::ThreeBlackCrows => PatternBias::Bearish,
        }
    }

    pub fn strength(&self) -> PatternStrength {
        match self {
            CandlestickPattern::Doji
            | CandlestickPattern::InvertedHammer
            | CandlestickPattern::SpinningTop
            | CandlestickPattern::BullishHarami
            | CandlestickPattern::BearishHarami
            | CandlestickPattern::TweezerTop
            | CandlestickPattern::TweezerBottom => PatternStrength::Weak,
            CandlestickPattern::DragonflyDoji
            | CandlestickPattern::GravestoneDoji
            | CandlestickPattern::Hammer
            | CandlestickPattern::HangingMan
            | CandlestickPattern::ShootingStar
            | CandlestickPattern::BullishMarubozu
            | CandlestickPattern::BearishMarubozu
            | CandlestickPattern::PiercingLine
            | CandlestickPattern::DarkCloudCover => PatternStrength::Moderate,
            CandlestickPattern::BullishEngulfing | CandlestickPattern::BearishEngulfing => {
                PatternStrength::Strong
            }
            CandlestickPattern::MorningStar
            | CandlestickPattern::EveningStar
            | CandlestickPattern::ThreeWhiteSoldiers
            | CandlestickPattern::ThreeBlackCrows => PatternStrength::VeryStrong,
        }
    }
}

impl fmt::Display for CandlestickPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// --- single candle ---

pub fn is_doji(bar: &Bar, threshold: f64) -> bool {
    let range = bar.range();
    range > 0.0 && bar.body() / range <= threshold
}

pub fn is_dragonfly_doji(bar: &Bar, threshold: f64) -> bool {
    let range = bar.range();
    is_doji(bar, threshold)
        && bar.upper_shadow() <= 0.1 * range
        && bar.lower_shadow() >= 0.6 * range
}

pub fn is_gravestone_doji(bar: &Bar, threshold: f64) -> bool {
    let range = bar.range();
    is_doji(bar, threshold)
        && bar.lower_shadow() <= 0.1 * range
        && bar.upper_shadow() >= 0.6 * range
}

/// Small body at the top with a lower shadow at least twice the body.
fn hammer_shape(bar: &Bar) -> bool {
    let body = bar.body();
    body > 0.0 && bar.lower_shadow() >= 2.0 * body && bar.upper_shadow() <= 0.5 * body
}

/// Small body at the bottom with an upper shadow at least twice the body.
fn inverted_hammer_shape(bar: &Bar) -> bool {
    let body = bar.body();
    body > 0.0 && bar.upper_shadow() >= 2.0 * body && bar.lower_shadow() <= 0.5 * body
}

fn downtrend(before: &Bar, prev: &Bar) -> bool {
    prev.close < before.close
}

fn uptrend(before: &Bar, prev: &Bar) -> bool {
    prev.close > before.close
}

pub fn is_hammer(before: &Bar, prev: &Bar, bar: &Bar) -> bool {
    downtrend(before, prev) && hammer_shape(bar)
}

pub fn is_hanging_man(before: &Bar, prev: &Bar, bar: &Bar) -> bool {
    uptrend(before, prev) && hammer_shape(bar)
}

pub fn is_inverted_hammer(before: &Bar, prev: &Bar, bar: &Bar) -> bool {
    downtrend(before, prev) && inverted_hammer_shape(bar)
}

pub fn is_shooting_star(before: &Bar, prev: &Bar, bar: &Bar) -> bool {
    uptrend(before, prev) && inverted_hammer_shape(bar)
}

pub fn is_spinning_top(bar: &Bar, threshold: f64) -> bool {
    let range = bar.range();
    if range <= 0.0 {
        return false;
    }
    let ratio = bar.body() / range;
    ratio > threshold
        && ratio <= 0.3
        && bar.upper_shadow() > bar.body()
        && bar.lower_shadow() > bar.body()
}

fn is_marubozu(bar: &Bar) -> bool {
    let range = bar.range();
    range > 0.0 && bar.body() / range >= 0.95
}

pub fn is_bullish_marubozu(bar: &Bar) -> bool {
    is_marubozu(bar) && bar.is_bullish()
}

pub fn is_bearish_marubozu(bar: &Bar) -> bool {
    is_marubozu(bar) && bar.is_bearish()
}

// --- two candles ---

pub fn is_bullish_engulfing(prev: &Bar, bar: &Bar) -> bool {
    prev.is_bearish()
        && bar.is_bullish()
        && bar.open <= prev.close
        && bar.close >= prev.open
        && bar.body() > prev.body()
}

pub fn is_bearish_engulfing(prev: &Bar, bar: &Bar) -> bool {
    prev.is_bullish()
        && bar.is_bearish()
        && bar.open >= prev.close
        && bar.close <= prev.open
        && bar.body() > prev.body()
}

pub fn is_piercing_line(prev: &Bar, bar: &Bar) -> bool {
    let midpoint = (prev.open + prev.close) / 2.0;
    prev.is_bearish()
        && bar.is_bullish()
        && bar.open < prev.close
        && bar.close > midpoint
        && bar.close < prev.open
}

pub fn is_dark_cloud_cover(prev: &Bar, bar: &Bar) -> bool {
    let midpoint = (prev.open + prev.close) / 2.0;
    prev.is_bullish()
        && bar.is_bearish()
        && bar.open > prev.close
        && bar.close < midpoint
        && bar.close > prev.open
}

pub fn is_bullish_harami(prev: &Bar, bar: &Bar) -> bool {
    prev.is_bearish()
        && bar.is_bullish()
        && bar.open > prev.close
        && bar.close < prev.open
        && bar.body() < prev.body()
}

pub fn is_bearish_harami(prev: &Bar, bar: &Bar) -> bool {
    prev.is_bullish()
        && bar.is_bearish()
        && bar.open < prev.close
        && bar.close > prev.open
        && bar.body() < prev.body()
}

pub fn is_tweezer_top(prev: &Bar, bar: &Bar) -> bool {
    prev.is_bullish()
        && bar.is_bearish()
        && (prev.high - bar.high).abs() <= TWEEZER_TOLERANCE * bar.high.abs()
}

pub fn is_tweezer_bottom(prev: &Bar, bar: &Bar) -> bool {
    prev.is_bearish()
        && bar.is_bullish()
        && (prev.low - bar.low).abs() <= TWEEZER_TOLERANCE * bar.low.abs()
}

// --- three candles ---

fn long_body(bar: &Bar) -> bool {
    let range = bar.range();
    range > 0.0 && bar.body() >= 0.6 * range
}

pub fn is_morning_star(first: &Bar, second: &Bar, third: &Bar) -> bool {
    first.is_bearish()
        && long_body(first)
        && second.body() <= 0.3 * first.body()
        && third.is_bullish()
        && third.close > (first.open + first.close) / 2.0
}

pub fn is_evening_star(first: &Bar, second: &Bar, third: &Bar) -> bool {
    first.is_bullish()
        && long_body(first)
        && second.body() <= 0.3 * first.body()
        && third.is_bearish()
        && third.close < (first.open + first.close) / 2.0
}

pub fn is_three_white_soldiers(first: &Bar, second: &Bar, third: &Bar) -> bool {
    let advancing = |prev: &Bar, bar: &Bar| {
        bar.is_bullish()
            && bar.close > prev.close
            && bar.open > prev.open
            && bar.open < prev.close
            && bar.upper_shadow() <= 0.3 * bar.body()
    };
    first.is_bullish() && advancing(first, second) && advancing(second, third)
}

pub fn is_three_black_crows(first: &Bar, second: &Bar, third: &Bar) -> bool {
    let declining = |prev: &Bar, bar: &Bar| {
        bar.is_bearish()
            && bar.close < prev.close
            && bar.open < prev.open
            && bar.open > prev.close
            && bar.lower_shadow() <= 0.3 * bar.body()
    };
    first.is_bearish() && declining(first, second) && declining(second, third)
}

#[derive(Debug, Clone)]
pub struct CandlestickDetector {
    pub doji_threshold: f64,
}

impl Default for CandlestickDetector {
    fn default() -> Self {
        CandlestickDetector {
            doji_threshold: DEFAULT_DOJI_THRESHOLD,
        }
    }
}

impl CandlestickDetector {
    pub fn new(doji_threshold: f64) -> Self {
        CandlestickDetector { doji_threshold }
    }

    /// Patterns firing on bar `index`, which needs two bars of history.
    pub fn patterns_at(&self, bars: &[Bar], index: usize) -> Vec<CandlestickPattern> {
        if index < 2 || index >= bars.len() {
            return Vec::new();
        }
        let (a, b, c) = (&bars[index - 2], &bars[index - 1], &bars[index]);
        let t = self.doji_threshold;

        let checks = [
            (CandlestickPattern::Doji, is_doji(c, t)),
            (CandlestickPattern::DragonflyDoji, is_dragonfly_doji(c, t)),
            (CandlestickPattern::GravestoneDoji, is_gravestone_doji(c, t)),
            (CandlestickPattern::Hammer, is_hammer(a, b, c)),
            (CandlestickPattern::InvertedHammer, is_inverted_hammer(a, b, c)),
            (CandlestickPattern::HangingMan, is_hanging_man(a, b, c)),
            (CandlestickPattern::ShootingStar, is_shooting_star(a, b, c)),
            (CandlestickPattern::SpinningTop, is_spinning_top(c, t)),
            (CandlestickPattern::BullishMarubozu, is_bullish_marubozu(c)),
            (CandlestickPattern::BearishMarubozu, is_bearish_marubozu(c)),
            (CandlestickPattern::BullishEngulfing, is_bullish_engulfing(b, c)),
            (CandlestickPattern::BearishEngulfing, is_bearish_engulfing(b, c)),
            (CandlestickPattern::PiercingLine, is_piercing_line(b, c)),
            (CandlestickPattern::DarkCloudCover, is_dark_cloud_cover(b, c)),
            (CandlestickPattern::BullishHarami, is_bullish_harami(b, c)),
            (CandlestickPattern::BearishHarami, is_bearish_harami(b, c)),
            (CandlestickPattern::TweezerTop, is_tweezer_top(b, c)),
            (CandlestickPattern::TweezerBottom, is_tweezer_bottom(b, c)),
            (CandlestickPattern::MorningStar, is_morning_star(a, b, c)),
            (CandlestickPattern::EveningStar, is_evening_star(a, b, c)),
            (CandlestickPattern::ThreeWhiteSoldiers, is_three_white_soldiers(a, b, c)),
            (CandlestickPattern::ThreeBlackCrows, is_three_black_crows(a, b, c)),
        ];
        checks
            .into_iter()
            .filter_map(|(pattern, fired)| fired.then_some(pattern))
            .collect()
    }

    /// Sparse detection list over the whole input, in bar order.
    pub fn detect(&self, bars: &[Bar]) -> Vec<PatternDetection> {
        (2..bars.len())
            .filter_map(|i| {
                let patterns = self.patterns_at(bars, i);
                if patterns.is_empty() {
                    return None;
                }
                Some(PatternDetection {
                    index: i,
                    time: bars[i].time,
                    patterns: patterns
                        .into_iter()
                        .map(|pattern| PatternMatch {
                            pattern,
                            bias: pattern.bias(),
                            strength: pattern.strength(),
                        })
                        .collect(),
                })
            })
            .collect()
    }
}

impl PatternDetection {
    pub fn has(&self, pattern: CandlestickPattern) -> bool {
        self.patterns.iter().any(|m| m.pattern == pattern)
    }

    /// Bullish minus bearish strength on this bar.
    pub fn net_score(&self) -> f64 {
        self.patterns
            .iter()
            .map(|m| match m.bias {
                PatternBias::Bullish => m.strength as u32 as f64,
                PatternBias::Bearish => -(m.strength as u32 as f64),
                PatternBias::Neutral => 0.0,
            })
            .sum()
    }
}

/// Find the detection for bar `index` in a sparse, index-ordered list.
pub fn detection_at(detections: &[PatternDetection], index: usize) -> Option<&PatternDetection> {
    detections
        .binary_search_by_key(&index, |d| d.index)
        .ok()
        .map(|pos| &detections[pos])
}

/// Aggregate bullish and bearish strength into one signal. A side must exceed the
/// other by `DOMINANCE_RATIO` to win, and is strong above `STRONG_SCORE`.
pub fn get_pattern_signal(detections: &[PatternDetection]) -> PatternSignal {
    let mut bullish_score = 0u32;
    let mut bearish_score = 0u32;
    for m in detections.iter().flat_map(|d| &d.patterns) {
        match m.bias {
            PatternBias::Bullish => bullish_score += m.strength as u32,
            PatternBias::Bearish => bearish_score += m.strength as u32,
            PatternBias::Neutral => {}
        }
    }

    let bull = bullish_score as f64;
    let bear = bearish_score as f64;
    let signal = if bull > bear * DOMINANCE_RATIO {
        if bullish_score > STRONG_SCORE {
            PatternSignalKind::StrongBullish
        } else {
            PatternSignalKind::Bullish
        }
    } else if bear > bull * DOMINANCE_RATIO {
        if bearish_score > STRONG_SCORE {
            PatternSignalKind::StrongBearish
        } else {
            PatternSignalKind::Bearish
        }
    } else {
        PatternSignalKind::Neutral
    };

    PatternSignal {
        signal,
        bullish_score,
        bearish_score,
    }
}
