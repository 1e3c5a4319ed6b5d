//! Chart pattern recognition: triangles, wedges, flags and pennants,
//! head-and-shoulders, double tops/bottoms and cup-and-handle.
//!
//! Converging and channel patterns fit least-squares trend lines through
//! swing points (or through every bar of a consolidation) and require each
//! line's slope to point the expected way. Reversal patterns compare swing
//! heights against fixed tolerances.

use chrono::NaiveDateTime;
use serde::Serialize;

use super::PatternBias;
use crate::domain::indicator::series::mean;
use crate::domain::indicator::trend::linear_fit;
use crate::domain::ohlcv::Bar;

/// Shoulders of a head-and-shoulders must be within 5% of each other.
pub const SHOULDER_TOLERANCE: f64 = 0.05;
/// Peaks of a double top (troughs of a double bottom) must be within 2%.
pub const DOUBLE_TOLERANCE: f64 = 0.02;
/// Cup rims must be within 5%.
pub const RIM_TOLERANCE: f64 = 0.05;
/// A flag pole must move at least 5%.
pub const POLE_MIN_MOVE: f64 = 0.05;
/// Slopes within 0.1% of the mean price per bar count as flat.
pub const FLAT_SLOPE: f64 = 0.001;

const PEAK_ORDER: usize = 2;
const CONVERGING_WINDOW: usize = 30;
const WINDOW_STEP: usize = 5;
const POLE_LEN: usize = 10;
const FLAG_LEN: usize = 10;
const CUP_WINDOW: usize = 30;
const CUP_MIN_DEPTH: f64 = 0.1;
const CUP_MAX_DEPTH: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartPatternKind {
    AscendingTriangle,
    DescendingTriangle,
    SymmetricalTriangle,
    RisingWedge,
    FallingWedge,
    BullFlag,
    BearFlag,
    BullPennant,
    BearPennant,
    HeadAndShoulders,
    InverseHeadAndShoulders,
    DoubleTop,
    DoubleBottom,
    CupAndHandle,
}

impl ChartPatternKind {
    pub fn bias(&self) -> PatternBias {
        match self {
            ChartPatternKind::AscendingTriangle
            | ChartPatternKind::FallingWedge
            | ChartPatternKind::BullFlag
            | ChartPatternKind::BullPennant
            | ChartPatternKind::InverseHeadAndShoulders
            | ChartPatternKind::DoubleBottom
            | ChartPatternKind::CupAndHandle => PatternBias::Bullish,
            ChartPatternKind::DescendingTriangle
            | ChartPatternKind::RisingWedge
            | ChartPatternKind::BearFlag
            | ChartPatternKind::BearPennant
            | ChartPatternKind::HeadAndShoulders
            | ChartPatternKind::DoubleTop => PatternBias::Bearish,
            ChartPatternKind::SymmetricalTriangle => PatternBias::Neutral,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPattern {
    pub kind: ChartPatternKind,
    pub bias: PatternBias,
    pub start_index: usize,
    pub end_index: usize,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    /// Breakout level: resistance line, neckline or cup rim.
    pub level: f64,
    pub target: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlopeDirection {
    Rising,
    Falling,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendLine {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

impl TrendLine {
    pub fn value_at(&self, index: usize) -> f64 {
        self.intercept + self.slope * index as f64
    }
}

fn direction_of(slope: f64, flat_tolerance: f64) -> SlopeDirection {
    if slope > flat_tolerance {
        SlopeDirection::Rising
    } else if slope < -flat_tolerance {
        SlopeDirection::Falling
    } else {
        SlopeDirection::Flat
    }
}

fn fit_line(points: &[(usize, f64)]) -> Option<TrendLine> {
    if points.len() < 2 {
        return None;
    }
    let origin = points[0].0;
    let n = points.len() as f64;
    let xs: Vec<f64> = points.iter().map(|(i, _)| (i - origin) as f64).collect();
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

    let sxx: f64 = xs.iter().map(|x| (x - mean_x).powi(2)).sum();
    if sxx == 0.0 {
        return None;
    }
    let sxy: f64 = xs
        .iter()
        .zip(points)
        .map(|(x, (_, y))| (x - mean_x) * (y - mean_y))
        .sum();
    let slope = sxy / sxx;
    let local_intercept = mean_y - slope * mean_x;

    let ss_tot: f64 = points.iter().map(|(_, y)| (y - mean_y).powi(2)).sum();
    let ss_res: f64 = xs
        .iter()
        .zip(points)
        .map(|(x, (_, y))| (y - (local_intercept + slope * x)).powi(2))
        .sum();
    let r_squared = if ss_tot == 0.0 {
        1.0
    } else {
        1.0 - ss_res / ss_tot
    };

    Some(TrendLine {
        slope,
        intercept: local_intercept - slope * origin as f64,
        r_squared,
    })
}

/// Least-squares line through `(index, price)` points. Returns `None` unless the
/// slope points in `direction` (flat means within `flat_tolerance` per bar).
pub fn find_trend_line(
    points: &[(usize, f64)],
    direction: SlopeDirection,
    flat_tolerance: f64,
) -> Option<TrendLine> {
    let line = fit_line(points)?;
    (direction_of(line.slope, flat_tolerance) == direction).then_some(line)
}

/// Indices whose value is strictly greater than every neighbour within `order`.
pub fn find_peaks(values: &[f64], order: usize) -> Vec<usize> {
    find_extrema(values, order, |candidate, other| candidate > other)
}

/// Indices whose value is strictly less than every neighbour within `order`.
pub fn find_troughs(values: &[f64], order: usize) -> Vec<usize> {
    find_extrema(values, order, |candidate, other| candidate < other)
}

fn find_extrema(values: &[f64], order: usize, beats: impl Fn(f64, f64) -> bool) -> Vec<usize> {
    if order == 0 || values.len() < 2 * order + 1 {
        return Vec::new();
    }
    (order..values.len() - order)
        .filter(|&i| {
            (i - order..=i + order)
                .filter(|&j| j != i)
                .all(|j| beats(values[i], values[j]))
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct ChartPatternDetector {
    pub shoulder_tolerance: f64,
    pub double_tolerance: f64,
    pub rim_tolerance: f64,
    pub pole_min_move: f64,
    pub flat_slope: f64,
}

impl Default for ChartPatternDetector {
    fn default() -> Self {
        ChartPatternDetector {
            shoulder_tolerance: SHOULDER_TOLERANCE,
            double_tolerance: DOUBLE_TOLERANCE,
            rim_tolerance: RIM_TOLERANCE,
            pole_min_move: POLE_MIN_MOVE,
            flat_slope: FLAT_SLOPE,
        }
    }
}

impl ChartPatternDetector {
    /// Run every detector and return the patterns ordered by completion bar.
    pub fn detect(&self, bars: &[Bar]) -> Vec<ChartPattern> {
        let mut patterns = self.detect_converging(bars);
        patterns.extend(self.detect_flags(bars));
        patterns.extend(self.detect_head_and_shoulders(bars));
        patterns.extend(self.detect_double_extremes(bars));
        patterns.extend(self.detect_cup_and_handle(bars));
        patterns.sort_by_key(|p| (p.end_index, p.start_index));
        patterns
    }

    fn pattern(
        &self,
        bars: &[Bar],
        kind: ChartPatternKind,
        start_index: usize,
        end_index: usize,
        level: f64,
        target: Option<f64>,
    ) -> ChartPattern {
        ChartPattern {
            kind,
            bias: kind.bias(),
            start_index,
            end_index,
            start_time: bars[start_index].time,
            end_time: bars[end_index].time,
            level,
            target,
        }
    }

    fn tolerance_for(&self, bars: &[Bar]) -> f64 {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        self.flat_slope * mean(&closes).abs()
    }

    /// Triangles and wedges over sliding windows of swing points.
    pub fn detect_converging(&self, bars: &[Bar]) -> Vec<ChartPattern> {
        let mut out = Vec::new();
        let mut start = 0;
        while start + CONVERGING_WINDOW <= bars.len() {
            match self.classify_converging(bars, start, start + CONVERGING_WINDOW) {
                Some(p) => {
                    out.push(p);
                    start += CONVERGING_WINDOW;
                }
                None => start += WINDOW_STEP,
            }
        }
        out
    }

    fn classify_converging(&self, bars: &[Bar], start: usize, end: usize) -> Option<ChartPattern> {
        let window = &bars[start..end];
        let highs: Vec<f64> = window.iter().map(|b| b.high).collect();
        let lows: Vec<f64> = window.iter().map(|b| b.low).collect();
        let peaks: Vec<(usize, f64)> = find_peaks(&highs, PEAK_ORDER)
            .into_iter()
            .map(|i| (start + i, highs[i]))
            .collect();
        let troughs: Vec<(usize, f64)> = find_troughs(&lows, PEAK_ORDER)
            .into_iter()
            .map(|i| (start + i, lows[i]))
            .collect();
        if peaks.len() < 2 || troughs.len() < 2 {
            return None;
        }

        let tol = self.tolerance_for(window);
        let upper = fit_line(&peaks)?;
        let lower = fit_line(&troughs)?;
        let last = end - 1;

        use SlopeDirection::{Falling, Flat, Rising};
        let kind = match (direction_of(upper.slope, tol), direction_of(lower.slope, tol)) {
            (Flat, Rising) => ChartPatternKind::AscendingTriangle,
            (Falling, Flat) => ChartPatternKind::DescendingTriangle,
            (Falling, Rising) => ChartPatternKind::SymmetricalTriangle,
            (Rising, Rising) if lower.slope > upper.slope => ChartPatternKind::RisingWedge,
            (Falling, Falling) if upper.slope < lower.slope => ChartPatternKind::FallingWedge,
            _ => return None,
        };

        let (level, height) = match kind.bias() {
            PatternBias::Bearish => (
                lower.value_at(last),
                peaks[0].1 - troughs[0].1,
            ),
            _ => (upper.value_at(last), peaks[0].1 - troughs[0].1),
        };
        let target = match kind.bias() {
            PatternBias::Bullish => Some(level + height),
            PatternBias::Bearish => Some(level - height),
            PatternBias::Neutral => None,
        };
        Some(self.pattern(bars, kind, start, last, level, target))
    }

    /// A pole of at least `pole_min_move`, then a tight consolidation: a parallel
    /// channel against the pole (flag) or converging lines (pennant).
    pub fn detect_flags(&self, bars: &[Bar]) -> Vec<ChartPattern> {
        let mut out = Vec::new();
        let mut i = POLE_LEN;
        while i + FLAG_LEN <= bars.len() {
            if let Some(p) = self.classify_flag(bars, i) {
                out.push(p);
                i += FLAG_LEN + POLE_LEN;
            } else {
                i += 1;
            }
        }
        out
    }

    fn classify_flag(&self, bars: &[Bar], i: usize) -> Option<ChartPattern> {
        let pole_start = bars[i - POLE_LEN].close;
        let pole_end = bars[i - 1].close;
        if pole_start == 0.0 {
            return None;
        }
        let pole_move = (pole_end - pole_start) / pole_start;
        if pole_move.abs() < self.pole_min_move {
            return None;
        }

        let consolidation = &bars[i..i + FLAG_LEN];
        let top = consolidation
            .iter()
            .map(|b| b.high)
            .fold(f64::NEG_INFINITY, f64::max);
        let bottom = consolidation
            .iter()
            .map(|b| b.low)
            .fold(f64::INFINITY, f64::min);
        let pole_height = (pole_end - pole_start).abs();
        if top - bottom >= 0.5 * pole_height {
            return None;
        }

        let highs: Vec<(usize, f64)> = consolidation
            .iter()
            .enumerate()
            .map(|(k, b)| (i + k, b.high))
            .collect();
        let lows: Vec<(usize, f64)> = consolidation
            .iter()
            .enumerate()
            .map(|(k, b)| (i + k, b.low))
            .collect();
        let tol = self.tolerance_for(consolidation);
        let upper = fit_line(&highs)?;
        let lower = fit_line(&lows)?;

        use SlopeDirection::{Falling, Rising};
        let bullish = pole_move > 0.0;
        let kind = match (
            bullish,
            direction_of(upper.slope, tol),
            direction_of(lower.slope, tol),
        ) {
            (true, Falling, Falling) => ChartPatternKind::BullFlag,
            (false, Rising, Rising) => ChartPatternKind::BearFlag,
            (true, Falling, Rising) => ChartPatternKind::BullPennant,
            (false, Falling, Rising) => ChartPatternKind::BearPennant,
            _ => return None,
        };

        let end = i + FLAG_LEN - 1;
        let (level, target) = if bullish {
            (top, top + pole_height)
        } else {
            (bottom, bottom - pole_height)
        };
        Some(self.pattern(bars, kind, i - POLE_LEN, end, level, Some(target)))
    }

    /// Three consecutive swing highs with a higher middle and shoulders within
    /// `shoulder_tolerance`; the inverse on swing lows.
    pub fn detect_head_and_shoulders(&self, bars: &[Bar]) -> Vec<ChartPattern> {
        let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
        let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
        let mut out = Vec::new();

        for w in find_peaks(&highs, PEAK_ORDER).windows(3) {
            let (l, h, r) = (w[0], w[1], w[2]);
            let (ls, head, rs) = (highs[l], highs[h], highs[r]);
            if head > ls && head > rs && (ls - rs).abs() / ls.max(rs) <= self.shoulder_tolerance {
                let left_trough = min_between(&lows, l, h);
                let right_trough = min_between(&lows, h, r);
                let neckline = (left_trough + right_trough) / 2.0;
                out.push(self.pattern(
                    bars,
                    ChartPatternKind::HeadAndShoulders,
                    l,
                    r,
                    neckline,
                    Some(neckline - (head - neckline)),
                ));
            }
        }

        for w in find_troughs(&lows, PEAK_ORDER).windows(3) {
            let (l, h, r) = (w[0], w[1], w[2]);
            let (ls, head, rs) = (lows[l], lows[h], lows[r]);
            if head < ls && head < rs && (ls - rs).abs() / ls.max(rs) <= self.shoulder_tolerance {
                let left_peak = max_between(&highs, l, h);
                let right_peak = max_between(&highs, h, r);
                let neckline = (left_peak + right_peak) / 2.0;
                out.push(self.pattern(
                    bars,
                    ChartPatternKind::InverseHeadAndShoulders,
                    l,
                    r,
                    neckline,
                    Some(neckline + (neckline - head)),
                ));
            }
        }
        out
    }

    /// Consecutive swing highs (lows) within `double_tolerance` of each other,
    /// separated by a pullback deeper than the tolerance.
    pub fn detect_double_extremes(&self, bars: &[Bar]) -> Vec<ChartPattern> {
        let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
        let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
        let tol = self.double_tolerance;
        let mut out = Vec::new();

        for w in find_peaks(&highs, PEAK_ORDER).windows(2) {
            let (a, b) = (highs[w[0]], highs[w[1]]);
            let top = a.max(b);
            let trough = min_between(&lows, w[0], w[1]);
            if (a - b).abs() / top <= tol && trough < a.min(b) * (1.0 - tol) {
                out.push(self.pattern(
                    bars,
                    ChartPatternKind::DoubleTop,
                    w[0],
                    w[1],
                    trough,
                    Some(trough - (top - trough)),
                ));
            }
        }

        for w in find_troughs(&lows, PEAK_ORDER).windows(2) {
            let (a, b) = (lows[w[0]], lows[w[1]]);
            let bottom = a.min(b);
            let peak = max_between(&highs, w[0], w[1]);
            if (a - b).abs() / a.max(b) <= tol && peak > a.max(b) * (1.0 + tol) {
                out.push(self.pattern(
                    bars,
                    ChartPatternKind::DoubleBottom,
                    w[0],
                    w[1],
                    peak,
                    Some(peak + (peak - bottom)),
                ));
            }
        }
        out
    }

    /// Rims in the first and last thirds of a window within `rim_tolerance`, a
    /// rounded bottom in the middle third, and a handle after the right rim that
    /// holds the upper half of the cup.
    pub fn detect_cup_and_handle(&self, bars: &[Bar]) -> Vec<ChartPattern> {
        let mut out = Vec::new();
        let mut start = 0;
        while start + CUP_WINDOW <= bars.len() {
            match self.classify_cup(bars, start) {
                Some(p) => {
                    out.push(p);
                    start += CUP_WINDOW;
                }
                None => start += WINDOW_STEP,
            }
        }
        out
    }

    fn classify_cup(&self, bars: &[Bar], start: usize) -> Option<ChartPattern> {
        let third = CUP_WINDOW / 3;
        let end = start + CUP_WINDOW;
        let argmax = |from: usize, to: usize| {
            (from..to).max_by(|&a, &b| bars[a].high.total_cmp(&bars[b].high))
        };
        let left = argmax(start, start + third)?;
        let right = argmax(end - third, end)?;
        let bottom_idx = (start + third..end - third)
            .min_by(|&a, &b| bars[a].low.total_cmp(&bars[b].low))?;

        let (l, r, bottom) = (bars[left].high, bars[right].high, bars[bottom_idx].low);
        let rim = l.min(r);
        if rim <= 0.0 || (l - r).abs() / l.max(r) > self.rim_tolerance {
            return None;
        }
        let depth = (rim - bottom) / rim;
        if !(CUP_MIN_DEPTH..=CUP_MAX_DEPTH).contains(&depth) {
            return None;
        }

        let handle = &bars[right + 1..end];
        if handle.len() < 2 {
            return None;
        }
        let handle_low = handle.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
        if handle_low < bottom + (rim - bottom) / 2.0 {
            return None;
        }

        Some(self.pattern(
            bars,
            ChartPatternKind::CupAndHandle,
            left,
            end - 1,
            rim,
            Some(rim + (rim - bottom)),
        ))
    }
}

fn min_between(values: &[f64], from: usize, to: usize) -> f64 {
    values[from..=to]
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min)
}

fn max_between(values: &[f64], from: usize, to: usize) -> f64 {
    values[from..=to]
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max)
}

/// Reuse of the shared regression for callers that already hold a price slice.
pub fn regression_slope(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    linear_fit(values).slope
}
