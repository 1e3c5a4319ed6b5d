//! Shared series math primitives.
//!
//! Every indicator smooths through these functions so seeding stays identical
//! across the catalogue. Each primitive returns only the values from the first
//! full window onward: an input of length `n` yields `n - period + 1` values
//! (fewer for the compound averages), and anything shorter than the window
//! yields an empty vector.

use crate::domain::ohlcv::Bar;

/// Anything a smoothing primitive can read a price from.
pub trait PriceSource {
    fn price(&self) -> f64;
}

impl PriceSource for f64 {
    fn price(&self) -> f64 {
        *self
    }
}

impl PriceSource for Bar {
    fn price(&self) -> f64 {
        self.close
    }
}

pub fn closes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

pub fn sma<T: PriceSource>(values: &[T], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(values.len() - period + 1);
    let mut sum: f64 = values[..period].iter().map(PriceSource::price).sum();
    out.push(sum / period as f64);

    for i in period..values.len() {
        sum += values[i].price() - values[i - period].price();
        out.push(sum / period as f64);
    }
    out
}

/// k = 2/(period+1), seeded with the SMA of the first `period` values.
pub fn ema<T: PriceSource>(values: &[T], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }

    let k = 2.0 / (period as f64 + 1.0);
    let seed: f64 = values[..period].iter().map(PriceSource::price).sum::<f64>() / period as f64;

    let mut out = Vec::with_capacity(values.len() - period + 1);
    out.push(seed);
    let mut prev = seed;
    for v in &values[period..] {
        prev = v.price() * k + prev * (1.0 - k);
        out.push(prev);
    }
    out
}

/// Linear weights 1..=period, newest heaviest.
pub fn wma<T: PriceSource>(values: &[T], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }

    let denom = (period * (period + 1)) as f64 / 2.0;
    values
        .windows(period)
        .map(|w| {
            w.iter()
                .enumerate()
                .map(|(j, v)| v.price() * (j + 1) as f64)
                .sum::<f64>()
                / denom
        })
        .collect()
}

/// Wilder's smoothing: seed is the mean of the first `period` values, then
/// `(prev * (period - 1) + x) / period`.
pub fn wilder_smoothing<T: PriceSource>(values: &[T], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }

    let p = period as f64;
    let seed: f64 = values[..period].iter().map(PriceSource::price).sum::<f64>() / p;

    let mut out = Vec::with_capacity(values.len() - period + 1);
    out.push(seed);
    let mut prev = seed;
    for v in &values[period..] {
        prev = (prev * (p - 1.0) + v.price()) / p;
        out.push(prev);
    }
    out
}

/// WMA(2·WMA(n/2) − WMA(n), √n).
pub fn hull_ma<T: PriceSource>(values: &[T], period: usize) -> Vec<f64> {
    if period == 0 {
        return Vec::new();
    }
    let half = (period / 2).max(1);
    let root = ((period as f64).sqrt().floor() as usize).max(1);

    let fast = wma(values, half);
    let slow = wma(values, period);
    if slow.is_empty() {
        return Vec::new();
    }

    let shift = period - half;
    let diff: Vec<f64> = slow
        .iter()
        .enumerate()
        .map(|(j, s)| 2.0 * fast[j + shift] - s)
        .collect();
    wma(&diff, root)
}

/// 2·EMA − EMA(EMA).
pub fn dema<T: PriceSource>(values: &[T], period: usize) -> Vec<f64> {
    let e1 = ema(values, period);
    let e2 = ema(&e1, period);
    if e2.is_empty() {
        return Vec::new();
    }
    let shift = e1.len() - e2.len();
    e2.iter()
        .enumerate()
        .map(|(j, v)| 2.0 * e1[j + shift] - v)
        .collect()
}

/// 3·EMA − 3·EMA(EMA) + EMA(EMA(EMA)).
pub fn tema<T: PriceSource>(values: &[T], period: usize) -> Vec<f64> {
    let e1 = ema(values, period);
    let e2 = ema(&e1, period);
    let e3 = ema(&e2, period);
    if e3.is_empty() {
        return Vec::new();
    }
    let s1 = e1.len() - e3.len();
    let s2 = e2.len() - e3.len();
    e3.iter()
        .enumerate()
        .map(|(j, v)| 3.0 * e1[j + s1] - 3.0 * e2[j + s2] + v)
        .collect()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn population_stddev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

pub fn sample_stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Population standard deviation of every full window.
pub fn rolling_stddev(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    values.windows(period).map(population_stddev).collect()
}

pub fn rolling_max(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    values
        .windows(period)
        .map(|w| w.iter().copied().fold(f64::NEG_INFINITY, f64::max))
        .collect()
}

pub fn rolling_min(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    values
        .windows(period)
        .map(|w| w.iter().copied().fold(f64::INFINITY, f64::min))
        .collect()
}

pub fn rolling_sum(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    values.windows(period).map(|w| w.iter().sum()).collect()
}

/// True range for every bar. The first bar has no previous close and uses high − low.
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            if i == 0 {
                bar.range()
            } else {
                bar.true_range(bars[i - 1].close)
            }
        })
        .collect()
}

/// The last `len` elements of `values`, or all of them if shorter.
pub fn tail(values: &[f64], len: usize) -> &[f64] {
    &values[values.len().saturating_sub(len)..]
}

/// Divide, substituting `fallback` when the denominator is zero or the result is not finite.
pub fn ratio_or(numerator: f64, denominator: f64, fallback: f64) -> f64 {
    if denominator == 0.0 {
        return fallback;
    }
    let r = numerator / denominator;
    if r.is_finite() { r } else { fallback }
}
