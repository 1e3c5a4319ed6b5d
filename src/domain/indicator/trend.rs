//! Trend indicators: moving-average families, MACD, ADX/DMI, Aroon,
//! Parabolic SAR, SuperTrend, regressions, Ichimoku, pivot points and ZigZag.

use chrono::NaiveDateTime;
use serde::Serialize;

use super::series::{self, closes, ratio_or, true_range, wilder_smoothing};
use super::{IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::Bar;

pub(crate) fn scale(value: f64, factor: f64) -> u32 {
    (value * factor).round().max(0.0) as u32
}

pub fn calculate_sma(bars: &[Bar], period: usize) -> IndicatorSeries {
    IndicatorSeries::from_simple_tail(IndicatorType::Sma(period), bars, series::sma(bars, period))
}

pub fn calculate_ema(bars: &[Bar], period: usize) -> IndicatorSeries {
    IndicatorSeries::from_simple_tail(IndicatorType::Ema(period), bars, series::ema(bars, period))
}

pub fn calculate_wma(bars: &[Bar], period: usize) -> IndicatorSeries {
    IndicatorSeries::from_simple_tail(IndicatorType::Wma(period), bars, series::wma(bars, period))
}

pub fn calculate_hma(bars: &[Bar], period: usize) -> IndicatorSeries {
    IndicatorSeries::from_simple_tail(
        IndicatorType::Hma(period),
        bars,
        series::hull_ma(bars, period),
    )
}

pub fn calculate_dema(bars: &[Bar], period: usize) -> IndicatorSeries {
    IndicatorSeries::from_simple_tail(IndicatorType::Dema(period), bars, series::dema(bars, period))
}

pub fn calculate_tema(bars: &[Bar], period: usize) -> IndicatorSeries {
    IndicatorSeries::from_simple_tail(IndicatorType::Tema(period), bars, series::tema(bars, period))
}

/// Σ(close·volume) / Σ(volume) over the window; falls back to the plain mean when
/// the window carries no volume.
pub fn calculate_vwma(bars: &[Bar], period: usize) -> IndicatorSeries {
    let indicator_type = IndicatorType::Vwma(period);
    if period == 0 || bars.len() < period {
        return IndicatorSeries::empty(indicator_type, bars.len());
    }

    let values = bars
        .windows(period)
        .map(|w| {
            let pv: f64 = w.iter().map(|b| b.close * b.volume_or_default()).sum();
            let v: f64 = w.iter().map(Bar::volume_or_default).sum();
            let plain = w.iter().map(|b| b.close).sum::<f64>() / period as f64;
            ratio_or(pv, v, plain)
        })
        .collect();
    IndicatorSeries::from_simple_tail(indicator_type, bars, values)
}

/// MACD line = EMA(fast) − EMA(slow), realigned by `slow − fast`;
/// signal = EMA(line, signal); histogram = line − signal.
/// Output starts at the first bar with a signal value.
pub fn calculate_macd(
    bars: &[Bar],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> IndicatorSeries {
    let indicator_type = IndicatorType::Macd {
        fast: fast_period,
        slow: slow_period,
        signal: signal_period,
    };
    if fast_period == 0 || signal_period == 0 || fast_period >= slow_period {
        return IndicatorSeries::empty(indicator_type, bars.len());
    }

    let (line, signal) = macd_lines(&closes(bars), fast_period, slow_period, signal_period);
    if signal.is_empty() {
        return IndicatorSeries::empty(indicator_type, bars.len());
    }

    let shift = signal_period - 1;
    let values = signal
        .iter()
        .enumerate()
        .map(|(j, &s)| {
            let l = line[j + shift];
            IndicatorValue::Macd {
                line: l,
                signal: s,
                histogram: l - s,
            }
        })
        .collect();
    IndicatorSeries::from_tail(indicator_type, bars, values)
}

/// Unaligned MACD and signal lines; `line` is longer than `signal` by `signal_period - 1`.
pub(crate) fn macd_lines(
    values: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> (Vec<f64>, Vec<f64>) {
    let fast = series::ema(values, fast_period);
    let slow = series::ema(values, slow_period);
    if slow.is_empty() {
        return (Vec::new(), Vec::new());
    }
    let start_idx = slow_period - fast_period;
    let line: Vec<f64> = slow
        .iter()
        .enumerate()
        .map(|(j, s)| fast[j + start_idx] - s)
        .collect();
    let signal = series::ema(&line, signal_period);
    (line, signal)
}

/// Wilder's ADX with +DI/−DI. Needs `2·period` bars for the first value.
pub fn calculate_adx(bars: &[Bar], period: usize) -> IndicatorSeries {
    let indicator_type = IndicatorType::Adx(period);
    let Some(dmi) = directional_movement(bars, period) else {
        return IndicatorSeries::empty(indicator_type, bars.len());
    };

    let adx = wilder_smoothing(&dmi.dx, period);
    if adx.is_empty() {
        return IndicatorSeries::empty(indicator_type, bars.len());
    }
    let shift = period - 1;
    let values = adx
        .iter()
        .enumerate()
        .map(|(j, &a)| IndicatorValue::Directional {
            adx: a,
            plus_di: dmi.plus_di[j + shift],
            minus_di: dmi.minus_di[j + shift],
        })
        .collect();
    IndicatorSeries::from_tail(indicator_type, bars, values)
}

struct DirectionalMovement {
    plus_di: Vec<f64>,
    minus_di: Vec<f64>,
    dx: Vec<f64>,
}

fn directional_movement(bars: &[Bar], period: usize) -> Option<DirectionalMovement> {
    if period == 0 || bars.len() < period + 1 {
        return None;
    }

    let n = bars.len();
    let mut plus_dm = Vec::with_capacity(n - 1);
    let mut minus_dm = Vec::with_capacity(n - 1);
    let mut tr = Vec::with_capacity(n - 1);
    for i in 1..n {
        let up = bars[i].high - bars[i - 1].high;
        let down = bars[i - 1].low - bars[i].low;
        plus_dm.push(if up > down && up > 0.0 { up } else { 0.0 });
        minus_dm.push(if down > up && down > 0.0 { down } else { 0.0 });
        tr.push(bars[i].true_range(bars[i - 1].close));
    }

    let s_tr = wilder_smoothing(&tr, period);
    let s_plus = wilder_smoothing(&plus_dm, period);
    let s_minus = wilder_smoothing(&minus_dm, period);

    let plus_di: Vec<f64> = s_plus
        .iter()
        .zip(&s_tr)
        .map(|(p, t)| 100.0 * ratio_or(*p, *t, 0.0))
        .collect();
    let minus_di: Vec<f64> = s_minus
        .iter()
        .zip(&s_tr)
        .map(|(m, t)| 100.0 * ratio_or(*m, *t, 0.0))
        .collect();
    let dx = plus_di
        .iter()
        .zip(&minus_di)
        .map(|(p, m)| 100.0 * ratio_or((p - m).abs(), p + m, 0.0))
        .collect();

    Some(DirectionalMovement {
        plus_di,
        minus_di,
        dx,
    })
}

/// Aroon up/down over `period + 1` bars; ties resolve to the most recent extreme.
pub fn calculate_aroon(bars: &[Bar], period: usize) -> IndicatorSeries {
    let indicator_type = IndicatorType::Aroon(period);
    if period == 0 || bars.len() < period + 1 {
        return IndicatorSeries::empty(indicator_type, bars.len());
    }

    let p = period as f64;
    let values = bars
        .windows(period + 1)
        .map(|w| {
            let mut high_idx = 0;
            let mut low_idx = 0;
            for (k, bar) in w.iter().enumerate() {
                if bar.high >= w[high_idx].high {
                    high_idx = k;
                }
                if bar.low <= w[low_idx].low {
                    low_idx = k;
                }
            }
            let up = 100.0 * high_idx as f64 / p;
            let down = 100.0 * low_idx as f64 / p;
            IndicatorValue::Aroon {
                up,
                down,
                oscillator: up - down,
            }
        })
        .collect();
    IndicatorSeries::from_tail(indicator_type, bars, values)
}

/// Wilder's Parabolic SAR. The first value belongs to bar 1.
pub fn calculate_psar(bars: &[Bar], step: f64, max_step: f64) -> IndicatorSeries {
    let indicator_type = IndicatorType::Psar {
        step_x1000: scale(step, 1000.0),
        max_x1000: scale(max_step, 1000.0),
    };
    if bars.len() < 2 || step <= 0.0 || max_step < step {
        return IndicatorSeries::empty(indicator_type, bars.len());
    }

    let mut uptrend = bars[1].close >= bars[0].close;
    let mut af = step;
    let mut ep = if uptrend { bars[0].high } else { bars[0].low };
    let mut sar = if uptrend { bars[0].low } else { bars[0].high };

    let mut values = Vec::with_capacity(bars.len() - 1);
    for i in 1..bars.len() {
        let bar = &bars[i];
        sar += af * (ep - sar);

        if uptrend {
            sar = sar.min(bars[i - 1].low);
            if i >= 2 {
                sar = sar.min(bars[i - 2].low);
            }
            if bar.low < sar {
                uptrend = false;
                sar = ep;
                ep = bar.low;
                af = step;
            } else if bar.high > ep {
                ep = bar.high;
                af = (af + step).min(max_step);
            }
        } else {
            sar = sar.max(bars[i - 1].high);
            if i >= 2 {
                sar = sar.max(bars[i - 2].high);
            }
            if bar.high > sar {
                uptrend = true;
                sar = ep;
                ep = bar.high;
                af = step;
            } else if bar.low < ep {
                ep = bar.low;
                af = (af + step).min(max_step);
            }
        }

        values.push(IndicatorValue::Trend {
            value: sar,
            uptrend,
        });
    }
    IndicatorSeries::from_tail(indicator_type, bars, values)
}

/// SuperTrend over Wilder ATR with final-band carry-over.
pub fn calculate_supertrend(bars: &[Bar], period: usize, multiplier: f64) -> IndicatorSeries {
    let indicator_type = IndicatorType::SuperTrend {
        period,
        mult_x100: scale(multiplier, 100.0),
    };
    let atr = wilder_smoothing(&true_range(bars), period);
    if atr.is_empty() {
        return IndicatorSeries::empty(indicator_type, bars.len());
    }

    let offset = bars.len() - atr.len();
    let mut values = Vec::with_capacity(atr.len());
    let mut final_upper = 0.0;
    let mut final_lower = 0.0;
    let mut uptrend = true;

    for (j, a) in atr.iter().enumerate() {
        let i = offset + j;
        let bar = &bars[i];
        let hl2 = bar.median_price();
        let basic_upper = hl2 + multiplier * a;
        let basic_lower = hl2 - multiplier * a;

        if j == 0 {
            final_upper = basic_upper;
            final_lower = basic_lower;
            uptrend = bar.close >= hl2;
        } else {
            let prev_close = bars[i - 1].close;
            if basic_upper < final_upper || prev_close > final_upper {
                final_upper = basic_upper;
            }
            if basic_lower > final_lower || prev_close < final_lower {
                final_lower = basic_lower;
            }
            if uptrend && bar.close < final_lower {
                uptrend = false;
            } else if !uptrend && bar.close > final_upper {
                uptrend = true;
            }
        }

        let value = if uptrend { final_lower } else { final_upper };
        values.push(IndicatorValue::Trend { value, uptrend });
    }
    IndicatorSeries::from_tail(indicator_type, bars, values)
}

/// Least-squares line through each window of closes, evaluated at the window end.
pub fn calculate_linear_regression(bars: &[Bar], period: usize) -> IndicatorSeries {
    let indicator_type = IndicatorType::LinearRegression(period);
    if period < 2 || bars.len() < period {
        return IndicatorSeries::empty(indicator_type, bars.len());
    }

    let values = closes(bars)
        .windows(period)
        .map(|w| {
            let fit = linear_fit(w);
            IndicatorValue::Regression {
                value: fit.intercept + fit.slope * (period - 1) as f64,
                slope: fit.slope,
                r_squared: fit.r_squared,
            }
        })
        .collect();
    IndicatorSeries::from_tail(indicator_type, bars, values)
}

pub(crate) struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

/// Fit `y = intercept + slope·x` with `x = 0, 1, 2, ...`.
pub(crate) fn linear_fit(ys: &[f64]) -> LinearFit {
    let n = ys.len() as f64;
    let sum_x: f64 = (0..ys.len()).map(|x| x as f64).sum();
    let sum_y: f64 = ys.iter().sum();
    let sum_xy: f64 = ys.iter().enumerate().map(|(x, y)| x as f64 * y).sum();
    let sum_xx: f64 = (0..ys.len()).map(|x| (x as f64).powi(2)).sum();

    let denom = n * sum_xx - sum_x * sum_x;
    let slope = ratio_or(n * sum_xy - sum_x * sum_y, denom, 0.0);
    let intercept = (sum_y - slope * sum_x) / n;

    let mean_y = sum_y / n;
    let ss_tot: f64 = ys.iter().map(|y| (y - mean_y).powi(2)).sum();
    let ss_res: f64 = ys
        .iter()
        .enumerate()
        .map(|(x, y)| (y - (intercept + slope * x as f64)).powi(2))
        .sum();
    let r_squared = if ss_tot == 0.0 {
        1.0
    } else {
        1.0 - ss_res / ss_tot
    };

    LinearFit {
        slope,
        intercept,
        r_squared,
    }
}

/// Polynomial least squares of `degree` per window via the normal equations.
pub fn calculate_polynomial_regression(
    bars: &[Bar],
    period: usize,
    degree: usize,
) -> IndicatorSeries {
    let indicator_type = IndicatorType::PolynomialRegression { period, degree };
    if degree == 0 || period <= degree || bars.len() < period {
        return IndicatorSeries::empty(indicator_type, bars.len());
    }

    // x is normalised to [0, 1] to keep the normal equations well conditioned.
    let span = (period - 1) as f64;
    let xs: Vec<f64> = (0..period).map(|i| i as f64 / span).collect();

    let values = closes(bars)
        .windows(period)
        .map(|w| match fit_polynomial(&xs, w, degree) {
            Some(coeffs) => {
                let value = eval_polynomial(&coeffs, 1.0);
                let slope = eval_derivative(&coeffs, 1.0) / span;
                let mean_y = w.iter().sum::<f64>() / period as f64;
                let ss_tot: f64 = w.iter().map(|y| (y - mean_y).powi(2)).sum();
                let ss_res: f64 = xs
                    .iter()
                    .zip(w)
                    .map(|(x, y)| (y - eval_polynomial(&coeffs, *x)).powi(2))
                    .sum();
                let r_squared = if ss_tot == 0.0 {
                    1.0
                } else {
                    1.0 - ss_res / ss_tot
                };
                IndicatorValue::Regression {
                    value,
                    slope,
                    r_squared,
                }
            }
            None => IndicatorValue::Regression {
                value: w[period - 1],
                slope: 0.0,
                r_squared: 0.0,
            },
        })
        .collect();
    IndicatorSeries::from_tail(indicator_type, bars, values)
}

/// Coefficients `c[0] + c[1]x + ... + c[d]x^d`, or `None` for a singular system.
fn fit_polynomial(xs: &[f64], ys: &[f64], degree: usize) -> Option<Vec<f64>> {
    let m = degree + 1;
    // augmented matrix [A | b], A[r][c] = Σ x^(r+c), b[r] = Σ y·x^r
    let mut a = vec![vec![0.0; m + 1]; m];
    for (x, y) in xs.iter().zip(ys) {
        let mut powers = vec![1.0; 2 * m - 1];
        for k in 1..powers.len() {
            powers[k] = powers[k - 1] * x;
        }
        for r in 0..m {
            for c in 0..m {
                a[r][c] += powers[r + c];
            }
            a[r][m] += y * powers[r];
        }
    }

    for col in 0..m {
        let pivot = (col..m).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        for row in 0..m {
            if row != col {
                let factor = a[row][col] / a[col][col];
                for k in col..=m {
                    a[row][k] -= factor * a[col][k];
                }
            }
        }
    }

    Some((0..m).map(|r| a[r][m] / a[r][r]).collect())
}

fn eval_polynomial(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

fn eval_derivative(coeffs: &[f64], x: f64) -> f64 {
    coeffs
        .iter()
        .enumerate()
        .skip(1)
        .rev()
        .fold(0.0, |acc, (k, c)| acc * x + k as f64 * c)
}

/// Midpoint of the highest high and lowest low over each window.
fn donchian_mid(bars: &[Bar], period: usize) -> Vec<f64> {
    bars.windows(period)
        .map(|w| {
            let high = w.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
            let low = w.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
            (high + low) / 2.0
        })
        .collect()
}

/// Ichimoku lines, unshifted. Starts at the first bar with a full senkou window.
pub fn calculate_ichimoku(
    bars: &[Bar],
    tenkan_period: usize,
    kijun_period: usize,
    senkou_period: usize,
) -> IndicatorSeries {
    let indicator_type = IndicatorType::Ichimoku {
        tenkan: tenkan_period,
        kijun: kijun_period,
        senkou: senkou_period,
    };
    let longest = tenkan_period.max(kijun_period).max(senkou_period);
    if tenkan_period == 0 || kijun_period == 0 || senkou_period == 0 || bars.len() < longest {
        return IndicatorSeries::empty(indicator_type, bars.len());
    }

    let tenkan = donchian_mid(bars, tenkan_period);
    let kijun = donchian_mid(bars, kijun_period);
    let span_b = donchian_mid(bars, senkou_period);
    let count = bars.len() - longest + 1;

    let values = (0..count)
        .map(|j| {
            let t = tenkan[tenkan.len() - count + j];
            let k = kijun[kijun.len() - count + j];
            IndicatorValue::Ichimoku {
                tenkan: t,
                kijun: k,
                span_a: (t + k) / 2.0,
                span_b: span_b[span_b.len() - count + j],
            }
        })
        .collect();
    IndicatorSeries::from_tail(indicator_type, bars, values)
}

/// Classic floor pivots computed from the previous bar.
pub fn calculate_pivot_points(bars: &[Bar]) -> IndicatorSeries {
    let indicator_type = IndicatorType::Pivot;
    if bars.len() < 2 {
        return IndicatorSeries::empty(indicator_type, bars.len());
    }

    let values = bars
        .windows(2)
        .map(|w| {
            let prev = &w[0];
            let pivot = prev.typical_price();
            let range = prev.range();
            IndicatorValue::Pivot {
                pivot,
                r1: 2.0 * pivot - prev.low,
                r2: pivot + range,
                r3: prev.high + 2.0 * (pivot - prev.low),
                s1: 2.0 * pivot - prev.high,
                s2: pivot - range,
                s3: prev.low - 2.0 * (prev.high - pivot),
            }
        })
        .collect();
    IndicatorSeries::from_tail(indicator_type, bars, values)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PivotKind {
    High,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZigZagPivot {
    pub index: usize,
    pub time: NaiveDateTime,
    pub price: f64,
    pub kind: PivotKind,
}

/// ZigZag swing points: a new pivot is confirmed once price reverses by at least
/// `threshold_pct` percent from the running extreme. The final entry is the
/// unconfirmed extreme of the current leg and may move as bars arrive.
pub fn calculate_zigzag(bars: &[Bar], threshold_pct: f64) -> Vec<ZigZagPivot> {
    if bars.len() < 2 || threshold_pct <= 0.0 {
        return Vec::new();
    }
    let threshold = threshold_pct / 100.0;
    let pivot = |index: usize, kind: PivotKind| ZigZagPivot {
        index,
        time: bars[index].time,
        price: match kind {
            PivotKind::High => bars[index].high,
            PivotKind::Low => bars[index].low,
        },
        kind,
    };

    let mut pivots = Vec::new();
    let mut high_idx = 0;
    let mut low_idx = 0;
    let mut direction: Option<PivotKind> = None;

    for i in 1..bars.len() {
        let bar = &bars[i];
        match direction {
            None => {
                if bar.high > bars[high_idx].high {
                    high_idx = i;
                }
                if bar.low < bars[low_idx].low {
                    low_idx = i;
                }
                if bars[high_idx].high >= bars[low_idx].low * (1.0 + threshold)
                    && high_idx > low_idx
                {
                    pivots.push(pivot(low_idx, PivotKind::Low));
                    direction = Some(PivotKind::High);
                } else if bars[low_idx].low <= bars[high_idx].high * (1.0 - threshold)
                    && low_idx > high_idx
                {
                    pivots.push(pivot(high_idx, PivotKind::High));
                    direction = Some(PivotKind::Low);
                }
            }
            Some(PivotKind::High) => {
                if bar.high > bars[high_idx].high {
                    high_idx = i;
                } else if bar.low <= bars[high_idx].high * (1.0 - threshold) {
                    pivots.push(pivot(high_idx, PivotKind::High));
                    low_idx = i;
                    direction = Some(PivotKind::Low);
                }
            }
            Some(PivotKind::Low) => {
                if bar.low < bars[low_idx].low {
                    low_idx = i;
                } else if bar.high >= bars[low_idx].low * (1.0 + threshold) {
                    pivots.push(pivot(low_idx, PivotKind::Low));
                    high_idx = i;
                    direction = Some(PivotKind::High);
                }
            }
        }
    }

    match direction {
        Some(PivotKind::High) => pivots.push(pivot(high_idx, PivotKind::High)),
        Some(PivotKind::Low) => pivots.push(pivot(low_idx, PivotKind::Low)),
        None => {}
    }
    pivots
}
