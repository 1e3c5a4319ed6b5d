//! Momentum oscillators.

use super::series::{self, closes, ratio_or, tail, wilder_smoothing};
use super::trend::macd_lines;
use super::{IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::Bar;

/// Wilder RSI. Output starts at bar `period`; an average loss of zero reads 100.
pub fn calculate_rsi(bars: &[Bar], period: usize) -> IndicatorSeries {
    IndicatorSeries::from_simple_tail(
        IndicatorType::Rsi(period),
        bars,
        rsi_values(&closes(bars), period),
    )
}

pub(crate) fn rsi_values(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period + 1 {
        return Vec::new();
    }

    let (gains, losses): (Vec<f64>, Vec<f64>) = values
        .windows(2)
        .map(|w| {
            let change = w[1] - w[0];
            (change.max(0.0), (-change).max(0.0))
        })
        .unzip();

    let avg_gain = wilder_smoothing(&gains, period);
    let avg_loss = wilder_smoothing(&losses, period);
    avg_gain
        .iter()
        .zip(&avg_loss)
        .map(|(g, l)| {
            if *l == 0.0 {
                100.0
            } else {
                100.0 - 100.0 / (1.0 + g / l)
            }
        })
        .collect()
}

/// Position of each value within its trailing window range, scaled to 0..100.
/// A collapsed range reads `flat`.
fn stochastic_of(values: &[f64], period: usize, flat: f64) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    values
        .windows(period)
        .map(|w| {
            let hh = w.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let ll = w.iter().copied().fold(f64::INFINITY, f64::min);
            100.0 * ratio_or(w[period - 1] - ll, hh - ll, flat / 100.0)
        })
        .collect()
}

fn pair_with_signal(k: &[f64], d: &[f64]) -> Vec<IndicatorValue> {
    let ks = tail(k, d.len());
    ks.iter()
        .zip(d)
        .map(|(&k, &d)| IndicatorValue::Stochastic { k, d })
        .collect()
}

/// %K over `k_period` high/low, optionally smoothed (`smooth > 1` gives the full
/// stochastic), %D = SMA(%K, `d_period`).
pub fn calculate_stochastic(
    bars: &[Bar],
    k_period: usize,
    d_period: usize,
    smooth: usize,
) -> IndicatorSeries {
    let indicator_type = IndicatorType::Stochastic {
        k_period,
        d_period,
        smooth,
    };
    if k_period == 0 || d_period == 0 || smooth == 0 || bars.len() < k_period {
        return IndicatorSeries::empty(indicator_type, bars.len());
    }

    let raw: Vec<f64> = bars
        .windows(k_period)
        .map(|w| {
            let hh = w.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
            let ll = w.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
            100.0 * ratio_or(w[k_period - 1].close - ll, hh - ll, 1.0)
        })
        .collect();
    let k = if smooth > 1 {
        series::sma(&raw, smooth)
    } else {
        raw
    };
    let d = series::sma(&k, d_period);
    IndicatorSeries::from_tail(indicator_type, bars, pair_with_signal(&k, &d))
}

pub fn calculate_stoch_rsi(
    bars: &[Bar],
    rsi_period: usize,
    stoch_period: usize,
    k_smooth: usize,
    d_smooth: usize,
) -> IndicatorSeries {
    let indicator_type = IndicatorType::StochRsi {
        rsi_period,
        stoch_period,
        k_smooth,
        d_smooth,
    };
    if k_smooth == 0 || d_smooth == 0 {
        return IndicatorSeries::empty(indicator_type, bars.len());
    }

    let rsi = rsi_values(&closes(bars), rsi_period);
    let raw = stochastic_of(&rsi, stoch_period, 100.0);
    let k = series::sma(&raw, k_smooth);
    let d = series::sma(&k, d_smooth);
    if d.is_empty() {
        return IndicatorSeries::empty(indicator_type, bars.len());
    }
    IndicatorSeries::from_tail(indicator_type, bars, pair_with_signal(&k, &d))
}

/// −100·(highest high − close)/(highest high − lowest low). A flat window reads 0.
pub fn calculate_williams_r(bars: &[Bar], period: usize) -> IndicatorSeries {
    let indicator_type = IndicatorType::WilliamsR(period);
    if period == 0 || bars.len() < period {
        return IndicatorSeries::empty(indicator_type, bars.len());
    }

    let values = bars
        .windows(period)
        .map(|w| {
            let hh = w.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
            let ll = w.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
            -100.0 * ratio_or(hh - w[period - 1].close, hh - ll, 0.0)
        })
        .collect();
    IndicatorSeries::from_simple_tail(indicator_type, bars, values)
}

pub(crate) fn roc_values(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period + 1 {
        return Vec::new();
    }
    (period..values.len())
        .map(|i| 100.0 * ratio_or(values[i] - values[i - period], values[i - period], 0.0))
        .collect()
}

pub fn calculate_roc(bars: &[Bar], period: usize) -> IndicatorSeries {
    IndicatorSeries::from_simple_tail(
        IndicatorType::Roc(period),
        bars,
        roc_values(&closes(bars), period),
    )
}

/// Weighted average of buying pressure over three horizons (4:2:1).
pub fn calculate_ultimate_oscillator(
    bars: &[Bar],
    short: usize,
    medium: usize,
    long: usize,
) -> IndicatorSeries {
    let indicator_type = IndicatorType::UltimateOscillator {
        short,
        medium,
        long,
    };
    let longest = short.max(medium).max(long);
    if short == 0 || medium == 0 || long == 0 || bars.len() < longest + 1 {
        return IndicatorSeries::empty(indicator_type, bars.len());
    }

    let (bp, tr): (Vec<f64>, Vec<f64>) = bars
        .windows(2)
        .map(|w| {
            let prev_close = w[0].close;
            let floor = w[1].low.min(prev_close);
            let ceiling = w[1].high.max(prev_close);
            (w[1].close - floor, ceiling - floor)
        })
        .unzip();

    let average = |period: usize| -> Vec<f64> {
        let bp_sum = series::rolling_sum(&bp, period);
        let tr_sum = series::rolling_sum(&tr, period);
        let avg: Vec<f64> = bp_sum
            .iter()
            .zip(&tr_sum)
            .map(|(b, t)| ratio_or(*b, *t, 1.0))
            .collect();
        tail(&avg, bp.len() - longest + 1).to_vec()
    };
    let a1 = average(short);
    let a2 = average(medium);
    let a3 = average(long);

    let values = (0..a1.len())
        .map(|j| 100.0 * (4.0 * a1[j] + 2.0 * a2[j] + a3[j]) / 7.0)
        .collect();
    IndicatorSeries::from_simple_tail(indicator_type, bars, values)
}

/// One-bar percent change of a triple-smoothed EMA.
pub fn calculate_trix(bars: &[Bar], period: usize) -> IndicatorSeries {
    let e1 = series::ema(bars, period);
    let e2 = series::ema(&e1, period);
    let e3 = series::ema(&e2, period);
    let values = e3
        .windows(2)
        .map(|w| 100.0 * ratio_or(w[1] - w[0], w[0], 0.0))
        .collect();
    IndicatorSeries::from_simple_tail(IndicatorType::Trix(period), bars, values)
}

/// Chande Momentum: 100·(Σup − Σdown)/(Σup + Σdown).
pub fn calculate_cmo(bars: &[Bar], period: usize) -> IndicatorSeries {
    let indicator_type = IndicatorType::Cmo(period);
    if period == 0 || bars.len() < period + 1 {
        return IndicatorSeries::empty(indicator_type, bars.len());
    }

    let changes: Vec<f64> = bars.windows(2).map(|w| w[1].close - w[0].close).collect();
    let values = changes
        .windows(period)
        .map(|w| {
            let up: f64 = w.iter().filter(|c| **c > 0.0).sum();
            let down: f64 = -w.iter().filter(|c| **c < 0.0).sum::<f64>();
            100.0 * ratio_or(up - down, up + down, 0.0)
        })
        .collect();
    IndicatorSeries::from_simple_tail(indicator_type, bars, values)
}

pub fn calculate_demarker(bars: &[Bar], period: usize) -> IndicatorSeries {
    let indicator_type = IndicatorType::DeMarker(period);
    if period == 0 || bars.len() < period + 1 {
        return IndicatorSeries::empty(indicator_type, bars.len());
    }

    let (demax, demin): (Vec<f64>, Vec<f64>) = bars
        .windows(2)
        .map(|w| {
            (
                (w[1].high - w[0].high).max(0.0),
                (w[0].low - w[1].low).max(0.0),
            )
        })
        .unzip();
    let smax = series::sma(&demax, period);
    let smin = series::sma(&demin, period);
    let values = smax
        .iter()
        .zip(&smin)
        .map(|(a, b)| ratio_or(*a, a + b, 1.0))
        .collect();
    IndicatorSeries::from_simple_tail(indicator_type, bars, values)
}

/// Ehlers Fisher transform of the median price; the trigger is the previous value.
pub fn calculate_fisher(bars: &[Bar], period: usize) -> IndicatorSeries {
    let indicator_type = IndicatorType::Fisher(period);
    if period == 0 || bars.len() < period {
        return IndicatorSeries::empty(indicator_type, bars.len());
    }

    let medians: Vec<f64> = bars.iter().map(Bar::median_price).collect();
    let mut smoothed = 0.0;
    let mut fisher = 0.0;
    let values = medians
        .windows(period)
        .map(|w| {
            let hh = w.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let ll = w.iter().copied().fold(f64::INFINITY, f64::min);
            let position = ratio_or(w[period - 1] - ll, hh - ll, 0.5) - 0.5;
            smoothed = (0.66 * position + 0.67 * smoothed).clamp(-0.999, 0.999);
            let trigger = fisher;
            fisher = 0.5 * ((1.0 + smoothed) / (1.0 - smoothed)).ln() + 0.5 * fisher;
            IndicatorValue::WithSignal {
                value: fisher,
                signal: trigger,
            }
        })
        .collect();
    IndicatorSeries::from_tail(indicator_type, bars, values)
}

/// Two stochastic passes over the MACD line, each smoothed with factor 0.5.
/// A flat window carries the previous %K forward.
fn smoothed_stochastic(values: &[f64], cycle: usize) -> Vec<f64> {
    const FACTOR: f64 = 0.5;
    if values.len() < cycle {
        return Vec::new();
    }

    let mut k_prev = 0.0;
    let mut out: Vec<f64> = Vec::with_capacity(values.len() - cycle + 1);
    for w in values.windows(cycle) {
        let hh = w.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let ll = w.iter().copied().fold(f64::INFINITY, f64::min);
        let k = if hh > ll {
            100.0 * (w[cycle - 1] - ll) / (hh - ll)
        } else {
            k_prev
        };
        k_prev = k;
        let next = match out.last() {
            Some(prev) => prev + FACTOR * (k - prev),
            None => k,
        };
        out.push(next);
    }
    out
}

pub fn calculate_stc(bars: &[Bar], cycle: usize, fast: usize, slow: usize) -> IndicatorSeries {
    let indicator_type = IndicatorType::Stc { cycle, fast, slow };
    if cycle == 0 || fast == 0 || fast >= slow {
        return IndicatorSeries::empty(indicator_type, bars.len());
    }

    let (line, _) = macd_lines(&closes(bars), fast, slow, 1);
    let first = smoothed_stochastic(&line, cycle);
    let values = smoothed_stochastic(&first, cycle);
    IndicatorSeries::from_simple_tail(indicator_type, bars, values)
}

/// Know Sure Thing: weighted sum of four smoothed ROCs with a 9-bar SMA signal.
pub fn calculate_kst(bars: &[Bar]) -> IndicatorSeries {
    const LEGS: [(usize, usize, f64); 4] =
        [(10, 10, 1.0), (15, 10, 2.0), (20, 10, 3.0), (30, 15, 4.0)];
    const SIGNAL: usize = 9;

    let prices = closes(bars);
    let legs: Vec<(Vec<f64>, f64)> = LEGS
        .iter()
        .map(|&(roc, smooth, weight)| (series::sma(&roc_values(&prices, roc), smooth), weight))
        .collect();
    let len = legs.iter().map(|(l, _)| l.len()).min().unwrap_or(0);
    if len == 0 {
        return IndicatorSeries::empty(IndicatorType::Kst, bars.len());
    }

    let kst: Vec<f64> = (0..len)
        .map(|j| {
            legs.iter()
                .map(|(leg, weight)| weight * tail(leg, len)[j])
                .sum()
        })
        .collect();
    let signal = series::sma(&kst, SIGNAL);
    let values = tail(&kst, signal.len())
        .iter()
        .zip(&signal)
        .map(|(&value, &signal)| IndicatorValue::WithSignal { value, signal })
        .collect();
    IndicatorSeries::from_tail(IndicatorType::Kst, bars, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::IndicatorField;
    use chrono::{NaiveDate, NaiveDateTime};

    fn time(i: usize) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + chrono::Duration::days(i as i64)
    }

    fn make_bars(prices: &[f64]) -> Vec<Bar> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar::new(time(i), close, close + 1.0, close - 1.0, close))
            .collect()
    }

    fn ramp(n: usize, step: f64) -> Vec<Bar> {
        make_bars(&(0..n).map(|i| 100.0 + i as f64 * step).collect::<Vec<_>>())
    }

    fn wave(n: usize) -> Vec<Bar> {
        make_bars(
            &(0..n)
                .map(|i| 100.0 + (i as f64 * 0.4).sin() * 10.0)
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let series = calculate_rsi(&ramp(30, 1.0), 14);
        assert_eq!(series.len(), 16);
        for p in &series.values {
            assert!((p.value.primary() - 100.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn rsi_all_losses_is_0() {
        let series = calculate_rsi(&ramp(30, -1.0), 14);
        for p in &series.values {
            assert!(p.value.primary().abs() < f64::EPSILON);
        }
    }

    #[test]
    fn rsi_stays_in_range() {
        let series = calculate_rsi(&wave(80), 14);
        assert!(!series.is_empty());
        for p in &series.values {
            let v = p.value.primary();
            assert!((0.0..=100.0).contains(&v));
        }
    }

    #[test]
    fn rsi_insufficient_data() {
        assert!(calculate_rsi(&ramp(14, 1.0), 14).is_empty());
    }

    #[test]
    fn stochastic_at_top_of_range() {
        let series = calculate_stochastic(&ramp(20, 1.0), 5, 3, 1);
        assert_eq!(series.len(), 20 - 5 + 1 - 2);
        let v = series.latest().unwrap().value;
        // close = high - 1, range spans 6 → k = 5/6
        let expected = 100.0 * 5.0 / 6.0;
        assert!((v.field(IndicatorField::K).unwrap() - expected).abs() < 1e-9);
        assert!((v.field(IndicatorField::D).unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn full_stochastic_is_shorter() {
        let fast = calculate_stochastic(&wave(40), 14, 3, 1);
        let full = calculate_stochastic(&wave(40), 14, 3, 3);
        assert_eq!(fast.len(), full.len() + 2);
    }

    #[test]
    fn stochastic_flat_range_reads_upper_bound() {
        let bars: Vec<Bar> = (0..10)
            .map(|i| Bar::new(time(i), 50.0, 50.0, 50.0, 50.0))
            .collect();
        let series = calculate_stochastic(&bars, 5, 3, 1);
        assert!((series.latest().unwrap().value.primary() - 100.0).abs() < f64::EPSILON);
        let wr = calculate_williams_r(&bars, 5);
        assert!(wr.latest().unwrap().value.primary().abs() < f64::EPSILON);
    }

    #[test]
    fn stoch_rsi_bounds() {
        let series = calculate_stoch_rsi(&wave(100), 14, 14, 3, 3);
        assert!(!series.is_empty());
        for p in &series.values {
            let k = p.value.field(IndicatorField::K).unwrap();
            assert!((0.0..=100.0).contains(&k));
        }
    }

    #[test]
    fn williams_r_range() {
        let series = calculate_williams_r(&wave(40), 14);
        for p in &series.values {
            let v = p.value.primary();
            assert!((-100.0..=0.0).contains(&v));
        }
    }

    #[test]
    fn roc_known_value() {
        let bars = make_bars(&[100.0, 105.0, 110.0]);
        let series = calculate_roc(&bars, 2);
        assert_eq!(series.len(), 1);
        assert!((series.values[0].value.primary() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn ultimate_oscillator_range_and_length() {
        let series = calculate_ultimate_oscillator(&wave(60), 7, 14, 28);
        assert_eq!(series.len(), 60 - 1 - 28 + 1);
        for p in &series.values {
            let v = p.value.primary();
            assert!((0.0..=100.0).contains(&v));
        }
    }

    #[test]
    fn trix_positive_in_uptrend() {
        let series = calculate_trix(&ramp(60, 1.0), 5);
        assert!(!series.is_empty());
        assert!(series.latest().unwrap().value.primary() > 0.0);
    }

    #[test]
    fn cmo_extremes() {
        let up = calculate_cmo(&ramp(20, 1.0), 14);
        assert!((up.latest().unwrap().value.primary() - 100.0).abs() < 1e-9);
        let flat = calculate_cmo(&make_bars(&[10.0; 20]), 14);
        assert!(flat.latest().unwrap().value.primary().abs() < f64::EPSILON);
    }

    #[test]
    fn demarker_flat_reads_one() {
        let series = calculate_demarker(&make_bars(&[10.0; 20]), 14);
        assert!((series.latest().unwrap().value.primary() - 1.0).abs() < f64::EPSILON);
        let rising = calculate_demarker(&ramp(20, 1.0), 14);
        assert!((rising.latest().unwrap().value.primary() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn fisher_trigger_lags_by_one() {
        let series = calculate_fisher(&wave(40), 10);
        for pair in series.values.windows(2) {
            let prev = pair[0].value.primary();
            let signal = pair[1].value.field(IndicatorField::Signal).unwrap();
            assert!((prev - signal).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn fisher_flat_is_zero() {
        let series = calculate_fisher(&make_bars(&[10.0; 20]), 10);
        for p in &series.values {
            assert!(p.value.primary().abs() < f64::EPSILON);
        }
    }

    #[test]
    fn stc_bounded() {
        let series = calculate_stc(&wave(120), 10, 23, 50);
        assert_eq!(series.len(), 120 - 50 + 1 - 2 * 9);
        for p in &series.values {
            let v = p.value.primary();
            assert!((0.0..=100.0 + 1e-9).contains(&v));
        }
    }

    #[test]
    fn kst_length() {
        let series = calculate_kst(&wave(100));
        // longest leg: ROC 30 + SMA 15, then SMA 9 signal
        assert_eq!(series.len(), 100 - 30 - 15 + 1 - 9 + 1);
        assert!(calculate_kst(&wave(40)).is_empty());
    }
}
