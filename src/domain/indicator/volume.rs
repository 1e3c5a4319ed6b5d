//! Volume indicators.
//!
//! Bars without volume read `DEFAULT_VOLUME` instead of failing.

use super::series::{self, ratio_or, tail};
use super::{IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::Bar;

/// Ease of Movement volume scale.
const EOM_VOLUME_SCALE: f64 = 100_000_000.0;

/// On-Balance Volume, starting at 0 on the first bar.
pub fn calculate_obv(bars: &[Bar]) -> IndicatorSeries {
    let mut values = Vec::with_capacity(bars.len());
    let mut obv = 0.0;

    for (i, bar) in bars.iter().enumerate() {
        if i > 0 {
            let prev = bars[i - 1].close;
            let volume = bar.volume_or_default();
            if bar.close > prev {
                obv += volume;
            } else if bar.close < prev {
                obv -= volume;
            }
        }
        values.push(obv);
    }
    IndicatorSeries::from_simple_tail(IndicatorType::Obv, bars, values)
}

/// Volume Price Trend: cumulative volume × percent change.
pub fn calculate_vpt(bars: &[Bar]) -> IndicatorSeries {
    let mut values = Vec::with_capacity(bars.len());
    let mut vpt = 0.0;

    for (i, bar) in bars.iter().enumerate() {
        if i > 0 {
            let prev = bars[i - 1].close;
            vpt += bar.volume_or_default() * ratio_or(bar.close - prev, prev, 0.0);
        }
        values.push(vpt);
    }
    IndicatorSeries::from_simple_tail(IndicatorType::Vpt, bars, values)
}

/// Money Flow Index. No negative flow in the window reads 100.
pub fn calculate_mfi(bars: &[Bar], period: usize) -> IndicatorSeries {
    let indicator_type = IndicatorType::Mfi(period);
    if period == 0 || bars.len() < period + 1 {
        return IndicatorSeries::empty(indicator_type, bars.len());
    }

    let (positive, negative): (Vec<f64>, Vec<f64>) = bars
        .windows(2)
        .map(|w| {
            let tp = w[1].typical_price();
            let prev_tp = w[0].typical_price();
            let flow = tp * w[1].volume_or_default();
            if tp > prev_tp {
                (flow, 0.0)
            } else if tp < prev_tp {
                (0.0, flow)
            } else {
                (0.0, 0.0)
            }
        })
        .unzip();

    let pos = series::rolling_sum(&positive, period);
    let neg = series::rolling_sum(&negative, period);
    let values = pos
        .iter()
        .zip(&neg)
        .map(|(p, n)| {
            if *n == 0.0 {
                100.0
            } else {
                100.0 - 100.0 / (1.0 + p / n)
            }
        })
        .collect();
    IndicatorSeries::from_simple_tail(indicator_type, bars, values)
}

/// Close location value in [-1, 1]; 0 for a bar with no range.
fn close_location(bar: &Bar) -> f64 {
    ratio_or(
        (bar.close - bar.low) - (bar.high - bar.close),
        bar.high - bar.low,
        0.0,
    )
}

fn ad_values(bars: &[Bar]) -> Vec<f64> {
    bars.iter()
        .scan(0.0, |ad, bar| {
            *ad += close_location(bar) * bar.volume_or_default();
            Some(*ad)
        })
        .collect()
}

/// Accumulation/Distribution line.
pub fn calculate_ad_line(bars: &[Bar]) -> IndicatorSeries {
    IndicatorSeries::from_simple_tail(IndicatorType::AdLine, bars, ad_values(bars))
}

/// EMA(fast) − EMA(slow) of the A/D line.
pub fn calculate_chaikin_oscillator(bars: &[Bar], fast: usize, slow: usize) -> IndicatorSeries {
    let indicator_type = IndicatorType::ChaikinOscillator { fast, slow };
    if fast == 0 || fast >= slow {
        return IndicatorSeries::empty(indicator_type, bars.len());
    }

    let ad = ad_values(bars);
    let fast_ema = series::ema(&ad, fast);
    let slow_ema = series::ema(&ad, slow);
    let values = tail(&fast_ema, slow_ema.len())
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| f - s)
        .collect();
    IndicatorSeries::from_simple_tail(indicator_type, bars, values)
}

/// Cumulative VWAP over the whole input. Zero cumulative volume reads the typical price.
pub fn calculate_vwap(bars: &[Bar]) -> IndicatorSeries {
    let mut pv = 0.0;
    let mut vol = 0.0;
    let values = bars
        .iter()
        .map(|bar| {
            let tp = bar.typical_price();
            let v = bar.volume_or_default();
            pv += tp * v;
            vol += v;
            ratio_or(pv, vol, tp)
        })
        .collect();
    IndicatorSeries::from_simple_tail(IndicatorType::Vwap, bars, values)
}

/// Klinger Volume Oscillator with its EMA signal line.
pub fn calculate_klinger(bars: &[Bar], fast: usize, slow: usize, signal: usize) -> IndicatorSeries {
    let indicator_type = IndicatorType::Klinger { fast, slow, signal };
    if fast == 0 || signal == 0 || fast >= slow || bars.len() < 2 {
        return IndicatorSeries::empty(indicator_type, bars.len());
    }

    let mut force = Vec::with_capacity(bars.len() - 1);
    let mut prev_trend = 0.0;
    let mut prev_dm = bars[0].range();
    let mut cm = 0.0;
    for w in bars.windows(2) {
        let trend = if w[1].typical_price() > w[0].typical_price() {
            1.0
        } else {
            -1.0
        };
        let dm = w[1].range();
        cm = if trend == prev_trend {
            cm + dm
        } else {
            prev_dm + dm
        };
        let shape = (2.0 * ratio_or(dm, cm, 0.5) - 1.0).abs();
        force.push(w[1].volume_or_default() * shape * trend * 100.0);
        prev_trend = trend;
        prev_dm = dm;
    }

    let fast_ema = series::ema(&force, fast);
    let slow_ema = series::ema(&force, slow);
    let kvo: Vec<f64> = tail(&fast_ema, slow_ema.len())
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| f - s)
        .collect();
    let signal_line = series::ema(&kvo, signal);
    let values = tail(&kvo, signal_line.len())
        .iter()
        .zip(&signal_line)
        .map(|(&value, &signal)| IndicatorValue::WithSignal { value, signal })
        .collect();
    IndicatorSeries::from_tail(indicator_type, bars, values)
}

/// EMA of (close change × volume).
pub fn calculate_force_index(bars: &[Bar], period: usize) -> IndicatorSeries {
    let raw: Vec<f64> = bars
        .windows(2)
        .map(|w| (w[1].close - w[0].close) * w[1].volume_or_default())
        .collect();
    IndicatorSeries::from_simple_tail(
        IndicatorType::ForceIndex(period),
        bars,
        series::ema(&raw, period),
    )
}

/// SMA of midpoint move divided by box ratio (volume / 1e8 over range).
pub fn calculate_ease_of_movement(bars: &[Bar], period: usize) -> IndicatorSeries {
    let raw: Vec<f64> = bars
        .windows(2)
        .map(|w| {
            let distance = w[1].median_price() - w[0].median_price();
            let box_ratio = w[1].volume_or_default() / EOM_VOLUME_SCALE;
            ratio_or(distance * w[1].range(), box_ratio, 0.0)
        })
        .collect();
    IndicatorSeries::from_simple_tail(
        IndicatorType::EaseOfMovement(period),
        bars,
        series::sma(&raw, period),
    )
}
