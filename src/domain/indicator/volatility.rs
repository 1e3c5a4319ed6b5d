//! Volatility and band indicators.
//!
//! Everything ATR-based (ATR, NATR, Keltner, volatility stop, and SuperTrend in
//! `trend`) reads the same true range from `series::true_range`.

use super::series::{self, closes, ratio_or, tail, true_range, wilder_smoothing};
use super::trend::scale;
use super::{IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::Bar;

/// Trailing bandwidth window for the squeeze flag.
const SQUEEZE_LOOKBACK: usize = 20;
const SQUEEZE_RATIO: f64 = 0.5;
const TRADING_DAYS: f64 = 252.0;

/// Bollinger Bands: SMA ± `num_std` population standard deviations.
///
/// Bandwidth is `(upper − lower)/middle × 100`, %B is `(close − lower)/(upper − lower)`
/// (0.5 when the bands collapse). Squeeze flags a bandwidth below half the mean of
/// the trailing 20 bandwidths, the current one included.
pub fn calculate_bollinger(bars: &[Bar], period: usize, num_std: f64) -> IndicatorSeries {
    let indicator_type = IndicatorType::Bollinger {
        period,
        stddev_mult_x100: scale(num_std, 100.0),
    };
    if period == 0 || bars.len() < period {
        return IndicatorSeries::empty(indicator_type, bars.len());
    }

    let prices = closes(bars);
    let middle = series::sma(&prices, period);
    let stddev = series::rolling_stddev(&prices, period);
    let offset = bars.len() - middle.len();

    let mut bandwidths: Vec<f64> = Vec::with_capacity(middle.len());
    let values = middle
        .iter()
        .zip(&stddev)
        .enumerate()
        .map(|(j, (&mid, &sd))| {
            let upper = mid + num_std * sd;
            let lower = mid - num_std * sd;
            let bandwidth = 100.0 * ratio_or(upper - lower, mid, 0.0);
            let percent_b = ratio_or(prices[offset + j] - lower, upper - lower, 0.5);

            bandwidths.push(bandwidth);
            let squeeze = bandwidths.len() >= SQUEEZE_LOOKBACK
                && bandwidth < SQUEEZE_RATIO * series::mean(tail(&bandwidths, SQUEEZE_LOOKBACK));

            IndicatorValue::Bollinger {
                upper,
                middle: mid,
                lower,
                bandwidth,
                percent_b,
                squeeze,
            }
        })
        .collect();
    IndicatorSeries::from_tail(indicator_type, bars, values)
}

/// EMA(period) ± multiplier × ATR(atr_period).
pub fn calculate_keltner(
    bars: &[Bar],
    period: usize,
    atr_period: usize,
    multiplier: f64,
) -> IndicatorSeries {
    let indicator_type = IndicatorType::Keltner {
        period,
        atr_period,
        mult_x100: scale(multiplier, 100.0),
    };
    let middle = series::ema(bars, period);
    let atr = wilder_smoothing(&true_range(bars), atr_period);
    let len = middle.len().min(atr.len());
    if len == 0 {
        return IndicatorSeries::empty(indicator_type, bars.len());
    }

    let values = tail(&middle, len)
        .iter()
        .zip(tail(&atr, len))
        .map(|(&mid, &a)| IndicatorValue::Channel {
            upper: mid + multiplier * a,
            middle: mid,
            lower: mid - multiplier * a,
        })
        .collect();
    IndicatorSeries::from_tail(indicator_type, bars, values)
}

pub fn calculate_donchian(bars: &[Bar], period: usize) -> IndicatorSeries {
    let indicator_type = IndicatorType::Donchian(period);
    if period == 0 || bars.len() < period {
        return IndicatorSeries::empty(indicator_type, bars.len());
    }

    let values = bars
        .windows(period)
        .map(|w| {
            let upper = w.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
            let lower = w.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
            IndicatorValue::Channel {
                upper,
                middle: (upper + lower) / 2.0,
                lower,
            }
        })
        .collect();
    IndicatorSeries::from_tail(indicator_type, bars, values)
}

/// SMA ± `percent`%.
pub fn calculate_envelope(bars: &[Bar], period: usize, percent: f64) -> IndicatorSeries {
    let indicator_type = IndicatorType::Envelope {
        period,
        pct_x100: scale(percent, 100.0),
    };
    let factor = percent / 100.0;
    let values = series::sma(bars, period)
        .into_iter()
        .map(|mid| IndicatorValue::Channel {
            upper: mid * (1.0 + factor),
            middle: mid,
            lower: mid * (1.0 - factor),
        })
        .collect();
    IndicatorSeries::from_tail(indicator_type, bars, values)
}

pub(crate) fn atr_values(bars: &[Bar], period: usize) -> Vec<f64> {
    wilder_smoothing(&true_range(bars), period)
}

/// Wilder ATR; the first value averages the first `period` true ranges.
pub fn calculate_atr(bars: &[Bar], period: usize) -> IndicatorSeries {
    IndicatorSeries::from_simple_tail(IndicatorType::Atr(period), bars, atr_values(bars, period))
}

/// ATR as a percentage of close.
pub fn calculate_natr(bars: &[Bar], period: usize) -> IndicatorSeries {
    let atr = atr_values(bars, period);
    let prices = tail(&closes(bars), atr.len()).to_vec();
    let values = atr
        .iter()
        .zip(&prices)
        .map(|(a, c)| 100.0 * ratio_or(*a, *c, 0.0))
        .collect();
    IndicatorSeries::from_simple_tail(IndicatorType::Natr(period), bars, values)
}

/// ATR trailing stop that ratchets with the running extreme close and flips
/// when price closes through it.
pub fn calculate_volatility_stop(bars: &[Bar], period: usize, multiplier: f64) -> IndicatorSeries {
    let indicator_type = IndicatorType::VolatilityStop {
        period,
        mult_x100: scale(multiplier, 100.0),
    };
    let atr = atr_values(bars, period);
    if atr.is_empty() {
        return IndicatorSeries::empty(indicator_type, bars.len());
    }

    let offset = bars.len() - atr.len();
    let mut uptrend = true;
    let mut extreme = bars[offset].close;
    let mut stop = extreme - multiplier * atr[0];

    let values = atr
        .iter()
        .enumerate()
        .map(|(j, a)| {
            let close = bars[offset + j].close;
            let band = multiplier * a;
            if uptrend {
                extreme = extreme.max(close);
                stop = stop.max(extreme - band);
                if close < stop {
                    uptrend = false;
                    extreme = close;
                    stop = close + band;
                }
            } else {
                extreme = extreme.min(close);
                stop = stop.min(extreme + band);
                if close > stop {
                    uptrend = true;
                    extreme = close;
                    stop = close - band;
                }
            }
            IndicatorValue::Trend {
                value: stop,
                uptrend,
            }
        })
        .collect();
    IndicatorSeries::from_tail(indicator_type, bars, values)
}

/// Annualised sample standard deviation of log returns, in percent.
pub fn calculate_historical_volatility(bars: &[Bar], period: usize) -> IndicatorSeries {
    let indicator_type = IndicatorType::HistoricalVolatility(period);
    if period < 2 || bars.len() < period + 1 {
        return IndicatorSeries::empty(indicator_type, bars.len());
    }

    let returns: Vec<f64> = bars
        .windows(2)
        .map(|w| {
            if w[0].close > 0.0 && w[1].close > 0.0 {
                (w[1].close / w[0].close).ln()
            } else {
                0.0
            }
        })
        .collect();
    let values = returns
        .windows(period)
        .map(|w| series::sample_stddev(w) * TRADING_DAYS.sqrt() * 100.0)
        .collect();
    IndicatorSeries::from_simple_tail(indicator_type, bars, values)
}

/// Percent change over `roc_period` bars of the EMA of the high−low range.
pub fn calculate_chaikin_volatility(
    bars: &[Bar],
    period: usize,
    roc_period: usize,
) -> IndicatorSeries {
    let indicator_type = IndicatorType::ChaikinVolatility { period, roc_period };
    let ranges: Vec<f64> = bars.iter().map(Bar::range).collect();
    let smoothed = series::ema(&ranges, period);
    if roc_period == 0 || smoothed.len() <= roc_period {
        return IndicatorSeries::empty(indicator_type, bars.len());
    }

    let values = (roc_period..smoothed.len())
        .map(|i| {
            let base = smoothed[i - roc_period];
            100.0 * ratio_or(smoothed[i] - base, base, 0.0)
        })
        .collect();
    IndicatorSeries::from_simple_tail(indicator_type, bars, values)
}

/// 100·log10(ΣTR / (HH − LL)) / log10(period). A collapsed range reads 100.
pub fn calculate_choppiness(bars: &[Bar], period: usize) -> IndicatorSeries {
    let indicator_type = IndicatorType::Choppiness(period);
    if period < 2 || bars.len() < period {
        return IndicatorSeries::empty(indicator_type, bars.len());
    }

    let tr = true_range(bars);
    let norm = (period as f64).log10();
    let values = bars
        .windows(period)
        .zip(tr.windows(period))
        .map(|(w, t)| {
            let hh = w.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
            let ll = w.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
            if hh - ll <= 0.0 {
                return 100.0;
            }
            let sum: f64 = t.iter().sum();
            100.0 * (sum / (hh - ll)).log10() / norm
        })
        .collect();
    IndicatorSeries::from_simple_tail(indicator_type, bars, values)
}

/// Vertical Horizontal Filter: close range over the sum of absolute close changes.
pub fn calculate_vhf(bars: &[Bar], period: usize) -> IndicatorSeries {
    let indicator_type = IndicatorType::Vhf(period);
    if period == 0 || bars.len() < period + 1 {
        return IndicatorSeries::empty(indicator_type, bars.len());
    }

    let values = closes(bars)
        .windows(period + 1)
        .map(|w| {
            let hcp = w.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let lcp = w.iter().copied().fold(f64::INFINITY, f64::min);
            let path: f64 = w.windows(2).map(|p| (p[1] - p[0]).abs()).sum();
            ratio_or(hcp - lcp, path, 0.0)
        })
        .collect();
    IndicatorSeries::from_simple_tail(indicator_type, bars, values)
}

pub fn calculate_stddev(bars: &[Bar], period: usize) -> IndicatorSeries {
    IndicatorSeries::from_simple_tail(
        IndicatorType::Stddev(period),
        bars,
        series::rolling_stddev(&closes(bars), period),
    )
}
