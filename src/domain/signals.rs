//! Standalone crossover signal generators.
//!
//! Each generator scans a bar slice once and emits a signal on the bar where
//! its state flips. A bar without indicator values resets the generator, so a
//! flip is only reported between two bars that both have values.

use serde::Serialize;

use crate::domain::indicator::{IndicatorField, IndicatorSeries, IndicatorType};
use crate::domain::indicator_helpers::compute_indicator;
use crate::domain::ohlcv::Bar;
use chrono::NaiveDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalTag {
    EmaCross,
    MacdCross,
    RsiLevels,
    BbTouch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeSignal {
    pub kind: SignalKind,
    pub time: NaiveDateTime,
    pub price: f64,
    pub reason: String,
    pub tag: SignalTag,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalSettings {
    pub sma_period: usize,
    pub ema_period: usize,
    pub macd: (usize, usize, usize),
    pub rsi_period: usize,
    pub rsi_low: f64,
    pub rsi_high: f64,
    pub bollinger_period: usize,
    pub bollinger_mult_x100: u32,
}

impl Default for SignalSettings {
    fn default() -> Self {
        SignalSettings {
            sma_period: 20,
            ema_period: 21,
            macd: (12, 26, 9),
            rsi_period: 14,
            rsi_low: 30.0,
            rsi_high: 70.0,
            bollinger_period: 20,
            bollinger_mult_x100: 200,
        }
    }
}

fn signal(bar: &Bar, kind: SignalKind, reason: impl Into<String>, tag: SignalTag) -> TradeSignal {
    TradeSignal {
        kind,
        time: bar.time,
        price: bar.close,
        reason: reason.into(),
        tag,
    }
}

fn value(series: &IndicatorSeries, index: usize, field: IndicatorField) -> Option<f64> {
    series.value_at(index, field)
}

/// EMA crossing its SMA.
pub fn ema_sma_cross_signals(bars: &[Bar], settings: &SignalSettings) -> Vec<TradeSignal> {
    let sma = compute_indicator(bars, &IndicatorType::Sma(settings.sma_period));
    let ema = compute_indicator(bars, &IndicatorType::Ema(settings.ema_period));
    let mut out = Vec::new();
    let mut prev_above: Option<bool> = None;
    for (i, bar) in bars.iter().enumerate() {
        let (Some(s), Some(e)) = (
            value(&sma, i, IndicatorField::Value),
            value(&ema, i, IndicatorField::Value),
        ) else {
            prev_above = None;
            continue;
        };
        let above = e > s;
        if prev_above.is_some_and(|p| p != above) {
            out.push(if above {
                signal(bar, SignalKind::Buy, "EMA crossed above SMA", SignalTag::EmaCross)
            } else {
                signal(bar, SignalKind::Sell, "EMA crossed below SMA", SignalTag::EmaCross)
            });
        }
        prev_above = Some(above);
    }
    out
}

/// MACD line crossing its signal line.
pub fn macd_cross_signals(bars: &[Bar], settings: &SignalSettings) -> Vec<TradeSignal> {
    let (fast, slow, signal_period) = settings.macd;
    let macd = compute_indicator(
        bars,
        &IndicatorType::Macd {
            fast,
            slow,
            signal: signal_period,
        },
    );
    let mut out = Vec::new();
    let mut prev_diff: Option<f64> = None;
    for (i, bar) in bars.iter().enumerate() {
        let (Some(line), Some(sig)) = (
            value(&macd, i, IndicatorField::Value),
            value(&macd, i, IndicatorField::Signal),
        ) else {
            prev_diff = None;
            continue;
        };
        let diff = line - sig;
        if let Some(prev) = prev_diff {
            if prev <= 0.0 && diff > 0.0 {
                out.push(signal(
                    bar,
                    SignalKind::Buy,
                    "MACD crossed above signal",
                    SignalTag::MacdCross,
                ));
            } else if prev >= 0.0 && diff < 0.0 {
                out.push(signal(
                    bar,
                    SignalKind::Sell,
                    "MACD crossed below signal",
                    SignalTag::MacdCross,
                ));
            }
        }
        prev_diff = Some(diff);
    }
    out
}

/// RSI climbing back through the oversold level or falling back through the
/// overbought level.
pub fn rsi_level_signals(bars: &[Bar], settings: &SignalSettings) -> Vec<TradeSignal> {
    let rsi = compute_indicator(bars, &IndicatorType::Rsi(settings.rsi_period));
    let (low, high) = (settings.rsi_low, settings.rsi_high);
    let mut out = Vec::new();
    let mut prev: Option<f64> = None;
    for (i, bar) in bars.iter().enumerate() {
        let Some(v) = value(&rsi, i, IndicatorField::Value) else {
            prev = None;
            continue;
        };
        if let Some(p) = prev {
            if p < low && low <= v {
                out.push(signal(
                    bar,
                    SignalKind::Buy,
                    format!("RSI crossed up {}", low),
                    SignalTag::RsiLevels,
                ));
            }
            if p > high && high >= v {
                out.push(signal(
                    bar,
                    SignalKind::Sell,
                    format!("RSI crossed down {}", high),
                    SignalTag::RsiLevels,
                ));
            }
        }
        prev = Some(v);
    }
    out
}

/// Close returning inside the Bollinger bands after closing outside them.
pub fn bollinger_touch_signals(bars: &[Bar], settings: &SignalSettings) -> Vec<TradeSignal> {
    let bands = compute_indicator(
        bars,
        &IndicatorType::Bollinger {
            period: settings.bollinger_period,
            stddev_mult_x100: settings.bollinger_mult_x100,
        },
    );
    let mut out = Vec::new();
    let mut was_below = false;
    let mut was_above = false;
    for (i, bar) in bars.iter().enumerate() {
        let (Some(upper), Some(lower)) = (
            value(&bands, i, IndicatorField::Upper),
            value(&bands, i, IndicatorField::Lower),
        ) else {
            was_below = false;
            was_above = false;
            continue;
        };
        let close = bar.close;

        if close < lower {
            was_below = true;
        } else if was_below {
            out.push(signal(
                bar,
                SignalKind::Buy,
                "Re-entered from below lower Bollinger band",
                SignalTag::BbTouch,
            ));
            was_below = false;
        }

        if close > upper {
            was_above = true;
        } else if was_above {
            out.push(signal(
                bar,
                SignalKind::Sell,
                "Re-entered from above upper Bollinger band",
                SignalTag::BbTouch,
            ));
            was_above = false;
        }
    }
    out
}

/// All four generators merged, ordered by time. Ties keep generator order.
pub fn combined_signals(bars: &[Bar], settings: &SignalSettings) -> Vec<TradeSignal> {
    if bars.is_empty() {
        return Vec::new();
    }
    let mut out = ema_sma_cross_signals(bars, settings);
    out.extend(macd_cross_signals(bars, settings));
    out.extend(rsi_level_signals(bars, settings));
    out.extend(bollinger_touch_signals(bars, settings));
    out.sort_by_key(|s| s.time);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn time(i: usize) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + chrono::Duration::days(i as i64)
    }

    fn make_bars(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::new(time(i), c, c + 0.5, c - 0.5, c).with_volume(1000.0))
            .collect()
    }

    fn v_shape() -> Vec<f64> {
        let mut closes: Vec<f64> = (0..40).map(|i| 140.0 - i as f64).collect();
        closes.extend((0..40).map(|i| 101.0 + i as f64));
        closes
    }

    fn small() -> SignalSettings {
        SignalSettings {
            sma_period: 5,
            ema_period: 3,
            macd: (3, 6, 3),
            rsi_period: 5,
            bollinger_period: 5,
            ..SignalSettings::default()
        }
    }

    #[test]
    fn ema_cross_on_reversal() {
        let signals = ema_sma_cross_signals(&make_bars(&v_shape()), &small());
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].kind, SignalKind::Buy);
        assert_eq!(signals[0].tag, SignalTag::EmaCross);
        assert!(signals[0].time > time(40));
    }

    #[test]
    fn macd_cross_on_reversal() {
        let signals = macd_cross_signals(&make_bars(&v_shape()), &small());
        assert!(signals.iter().any(|s| s.kind == SignalKind::Buy));
        assert!(signals.iter().all(|s| s.tag == SignalTag::MacdCross));
    }

    #[test]
    fn rsi_leaves_oversold() {
        let signals = rsi_level_signals(&make_bars(&v_shape()), &small());
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].kind, SignalKind::Buy);
        assert_eq!(signals[0].reason, "RSI crossed up 30");
    }

    #[test]
    fn bollinger_re_entry() {
        let mut closes: Vec<f64> = (0..10).map(|i| 100.0 + (i % 2) as f64).collect();
        closes.extend([80.0, 100.0]);
        let settings = SignalSettings {
            bollinger_period: 10,
            ..small()
        };
        let signals = bollinger_touch_signals(&make_bars(&closes), &settings);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].kind, SignalKind::Buy);
        assert_eq!(signals[0].time, time(11));
    }

    #[test]
    fn combined_is_time_ordered() {
        let signals = combined_signals(&make_bars(&v_shape()), &small());
        assert!(signals.len() >= 3);
        assert!(signals.windows(2).all(|w| w[0].time <= w[1].time));
        assert!(combined_signals(&[], &small()).is_empty());
    }

    #[test]
    fn flat_market_is_silent() {
        assert!(combined_signals(&make_bars(&[100.0; 60]), &SignalSettings::default()).is_empty());
    }
}
