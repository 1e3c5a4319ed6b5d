//! Indicator dispatch: compute any `IndicatorType` over a bar slice.

use std::collections::HashMap;

use crate::domain::indicator::{IndicatorSeries, IndicatorType, momentum, trend, volatility, volume};
use crate::domain::ohlcv::Bar;

fn unscale(value: u32, factor: f64) -> f64 {
    value as f64 / factor
}

/// Compute a single indicator series.
pub fn compute_indicator(bars: &[Bar], indicator: &IndicatorType) -> IndicatorSeries {
    match *indicator {
        IndicatorType::Sma(p) => trend::calculate_sma(bars, p),
        IndicatorType::Ema(p) => trend::calculate_ema(bars, p),
        IndicatorType::Wma(p) => trend::calculate_wma(bars, p),
        IndicatorType::Hma(p) => trend::calculate_hma(bars, p),
        IndicatorType::Dema(p) => trend::calculate_dema(bars, p),
        IndicatorType::Tema(p) => trend::calculate_tema(bars, p),
        IndicatorType::Vwma(p) => trend::calculate_vwma(bars, p),
        IndicatorType::Macd { fast, slow, signal } => {
            trend::calculate_macd(bars, fast, slow, signal)
        }
        IndicatorType::Adx(p) => trend::calculate_adx(bars, p),
        IndicatorType::Aroon(p) => trend::calculate_aroon(bars, p),
        IndicatorType::Psar {
            step_x1000,
            max_x1000,
        } => trend::calculate_psar(
            bars,
            unscale(step_x1000, 1000.0),
            unscale(max_x1000, 1000.0),
        ),
        IndicatorType::SuperTrend { period, mult_x100 } => {
            trend::calculate_supertrend(bars, period, unscale(mult_x100, 100.0))
        }
        IndicatorType::LinearRegression(p) => trend::calculate_linear_regression(bars, p),
        IndicatorType::PolynomialRegression { period, degree } => {
            trend::calculate_polynomial_regression(bars, period, degree)
        }
        IndicatorType::Ichimoku {
            tenkan,
            kijun,
            senkou,
        } => trend::calculate_ichimoku(bars, tenkan, kijun, senkou),
        IndicatorType::Pivot => trend::calculate_pivot_points(bars),
        IndicatorType::Rsi(p) => momentum::calculate_rsi(bars, p),
        IndicatorType::Stochastic {
            k_period,
            d_period,
            smooth,
        } => momentum::calculate_stochastic(bars, k_period, d_period, smooth),
        IndicatorType::StochRsi {
            rsi_period,
            stoch_period,
            k_smooth,
            d_smooth,
        } => momentum::calculate_stoch_rsi(bars, rsi_period, stoch_period, k_smooth, d_smooth),
        IndicatorType::WilliamsR(p) => momentum::calculate_williams_r(bars, p),
        IndicatorType::Roc(p) => momentum::calculate_roc(bars, p),
        IndicatorType::UltimateOscillator {
            short,
            medium,
            long,
        } => momentum::calculate_ultimate_oscillator(bars, short, medium, long),
        IndicatorType::Trix(p) => momentum::calculate_trix(bars, p),
        IndicatorType::Cmo(p) => momentum::calculate_cmo(bars, p),
        IndicatorType::DeMarker(p) => momentum::calculate_demarker(bars, p),
        IndicatorType::Fisher(p) => momentum::calculate_fisher(bars, p),
        IndicatorType::Stc { cycle, fast, slow } => {
            momentum::calculate_stc(bars, cycle, fast, slow)
        }
        IndicatorType::Kst => momentum::calculate_kst(bars),
        IndicatorType::Bollinger {
            period,
            stddev_mult_x100,
        } => volatility::calculate_bollinger(bars, period, unscale(stddev_mult_x100, 100.0)),
        IndicatorType::Keltner {
            period,
            atr_period,
            mult_x100,
        } => volatility::calculate_keltner(bars, period, atr_period, unscale(mult_x100, 100.0)),
        IndicatorType::Donchian(p) => volatility::calculate_donchian(bars, p),
        IndicatorType::Envelope { period, pct_x100 } => {
            volatility::calculate_envelope(bars, period, unscale(pct_x100, 100.0))
        }
        IndicatorType::Atr(p) => volatility::calculate_atr(bars, p),
        IndicatorType::Natr(p) => volatility::calculate_natr(bars, p),
        IndicatorType::VolatilityStop { period, mult_x100 } => {
            volatility::calculate_volatility_stop(bars, period, unscale(mult_x100, 100.0))
        }
        IndicatorType::HistoricalVolatility(p) => {
            volatility::calculate_historical_volatility(bars, p)
        }
        IndicatorType::ChaikinVolatility { period, roc_period } => {
            volatility::calculate_chaikin_volatility(bars, period, roc_period)
        }
        IndicatorType::Choppiness(p) => volatility::calculate_choppiness(bars, p),
        IndicatorType::Vhf(p) => volatility::calculate_vhf(bars, p),
        IndicatorType::Stddev(p) => volatility::calculate_stddev(bars, p),
        IndicatorType::Obv => volume::calculate_obv(bars),
        IndicatorType::Vpt => volume::calculate_vpt(bars),
        IndicatorType::Mfi(p) => volume::calculate_mfi(bars, p),
        IndicatorType::AdLine => volume::calculate_ad_line(bars),
        IndicatorType::ChaikinOscillator { fast, slow } => {
            volume::calculate_chaikin_oscillator(bars, fast, slow)
        }
        IndicatorType::Vwap => volume::calculate_vwap(bars),
        IndicatorType::Klinger { fast, slow, signal } => {
            volume::calculate_klinger(bars, fast, slow, signal)
        }
        IndicatorType::ForceIndex(p) => volume::calculate_force_index(bars, p),
        IndicatorType::EaseOfMovement(p) => volume::calculate_ease_of_movement(bars, p),
    }
}

/// Compute every requested indicator once, keyed by type.
pub fn compute_indicators(
    bars: &[Bar],
    indicators: &[IndicatorType],
) -> HashMap<IndicatorType, IndicatorSeries> {
    let mut out = HashMap::with_capacity(indicators.len());
    for indicator in indicators {
        if !out.contains_key(indicator) {
            out.insert(indicator.clone(), compute_indicator(bars, indicator));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::IndicatorValue;
    use chrono::NaiveDate;

    fn make_bars(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.3).sin() * 5.0 + i as f64 * 0.1;
                let time = NaiveDate::from_ymd_opt(2023, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap()
                    + chrono::Duration::days(i as i64);
                Bar::new(time, close - 0.5, close + 1.5, close - 1.5, close)
                    .with_volume(1000.0 + i as f64)
            })
            .collect()
    }

    fn catalogue() -> Vec<IndicatorType> {
        [
            "SMA", "EMA", "WMA", "HMA", "DEMA", "TEMA", "VWMA", "MACD", "ADX", "AROON", "PSAR",
            "SUPERTREND", "LINREG", "POLYREG", "ICHIMOKU", "PIVOT", "RSI", "STOCHASTIC", "STOCHRSI",
            "WILLR", "ROC", "ULTOSC", "TRIX", "CMO", "DEMARKER", "FISHER", "STC", "KST",
            "BOLLINGER", "KELTNER", "DONCHIAN", "ENVELOPE", "ATR", "NATR", "VOLSTOP", "HV",
            "CHAIKINVOL", "CHOP", "VHF", "STDDEV", "OBV", "VPT", "MFI", "AD", "CHAIKINOSC", "VWAP",
            "KLINGER", "FORCE", "EOM",
        ]
        .iter()
        .map(|name| IndicatorType::from_parts(name, &[]).unwrap())
        .collect()
    }

    #[test]
    fn every_indicator_matches_its_declared_shape() {
        let bars = make_bars(250);
        for indicator in catalogue() {
            let series = compute_indicator(&bars, &indicator);
            assert!(!series.is_empty(), "{} produced no values", indicator);
            assert_eq!(series.indicator_type, indicator);
            assert_eq!(series.source_len, bars.len());
            for point in &series.values {
                assert_eq!(point.value.shape(), indicator.shape(), "{}", indicator);
                assert!(point.value.primary().is_finite(), "{}", indicator);
            }
        }
    }

    #[test]
    fn every_indicator_is_empty_on_tiny_input() {
        let bars = make_bars(1);
        for indicator in catalogue() {
            let series = compute_indicator(&bars, &indicator);
            // cumulative indicators still produce a value per bar
            assert!(series.len() <= 1, "{}", indicator);
        }
    }

    #[test]
    fn indicators_are_causal() {
        let bars = make_bars(120);
        let prefix = &bars[..100];
        for indicator in catalogue() {
            let full = compute_indicator(&bars, &indicator);
            let partial = compute_indicator(prefix, &indicator);
            for i in 0..prefix.len() {
                assert_eq!(
                    full.point_at(i).map(|p| p.value),
                    partial.point_at(i).map(|p| p.value),
                    "{} differs at bar {}",
                    indicator,
                    i
                );
            }
        }
    }

    #[test]
    fn compute_indicators_dedups() {
        let bars = make_bars(50);
        let map = compute_indicators(
            &bars,
            &[IndicatorType::Sma(5), IndicatorType::Sma(5), IndicatorType::Rsi(14)],
        );
        assert_eq!(map.len(), 2);
        let sma = &map[&IndicatorType::Sma(5)];
        assert!(matches!(sma.values[0].value, IndicatorValue::Simple(_)));
    }
}
