//! Position sizing methods and portfolio risk settings.

use std::fmt;

use serde::Serialize;

/// Share of the full Kelly fraction actually committed.
pub const KELLY_FRACTION_CAP: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingMethod {
    FixedPercent,
    Volatility,
    RiskParity,
    Kelly,
    EqualWeight,
}

impl SizingMethod {
    pub fn all() -> &'static [SizingMethod] {
        &[
            SizingMethod::FixedPercent,
            SizingMethod::Volatility,
            SizingMethod::RiskParity,
            SizingMethod::Kelly,
            SizingMethod::EqualWeight,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            SizingMethod::FixedPercent => "fixed_percent",
            SizingMethod::Volatility => "volatility",
            SizingMethod::RiskParity => "risk_parity",
            SizingMethod::Kelly => "kelly",
            SizingMethod::EqualWeight => "equal_weight",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_ascii_lowercase();
        Self::all().iter().copied().find(|m| m.name() == lower)
    }
}

impl fmt::Display for SizingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sizing and risk limits for one portfolio.
///
/// A position without a stop risks its whole notional, so under the defaults
/// (`base_size` 0.10 against `max_position_risk` 0.02) an unstopped request is
/// rejected. Raise `max_position_risk` to at least `base_size` to allow them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskSettings {
    pub sizing_method: SizingMethod,
    /// Capital fraction for `fixed_percent`.
    pub base_size: f64,
    pub min_size: f64,
    /// Cap on one position's notional, as a fraction of available capital.
    pub max_position_value: f64,
    /// Largest loss at the stop for one position, as a fraction of current capital.
    pub max_position_risk: f64,
    pub max_portfolio_risk: f64,
    pub max_positions: usize,
    pub commission: f64,
    pub atr_multiple: f64,
}

impl Default for RiskSettings {
    fn default() -> Self {
        RiskSettings {
            sizing_method: SizingMethod::FixedPercent,
            base_size: 0.10,
            min_size: 1.0,
            max_position_value: 0.25,
            max_position_risk: 0.02,
            max_portfolio_risk: 0.10,
            max_positions: 10,
            commission: 0.001,
            atr_multiple: 2.0,
        }
    }
}

/// Per-trade inputs some sizing methods need.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SizingInputs {
    pub entry_price: f64,
    pub stop_loss: Option<f64>,
    pub atr: Option<f64>,
    /// Fraction of winning trades, 0..1.
    pub win_rate: Option<f64>,
    /// Average win over average loss.
    pub win_loss_ratio: Option<f64>,
}

/// Unclamped share count for `method`. Methods missing their inputs fall back
/// to `fixed_percent`.
pub fn raw_size(
    method: SizingMethod,
    settings: &RiskSettings,
    available_capital: f64,
    current_capital: f64,
    inputs: &SizingInputs,
) -> f64 {
    let price = inputs.entry_price;
    let fixed = available_capital * settings.base_size / price;
    match method {
        SizingMethod::FixedPercent => fixed,
        SizingMethod::Volatility => match inputs.atr {
            Some(atr) if atr > 0.0 && settings.atr_multiple > 0.0 => {
                available_capital * settings.max_position_risk / (atr * settings.atr_multiple)
            }
            _ => fixed,
        },
        SizingMethod::RiskParity => match inputs.stop_loss {
            Some(stop) if (price - stop).abs() > 0.0 => {
                available_capital * settings.max_position_risk / (price - stop).abs()
            }
            _ => fixed,
        },
        SizingMethod::Kelly => match (inputs.win_rate, inputs.win_loss_ratio) {
            (Some(w), Some(r)) if r > 0.0 => {
                let kelly = (w - (1.0 - w) / r).max(0.0);
                available_capital * kelly * KELLY_FRACTION_CAP / price
            }
            _ => fixed,
        },
        SizingMethod::EqualWeight if settings.max_positions > 0 => {
            current_capital / settings.max_positions as f64 / price
        }
        SizingMethod::EqualWeight => fixed,
    }
}

/// Whole-share position size after clamping to `[min_size, max value / price]`.
///
/// Returns 0 when the price is not positive or the minimum size is unaffordable.
pub fn calculate_position_size(
    settings: &RiskSettings,
    available_capital: f64,
    current_capital: f64,
    inputs: &SizingInputs,
) -> f64 {
    let price = inputs.entry_price;
    if price <= 0.0 || available_capital <= 0.0 {
        return 0.0;
    }
    let raw = raw_size(
        settings.sizing_method,
        settings,
        available_capital,
        current_capital,
        inputs,
    );
    if !raw.is_finite() {
        return 0.0;
    }
    let max_shares = (available_capital * settings.max_position_value / price).floor();
    let size = raw.floor().min(max_shares);
    if size >= settings.min_size {
        size
    } else if settings.min_size * price <= available_capital {
        settings.min_size
    } else {
        0.0
    }
}
