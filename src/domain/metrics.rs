//! Performance metrics over a trade list and an equity curve.
//!
//! Shared by backtest results and portfolio performance. Percentages are
//! expressed in percent (12.5 means 12.5%) and every figure is rounded to two
//! decimal places.

use chrono::NaiveDateTime;
use serde::Serialize;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const CALENDAR_DAYS_PER_YEAR: f64 = 365.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EquityPoint {
    pub date: NaiveDateTime,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub calmar_ratio: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub final_capital: f64,
}

pub fn round2(value: f64) -> f64 {
    if value.is_finite() {
        (value * 100.0).round() / 100.0
    } else {
        0.0
    }
}

impl PerformanceMetrics {
    /// `pnls` are the net results of closed trades; `equity` is the curve the
    /// return, drawdown and Sharpe figures are measured on.
    pub fn compute(
        initial_capital: f64,
        final_capital: f64,
        pnls: &[f64],
        equity: &[EquityPoint],
    ) -> Self {
        let total_return = if initial_capital > 0.0 {
            (final_capital - initial_capital) / initial_capital * 100.0
        } else {
            0.0
        };

        let days = match (equity.first(), equity.last()) {
            (Some(first), Some(last)) => (last.date - first.date).num_days(),
            _ => 0,
        };
        let annualized_return = if days > 0 {
            total_return * CALENDAR_DAYS_PER_YEAR / days as f64
        } else {
            0.0
        };

        let max_drawdown = compute_max_drawdown(equity) * 100.0;
        let sharpe_ratio = compute_sharpe(equity);
        let calmar_ratio = if max_drawdown > 0.0 {
            annualized_return / max_drawdown
        } else {
            0.0
        };

        let mut winning_trades = 0usize;
        let mut losing_trades = 0usize;
        let mut gross_profit = 0.0_f64;
        let mut gross_loss = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;
        for &pnl in pnls {
            if pnl > 0.0 {
                winning_trades += 1;
                gross_profit += pnl;
                largest_win = largest_win.max(pnl);
            } else if pnl < 0.0 {
                losing_trades += 1;
                gross_loss += pnl.abs();
                largest_loss = largest_loss.max(pnl.abs());
            }
        }

        let total_trades = pnls.len();
        let win_rate = if total_trades > 0 {
            winning_trades as f64 / total_trades as f64 * 100.0
        } else {
            0.0
        };
        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else {
            0.0
        };
        let avg_win = if winning_trades > 0 {
            gross_profit / winning_trades as f64
        } else {
            0.0
        };
        let avg_loss = if losing_trades > 0 {
            gross_loss / losing_trades as f64
        } else {
            0.0
        };

        PerformanceMetrics {
            total_return: round2(total_return),
            annualized_return: round2(annualized_return),
            sharpe_ratio: round2(sharpe_ratio),
            max_drawdown: round2(max_drawdown),
            calmar_ratio: round2(calmar_ratio),
            total_trades,
            winning_trades,
            losing_trades,
            win_rate: round2(win_rate),
            profit_factor: round2(profit_factor),
            avg_win: round2(avg_win),
            avg_loss: round2(avg_loss),
            largest_win: round2(largest_win),
            largest_loss: round2(largest_loss),
            final_capital: round2(final_capital),
        }
    }
}

/// Largest peak-to-trough decline as a fraction of the peak.
pub fn compute_max_drawdown(equity: &[EquityPoint]) -> f64 {
    let Some(first) = equity.first() else {
        return 0.0;
    };
    let mut peak = first.value;
    let mut max_dd = 0.0_f64;
    for point in equity {
        if point.value > peak {
            peak = point.value;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - point.value) / peak);
        }
    }
    max_dd
}

/// `mean / stddev` of period-over-period returns, annualized with √252.
pub fn compute_sharpe(equity: &[EquityPoint]) -> f64 {
    if equity.len() < 2 {
        return 0.0;
    }
    let returns: Vec<f64> = equity
        .windows(2)
        .map(|w| {
            if w[0].value > 0.0 {
                (w[1].value - w[0].value) / w[0].value
            } else {
                0.0
            }
        })
        .collect();

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    if stddev > 0.0 {
        mean / stddev * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    }
}
