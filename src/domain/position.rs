//! Portfolio positions: open or closed, long or short.

use chrono::NaiveDateTime;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short.
    pub fn sign(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Serialize)]
pub struct Position {
    pub id: String,
    pub portfolio_id: String,
    pub symbol: String,
    pub side: Side,
    /// Whole shares, always positive; direction lives in `side`.
    pub quantity: f64,
    pub entry_price: f64,
    pub entry_time: NaiveDateTime,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub current_price: f64,
    pub unrealized_pnl: f64,
    pub entry_commission: f64,
    pub status: PositionStatus,
    pub exit_price: Option<f64>,
    pub exit_time: Option<NaiveDateTime>,
    pub exit_commission: Option<f64>,
    /// Net of both commissions.
    pub realized_pnl: Option<f64>,
    pub exit_reason: Option<String>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    pub fn cost(&self) -> f64 {
        self.quantity * self.entry_price
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity * price
    }

    pub fn pnl_at(&self, price: f64) -> f64 {
        self.side.sign() * self.quantity * (price - self.entry_price)
    }

    pub fn should_stop_loss(&self, price: f64) -> bool {
        match (self.stop_loss, self.side) {
            (Some(stop), Side::Long) => price <= stop,
            (Some(stop), Side::Short) => price >= stop,
            (None, _) => false,
        }
    }

    pub fn should_take_profit(&self, price: f64) -> bool {
        match (self.take_profit, self.side) {
            (Some(take), Side::Long) => price >= take,
            (Some(take), Side::Short) => price <= take,
            (None, _) => false,
        }
    }

    /// Amount lost if the stop is hit; the whole notional without a stop.
    pub fn risk_amount(&self) -> f64 {
        risk_amount(self.quantity, self.entry_price, self.stop_loss)
    }
}

pub fn risk_amount(quantity: f64, entry_price: f64, stop_loss: Option<f64>) -> f64 {
    match stop_loss {
        Some(stop) => quantity * (entry_price - stop).abs(),
        None => quantity * entry_price,
    }
}
