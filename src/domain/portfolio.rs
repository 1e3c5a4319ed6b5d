//! Portfolio capital accounting, position lifecycle and performance.
//!
//! Capital figures:
//! - `current_capital`: initial capital plus realized P&L less commissions paid
//! - `available_capital`: cash not tied up in open positions
//!
//! Every capital movement is appended to the portfolio's cash-flow ledger, and
//! performance is recomputed from that ledger after each close.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::backtest::ExitReason;
use crate::domain::error::TradelabError;
use crate::domain::metrics::{EquityPoint, PerformanceMetrics};
use crate::domain::position::{Position, PositionStatus, Side, risk_amount};
use crate::domain::sizing::{RiskSettings, SizingInputs, calculate_position_size};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CashFlowKind {
    Deposit,
    Open,
    Close,
    Commission,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CashFlow {
    pub time: NaiveDateTime,
    pub kind: CashFlowKind,
    /// Signed change in available cash.
    pub amount: f64,
    pub position_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Portfolio {
    pub id: String,
    pub name: String,
    pub created: NaiveDateTime,
    pub initial_capital: f64,
    pub current_capital: f64,
    pub available_capital: f64,
    pub risk: RiskSettings,
    pub open_positions: Vec<String>,
    pub closed_positions: Vec<String>,
    pub cash_flows: Vec<CashFlow>,
    pub performance: PerformanceMetrics,
}

impl Portfolio {
    fn record(
        &mut self,
        time: NaiveDateTime,
        kind: CashFlowKind,
        amount: f64,
        position: Option<&str>,
    ) {
        self.available_capital += amount;
        self.cash_flows.push(CashFlow {
            time,
            kind,
            amount,
            position_id: position.map(str::to_string),
        });
    }

    /// Realized equity after each close, starting from the deposit.
    pub fn equity_points(&self) -> Vec<EquityPoint> {
        let mut points = Vec::new();
        let mut open_costs: HashMap<&str, f64> = HashMap::new();
        let mut equity = 0.0;
        let mut closing = false;
        for flow in &self.cash_flows {
            match flow.kind {
                CashFlowKind::Deposit => {
                    equity += flow.amount;
                    points.push(EquityPoint {
                        date: flow.time,
                        value: equity,
                    });
                }
                CashFlowKind::Open => {
                    if let Some(id) = flow.position_id.as_deref() {
                        open_costs.insert(id, -flow.amount);
                    }
                }
                CashFlowKind::Close => {
                    let cost = flow
                        .position_id
                        .as_deref()
                        .and_then(|id| open_costs.remove(id))
                        .unwrap_or(0.0);
                    equity += flow.amount - cost;
                    closing = true;
                }
                CashFlowKind::Commission => {
                    equity += flow.amount;
                    // exit commission completes a close
                    if closing {
                        points.push(EquityPoint {
                            date: flow.time,
                            value: equity,
                        });
                        closing = false;
                    }
                }
            }
        }
        points
    }
}

/// A request to open a position. `quantity: None` sizes it with the
/// portfolio's sizing method.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionRequest {
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub time: NaiveDateTime,
    pub quantity: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub atr: Option<f64>,
    pub win_rate: Option<f64>,
    pub win_loss_ratio: Option<f64>,
}

impl PositionRequest {
    pub fn new(
        symbol: impl Into<String>,
        side: Side,
        entry_price: f64,
        time: NaiveDateTime,
    ) -> Self {
        PositionRequest {
            symbol: symbol.into(),
            side,
            entry_price,
            time,
            quantity: None,
            stop_loss: None,
            take_profit: None,
            atr: None,
            win_rate: None,
            win_loss_ratio: None,
        }
    }

    fn sizing_inputs(&self) -> SizingInputs {
        SizingInputs {
            entry_price: self.entry_price,
            stop_loss: self.stop_loss,
            atr: self.atr,
            win_rate: self.win_rate,
            win_loss_ratio: self.win_loss_ratio,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionExit {
    pub position_id: String,
    pub price: f64,
    pub reason: ExitReason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSummary {
    pub id: String,
    pub name: String,
    pub initial_capital: f64,
    pub current_capital: f64,
    pub available_capital: f64,
    pub exposure: f64,
    pub unrealized_pnl: f64,
    pub total_value: f64,
    pub open_positions: usize,
    pub closed_positions: usize,
    pub performance: PerformanceMetrics,
}

#[derive(Debug, Default)]
pub struct PortfolioManager {
    portfolios: HashMap<String, Portfolio>,
    positions: HashMap<String, Position>,
    next_portfolio: usize,
    next_position: usize,
}

impl PortfolioManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_portfolio(
        &mut self,
        name: &str,
        initial_capital: f64,
        risk: RiskSettings,
        time: NaiveDateTime,
    ) -> Result<String, TradelabError> {
        if !(initial_capital.is_finite() && initial_capital > 0.0) {
            return Err(TradelabError::ConfigInvalid {
                section: "portfolio".into(),
                key: "initial_capital".into(),
                reason: format!("must be positive, got {}", initial_capital),
            });
        }
        self.next_portfolio += 1;
        let id = format!("portfolio_{}", self.next_portfolio);
        let mut portfolio = Portfolio {
            id: id.clone(),
            name: name.to_string(),
            created: time,
            initial_capital,
            current_capital: initial_capital,
            available_capital: 0.0,
            risk,
            open_positions: Vec::new(),
            closed_positions: Vec::new(),
            cash_flows: Vec::new(),
            performance: PerformanceMetrics {
                final_capital: initial_capital,
                ..PerformanceMetrics::default()
            },
        };
        portfolio.record(time, CashFlowKind::Deposit, initial_capital, None);
        info!(portfolio = %id, name, initial_capital, "portfolio created");
        self.portfolios.insert(id.clone(), portfolio);
        Ok(id)
    }

    pub fn get_portfolio(&self, id: &str) -> Result<&Portfolio, TradelabError> {
        self.portfolios
            .get(id)
            .ok_or_else(|| TradelabError::UnknownPortfolio { id: id.to_string() })
    }

    fn portfolio_mut(&mut self, id: &str) -> Result<&mut Portfolio, TradelabError> {
        self.portfolios
            .get_mut(id)
            .ok_or_else(|| TradelabError::UnknownPortfolio { id: id.to_string() })
    }

    pub fn get_position(&self, id: &str) -> Result<&Position, TradelabError> {
        self.positions
            .get(id)
            .ok_or_else(|| TradelabError::UnknownPosition { id: id.to_string() })
    }

    fn open_positions<'a>(
        &'a self,
        portfolio: &'a Portfolio,
    ) -> impl Iterator<Item = &'a Position> {
        portfolio
            .open_positions
            .iter()
            .filter_map(|id| self.positions.get(id))
    }

    /// Share count the portfolio would commit to `request`.
    pub fn size_position(
        &self,
        portfolio_id: &str,
        request: &PositionRequest,
    ) -> Result<f64, TradelabError> {
        let portfolio = self.get_portfolio(portfolio_id)?;
        Ok(match request.quantity {
            Some(q) => q.floor(),
            None => calculate_position_size(
                &portfolio.risk,
                portfolio.available_capital,
                portfolio.current_capital,
                &request.sizing_inputs(),
            ),
        })
    }

    fn check_position(
        &self,
        portfolio: &Portfolio,
        request: &PositionRequest,
        quantity: f64,
    ) -> Result<(), String> {
        let risk = &portfolio.risk;
        if !(quantity >= 1.0 && request.entry_price > 0.0) {
            return Err(format!(
                "no tradable size for {} at {}",
                request.symbol, request.entry_price
            ));
        }
        let cost = quantity * request.entry_price;
        let total = cost * (1.0 + risk.commission);
        if total > portfolio.available_capital {
            return Err(format!(
                "cost {:.2} exceeds available capital {:.2}",
                total, portfolio.available_capital
            ));
        }
        if portfolio.open_positions.len() >= risk.max_positions {
            return Err(format!("already holding {} positions", risk.max_positions));
        }
        let position_risk = risk_amount(quantity, request.entry_price, request.stop_loss)
            / portfolio.current_capital;
        if position_risk > risk.max_position_risk {
            return Err(format!(
                "position risk {:.4} exceeds {:.4}",
                position_risk, risk.max_position_risk
            ));
        }
        let open_risk: f64 = self
            .open_positions(portfolio)
            .map(|p| p.risk_amount() / portfolio.current_capital)
            .sum();
        if open_risk + position_risk > risk.max_portfolio_risk {
            return Err(format!(
                "portfolio risk {:.4} exceeds {:.4}",
                open_risk + position_risk,
                risk.max_portfolio_risk
            ));
        }
        Ok(())
    }

    /// Whether `request` passes every risk check. Rejections are logged, not raised.
    pub fn validate_position(
        &self,
        portfolio_id: &str,
        request: &PositionRequest,
    ) -> Result<bool, TradelabError> {
        let portfolio = self.get_portfolio(portfolio_id)?;
        let quantity = self.size_position(portfolio_id, request)?;
        match self.check_position(portfolio, request, quantity) {
            Ok(()) => Ok(true),
            Err(reason) => {
                warn!(
                    portfolio = portfolio_id,
                    symbol = %request.symbol,
                    %reason,
                    "position rejected"
                );
                Ok(false)
            }
        }
    }

    /// Open a position, deducting its cost and entry commission from available capital.
    pub fn add_position(
        &mut self,
        portfolio_id: &str,
        request: &PositionRequest,
    ) -> Result<String, TradelabError> {
        let quantity = self.size_position(portfolio_id, request)?;
        let portfolio = self.get_portfolio(portfolio_id)?;
        self.check_position(portfolio, request, quantity)
            .map_err(|reason| TradelabError::PositionRejected { reason })?;

        self.next_position += 1;
        let id = format!("position_{}", self.next_position);
        let cost = quantity * request.entry_price;
        let portfolio = self.portfolio_mut(portfolio_id)?;
        let commission = cost * portfolio.risk.commission;
        portfolio.record(request.time, CashFlowKind::Open, -cost, Some(&id));
        portfolio.record(request.time, CashFlowKind::Commission, -commission, Some(&id));
        portfolio.current_capital -= commission;
        portfolio.open_positions.push(id.clone());

        info!(
            portfolio = portfolio_id,
            position = %id,
            symbol = %request.symbol,
            quantity,
            price = request.entry_price,
            "position opened"
        );
        self.positions.insert(
            id.clone(),
            Position {
                id: id.clone(),
                portfolio_id: portfolio_id.to_string(),
                symbol: request.symbol.clone(),
                side: request.side,
                quantity,
                entry_price: request.entry_price,
                entry_time: request.time,
                stop_loss: request.stop_loss,
                take_profit: request.take_profit,
                current_price: request.entry_price,
                unrealized_pnl: 0.0,
                entry_commission: commission,
                status: PositionStatus::Open,
                exit_price: None,
                exit_time: None,
                exit_commission: None,
                realized_pnl: None,
                exit_reason: None,
            },
        );
        Ok(id)
    }

    /// Close an open position at `price` and recompute portfolio performance.
    pub fn close_position(
        &mut self,
        position_id: &str,
        price: f64,
        time: NaiveDateTime,
        reason: &str,
    ) -> Result<&Position, TradelabError> {
        let position = self
            .positions
            .get_mut(position_id)
            .ok_or_else(|| TradelabError::UnknownPosition {
                id: position_id.to_string(),
            })?;
        if !position.is_open() {
            return Err(TradelabError::PositionRejected {
                reason: format!("{} is already closed", position_id),
            });
        }

        let gross = position.pnl_at(price);
        let cost = position.cost();
        let portfolio_id = position.portfolio_id.clone();
        let portfolio = self
            .portfolios
            .get_mut(&portfolio_id)
            .ok_or_else(|| TradelabError::UnknownPortfolio {
                id: portfolio_id.clone(),
            })?;
        let exit_commission = position.market_value(price) * portfolio.risk.commission;

        position.status = PositionStatus::Closed;
        position.exit_price = Some(price);
        position.exit_time = Some(time);
        position.exit_commission = Some(exit_commission);
        position.current_price = price;
        position.unrealized_pnl = 0.0;
        position.realized_pnl = Some(gross - position.entry_commission - exit_commission);
        position.exit_reason = Some(reason.to_string());

        portfolio.record(time, CashFlowKind::Close, cost + gross, Some(position_id));
        portfolio.record(time, CashFlowKind::Commission, -exit_commission, Some(position_id));
        portfolio.current_capital += gross - exit_commission;
        portfolio.open_positions.retain(|id| id != position_id);
        portfolio.closed_positions.push(position_id.to_string());

        info!(
            portfolio = %portfolio_id,
            position = position_id,
            price,
            pnl = gross - position.entry_commission - exit_commission,
            reason,
            "position closed"
        );
        self.update_portfolio_performance(&portfolio_id)?;
        self.get_position(position_id)
    }

    /// Recompute metrics from the closed positions and the cash-flow ledger.
    pub fn update_portfolio_performance(
        &mut self,
        portfolio_id: &str,
    ) -> Result<&PerformanceMetrics, TradelabError> {
        let portfolio = self.get_portfolio(portfolio_id)?;
        let pnls: Vec<f64> = portfolio
            .closed_positions
            .iter()
            .filter_map(|id| self.positions.get(id))
            .filter_map(|p| p.realized_pnl)
            .collect();
        let metrics = PerformanceMetrics::compute(
            portfolio.initial_capital,
            portfolio.current_capital,
            &pnls,
            &portfolio.equity_points(),
        );
        let portfolio = self.portfolio_mut(portfolio_id)?;
        portfolio.performance = metrics;
        Ok(&portfolio.performance)
    }

    /// Mark open positions to the given prices; symbols without a price keep their last mark.
    pub fn update_prices(
        &mut self,
        portfolio_id: &str,
        prices: &HashMap<String, f64>,
    ) -> Result<(), TradelabError> {
        let open = self.get_portfolio(portfolio_id)?.open_positions.clone();
        for id in open {
            if let Some(position) = self.positions.get_mut(&id)
                && let Some(&price) = prices.get(&position.symbol)
            {
                position.current_price = price;
                position.unrealized_pnl = position.pnl_at(price);
            }
        }
        Ok(())
    }

    /// Open positions whose current price hits a stop or target. Stops win.
    pub fn check_exits(&self, portfolio_id: &str) -> Result<Vec<PositionExit>, TradelabError> {
        let portfolio = self.get_portfolio(portfolio_id)?;
        Ok(self
            .open_positions(portfolio)
            .filter_map(|p| {
                let reason = if p.should_stop_loss(p.current_price) {
                    ExitReason::StopLoss
                } else if p.should_take_profit(p.current_price) {
                    ExitReason::TakeProfit
                } else {
                    return None;
                };
                Some(PositionExit {
                    position_id: p.id.clone(),
                    price: p.current_price,
                    reason,
                })
            })
            .collect())
    }

    pub fn portfolio_summary(&self, portfolio_id: &str) -> Result<PortfolioSummary, TradelabError> {
        let portfolio = self.get_portfolio(portfolio_id)?;
        let (exposure, unrealized_pnl) = self
            .open_positions(portfolio)
            .fold((0.0, 0.0), |(exp, pnl), p| {
                (exp + p.market_value(p.current_price), pnl + p.unrealized_pnl)
            });
        Ok(PortfolioSummary {
            id: portfolio.id.clone(),
            name: portfolio.name.clone(),
            initial_capital: portfolio.initial_capital,
            current_capital: portfolio.current_capital,
            available_capital: portfolio.available_capital,
            exposure,
            unrealized_pnl,
            total_value: portfolio.current_capital + unrealized_pnl,
            open_positions: portfolio.open_positions.len(),
            closed_positions: portfolio.closed_positions.len(),
            performance: portfolio.performance.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sizing::SizingMethod;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn setup() -> (PortfolioManager, String) {
        let mut manager = PortfolioManager::new();
        let id = manager
            .create_portfolio("main", 10_000.0, RiskSettings::default(), day(1))
            .unwrap();
        (manager, id)
    }

    fn long_request(price: f64, stop: f64, time: NaiveDateTime) -> PositionRequest {
        PositionRequest {
            stop_loss: Some(stop),
            ..PositionRequest::new("BHP", Side::Long, price, time)
        }
    }

    #[test]
    fn new_portfolio_has_deposit() {
        let (manager, id) = setup();
        let p = manager.get_portfolio(&id).unwrap();
        assert_eq!(id, "portfolio_1");
        assert_relative_eq!(p.available_capital, 10_000.0);
        assert_eq!(p.cash_flows.len(), 1);
        assert_eq!(p.cash_flows[0].kind, CashFlowKind::Deposit);
        assert_eq!(p.performance.final_capital, 10_000.0);
    }

    #[test]
    fn rejects_non_positive_capital() {
        let mut manager = PortfolioManager::new();
        assert!(matches!(
            manager.create_portfolio("x", 0.0, RiskSettings::default(), day(1)),
            Err(TradelabError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn fixed_percent_request_opens_twenty_shares() {
        let (mut manager, id) = setup();
        let pos_id = manager
            .add_position(&id, &long_request(50.0, 47.5, day(2)))
            .unwrap();
        let pos = manager.get_position(&pos_id).unwrap();
        assert_relative_eq!(pos.quantity, 20.0);
        assert_relative_eq!(pos.entry_commission, 1.0);

        let p = manager.get_portfolio(&id).unwrap();
        assert_relative_eq!(p.available_capital, 10_000.0 - 1_000.0 - 1.0);
        assert_relative_eq!(p.current_capital, 9_999.0);
        assert_eq!(p.open_positions, vec![pos_id]);
    }

    #[test]
    fn validation_rejects_without_raising() {
        let (mut manager, id) = setup();
        // no stop: full notional at risk
        let unstopped = PositionRequest::new("BHP", Side::Long, 50.0, day(2));
        assert!(!manager.validate_position(&id, &unstopped).unwrap());
        assert!(matches!(
            manager.add_position(&id, &unstopped),
            Err(TradelabError::PositionRejected { .. })
        ));

        let too_big = PositionRequest {
            quantity: Some(1_000.0),
            ..long_request(50.0, 49.0, day(2))
        };
        assert!(!manager.validate_position(&id, &too_big).unwrap());

        assert!(manager.validate_position(&id, &long_request(50.0, 47.5, day(2))).unwrap());
        assert!(manager.validate_position("portfolio_9", &unstopped).is_err());
    }

    #[test]
    fn unstopped_position_risks_full_notional() {
        let (manager, id) = setup();
        let unstopped = PositionRequest::new("BHP", Side::Long, 50.0, day(2));
        // 20 shares at 50 with no stop put 10% of capital at risk
        assert!(!manager.validate_position(&id, &unstopped).unwrap());

        let mut manager = PortfolioManager::new();
        let risk = RiskSettings {
            max_position_risk: 0.10,
            max_portfolio_risk: 0.20,
            ..RiskSettings::default()
        };
        let id = manager.create_portfolio("p", 10_000.0, risk, day(1)).unwrap();
        assert!(manager.validate_position(&id, &unstopped).unwrap());
        let pos_id = manager.add_position(&id, &unstopped).unwrap();
        let pos = manager.get_position(&pos_id).unwrap();
        assert_relative_eq!(pos.risk_amount(), 1_000.0);
    }

    #[test]
    fn max_positions_and_portfolio_risk() {
        let mut manager = PortfolioManager::new();
        let risk = RiskSettings {
            max_positions: 2,
            ..RiskSettings::default()
        };
        let id = manager.create_portfolio("p", 10_000.0, risk, day(1)).unwrap();
        manager.add_position(&id, &long_request(50.0, 45.0, day(2))).unwrap();
        manager.add_position(&id, &long_request(50.0, 45.0, day(2))).unwrap();
        assert!(!manager.validate_position(&id, &long_request(50.0, 45.0, day(2))).unwrap());

        let mut manager = PortfolioManager::new();
        let risk = RiskSettings {
            max_portfolio_risk: 0.015,
            ..RiskSettings::default()
        };
        let id = manager.create_portfolio("p", 10_000.0, risk, day(1)).unwrap();
        // the first position risks 20 * 5 / 10000 = 1%
        manager.add_position(&id, &long_request(50.0, 45.0, day(2))).unwrap();
        assert!(!manager.validate_position(&id, &long_request(50.0, 45.0, day(2))).unwrap());
    }

    #[test]
    fn close_realizes_pnl_and_updates_performance() {
        let (mut manager, id) = setup();
        let pos_id = manager
            .add_position(&id, &long_request(50.0, 47.5, day(2)))
            .unwrap();
        let pos = manager.close_position(&pos_id, 55.0, day(5), "signal").unwrap();
        // 20 * 5 gross, 1.0 + 1.1 commission
        assert_relative_eq!(pos.realized_pnl.unwrap(), 97.9, epsilon = 1e-9);
        assert_eq!(pos.status, PositionStatus::Closed);

        let p = manager.get_portfolio(&id).unwrap();
        assert_relative_eq!(p.current_capital, 10_097.9, epsilon = 1e-9);
        assert_relative_eq!(p.available_capital, 10_097.9, epsilon = 1e-9);
        assert!(p.open_positions.is_empty());
        assert_eq!(p.closed_positions, vec![pos_id.clone()]);
        assert_eq!(p.performance.total_trades, 1);
        assert_relative_eq!(p.performance.total_return, 0.98);

        let points = p.equity_points();
        assert_eq!(points.len(), 2);
        assert_relative_eq!(points[1].value, 10_097.9, epsilon = 1e-9);

        assert!(manager.close_position(&pos_id, 55.0, day(6), "again").is_err());
    }

    #[test]
    fn short_round_trip_conserves_cash() {
        let (mut manager, id) = setup();
        let request = PositionRequest {
            stop_loss: Some(52.5),
            ..PositionRequest::new("CBA", Side::Short, 50.0, day(2))
        };
        let pos_id = manager.add_position(&id, &request).unwrap();
        let pos = manager.close_position(&pos_id, 45.0, day(3), "take_profit").unwrap();
        let net = pos.realized_pnl.unwrap();
        assert_relative_eq!(net, 100.0 - 1.0 - 0.9, epsilon = 1e-9);
        let p = manager.get_portfolio(&id).unwrap();
        assert_relative_eq!(p.available_capital, 10_000.0 + net, epsilon = 1e-9);
    }

    #[test]
    fn drawdown_and_calmar_from_ledger() {
        let (mut manager, id) = setup();
        let a = manager.add_position(&id, &long_request(50.0, 47.5, day(2))).unwrap();
        manager.close_position(&a, 48.0, day(3), "stop_loss").unwrap();
        let b = manager.add_position(&id, &long_request(50.0, 47.5, day(4))).unwrap();
        manager.close_position(&b, 60.0, day(11), "take_profit").unwrap();

        let p = manager.get_portfolio(&id).unwrap();
        assert_eq!(p.performance.total_trades, 2);
        assert_eq!(p.performance.winning_trades, 1);
        assert!(p.performance.max_drawdown > 0.0);
        assert!(p.performance.calmar_ratio > 0.0);
        assert!(p.performance.profit_factor > 1.0);
    }

    #[test]
    fn prices_exits_and_summary() {
        let (mut manager, id) = setup();
        let request = PositionRequest {
            take_profit: Some(55.0),
            ..long_request(50.0, 47.5, day(2))
        };
        let pos_id = manager.add_position(&id, &request).unwrap();

        let prices = HashMap::from([("BHP".to_string(), 52.0)]);
        manager.update_prices(&id, &prices).unwrap();
        assert!(manager.check_exits(&id).unwrap().is_empty());
        let summary = manager.portfolio_summary(&id).unwrap();
        assert_relative_eq!(summary.exposure, 1_040.0);
        assert_relative_eq!(summary.unrealized_pnl, 40.0);
        assert_eq!(summary.open_positions, 1);

        let prices = HashMap::from([("BHP".to_string(), 47.0)]);
        manager.update_prices(&id, &prices).unwrap();
        let exits = manager.check_exits(&id).unwrap();
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].position_id, pos_id);
        assert_eq!(exits[0].reason, ExitReason::StopLoss);

        let prices = HashMap::from([("BHP".to_string(), 56.0)]);
        manager.update_prices(&id, &prices).unwrap();
        assert_eq!(manager.check_exits(&id).unwrap()[0].reason, ExitReason::TakeProfit);
    }

    #[test]
    fn sizing_method_from_settings() {
        let mut manager = PortfolioManager::new();
        let risk = RiskSettings {
            sizing_method: SizingMethod::RiskParity,
            ..RiskSettings::default()
        };
        let id = manager.create_portfolio("p", 10_000.0, risk, day(1)).unwrap();
        // 10000 * 0.02 / 2
        let size = manager.size_position(&id, &long_request(50.0, 48.0, day(2))).unwrap();
        assert_relative_eq!(size, 50.0);
    }
}
