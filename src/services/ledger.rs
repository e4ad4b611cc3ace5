//! Portfolio ledger: the only component that mutates cash and positions.
//!
//! `equity` and `total_value` are never stored. They are computed from the
//! open positions on every read, so `total_value == cash + Σ qty × price`
//! holds after every operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, warn};

use crate::constants::risk::{DEFAULT_STOP_LOSS_PCT, DEFAULT_TAKE_PROFIT_PCT};
use crate::error::LedgerError;
use crate::services::reporting::PortfolioStats;
use crate::types::{Direction, ExitReason, Portfolio, Position, PositionStatus, Trade};

/// Request to open a position. Missing levels fall back to the ledger's
/// default exit distances.
#[derive(Clone, Debug, PartialEq)]
pub struct OpenOrder {
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub quantity: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub fee: f64,
    pub opened_at: DateTime<Utc>,
}

impl OpenOrder {
    pub fn new(symbol: impl Into<String>, direction: Direction, entry_price: f64, quantity: f64) -> Self {
        Self {
            symbol: symbol.into(),
            direction,
            entry_price,
            quantity,
            stop_loss: None,
            take_profit: None,
            fee: 0.0,
            opened_at: Utc::now(),
        }
    }

    pub fn with_stops(mut self, stop_loss: Option<f64>, take_profit: Option<f64>) -> Self {
        self.stop_loss = stop_loss;
        self.take_profit = take_profit;
        self
    }

    pub fn with_fee(mut self, fee: f64) -> Self {
        self.fee = fee;
        self
    }

    pub fn at(mut self, opened_at: DateTime<Utc>) -> Self {
        self.opened_at = opened_at;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CloseOrder {
    pub symbol: String,
    pub exit_price: f64,
    pub fee: f64,
    pub closed_at: DateTime<Utc>,
    pub reason: ExitReason,
}

impl CloseOrder {
    pub fn new(symbol: impl Into<String>, exit_price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            exit_price,
            fee: 0.0,
            closed_at: Utc::now(),
            reason: ExitReason::Manual,
        }
    }

    pub fn with_fee(mut self, fee: f64) -> Self {
        self.fee = fee;
        self
    }

    pub fn at(mut self, closed_at: DateTime<Utc>) -> Self {
        self.closed_at = closed_at;
        self
    }

    pub fn reason(mut self, reason: ExitReason) -> Self {
        self.reason = reason;
        self
    }
}

/// Serializable point-in-time view of the ledger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub portfolio: Portfolio,
    pub positions: Vec<Position>,
    pub trades: Vec<Trade>,
}

#[derive(Debug)]
struct LedgerState {
    initial_cash: f64,
    cash: f64,
    positions: Vec<Position>,
    trades: Vec<Trade>,
    next_trade_id: u64,
}

impl LedgerState {
    fn new(initial_cash: f64) -> Self {
        Self {
            initial_cash,
            cash: initial_cash,
            positions: Vec::new(),
            trades: Vec::new(),
            next_trade_id: 1,
        }
    }

    fn portfolio(&self) -> Portfolio {
        let equity: f64 = self.positions.iter().map(Position::market_value).sum();
        Portfolio {
            cash: self.cash,
            equity,
            total_value: self.cash + equity,
        }
    }
}

/// Shared handle to one simulated account. Clones share state; create a new
/// ledger per simulation run.
#[derive(Clone, Debug)]
pub struct PortfolioLedger {
    state: Arc<RwLock<LedgerState>>,
    stop_loss_pct: f64,
    take_profit_pct: f64,
}

impl PortfolioLedger {
    /// Ledger with the default ±2% / ±4% exit distances.
    pub fn new(initial_cash: f64) -> Self {
        Self::with_exit_defaults(initial_cash, DEFAULT_STOP_LOSS_PCT, DEFAULT_TAKE_PROFIT_PCT)
    }

    /// Ledger whose orders without levels use the given stop and target distances.
    pub fn with_exit_defaults(initial_cash: f64, stop_loss_pct: f64, take_profit_pct: f64) -> Self {
        Self {
            state: Arc::new(RwLock::new(LedgerState::new(initial_cash))),
            stop_loss_pct,
            take_profit_pct,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, LedgerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a position, debiting margin plus the entry fee. Any error leaves
    /// the ledger untouched.
    pub fn open_position(&self, order: OpenOrder) -> Result<Position, LedgerError> {
        let OpenOrder {
            symbol,
            direction,
            entry_price,
            quantity,
            stop_loss,
            take_profit,
            fee,
            opened_at,
        } = order;

        let valid = |v: f64| v.is_finite() && v > 0.0;
        if !valid(entry_price) || !valid(quantity) || !fee.is_finite() || fee < 0.0 {
            return Err(LedgerError::InvalidOrder {
                symbol,
                price: entry_price,
                qty: quantity,
            });
        }

        let mut state = self.write();

        if state.positions.iter().any(|p| p.symbol == symbol) {
            return Err(LedgerError::PositionExists { symbol });
        }

        let required = direction.margin(entry_price, quantity) + fee;
        if state.cash < required {
            warn!(
                "📊 [LEDGER] Insufficient margin for {} {:?}: required {:.2}, cash {:.2}",
                symbol, direction, required, state.cash
            );
            return Err(LedgerError::InsufficientMargin {
                symbol,
                required,
                available: state.cash,
            });
        }

        let level = |given: Option<f64>, default: f64| given.filter(|v| valid(*v)).unwrap_or(default);
        let (default_sl, default_tp) = match direction {
            Direction::Long => (
                entry_price * (1.0 - self.stop_loss_pct),
                entry_price * (1.0 + self.take_profit_pct),
            ),
            Direction::Short => (
                entry_price * (1.0 + self.stop_loss_pct),
                entry_price * (1.0 - self.take_profit_pct),
            ),
        };

        let position = Position {
            symbol,
            direction,
            entry_price,
            current_price: entry_price,
            quantity,
            stop_loss: level(stop_loss, default_sl),
            take_profit: level(take_profit, default_tp),
            entry_time: opened_at,
            entry_fee: fee,
            status: PositionStatus::Open,
        };

        state.cash -= required;
        state.positions.push(position.clone());

        info!(
            "📊 [LEDGER] Opened {:?} {} qty={:.8} @ ${:.8} (SL: ${:.8}, TP: ${:.8}) cash=${:.2}",
            position.direction,
            position.symbol,
            position.quantity,
            position.entry_price,
            position.stop_loss,
            position.take_profit,
            state.cash
        );
        Ok(position)
    }

    /// Close the symbol's position and archive it as a Trade. This is the only
    /// place trades are created.
    pub fn close_position(&self, order: CloseOrder) -> Result<Trade, LedgerError> {
        if !order.exit_price.is_finite() || order.exit_price <= 0.0 || !order.fee.is_finite() || order.fee < 0.0 {
            return Err(LedgerError::InvalidOrder {
                symbol: order.symbol,
                price: order.exit_price,
                qty: 0.0,
            });
        }

        let mut state = self.write();
        let idx = state
            .positions
            .iter()
            .position(|p| p.symbol == order.symbol)
            .ok_or_else(|| LedgerError::PositionNotFound {
                symbol: order.symbol.clone(),
            })?;

        let mut position = state.positions.remove(idx);
        position.current_price = order.exit_price;
        position.status = PositionStatus::Closed;

        let pnl = position.pnl();
        state.cash += position.margin() + pnl - order.fee;

        let trade = Trade {
            id: state.next_trade_id,
            symbol: position.symbol.clone(),
            direction: position.direction,
            entry_price: position.entry_price,
            exit_price: order.exit_price,
            quantity: position.quantity,
            pnl,
            pnl_percent: position.pnl_percent(),
            fee: position.entry_fee + order.fee,
            entry_time: position.entry_time,
            exit_time: order.closed_at,
            duration_minutes: (order.closed_at - position.entry_time).num_minutes().max(0),
            exit_reason: order.reason,
        };
        state.next_trade_id += 1;
        state.trades.push(trade.clone());

        info!(
            "📊 [LEDGER] Closed {:?} {} @ ${:.8} ({:?}) pnl=${:.2} ({:.2}%) cash=${:.2}",
            trade.direction, trade.symbol, trade.exit_price, trade.exit_reason, trade.pnl, trade.pnl_percent, state.cash
        );
        Ok(trade)
    }

    /// Mark open positions to the given prices. Symbols without a position and
    /// non-positive prices are ignored. Calling twice with the same map is a no-op.
    pub fn update_prices(&self, prices: &HashMap<String, f64>) {
        let mut state = self.write();
        for position in state.positions.iter_mut() {
            if let Some(&price) = prices.get(&position.symbol) {
                if price.is_finite() && price > 0.0 {
                    position.current_price = price;
                }
            }
        }
    }

    pub fn update_price(&self, symbol: &str, price: f64) {
        if !price.is_finite() || price <= 0.0 {
            return;
        }
        let mut state = self.write();
        if let Some(position) = state.positions.iter_mut().find(|p| p.symbol == symbol) {
            position.current_price = price;
        }
    }

    /// Drop all positions and trades and start over with `initial_cash`.
    pub fn reset(&self, initial_cash: f64) {
        let mut state = self.write();
        *state = LedgerState::new(initial_cash);
        info!("📊 [LEDGER] Reset to ${:.2}", initial_cash);
    }

    pub fn portfolio(&self) -> Portfolio {
        self.read().portfolio()
    }

    pub fn cash(&self) -> f64 {
        self.read().cash
    }

    pub fn initial_cash(&self) -> f64 {
        self.read().initial_cash
    }

    pub fn positions(&self) -> Vec<Position> {
        self.read().positions.clone()
    }

    pub fn position(&self, symbol: &str) -> Option<Position> {
        self.read().positions.iter().find(|p| p.symbol == symbol).cloned()
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.read().positions.iter().any(|p| p.symbol == symbol)
    }

    pub fn open_count(&self) -> usize {
        self.read().positions.len()
    }

    pub fn trades(&self) -> Vec<Trade> {
        self.read().trades.clone()
    }

    pub fn stats(&self) -> PortfolioStats {
        PortfolioStats::from_trades(&self.read().trades)
    }

    /// Consistent view of portfolio, positions and trades under one lock.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let state = self.read();
        LedgerSnapshot {
            portfolio: state.portfolio(),
            positions: state.positions.clone(),
            trades: state.trades.clone(),
        }
    }
}
