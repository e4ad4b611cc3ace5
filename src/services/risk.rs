use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

use crate::config::SimulationConfig;
use crate::constants::risk::{MAX_ENTRY_DEVIATION, MIN_STOP_DISTANCE};
use crate::error::Rejection;
use crate::types::{Direction, Portfolio, Position, TradingDecision};

/// What the risk manager approved: how much to buy and where the exits sit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Admission {
    pub direction: Direction,
    pub entry_price: f64,
    pub quantity: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
}

impl Admission {
    pub fn margin(&self) -> f64 {
        self.direction.margin(self.entry_price, self.quantity)
    }
}

/// Quantity that loses `total_value × risk` if the stop is hit.
/// `None` when the inputs cannot produce a positive, finite size.
pub fn size_for_risk(total_value: f64, risk: f64, entry: f64, stop: f64) -> Option<f64> {
    let distance = (entry - stop).abs();
    if !distance.is_finite() || distance <= MIN_STOP_DISTANCE {
        return None;
    }
    let qty = total_value * risk / distance;
    (qty.is_finite() && qty > 0.0).then_some(qty)
}

#[derive(Debug, Default)]
struct DailyRisk {
    realized_pnl: f64,
    /// Sum of losing trades only; wins never offset it.
    realized_loss: f64,
}

pub struct RiskManager {
    config: SimulationConfig,
    daily: Mutex<DailyRisk>,
}

impl RiskManager {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            daily: Mutex::new(DailyRisk::default()),
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Default exit levels around `entry` for the given direction.
    pub fn default_stops(&self, entry: f64, direction: Direction) -> (f64, f64) {
        let sl = self.config.stop_loss_percent;
        let tp = self.config.take_profit_percent;
        match direction {
            Direction::Long => (entry * (1.0 - sl), entry * (1.0 + tp)),
            Direction::Short => (entry * (1.0 + sl), entry * (1.0 - tp)),
        }
    }

    /// Decision levels win when they sit on the right side of entry; anything
    /// else falls back to the configured percentages.
    fn resolve_stops(&self, decision: &TradingDecision, entry: f64, direction: Direction) -> (f64, f64) {
        let (default_sl, default_tp) = self.default_stops(entry, direction);
        let valid = |v: &f64| v.is_finite() && *v > 0.0;
        let (stop_ok, target_ok): (fn(f64, f64) -> bool, fn(f64, f64) -> bool) = match direction {
            Direction::Long => (|s, e| s < e, |t, e| t > e),
            Direction::Short => (|s, e| s > e, |t, e| t < e),
        };
        let stop = decision
            .stop_loss
            .filter(valid)
            .filter(|s| stop_ok(*s, entry))
            .unwrap_or(default_sl);
        let target = decision
            .take_profit
            .filter(valid)
            .filter(|t| target_ok(*t, entry))
            .unwrap_or(default_tp);
        (stop, target)
    }

    fn entry_price(decision: &TradingDecision) -> Result<f64, Rejection> {
        match decision.entry_price {
            Some(p) if p.is_finite() && p > 0.0 => Ok(p),
            other => Err(Rejection::InvalidPrice {
                symbol: decision.symbol.clone(),
                price: other.unwrap_or(0.0),
            }),
        }
    }

    /// Refuse decisions whose entry strays more than 5% from `current_price`.
    /// A decision without an entry is measured at the market.
    pub fn check_entry(&self, decision: &TradingDecision, current_price: f64) -> Result<(), Rejection> {
        let entry = decision.entry_price.unwrap_or(current_price);
        let deviation = (entry - current_price).abs() / current_price;
        if deviation.is_finite() && deviation <= MAX_ENTRY_DEVIATION {
            return Ok(());
        }
        Err(self.reject(Rejection::EntryTooFar {
            symbol: decision.symbol.clone(),
            entry,
            price: current_price,
            max_deviation: MAX_ENTRY_DEVIATION,
        }))
    }

    /// `(total_value × risk_per_trade) / |entry − stop|`, using the decision's
    /// stop or the default one.
    pub fn position_size(&self, decision: &TradingDecision, portfolio: &Portfolio) -> Result<f64, Rejection> {
        let direction = decision.decision.direction().ok_or_else(|| Rejection::Neutral {
            symbol: decision.symbol.clone(),
        })?;
        let entry = Self::entry_price(decision)?;
        let (stop, _) = self.resolve_stops(decision, entry, direction);
        size_for_risk(portfolio.total_value, self.config.risk_per_trade, entry, stop).ok_or_else(|| {
            Rejection::StopTooTight {
                symbol: decision.symbol.clone(),
                distance: (entry - stop).abs(),
            }
        })
    }

    /// Admission control. Checks run in a fixed order and the first failure wins.
    pub fn check_admission(
        &self,
        decision: &TradingDecision,
        portfolio: &Portfolio,
        open_positions: &[Position],
    ) -> Result<Admission, Rejection> {
        let symbol = decision.symbol.clone();
        let direction = decision
            .decision
            .direction()
            .ok_or_else(|| Rejection::Neutral { symbol: symbol.clone() })?;
        let entry = Self::entry_price(decision)?;

        if open_positions.len() >= self.config.max_positions {
            return Err(self.reject(Rejection::MaxPositions {
                open: open_positions.len(),
                max: self.config.max_positions,
            }));
        }

        if open_positions.iter().any(|p| p.symbol == symbol) {
            return Err(self.reject(Rejection::PositionExists { symbol }));
        }

        let lost = self.daily_loss();
        let loss_limit = portfolio.total_value * self.config.max_daily_loss_percent;
        if lost > loss_limit {
            return Err(self.reject(Rejection::DailyLossLimit { lost, limit: loss_limit }));
        }

        let (stop_loss, take_profit) = self.resolve_stops(decision, entry, direction);
        let quantity = size_for_risk(portfolio.total_value, self.config.risk_per_trade, entry, stop_loss)
            .ok_or_else(|| {
                self.reject(Rejection::StopTooTight {
                    symbol: symbol.clone(),
                    distance: (entry - stop_loss).abs(),
                })
            })?;

        let required = direction.margin(entry, quantity);
        let capital_limit = portfolio.total_value * self.config.max_risk_per_trade;
        if required > capital_limit {
            return Err(self.reject(Rejection::CapitalLimit {
                symbol,
                required,
                limit: capital_limit,
            }));
        }

        debug!(
            "🛡️ [RISK] Admitted {:?} {} qty={:.8} @ {:.8} (SL {:.8}, TP {:.8})",
            direction, symbol, quantity, entry, stop_loss, take_profit
        );
        Ok(Admission {
            direction,
            entry_price: entry,
            quantity,
            stop_loss,
            take_profit,
        })
    }

    pub fn can_open(&self, decision: &TradingDecision, portfolio: &Portfolio, open_positions: &[Position]) -> bool {
        self.check_admission(decision, portfolio, open_positions).is_ok()
    }

    fn reject(&self, rejection: Rejection) -> Rejection {
        info!("🛡️ [RISK] Rejected: {}", rejection);
        rejection
    }

    /// Feed realized PnL (net of fees) into the daily loss tracker.
    pub fn record_realized_pnl(&self, pnl: f64) {
        if !pnl.is_finite() {
            return;
        }
        let mut daily = self.daily.lock().unwrap_or_else(PoisonError::into_inner);
        daily.realized_pnl += pnl;
        if pnl < 0.0 {
            daily.realized_loss -= pnl;
        }
    }

    /// Net realized PnL since the last day boundary.
    pub fn daily_pnl(&self) -> f64 {
        self.daily.lock().unwrap_or_else(PoisonError::into_inner).realized_pnl
    }

    /// Cumulative realized losses since the last day boundary, as a magnitude.
    pub fn daily_loss(&self) -> f64 {
        self.daily.lock().unwrap_or_else(PoisonError::into_inner).realized_loss
    }

    /// Called on the day-boundary signal only.
    pub fn reset_daily(&self) {
        let mut daily = self.daily.lock().unwrap_or_else(PoisonError::into_inner);
        info!(
            "🛡️ [RISK] Day boundary: resetting daily PnL ({:.2}, losses {:.2})",
            daily.realized_pnl, daily.realized_loss
        );
        *daily = DailyRisk::default();
    }
}
