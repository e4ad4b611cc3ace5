use rand::Rng;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::SimulationConfig;
use crate::types::{Position, TradingDecision};

/// Market-friction parameters for simulated fills.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExecutionConfig {
    pub commission_rate: f64,
    pub max_slippage: f64,
    pub failure_probability: f64,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
}

impl From<&SimulationConfig> for ExecutionConfig {
    fn from(c: &SimulationConfig) -> Self {
        Self {
            commission_rate: c.commission_rate,
            max_slippage: c.max_slippage,
            failure_probability: c.failure_probability,
            min_latency_ms: c.min_latency_ms,
            max_latency_ms: c.max_latency_ms.max(c.min_latency_ms),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self::from(&SimulationConfig::default())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OpenFill {
    pub success: bool,
    pub executed_price: f64,
    pub fee: f64,
    pub latency: Duration,
    /// Present only on success.
    pub order_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CloseFill {
    pub executed_price: f64,
    /// Gross PnL at the executed price.
    pub pnl: f64,
    pub pnl_percent: f64,
    pub fee: f64,
    pub latency: Duration,
}

/// Stateless fill model. All randomness comes from the caller's RNG, so a
/// seeded RNG reproduces every fill.
#[derive(Clone, Debug, Default)]
pub struct ExecutionSimulator {
    config: ExecutionConfig,
}

impl ExecutionSimulator {
    pub fn new(config: ExecutionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    fn slipped(&self, price: f64, rng: &mut impl Rng) -> f64 {
        let max = self.config.max_slippage;
        if max <= 0.0 {
            return price;
        }
        price * (1.0 + rng.gen_range(-max..=max))
    }

    fn latency(&self, rng: &mut impl Rng) -> Duration {
        let (lo, hi) = (self.config.min_latency_ms, self.config.max_latency_ms);
        if hi <= lo {
            return Duration::from_millis(lo);
        }
        Duration::from_millis(rng.gen_range(lo..=hi))
    }

    /// Simulate an entry fill. Draw order: slippage, latency, failure, order id.
    pub fn simulate_open(
        &self,
        decision: &TradingDecision,
        current_price: f64,
        quantity: f64,
        rng: &mut impl Rng,
    ) -> OpenFill {
        let executed_price = self.slipped(current_price, rng);
        let latency = self.latency(rng);
        let fee = executed_price * quantity * self.config.commission_rate;

        let p = self.config.failure_probability.clamp(0.0, 1.0);
        if p > 0.0 && rng.gen_bool(p) {
            warn!(
                "⚡ [EXECUTION] Simulated failure for {:?} {} qty={:.8}",
                decision.decision, decision.symbol, quantity
            );
            return OpenFill {
                success: false,
                executed_price,
                fee: 0.0,
                latency,
                order_id: None,
            };
        }

        let id = uuid::Builder::from_random_bytes(rng.gen()).into_uuid();
        let order_id = format!("SIM_{}", id.simple());
        debug!(
            "⚡ [EXECUTION] {} {:?} {} @ {:.8} (fee {:.6}, latency {:?})",
            order_id, decision.decision, decision.symbol, executed_price, fee, latency
        );
        OpenFill {
            success: true,
            executed_price,
            fee,
            latency,
            order_id: Some(order_id),
        }
    }

    /// Simulate an exit fill. Closes never fail.
    pub fn simulate_close(&self, position: &Position, current_price: f64, rng: &mut impl Rng) -> CloseFill {
        let executed_price = self.slipped(current_price, rng);
        let latency = self.latency(rng);
        let pnl = position
            .direction
            .pnl(position.entry_price, executed_price, position.quantity);
        let cost = position.entry_price * position.quantity;
        let pnl_percent = if cost > 0.0 { pnl / cost * 100.0 } else { 0.0 };
        let fee = executed_price * position.quantity * self.config.commission_rate;

        CloseFill {
            executed_price,
            pnl,
            pnl_percent,
            fee,
            latency,
        }
    }
}
