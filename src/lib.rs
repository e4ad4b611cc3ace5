//! TradeSim - crypto trading-simulation core
//!
//! This library ingests price ticks and maintains a simulated portfolio:
//! analytics, price alerts, signal-based decisions, risk admission, simulated
//! execution and a backtester that replays history through the same pipeline.

pub mod bus;
pub mod config;
pub mod constants;
pub mod data;
pub mod error;
pub mod events;
pub mod feed;
pub mod indicators;
pub mod services;
pub mod types;

// Re-export commonly used types
pub use bus::EventBus;
pub use config::{AppConfig, SimulationConfig};
pub use error::{SimError, SimResult};
pub use events::Event;
pub use services::backtest::{Backtester, SimulationResult};
pub use services::engine::{SimulationEngine, StopSignal};
pub use services::ledger::PortfolioLedger;
pub use types::{Candle, Direction, Position, PriceTick, Trade, TradingDecision};

#[cfg(test)]
mod config_tests;
