//! Simulation-wide constants and magic numbers
//!
//! Thresholds and weights the engines agree on live here so they can be
//! tuned in one place.

use std::time::Duration;

/// Decision engine signal thresholds and weights
pub mod signals {
    pub const RSI_PERIOD: usize = 14;
    pub const RSI_OVERSOLD: f64 = 30.0;
    pub const RSI_OVERBOUGHT: f64 = 70.0;

    /// Latest volume over the trailing mean that counts as a spike (150%).
    pub const VOLUME_SPIKE_RATIO: f64 = 1.5;

    pub const RSI_BUY_WEIGHT: f64 = 0.8;
    pub const RSI_SELL_WEIGHT: f64 = 0.7;
    pub const TREND_WEIGHT: f64 = 0.6;
    pub const VOLUME_WEIGHT: f64 = 0.7;

    pub const DEFAULT_RISK_REWARD: f64 = 1.5;

    /// Entry offset from the current price (0.5%).
    pub const ENTRY_OFFSET: f64 = 0.005;
    /// Fallback stop distance when no level is usable.
    pub const FALLBACK_STOP: f64 = 0.02;
    /// Fallback target distance when no level is usable.
    pub const FALLBACK_TARGET: f64 = 0.03;

    pub const DEFAULT_TIMEFRAME: &str = "15m-1h";
}

/// Analytics constants
pub mod analytics {
    /// Samples compared for the trend call.
    pub const TREND_LOOKBACK: usize = 5;
    /// Move over the lookback that flips the trend (2%).
    pub const TREND_THRESHOLD: f64 = 0.02;
    /// Percentile used for the second support/resistance level.
    pub const LEVEL_PERCENTILE: f64 = 0.25;
}

/// Risk and ledger constants
pub mod risk {
    /// Stop distances at or below this are treated as zero.
    pub const MIN_STOP_DISTANCE: f64 = 1e-9;

    /// Default exit distances from entry.
    pub const DEFAULT_STOP_LOSS_PCT: f64 = 0.02;
    pub const DEFAULT_TAKE_PROFIT_PCT: f64 = 0.04;

    /// Decisions whose entry sits further than this from the market are refused.
    pub const MAX_ENTRY_DEVIATION: f64 = 0.05;

    /// Sharpe annualisation factor.
    pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;
}

/// Engine plumbing
pub mod engine {
    use super::*;

    pub const DEFAULT_BUS_CAPACITY: usize = 1_024;

    /// Upper bound on how long `stop()` waits for symbol workers to drain.
    pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
}

/// Logging event names for structured logging
pub mod events {
    pub const POSITION_OPENED: &str = "position_opened";
    pub const POSITION_CLOSED: &str = "position_closed";
    pub const STOP_LOSS_TRIGGERED: &str = "stop_loss_triggered";
    pub const TAKE_PROFIT_TRIGGERED: &str = "take_profit_triggered";
    pub const ALERT_TRIGGERED: &str = "alert_triggered";
    pub const ORDER_FAILED: &str = "order_failed";
    pub const ADMISSION_REJECTED: &str = "admission_rejected";
    pub const TICK_DROPPED: &str = "tick_dropped";
}
