use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::risk::{DEFAULT_STOP_LOSS_PCT, DEFAULT_TAKE_PROFIT_PCT};
use crate::error::SimError;

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "TRADESIM_CONFIG";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Live,
    Backtest,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatterLevel {
    Low,
    #[default]
    Normal,
    Verbose,
}

/// Knobs shared by the live engine and the backtester.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub initial_capital: f64,
    /// Fraction of total value risked between entry and stop.
    pub risk_per_trade: f64,
    /// Largest fraction of total value a single position may commit as margin.
    pub max_risk_per_trade: f64,
    pub max_positions: usize,
    pub commission_rate: f64,
    pub max_slippage: f64,
    pub failure_probability: f64,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    pub stop_loss_percent: f64,
    pub take_profit_percent: f64,
    pub max_daily_loss_percent: f64,
    pub history_window_size: usize,
    pub decision_threshold: f64,
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            risk_per_trade: 0.01,
            max_risk_per_trade: 1.0,
            max_positions: 5,
            commission_rate: 0.001,
            max_slippage: 0.001,
            failure_probability: 0.05,
            min_latency_ms: 1_000,
            max_latency_ms: 3_000,
            stop_loss_percent: DEFAULT_STOP_LOSS_PCT,
            take_profit_percent: DEFAULT_TAKE_PROFIT_PCT,
            max_daily_loss_percent: 0.05,
            history_window_size: 100,
            decision_threshold: 1.0,
            seed: None,
        }
    }
}

impl SimulationConfig {
    /// Frictionless settings: no fees, slippage, failures or latency.
    pub fn frictionless() -> Self {
        Self {
            commission_rate: 0.0,
            max_slippage: 0.0,
            failure_probability: 0.0,
            min_latency_ms: 0,
            max_latency_ms: 0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), SimError> {
        fn fraction(name: &str, v: f64) -> Result<(), SimError> {
            if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                return Err(SimError::Config(format!("{} must be within [0, 1], got {}", name, v)));
            }
            Ok(())
        }

        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(SimError::Config(format!(
                "initial_capital must be positive, got {}",
                self.initial_capital
            )));
        }
        fraction("risk_per_trade", self.risk_per_trade)?;
        fraction("max_risk_per_trade", self.max_risk_per_trade)?;
        fraction("commission_rate", self.commission_rate)?;
        fraction("max_slippage", self.max_slippage)?;
        fraction("failure_probability", self.failure_probability)?;
        fraction("stop_loss_percent", self.stop_loss_percent)?;
        fraction("take_profit_percent", self.take_profit_percent)?;
        fraction("max_daily_loss_percent", self.max_daily_loss_percent)?;

        if self.max_positions == 0 {
            return Err(SimError::Config("max_positions must be at least 1".into()));
        }
        if self.history_window_size < 2 {
            return Err(SimError::Config("history_window_size must be at least 2".into()));
        }
        if self.min_latency_ms > self.max_latency_ms {
            return Err(SimError::Config(format!(
                "min_latency_ms ({}) exceeds max_latency_ms ({})",
                self.min_latency_ms, self.max_latency_ms
            )));
        }
        if !self.decision_threshold.is_finite() || self.decision_threshold < 0.0 {
            return Err(SimError::Config("decision_threshold must be non-negative".into()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// JSON file holding an array of candles.
    pub data_path: Option<PathBuf>,
    pub symbol: String,
    pub close_open_at_end: bool,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            data_path: None,
            symbol: "BTCUSDT".to_string(),
            close_open_at_end: true,
        }
    }
}

/// Settings for the synthetic random-walk feed used by the binary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub interval_ms: u64,
    pub step_volatility: f64,
    pub start_prices: HashMap<String, f64>,
    pub max_ticks: Option<usize>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            interval_ms: 250,
            step_volatility: 0.002,
            start_prices: HashMap::new(),
            max_ticks: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub mode: RunMode,
    pub chatter_level: ChatterLevel,
    pub symbols: Vec<String>,
    /// Bound on every call to the feed, alert store or notification sink.
    pub external_timeout_ms: u64,
    pub alert_store_path: PathBuf,
    pub event_bus_capacity: usize,

    pub simulation: SimulationConfig,
    pub backtest: BacktestConfig,
    pub feed: FeedConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::Live,
            chatter_level: ChatterLevel::Normal,
            symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            external_timeout_ms: 2_000,
            alert_store_path: PathBuf::from("data/price_alerts.json"),
            event_bus_capacity: crate::constants::engine::DEFAULT_BUS_CAPACITY,
            simulation: SimulationConfig::default(),
            backtest: BacktestConfig::default(),
            feed: FeedConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from `$TRADESIM_CONFIG`, falling back to `config.yaml`.
    pub fn load() -> Result<Self, SimError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.yaml".to_string());
        Self::from_path(path)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, SimError> {
        // Strip BOM if present
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);

        let config: AppConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SimError> {
        self.simulation.validate()?;
        if self.external_timeout_ms == 0 {
            return Err(SimError::Config("external_timeout_ms must be positive".into()));
        }
        if self.event_bus_capacity == 0 {
            return Err(SimError::Config("event_bus_capacity must be positive".into()));
        }
        Ok(())
    }

    pub fn external_timeout(&self) -> Duration {
        Duration::from_millis(self.external_timeout_ms)
    }

    /// Starting price for the synthetic feed; unknown symbols start at 100.
    pub fn start_price(&self, symbol: &str) -> f64 {
        self.feed.start_prices.get(symbol).copied().unwrap_or(100.0)
    }
}
