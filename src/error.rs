//! Custom error types for the simulation core
//!
//! Provides structured, typed errors instead of generic Box<dyn Error>

use thiserror::Error;

/// Top-level simulation errors
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Config parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Malformed input rejected at ingestion.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Empty symbol")]
    EmptySymbol,

    #[error("Invalid price {price} for {symbol}")]
    InvalidPrice { symbol: String, price: f64 },

    #[error("Invalid volume {volume} for {symbol}")]
    InvalidVolume { symbol: String, volume: f64 },

    #[error("Series out of order at index {index}: timestamps must be strictly increasing")]
    OutOfOrder { index: usize },

    #[error("Alert {id} already triggered")]
    AlertTriggered { id: String },

    #[error("Alert not found: {id}")]
    AlertNotFound { id: String },
}

/// Ledger invariant violations. These signal a caller bug and are never coerced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Position already exists: {symbol}")]
    PositionExists { symbol: String },

    #[error("Position not found: {symbol}")]
    PositionNotFound { symbol: String },

    #[error("Insufficient margin for {symbol}: required {required:.2}, available {available:.2}")]
    InsufficientMargin {
        symbol: String,
        required: f64,
        available: f64,
    },

    #[error("Invalid order for {symbol}: price={price}, qty={qty}")]
    InvalidOrder { symbol: String, price: f64, qty: f64 },
}

/// Failures talking to an external collaborator (feed, store, sink).
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("{target} timed out after {timeout_ms}ms")]
    Timeout { target: &'static str, timeout_ms: u64 },

    #[error("{target} unavailable: {reason}")]
    Unavailable { target: &'static str, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Admission control outcomes. A rejection is a normal decision result, not a failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("Decision for {symbol} is neutral")]
    Neutral { symbol: String },

    #[error("Invalid entry price {price} for {symbol}")]
    InvalidPrice { symbol: String, price: f64 },

    #[error("Max positions reached ({open}/{max})")]
    MaxPositions { open: usize, max: usize },

    #[error("Position already open for {symbol}")]
    PositionExists { symbol: String },

    #[error("Daily loss limit hit: lost {lost:.2}, limit {limit:.2}")]
    DailyLossLimit { lost: f64, limit: f64 },

    #[error("Required capital {required:.2} exceeds per-trade limit {limit:.2} for {symbol}")]
    CapitalLimit {
        symbol: String,
        required: f64,
        limit: f64,
    },

    #[error("Entry {entry} for {symbol} is more than {max_deviation} away from market {price}")]
    EntryTooFar {
        symbol: String,
        entry: f64,
        price: f64,
        max_deviation: f64,
    },

    #[error("Stop distance {distance} too small for {symbol}")]
    StopTooTight { symbol: String, distance: f64 },
}

pub type SimResult<T> = Result<T, SimError>;
