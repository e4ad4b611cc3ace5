use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A single price/volume observation from the market feed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    pub symbol: String,
    pub price: f64,
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
}

impl PriceTick {
    pub fn new(symbol: impl Into<String>, price: f64, volume: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            volume,
            timestamp,
        }
    }

    /// Type-level validation only: non-empty symbol, positive finite price,
    /// non-negative finite volume.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.symbol.trim().is_empty() {
            return Err(ValidationError::EmptySymbol);
        }
        if !self.price.is_finite() || self.price <= 0.0 {
            return Err(ValidationError::InvalidPrice {
                symbol: self.symbol.clone(),
                price: self.price,
            });
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(ValidationError::InvalidVolume {
                symbol: self.symbol.clone(),
                volume: self.volume,
            });
        }
        Ok(())
    }
}

/// Historical OHLCV bar used by the backtester.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn to_tick(&self, symbol: &str) -> PriceTick {
        PriceTick::new(symbol, self.close, self.volume, self.timestamp)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }

    /// Collateral held against a position. SHORT positions lock twice the notional.
    pub fn margin(self, price: f64, qty: f64) -> f64 {
        match self {
            Direction::Long => price * qty,
            Direction::Short => 2.0 * price * qty,
        }
    }

    pub fn pnl(self, entry: f64, exit: f64, qty: f64) -> f64 {
        match self {
            Direction::Long => (exit - entry) * qty,
            Direction::Short => (entry - exit) * qty,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    Open,
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Reversal,
    Manual,
    EndOfData,
}

/// An open simulated holding. PnL is always derived from `current_price`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub current_price: f64,
    pub quantity: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub entry_time: DateTime<Utc>,
    pub entry_fee: f64,
    pub status: PositionStatus,
}

impl Position {
    pub fn pnl(&self) -> f64 {
        self.direction
            .pnl(self.entry_price, self.current_price, self.quantity)
    }

    pub fn pnl_percent(&self) -> f64 {
        let cost = self.entry_price * self.quantity;
        if cost == 0.0 {
            return 0.0;
        }
        self.pnl() / cost * 100.0
    }

    pub fn margin(&self) -> f64 {
        self.direction.margin(self.entry_price, self.quantity)
    }

    pub fn market_value(&self) -> f64 {
        self.quantity * self.current_price
    }

    /// Stop-loss / take-profit check against the position's own levels.
    pub fn exit_trigger(&self, price: f64) -> Option<ExitReason> {
        match self.direction {
            Direction::Long => {
                if price <= self.stop_loss {
                    Some(ExitReason::StopLoss)
                } else if price >= self.take_profit {
                    Some(ExitReason::TakeProfit)
                } else {
                    None
                }
            }
            Direction::Short => {
                if price >= self.stop_loss {
                    Some(ExitReason::StopLoss)
                } else if price <= self.take_profit {
                    Some(ExitReason::TakeProfit)
                } else {
                    None
                }
            }
        }
    }
}

/// Immutable record of a closed position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: u64,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: f64,
    /// Gross price PnL, before fees.
    pub pnl: f64,
    pub pnl_percent: f64,
    /// Entry fee plus exit fee.
    pub fee: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub exit_reason: ExitReason,
}

impl Trade {
    pub fn net_pnl(&self) -> f64 {
        self.pnl - self.fee
    }

    /// Net return as a fraction of the entry notional.
    pub fn net_return(&self) -> f64 {
        let cost = self.entry_price * self.quantity;
        if cost == 0.0 {
            return 0.0;
        }
        self.net_pnl() / cost
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub cash: f64,
    pub equity: f64,
    pub total_value: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertCondition {
    Above,
    Below,
}

impl AlertCondition {
    pub fn is_met(self, threshold: f64, price: f64) -> bool {
        match self {
            AlertCondition::Above => price >= threshold,
            AlertCondition::Below => price <= threshold,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceAlert {
    pub id: String,
    pub symbol: String,
    pub condition: AlertCondition,
    pub price: f64,
    pub active: bool,
    pub triggered: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub triggered_at: Option<DateTime<Utc>>,
}

impl PriceAlert {
    pub fn is_armed(&self) -> bool {
        self.active && !self.triggered
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceAnalysis {
    pub symbol: String,
    pub current_price: f64,
    pub price_change: f64,
    pub price_change_percent: f64,
    pub volume: f64,
    /// Latest volume relative to the mean of the previous samples (1.0 = unchanged).
    pub volume_change: f64,
    pub volatility: f64,
    pub support_levels: Vec<f64>,
    pub resistance_levels: Vec<f64>,
    pub trend: Trend,
    pub rsi: Option<f64>,
    pub moving_average: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalAction {
    Buy,
    Sell,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Rsi,
    Trend,
    Volume,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TradingSignal {
    pub symbol: String,
    pub kind: SignalKind,
    pub action: SignalAction,
    pub confidence: f64,
    pub price: f64,
    pub reason: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Long,
    Short,
    Neutral,
}

impl Decision {
    pub fn direction(self) -> Option<Direction> {
        match self {
            Decision::Long => Some(Direction::Long),
            Decision::Short => Some(Direction::Short),
            Decision::Neutral => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TradingDecision {
    pub symbol: String,
    pub decision: Decision,
    pub entry_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub risk_reward_ratio: f64,
    pub confidence: f64,
    pub signals: Vec<TradingSignal>,
    pub timeframe: String,
}

impl TradingDecision {
    pub fn neutral(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            decision: Decision::Neutral,
            entry_price: None,
            stop_loss: None,
            take_profit: None,
            risk_reward_ratio: 1.5,
            confidence: 0.0,
            signals: Vec::new(),
            timeframe: "tick".to_string(),
        }
    }

    /// Minimal directional decision, used by hand-written strategies.
    pub fn directional(symbol: impl Into<String>, direction: Direction, confidence: f64) -> Self {
        let decision = match direction {
            Direction::Long => Decision::Long,
            Direction::Short => Decision::Short,
        };
        Self {
            decision,
            confidence: confidence.clamp(0.0, 1.0),
            ..Self::neutral(symbol)
        }
    }
}
