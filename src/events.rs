use crate::error::Rejection;
use crate::types::{Position, PriceAlert, PriceAnalysis, PriceTick, Trade, TradingDecision};

#[derive(Clone, Debug)]
pub struct TickProcessed {
    pub tick: PriceTick,
    pub analysis: Option<PriceAnalysis>,
    pub total_value: f64,
}

#[derive(Clone, Debug)]
pub struct OrderRejected {
    pub symbol: String,
    pub reason: String,
}

#[derive(Clone, Debug)]
pub struct AdmissionRejected {
    pub decision: TradingDecision,
    pub rejection: Rejection,
}

// Global Event Enum
#[derive(Clone, Debug)]
pub enum Event {
    Tick(TickProcessed),
    AlertTriggered(PriceAlert),
    PositionOpened(Position),
    PositionClosed(Trade),
    OrderRejected(OrderRejected),
    AdmissionRejected(AdmissionRejected),
}
