use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::types::PriceTick;

/// Source of price ticks. Reconnects and backoff are the feed's own business;
/// the engine only sees the ticks pushed into `tx`.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    fn name(&self) -> &'static str;

    /// Push ticks until the feed is exhausted or the receiver goes away.
    async fn start(&self, tx: mpsc::UnboundedSender<PriceTick>) -> Result<(), TransportError>;
}
