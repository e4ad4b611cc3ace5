use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use super::traits::MarketFeed;
use crate::error::TransportError;
use crate::types::{Candle, PriceTick};

/// Replays a fixed list of ticks, optionally paced.
#[derive(Clone, Debug, Default)]
pub struct ReplayFeed {
    ticks: Vec<PriceTick>,
    pacing: Option<Duration>,
}

impl ReplayFeed {
    pub fn from_ticks(ticks: Vec<PriceTick>) -> Self {
        Self { ticks, pacing: None }
    }

    /// One tick per candle, at the candle's close.
    pub fn from_candles(symbol: &str, candles: &[Candle]) -> Self {
        Self::from_ticks(candles.iter().map(|c| c.to_tick(symbol)).collect())
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = Some(pacing).filter(|d| !d.is_zero());
        self
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }
}

#[async_trait]
impl MarketFeed for ReplayFeed {
    fn name(&self) -> &'static str {
        "replay"
    }

    async fn start(&self, tx: mpsc::UnboundedSender<PriceTick>) -> Result<(), TransportError> {
        for (i, tick) in self.ticks.iter().enumerate() {
            if i > 0 {
                if let Some(pacing) = self.pacing {
                    tokio::time::sleep(pacing).await;
                }
            }
            if tx.send(tick.clone()).is_err() {
                debug!("[FEED] Replay receiver closed after {} ticks", i);
                return Ok(());
            }
        }
        debug!("[FEED] Replay finished ({} ticks)", self.ticks.len());
        Ok(())
    }
}
