use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::traits::MarketFeed;
use crate::config::AppConfig;
use crate::error::TransportError;
use crate::types::PriceTick;

/// Synthetic feed: every symbol takes a uniform random step each interval.
#[derive(Clone, Debug)]
pub struct RandomWalkFeed {
    start_prices: Vec<(String, f64)>,
    interval: Duration,
    step_volatility: f64,
    seed: Option<u64>,
    max_ticks: Option<usize>,
}

impl RandomWalkFeed {
    pub fn new(start_prices: Vec<(String, f64)>, interval: Duration, step_volatility: f64) -> Self {
        Self {
            start_prices,
            interval,
            step_volatility: step_volatility.abs(),
            seed: None,
            max_ticks: None,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let start_prices = config
            .symbols
            .iter()
            .map(|s| (s.clone(), config.start_price(s)))
            .collect();
        let mut feed = Self::new(
            start_prices,
            Duration::from_millis(config.feed.interval_ms),
            config.feed.step_volatility,
        );
        feed.seed = config.simulation.seed;
        feed.max_ticks = config.feed.max_ticks;
        feed
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Stop after this many ticks in total.
    pub fn with_max_ticks(mut self, max: usize) -> Self {
        self.max_ticks = Some(max);
        self
    }
}

#[async_trait]
impl MarketFeed for RandomWalkFeed {
    fn name(&self) -> &'static str {
        "random_walk"
    }

    async fn start(&self, tx: mpsc::UnboundedSender<PriceTick>) -> Result<(), TransportError> {
        if self.start_prices.is_empty() {
            return Err(TransportError::Unavailable {
                target: "random_walk",
                reason: "no symbols configured".to_string(),
            });
        }

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut prices = self.start_prices.clone();
        let mut sent = 0usize;
        let mut interval = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
        info!("📡 [FEED] Random walk over {} symbols", prices.len());

        loop {
            interval.tick().await;
            for (symbol, price) in prices.iter_mut() {
                if self.max_ticks.is_some_and(|max| sent >= max) {
                    debug!("[FEED] Random walk reached {} ticks", sent);
                    return Ok(());
                }
                let step = if self.step_volatility > 0.0 {
                    rng.gen_range(-self.step_volatility..=self.step_volatility)
                } else {
                    0.0
                };
                *price = (*price * (1.0 + step)).max(f64::MIN_POSITIVE);
                let volume = rng.gen_range(1.0..100.0);

                let tick = PriceTick::new(symbol.clone(), *price, volume, Utc::now());
                if tx.send(tick).is_err() {
                    debug!("[FEED] Random walk receiver closed");
                    return Ok(());
                }
                sent += 1;
            }
        }
    }
}
