//! Unit tests for the market feeds.

#[cfg(test)]
mod feed_tests {
    use crate::error::TransportError;
    use crate::feed::{MarketFeed, RandomWalkFeed, ReplayFeed};
    use crate::types::{Candle, PriceTick};
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn candles(n: usize) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| Candle {
                timestamp: start + ChronoDuration::minutes(i as i64),
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0 + i as f64,
                volume: 10.0,
            })
            .collect()
    }

    async fn drain(mut rx: mpsc::UnboundedReceiver<PriceTick>) -> Vec<PriceTick> {
        let mut out = Vec::new();
        while let Some(t) = rx.recv().await {
            out.push(t);
        }
        out
    }

    #[tokio::test]
    async fn test_replay_sends_all_ticks_in_order() {
        let feed = ReplayFeed::from_candles("BTCUSDT", &candles(5));
        assert_eq!(feed.len(), 5);
        assert_eq!(feed.name(), "replay");

        let (tx, rx) = mpsc::unbounded_channel();
        feed.start(tx).await.unwrap();
        let ticks = drain(rx).await;
        let prices: Vec<f64> = ticks.iter().map(|t| t.price).collect();
        assert_eq!(prices, vec![100.0, 101.0, 102.0, 103.0, 104.0]);
        assert!(ticks.iter().all(|t| t.symbol == "BTCUSDT"));
    }

    #[tokio::test]
    async fn test_replay_stops_when_receiver_dropped() {
        let feed = ReplayFeed::from_candles("BTCUSDT", &candles(3)).with_pacing(Duration::from_millis(1));
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        assert!(feed.start(tx).await.is_ok());
    }

    #[tokio::test]
    async fn test_random_walk_is_seeded_and_bounded() {
        let feed = RandomWalkFeed::new(
            vec![("BTCUSDT".to_string(), 50_000.0), ("ETHUSDT".to_string(), 3_000.0)],
            Duration::from_millis(1),
            0.01,
        )
        .with_seed(42)
        .with_max_ticks(10);

        let (tx, rx) = mpsc::unbounded_channel();
        feed.start(tx).await.unwrap();
        let first = drain(rx).await;
        assert_eq!(first.len(), 10);
        assert!(first.iter().all(|t| t.validate().is_ok()));
        assert_eq!(first.iter().filter(|t| t.symbol == "ETHUSDT").count(), 5);

        let (tx, rx) = mpsc::unbounded_channel();
        feed.start(tx).await.unwrap();
        let second = drain(rx).await;
        let a: Vec<f64> = first.iter().map(|t| t.price).collect();
        let b: Vec<f64> = second.iter().map(|t| t.price).collect();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_random_walk_steps_stay_within_volatility() {
        let feed = RandomWalkFeed::new(vec![("SOLUSDT".to_string(), 100.0)], Duration::from_millis(1), 0.02)
            .with_seed(7)
            .with_max_ticks(20);
        let (tx, rx) = mpsc::unbounded_channel();
        feed.start(tx).await.unwrap();
        let ticks = drain(rx).await;
        let mut prev = 100.0;
        for t in ticks {
            let step = (t.price / prev - 1.0).abs();
            assert!(step <= 0.02 + 1e-9, "step {} too large", step);
            prev = t.price;
        }
    }

    #[tokio::test]
    async fn test_random_walk_without_symbols_is_unavailable() {
        let feed = RandomWalkFeed::new(Vec::new(), Duration::from_millis(1), 0.01);
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = feed.start(tx).await.unwrap_err();
        assert!(matches!(err, TransportError::Unavailable { .. }));
    }
}
