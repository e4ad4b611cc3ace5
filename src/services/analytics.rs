use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::constants::analytics::{LEVEL_PERCENTILE, TREND_LOOKBACK, TREND_THRESHOLD};
use crate::constants::signals::RSI_PERIOD;
use crate::data::store::{HistoryStore, PriceWindow};
use crate::indicators;
use crate::types::{PriceAnalysis, PriceTick, Trend};

/// `[lowest, 25th-percentile]` of the window, sorted ascending.
pub fn support_levels(prices: &[f64]) -> Vec<f64> {
    let mut sorted = prices.to_vec();
    sorted.sort_by(f64::total_cmp);
    percentile_levels(&sorted)
}

/// `[highest, 25th-percentile from the top]`, sorted descending.
pub fn resistance_levels(prices: &[f64]) -> Vec<f64> {
    let mut sorted = prices.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    percentile_levels(&sorted)
}

fn percentile_levels(sorted: &[f64]) -> Vec<f64> {
    match sorted.first() {
        Some(&first) => {
            let idx = ((sorted.len() as f64) * LEVEL_PERCENTILE).floor() as usize;
            vec![first, sorted[idx.min(sorted.len() - 1)]]
        }
        None => Vec::new(),
    }
}

/// Compares the first and last of the trailing samples against a ±2% band.
pub fn determine_trend(prices: &[f64]) -> Trend {
    if prices.len() < TREND_LOOKBACK {
        return Trend::Neutral;
    }
    let recent = &prices[prices.len() - TREND_LOOKBACK..];
    let (first, last) = (recent[0], recent[TREND_LOOKBACK - 1]);
    if last > first * (1.0 + TREND_THRESHOLD) {
        Trend::Bullish
    } else if last < first * (1.0 - TREND_THRESHOLD) {
        Trend::Bearish
    } else {
        Trend::Neutral
    }
}

/// Latest volume over the mean of the earlier ones. 1.0 when there is no baseline.
fn volume_change(volumes: &[f64]) -> f64 {
    let Some((&latest, previous)) = volumes.split_last() else {
        return 1.0;
    };
    let baseline = indicators::sma(previous);
    if previous.is_empty() || baseline <= 0.0 {
        return 1.0;
    }
    latest / baseline
}

fn analyze(symbol: &str, window: &PriceWindow) -> Option<PriceAnalysis> {
    if window.len() < 2 {
        return None;
    }
    let prices = window.prices();
    let volumes = window.volumes();

    let current_price = prices[prices.len() - 1];
    let previous_price = prices[prices.len() - 2];
    let price_change = current_price - previous_price;
    let price_change_percent = if previous_price != 0.0 {
        price_change / previous_price * 100.0
    } else {
        0.0
    };

    Some(PriceAnalysis {
        symbol: symbol.to_string(),
        current_price,
        price_change,
        price_change_percent,
        volume: window.last_volume().unwrap_or(0.0),
        volume_change: volume_change(&volumes),
        volatility: indicators::std_dev(&prices),
        support_levels: support_levels(&prices),
        resistance_levels: resistance_levels(&prices),
        trend: determine_trend(&prices),
        rsi: indicators::rsi(&prices, RSI_PERIOD),
        moving_average: Some(indicators::sma(&prices)),
        updated_at: Utc::now(),
    })
}

/// Rolling per-symbol history and the latest analysis derived from it.
#[derive(Clone)]
pub struct AnalyticsEngine {
    history: HistoryStore,
    analyses: Arc<DashMap<String, PriceAnalysis>>,
}

impl AnalyticsEngine {
    pub fn new(window_size: usize) -> Self {
        Self {
            history: HistoryStore::new(window_size),
            analyses: Arc::new(DashMap::new()),
        }
    }

    /// Append the tick and recompute. `None` until the symbol has two samples.
    pub fn update(&self, tick: &PriceTick) -> Option<PriceAnalysis> {
        let analysis = self
            .history
            .record_with(&tick.symbol, tick.price, tick.volume, |window| {
                let analysis = analyze(&tick.symbol, window)?;
                // Cache while the window lock is still held so the cache never
                // goes backwards relative to the history.
                self.analyses.insert(tick.symbol.clone(), analysis.clone());
                Some(analysis)
            });
        if let Some(a) = &analysis {
            debug!(
                "📊 [ANALYTICS] {} px={:.8} trend={:?} rsi={:?} vol={:.4}",
                a.symbol, a.current_price, a.trend, a.rsi, a.volatility
            );
        }
        analysis
    }

    pub fn get_analysis(&self, symbol: &str) -> Option<PriceAnalysis> {
        self.analyses.get(symbol).map(|a| a.clone())
    }

    /// All analyses sorted by symbol.
    pub fn get_all(&self) -> Vec<PriceAnalysis> {
        let mut all: Vec<PriceAnalysis> = self.analyses.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        all
    }

    pub fn history(&self, symbol: &str) -> Vec<f64> {
        self.history.prices(symbol)
    }

    pub fn window_size(&self) -> usize {
        self.history.limit
    }

    pub fn reset(&self) {
        self.history.clear();
        self.analyses.clear();
    }
}
