use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;

/// Bounded FIFO of recent prices and volumes for one symbol.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceWindow {
    prices: VecDeque<f64>,
    volumes: VecDeque<f64>,
    capacity: usize,
}

impl PriceWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            prices: VecDeque::with_capacity(capacity),
            volumes: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest once the window is full.
    pub fn push(&mut self, price: f64, volume: f64) {
        if self.prices.len() >= self.capacity {
            self.prices.pop_front();
            self.volumes.pop_front();
        }
        self.prices.push_back(price);
        self.volumes.push_back(volume);
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last_price(&self) -> Option<f64> {
        self.prices.back().copied()
    }

    pub fn last_volume(&self) -> Option<f64> {
        self.volumes.back().copied()
    }

    /// Prices oldest first.
    pub fn prices(&self) -> Vec<f64> {
        self.prices.iter().copied().collect()
    }

    /// Volumes oldest first, aligned with `prices()`.
    pub fn volumes(&self) -> Vec<f64> {
        self.volumes.iter().copied().collect()
    }
}

/// Per-symbol rolling history. Each symbol's window is updated under its own
/// map-entry lock, so concurrent writers for one symbol never interleave.
#[derive(Clone, Debug)]
pub struct HistoryStore {
    windows: Arc<DashMap<String, PriceWindow>>,
    pub limit: usize,
}

impl HistoryStore {
    pub fn new(limit: usize) -> Self {
        Self {
            windows: Arc::new(DashMap::new()),
            limit: limit.max(1),
        }
    }

    pub fn record(&self, symbol: &str, price: f64, volume: f64) {
        self.record_with(symbol, price, volume, |_| ());
    }

    /// Append a sample and run `f` on the updated window while still holding
    /// the symbol's lock.
    pub fn record_with<R>(
        &self,
        symbol: &str,
        price: f64,
        volume: f64,
        f: impl FnOnce(&PriceWindow) -> R,
    ) -> R {
        let mut window = self
            .windows
            .entry(symbol.to_string())
            .or_insert_with(|| PriceWindow::new(self.limit));
        window.push(price, volume);
        f(&window)
    }

    pub fn window(&self, symbol: &str) -> Option<PriceWindow> {
        self.windows.get(symbol).map(|w| w.clone())
    }

    pub fn prices(&self, symbol: &str) -> Vec<f64> {
        self.windows
            .get(symbol)
            .map(|w| w.prices())
            .unwrap_or_default()
    }

    pub fn latest_price(&self, symbol: &str) -> Option<f64> {
        self.windows.get(symbol).and_then(|w| w.last_price())
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.windows.iter().map(|e| e.key().clone()).collect();
        symbols.sort();
        symbols
    }

    pub fn clear(&self) {
        self.windows.clear();
    }
}
