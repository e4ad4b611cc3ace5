//! Technical indicator library.
//!
//! Pure functions over price slices, oldest value first. Functions that need
//! a minimum amount of history return `None` until they have it.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Macd {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    /// (upper - lower) / middle
    pub bandwidth: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SupportResistance {
    /// Local minima, ascending.
    pub support: Vec<f64>,
    /// Local maxima, descending.
    pub resistance: Vec<f64>,
}

pub fn sma(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Exponential moving average seeded with the first value.
pub fn ema(values: &[f64], period: usize) -> f64 {
    ema_series(values, period).last().copied().unwrap_or(0.0)
}

/// EMA at every point of `values`, seeded with the first value.
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let Some(&first) = values.first() else {
        return out;
    };
    let k = 2.0 / (period.max(1) as f64 + 1.0);
    let mut current = first;
    out.push(current);
    for &v in &values[1..] {
        current = v * k + current * (1.0 - k);
        out.push(current);
    }
    out
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = sma(values);
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// RSI with Wilder smoothing. Needs `period + 1` prices.
pub fn rsi(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }

    let changes: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();
    let gain = |c: &f64| if *c > 0.0 { *c } else { 0.0 };
    let loss = |c: &f64| if *c < 0.0 { -*c } else { 0.0 };

    let mut avg_gain = changes[..period].iter().map(gain).sum::<f64>() / period as f64;
    let mut avg_loss = changes[..period].iter().map(loss).sum::<f64>() / period as f64;

    for c in &changes[period..] {
        avg_gain = (avg_gain * (period - 1) as f64 + gain(c)) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + loss(c)) / period as f64;
    }

    if avg_loss == 0.0 {
        return Some(if avg_gain == 0.0 { 50.0 } else { 100.0 });
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// MACD line, signal line and histogram. Needs `slow + signal` prices.
pub fn macd(prices: &[f64], fast: usize, slow: usize, signal: usize) -> Option<Macd> {
    if fast == 0 || slow <= fast || signal == 0 || prices.len() < slow + signal {
        return None;
    }
    let fast_series = ema_series(prices, fast);
    let slow_series = ema_series(prices, slow);
    let macd_series: Vec<f64> = fast_series
        .iter()
        .zip(&slow_series)
        .map(|(f, s)| f - s)
        .collect();

    // Signal line only over the stretch where the slow EMA has warmed up.
    let warm = &macd_series[slow - 1..];
    let signal_line = ema(warm, signal);
    let macd_line = *macd_series.last()?;

    Some(Macd {
        macd: macd_line,
        signal: signal_line,
        histogram: macd_line - signal_line,
    })
}

pub fn bollinger_bands(prices: &[f64], period: usize, multiplier: f64) -> Option<BollingerBands> {
    if period == 0 || prices.len() < period {
        return None;
    }
    let recent = &prices[prices.len() - period..];
    let middle = sma(recent);
    let sd = std_dev(recent);
    let upper = middle + multiplier * sd;
    let lower = middle - multiplier * sd;
    let bandwidth = if middle != 0.0 { (upper - lower) / middle } else { 0.0 };
    Some(BollingerBands {
        upper,
        middle,
        lower,
        bandwidth,
    })
}

/// Average true range: SMA of the last `period` true ranges.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Option<f64> {
    let n = high.len();
    if period == 0 || low.len() != n || close.len() != n || n < period + 1 {
        return None;
    }
    let true_ranges: Vec<f64> = (1..n)
        .map(|i| {
            let hl = high[i] - low[i];
            let hc = (high[i] - close[i - 1]).abs();
            let lc = (low[i] - close[i - 1]).abs();
            hl.max(hc).max(lc)
        })
        .collect();
    Some(sma(&true_ranges[true_ranges.len() - period..]))
}

/// Volume-weighted average price. `None` on mismatched input or zero volume.
pub fn vwap(prices: &[f64], volumes: &[f64]) -> Option<f64> {
    if prices.is_empty() || prices.len() != volumes.len() {
        return None;
    }
    let total_volume: f64 = volumes.iter().sum();
    if total_volume <= 0.0 {
        return None;
    }
    let pv: f64 = prices.iter().zip(volumes).map(|(p, v)| p * v).sum();
    Some(pv / total_volume)
}

/// Stochastic %K over the last `period` bars.
pub fn stochastic(close: &[f64], high: &[f64], low: &[f64], period: usize) -> Option<f64> {
    if period == 0 || close.len() < period || high.len() < period || low.len() < period {
        return None;
    }
    let current = *close.last()?;
    let period_high = high[high.len() - period..].iter().copied().fold(f64::MIN, f64::max);
    let period_low = low[low.len() - period..].iter().copied().fold(f64::MAX, f64::min);
    let range = period_high - period_low;
    let range = if range == 0.0 { 1.0 } else { range };
    Some(100.0 * (current - period_low) / range)
}

/// Pivot detection over the last `lookback` prices: a point is a support
/// (resistance) when it is strictly below (above) its two neighbours on each side.
pub fn support_resistance(prices: &[f64], lookback: usize) -> SupportResistance {
    if lookback < 7 || prices.len() < lookback {
        return SupportResistance::default();
    }
    let recent = &prices[prices.len() - lookback..];
    let mut support = Vec::new();
    let mut resistance = Vec::new();

    for i in 3..recent.len() - 3 {
        let p = recent[i];
        let neighbours = [recent[i - 2], recent[i - 1], recent[i + 1], recent[i + 2]];
        if neighbours.iter().all(|n| p < *n) {
            support.push(p);
        }
        if neighbours.iter().all(|n| p > *n) {
            resistance.push(p);
        }
    }

    support.sort_by(|a, b| a.total_cmp(b));
    support.dedup();
    resistance.sort_by(|a, b| b.total_cmp(a));
    resistance.dedup();

    SupportResistance { support, resistance }
}

/// Least-squares slope of the last `period` prices against their index.
pub fn linear_slope(prices: &[f64], period: usize) -> Option<f64> {
    let (slope, _) = regression(prices, period)?;
    Some(slope)
}

/// |slope| weighted by the fit quality (r²). Zero until `period` prices exist.
pub fn trend_strength(prices: &[f64], period: usize) -> f64 {
    match regression(prices, period) {
        Some((slope, r_squared)) => slope.abs() * r_squared,
        None => 0.0,
    }
}

fn regression(prices: &[f64], period: usize) -> Option<(f64, f64)> {
    if period < 2 || prices.len() < period {
        return None;
    }
    let y = &prices[prices.len() - period..];
    let n = period as f64;
    let sum_x: f64 = (0..period).map(|i| i as f64).sum();
    let sum_y: f64 = y.iter().sum();
    let sum_xy: f64 = y.iter().enumerate().map(|(i, v)| i as f64 * v).sum();
    let sum_xx: f64 = (0..period).map(|i| (i * i) as f64).sum();
    let sum_yy: f64 = y.iter().map(|v| v * v).sum();

    let denom_x = n * sum_xx - sum_x * sum_x;
    if denom_x == 0.0 {
        return None;
    }
    let slope = (n * sum_xy - sum_x * sum_y) / denom_x;

    let denom_y = n * sum_yy - sum_y * sum_y;
    let r_squared = if denom_y <= 0.0 {
        // Flat series: perfectly explained, zero slope.
        1.0
    } else {
        ((n * sum_xy - sum_x * sum_y) / (denom_x * denom_y).sqrt()).powi(2)
    };
    Some((slope, r_squared))
}
