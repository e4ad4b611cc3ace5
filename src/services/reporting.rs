//! Performance metrics over closed trades and equity curves, plus a bus
//! subscriber that keeps a running summary and an optional JSONL trade log.
//!
//! Every metric function is pure and total: empty input yields 0.0 rather
//! than NaN.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::{
    bus::EventBus,
    constants::risk::TRADING_DAYS_PER_YEAR,
    events::Event,
    types::Trade,
};

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// Fraction of trades with positive net PnL.
pub fn win_rate(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().filter(|t| t.net_pnl() > 0.0).count() as f64 / trades.len() as f64
}

/// Gross wins over gross losses. Infinite when there are wins and no losses.
pub fn profit_factor(trades: &[Trade]) -> f64 {
    let wins: f64 = trades.iter().map(Trade::net_pnl).filter(|p| *p > 0.0).sum();
    let losses: f64 = trades.iter().map(Trade::net_pnl).filter(|p| *p < 0.0).map(f64::abs).sum();
    if losses > 0.0 {
        wins / losses
    } else if wins > 0.0 {
        f64::INFINITY
    } else {
        0.0
    }
}

/// Per-trade net returns.
pub fn trade_returns(trades: &[Trade]) -> Vec<f64> {
    trades.iter().map(Trade::net_return).collect()
}

/// Mean over standard deviation of per-trade returns, annualised by √252.
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    let std = population_std(returns);
    if std > 0.0 {
        mean(returns) / std * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    }
}

/// Like Sharpe, but only returns below zero count towards the deviation.
pub fn sortino_ratio(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let downside: f64 = returns.iter().filter(|r| **r < 0.0).map(|r| r.powi(2)).sum();
    let downside_dev = (downside / returns.len() as f64).sqrt();
    if downside_dev > 0.0 {
        mean(returns) / downside_dev * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    }
}

/// Largest peak-to-trough decline as a fraction of the peak.
pub fn max_drawdown(equity: &[f64]) -> f64 {
    let Some(&first) = equity.first() else {
        return 0.0;
    };
    let mut peak = first;
    let mut max_dd = 0.0_f64;
    for &value in equity {
        if value > peak {
            peak = value;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - value) / peak);
        }
    }
    max_dd
}

/// `win_rate × avg_win − (1 − win_rate) × avg_loss`, with `avg_loss` as a magnitude.
pub fn expectancy(win_rate: f64, avg_win: f64, avg_loss: f64) -> f64 {
    win_rate * avg_win - (1.0 - win_rate) * avg_loss.abs()
}

/// Historical VaR: the return at the `(1 − confidence)` quantile. Usually negative.
pub fn value_at_risk(returns: &[f64], confidence: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(f64::total_cmp);
    let idx = ((1.0 - confidence) * sorted.len() as f64).floor() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Mean of the returns at or below the VaR threshold.
pub fn expected_shortfall(returns: &[f64], confidence: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let threshold = value_at_risk(returns, confidence);
    let tail: Vec<f64> = returns.iter().copied().filter(|r| *r <= threshold).collect();
    mean(&tail)
}

/// Kelly fraction `w − (1 − w) / r` for win rate `w` and win/loss ratio `r`.
pub fn kelly_fraction(win_rate: f64, win_loss_ratio: f64) -> f64 {
    if win_loss_ratio <= 0.0 || !win_loss_ratio.is_finite() {
        return 0.0;
    }
    win_rate - (1.0 - win_rate) / win_loss_ratio
}

/// Population standard deviation of a return series.
pub fn volatility(returns: &[f64]) -> f64 {
    population_std(returns)
}

fn covariance(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let (ma, mb) = (mean(a), mean(b));
    Some(a.iter().zip(b).map(|(x, y)| (x - ma) * (y - mb)).sum::<f64>() / a.len() as f64)
}

/// Pearson correlation. 0.0 for mismatched lengths or a flat series.
pub fn correlation(a: &[f64], b: &[f64]) -> f64 {
    let Some(cov) = covariance(a, b) else {
        return 0.0;
    };
    let (sa, sb) = (population_std(a), population_std(b));
    if sa > 0.0 && sb > 0.0 {
        cov / (sa * sb)
    } else {
        0.0
    }
}

/// Sensitivity of `asset` returns to `market` returns.
pub fn beta(asset: &[f64], market: &[f64]) -> f64 {
    let Some(cov) = covariance(asset, market) else {
        return 0.0;
    };
    let market_var = population_std(market).powi(2);
    if market_var > 0.0 {
        cov / market_var
    } else {
        0.0
    }
}

/// Jensen's alpha: mean asset return above what CAPM predicts from `beta`.
pub fn alpha(asset: &[f64], market: &[f64], risk_free: f64) -> f64 {
    if asset.is_empty() || market.is_empty() {
        return 0.0;
    }
    mean(asset) - (risk_free + beta(asset, market) * (mean(market) - risk_free))
}

/// Reward over risk for explicit levels. Without a target, or with no
/// distance to the stop, the ratio defaults to 2:1.
pub fn reward_to_risk(entry: f64, stop: f64, target: Option<f64>) -> f64 {
    let risk = (entry - stop).abs();
    match target {
        Some(t) if risk > 0.0 => (t - entry).abs() / risk,
        _ => 2.0,
    }
}

/// Headline ledger statistics. `win_rate` is a percentage here.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioStats {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub total_profit: f64,
    pub average_profit: f64,
}

impl PortfolioStats {
    pub fn from_trades(trades: &[Trade]) -> Self {
        let total_trades = trades.len();
        let winning_trades = trades.iter().filter(|t| t.net_pnl() > 0.0).count();
        let losing_trades = trades.iter().filter(|t| t.net_pnl() < 0.0).count();
        let total_profit: f64 = trades.iter().map(Trade::net_pnl).sum();
        let average_profit = if total_trades > 0 {
            total_profit / total_trades as f64
        } else {
            0.0
        };
        Self {
            total_trades,
            winning_trades,
            losing_trades,
            win_rate: win_rate(trades) * 100.0,
            total_profit,
            average_profit,
        }
    }
}

/// Full metric set for a finished run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Fraction in [0, 1].
    pub win_rate: f64,
    pub total_profit: f64,
    /// Fraction of initial capital.
    pub total_return: f64,
    pub profit_factor: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    /// Standard deviation of per-trade returns.
    pub volatility: f64,
    pub max_drawdown: f64,
    pub average_win: f64,
    pub average_loss: f64,
    pub expectancy: f64,
    pub value_at_risk_95: f64,
    pub expected_shortfall_95: f64,
    pub kelly_fraction: f64,
}

impl PerformanceMetrics {
    pub fn compute(trades: &[Trade], equity_curve: &[f64], initial_capital: f64) -> Self {
        let wins: Vec<f64> = trades.iter().map(Trade::net_pnl).filter(|p| *p > 0.0).collect();
        let losses: Vec<f64> = trades
            .iter()
            .map(Trade::net_pnl)
            .filter(|p| *p < 0.0)
            .map(f64::abs)
            .collect();
        let average_win = mean(&wins);
        let average_loss = mean(&losses);
        let rate = win_rate(trades);
        let returns = trade_returns(trades);

        let final_value = equity_curve.last().copied().unwrap_or(initial_capital);
        let total_return = if initial_capital > 0.0 {
            (final_value - initial_capital) / initial_capital
        } else {
            0.0
        };
        let kelly = if average_loss > 0.0 {
            kelly_fraction(rate, average_win / average_loss)
        } else {
            0.0
        };

        Self {
            total_trades: trades.len(),
            winning_trades: wins.len(),
            losing_trades: losses.len(),
            win_rate: rate,
            total_profit: trades.iter().map(Trade::net_pnl).sum(),
            total_return,
            profit_factor: profit_factor(trades),
            sharpe_ratio: sharpe_ratio(&returns),
            sortino_ratio: sortino_ratio(&returns),
            volatility: volatility(&returns),
            max_drawdown: max_drawdown(equity_curve),
            average_win,
            average_loss,
            expectancy: expectancy(rate, average_win, average_loss),
            value_at_risk_95: value_at_risk(&returns, 0.95),
            expected_shortfall_95: expected_shortfall(&returns, 0.95),
            kelly_fraction: kelly,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TradeLogEntry {
    pub ts: String,
    pub symbol: String,

    /// "opened" | "closed" | "failed" | "rejected"
    pub status: String,

    pub direction: Option<String>,
    pub qty: Option<f64>,
    pub price: Option<f64>,
    pub pnl: Option<f64>,

    /// Extra context (best-effort)
    pub notes: Option<String>,
}

/// Running counters built from bus events.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub opened: u64,
    pub closed: u64,
    pub order_failures: u64,
    pub admission_rejections: u64,
    pub alerts_triggered: u64,

    pub total_notional: f64,
    pub total_realized_pnl: f64,

    /// Per-symbol opened-position counts
    pub per_symbol: HashMap<String, u64>,

    /// Closed trades grouped by symbol
    pub history: HashMap<String, Vec<Trade>>,
}

impl PerformanceSummary {
    pub fn compute_stats(&self) -> PortfolioStats {
        let mut trades: Vec<Trade> = self.history.values().flatten().cloned().collect();
        trades.sort_by_key(|t| t.id);
        PortfolioStats::from_trades(&trades)
    }
}

#[derive(Clone)]
pub struct TradeReporter {
    summary: Arc<Mutex<PerformanceSummary>>,
    log_path: Option<PathBuf>,
}

impl TradeReporter {
    pub fn new(log_path: Option<PathBuf>) -> Self {
        Self {
            summary: Arc::new(Mutex::new(PerformanceSummary::default())),
            log_path,
        }
    }

    pub fn summary(&self) -> PerformanceSummary {
        self.summary.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn start(&self, event_bus: &EventBus) -> JoinHandle<()> {
        let mut rx = event_bus.subscribe();
        let reporter = self.clone();

        tokio::spawn(async move {
            info!("📈 [REPORT] TradeReporter started");
            loop {
                match rx.recv().await {
                    Ok(event) => reporter.on_event(&event),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        error!("📈 [REPORT] Lagged behind the bus, skipped {} events", n);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    pub fn on_event(&self, event: &Event) {
        let entry = {
            let mut s = self.summary.lock().unwrap_or_else(PoisonError::into_inner);
            match event {
                Event::PositionOpened(p) => {
                    s.opened += 1;
                    s.total_notional += p.entry_price * p.quantity;
                    *s.per_symbol.entry(p.symbol.clone()).or_insert(0) += 1;
                    Some(TradeLogEntry {
                        ts: Utc::now().to_rfc3339(),
                        symbol: p.symbol.clone(),
                        status: "opened".to_string(),
                        direction: Some(format!("{:?}", p.direction)),
                        qty: Some(p.quantity),
                        price: Some(p.entry_price),
                        pnl: None,
                        notes: Some(format!("sl={:.8} tp={:.8}", p.stop_loss, p.take_profit)),
                    })
                }
                Event::PositionClosed(t) => {
                    s.closed += 1;
                    s.total_realized_pnl += t.net_pnl();
                    s.history.entry(t.symbol.clone()).or_default().push(t.clone());
                    Some(TradeLogEntry {
                        ts: Utc::now().to_rfc3339(),
                        symbol: t.symbol.clone(),
                        status: "closed".to_string(),
                        direction: Some(format!("{:?}", t.direction)),
                        qty: Some(t.quantity),
                        price: Some(t.exit_price),
                        pnl: Some(t.net_pnl()),
                        notes: Some(format!("{:?}", t.exit_reason)),
                    })
                }
                Event::OrderRejected(r) => {
                    s.order_failures += 1;
                    Some(TradeLogEntry {
                        ts: Utc::now().to_rfc3339(),
                        symbol: r.symbol.clone(),
                        status: "failed".to_string(),
                        direction: None,
                        qty: None,
                        price: None,
                        pnl: None,
                        notes: Some(r.reason.clone()),
                    })
                }
                Event::AdmissionRejected(_) => {
                    s.admission_rejections += 1;
                    None
                }
                Event::AlertTriggered(_) => {
                    s.alerts_triggered += 1;
                    None
                }
                Event::Tick(_) => None,
            }
        };

        if let Some(entry) = entry {
            if let Err(e) = self.append_jsonl(&entry) {
                error!("📈 [REPORT] Failed to append trade log: {}", e);
            }
        }
    }

    fn append_jsonl(&self, entry: &TradeLogEntry) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        use std::io::Write;

        let Some(path) = &self.log_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut f = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        let line = serde_json::to_string(entry)?;
        writeln!(f, "{}", line)?;
        Ok(())
    }
}
