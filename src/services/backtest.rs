//! Historical replay through the same exit → admission → execution → ledger
//! path the live engine uses.
//!
//! Points are processed strictly in order and the strategy only ever sees
//! history up to and including the current point. With a fixed seed the equity
//! curve and trade list are identical run to run.

use chrono::{DateTime, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SimulationConfig;
use crate::error::{SimError, ValidationError};
use crate::services::analytics::AnalyticsEngine;
use crate::services::decision::DecisionEngine;
use crate::services::engine::StopSignal;
use crate::services::execution::{ExecutionConfig, ExecutionSimulator};
use crate::services::ledger::{CloseOrder, OpenOrder, PortfolioLedger};
use crate::services::reporting::PerformanceMetrics;
use crate::services::risk::RiskManager;
use crate::types::{Candle, ExitReason, Portfolio, Position, PriceAnalysis, Trade, TradingDecision};

/// What a strategy may look at for one point. Nothing past `index` is reachable.
pub struct StrategyContext<'a> {
    pub symbol: &'a str,
    pub index: usize,
    pub candle: &'a Candle,
    pub analysis: Option<&'a PriceAnalysis>,
    /// Closes seen so far, bounded by the analytics window.
    pub history: &'a [f64],
    pub position: Option<&'a Position>,
    pub portfolio: Portfolio,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub cash: f64,
    pub equity: f64,
    pub total_value: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub symbol: String,
    pub seed: Option<u64>,
    pub points_processed: usize,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub metrics: PerformanceMetrics,
    pub final_portfolio: Portfolio,
    pub rejected_admissions: usize,
    pub failed_orders: usize,
    /// True when the run ended early on the stop signal.
    pub stopped: bool,
}

impl SimulationResult {
    pub fn total_values(&self) -> Vec<f64> {
        self.equity_curve.iter().map(|p| p.total_value).collect()
    }
}

/// Strictly increasing timestamps and valid prices, checked before anything runs.
pub fn validate_series(series: &[Candle], symbol: &str) -> Result<(), ValidationError> {
    for (index, candle) in series.iter().enumerate() {
        candle.to_tick(symbol).validate()?;
        if index > 0 && candle.timestamp <= series[index - 1].timestamp {
            return Err(ValidationError::OutOfOrder { index });
        }
    }
    Ok(())
}

/// True when `decision` points the other way from the open position.
pub(crate) fn is_reversal(position: &Position, decision: &TradingDecision) -> bool {
    decision
        .decision
        .direction()
        .is_some_and(|d| d == position.direction.opposite())
}

/// Default strategy: the decision engine over the current analysis.
pub fn decision_strategy(engine: DecisionEngine) -> impl FnMut(&StrategyContext<'_>) -> TradingDecision {
    move |ctx| match ctx.analysis {
        Some(analysis) => engine.decide(analysis),
        None => TradingDecision::neutral(ctx.symbol),
    }
}

pub struct Backtester {
    config: SimulationConfig,
    close_open_at_end: bool,
}

impl Backtester {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            close_open_at_end: true,
        }
    }

    pub fn with_close_open_at_end(mut self, close: bool) -> Self {
        self.close_open_at_end = close;
        self
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn run<F>(&self, series: &[Candle], symbol: &str, strategy: F) -> Result<SimulationResult, SimError>
    where
        F: FnMut(&StrategyContext<'_>) -> TradingDecision,
    {
        self.run_with_stop(series, symbol, strategy, &StopSignal::new())
    }

    /// Same as `run`, but checks `stop` before every point.
    pub fn run_with_stop<F>(
        &self,
        series: &[Candle],
        symbol: &str,
        mut strategy: F,
        stop: &StopSignal,
    ) -> Result<SimulationResult, SimError>
    where
        F: FnMut(&StrategyContext<'_>) -> TradingDecision,
    {
        self.config.validate()?;
        if symbol.trim().is_empty() {
            return Err(ValidationError::EmptySymbol.into());
        }
        validate_series(series, symbol)?;

        let ledger = PortfolioLedger::with_exit_defaults(
            self.config.initial_capital,
            self.config.stop_loss_percent,
            self.config.take_profit_percent,
        );
        let analytics = AnalyticsEngine::new(self.config.history_window_size);
        let risk = RiskManager::new(self.config.clone());
        let executor = ExecutionSimulator::new(ExecutionConfig::from(&self.config));
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        info!(
            "🧪 [BACKTEST] Starting {} over {} points (seed {:?})",
            symbol,
            series.len(),
            self.config.seed
        );

        let mut equity_curve = Vec::with_capacity(series.len());
        let mut rejected_admissions = 0usize;
        let mut failed_orders = 0usize;
        let mut current_day: Option<NaiveDate> = None;
        let mut stopped = false;

        let close = |position: &Position, price: f64, at: DateTime<Utc>, reason: ExitReason, rng: &mut StdRng| {
            let fill = executor.simulate_close(position, price, rng);
            let trade = ledger.close_position(
                CloseOrder::new(&position.symbol, fill.executed_price)
                    .with_fee(fill.fee)
                    .at(at)
                    .reason(reason),
            )?;
            risk.record_realized_pnl(trade.net_pnl());
            debug!(
                "🧪 [BACKTEST] {:?} exit {} @ {:.8} net={:.2}",
                reason,
                trade.symbol,
                trade.exit_price,
                trade.net_pnl()
            );
            Ok::<Trade, SimError>(trade)
        };

        for (index, candle) in series.iter().enumerate() {
            if stop.is_stopped() {
                info!("🧪 [BACKTEST] Stop signalled at point {}", index);
                stopped = true;
                break;
            }

            let day = candle.timestamp.date_naive();
            if current_day.is_some_and(|d| d != day) {
                risk.reset_daily();
            }
            current_day = Some(day);

            let tick = candle.to_tick(symbol);
            let analysis = analytics.update(&tick);
            ledger.update_price(symbol, tick.price);

            if let Some(position) = ledger.position(symbol) {
                if let Some(reason) = position.exit_trigger(tick.price) {
                    close(&position, tick.price, candle.timestamp, reason, &mut rng)?;
                }
            }

            let history = analytics.history(symbol);
            let position = ledger.position(symbol);
            let mut decision = strategy(&StrategyContext {
                symbol,
                index,
                candle,
                analysis: analysis.as_ref(),
                history: &history,
                position: position.as_ref(),
                portfolio: ledger.portfolio(),
            });
            decision.symbol = symbol.to_string();

            match position {
                Some(position) => {
                    if is_reversal(&position, &decision) {
                        close(&position, tick.price, candle.timestamp, ExitReason::Reversal, &mut rng)?;
                    }
                }
                None if decision.decision.direction().is_some() => {
                    decision.entry_price.get_or_insert(tick.price);
                    let admitted = risk
                        .check_entry(&decision, tick.price)
                        .and_then(|_| risk.check_admission(&decision, &ledger.portfolio(), &ledger.positions()));
                    match admitted {
                        Ok(admission) => {
                            let fill = executor.simulate_open(&decision, tick.price, admission.quantity, &mut rng);
                            if fill.success {
                                let order = OpenOrder::new(
                                    symbol,
                                    admission.direction,
                                    fill.executed_price,
                                    admission.quantity,
                                )
                                .with_stops(Some(admission.stop_loss), Some(admission.take_profit))
                                .with_fee(fill.fee)
                                .at(candle.timestamp);
                                if let Err(e) = ledger.open_position(order) {
                                    warn!("🧪 [BACKTEST] Ledger refused open at point {}: {}", index, e);
                                    rejected_admissions += 1;
                                }
                            } else {
                                failed_orders += 1;
                            }
                        }
                        Err(_) => rejected_admissions += 1,
                    }
                }
                None => {}
            }

            let portfolio = ledger.portfolio();
            equity_curve.push(EquityPoint {
                timestamp: candle.timestamp,
                cash: portfolio.cash,
                equity: portfolio.equity,
                total_value: portfolio.total_value,
            });
        }

        if self.close_open_at_end && !stopped {
            if let (Some(position), Some(last)) = (ledger.position(symbol), series.last()) {
                close(&position, last.close, last.timestamp, ExitReason::EndOfData, &mut rng)?;
                if let Some(point) = equity_curve.last_mut() {
                    let portfolio = ledger.portfolio();
                    point.cash = portfolio.cash;
                    point.equity = portfolio.equity;
                    point.total_value = portfolio.total_value;
                }
            }
        }

        let trades = ledger.trades();
        let total_values: Vec<f64> = equity_curve.iter().map(|p| p.total_value).collect();
        let metrics = PerformanceMetrics::compute(&trades, &total_values, self.config.initial_capital);
        let final_portfolio = ledger.portfolio();

        info!(
            "🧪 [BACKTEST] Done {}: {} trades, return {:.2}%, max DD {:.2}%, final ${:.2}",
            symbol,
            trades.len(),
            metrics.total_return * 100.0,
            metrics.max_drawdown * 100.0,
            final_portfolio.total_value
        );

        Ok(SimulationResult {
            symbol: symbol.to_string(),
            seed: self.config.seed,
            points_processed: equity_curve.len(),
            trades,
            equity_curve,
            metrics,
            final_portfolio,
            rejected_admissions,
            failed_orders,
            stopped,
        })
    }
}
