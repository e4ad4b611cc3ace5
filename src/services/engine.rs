//! Live tick pipeline.
//!
//! Each symbol gets its own actor task fed by an unbounded channel. Ticks for
//! one symbol are processed strictly in order; different symbols run in
//! parallel. Opens are executed after a simulated latency on a spawned task
//! whose completion is sent back into the symbol's actor, so all ledger
//! mutations for a symbol still happen on that actor.
//!
//! Every deferred open is stamped with the run generation it was scheduled
//! in. `reset()` bumps the generation and cancels the previous run's orders,
//! so a late fill can never land in the fresh ledger.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bus::EventBus;
use crate::config::{AppConfig, ChatterLevel, SimulationConfig};
use crate::constants::engine::SHUTDOWN_GRACE;
use crate::constants::events::{
    ADMISSION_REJECTED, ORDER_FAILED, POSITION_CLOSED, POSITION_OPENED, STOP_LOSS_TRIGGERED, TAKE_PROFIT_TRIGGERED,
    TICK_DROPPED,
};
use crate::data::alert_store::AlertStore;
use crate::error::{Rejection, SimError, ValidationError};
use crate::events::{AdmissionRejected, Event, OrderRejected, TickProcessed};
use crate::feed::MarketFeed;
use crate::services::alerts::AlertEngine;
use crate::services::analytics::AnalyticsEngine;
use crate::services::backtest::is_reversal;
use crate::services::decision::DecisionEngine;
use crate::services::execution::{ExecutionConfig, ExecutionSimulator, OpenFill};
use crate::services::ledger::{CloseOrder, OpenOrder, PortfolioLedger};
use crate::services::notifications::{deliver, Notification, NotificationKind, NotificationSink};
use crate::services::risk::{Admission, RiskManager};
use crate::types::{ExitReason, Portfolio, Position, PriceTick, TradingDecision};

/// Cooperative shutdown flag shared by the engine, its workers and the backtester.
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once `stop()` has been called.
    pub async fn stopped(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent stop() is not missed.
            notified.as_mut().enable();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

enum SymbolCommand {
    Tick(PriceTick),
    OpenCompleted {
        decision: TradingDecision,
        admission: Admission,
        fill: OpenFill,
        at: DateTime<Utc>,
        generation: u64,
    },
    Flush(oneshot::Sender<()>),
}

struct SymbolWorker {
    tx: mpsc::UnboundedSender<SymbolCommand>,
    task: JoinHandle<()>,
}

struct SymbolState {
    symbol: String,
    /// Generation of the open this symbol is waiting on, if any.
    order_in_flight: Option<u64>,
    rng: StdRng,
}

struct EngineInner {
    config: SimulationConfig,
    chatter: ChatterLevel,
    timeout: Duration,
    ledger: PortfolioLedger,
    analytics: AnalyticsEngine,
    alerts: AlertEngine,
    decision: DecisionEngine,
    risk: RiskManager,
    executor: ExecutionSimulator,
    sink: Arc<dyn NotificationSink>,
    bus: EventBus,
    stop: StopSignal,
    workers: DashMap<String, SymbolWorker>,
    // Admitted opens still waiting on their fill; counted against max_positions.
    // Also guards generation changes.
    reservations: Mutex<usize>,
    generation: AtomicU64,
    // Cancels the current generation's in-flight opens.
    order_cancel: Mutex<StopSignal>,
}

/// Deterministic per-symbol seed so symbols draw independent, reproducible fills.
fn symbol_seed(seed: u64, symbol: &str) -> u64 {
    symbol
        .bytes()
        .fold(seed ^ 0xcbf2_9ce4_8422_2325, |h, b| (h ^ b as u64).wrapping_mul(0x0100_0000_01b3))
}

#[derive(Clone)]
pub struct SimulationEngine {
    inner: Arc<EngineInner>,
}

impl SimulationEngine {
    pub fn new(config: &AppConfig, store: Arc<dyn AlertStore>, sink: Arc<dyn NotificationSink>) -> Self {
        let sim = config.simulation.clone();
        let timeout = config.external_timeout();
        let inner = EngineInner {
            chatter: config.chatter_level,
            timeout,
            ledger: PortfolioLedger::with_exit_defaults(
                sim.initial_capital,
                sim.stop_loss_percent,
                sim.take_profit_percent,
            ),
            analytics: AnalyticsEngine::new(sim.history_window_size),
            alerts: AlertEngine::new(store, sink.clone(), timeout),
            decision: DecisionEngine::new(sim.decision_threshold),
            risk: RiskManager::new(sim.clone()),
            executor: ExecutionSimulator::new(ExecutionConfig::from(&sim)),
            sink,
            bus: EventBus::new(config.event_bus_capacity),
            stop: StopSignal::new(),
            workers: DashMap::new(),
            reservations: Mutex::new(0),
            generation: AtomicU64::new(0),
            order_cancel: Mutex::new(StopSignal::new()),
            config: sim,
        };
        Self { inner: Arc::new(inner) }
    }

    pub fn ledger(&self) -> &PortfolioLedger {
        &self.inner.ledger
    }

    pub fn analytics(&self) -> &AnalyticsEngine {
        &self.inner.analytics
    }

    pub fn alerts(&self) -> &AlertEngine {
        &self.inner.alerts
    }

    pub fn risk(&self) -> &RiskManager {
        &self.inner.risk
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.inner.stop.clone()
    }

    pub fn portfolio(&self) -> Portfolio {
        self.inner.ledger.portfolio()
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stop.is_stopped()
    }

    /// Admitted opens that have not filled, failed or been cancelled yet.
    pub fn pending_orders(&self) -> usize {
        *self.inner.reservations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Restore persisted alerts. A store failure is logged and the engine starts empty.
    pub async fn load_alerts(&self) -> usize {
        match self.inner.alerts.load().await {
            Ok(n) => n,
            Err(e) => {
                warn!("⚠️ [ENGINE] Could not load alerts: {}", e);
                0
            }
        }
    }

    /// Validate and route a tick to its symbol's worker. Never blocks.
    /// Returns `Ok(false)` when the engine is stopped and the tick was dropped.
    pub fn ingest(&self, tick: PriceTick) -> Result<bool, ValidationError> {
        if let Err(e) = tick.validate() {
            warn!(event = TICK_DROPPED, "⚠️ [ENGINE] Dropping tick: {}", e);
            return Err(e);
        }
        if self.inner.stop.is_stopped() {
            return Ok(false);
        }

        let worker = self
            .inner
            .workers
            .entry(tick.symbol.clone())
            .or_insert_with(|| self.spawn_worker(&tick.symbol));
        if worker.tx.send(SymbolCommand::Tick(tick)).is_err() {
            debug!("[ENGINE] Worker channel closed, tick dropped");
            return Ok(false);
        }
        Ok(true)
    }

    fn spawn_worker(&self, symbol: &str) -> SymbolWorker {
        let (tx, rx) = mpsc::unbounded_channel();
        let rng = match self.inner.config.seed {
            Some(seed) => StdRng::seed_from_u64(symbol_seed(seed, symbol)),
            None => StdRng::from_entropy(),
        };
        let state = SymbolState {
            symbol: symbol.to_string(),
            order_in_flight: None,
            rng,
        };
        let task = tokio::spawn(run_worker(self.inner.clone(), state, rx, tx.clone()));
        info!("⚙️ [ENGINE] Started worker for {}", symbol);
        SymbolWorker { tx, task }
    }

    /// Consume a feed until it ends or stop is signalled.
    pub async fn run(&self, feed: Arc<dyn MarketFeed>) -> Result<(), SimError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let name = feed.name();
        let mut feed_task = tokio::spawn(async move { feed.start(tx).await });
        info!("⚙️ [ENGINE] Consuming {} feed", name);

        loop {
            tokio::select! {
                _ = self.inner.stop.stopped() => break,
                tick = rx.recv() => match tick {
                    Some(tick) => {
                        let _ = self.ingest(tick);
                    }
                    None => break,
                },
            }
        }

        if self.inner.stop.is_stopped() {
            feed_task.abort();
            return Ok(());
        }
        match (&mut feed_task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!("❌ [ENGINE] {} feed failed: {}", name, e);
                Err(e.into())
            }
            Err(e) => {
                error!("❌ [ENGINE] {} feed task panicked: {}", name, e);
                Ok(())
            }
        }
    }

    /// Wait until every worker has drained its queue and no order is in flight.
    pub async fn settle(&self) {
        loop {
            let senders: Vec<mpsc::UnboundedSender<SymbolCommand>> =
                self.inner.workers.iter().map(|w| w.tx.clone()).collect();
            for tx in senders {
                let (done_tx, done_rx) = oneshot::channel();
                if tx.send(SymbolCommand::Flush(done_tx)).is_ok() {
                    let _ = done_rx.await;
                }
            }
            if self.pending_orders() == 0 || self.inner.stop.is_stopped() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    /// Signal stop, cancel in-flight orders and wait for workers to finish their
    /// current command.
    pub async fn stop(&self) {
        self.inner.stop.stop();
        let symbols: Vec<String> = self.inner.workers.iter().map(|w| w.key().clone()).collect();
        for symbol in symbols {
            if let Some((_, worker)) = self.inner.workers.remove(&symbol) {
                match tokio::time::timeout(SHUTDOWN_GRACE, worker.task).await {
                    Ok(_) => debug!("[ENGINE] Worker {} stopped", symbol),
                    Err(_) => warn!("⚠️ [ENGINE] Worker {} did not stop within {:?}", symbol, SHUTDOWN_GRACE),
                }
            }
        }
        info!("🛑 [ENGINE] Stopped");
        notify(
            &self.inner,
            Notification::new(NotificationKind::Info, "Simulation stopped", "Trading simulation has been stopped"),
        )
        .await;
    }

    /// External day-boundary signal.
    pub fn day_boundary(&self) {
        self.inner.risk.reset_daily();
    }

    /// Current run generation. Bumped by every `reset()`.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Cancel in-flight opens, then start from a fresh ledger, analytics and
    /// daily risk. Workers and alerts are kept.
    pub async fn reset(&self) {
        {
            let mut reserved = self.inner.reservations.lock().unwrap_or_else(PoisonError::into_inner);
            let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let cancelled = std::mem::replace(
                &mut *self.inner.order_cancel.lock().unwrap_or_else(PoisonError::into_inner),
                StopSignal::new(),
            );
            cancelled.stop();
            info!(
                "🔄 [ENGINE] Reset to generation {} ({} in-flight orders cancelled)",
                generation, *reserved
            );
            *reserved = 0;
            self.inner.ledger.reset(self.inner.config.initial_capital);
            self.inner.analytics.reset();
            self.inner.risk.reset_daily();
        }
        notify(
            &self.inner,
            Notification::new(NotificationKind::Info, "Simulation reset", "All simulation data has been reset"),
        )
        .await;
    }
}

async fn run_worker(
    inner: Arc<EngineInner>,
    mut state: SymbolState,
    mut rx: mpsc::UnboundedReceiver<SymbolCommand>,
    tx: mpsc::UnboundedSender<SymbolCommand>,
) {
    loop {
        let command = tokio::select! {
            biased;
            _ = inner.stop.stopped() => break,
            cmd = rx.recv() => match cmd {
                Some(cmd) => cmd,
                None => break,
            },
        };
        match command {
            SymbolCommand::Tick(tick) => process_tick(&inner, &mut state, tick, &tx).await,
            SymbolCommand::OpenCompleted {
                decision,
                admission,
                fill,
                at,
                generation,
            } => complete_open(&inner, &mut state, decision, admission, fill, at, generation).await,
            SymbolCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("[ENGINE] Worker {} exiting", state.symbol);
}

async fn process_tick(
    inner: &Arc<EngineInner>,
    state: &mut SymbolState,
    tick: PriceTick,
    tx: &mpsc::UnboundedSender<SymbolCommand>,
) {
    let (analysis, fired) = tokio::join!(
        async { inner.analytics.update(&tick) },
        inner.alerts.check_alerts(&tick.symbol, tick.price)
    );
    for alert in fired {
        inner.bus.emit(Event::AlertTriggered(alert));
    }

    inner.ledger.update_price(&tick.symbol, tick.price);

    if let Some(position) = inner.ledger.position(&tick.symbol) {
        if let Some(reason) = position.exit_trigger(tick.price) {
            close_now(inner, state, &position, tick.price, tick.timestamp, reason).await;
        }
    }

    let generation = inner.generation.load(Ordering::SeqCst);
    if state.order_in_flight != Some(generation) {
        let mut decision = match &analysis {
            Some(a) => inner.decision.decide(a),
            None => TradingDecision::neutral(&tick.symbol),
        };

        match inner.ledger.position(&tick.symbol) {
            Some(position) => {
                if is_reversal(&position, &decision) {
                    close_now(inner, state, &position, tick.price, tick.timestamp, ExitReason::Reversal).await;
                }
            }
            None if decision.decision.direction().is_some() => {
                decision.entry_price.get_or_insert(tick.price);
                let admitted = inner
                    .risk
                    .check_entry(&decision, tick.price)
                    .and_then(|_| admit(inner, &decision));
                match admitted {
                    Ok((admission, generation)) => {
                        schedule_open(inner, state, decision, admission, generation, &tick, tx)
                    }
                    Err(rejection) => reject_admission(inner, decision, rejection).await,
                }
            }
            None => {}
        }
    }

    let total_value = inner.ledger.portfolio().total_value;
    if inner.chatter >= ChatterLevel::Verbose {
        info!("📈 [ENGINE] {} @ {:.8} total=${:.2}", tick.symbol, tick.price, total_value);
    }
    inner.bus.emit(Event::Tick(TickProcessed {
        tick,
        analysis,
        total_value,
    }));
}

async fn reject_admission(inner: &EngineInner, decision: TradingDecision, rejection: Rejection) {
    info!(event = ADMISSION_REJECTED, "🛡️ [ENGINE] {} not admitted: {}", decision.symbol, rejection);
    let warning = match &rejection {
        Rejection::MaxPositions { max, .. } => Some(Notification::new(
            NotificationKind::Warning,
            "Max positions reached",
            format!(
                "Cannot open a position on {} - at most {} positions allowed",
                decision.symbol, max
            ),
        )),
        _ => None,
    };
    inner
        .bus
        .emit(Event::AdmissionRejected(AdmissionRejected { decision, rejection }));
    if let Some(warning) = warning {
        notify(inner, warning).await;
    }
}

/// Admission plus a slot reservation, under one lock so concurrent symbols
/// cannot both take the last position slot. Returns the generation the
/// reservation belongs to.
fn admit(inner: &EngineInner, decision: &TradingDecision) -> Result<(Admission, u64), Rejection> {
    let mut reserved = inner.reservations.lock().unwrap_or_else(PoisonError::into_inner);
    let positions = inner.ledger.positions();
    let max = inner.config.max_positions;
    if positions.len() + *reserved >= max {
        return Err(Rejection::MaxPositions {
            open: positions.len() + *reserved,
            max,
        });
    }
    let admission = inner
        .risk
        .check_admission(decision, &inner.ledger.portfolio(), &positions)?;
    *reserved += 1;
    Ok((admission, inner.generation.load(Ordering::SeqCst)))
}

/// Reservations from a previous generation were already zeroed by `reset()`.
fn release_reservation(inner: &EngineInner, generation: u64) {
    let mut reserved = inner.reservations.lock().unwrap_or_else(PoisonError::into_inner);
    if inner.generation.load(Ordering::SeqCst) == generation {
        *reserved = reserved.saturating_sub(1);
    }
}

fn schedule_open(
    inner: &Arc<EngineInner>,
    state: &mut SymbolState,
    decision: TradingDecision,
    admission: Admission,
    generation: u64,
    tick: &PriceTick,
    tx: &mpsc::UnboundedSender<SymbolCommand>,
) {
    let fill = inner
        .executor
        .simulate_open(&decision, tick.price, admission.quantity, &mut state.rng);
    state.order_in_flight = Some(generation);

    let latency = fill.latency;
    let at = tick.timestamp;
    let stop = inner.stop.clone();
    let cancel = inner
        .order_cancel
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    let tx = tx.clone();
    let inner = inner.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(latency) => {
                let symbol = decision.symbol.clone();
                let command = SymbolCommand::OpenCompleted { decision, admission, fill, at, generation };
                if tx.send(command).is_err() {
                    release_reservation(&inner, generation);
                    debug!("[ENGINE] Worker for {} gone, order dropped", symbol);
                }
            }
            _ = stop.stopped() => {
                release_reservation(&inner, generation);
                info!("🛑 [ENGINE] Cancelled in-flight order for {}", decision.symbol);
            }
            _ = cancel.stopped() => {
                info!("🔄 [ENGINE] Reset cancelled in-flight order for {}", decision.symbol);
            }
        }
    });
}

async fn complete_open(
    inner: &Arc<EngineInner>,
    state: &mut SymbolState,
    decision: TradingDecision,
    admission: Admission,
    fill: OpenFill,
    at: DateTime<Utc>,
    generation: u64,
) {
    // Generation check, ledger write and release happen under the reservation
    // lock so a concurrent reset() either sees the position or drops the fill.
    let result = {
        let mut reserved = inner.reservations.lock().unwrap_or_else(PoisonError::into_inner);
        if generation != inner.generation.load(Ordering::SeqCst) {
            debug!("[ENGINE] Dropping fill for {} from before reset", decision.symbol);
            return;
        }
        *reserved = reserved.saturating_sub(1);
        fill.success.then(|| {
            let order = OpenOrder::new(&decision.symbol, admission.direction, fill.executed_price, admission.quantity)
                .with_stops(Some(admission.stop_loss), Some(admission.take_profit))
                .with_fee(fill.fee)
                .at(at);
            inner.ledger.open_position(order)
        })
    };
    state.order_in_flight = None;

    let Some(result) = result else {
        let reason = "simulated execution failure".to_string();
        warn!(event = ORDER_FAILED, "⚡ [ENGINE] Open {} failed: {}", decision.symbol, reason);
        inner.bus.emit(Event::OrderRejected(OrderRejected {
            symbol: decision.symbol.clone(),
            reason: reason.clone(),
        }));
        notify(
            inner,
            Notification::new(
                NotificationKind::Warning,
                format!("Order failed: {}", decision.symbol),
                reason,
            ),
        )
        .await;
        return;
    };

    match result {
        Ok(position) => {
            info!(
                event = POSITION_OPENED,
                "✅ [ENGINE] {} {:?} {} qty={:.8} @ {:.8}",
                fill.order_id.as_deref().unwrap_or("-"),
                position.direction,
                position.symbol,
                position.quantity,
                position.entry_price
            );
            let notification = Notification::new(
                NotificationKind::Success,
                format!("{:?} {}", position.direction, position.symbol),
                format!("Position opened at {:.2}", position.entry_price),
            )
            .with_symbol(position.symbol.clone(), position.entry_price);
            inner.bus.emit(Event::PositionOpened(position));
            notify(inner, notification).await;
        }
        Err(e) => {
            warn!(event = ORDER_FAILED, "⚡ [ENGINE] Ledger refused {}: {}", decision.symbol, e);
            inner.bus.emit(Event::OrderRejected(OrderRejected {
                symbol: decision.symbol,
                reason: e.to_string(),
            }));
        }
    }
}

async fn close_now(
    inner: &Arc<EngineInner>,
    state: &mut SymbolState,
    position: &Position,
    price: f64,
    at: DateTime<Utc>,
    reason: ExitReason,
) {
    match reason {
        ExitReason::StopLoss => info!(event = STOP_LOSS_TRIGGERED, "🛑 [ENGINE] Stop loss hit for {}", position.symbol),
        ExitReason::TakeProfit => {
            info!(event = TAKE_PROFIT_TRIGGERED, "🎯 [ENGINE] Take profit hit for {}", position.symbol)
        }
        _ => {}
    }

    let fill = inner.executor.simulate_close(position, price, &mut state.rng);
    let order = CloseOrder::new(&position.symbol, fill.executed_price)
        .with_fee(fill.fee)
        .at(at)
        .reason(reason);
    match inner.ledger.close_position(order) {
        Ok(trade) => {
            inner.risk.record_realized_pnl(trade.net_pnl());
            info!(
                event = POSITION_CLOSED,
                "🔒 [ENGINE] Closed {} ({:?}) net=${:.2}",
                trade.symbol,
                trade.exit_reason,
                trade.net_pnl()
            );
            let notification = Notification::new(
                NotificationKind::Info,
                format!("Position closed - {:?}", trade.exit_reason),
                format!(
                    "{} closed at {:.2} (P&L: {:.2})",
                    trade.symbol,
                    trade.exit_price,
                    trade.net_pnl()
                ),
            )
            .with_symbol(trade.symbol.clone(), trade.exit_price);
            inner.bus.emit(Event::PositionClosed(trade));
            notify(inner, notification).await;
        }
        Err(e) => error!("❌ [ENGINE] Close failed for {}: {}", position.symbol, e),
    }
}

async fn notify(inner: &EngineInner, notification: Notification) {
    deliver(inner.sink.as_ref(), notification, inner.timeout).await;
}
