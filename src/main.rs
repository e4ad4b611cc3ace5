use rust_tradesim::config::{AppConfig, RunMode};
use rust_tradesim::data::alert_store::JsonFileAlertStore;
use rust_tradesim::feed::RandomWalkFeed;
use rust_tradesim::services::backtest::{decision_strategy, Backtester};
use rust_tradesim::services::day_boundary::DayBoundaryScheduler;
use rust_tradesim::services::decision::DecisionEngine;
use rust_tradesim::services::engine::SimulationEngine;
use rust_tradesim::services::notifications::LoggingSink;
use rust_tradesim::services::reporting::TradeReporter;
use rust_tradesim::types::Candle;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();

    // Setup Logging
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting TradeSim...");

    // Load Configuration
    let config = AppConfig::load()?;
    info!("Loaded Configuration: mode={:?}, symbols={:?}", config.mode, config.symbols);

    match config.mode {
        RunMode::Backtest => run_backtest(&config).await,
        RunMode::Live => run_live(config).await,
    }
}

async fn run_backtest(config: &AppConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let path = config
        .backtest
        .data_path
        .clone()
        .ok_or("backtest.data_path is required in backtest mode")?;
    info!("🧪 Loading candles from {}", path.display());
    let raw = tokio::fs::read(&path).await?;
    let candles: Vec<Candle> = serde_json::from_slice(&raw)?;

    let backtester =
        Backtester::new(config.simulation.clone()).with_close_open_at_end(config.backtest.close_open_at_end);
    let strategy = decision_strategy(DecisionEngine::new(config.simulation.decision_threshold));
    let result = backtester.run(&candles, &config.backtest.symbol, strategy)?;

    println!("{}", serde_json::to_string_pretty(&result.metrics)?);
    Ok(())
}

async fn run_live(config: AppConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let store = Arc::new(JsonFileAlertStore::new(config.alert_store_path.clone()));
    let engine = SimulationEngine::new(&config, store, Arc::new(LoggingSink));
    let restored = engine.load_alerts().await;
    info!("🔔 Restored {} alerts", restored);

    let reporter = TradeReporter::new(Some("data/trade_log.jsonl".into()));
    reporter.start(engine.bus());

    let mut scheduler = DayBoundaryScheduler::new(engine.clone()).start().await?;

    let feed = Arc::new(RandomWalkFeed::from_config(&config));
    let runner = engine.clone();
    let run = tokio::spawn(async move { runner.run(feed).await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("🛑 Ctrl-C received, stopping"),
        res = run => match res {
            Ok(Ok(())) => info!("Feed finished"),
            Ok(Err(e)) => warn!("⚠️ Engine stopped with error: {}", e),
            Err(e) => warn!("⚠️ Engine task failed: {}", e),
        },
    }

    engine.stop().await;
    if let Err(e) = scheduler.shutdown().await {
        warn!("⚠️ Failed to shut down scheduler: {}", e);
    }

    let portfolio = engine.portfolio();
    let stats = engine.ledger().stats();
    info!(
        "📊 Final: total=${:.2} cash=${:.2} trades={} win rate={:.1}% profit=${:.2}",
        portfolio.total_value, portfolio.cash, stats.total_trades, stats.win_rate, stats.total_profit
    );
    info!("📈 Report: {:?}", reporter.summary().compute_stats());
    Ok(())
}
