//! Unit tests for the backtester.

#[cfg(test)]
mod backtest_tests {
    use crate::config::SimulationConfig;
    use crate::error::{SimError, ValidationError};
    use crate::services::backtest::*;
    use crate::services::decision::DecisionEngine;
    use crate::services::engine::StopSignal;
    use crate::types::{Candle, Direction, ExitReason, TradingDecision};
    use chrono::{Duration, TimeZone, Utc};

    fn series(closes: &[f64]) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                timestamp: start + Duration::minutes(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 10.0 + (i % 7) as f64,
            })
            .collect()
    }

    fn wave(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + 8.0 * (i as f64 / 9.0).sin() + 3.0 * (i as f64 / 2.3).cos())
            .collect()
    }

    fn config(seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed: Some(seed),
            ..SimulationConfig::frictionless()
        }
    }

    fn at(index: usize, direction: Direction) -> impl FnMut(&StrategyContext<'_>) -> TradingDecision {
        move |ctx| {
            if ctx.index == index {
                TradingDecision::directional(ctx.symbol, direction, 0.9)
            } else {
                TradingDecision::neutral(ctx.symbol)
            }
        }
    }

    // ============= Exits =============

    #[test]
    fn test_take_profit_exit() {
        let bt = Backtester::new(config(1));
        let result = bt
            .run(&series(&[100.0, 101.0, 102.0, 103.0, 105.0, 106.0]), "BTCUSDT", at(0, Direction::Long))
            .unwrap();
        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
        assert_eq!(trade.exit_price, 105.0);
        assert!((trade.quantity - 50.0).abs() < 1e-6);
        assert!((trade.pnl - 250.0).abs() < 1e-6);
        assert_eq!(result.points_processed, 6);
        assert!((result.final_portfolio.total_value - 10_250.0).abs() < 1e-6);
        assert!((result.metrics.total_return - 0.025).abs() < 1e-9);
    }

    #[test]
    fn test_stop_loss_exit_short() {
        let cfg = SimulationConfig {
            risk_per_trade: 0.005,
            ..config(1)
        };
        let result = Backtester::new(cfg)
            .run(&series(&[100.0, 101.0, 103.0, 99.0]), "ETHUSDT", at(0, Direction::Short))
            .unwrap();
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].exit_reason, ExitReason::StopLoss);
        assert!(result.trades[0].pnl < 0.0);
    }

    #[test]
    fn test_reversal_closes_position() {
        let bt = Backtester::new(config(1));
        let mut strategy = |ctx: &StrategyContext<'_>| match ctx.index {
            0 => TradingDecision::directional(ctx.symbol, Direction::Long, 0.9),
            2 => TradingDecision::directional(ctx.symbol, Direction::Short, 0.9),
            _ => TradingDecision::neutral(ctx.symbol),
        };
        let result = bt
            .run(&series(&[100.0, 100.5, 101.0, 101.0]), "BTCUSDT", &mut strategy)
            .unwrap();
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].exit_reason, ExitReason::Reversal);
        assert_eq!(result.final_portfolio.equity, 0.0);
    }

    #[test]
    fn test_open_position_closed_at_end_of_data() {
        let closes = [100.0, 100.5, 100.2, 100.8];
        let result = Backtester::new(config(1))
            .run(&series(&closes), "BTCUSDT", at(0, Direction::Long))
            .unwrap();
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].exit_reason, ExitReason::EndOfData);
        let last = result.equity_curve.last().unwrap();
        assert_eq!(last.total_value, result.final_portfolio.total_value);
        assert_eq!(last.equity, 0.0);

        let kept = Backtester::new(config(1))
            .with_close_open_at_end(false)
            .run(&series(&closes), "BTCUSDT", at(0, Direction::Long))
            .unwrap();
        assert!(kept.trades.is_empty());
        assert!(kept.final_portfolio.equity > 0.0);
    }

    // ============= Execution Outcomes =============

    #[test]
    fn test_failed_orders_counted() {
        let cfg = SimulationConfig {
            failure_probability: 1.0,
            ..config(3)
        };
        let result = Backtester::new(cfg)
            .run(&series(&[100.0, 101.0]), "BTCUSDT", at(0, Direction::Long))
            .unwrap();
        assert_eq!(result.failed_orders, 1);
        assert!(result.trades.is_empty());
        assert_eq!(result.final_portfolio.total_value, 10_000.0);
    }

    #[test]
    fn test_rejected_admissions_counted() {
        let cfg = SimulationConfig {
            max_risk_per_trade: 0.1,
            ..config(3)
        };
        let result = Backtester::new(cfg)
            .run(&series(&[100.0, 101.0]), "BTCUSDT", at(0, Direction::Long))
            .unwrap();
        assert_eq!(result.rejected_admissions, 1);
        assert!(result.trades.is_empty());
    }

    #[test]
    fn test_entry_far_from_market_is_refused() {
        let with_entry = |entry: f64| {
            move |ctx: &StrategyContext<'_>| {
                if ctx.index == 0 {
                    TradingDecision {
                        entry_price: Some(entry),
                        ..TradingDecision::directional(ctx.symbol, Direction::Long, 0.9)
                    }
                } else {
                    TradingDecision::neutral(ctx.symbol)
                }
            }
        };
        let closes = [100.0, 100.5, 101.0];

        let far = Backtester::new(config(4))
            .run(&series(&closes), "BTCUSDT", with_entry(94.0))
            .unwrap();
        assert_eq!(far.rejected_admissions, 1);
        assert!(far.trades.is_empty());
        assert_eq!(far.final_portfolio.total_value, 10_000.0);

        // 5% away is still accepted
        let near = Backtester::new(config(4))
            .run(&series(&closes), "BTCUSDT", with_entry(95.0))
            .unwrap();
        assert_eq!(near.rejected_admissions, 0);
        assert_eq!(near.trades.len(), 1);
    }

    // ============= Ordering / Validation =============

    #[test]
    fn test_out_of_order_series_is_rejected() {
        let mut candles = series(&[100.0, 101.0, 102.0]);
        candles[2].timestamp = candles[0].timestamp;
        let err = Backtester::new(config(1))
            .run(&candles, "BTCUSDT", at(0, Direction::Long))
            .unwrap_err();
        assert!(matches!(
            err,
            SimError::Validation(ValidationError::OutOfOrder { index: 2 })
        ));
    }

    #[test]
    fn test_invalid_price_is_rejected() {
        let candles = series(&[100.0, -1.0]);
        assert!(matches!(
            validate_series(&candles, "BTCUSDT"),
            Err(ValidationError::InvalidPrice { .. })
        ));
        assert!(validate_series(&series(&[1.0, 2.0]), "BTCUSDT").is_ok());
    }

    #[test]
    fn test_strategy_never_sees_future_points() {
        let closes = wave(40);
        let cfg = SimulationConfig {
            history_window_size: 10,
            ..config(1)
        };
        let mut seen = Vec::new();
        Backtester::new(cfg)
            .run(&series(&closes), "BTCUSDT", |ctx: &StrategyContext<'_>| {
                assert_eq!(ctx.history.last().copied(), Some(ctx.candle.close));
                assert_eq!(ctx.history.len(), (ctx.index + 1).min(10));
                seen.push(ctx.index);
                TradingDecision::neutral(ctx.symbol)
            })
            .unwrap();
        assert_eq!(seen, (0..40).collect::<Vec<_>>());
    }

    // ============= Determinism / Stop =============

    #[test]
    fn test_same_seed_same_result() {
        let candles = series(&wave(400));
        let cfg = SimulationConfig {
            seed: Some(42),
            ..SimulationConfig::default()
        };
        let run = || {
            Backtester::new(cfg.clone())
                .run(&candles, "BTCUSDT", decision_strategy(DecisionEngine::new(0.5)))
                .unwrap()
        };
        let (a, b) = (run(), run());
        assert_eq!(a.trades, b.trades);
        assert_eq!(a.equity_curve, b.equity_curve);
        assert_eq!(a.failed_orders, b.failed_orders);
        assert_eq!(a.total_values().len(), 400);
    }

    #[test]
    fn test_stop_signal_halts_run() {
        let stop = StopSignal::new();
        let trigger = stop.clone();
        let result = Backtester::new(config(1))
            .run_with_stop(
                &series(&wave(50)),
                "BTCUSDT",
                |ctx: &StrategyContext<'_>| {
                    if ctx.index == 0 {
                        return TradingDecision::directional(ctx.symbol, Direction::Long, 0.9);
                    }
                    if ctx.index == 3 {
                        trigger.stop();
                    }
                    TradingDecision::neutral(ctx.symbol)
                },
                &stop,
            )
            .unwrap();
        assert!(result.stopped);
        assert_eq!(result.points_processed, 4);
        // a stopped run leaves its position open
        assert!(result.trades.is_empty());
        assert!(result.final_portfolio.equity > 0.0);
    }
}
