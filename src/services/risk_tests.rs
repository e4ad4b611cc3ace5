//! Unit tests for the risk manager's sizing and admission control.

#[cfg(test)]
mod risk_tests {
    use crate::config::SimulationConfig;
    use crate::error::Rejection;
    use crate::services::risk::{size_for_risk, RiskManager};
    use crate::types::{Decision, Direction, Portfolio, Position, PositionStatus, TradingDecision};
    use chrono::Utc;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn portfolio(total: f64) -> Portfolio {
        Portfolio {
            cash: total,
            equity: 0.0,
            total_value: total,
        }
    }

    fn decision(symbol: &str, direction: Direction, entry: f64) -> TradingDecision {
        TradingDecision {
            entry_price: Some(entry),
            ..TradingDecision::directional(symbol, direction, 0.8)
        }
    }

    fn open(symbol: &str) -> Position {
        Position {
            symbol: symbol.to_string(),
            direction: Direction::Long,
            entry_price: 100.0,
            current_price: 100.0,
            quantity: 1.0,
            stop_loss: 98.0,
            take_profit: 104.0,
            entry_time: Utc::now(),
            entry_fee: 0.0,
            status: PositionStatus::Open,
        }
    }

    // ============= Sizing =============

    #[test]
    fn test_size_for_risk() {
        assert_eq!(size_for_risk(10_000.0, 0.01, 100.0, 98.0), Some(50.0));
        assert_eq!(size_for_risk(10_000.0, 0.01, 100.0, 102.0), Some(50.0));
        assert!(size_for_risk(10_000.0, 0.01, 100.0, 100.0).is_none());
        assert!(size_for_risk(0.0, 0.01, 100.0, 98.0).is_none());
    }

    #[test]
    fn test_position_size_uses_decision_stop() {
        let risk = RiskManager::new(SimulationConfig::default());
        let mut d = decision("BTCUSDT", Direction::Long, 100.0);
        d.stop_loss = Some(95.0);
        let qty = risk.position_size(&d, &portfolio(10_000.0)).unwrap();
        assert!(approx(qty, 20.0));

        // a stop on the wrong side falls back to the default 2%
        d.stop_loss = Some(105.0);
        let qty = risk.position_size(&d, &portfolio(10_000.0)).unwrap();
        assert!(approx(qty, 50.0));
    }

    #[test]
    fn test_default_stops() {
        let risk = RiskManager::new(SimulationConfig::default());
        let (sl, tp) = risk.default_stops(100.0, Direction::Long);
        assert!(approx(sl, 98.0) && approx(tp, 104.0));
        let (sl, tp) = risk.default_stops(100.0, Direction::Short);
        assert!(approx(sl, 102.0) && approx(tp, 96.0));
    }

    // ============= Admission =============

    #[test]
    fn test_admits_with_resolved_levels() {
        let risk = RiskManager::new(SimulationConfig::default());
        let mut d = decision("ETHUSDT", Direction::Short, 100.0);
        d.take_profit = Some(90.0);
        let admission = risk.check_admission(&d, &portfolio(10_000.0), &[]).unwrap();
        assert_eq!(admission.direction, Direction::Short);
        assert!(approx(admission.stop_loss, 102.0));
        assert!(approx(admission.take_profit, 90.0));
        assert!(approx(admission.quantity, 50.0));
        assert!(approx(admission.margin(), 10_000.0));
    }

    #[test]
    fn test_neutral_and_missing_price_rejected() {
        let risk = RiskManager::new(SimulationConfig::default());
        let neutral = TradingDecision::neutral("BTCUSDT");
        assert!(matches!(
            risk.check_admission(&neutral, &portfolio(10_000.0), &[]),
            Err(Rejection::Neutral { .. })
        ));

        let no_price = TradingDecision::directional("BTCUSDT", Direction::Long, 0.9);
        assert!(matches!(
            risk.check_admission(&no_price, &portfolio(10_000.0), &[]),
            Err(Rejection::InvalidPrice { .. })
        ));
    }

    #[test]
    fn test_max_positions_blocks_other_symbols() {
        let config = SimulationConfig {
            max_positions: 1,
            ..SimulationConfig::default()
        };
        let risk = RiskManager::new(config);
        let d = decision("ETHUSDT", Direction::Long, 100.0);
        assert!(!risk.can_open(&d, &portfolio(10_000.0), &[open("BTCUSDT")]));
        assert_eq!(
            risk.check_admission(&d, &portfolio(10_000.0), &[open("BTCUSDT")]),
            Err(Rejection::MaxPositions { open: 1, max: 1 })
        );
    }

    #[test]
    fn test_existing_position_rejected() {
        let risk = RiskManager::new(SimulationConfig::default());
        let d = decision("BTCUSDT", Direction::Long, 100.0);
        assert!(matches!(
            risk.check_admission(&d, &portfolio(10_000.0), &[open("BTCUSDT")]),
            Err(Rejection::PositionExists { .. })
        ));
    }

    #[test]
    fn test_daily_loss_limit_and_reset() {
        let risk = RiskManager::new(SimulationConfig::default());
        let d = decision("BTCUSDT", Direction::Long, 100.0);

        // limit is 5% of 10,000; exactly at the limit still passes
        risk.record_realized_pnl(-500.0);
        assert!(risk.can_open(&d, &portfolio(10_000.0), &[]));

        risk.record_realized_pnl(-0.01);
        assert!(matches!(
            risk.check_admission(&d, &portfolio(10_000.0), &[]),
            Err(Rejection::DailyLossLimit { .. })
        ));

        risk.record_realized_pnl(f64::NAN);
        assert!(approx(risk.daily_pnl(), -500.01));

        risk.reset_daily();
        assert_eq!(risk.daily_pnl(), 0.0);
        assert_eq!(risk.daily_loss(), 0.0);
        assert!(risk.can_open(&d, &portfolio(10_000.0), &[]));
    }

    #[test]
    fn test_entry_must_sit_near_market() {
        let risk = RiskManager::new(SimulationConfig::default());
        assert!(risk.check_entry(&decision("BTCUSDT", Direction::Long, 99.5), 100.0).is_ok());
        assert!(risk.check_entry(&decision("BTCUSDT", Direction::Short, 105.0), 100.0).is_ok());
        assert!(risk.check_entry(&TradingDecision::directional("BTCUSDT", Direction::Long, 0.8), 100.0).is_ok());

        match risk.check_entry(&decision("BTCUSDT", Direction::Long, 106.0), 100.0) {
            Err(Rejection::EntryTooFar { entry, price, .. }) => {
                assert_eq!(entry, 106.0);
                assert_eq!(price, 100.0);
            }
            other => panic!("expected EntryTooFar, got {:?}", other),
        }
        assert!(risk.check_entry(&decision("BTCUSDT", Direction::Long, 94.0), 100.0).is_err());
    }

    #[test]
    fn test_daily_wins_do_not_offset_losses() {
        let risk = RiskManager::new(SimulationConfig::default());
        let d = decision("BTCUSDT", Direction::Long, 100.0);

        risk.record_realized_pnl(1_000.0);
        risk.record_realized_pnl(-600.0);
        assert!(approx(risk.daily_pnl(), 400.0));
        assert!(approx(risk.daily_loss(), 600.0));

        match risk.check_admission(&d, &portfolio(10_000.0), &[]) {
            Err(Rejection::DailyLossLimit { lost, limit }) => {
                assert!(approx(lost, 600.0));
                assert!(approx(limit, 500.0));
            }
            other => panic!("expected DailyLossLimit, got {:?}", other),
        }
        assert!(!risk.can_open(&d, &portfolio(10_000.0), &[]));
    }

    #[test]
    fn test_capital_limit() {
        let config = SimulationConfig {
            max_risk_per_trade: 0.25,
            ..SimulationConfig::default()
        };
        let risk = RiskManager::new(config);
        // qty 50 @ 100 needs 5,000 of margin, above 2,500
        let d = decision("BTCUSDT", Direction::Long, 100.0);
        assert!(matches!(
            risk.check_admission(&d, &portfolio(10_000.0), &[]),
            Err(Rejection::CapitalLimit { .. })
        ));
    }

    #[test]
    fn test_zero_stop_percent_is_too_tight() {
        let config = SimulationConfig {
            stop_loss_percent: 0.0,
            ..SimulationConfig::default()
        };
        let risk = RiskManager::new(config);
        let d = decision("BTCUSDT", Direction::Long, 100.0);
        assert!(matches!(
            risk.check_admission(&d, &portfolio(10_000.0), &[]),
            Err(Rejection::StopTooTight { .. })
        ));
        assert_eq!(d.decision, Decision::Long);
    }
}
