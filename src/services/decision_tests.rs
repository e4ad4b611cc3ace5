//! Unit tests for signal generation and decision making.

#[cfg(test)]
mod decision_tests {
    use crate::services::analytics::AnalyticsEngine;
    use crate::services::decision::*;
    use crate::types::*;
    use chrono::Utc;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn analysis(rsi: Option<f64>, trend: Trend, volume_change: f64) -> PriceAnalysis {
        PriceAnalysis {
            symbol: "BTCUSDT".to_string(),
            current_price: 100.0,
            price_change: 0.0,
            price_change_percent: 0.0,
            volume: 1.0,
            volume_change,
            volatility: 1.0,
            support_levels: vec![95.0, 97.0],
            resistance_levels: vec![110.0, 105.0],
            trend,
            rsi,
            moving_average: Some(100.0),
            updated_at: Utc::now(),
        }
    }

    // ============= Signals =============

    #[test]
    fn test_no_signals_in_quiet_market() {
        let engine = DecisionEngine::default();
        let a = analysis(Some(50.0), Trend::Neutral, 1.0);
        assert!(engine.signals(&a).is_empty());
        let d = engine.decide(&a);
        assert_eq!(d.decision, Decision::Neutral);
        assert_eq!(d.confidence, 0.0);
        assert!(d.entry_price.is_none());
    }

    #[test]
    fn test_signal_weights() {
        let engine = DecisionEngine::default();
        let signals = engine.signals(&analysis(Some(20.0), Trend::Bullish, 2.0));
        let kinds: Vec<(SignalKind, SignalAction, f64)> =
            signals.iter().map(|s| (s.kind, s.action, s.confidence)).collect();
        assert_eq!(
            kinds,
            vec![
                (SignalKind::Rsi, SignalAction::Buy, 0.8),
                (SignalKind::Trend, SignalAction::Buy, 0.6),
                (SignalKind::Volume, SignalAction::Buy, 0.7),
            ]
        );
    }

    #[test]
    fn test_volume_spike_without_bullish_trend_sells() {
        let engine = DecisionEngine::default();
        let signals = engine.signals(&analysis(None, Trend::Neutral, 1.6));
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].action, SignalAction::Sell);
    }

    // ============= Decisions =============

    #[test]
    fn test_long_decision() {
        let engine = DecisionEngine::default();
        let d = engine.decide(&analysis(Some(25.0), Trend::Bullish, 1.0));
        assert_eq!(d.decision, Decision::Long);
        assert!(approx(d.confidence, 0.7));
        assert!(approx(d.entry_price.unwrap(), 99.5));
        assert_eq!(d.stop_loss, Some(95.0));
        assert_eq!(d.take_profit, Some(110.0));
        assert!(approx(d.risk_reward_ratio, 2.0));
        assert_eq!(d.timeframe, "15m-1h");
    }

    #[test]
    fn test_short_decision() {
        let engine = DecisionEngine::default();
        let d = engine.decide(&analysis(Some(80.0), Trend::Bearish, 2.0));
        assert_eq!(d.decision, Decision::Short);
        assert!(approx(d.confidence, 2.0 / 3.0));
        assert!(approx(d.entry_price.unwrap(), 100.5));
        assert_eq!(d.stop_loss, Some(110.0));
        assert_eq!(d.take_profit, Some(95.0));
    }

    #[test]
    fn test_single_signal_below_threshold_is_neutral() {
        let engine = DecisionEngine::default();
        let d = engine.decide(&analysis(Some(80.0), Trend::Neutral, 1.0));
        assert_eq!(d.decision, Decision::Neutral);
        assert_eq!(d.signals.len(), 1);

        // a lower threshold lets it through
        let d = DecisionEngine::new(0.5).decide(&analysis(Some(80.0), Trend::Neutral, 1.0));
        assert_eq!(d.decision, Decision::Short);
    }

    #[test]
    fn test_decide_for_without_analysis_is_neutral() {
        let engine = DecisionEngine::default();
        let analytics = AnalyticsEngine::new(10);
        let d = engine.decide_for("BTCUSDT", &analytics);
        assert_eq!(d, TradingDecision::neutral("BTCUSDT"));
    }

    // ============= Levels =============

    #[test]
    fn test_entry_points_fall_back_when_levels_misplaced() {
        let mut a = analysis(None, Trend::Neutral, 1.0);
        a.support_levels = vec![99.9];
        a.resistance_levels = vec![100.1];

        let (entry, stop, target) = entry_points(Direction::Long, &a);
        assert!(approx(entry, 99.5));
        assert!(approx(stop, 98.0));
        assert!(approx(target, 100.1));

        let (entry, stop, target) = entry_points(Direction::Short, &a);
        assert!(approx(entry, 100.5));
        assert!(approx(stop, 102.0));
        assert!(approx(target, 99.9));
    }

    #[test]
    fn test_risk_reward_default() {
        let mut a = analysis(None, Trend::Neutral, 1.0);
        a.support_levels.clear();
        assert_eq!(risk_reward(&a), 1.5);

        let mut a = analysis(None, Trend::Neutral, 1.0);
        a.support_levels = vec![100.0];
        assert_eq!(risk_reward(&a), 1.5);
    }

    #[test]
    fn test_decision_quality() {
        let mut d = TradingDecision::directional("BTCUSDT", Direction::Long, 0.9);
        d.risk_reward_ratio = 2.5;
        assert_eq!(decision_quality(&d), DecisionQuality::High);
        d.confidence = 0.7;
        assert_eq!(decision_quality(&d), DecisionQuality::Medium);
        d.risk_reward_ratio = 1.5;
        assert_eq!(decision_quality(&d), DecisionQuality::Low);
    }
}
