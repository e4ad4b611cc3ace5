//! Unit tests for configuration structures and parsing.

#[cfg(test)]
mod config_tests {
    use crate::config::*;
    use crate::error::SimError;
    use std::io::Write;

    // ============= Defaults Tests =============

    #[test]
    fn test_simulation_config_default() {
        let config = SimulationConfig::default();

        assert_eq!(config.initial_capital, 10_000.0);
        assert_eq!(config.risk_per_trade, 0.01);
        assert_eq!(config.max_positions, 5);
        assert_eq!(config.commission_rate, 0.001);
        assert_eq!(config.max_slippage, 0.001);
        assert_eq!(config.failure_probability, 0.05);
        assert_eq!(config.min_latency_ms, 1_000);
        assert_eq!(config.max_latency_ms, 3_000);
        assert_eq!(config.stop_loss_percent, 0.02);
        assert_eq!(config.take_profit_percent, 0.04);
        assert_eq!(config.history_window_size, 100);
        assert!(config.seed.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_frictionless_zeroes_costs() {
        let config = SimulationConfig::frictionless();
        assert_eq!(config.commission_rate, 0.0);
        assert_eq!(config.max_slippage, 0.0);
        assert_eq!(config.failure_probability, 0.0);
        assert_eq!(config.max_latency_ms, 0);
        assert_eq!(config.initial_capital, 10_000.0);
    }

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.mode, RunMode::Live);
        assert_eq!(config.chatter_level, ChatterLevel::Normal);
        assert_eq!(config.symbols, vec!["BTCUSDT", "ETHUSDT"]);
        assert_eq!(config.external_timeout().as_millis(), 2_000);
        assert!(config.backtest.close_open_at_end);
        assert!(config.validate().is_ok());
    }

    // ============= YAML Parsing Tests =============

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = AppConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_partial_yaml_overrides() {
        let yaml = r#"
mode: backtest
chatter_level: verbose
symbols: [SOLUSDT]
simulation:
  initial_capital: 5000
  max_positions: 1
  seed: 7
backtest:
  symbol: SOLUSDT
  close_open_at_end: false
"#;
        let config = AppConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.mode, RunMode::Backtest);
        assert_eq!(config.chatter_level, ChatterLevel::Verbose);
        assert_eq!(config.symbols, vec!["SOLUSDT"]);
        assert_eq!(config.simulation.initial_capital, 5_000.0);
        assert_eq!(config.simulation.max_positions, 1);
        assert_eq!(config.simulation.seed, Some(7));
        // untouched fields keep defaults
        assert_eq!(config.simulation.risk_per_trade, 0.01);
        assert!(!config.backtest.close_open_at_end);
    }

    #[test]
    fn test_bom_is_stripped() {
        let yaml = "\u{feff}mode: backtest\n";
        let config = AppConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.mode, RunMode::Backtest);
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        let err = AppConfig::from_yaml_str("simulation: [not, a, map]").unwrap_err();
        assert!(matches!(err, SimError::Yaml(_)));
    }

    #[test]
    fn test_start_prices() {
        let yaml = r#"
feed:
  start_prices:
    BTCUSDT: 50000
"#;
        let config = AppConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.start_price("BTCUSDT"), 50_000.0);
        assert_eq!(config.start_price("UNKNOWN"), 100.0);
    }

    // ============= Validation Tests =============

    #[test]
    fn test_validation_rejects_bad_values() {
        let cases = [
            "simulation: { initial_capital: 0 }",
            "simulation: { risk_per_trade: 1.5 }",
            "simulation: { max_positions: 0 }",
            "simulation: { history_window_size: 1 }",
            "simulation: { min_latency_ms: 10, max_latency_ms: 5 }",
            "simulation: { failure_probability: -0.1 }",
            "external_timeout_ms: 0",
            "event_bus_capacity: 0",
        ];
        for yaml in cases {
            let result = AppConfig::from_yaml_str(yaml);
            assert!(
                matches!(result, Err(SimError::Config(_))),
                "expected config error for {:?}, got {:?}",
                yaml,
                result.map(|_| ())
            );
        }
    }

    #[test]
    fn test_from_path_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "symbols: [ADAUSDT]").unwrap();
        let config = AppConfig::from_path(file.path()).unwrap();
        assert_eq!(config.symbols, vec!["ADAUSDT"]);
    }

    #[test]
    fn test_from_path_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::from_path(dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, SimError::Io(_)));
    }

    #[test]
    fn test_chatter_level_ordering() {
        assert!(ChatterLevel::Low < ChatterLevel::Normal);
        assert!(ChatterLevel::Normal < ChatterLevel::Verbose);
    }
}
