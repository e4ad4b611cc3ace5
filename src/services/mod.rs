pub mod alerts;
pub mod analytics;
pub mod backtest;
pub mod day_boundary;
pub mod decision;
pub mod engine;
pub mod execution;
pub mod ledger;
pub mod notifications;
pub mod reporting;
pub mod risk;

#[cfg(test)]
mod backtest_tests;
#[cfg(test)]
mod decision_tests;
#[cfg(test)]
mod execution_tests;
#[cfg(test)]
mod risk_tests;
