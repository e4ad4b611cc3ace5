use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::signals::*;
use crate::services::analytics::AnalyticsEngine;
use crate::types::{
    Decision, Direction, PriceAnalysis, SignalAction, SignalKind, Trend, TradingDecision, TradingSignal,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DecisionQuality {
    High,
    Medium,
    Low,
}

/// Weighted vote over RSI, trend and volume signals.
#[derive(Clone, Debug)]
pub struct DecisionEngine {
    threshold: f64,
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl DecisionEngine {
    /// `threshold` is the summed weight one side must exceed to act.
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn signals(&self, analysis: &PriceAnalysis) -> Vec<TradingSignal> {
        let symbol = &analysis.symbol;
        let price = analysis.current_price;
        let signal = |kind, action, confidence, reason: String| TradingSignal {
            symbol: symbol.clone(),
            kind,
            action,
            confidence,
            price,
            reason,
        };
        let mut signals = Vec::new();

        if let Some(rsi) = analysis.rsi {
            if rsi < RSI_OVERSOLD {
                signals.push(signal(
                    SignalKind::Rsi,
                    SignalAction::Buy,
                    RSI_BUY_WEIGHT,
                    format!("RSI oversold ({:.1})", rsi),
                ));
            } else if rsi > RSI_OVERBOUGHT {
                signals.push(signal(
                    SignalKind::Rsi,
                    SignalAction::Sell,
                    RSI_SELL_WEIGHT,
                    format!("RSI overbought ({:.1})", rsi),
                ));
            }
        }

        match analysis.trend {
            Trend::Bullish => signals.push(signal(
                SignalKind::Trend,
                SignalAction::Buy,
                TREND_WEIGHT,
                "Bullish trend confirmed".to_string(),
            )),
            Trend::Bearish => signals.push(signal(
                SignalKind::Trend,
                SignalAction::Sell,
                TREND_WEIGHT,
                "Bearish trend confirmed".to_string(),
            )),
            Trend::Neutral => {}
        }

        if analysis.volume_change > VOLUME_SPIKE_RATIO {
            let action = if analysis.trend == Trend::Bullish {
                SignalAction::Buy
            } else {
                SignalAction::Sell
            };
            signals.push(signal(
                SignalKind::Volume,
                action,
                VOLUME_WEIGHT,
                format!("Volume up {:.0}%", analysis.volume_change * 100.0),
            ));
        }

        signals
    }

    pub fn decide(&self, analysis: &PriceAnalysis) -> TradingDecision {
        let signals = self.signals(analysis);

        let side = |action: SignalAction| {
            let picked: Vec<&TradingSignal> = signals.iter().filter(|s| s.action == action).collect();
            (picked.iter().map(|s| s.confidence).sum::<f64>(), picked.len())
        };
        let (buy, buy_count) = side(SignalAction::Buy);
        let (sell, sell_count) = side(SignalAction::Sell);

        let (decision, confidence) = if buy > sell && buy > self.threshold {
            (Decision::Long, buy / buy_count as f64)
        } else if sell > buy && sell > self.threshold {
            (Decision::Short, sell / sell_count as f64)
        } else {
            (Decision::Neutral, 0.0)
        };

        let (entry_price, stop_loss, take_profit) = match decision.direction() {
            Some(direction) => {
                let (entry, stop, target) = entry_points(direction, analysis);
                (Some(entry), Some(stop), Some(target))
            }
            None => (None, None, None),
        };

        let result = TradingDecision {
            symbol: analysis.symbol.clone(),
            decision,
            entry_price,
            stop_loss,
            take_profit,
            risk_reward_ratio: risk_reward(analysis),
            confidence: confidence.clamp(0.0, 1.0),
            signals,
            timeframe: DEFAULT_TIMEFRAME.to_string(),
        };
        debug!(
            "🧠 [DECISION] {} {:?} conf={:.2} buy={:.2} sell={:.2}",
            result.symbol, result.decision, result.confidence, buy, sell
        );
        result
    }

    /// Decide from the engine's cached analysis; neutral when there is none yet.
    pub fn decide_for(&self, symbol: &str, analytics: &AnalyticsEngine) -> TradingDecision {
        analytics
            .get_analysis(symbol)
            .map(|a| self.decide(&a))
            .unwrap_or_else(|| TradingDecision::neutral(symbol))
    }
}

/// Reward to the nearest resistance over risk to the nearest support.
pub fn risk_reward(analysis: &PriceAnalysis) -> f64 {
    let current = analysis.current_price;
    match (analysis.support_levels.first(), analysis.resistance_levels.first()) {
        (Some(&support), Some(&resistance)) => {
            let risk = current - support;
            let reward = resistance - current;
            if risk > 0.0 && reward > 0.0 {
                reward / risk
            } else {
                DEFAULT_RISK_REWARD
            }
        }
        _ => DEFAULT_RISK_REWARD,
    }
}

/// Entry, stop and target for a direction. Levels are used only when they sit
/// on the correct side of the entry.
pub fn entry_points(direction: Direction, analysis: &PriceAnalysis) -> (f64, f64, f64) {
    let current = analysis.current_price;
    let support = analysis.support_levels.first().copied();
    let resistance = analysis.resistance_levels.first().copied();
    match direction {
        Direction::Long => {
            let entry = current * (1.0 - ENTRY_OFFSET);
            let stop = support.filter(|s| *s < entry).unwrap_or(current * (1.0 - FALLBACK_STOP));
            let target = resistance
                .filter(|r| *r > entry)
                .unwrap_or(current * (1.0 + FALLBACK_TARGET));
            (entry, stop, target)
        }
        Direction::Short => {
            let entry = current * (1.0 + ENTRY_OFFSET);
            let stop = resistance
                .filter(|r| *r > entry)
                .unwrap_or(current * (1.0 + FALLBACK_STOP));
            let target = support
                .filter(|s| *s < entry)
                .unwrap_or(current * (1.0 - FALLBACK_TARGET));
            (entry, stop, target)
        }
    }
}

pub fn decision_quality(decision: &TradingDecision) -> DecisionQuality {
    if decision.confidence > 0.8 && decision.risk_reward_ratio > 2.0 {
        DecisionQuality::High
    } else if decision.confidence > 0.6 && decision.risk_reward_ratio > 1.5 {
        DecisionQuality::Medium
    } else {
        DecisionQuality::Low
    }
}
