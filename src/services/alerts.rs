use chrono::Utc;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::constants::events::ALERT_TRIGGERED;
use crate::data::alert_store::AlertStore;
use crate::error::{TransportError, ValidationError};
use crate::services::notifications::{deliver, Notification, NotificationKind, NotificationSink};
use crate::types::{AlertCondition, PriceAlert};

/// Partial edit of an untriggered alert.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AlertUpdate {
    pub price: Option<f64>,
    pub condition: Option<AlertCondition>,
    pub active: Option<bool>,
}

/// Owns the alert collection. Triggering is a check-and-set under the write
/// lock, so each alert fires at most once no matter how ticks interleave.
#[derive(Clone)]
pub struct AlertEngine {
    alerts: Arc<RwLock<Vec<PriceAlert>>>,
    store: Arc<dyn AlertStore>,
    sink: Arc<dyn NotificationSink>,
    timeout: Duration,
    // Serializes snapshot writes so the newest state is always the last one saved.
    persist_lock: Arc<tokio::sync::Mutex<()>>,
}

impl AlertEngine {
    pub fn new(store: Arc<dyn AlertStore>, sink: Arc<dyn NotificationSink>, timeout: Duration) -> Self {
        Self {
            alerts: Arc::new(RwLock::new(Vec::new())),
            store,
            sink,
            timeout,
            persist_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Replace the in-memory collection with the store's snapshot.
    pub async fn load(&self) -> Result<usize, TransportError> {
        let loaded = match tokio::time::timeout(self.timeout, self.store.load()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(TransportError::Timeout {
                    target: "alert_store",
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        };
        let count = loaded.len();
        *self.alerts.write().unwrap_or_else(PoisonError::into_inner) = loaded;
        info!("🔔 [ALERTS] Loaded {} alerts from {} store", count, self.store.name());
        Ok(count)
    }

    pub async fn create_alert(
        &self,
        symbol: &str,
        condition: AlertCondition,
        price: f64,
    ) -> Result<PriceAlert, ValidationError> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }
        if !price.is_finite() || price <= 0.0 {
            return Err(ValidationError::InvalidPrice { symbol, price });
        }

        let alert = PriceAlert {
            id: Uuid::new_v4().to_string(),
            symbol,
            condition,
            price,
            active: true,
            triggered: false,
            created_at: Utc::now(),
            triggered_at: None,
        };
        self.alerts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(alert.clone());

        info!(
            "🔔 [ALERTS] Created {} {:?} {} ({})",
            alert.symbol, alert.condition, alert.price, alert.id
        );
        self.persist().await;
        Ok(alert)
    }

    /// Remove by id. Returns whether anything was removed.
    pub async fn remove_alert(&self, id: &str) -> bool {
        let removed = {
            let mut alerts = self.alerts.write().unwrap_or_else(PoisonError::into_inner);
            let before = alerts.len();
            alerts.retain(|a| a.id != id);
            alerts.len() != before
        };
        if removed {
            debug!("🔔 [ALERTS] Removed {}", id);
            self.persist().await;
        }
        removed
    }

    /// Edit an alert that has not fired yet. Triggered alerts are terminal.
    pub async fn update_alert(&self, id: &str, update: AlertUpdate) -> Result<PriceAlert, ValidationError> {
        let updated = {
            let mut alerts = self.alerts.write().unwrap_or_else(PoisonError::into_inner);
            let alert = alerts
                .iter_mut()
                .find(|a| a.id == id)
                .ok_or_else(|| ValidationError::AlertNotFound { id: id.to_string() })?;
            if alert.triggered {
                return Err(ValidationError::AlertTriggered { id: id.to_string() });
            }
            if let Some(price) = update.price {
                if !price.is_finite() || price <= 0.0 {
                    return Err(ValidationError::InvalidPrice {
                        symbol: alert.symbol.clone(),
                        price,
                    });
                }
                alert.price = price;
            }
            if let Some(condition) = update.condition {
                alert.condition = condition;
            }
            if let Some(active) = update.active {
                alert.active = active;
            }
            alert.clone()
        };
        self.persist().await;
        Ok(updated)
    }

    /// Fire every armed alert for `symbol` whose condition holds at `price`.
    /// Returned alerts are already marked triggered.
    pub async fn check_alerts(&self, symbol: &str, price: f64) -> Vec<PriceAlert> {
        if !price.is_finite() || price <= 0.0 {
            return Vec::new();
        }
        let symbol = symbol.to_uppercase();

        let fired: Vec<PriceAlert> = {
            let mut alerts = self.alerts.write().unwrap_or_else(PoisonError::into_inner);
            let now = Utc::now();
            alerts
                .iter_mut()
                .filter(|a| a.is_armed() && a.symbol == symbol && a.condition.is_met(a.price, price))
                .map(|a| {
                    a.triggered = true;
                    a.active = false;
                    a.triggered_at = Some(now);
                    a.clone()
                })
                .collect()
        };

        if fired.is_empty() {
            return fired;
        }

        self.persist().await;

        for alert in &fired {
            info!(
                event = ALERT_TRIGGERED,
                "🔔 [ALERTS] {} {:?} {} hit at {}", alert.symbol, alert.condition, alert.price, price
            );
            let verb = match alert.condition {
                AlertCondition::Above => "rose above",
                AlertCondition::Below => "fell to",
            };
            let notification = Notification::new(
                NotificationKind::Alert,
                format!("Alert triggered: {}", alert.symbol),
                format!("{} {} ${}", alert.symbol, verb, alert.price),
            )
            .with_symbol(alert.symbol.clone(), alert.price);
            deliver(self.sink.as_ref(), notification, self.timeout).await;
        }
        fired
    }

    /// Drop alerts that have already fired. Returns how many were removed.
    pub async fn clear_triggered(&self) -> usize {
        let removed = {
            let mut alerts = self.alerts.write().unwrap_or_else(PoisonError::into_inner);
            let before = alerts.len();
            alerts.retain(|a| !a.triggered);
            before - alerts.len()
        };
        if removed > 0 {
            self.persist().await;
        }
        removed
    }

    pub fn alerts(&self) -> Vec<PriceAlert> {
        self.alerts.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn alert(&self, id: &str) -> Option<PriceAlert> {
        self.alerts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|a| a.id == id)
            .cloned()
    }

    pub fn armed_count(&self) -> usize {
        self.alerts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|a| a.is_armed())
            .count()
    }

    /// Save the full collection. Failures are logged and reported as `false`.
    pub async fn persist(&self) -> bool {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.alerts();
        match tokio::time::timeout(self.timeout, self.store.save(&snapshot)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("⚠️ [ALERTS] Failed to persist alerts: {}", e);
                false
            }
            Err(_) => {
                warn!(
                    "⚠️ [ALERTS] Persisting alerts to {} timed out after {:?}",
                    self.store.name(),
                    self.timeout
                );
                false
            }
        }
    }
}
