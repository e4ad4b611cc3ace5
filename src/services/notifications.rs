use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::TransportError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Alert,
    Info,
    Warning,
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub symbol: Option<String>,
    pub price: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            symbol: None,
            price: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>, price: f64) -> Self {
        self.symbol = Some(symbol.into());
        self.price = Some(price);
        self
    }
}

/// Fire-and-forget delivery. The core never waits on an acknowledgement
/// beyond the bounded call itself.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), TransportError>;
}

/// Writes notifications to the tracing log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingSink;

#[async_trait]
impl NotificationSink for LoggingSink {
    async fn notify(&self, n: Notification) -> Result<(), TransportError> {
        match n.kind {
            NotificationKind::Warning | NotificationKind::Error => {
                warn!("🔔 [NOTIFY] {} | {}", n.title, n.message)
            }
            _ => info!("🔔 [NOTIFY] {} | {}", n.title, n.message),
        }
        Ok(())
    }
}

/// Collects notifications in memory. Used by tests and by callers that want
/// to drain notifications themselves.
#[derive(Clone, Default)]
pub struct InMemorySink {
    received: Arc<Mutex<Vec<Notification>>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> Vec<Notification> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count_kind(&self, kind: NotificationKind) -> usize {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|n| n.kind == kind)
            .count()
    }
}

#[async_trait]
impl NotificationSink for InMemorySink {
    async fn notify(&self, n: Notification) -> Result<(), TransportError> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(n);
        Ok(())
    }
}

/// Deliver with a bounded wait. Timeouts and sink errors are logged and
/// reported as failures; they never reach the tick pipeline.
pub async fn deliver(sink: &dyn NotificationSink, notification: Notification, timeout: Duration) -> bool {
    let title = notification.title.clone();
    match tokio::time::timeout(timeout, sink.notify(notification)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!("⚠️ [NOTIFY] Delivery failed for '{}': {}", title, e);
            false
        }
        Err(_) => {
            let e = TransportError::Timeout {
                target: "notification_sink",
                timeout_ms: timeout.as_millis() as u64,
            };
            warn!("⚠️ [NOTIFY] Delivery failed for '{}': {}", title, e);
            false
        }
    }
}
