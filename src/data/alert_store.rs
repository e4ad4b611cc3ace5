use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use crate::error::TransportError;
use crate::types::PriceAlert;

/// Persistence for the alert collection. Every save is a full snapshot.
#[async_trait]
pub trait AlertStore: Send + Sync {
    fn name(&self) -> &'static str;

    async fn load(&self) -> Result<Vec<PriceAlert>, TransportError>;
    async fn save(&self, alerts: &[PriceAlert]) -> Result<(), TransportError>;
}

/// Holds the last snapshot as a JSON string, so tests exercise the same
/// serialization path as the file store.
#[derive(Clone, Default)]
pub struct InMemoryAlertStore {
    snapshot: Arc<Mutex<Option<String>>>,
    saves: Arc<Mutex<usize>>,
}

impl InMemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn raw_snapshot(&self) -> Option<String> {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl AlertStore for InMemoryAlertStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn load(&self) -> Result<Vec<PriceAlert>, TransportError> {
        match self.raw_snapshot() {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    async fn save(&self, alerts: &[PriceAlert]) -> Result<(), TransportError> {
        let json = serde_json::to_string(alerts)?;
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = Some(json);
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(())
    }
}

/// Stores the collection as a pretty-printed JSON array on disk.
#[derive(Clone, Debug)]
pub struct JsonFileAlertStore {
    path: PathBuf,
}

impl JsonFileAlertStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl AlertStore for JsonFileAlertStore {
    fn name(&self) -> &'static str {
        "json_file"
    }

    async fn load(&self) -> Result<Vec<PriceAlert>, TransportError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("[ALERT-STORE] {} not found, starting empty", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn save(&self, alerts: &[PriceAlert]) -> Result<(), TransportError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_vec_pretty(alerts)?;

        // Write then rename so a crash never leaves a half-written snapshot.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
