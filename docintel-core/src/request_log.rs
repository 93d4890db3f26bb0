//! Best-effort request logging.
//!
//! Every served request can be recorded as one [`LogEntry`]. Recording never
//! blocks or fails a response: [`record_best_effort`] hands the write to a
//! background task and failures end up as warnings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum LogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LogError>;

/// One served request and what was returned for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    pub request: serde_json::Value,
    pub prediction: serde_json::Value,
}

impl LogEntry {
    pub fn new(
        endpoint: impl Into<String>,
        request: &impl Serialize,
        prediction: &impl Serialize,
    ) -> Result<Self> {
        Ok(Self {
            timestamp: Utc::now(),
            endpoint: endpoint.into(),
            request: serde_json::to_value(request)?,
            prediction: serde_json::to_value(prediction)?,
        })
    }
}

/// A sink for request records. Must tolerate concurrent writers.
#[async_trait]
pub trait RequestLog: Send + Sync {
    async fn log(&self, entry: &LogEntry) -> Result<()>;
}

/// Appends entries to a file, one JSON object per line.
pub struct JsonlRequestLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlRequestLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RequestLog for JsonlRequestLog {
    async fn log(&self, entry: &LogEntry) -> Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Records a request in the background.
///
/// Returns immediately. Without a configured sink the record is skipped;
/// either way, nothing reaches the caller. Must be called from within a
/// tokio runtime.
pub fn record_best_effort(
    log: Option<Arc<dyn RequestLog>>,
    endpoint: &str,
    request: &impl Serialize,
    prediction: &impl Serialize,
) {
    let Some(log) = log else {
        warn!("No request log configured, skipping record for {}", endpoint);
        return;
    };

    let entry = match LogEntry::new(endpoint, request, prediction) {
        Ok(entry) => entry,
        Err(e) => {
            warn!("Failed to build request log record for {}: {}", endpoint, e);
            return;
        }
    };

    tokio::spawn(async move {
        match log.log(&entry).await {
            Ok(()) => debug!("Logged {} request", entry.endpoint),
            Err(e) => warn!("Failed to log {} request: {}", entry.endpoint, e),
        }
    });
}
