//! Audit emission. Every successful state-mutating call produces one [`AuditRecord`], appended to an
//! external [`AuditSink`] before the new state is committed. Appends are retried; duplicates are
//! acceptable, lost records are not.

pub mod error;

pub use error::Error;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::gate::OperationKind;
use crate::session::SessionId;

const DEFAULT_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF_MS: u64 = 50;

/// Structured record of an authorized write.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AuditRecord {
    pub session_id: SessionId,
    pub operation: OperationKind,
    pub technician_id: Option<String>,
    pub job_id: Option<String>,
    pub description: String,
    pub metadata: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(session_id: SessionId, operation: OperationKind, description: impl Into<String>) -> Self {
        Self {
            session_id,
            operation,
            technician_id: None,
            job_id: None,
            description: description.into(),
            metadata: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn attributed(mut self, technician_id: Option<&str>, job_id: Option<&str>) -> Self {
        self.technician_id = technician_id.map(str::to_string);
        self.job_id = job_id.map(str::to_string);
        self
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// Narrow append interface to the job/technician audit-log store.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, record: &AuditRecord) -> Result<(), Error>;
}

/// Retry behaviour for audit appends.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub attempts: u32,
    /// Delay before the second attempt, doubled for each further attempt
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: DEFAULT_ATTEMPTS,
            backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
        }
    }
}

/// Delivers records to a sink, retrying failed appends.
#[derive(Clone)]
pub struct AuditDispatcher {
    sink: Arc<dyn AuditSink>,
    retry: RetryPolicy,
}

impl AuditDispatcher {
    pub fn new(sink: Arc<dyn AuditSink>, retry: RetryPolicy) -> Self {
        Self { sink, retry }
    }

    /// Append `record`, retrying per the [`RetryPolicy`]. Returns the last error once every attempt failed.
    pub async fn emit(&self, record: &AuditRecord) -> Result<(), Error> {
        let attempts = self.retry.attempts.max(1);
        let mut delay = self.retry.backoff;
        let mut attempt = 1;

        loop {
            match self.sink.append(record).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= attempts => {
                    warn!(
                        "Audit append for session {} failed after {} attempts: {}",
                        record.session_id, attempts, e
                    );
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        "Audit append for session {} failed (attempt {}/{}): {}",
                        record.session_id, attempt, attempts, e
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
            }
        }
    }
}

impl std::fmt::Debug for AuditDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditDispatcher")
            .field("retry", &self.retry)
            .finish()
    }
}

/// Keeps records in memory. Useful for tests and for buffering in front of a slower store.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().await.clone()
    }

    pub async fn records_for(&self, session_id: &SessionId) -> Vec<AuditRecord> {
        self.records
            .lock()
            .await
            .iter()
            .filter(|r| &r.session_id == session_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, record: &AuditRecord) -> Result<(), Error> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}

/// Writes records to the `tracing` log under the `audit` target.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn append(&self, record: &AuditRecord) -> Result<(), Error> {
        info!(
            target: "audit",
            session = %record.session_id,
            operation = %record.operation,
            technician = record.technician_id.as_deref().unwrap_or("-"),
            job = record.job_id.as_deref().unwrap_or("-"),
            metadata = ?record.metadata,
            "{}",
            record.description
        );
        Ok(())
    }
}
