//! Flash sessions. [`FlashManager`] owns every session's lifecycle: it asks the [`WriteGate`] before each
//! mutation, serializes transitions per session, appends an audit record and only then commits the new state.
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use ecuflash::audit::MemoryAuditSink;
//! use ecuflash::gate::OperatorContext;
//! use ecuflash::policy::{OperatorMode, OperatorModePolicy};
//! use ecuflash::session::{CreateSessionRequest, FlashManager, FlashStatus, MemoryEcu};
//!
//! async fn flash_example() {
//!     let (policy, _controller) = OperatorModePolicy::new(OperatorMode::Workshop);
//!     let manager = FlashManager::new(policy, Arc::new(MemoryAuditSink::new()));
//!     manager.register_ecu("ecm", Arc::new(MemoryEcu::new(0x10000).attested("j2534"))).await;
//!
//!     let hash = "ab".repeat(32);
//!     let session = manager.create_session(CreateSessionRequest::new("ecm", "stage1.bin", hash)).await.unwrap();
//!
//!     let operator = OperatorContext::technician("tech-42").with_job("job-7").confirmed();
//!     let session = manager.start(&session.id, &operator).await.unwrap();
//!     assert_eq!(session.status, FlashStatus::Flashing);
//! }
//! ```

mod blocks;
mod constants;
mod machine;
mod memory;
mod types;

pub use blocks::{plan_blocks, plan_erase, Chunk};
pub use constants::*;
pub use memory::{EcuMemory, MemoryEcu};
pub use types::*;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::audit::{AuditDispatcher, AuditRecord, AuditSink, RetryPolicy};
use crate::checksum::{self, ChecksumAlgorithm, ChecksumReport, ChecksumValue};
use crate::error::Error;
use crate::gate::{GuardRequest, OperationKind, OperatorContext, WriteGate};
use crate::policy::{ModeConfig, OperatorMode, OperatorModePolicy};
use crate::Result;

/// Tunables for block operations and audit delivery.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FlashConfig {
    pub sector_size: usize,
    pub block_erase_size: usize,
    pub max_read_block_size: usize,
    /// Records are appended while the session lock is held, so the whole retry budget
    /// (every attempt plus the doubling backoff) is also the longest a transition can block
    /// other callers of the same session. Keep it short.
    pub audit_retry: RetryPolicy,
}

impl Default for FlashConfig {
    fn default() -> Self {
        FlashConfig {
            sector_size: SECTOR_SIZE,
            block_erase_size: BLOCK_ERASE_SIZE,
            max_read_block_size: MAX_READ_BLOCK_SIZE,
            audit_retry: RetryPolicy::default(),
        }
    }
}

impl FlashConfig {
    fn erase_granularity(&self, erase_type: EraseType) -> usize {
        match erase_type {
            EraseType::Sector => self.sector_size,
            EraseType::Block => self.block_erase_size,
        }
    }
}

/// A session and the ECU it targets. The mutex is the per-session lock.
struct SessionEntry {
    ecu: Arc<dyn EcuMemory>,
    state: Mutex<FlashSession>,
}

/// Owns flash sessions and sequences every operation on them.
pub struct FlashManager {
    gate: WriteGate,
    audit: AuditDispatcher,
    config: FlashConfig,
    ecus: RwLock<HashMap<String, Arc<dyn EcuMemory>>>,
    sessions: RwLock<HashMap<SessionId, Arc<SessionEntry>>>,
}

impl FlashManager {
    pub fn new(policy: Arc<OperatorModePolicy>, sink: Arc<dyn AuditSink>) -> Self {
        Self::with_config(policy, sink, FlashConfig::default())
    }

    pub fn with_config(policy: Arc<OperatorModePolicy>, sink: Arc<dyn AuditSink>, config: FlashConfig) -> Self {
        Self {
            gate: WriteGate::new(policy),
            audit: AuditDispatcher::new(sink, config.audit_retry),
            config,
            ecus: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Make an ECU available for sessions. Replaces an earlier registration with the same id.
    pub async fn register_ecu(&self, ecu_id: impl Into<String>, memory: Arc<dyn EcuMemory>) {
        let ecu_id = ecu_id.into();
        info!("Registered ECU {} ({} bytes)", ecu_id, memory.size());
        self.ecus.write().await.insert(ecu_id, memory);
    }

    pub fn current_mode(&self) -> OperatorMode {
        self.gate.policy().current_mode()
    }

    pub fn mode_config(&self) -> ModeConfig {
        self.gate.policy().mode_config()
    }

    /// Snapshot of a session.
    pub async fn session(&self, session_id: &SessionId) -> Result<FlashSession> {
        let entry = self.entry(session_id).await?;
        let session = entry.state.lock().await;
        Ok(session.clone())
    }

    /// Snapshots of every session, oldest first.
    pub async fn sessions(&self) -> Vec<FlashSession> {
        let entries: Vec<Arc<SessionEntry>> = self.sessions.read().await.values().cloned().collect();

        let mut sessions = Vec::with_capacity(entries.len());
        for entry in entries {
            sessions.push(entry.state.lock().await.clone());
        }
        sessions.sort_by_key(|s| s.start_time);
        sessions
    }

    /// Open a `Preparing` session. Rejected outright when the file hash is malformed or the ECU is unknown.
    pub async fn create_session(&self, request: CreateSessionRequest) -> Result<FlashSession> {
        let session = FlashSession::create(&request)?;

        let ecu = self
            .ecus
            .read()
            .await
            .get(&session.ecu_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("ECU {}", session.ecu_id)))?;

        if let Some(image_size) = session.image_size {
            if image_size > ecu.size() as u64 {
                return Err(Error::InvalidInput(format!(
                    "image of {} bytes does not fit ECU {} ({} bytes)",
                    image_size,
                    session.ecu_id,
                    ecu.size()
                )));
            }
        }

        let record = AuditRecord::new(session.id, OperationKind::CreateSession, "Flash session created")
            .with("ecu", &session.ecu_id)
            .with("file_name", &session.file_name)
            .with("file_hash", &session.file_hash);
        self.audit.emit(&record).await?;

        info!("Created flash session {} for ECU {}", session.id, session.ecu_id);
        let entry = Arc::new(SessionEntry {
            ecu,
            state: Mutex::new(session.clone()),
        });
        self.sessions.write().await.insert(session.id, entry);

        Ok(session)
    }

    /// `Preparing` -> `Flashing`. Full guard chain plus technician attribution.
    pub async fn start(&self, session_id: &SessionId, context: &OperatorContext) -> Result<FlashSession> {
        let entry = self.entry(session_id).await?;
        self.authorize(&entry, OperationKind::Flash, context)?;

        self.transition(&entry, OperationKind::Flash, context, |session| {
            Ok((session.started(context)?, "Flash started".to_string()))
        })
        .await
    }

    /// Record transport progress, optionally moving to `Verifying`, `Completed` or `Failed`.
    pub async fn update_progress(&self, session_id: &SessionId, update: ProgressUpdate) -> Result<FlashSession> {
        let context = OperatorContext::anonymous();
        let entry = self.entry(session_id).await?;
        self.authorize(&entry, OperationKind::UpdateProgress, &context)?;

        self.transition(&entry, OperationKind::UpdateProgress, &context, |session| {
            let next = session.with_progress(update.progress, update.status)?;
            let description = if next.status != session.status {
                format!("Flash {} at {}%", next.status, next.progress)
            } else {
                format!("Flash progress {}%", next.progress)
            };
            Ok((next, description))
        })
        .await
    }

    /// Read back the region written in this session and compare its SHA-256 with the file hash.
    /// A mismatch moves the session to `Failed` with `checksum_validated = Some(false)`; it never rolls back.
    pub async fn verify(&self, session_id: &SessionId) -> Result<FlashSession> {
        let context = OperatorContext::anonymous();
        let entry = self.entry(session_id).await?;
        self.authorize(&entry, OperationKind::Verify, &context)?;

        let extent = {
            let session = entry.state.lock().await;
            if session.status != FlashStatus::Completed {
                return Err(Error::NotYetFlashed(session.status));
            }
            session
                .written
                .ok_or_else(|| Error::InvalidInput("no image data was written in this session".into()))?
        };

        // Hardware I/O happens outside the session lock
        let readback = entry.ecu.read(extent.start, extent.len()).await?;
        let actual = checksum::compute(&readback, ChecksumAlgorithm::Sha256);

        self.transition(&entry, OperationKind::Verify, &context, |session| {
            let next = session.verified(&actual)?;
            let description = match next.checksum_validated {
                Some(true) => "Flash verified".to_string(),
                _ => "Flash verification failed".to_string(),
            };
            Ok((next, description))
        })
        .await
    }

    /// Mark a rollback point. Idempotent.
    pub async fn create_rollback_point(&self, session_id: &SessionId) -> Result<FlashSession> {
        let context = OperatorContext::anonymous();
        let entry = self.entry(session_id).await?;
        self.authorize(&entry, OperationKind::CreateRollbackPoint, &context)?;

        self.transition(&entry, OperationKind::CreateRollbackPoint, &context, |session| {
            Ok((session.with_rollback_point()?, "Rollback point created".to_string()))
        })
        .await
    }

    /// `Completed` / `Failed` -> `Rollback`. Requires confirmation and a rollback point.
    pub async fn rollback(&self, session_id: &SessionId, context: &OperatorContext) -> Result<FlashSession> {
        let entry = self.entry(session_id).await?;
        self.authorize(&entry, OperationKind::Rollback, context)?;

        self.transition(&entry, OperationKind::Rollback, context, |session| {
            Ok((session.rolled_back()?, "Flash rolled back".to_string()))
        })
        .await
    }

    /// Cancel a session that has not reached a terminal state.
    pub async fn abort(&self, session_id: &SessionId, reason: &str) -> Result<FlashSession> {
        let context = OperatorContext::anonymous();
        let entry = self.entry(session_id).await?;
        self.authorize(&entry, OperationKind::Abort, &context)?;

        self.transition(&entry, OperationKind::Abort, &context, |session| {
            Ok((session.aborted(reason)?, format!("Flash aborted: {}", reason)))
        })
        .await
    }

    /// Read `[start_address, start_address + length)` in blocks of `block_size`. Allowed in any session state.
    pub async fn read_rom(&self, session_id: &SessionId, request: ReadRomRequest) -> Result<RomReadout> {
        if request.block_size > self.config.max_read_block_size {
            return Err(Error::InvalidInput(format!(
                "block size {} exceeds maximum of {}",
                request.block_size, self.config.max_read_block_size
            )));
        }

        let entry = self.entry(session_id).await?;
        let chunks = plan_blocks(
            request.start_address,
            request.length,
            request.block_size,
            entry.ecu.size(),
        )?;

        let mut blocks = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            debug!("Reading block 0x{:x}+{}", chunk.address, chunk.length);
            let data = entry.ecu.read(chunk.address, chunk.length).await?;
            blocks.push(RomBlock {
                address: chunk.address,
                data,
            });
        }

        Ok(RomReadout {
            start_address: request.start_address,
            block_size: request.block_size,
            blocks,
        })
    }

    /// Write a burst of data to a `Flashing` session's ECU, optionally reading it back.
    pub async fn write_rom(
        &self,
        session_id: &SessionId,
        request: WriteRomRequest,
        context: &OperatorContext,
    ) -> Result<WriteOutcome> {
        let entry = self.entry(session_id).await?;
        self.authorize(&entry, OperationKind::WriteRom, context)?;

        if request.data.is_empty() {
            return Err(Error::InvalidInput("write data must not be empty".into()));
        }
        checksum::check_bounds(request.start_address, request.data.len(), entry.ecu.size())?;
        entry.state.lock().await.ensure_flashing(OperationKind::WriteRom)?;

        let length = request.data.len();
        let effect = Effect {
            operation: OperationKind::WriteRom,
            address: request.start_address,
            length,
            description: format!("Wrote {} bytes at 0x{:x}", length, request.start_address),
        };

        debug!("Writing 0x{:x}+{} for session {}", request.start_address, length, session_id);
        if let Err(e) = entry.ecu.write(request.start_address, &request.data).await {
            return Err(self.fail_after_transport(&entry, context, &effect, e).await);
        }

        let written = checksum::compute(&request.data, ChecksumAlgorithm::Crc32);
        if request.verify {
            let readback = match entry.ecu.read(request.start_address, length).await {
                Ok(readback) => readback,
                Err(e) => return Err(self.fail_after_transport(&entry, context, &effect, e).await),
            };
            let actual = checksum::compute(&readback, ChecksumAlgorithm::Crc32);
            if actual != written {
                warn!(
                    "Write verification failed for session {} at 0x{:x}",
                    session_id, request.start_address
                );
                self.record_effect(&entry, context, &effect, OUTCOME_READBACK_MISMATCH)
                    .await?;
                return Err(Error::ChecksumMismatch {
                    expected: written.to_hex(),
                    actual: actual.to_hex(),
                });
            }
        }

        let session = self
            .commit_effect(&entry, context, &effect, |session| {
                session.after_write(request.start_address, length)
            })
            .await?;

        Ok(WriteOutcome {
            session,
            start_address: request.start_address,
            bytes_written: length,
            verified: request.verify,
            checksum: written,
        })
    }

    /// Erase sectors (or blocks) of a `Flashing` session's ECU. The length is rounded up to the erase granularity.
    pub async fn erase_rom(
        &self,
        session_id: &SessionId,
        request: EraseRomRequest,
        context: &OperatorContext,
    ) -> Result<EraseOutcome> {
        let entry = self.entry(session_id).await?;
        self.authorize(&entry, OperationKind::EraseRom, context)?;

        let granularity = self.config.erase_granularity(request.erase_type);
        let (chunk, units) = plan_erase(request.start_address, request.length, granularity, entry.ecu.size())?;
        entry.state.lock().await.ensure_flashing(OperationKind::EraseRom)?;

        let effect = Effect {
            operation: OperationKind::EraseRom,
            address: chunk.address,
            length: chunk.length,
            description: format!("Erased {} {}(s) at 0x{:x}", units, request.erase_type, chunk.address),
        };

        debug!("Erasing 0x{:x}+{} for session {}", chunk.address, chunk.length, session_id);
        if let Err(e) = entry.ecu.erase(chunk.address, chunk.length).await {
            return Err(self.fail_after_transport(&entry, context, &effect, e).await);
        }

        let session = self
            .commit_effect(&entry, context, &effect, |session| {
                session.ensure_flashing(OperationKind::EraseRom)?;
                Ok(session.clone())
            })
            .await?;

        Ok(EraseOutcome {
            session,
            erase_type: request.erase_type,
            start_address: chunk.address,
            erased_length: chunk.length,
            sectors_erased: units,
        })
    }

    /// Checksum over a range of the session's ECU. Read only.
    pub async fn calculate_checksum(
        &self,
        session_id: &SessionId,
        start_address: usize,
        length: usize,
        algorithm: ChecksumAlgorithm,
    ) -> Result<ChecksumReport> {
        let entry = self.entry(session_id).await?;
        checksum::check_bounds(start_address, length, entry.ecu.size())?;

        let bytes = entry.ecu.read(start_address, length).await?;
        Ok(ChecksumReport {
            algorithm,
            start_address,
            length,
            value: checksum::compute(&bytes, algorithm),
        })
    }

    /// Compare a range of the session's ECU against an expected checksum (hex, either case).
    pub async fn verify_checksum(
        &self,
        session_id: &SessionId,
        start_address: usize,
        length: usize,
        expected: &str,
        algorithm: ChecksumAlgorithm,
    ) -> Result<bool> {
        let report = self.calculate_checksum(session_id, start_address, length, algorithm).await?;
        Ok(report.value.to_hex().eq_ignore_ascii_case(expected))
    }

    /// Write a checksum value into the session's ECU in the algorithm's native width.
    pub async fn patch_checksum(
        &self,
        session_id: &SessionId,
        request: PatchChecksumRequest,
        context: &OperatorContext,
    ) -> Result<FlashSession> {
        let entry = self.entry(session_id).await?;
        self.authorize(&entry, OperationKind::PatchChecksum, context)?;

        let value = ChecksumValue::from_hex(request.algorithm, &request.new_checksum)?;
        checksum::check_bounds(request.checksum_address, request.algorithm.width(), entry.ecu.size())?;
        entry.state.lock().await.after_patch()?;

        let effect = Effect {
            operation: OperationKind::PatchChecksum,
            address: request.checksum_address,
            length: value.as_bytes().len(),
            description: format!(
                "Patched {} checksum {} at 0x{:x}",
                request.algorithm, value, request.checksum_address
            ),
        };

        if let Err(e) = entry.ecu.write(request.checksum_address, value.as_bytes()).await {
            return Err(self.fail_after_transport(&entry, context, &effect, e).await);
        }

        self.commit_effect(&entry, context, &effect, FlashSession::after_patch)
            .await
    }

    async fn entry(&self, session_id: &SessionId) -> Result<Arc<SessionEntry>> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("session {}", session_id)))
    }

    fn authorize(&self, entry: &SessionEntry, operation: OperationKind, context: &OperatorContext) -> Result<ModeConfig> {
        let hardware = entry.ecu.hardware_evidence();
        self.gate.authorize(&GuardRequest {
            operation,
            context,
            hardware: hardware.as_ref(),
        })
    }

    /// Apply `f` under the session lock. The audit record is delivered before the new state is committed,
    /// so a rejected transition or an unreachable audit store leaves the session untouched.
    ///
    /// The lock stays held across audit retries. Releasing it would let another caller commit on top of a
    /// state whose record may still be lost; the cost is that a slow audit store stalls this session (only
    /// this one) for up to the `FlashConfig::audit_retry` budget.
    async fn transition<F>(
        &self,
        entry: &SessionEntry,
        operation: OperationKind,
        context: &OperatorContext,
        f: F,
    ) -> Result<FlashSession>
    where
        F: FnOnce(&FlashSession) -> Result<(FlashSession, String)>,
    {
        let mut session = entry.state.lock().await;
        let (next, description) = f(&session)?;

        let record = AuditRecord::new(next.id, operation, description)
            .attributed(
                context.technician_id().or(next.technician_id.as_deref()),
                context.job_id().or(next.job_id.as_deref()),
            )
            .with("ecu", &next.ecu_id)
            .with("status", next.status)
            .with("progress", next.progress)
            .with("mode", self.current_mode());
        self.audit.emit(&record).await?;

        if next.status != session.status {
            info!("Session {}: {} -> {}", next.id, session.status, next.status);
        }
        *session = next.clone();
        Ok(next)
    }

    /// Commit the transition that follows a completed hardware change. When the session moved on while
    /// the ECU was busy the transition is rejected, but the change is still audited.
    async fn commit_effect<F>(
        &self,
        entry: &SessionEntry,
        context: &OperatorContext,
        effect: &Effect,
        f: F,
    ) -> Result<FlashSession>
    where
        F: FnOnce(&FlashSession) -> Result<FlashSession>,
    {
        let result = self
            .transition(entry, effect.operation, context, |session| {
                Ok((f(session)?, effect.description.clone()))
            })
            .await;

        match result {
            Err(Error::AuditUnavailable(reason)) => Err(Error::AuditUnavailable(reason)),
            Err(e) => {
                warn!("{} landed after the session moved on: {}", effect.operation, e);
                self.record_effect(entry, context, effect, OUTCOME_STATE_MOVED_ON)
                    .await?;
                Err(e)
            }
            ok => ok,
        }
    }

    /// Audit a hardware change that did not produce a committed transition. Session state is untouched.
    async fn record_effect(
        &self,
        entry: &SessionEntry,
        context: &OperatorContext,
        effect: &Effect,
        outcome: &str,
    ) -> Result<()> {
        let session = entry.state.lock().await.clone();

        let record = AuditRecord::new(session.id, effect.operation, effect.description.clone())
            .attributed(
                context.technician_id().or(session.technician_id.as_deref()),
                context.job_id().or(session.job_id.as_deref()),
            )
            .with("ecu", &session.ecu_id)
            .with("status", session.status)
            .with("address", format!("0x{:x}", effect.address))
            .with("length", effect.length)
            .with("outcome", outcome)
            .with("mode", self.current_mode());
        self.audit.emit(&record).await?;
        Ok(())
    }

    /// Fail the session after a transport error. The ECU may have been partially changed, so the attempted
    /// range is audited first. Returns the original error unless that record could not be delivered.
    async fn fail_after_transport(
        &self,
        entry: &SessionEntry,
        context: &OperatorContext,
        effect: &Effect,
        error: Error,
    ) -> Error {
        warn!("Transport failure: {}", error);
        let reason = error.to_string();

        let recorded = self
            .record_effect(entry, context, effect, OUTCOME_TRANSPORT_ERROR)
            .await;

        let result = self
            .transition(entry, OperationKind::Abort, context, |session| {
                Ok((session.aborted(&reason)?, format!("Flash failed: {}", reason)))
            })
            .await;
        if let Err(e) = result {
            warn!("Could not fail session after transport error: {}", e);
        }

        match recorded {
            Ok(()) => error,
            Err(e) => e,
        }
    }
}

/// A hardware change made on behalf of a session, as it appears in the audit trail.
struct Effect {
    operation: OperationKind,
    address: usize,
    length: usize,
    description: String,
}
