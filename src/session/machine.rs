//! Flash session transitions. Each transition is a pure function from the current session to the
//! next one, so a rejected transition never leaves partial changes behind.
//!
//! ```text
//! Preparing --start--> Flashing --progress--> Verifying --progress--> Completed / Failed
//!                          |                                              |
//!                          +----------progress--> Completed / Failed      +--verify--> Completed / Failed
//! Completed / Failed --rollback (needs rollback point)--> Rollback
//! Preparing / Flashing / Verifying --abort--> Failed
//! ```

use chrono::Utc;

use super::constants::MAX_PROGRESS;
use super::types::{CreateSessionRequest, Extent, FileHash, FlashSession, FlashStatus, SessionId};
use crate::checksum::ChecksumValue;
use crate::error::Error;
use crate::gate::{OperationKind, OperatorContext};
use crate::Result;

impl FlashSession {
    /// Validate a creation request. Nothing is created when the file hash is malformed.
    pub fn create(request: &CreateSessionRequest) -> Result<Self> {
        let file_hash = FileHash::parse(&request.file_hash)?;

        if request.ecu_id.trim().is_empty() {
            return Err(Error::InvalidInput("ECU id must not be empty".into()));
        }
        if request.file_name.trim().is_empty() {
            return Err(Error::InvalidInput("file name must not be empty".into()));
        }
        if request.image_size == Some(0) {
            return Err(Error::InvalidInput("image size must not be zero".into()));
        }

        Ok(FlashSession {
            id: SessionId::new(),
            ecu_id: request.ecu_id.clone(),
            file_name: request.file_name.clone(),
            file_hash,
            image_size: request.image_size,
            status: FlashStatus::Preparing,
            progress: 0,
            checksum_validated: None,
            rollback_available: false,
            technician_id: None,
            job_id: None,
            start_time: Utc::now(),
            end_time: None,
            failure_reason: None,
            bytes_written: 0,
            written: None,
        })
    }

    fn invalid(&self, operation: OperationKind) -> Error {
        Error::InvalidStateForTransition {
            operation,
            status: self.status,
        }
    }

    fn enter(&mut self, status: FlashStatus) {
        self.status = status;
        if matches!(status, FlashStatus::Flashing | FlashStatus::Rollback) {
            self.progress = 0;
        }
        self.end_time = if status.is_terminal() {
            Some(Utc::now())
        } else {
            None
        };
    }

    /// `Preparing` -> `Flashing`, attributing the session to the operator.
    pub fn started(&self, context: &OperatorContext) -> Result<Self> {
        if self.status != FlashStatus::Preparing {
            return Err(self.invalid(OperationKind::Flash));
        }

        let mut next = self.clone();
        next.enter(FlashStatus::Flashing);
        next.technician_id = context.technician_id().map(str::to_string);
        next.job_id = context.job_id().map(str::to_string);
        Ok(next)
    }

    /// Record progress of the current phase, optionally moving on to `Verifying`, `Completed` or `Failed`.
    pub fn with_progress(&self, progress: u8, status: Option<FlashStatus>) -> Result<Self> {
        if progress > MAX_PROGRESS {
            return Err(Error::InvalidInput(format!(
                "progress must be between 0 and {}, got {}",
                MAX_PROGRESS, progress
            )));
        }

        let target = status.unwrap_or(self.status);
        let allowed = match self.status {
            FlashStatus::Flashing => matches!(
                target,
                FlashStatus::Flashing
                    | FlashStatus::Verifying
                    | FlashStatus::Completed
                    | FlashStatus::Failed
            ),
            FlashStatus::Verifying => matches!(
                target,
                FlashStatus::Verifying | FlashStatus::Completed | FlashStatus::Failed
            ),
            _ => false,
        };
        if !allowed {
            return Err(self.invalid(OperationKind::UpdateProgress));
        }

        let mut next = self.clone();
        if target == self.status {
            if progress < self.progress {
                return Err(Error::InvalidInput(format!(
                    "progress may not decrease within a phase ({} -> {})",
                    self.progress, progress
                )));
            }
        } else {
            next.enter(target);
            if target == FlashStatus::Failed {
                next.failure_reason = Some(format!("reported failed at {}%", progress));
            }
        }
        next.progress = progress;
        Ok(next)
    }

    /// Record the result of reading back the flashed region. A mismatch fails the session but does not roll it back.
    pub fn verified(&self, actual: &ChecksumValue) -> Result<Self> {
        if self.status != FlashStatus::Completed {
            return Err(Error::NotYetFlashed(self.status));
        }

        let mut next = self.clone();
        if self.file_hash.matches(actual) {
            next.checksum_validated = Some(true);
        } else {
            next.checksum_validated = Some(false);
            next.enter(FlashStatus::Failed);
            next.failure_reason = Some(format!(
                "verification failed: expected {}, read back {}",
                self.file_hash, actual
            ));
        }
        Ok(next)
    }

    /// Mark a rollback point. Idempotent, status is unchanged.
    pub fn with_rollback_point(&self) -> Result<Self> {
        if self.status == FlashStatus::Rollback {
            return Err(self.invalid(OperationKind::CreateRollbackPoint));
        }

        let mut next = self.clone();
        next.rollback_available = true;
        Ok(next)
    }

    /// `Completed` / `Failed` -> `Rollback`.
    pub fn rolled_back(&self) -> Result<Self> {
        if !self.rollback_available {
            return Err(Error::NoRollbackPoint);
        }
        if !matches!(self.status, FlashStatus::Completed | FlashStatus::Failed) {
            return Err(self.invalid(OperationKind::Rollback));
        }

        let mut next = self.clone();
        next.enter(FlashStatus::Rollback);
        Ok(next)
    }

    /// Any non-terminal state -> `Failed`.
    pub fn aborted(&self, reason: &str) -> Result<Self> {
        if self.status.is_terminal() {
            return Err(self.invalid(OperationKind::Abort));
        }

        let mut next = self.clone();
        next.enter(FlashStatus::Failed);
        next.failure_reason = Some(reason.to_string());
        Ok(next)
    }

    /// Block writes and erases are only accepted while flashing.
    pub fn ensure_flashing(&self, operation: OperationKind) -> Result<()> {
        if self.status != FlashStatus::Flashing {
            return Err(self.invalid(operation));
        }
        Ok(())
    }

    /// Account for a write burst, raising progress when the image size is known.
    pub fn after_write(&self, address: usize, length: usize) -> Result<Self> {
        self.ensure_flashing(OperationKind::WriteRom)?;

        let mut next = self.clone();
        let extent = Extent {
            start: address,
            end: address.saturating_add(length),
        };
        next.written = Some(match self.written {
            Some(written) => written.union(extent),
            None => extent,
        });
        next.bytes_written = self.bytes_written.saturating_add(length as u64);

        if let Some(image_size) = self.image_size {
            let percent = (next.bytes_written.saturating_mul(100) / image_size).min(MAX_PROGRESS as u64) as u8;
            next.progress = next.progress.max(percent);
        }
        Ok(next)
    }

    /// Checksums may be patched while flashing, or after completion (which invalidates an earlier verification).
    pub fn after_patch(&self) -> Result<Self> {
        if !matches!(self.status, FlashStatus::Flashing | FlashStatus::Completed) {
            return Err(self.invalid(OperationKind::PatchChecksum));
        }

        let mut next = self.clone();
        next.checksum_validated = None;
        Ok(next)
    }
}
