//! Contains the main error type for the library.
use thiserror::Error;

use crate::gate::{GuardKind, OperationKind};
use crate::policy::OperatorMode;
use crate::session::FlashStatus;

/// The main error type for the library. Every message is meant to be shown to the operator as is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Cannot {operation} a session in {status} state")]
    InvalidStateForTransition {
        operation: OperationKind,
        status: FlashStatus,
    },
    #[error("{0}")]
    WriteDisabled(String),
    #[error("Real ECU hardware required for {operation} operations in {mode} mode")]
    MockHardwareNotPermitted {
        operation: OperationKind,
        mode: OperatorMode,
    },
    #[error("Explicit confirmation required for {0} operations")]
    ConfirmationRequired(OperationKind),
    #[error("Technician attribution required for {0} operations")]
    AttributionMissing(OperationKind),
    #[error("No rollback point has been created for this session")]
    NoRollbackPoint,
    #[error("Session has not been flashed yet (status: {0})")]
    NotYetFlashed(FlashStatus),
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("Address range 0x{address:x}+{length} exceeds {limit} bytes")]
    OutOfBounds {
        address: usize,
        length: usize,
        limit: usize,
    },
    #[error("Audit log unavailable, operation not applied: {0}")]
    AuditUnavailable(String),
    #[error("Transport error: {0}")]
    Transport(String),
}

impl Error {
    /// The guard responsible for a policy rejection, `None` for every other error.
    pub fn guard(&self) -> Option<GuardKind> {
        match self {
            Error::WriteDisabled(_) => Some(GuardKind::WriteProtection),
            Error::MockHardwareNotPermitted { .. } => Some(GuardKind::RealHardware),
            Error::ConfirmationRequired(_) => Some(GuardKind::Confirmation),
            Error::AttributionMissing(_) => Some(GuardKind::Attribution),
            _ => None,
        }
    }

    /// Human readable reason, suitable for direct display.
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

impl From<crate::checksum::Error> for Error {
    fn from(err: crate::checksum::Error) -> Error {
        match err {
            crate::checksum::Error::OutOfBounds {
                address,
                length,
                limit,
            } => Error::OutOfBounds {
                address,
                length,
                limit,
            },
            e => Error::InvalidInput(e.to_string()),
        }
    }
}

impl From<crate::audit::Error> for Error {
    fn from(err: crate::audit::Error) -> Error {
        Error::AuditUnavailable(err.to_string())
    }
}
