//! Types used by the write gate.
use strum_macros::{AsRefStr, Display, EnumIter};

/// Every state-mutating operation the core exposes. Each one maps to exactly one guard chain.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Display, EnumIter, AsRefStr)]
#[strum(serialize_all = "snake_case")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum OperationKind {
    /// Open a session. Audited but not gated, nothing touches the ECU
    CreateSession,
    /// Start flashing a prepared session
    Flash,
    UpdateProgress,
    Verify,
    CreateRollbackPoint,
    Rollback,
    Abort,
    WriteRom,
    EraseRom,
    PatchChecksum,
}

/// Identifies the guard responsible for a rejection.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GuardKind {
    WriteProtection,
    RealHardware,
    Confirmation,
    Attribution,
}

/// Explicit operator confirmation. There is no default: callers must pick one.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Confirmation {
    Confirmed,
    Unconfirmed,
}

/// Opaque evidence that a physical ECU is attached, supplied by the transport layer.
#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HardwareEvidence {
    source: String,
}

impl HardwareEvidence {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Description of the adapter or device that vouched for the hardware.
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Who is asking, for which job, and whether they confirmed the operation.
#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OperatorContext {
    technician_id: Option<String>,
    job_id: Option<String>,
    confirmation: Confirmation,
}

impl OperatorContext {
    /// Context without technician, job or confirmation.
    pub fn anonymous() -> Self {
        Self {
            technician_id: None,
            job_id: None,
            confirmation: Confirmation::Unconfirmed,
        }
    }

    pub fn technician(technician_id: impl Into<String>) -> Self {
        Self {
            technician_id: Some(technician_id.into()),
            ..Self::anonymous()
        }
    }

    pub fn with_job(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    /// Mark the operation as explicitly confirmed by the operator.
    pub fn confirmed(mut self) -> Self {
        self.confirmation = Confirmation::Confirmed;
        self
    }

    pub fn with_confirmation(mut self, confirmation: Confirmation) -> Self {
        self.confirmation = confirmation;
        self
    }

    /// Technician id, ignoring blank values.
    pub fn technician_id(&self) -> Option<&str> {
        non_blank(&self.technician_id)
    }

    pub fn job_id(&self) -> Option<&str> {
        non_blank(&self.job_id)
    }

    pub fn confirmation(&self) -> Confirmation {
        self.confirmation
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmation == Confirmation::Confirmed
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}
