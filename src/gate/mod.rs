//! Write gate. Every operation that can alter an ECU passes the same ordered guard chain before it may touch a
//! session or an ECU:
//!  1. write protection (operator mode allows ECU writes)
//!  2. real hardware (when the mode requires it)
//!  3. confirmation (when the mode requires it)
//!
//! The chain short-circuits on the first rejection. Technician attribution is checked next to each
//! endpoint with [`require_attribution`], against the same mode snapshot the chain used.

mod types;

pub use types::*;

use std::sync::Arc;

use crate::error::Error;
use crate::policy::{ModeConfig, OperatorModePolicy};
use crate::Result;

use tracing::info;

/// Everything a guard may look at.
#[derive(Debug, Clone, Copy)]
pub struct GuardRequest<'a> {
    pub operation: OperationKind,
    pub context: &'a OperatorContext,
    pub hardware: Option<&'a HardwareEvidence>,
}

/// A single check in the gate chain. Guards assume every guard before them passed.
pub trait Guard: Send + Sync {
    fn kind(&self) -> GuardKind;
    fn check(&self, config: &ModeConfig, request: &GuardRequest<'_>) -> Result<()>;
}

/// Rejects any write when the mode forbids ECU writes.
#[derive(Debug)]
pub struct EnforceWriteProtection;

impl Guard for EnforceWriteProtection {
    fn kind(&self) -> GuardKind {
        GuardKind::WriteProtection
    }

    fn check(&self, config: &ModeConfig, request: &GuardRequest<'_>) -> Result<()> {
        let result = OperatorModePolicy::check(config, request.operation.as_ref());
        if result.allowed {
            return Ok(());
        }

        let reason = result
            .reason
            .unwrap_or_else(|| format!("ECU writes are disabled in {} mode", config.mode));
        Err(Error::WriteDisabled(reason))
    }
}

/// Rejects when the mode requires a physical ECU and the transport did not vouch for one.
#[derive(Debug)]
pub struct RequireRealHardware;

impl Guard for RequireRealHardware {
    fn kind(&self) -> GuardKind {
        GuardKind::RealHardware
    }

    fn check(&self, config: &ModeConfig, request: &GuardRequest<'_>) -> Result<()> {
        if config.requires_real_hardware && request.hardware.is_none() {
            return Err(Error::MockHardwareNotPermitted {
                operation: request.operation,
                mode: config.mode,
            });
        }
        Ok(())
    }
}

/// Rejects when the mode requires confirmation and the request was not explicitly confirmed.
#[derive(Debug)]
pub struct RequireConfirmation;

impl Guard for RequireConfirmation {
    fn kind(&self) -> GuardKind {
        GuardKind::Confirmation
    }

    fn check(&self, config: &ModeConfig, request: &GuardRequest<'_>) -> Result<()> {
        if config.requires_confirmation && !request.context.is_confirmed() {
            return Err(Error::ConfirmationRequired(request.operation));
        }
        Ok(())
    }
}

static NO_CHAIN: [&dyn Guard; 0] = [];
static WRITE_PROTECTION_CHAIN: [&dyn Guard; 1] = [&EnforceWriteProtection];
static CONFIRMED_CHAIN: [&dyn Guard; 2] = [&EnforceWriteProtection, &RequireConfirmation];
static FULL_CHAIN: [&dyn Guard; 3] = [
    &EnforceWriteProtection,
    &RequireRealHardware,
    &RequireConfirmation,
];

impl OperationKind {
    /// Guard chain for this operation, in evaluation order.
    pub fn guards(&self) -> &'static [&'static dyn Guard] {
        match self {
            OperationKind::Flash
            | OperationKind::WriteRom
            | OperationKind::EraseRom
            | OperationKind::PatchChecksum => &FULL_CHAIN,
            OperationKind::Rollback => &CONFIRMED_CHAIN,
            OperationKind::CreateSession => &NO_CHAIN,
            OperationKind::UpdateProgress
            | OperationKind::Verify
            | OperationKind::CreateRollbackPoint
            | OperationKind::Abort => &WRITE_PROTECTION_CHAIN,
        }
    }

    /// Whether the endpoint must carry a technician id when the mode demands attribution.
    pub fn requires_attribution(&self) -> bool {
        match self {
            OperationKind::Flash
            | OperationKind::WriteRom
            | OperationKind::EraseRom
            | OperationKind::PatchChecksum
            | OperationKind::Rollback => true,
            OperationKind::CreateSession
            | OperationKind::UpdateProgress
            | OperationKind::Verify
            | OperationKind::CreateRollbackPoint
            | OperationKind::Abort => false,
        }
    }
}

/// Evaluates guard chains against the shared [`OperatorModePolicy`].
#[derive(Debug, Clone)]
pub struct WriteGate {
    policy: Arc<OperatorModePolicy>,
}

impl WriteGate {
    pub fn new(policy: Arc<OperatorModePolicy>) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &Arc<OperatorModePolicy> {
        &self.policy
    }

    /// Run the operation's guard chain. Returns the mode snapshot the chain was evaluated against,
    /// to be reused for the attribution check.
    pub fn check(&self, request: &GuardRequest<'_>) -> Result<ModeConfig> {
        let config = self.policy.mode_config();

        for guard in request.operation.guards() {
            if let Err(e) = guard.check(&config, request) {
                info!(
                    "Gate rejected {} at {} guard in {} mode: {}",
                    request.operation,
                    guard.kind(),
                    config.mode,
                    e
                );
                return Err(e);
            }
        }

        Ok(config)
    }

    /// Guard chain followed by the endpoint's attribution check.
    pub fn authorize(&self, request: &GuardRequest<'_>) -> Result<ModeConfig> {
        let config = self.check(request)?;
        if request.operation.requires_attribution() {
            require_attribution(&config, request.operation, request.context)?;
        }
        Ok(config)
    }
}

/// Technician attribution check, applied per endpoint rather than as part of the generic chain.
pub fn require_attribution(
    config: &ModeConfig,
    operation: OperationKind,
    context: &OperatorContext,
) -> Result<()> {
    if config.requires_technician_attribution && context.technician_id().is_none() {
        info!("Rejected {} without technician attribution", operation);
        return Err(Error::AttributionMissing(operation));
    }
    Ok(())
}
