//! Operator mode policy. Single source of truth for the current mode and its capability table.
//! ## Example
//! ```rust
//! use ecuflash::policy::{OperatorMode, OperatorModePolicy};
//!
//! let (policy, controller) = OperatorModePolicy::new(OperatorMode::Dev);
//! assert!(!policy.validate_ecu_write("flash").allowed);
//!
//! controller.set_mode(OperatorMode::Workshop);
//! assert!(policy.validate_ecu_write("flash").allowed);
//! ```

mod config;
mod constants;
mod types;

pub use config::PolicyConfig;
pub use constants::*;
pub use types::*;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

/// Holds the current [`OperatorMode`]. Reads are lock-free; the only writer is the [`ModeController`]
/// returned alongside the policy.
#[derive(Debug)]
pub struct OperatorModePolicy {
    mode: AtomicU8,
}

impl OperatorModePolicy {
    /// Create a policy handle for sharing with every component that gates writes, and the controller
    /// used by the administrative path to change modes.
    pub fn new(mode: OperatorMode) -> (Arc<Self>, ModeController) {
        let policy = Arc::new(Self {
            mode: AtomicU8::new(mode as u8),
        });
        let controller = ModeController {
            policy: policy.clone(),
        };
        (policy, controller)
    }

    pub fn from_config(config: &PolicyConfig) -> (Arc<Self>, ModeController) {
        Self::new(config.mode)
    }

    /// Current mode. An unknown stored value reads as [`OperatorMode::Dev`].
    pub fn current_mode(&self) -> OperatorMode {
        OperatorMode::from_repr(self.mode.load(Ordering::Acquire)).unwrap_or(OperatorMode::Dev)
    }

    /// Capability table of the current mode.
    pub fn mode_config(&self) -> ModeConfig {
        self.current_mode().config()
    }

    /// Check whether an ECU write may proceed. The mode is the only discriminator, `operation` is
    /// carried for logging.
    pub fn validate_ecu_write(&self, operation: &str) -> WriteCheckResult {
        Self::check(&self.mode_config(), operation)
    }

    /// Evaluate against an already captured capability table, so a whole guard chain sees one mode.
    pub(crate) fn check(config: &ModeConfig, operation: &str) -> WriteCheckResult {
        if config.allows_ecu_write {
            return WriteCheckResult::allow();
        }

        debug!("Blocked {} in {} mode", operation, config.mode);
        WriteCheckResult::deny(format!(
            "ECU write operations are disabled in {} mode ({} blocked)",
            config.mode, operation
        ))
    }
}

/// Administrative handle, the single writer of the operator mode. Deliberately not `Clone`.
#[derive(Debug)]
pub struct ModeController {
    policy: Arc<OperatorModePolicy>,
}

impl ModeController {
    /// Switch modes, returning the previous one.
    pub fn set_mode(&self, mode: OperatorMode) -> OperatorMode {
        let previous = self.policy.mode.swap(mode as u8, Ordering::AcqRel);
        let previous = OperatorMode::from_repr(previous).unwrap_or(OperatorMode::Dev);
        if previous != mode {
            warn!("Operator mode changed from {} to {}", previous, mode);
        }
        previous
    }

    pub fn policy(&self) -> Arc<OperatorModePolicy> {
        self.policy.clone()
    }
}
