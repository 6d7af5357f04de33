//! Capability tables for each operator mode.
use super::types::{ModeConfig, OperatorMode};

/// Environment variable holding the startup operator mode.
pub const OPERATOR_MODE_ENV: &str = "ECU_OPERATOR_MODE";

pub const DEV_CONFIG: ModeConfig = ModeConfig {
    mode: OperatorMode::Dev,
    allows_ecu_write: false,
    requires_real_hardware: false,
    requires_confirmation: false,
    requires_technician_attribution: false,
};

pub const WORKSHOP_CONFIG: ModeConfig = ModeConfig {
    mode: OperatorMode::Workshop,
    allows_ecu_write: true,
    requires_real_hardware: true,
    requires_confirmation: true,
    requires_technician_attribution: true,
};

/// Lab drops the real hardware and attribution requirements so bench setups and
/// simulators can be flashed without a job. This is a deliberate reduction of safety.
pub const LAB_CONFIG: ModeConfig = ModeConfig {
    mode: OperatorMode::Lab,
    allows_ecu_write: true,
    requires_real_hardware: false,
    requires_confirmation: true,
    requires_technician_attribution: false,
};

impl OperatorMode {
    /// Capability table for this mode.
    pub const fn config(&self) -> ModeConfig {
        match self {
            OperatorMode::Dev => DEV_CONFIG,
            OperatorMode::Workshop => WORKSHOP_CONFIG,
            OperatorMode::Lab => LAB_CONFIG,
        }
    }
}
