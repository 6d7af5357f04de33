//! Types used by the operator mode policy.
use strum_macros::{AsRefStr, Display, EnumIter, EnumString, FromRepr};

/// Global safety posture of the workshop tool.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Display, EnumString, EnumIter, AsRefStr, FromRepr)]
#[strum(serialize_all = "lowercase")]
#[strum(ascii_case_insensitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[repr(u8)]
pub enum OperatorMode {
    /// Development against simulated ECUs. Never writes to an ECU.
    Dev = 0,
    /// Production workshop use. Every guardrail enforced.
    Workshop = 1,
    /// Bench/lab use. Writes allowed with intentionally relaxed guardrails.
    Lab = 2,
}

/// Static capability table of an [`OperatorMode`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModeConfig {
    pub mode: OperatorMode,
    pub allows_ecu_write: bool,
    pub requires_real_hardware: bool,
    pub requires_confirmation: bool,
    pub requires_technician_attribution: bool,
}

/// Outcome of a single write-policy evaluation. Produced fresh on every call, never stored.
#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WriteCheckResult {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl WriteCheckResult {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}
