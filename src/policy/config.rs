//! Startup configuration for the operator mode policy.
use super::constants::OPERATOR_MODE_ENV;
use super::types::OperatorMode;

use tracing::warn;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PolicyConfig {
    /// Mode the policy starts in
    pub mode: OperatorMode,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        PolicyConfig {
            mode: OperatorMode::Dev,
        }
    }
}

impl PolicyConfig {
    /// Read the startup mode from `ECU_OPERATOR_MODE`. Missing or unknown values fall back to [`OperatorMode::Dev`].
    pub fn from_env() -> Self {
        Self::from_value(std::env::var(OPERATOR_MODE_ENV).ok().as_deref())
    }

    pub fn from_value(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return Self::default();
        };

        match value.trim().parse::<OperatorMode>() {
            Ok(mode) => PolicyConfig { mode },
            Err(_) => {
                warn!("Unknown operator mode {:?}, falling back to dev", value);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_values() {
        assert_eq!(PolicyConfig::from_value(Some("workshop")).mode, OperatorMode::Workshop);
        assert_eq!(PolicyConfig::from_value(Some(" LAB ")).mode, OperatorMode::Lab);
        assert_eq!(PolicyConfig::from_value(Some("Dev")).mode, OperatorMode::Dev);
    }

    #[test]
    fn fails_closed() {
        assert_eq!(PolicyConfig::from_value(None).mode, OperatorMode::Dev);
        assert_eq!(PolicyConfig::from_value(Some("")).mode, OperatorMode::Dev);
        assert_eq!(PolicyConfig::from_value(Some("production")).mode, OperatorMode::Dev);
    }
}
