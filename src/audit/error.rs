//! Error types for audit sinks.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Audit store unavailable: {0}")]
    Unavailable(String),
    #[error("Audit record rejected: {0}")]
    Rejected(String),
}
