//! Error types for the checksum engine.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Address range 0x{address:x}+{length} exceeds image of {limit} bytes")]
    OutOfBounds {
        address: usize,
        length: usize,
        limit: usize,
    },
    #[error("Invalid {algorithm} checksum value: {value:?}")]
    InvalidValue { algorithm: String, value: String },
    #[error("Unsupported checksum algorithm: {0:?}")]
    UnsupportedAlgorithm(String),
}
