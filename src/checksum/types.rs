//! Types used by the checksum engine.
use std::fmt;

use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

use super::error::Error;

/// Integrity algorithms supported over a ROM byte range.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Display, EnumString, EnumIter, AsRefStr)]
#[strum(serialize_all = "lowercase")]
#[strum(ascii_case_insensitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ChecksumAlgorithm {
    /// Wrapping sum of bytes
    Sum8,
    /// Wrapping sum of big-endian 16 bit words
    Sum16,
    /// Wrapping sum of big-endian 32 bit words
    Sum32,
    /// CRC-8/SMBUS
    Crc8,
    /// CRC-16/CCITT-FALSE
    Crc16,
    /// CRC-32/ISO-HDLC
    Crc32,
    /// SHA-256 digest, used to compare a flashed region against the image's file hash
    Sha256,
}

impl ChecksumAlgorithm {
    /// Width of the checksum value in bytes. This is also the number of bytes written when patching.
    pub fn width(&self) -> usize {
        match self {
            ChecksumAlgorithm::Sum8 | ChecksumAlgorithm::Crc8 => 1,
            ChecksumAlgorithm::Sum16 | ChecksumAlgorithm::Crc16 => 2,
            ChecksumAlgorithm::Sum32 | ChecksumAlgorithm::Crc32 => 4,
            ChecksumAlgorithm::Sha256 => 32,
        }
    }

    pub fn bits(&self) -> usize {
        self.width() * 8
    }

    /// Parse an algorithm name coming from an untyped boundary (CLI, HTTP body, ...).
    pub fn parse(name: &str) -> Result<Self, Error> {
        name.parse()
            .map_err(|_| Error::UnsupportedAlgorithm(name.to_string()))
    }
}

/// A computed or expected checksum, stored big-endian in the algorithm's native width.
#[derive(Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChecksumValue {
    pub algorithm: ChecksumAlgorithm,
    bytes: Vec<u8>,
}

impl ChecksumValue {
    pub(crate) fn from_be_bytes(algorithm: ChecksumAlgorithm, bytes: Vec<u8>) -> Self {
        debug_assert_eq!(bytes.len(), algorithm.width());
        Self { algorithm, bytes }
    }

    /// Parse a hex string (either case) of exactly the algorithm's width.
    pub fn from_hex(algorithm: ChecksumAlgorithm, value: &str) -> Result<Self, Error> {
        let invalid = || Error::InvalidValue {
            algorithm: algorithm.to_string(),
            value: value.to_string(),
        };

        let bytes = hex::decode(value).map_err(|_| invalid())?;
        if bytes.len() != algorithm.width() {
            return Err(invalid());
        }

        Ok(Self { algorithm, bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Lowercase hex, left-zero-padded to the algorithm's width.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

impl fmt::Display for ChecksumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ChecksumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChecksumValue")
            .field("algorithm", &self.algorithm)
            .field("value", &self.to_hex())
            .finish()
    }
}

/// Result of a checksum calculation over an address range.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChecksumReport {
    pub algorithm: ChecksumAlgorithm,
    pub start_address: usize,
    pub length: usize,
    pub value: ChecksumValue,
}
