//! Types used by flash sessions.
use std::fmt;

use chrono::{DateTime, Utc};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use uuid::Uuid;

use super::constants::FILE_HASH_LEN;
use crate::checksum::{ChecksumAlgorithm, ChecksumValue};
use crate::error::Error;
use crate::Result;

/// Opaque unique session identifier.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        SessionId(Uuid::new_v4())
    }

    pub fn parse(value: &str) -> Result<Self> {
        Uuid::parse_str(value)
            .map(SessionId)
            .map_err(|_| Error::InvalidInput(format!("malformed session id {:?}", value)))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

/// SHA-256 digest of a firmware image, stored as 64 lowercase hex characters.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileHash(String);

impl FileHash {
    /// Accepts exactly 64 hex characters, in either case.
    pub fn parse(value: &str) -> Result<Self> {
        if value.len() != FILE_HASH_LEN || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidInput(format!(
                "file hash must be {} hex characters, got {:?}",
                FILE_HASH_LEN, value
            )));
        }
        Ok(FileHash(value.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, value: &ChecksumValue) -> bool {
        value.algorithm == ChecksumAlgorithm::Sha256 && value.to_hex() == self.0
    }
}

impl fmt::Display for FileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a flash session.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Display, EnumString, EnumIter, AsRefStr)]
#[strum(serialize_all = "lowercase")]
#[strum(ascii_case_insensitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FlashStatus {
    Preparing,
    Flashing,
    Verifying,
    Completed,
    Failed,
    Rollback,
}

impl FlashStatus {
    /// States that carry an end time.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FlashStatus::Completed | FlashStatus::Failed | FlashStatus::Rollback
        )
    }
}

/// Half-open address range `[start, end)`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Extent {
    pub start: usize,
    pub end: usize,
}

impl Extent {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn union(&self, other: Extent) -> Extent {
        Extent {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// One firmware flash of one ECU.
#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlashSession {
    pub id: SessionId,
    pub ecu_id: String,
    pub file_name: String,
    pub file_hash: FileHash,
    /// Declared image size, used to derive progress from write bursts
    pub image_size: Option<u64>,
    pub status: FlashStatus,
    pub progress: u8,
    /// `None` until a verify step ran
    pub checksum_validated: Option<bool>,
    pub rollback_available: bool,
    pub technician_id: Option<String>,
    pub job_id: Option<String>,
    pub start_time: DateTime<Utc>,
    /// Set exactly when the status is terminal
    pub end_time: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub bytes_written: u64,
    /// Address range covered by writes in this session
    pub written: Option<Extent>,
}

/// Request to open a new session.
#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CreateSessionRequest {
    pub ecu_id: String,
    pub file_name: String,
    pub file_hash: String,
    pub image_size: Option<u64>,
}

impl CreateSessionRequest {
    pub fn new(ecu_id: impl Into<String>, file_name: impl Into<String>, file_hash: impl Into<String>) -> Self {
        Self {
            ecu_id: ecu_id.into(),
            file_name: file_name.into(),
            file_hash: file_hash.into(),
            image_size: None,
        }
    }

    pub fn with_image_size(mut self, image_size: u64) -> Self {
        self.image_size = Some(image_size);
        self
    }
}

/// Progress report from the transport layer, optionally moving the session to a new state.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProgressUpdate {
    pub progress: u8,
    pub status: Option<FlashStatus>,
}

impl ProgressUpdate {
    pub fn new(progress: u8) -> Self {
        Self {
            progress,
            status: None,
        }
    }

    pub fn with_status(mut self, status: FlashStatus) -> Self {
        self.status = Some(status);
        self
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReadRomRequest {
    pub start_address: usize,
    pub length: usize,
    pub block_size: usize,
}

#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WriteRomRequest {
    pub start_address: usize,
    pub data: Vec<u8>,
    /// Read the range back after writing and compare
    pub verify: bool,
}

/// Erase granularity.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
#[strum(ascii_case_insensitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum EraseType {
    Sector,
    Block,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EraseRomRequest {
    pub start_address: usize,
    pub length: usize,
    pub erase_type: EraseType,
}

#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PatchChecksumRequest {
    pub checksum_address: usize,
    pub new_checksum: String,
    pub algorithm: ChecksumAlgorithm,
}

/// A chunk of a ROM read.
#[derive(Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RomBlock {
    pub address: usize,
    pub data: Vec<u8>,
}

impl fmt::Debug for RomBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RomBlock")
            .field("address", &format_args!("0x{:x}", self.address))
            .field("data", &hex::encode(&self.data))
            .finish()
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RomReadout {
    pub start_address: usize,
    pub block_size: usize,
    pub blocks: Vec<RomBlock>,
}

impl RomReadout {
    /// All blocks concatenated.
    pub fn data(&self) -> Vec<u8> {
        self.blocks.iter().flat_map(|b| b.data.iter().copied()).collect()
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct WriteOutcome {
    pub session: FlashSession,
    pub start_address: usize,
    pub bytes_written: usize,
    /// Whether the range was read back and matched
    pub verified: bool,
    /// CRC-32 of the written data
    pub checksum: ChecksumValue,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct EraseOutcome {
    pub session: FlashSession,
    pub erase_type: EraseType,
    pub start_address: usize,
    pub erased_length: usize,
    pub sectors_erased: usize,
}
