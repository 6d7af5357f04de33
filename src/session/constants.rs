//! Constants for flash sessions and block operations.

/// Erase granularity of a flash sector.
pub const SECTOR_SIZE: usize = 4096;
/// Erase granularity of a flash block.
pub const BLOCK_ERASE_SIZE: usize = 0x10000;
/// Largest block a single read may be chunked into.
pub const MAX_READ_BLOCK_SIZE: usize = 0x1000;
/// Value of erased flash cells.
pub const ERASED_BYTE: u8 = 0xff;

pub const MAX_PROGRESS: u8 = 100;
/// Length of a SHA-256 hex digest.
pub const FILE_HASH_LEN: usize = 64;

/// `outcome` audit metadata for ECU changes that were not committed to the session.
pub const OUTCOME_READBACK_MISMATCH: &str = "readback_mismatch";
pub const OUTCOME_STATE_MOVED_ON: &str = "state_moved_on";
pub const OUTCOME_TRANSPORT_ERROR: &str = "transport_error";
