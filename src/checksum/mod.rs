//! ROM checksum engine. Pure functions over byte ranges, safe to call from any thread.
//! ## Example
//! ```rust
//! use ecuflash::checksum::{self, ChecksumAlgorithm};
//!
//! let mut rom = vec![0x12, 0x34, 0x56, 0x78, 0x00, 0x00];
//! let sum = checksum::compute(&rom[..4], ChecksumAlgorithm::Sum16);
//! assert_eq!(sum.to_hex(), "68ac");
//!
//! checksum::patch(&mut rom, 4, &sum.to_hex(), ChecksumAlgorithm::Sum16).unwrap();
//! assert_eq!(rom[4..], [0x68, 0xac]);
//! assert!(checksum::verify(&rom[..4], ChecksumAlgorithm::Sum16, "68AC"));
//! ```

mod crc;
pub mod error;
mod types;

pub use error::Error;
pub use types::*;

use sha2::{Digest, Sha256};

/// Compute `algorithm` over `bytes`. Deterministic; the value is always exactly [`ChecksumAlgorithm::width`] bytes.
pub fn compute(bytes: &[u8], algorithm: ChecksumAlgorithm) -> ChecksumValue {
    let value = match algorithm {
        ChecksumAlgorithm::Sum8 => vec![sum8(bytes)],
        ChecksumAlgorithm::Sum16 => sum16(bytes).to_be_bytes().to_vec(),
        ChecksumAlgorithm::Sum32 => sum32(bytes).to_be_bytes().to_vec(),
        ChecksumAlgorithm::Crc8 => vec![crc::crc8_smbus(bytes)],
        ChecksumAlgorithm::Crc16 => crc::crc16_ccitt_false(bytes).to_be_bytes().to_vec(),
        ChecksumAlgorithm::Crc32 => crc::crc32_iso_hdlc(bytes).to_be_bytes().to_vec(),
        ChecksumAlgorithm::Sha256 => Sha256::digest(bytes).to_vec(),
    };

    ChecksumValue::from_be_bytes(algorithm, value)
}

/// Compare `compute(bytes, algorithm)` against a hex string, ignoring case.
pub fn verify(bytes: &[u8], algorithm: ChecksumAlgorithm, expected: &str) -> bool {
    compute(bytes, algorithm).to_hex().eq_ignore_ascii_case(expected)
}

/// Write `new_checksum` (hex) into `image` at `checksum_address`, big-endian in the algorithm's native width.
/// The image is left untouched on error.
pub fn patch(
    image: &mut [u8],
    checksum_address: usize,
    new_checksum: &str,
    algorithm: ChecksumAlgorithm,
) -> Result<(), Error> {
    let value = ChecksumValue::from_hex(algorithm, new_checksum)?;
    let target = range_mut(image, checksum_address, algorithm.width())?;
    target.copy_from_slice(value.as_bytes());
    Ok(())
}

/// Compute over `image[start_address..start_address + length]`.
pub fn compute_range(
    image: &[u8],
    start_address: usize,
    length: usize,
    algorithm: ChecksumAlgorithm,
) -> Result<ChecksumReport, Error> {
    let bytes = range(image, start_address, length)?;
    Ok(ChecksumReport {
        algorithm,
        start_address,
        length,
        value: compute(bytes, algorithm),
    })
}

/// Bounds checked sub-slice.
pub fn range(image: &[u8], start_address: usize, length: usize) -> Result<&[u8], Error> {
    let end = check_bounds(start_address, length, image.len())?;
    Ok(&image[start_address..end])
}

fn range_mut(image: &mut [u8], start_address: usize, length: usize) -> Result<&mut [u8], Error> {
    let end = check_bounds(start_address, length, image.len())?;
    Ok(&mut image[start_address..end])
}

/// Returns the exclusive end of `[address, address + length)` if it fits within `limit`.
pub fn check_bounds(address: usize, length: usize, limit: usize) -> Result<usize, Error> {
    match address.checked_add(length) {
        Some(end) if end <= limit => Ok(end),
        _ => Err(Error::OutOfBounds {
            address,
            length,
            limit,
        }),
    }
}

fn sum8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &x| acc.wrapping_add(x))
}

fn sum16(bytes: &[u8]) -> u16 {
    bytes.chunks(2).fold(0u16, |acc, chunk| {
        let mut word = [0u8; 2];
        word[..chunk.len()].copy_from_slice(chunk);
        acc.wrapping_add(u16::from_be_bytes(word))
    })
}

fn sum32(bytes: &[u8]) -> u32 {
    bytes.chunks(4).fold(0u32, |acc, chunk| {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        acc.wrapping_add(u32::from_be_bytes(word))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn sum8_wraps() {
        let value = compute(&[0xff, 0x02], ChecksumAlgorithm::Sum8);
        assert_eq!(value.to_hex(), "01");
    }

    #[test]
    fn sum16_pads_trailing_byte() {
        // 0x1234 + 0x5600
        let value = compute(&[0x12, 0x34, 0x56], ChecksumAlgorithm::Sum16);
        assert_eq!(value.to_hex(), "6834");
    }

    #[test]
    fn sum32_wraps_and_pads() {
        let value = compute(&[0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x02], ChecksumAlgorithm::Sum32);
        assert_eq!(value.to_hex(), "00000001");

        let value = compute(&[0x01], ChecksumAlgorithm::Sum32);
        assert_eq!(value.to_hex(), "01000000");
    }

    #[test]
    fn hex_width_matches_algorithm() {
        let data: Vec<u8> = (0..=255).collect();
        for algorithm in ChecksumAlgorithm::iter() {
            let value = compute(&data, algorithm);
            assert_eq!(value.to_hex().len(), algorithm.width() * 2, "{}", algorithm);
            assert_eq!(value.to_hex(), value.to_hex().to_lowercase());
        }
    }

    #[test]
    fn empty_range_is_zero_for_sums() {
        assert_eq!(compute(&[], ChecksumAlgorithm::Sum8).to_hex(), "00");
        assert_eq!(compute(&[], ChecksumAlgorithm::Sum16).to_hex(), "0000");
        assert_eq!(compute(&[], ChecksumAlgorithm::Sum32).to_hex(), "00000000");
    }

    #[test]
    fn verify_is_case_insensitive() {
        let data = b"123456789";
        assert!(verify(data, ChecksumAlgorithm::Crc32, "CBF43926"));
        assert!(verify(data, ChecksumAlgorithm::Crc32, "cbf43926"));
        assert!(!verify(data, ChecksumAlgorithm::Crc32, "cbf43927"));
        assert!(!verify(data, ChecksumAlgorithm::Crc32, "0xcbf43926"));
    }

    #[test]
    fn patch_writes_native_width() {
        let mut image = vec![0u8; 8];
        patch(&mut image, 4, "DEADBEEF", ChecksumAlgorithm::Crc32).unwrap();
        assert_eq!(image, vec![0, 0, 0, 0, 0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn patch_out_of_bounds_leaves_image_untouched() {
        let mut image = vec![0u8; 8];
        let err = patch(&mut image, 6, "deadbeef", ChecksumAlgorithm::Crc32).unwrap_err();
        assert_eq!(
            err,
            Error::OutOfBounds {
                address: 6,
                length: 4,
                limit: 8
            }
        );
        assert_eq!(image, vec![0u8; 8]);
    }

    #[test]
    fn patch_rejects_wrong_width() {
        let mut image = vec![0u8; 8];
        let err = patch(&mut image, 0, "beef", ChecksumAlgorithm::Crc32).unwrap_err();
        assert!(matches!(err, Error::InvalidValue { .. }));

        let err = patch(&mut image, 0, "zz", ChecksumAlgorithm::Sum8).unwrap_err();
        assert!(matches!(err, Error::InvalidValue { .. }));
    }

    #[test]
    fn compute_range_bounds() {
        let image = [1u8, 2, 3, 4];
        let report = compute_range(&image, 1, 2, ChecksumAlgorithm::Sum8).unwrap();
        assert_eq!(report.value.to_hex(), "05");

        assert!(compute_range(&image, 3, 2, ChecksumAlgorithm::Sum8).is_err());
        assert!(compute_range(&image, usize::MAX, 2, ChecksumAlgorithm::Sum8).is_err());
    }

    #[test]
    fn parse_algorithm_names() {
        assert_eq!(ChecksumAlgorithm::parse("crc16").unwrap(), ChecksumAlgorithm::Crc16);
        assert_eq!(ChecksumAlgorithm::parse("SUM32").unwrap(), ChecksumAlgorithm::Sum32);
        assert_eq!(
            ChecksumAlgorithm::parse("md5").unwrap_err(),
            Error::UnsupportedAlgorithm("md5".into())
        );
    }
}
