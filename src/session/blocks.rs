//! Address arithmetic for block reads and sector erases.

use crate::checksum::check_bounds;
use crate::error::Error;
use crate::Result;

/// A contiguous chunk `[address, address + length)`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Chunk {
    pub address: usize,
    pub length: usize,
}

/// Split `[start, start + length)` into `ceil(length / block_size)` blocks of `block_size`, block `i` starting at
/// `start + i * block_size`. The last block is rounded up to a full block, clipped only at the end of memory.
pub fn plan_blocks(start: usize, length: usize, block_size: usize, limit: usize) -> Result<Vec<Chunk>> {
    if block_size == 0 {
        return Err(Error::InvalidInput("block size must not be zero".into()));
    }
    if length == 0 {
        return Err(Error::InvalidInput("length must not be zero".into()));
    }
    check_bounds(start, length, limit)?;

    let count = length.div_ceil(block_size);
    let chunks = (0..count)
        .map(|i| {
            let address = start + i * block_size;
            Chunk {
                address,
                length: block_size.min(limit - address),
            }
        })
        .collect();

    Ok(chunks)
}

/// Erase span of `length` bytes rounded up to `granularity`. The start must be aligned to the granularity.
/// Returns the span and the number of units erased.
pub fn plan_erase(start: usize, length: usize, granularity: usize, limit: usize) -> Result<(Chunk, usize)> {
    if granularity == 0 {
        return Err(Error::InvalidInput("erase granularity must not be zero".into()));
    }
    if length == 0 {
        return Err(Error::InvalidInput("length must not be zero".into()));
    }
    if start % granularity != 0 {
        return Err(Error::InvalidInput(format!(
            "erase start 0x{:x} is not aligned to 0x{:x}",
            start, granularity
        )));
    }

    let units = length.div_ceil(granularity);
    let erased = units
        .checked_mul(granularity)
        .ok_or_else(|| Error::InvalidInput("erase length overflows".into()))?;
    check_bounds(start, erased, limit)?;

    Ok((
        Chunk {
            address: start,
            length: erased,
        },
        units,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_round_up() {
        let chunks = plan_blocks(0x100, 0x250, 0x100, 0x1000).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], Chunk { address: 0x100, length: 0x100 });
        assert_eq!(chunks[2], Chunk { address: 0x300, length: 0x100 });
    }

    #[test]
    fn blocks_exact_multiple() {
        let chunks = plan_blocks(0, 0x200, 0x100, 0x1000).unwrap();
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn last_block_clipped_at_end_of_memory() {
        let chunks = plan_blocks(0xf80, 0x40, 0x100, 0x1000).unwrap();
        assert_eq!(chunks, vec![Chunk { address: 0xf80, length: 0x80 }]);
    }

    #[test]
    fn blocks_reject_bad_input() {
        assert!(matches!(plan_blocks(0, 0x10, 0, 0x1000), Err(Error::InvalidInput(_))));
        assert!(matches!(plan_blocks(0, 0, 0x10, 0x1000), Err(Error::InvalidInput(_))));
        assert!(matches!(plan_blocks(0xff0, 0x20, 0x10, 0x1000), Err(Error::OutOfBounds { .. })));
    }

    #[test]
    fn erase_rounds_to_sectors() {
        let (chunk, sectors) = plan_erase(0x1000, 1, 0x1000, 0x10000).unwrap();
        assert_eq!(chunk, Chunk { address: 0x1000, length: 0x1000 });
        assert_eq!(sectors, 1);

        let (chunk, sectors) = plan_erase(0, 0x2001, 0x1000, 0x10000).unwrap();
        assert_eq!(chunk.length, 0x3000);
        assert_eq!(sectors, 3);
    }

    #[test]
    fn erase_rejects_bad_input() {
        assert!(matches!(plan_erase(0x10, 0x10, 0x1000, 0x10000), Err(Error::InvalidInput(_))));
        assert!(matches!(plan_erase(0xf000, 0x1001, 0x1000, 0x10000), Err(Error::OutOfBounds { .. })));
        assert!(matches!(plan_erase(0, usize::MAX, 0x1000, usize::MAX), Err(Error::InvalidInput(_))));
    }
}
