//! Register address ranges and the read-range merger.
//!
//! [`merge_address_ranges`] turns the individual register blocks requested
//! from a device into the read transactions that cover them. Ranges that
//! touch or overlap are joined, nested ranges disappear, and (optionally)
//! small holes between requested blocks are read as well when that saves a
//! transaction. No output ever exceeds `max_read_size` registers.

use serde::Serialize;
use std::fmt;

/// Protocol limit for registers in one read (function codes 0x03/0x04).
pub const MAX_READ_REGISTERS: u16 = 125;

/// Protocol limit for coils or discrete inputs in one read (0x01/0x02).
pub const MAX_READ_BITS: u16 = 2000;

/// Exclusive upper bound of the 16-bit register address space.
const ADDRESS_SPACE: u32 = 0x1_0000;

/// Errors raised while planning reads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("Invalid range: address {address} count {count} (count must be at least 1 and end within 0..=65535)")]
    InvalidRange { address: u32, count: u32 },
    #[error("Invalid capacity: max_read_size must be at least 1")]
    InvalidCapacity,
    #[error("Range at address {address} spans {count} registers, more than max_read_size {max_read_size}")]
    OversizedRange {
        address: u16,
        count: u16,
        max_read_size: u16,
    },
}

/// A contiguous block of registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct AddressRange {
    address: u16,
    count: u16,
}

impl AddressRange {
    /// Create a range of `count` registers starting at `address`.
    ///
    /// Fails with [`PlanError::InvalidRange`] for an empty range or one that
    /// runs past the last addressable register.
    pub fn new(address: u16, count: u16) -> Result<Self, PlanError> {
        if count == 0 || address as u32 + count as u32 > ADDRESS_SPACE {
            return Err(PlanError::InvalidRange {
                address: address as u32,
                count: count as u32,
            });
        }
        Ok(Self { address, count })
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn count(&self) -> u16 {
        self.count
    }

    pub fn first_address(&self) -> u16 {
        self.address
    }

    pub fn last_address(&self) -> u16 {
        // Cannot overflow: `new` keeps address + count <= 0x10000.
        (self.end() - 1) as u16
    }

    /// One past the last address, widened so it can hold 0x10000.
    fn end(&self) -> u32 {
        self.address as u32 + self.count as u32
    }

    /// Whether `other` lies entirely inside this range.
    pub fn contains_range(&self, other: &AddressRange) -> bool {
        other.first_address() >= self.first_address() && other.last_address() <= self.last_address()
    }

    pub fn contains(&self, address: u16) -> bool {
        address >= self.first_address() && address <= self.last_address()
    }

    /// Position of `address` within this range, if it is covered.
    pub fn offset_of(&self, address: u16) -> Option<usize> {
        self.contains(address)
            .then(|| (address - self.address) as usize)
    }

    /// Iterate over every address in the range.
    pub fn addresses(&self) -> impl Iterator<Item = u16> {
        self.first_address()..=self.last_address()
    }
}

impl TryFrom<(u16, u16)> for AddressRange {
    type Error = PlanError;

    fn try_from((address, count): (u16, u16)) -> Result<Self, Self::Error> {
        Self::new(address, count)
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..={} ({})",
            self.first_address(),
            self.last_address(),
            self.count
        )
    }
}

/// Group requested ranges into the fewest reads of at most `max_read_size`
/// registers.
///
/// Output ranges are ascending and pairwise disjoint, and together cover every
/// requested address. With `allow_holes` they may also cover unrequested
/// addresses between two requested blocks.
///
/// When joining two touching or overlapping ranges would exceed
/// `max_read_size`, the read is cut at the current tail and the remaining
/// registers start the next read.
pub fn merge_address_ranges(
    ranges: &[AddressRange],
    allow_holes: bool,
    max_read_size: u16,
) -> Result<Vec<AddressRange>, PlanError> {
    if max_read_size == 0 {
        return Err(PlanError::InvalidCapacity);
    }
    if let Some(oversized) = ranges.iter().find(|r| r.count > max_read_size) {
        return Err(PlanError::OversizedRange {
            address: oversized.address,
            count: oversized.count,
            max_read_size,
        });
    }

    let mut sorted = ranges.to_vec();
    // Larger first on equal start, so a shorter duplicate is seen as covered.
    sorted.sort_by(|a, b| a.address.cmp(&b.address).then(b.count.cmp(&a.count)));

    let mut reads = Vec::new();
    let mut current: Option<AddressRange> = None;

    for range in sorted {
        let next = match current {
            None => range,
            // Everything below `cur` is covered by earlier reads, so only the
            // tail decides. After a split `range` may start before `cur`.
            Some(cur) if range.end() <= cur.end() => continue,
            Some(cur) => {
                let extension = range.end() - cur.end();
                let fits = cur.count as u32 + extension <= max_read_size as u32;
                let touching = range.address as u32 <= cur.end();

                if fits && (touching || allow_holes) {
                    AddressRange {
                        address: cur.address,
                        count: (cur.count as u32 + extension) as u16,
                    }
                } else if touching {
                    reads.push(cur);
                    AddressRange {
                        address: cur.end() as u16,
                        count: extension as u16,
                    }
                } else {
                    reads.push(cur);
                    range
                }
            }
        };
        current = Some(next);
    }

    reads.extend(current);
    Ok(reads)
}
