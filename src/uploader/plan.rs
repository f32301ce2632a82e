//! Deterministic split of a file into multipart parts.
//!
//! The plan depends only on the file size and the requested part size, so a
//! resumed session recomputes exactly the boundaries of the interrupted one.

use crate::models::multipart::MAX_PART_NUMBER;
use std::ops::Range;

pub const MIB: u64 = 1024 * 1024;
/// Smallest size S3 accepts for any part but the last.
pub const MIN_PART_SIZE: u64 = 5 * MIB;
pub const DEFAULT_PART_SIZE: u64 = 10 * MIB;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartSpec {
    pub part_number: i32,
    pub offset: u64,
    pub len: u64,
}

impl PartSpec {
    pub fn range(&self) -> Range<u64> {
        self.offset..self.offset + self.len
    }
}

/// Grow `requested` in whole MiB steps until `total` fits in the part limit.
pub fn effective_part_size(total: u64, requested: u64) -> u64 {
    let requested = requested.max(1);
    let max_parts = MAX_PART_NUMBER as u64;
    if total.div_ceil(requested) <= max_parts {
        return requested;
    }
    total.div_ceil(max_parts).div_ceil(MIB) * MIB
}

/// Parts 1..=N covering `0..total`; only the last part may be shorter.
/// An empty file is a single empty part.
pub fn plan_parts(total: u64, part_size: u64) -> Vec<PartSpec> {
    let part_size = effective_part_size(total, part_size);
    if total == 0 {
        return vec![PartSpec {
            part_number: 1,
            offset: 0,
            len: 0,
        }];
    }

    (0..total.div_ceil(part_size))
        .map(|idx| {
            let offset = idx * part_size;
            PartSpec {
                part_number: idx as i32 + 1,
                offset,
                len: part_size.min(total - offset),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_hundred_fifty_mib_in_ten_mib_parts() {
        let parts = plan_parts(250 * MIB, DEFAULT_PART_SIZE);
        assert_eq!(parts.len(), 25);
        assert!(parts.iter().all(|p| p.len == DEFAULT_PART_SIZE));
        assert_eq!(parts[24].range().end, 250 * MIB);
    }

    #[test]
    fn last_part_carries_the_remainder() {
        let parts = plan_parts(25, 10);
        let lens: Vec<u64> = parts.iter().map(|p| p.len).collect();
        assert_eq!(lens, vec![10, 10, 5]);
        let numbers: Vec<i32> = parts.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(parts[2].range(), 20..25);
    }

    #[test]
    fn empty_file_is_one_empty_part() {
        assert_eq!(
            plan_parts(0, DEFAULT_PART_SIZE),
            vec![PartSpec {
                part_number: 1,
                offset: 0,
                len: 0
            }]
        );
    }

    #[test]
    fn plans_are_deterministic() {
        assert_eq!(plan_parts(123_456_789, 7 * MIB), plan_parts(123_456_789, 7 * MIB));
    }

    #[test]
    fn part_size_grows_to_respect_the_part_limit() {
        let total = 200_000 * MIB;
        let size = effective_part_size(total, DEFAULT_PART_SIZE);
        assert_eq!(size, 20 * MIB);
        assert!(plan_parts(total, DEFAULT_PART_SIZE).len() <= MAX_PART_NUMBER as usize);
    }
}
