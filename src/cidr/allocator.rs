// Copyright (c) 2025 - Cowboy AI, Inc.
//! Exclusion-aware CIDR candidate generation
//!
//! Partitions a parent block into every block of the target prefix length in
//! increasing address order and yields the ones that overlap no exclusion.
//! Runs of excluded space are skipped in one step instead of being visited
//! candidate by candidate.

use std::net::Ipv4Addr;

use crate::domain::invariants::validate_prefix_len;
use crate::domain::CidrBlock;
use crate::errors::{TopologyError, TopologyResult};

/// Lazy, finite sequence of free blocks inside a parent
///
/// Cloning restarts nothing: a clone continues from the same position. Call
/// [`candidates`] again for a fresh sequence.
#[derive(Debug, Clone)]
pub struct Candidates {
    exclusions: Vec<CidrBlock>,
    prefix_len: u8,
    /// Start address of the next candidate
    cursor: u64,
    /// One past the parent's last address
    end: u64,
}

impl Candidates {
    fn block_size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix_len))
    }

    /// Last address of the furthest exclusion overlapping `[start, last]`
    fn furthest_overlap(&self, start: u64, last: u64) -> Option<u64> {
        self.exclusions
            .iter()
            .filter(|e| u64::from(e.first()) <= last && start <= u64::from(e.last()))
            .map(|e| u64::from(e.last()))
            .max()
    }
}

impl Iterator for Candidates {
    type Item = CidrBlock;

    fn next(&mut self) -> Option<Self::Item> {
        let block_size = self.block_size();

        while self.cursor + block_size <= self.end {
            let start = self.cursor;
            let last = start + block_size - 1;

            match self.furthest_overlap(start, last) {
                Some(excluded_last) => {
                    self.cursor = align_up(excluded_last + 1, block_size).max(start + block_size);
                }
                None => {
                    self.cursor = start + block_size;
                    return CidrBlock::from_parts(Ipv4Addr::from(start as u32), self.prefix_len)
                        .ok();
                }
            }
        }

        None
    }
}

/// Round `addr` up to the next multiple of `block_size`
fn align_up(addr: u64, block_size: u64) -> u64 {
    addr.div_ceil(block_size) * block_size
}

/// Free `/prefix_len` blocks of `parent`, in address order
///
/// Exclusions outside the parent are ignored.
///
/// # Errors
/// - `DisallowedOperation` if `prefix_len` is shorter than the parent's or longer than 32
///
/// # Examples
///
/// ```rust
/// use cim_topology::cidr::candidates;
/// use cim_topology::domain::CidrBlock;
///
/// let parent = CidrBlock::new("10.0.0.0/8").unwrap();
/// let taken = vec![
///     CidrBlock::new("10.0.0.0/9").unwrap(),
///     CidrBlock::new("10.128.0.0/10").unwrap(),
/// ];
/// let free: Vec<String> = candidates(&parent, &taken, 10)
///     .unwrap()
///     .map(|b| b.to_string())
///     .collect();
/// assert_eq!(free, vec!["10.192.0.0/10"]);
/// ```
pub fn candidates(
    parent: &CidrBlock,
    exclusions: &[CidrBlock],
    prefix_len: u8,
) -> TopologyResult<Candidates> {
    validate_prefix_len(parent, prefix_len)?;

    let exclusions = exclusions
        .iter()
        .filter(|e| e.overlaps(parent))
        .copied()
        .collect();

    Ok(Candidates {
        exclusions,
        prefix_len,
        cursor: u64::from(parent.first()),
        end: u64::from(parent.last()) + 1,
    })
}

/// Take the first `count` free blocks of `parent`
///
/// Not atomic: two callers working from the same exclusion snapshot receive
/// the same blocks. Callers must serialise allocations against one parent.
///
/// # Errors
/// - `NotEnoughAddressSpace` if fewer than `count` blocks are free
/// - `DisallowedOperation` for an invalid prefix length
pub fn allocate(
    parent: &CidrBlock,
    exclusions: &[CidrBlock],
    prefix_len: u8,
    count: usize,
) -> TopologyResult<Vec<CidrBlock>> {
    let blocks: Vec<CidrBlock> = candidates(parent, exclusions, prefix_len)?
        .take(count)
        .collect();

    if blocks.len() < count {
        return Err(TopologyError::NotEnoughAddressSpace {
            parent: parent.to_string(),
            prefix_len,
            requested: count,
            available: blocks.len(),
        });
    }

    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn block(s: &str) -> CidrBlock {
        CidrBlock::new(s).unwrap()
    }

    fn strings(blocks: impl IntoIterator<Item = CidrBlock>) -> Vec<String> {
        blocks.into_iter().map(|b| b.to_string()).collect()
    }

    #[test]
    fn test_partition_without_exclusions() {
        let free = candidates(&block("10.0.0.0/22"), &[], 24).unwrap();
        assert_eq!(
            strings(free),
            vec!["10.0.0.0/24", "10.0.1.0/24", "10.0.2.0/24", "10.0.3.0/24"]
        );
    }

    #[test]
    fn test_skips_excluded_runs() {
        let parent = block("10.0.0.0/8");
        let taken = vec![block("10.0.0.0/9"), block("10.128.0.0/10")];
        assert_eq!(
            strings(candidates(&parent, &taken, 10).unwrap()),
            vec!["10.192.0.0/10"]
        );
    }

    #[test]
    fn test_smaller_exclusion_blocks_whole_candidate() {
        let parent = block("10.0.0.0/16");
        let taken = vec![block("10.0.0.128/25"), block("10.0.2.7/32")];
        let first: Vec<CidrBlock> = candidates(&parent, &taken, 24).unwrap().take(3).collect();
        assert_eq!(
            strings(first),
            vec!["10.0.1.0/24", "10.0.3.0/24", "10.0.4.0/24"]
        );
    }

    #[test]
    fn test_exclusions_outside_parent_are_ignored() {
        let parent = block("10.0.0.0/23");
        let taken = vec![block("192.168.0.0/16")];
        assert_eq!(candidates(&parent, &taken, 24).unwrap().count(), 2);
    }

    #[test]
    fn test_prefix_equal_to_parent() {
        let parent = block("10.0.0.0/16");
        assert_eq!(
            strings(candidates(&parent, &[], 16).unwrap()),
            vec!["10.0.0.0/16"]
        );
        assert_eq!(candidates(&parent, &[parent], 16).unwrap().count(), 0);
    }

    #[test]
    fn test_full_address_space_top_end() {
        let parent = CidrBlock::any();
        let taken = vec![block("0.0.0.0/1")];
        assert_eq!(
            strings(candidates(&parent, &taken, 1).unwrap()),
            vec!["128.0.0.0/1"]
        );
        let last = candidates(&block("255.255.255.0/24"), &[], 32).unwrap().last();
        assert_eq!(last, Some(block("255.255.255.255/32")));
    }

    #[test]
    fn test_sequence_is_restartable() {
        let parent = block("10.0.0.0/16");
        let taken = vec![block("10.0.0.0/24")];
        let first = allocate(&parent, &taken, 24, 2).unwrap();
        let again = allocate(&parent, &taken, 24, 2).unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn test_invalid_prefix_length() {
        let parent = block("10.0.0.0/16");
        assert!(matches!(
            candidates(&parent, &[], 8),
            Err(TopologyError::DisallowedOperation(_))
        ));
        assert!(matches!(
            candidates(&parent, &[], 33),
            Err(TopologyError::DisallowedOperation(_))
        ));
    }

    #[test]
    fn test_allocate_reports_exhaustion() {
        let parent = block("10.0.0.0/23");
        let taken = vec![block("10.0.0.0/24")];
        match allocate(&parent, &taken, 24, 2) {
            Err(TopologyError::NotEnoughAddressSpace {
                requested,
                available,
                prefix_len,
                ..
            }) => {
                assert_eq!(requested, 2);
                assert_eq!(available, 1);
                assert_eq!(prefix_len, 24);
            }
            other => panic!("expected NotEnoughAddressSpace, got {:?}", other),
        }
    }

    #[test]
    fn test_allocate_zero_blocks() {
        let parent = block("10.0.0.0/24");
        assert!(allocate(&parent, &[parent], 24, 0).unwrap().is_empty());
    }
}
