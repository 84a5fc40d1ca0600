// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for CIDR Allocation
//!
//! Whatever the parent, the exclusions and the requested shape, allocated
//! blocks sit inside the parent, avoid every exclusion and each other, and
//! come out in address order.

use std::net::Ipv4Addr;

use cim_topology::cidr::{allocate, candidates};
use cim_topology::domain::CidrBlock;
use cim_topology::TopologyError;
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

/// Parent blocks from /8 to /24 anywhere in the address space
fn parent_block() -> impl Strategy<Value = CidrBlock> {
    (any::<u32>(), 8u8..=24).prop_map(|(addr, len)| {
        CidrBlock::from_parts(Ipv4Addr::from(addr), len).expect("valid prefix length")
    })
}

/// Up to eight blocks somewhere inside `parent`, possibly overlapping each other
fn exclusions_in(parent: CidrBlock) -> impl Strategy<Value = Vec<CidrBlock>> {
    let span = parent.size();
    let first = parent.first();
    prop::collection::vec(
        (0..span, parent.prefix_len()..=32u8),
        0..8,
    )
    .prop_map(move |raw| {
        raw.into_iter()
            .map(|(offset, len)| {
                CidrBlock::from_parts(Ipv4Addr::from(first + offset as u32), len)
                    .expect("valid prefix length")
            })
            .collect()
    })
}

fn scenario() -> impl Strategy<Value = (CidrBlock, Vec<CidrBlock>, u8, usize)> {
    parent_block().prop_flat_map(|parent| {
        let max_len = (parent.prefix_len() + 8).min(32);
        (
            Just(parent),
            exclusions_in(parent),
            parent.prefix_len()..=max_len,
            1usize..6,
        )
    })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Every allocated block is inside the parent, has the requested length
    /// and overlaps no exclusion
    #[test]
    fn prop_allocations_avoid_exclusions(
        (parent, exclusions, prefix_len, count) in scenario()
    ) {
        match allocate(&parent, &exclusions, prefix_len, count) {
            Ok(blocks) => {
                prop_assert_eq!(blocks.len(), count);
                for block in &blocks {
                    prop_assert!(parent.contains(block));
                    prop_assert_eq!(block.prefix_len(), prefix_len);
                    prop_assert!(exclusions.iter().all(|e| !e.overlaps(block)));
                }
            }
            Err(TopologyError::NotEnoughAddressSpace { requested, available, .. }) => {
                prop_assert_eq!(requested, count);
                prop_assert!(available < count);
            }
            Err(other) => prop_assert!(false, "unexpected error: {}", other),
        }
    }

    /// Allocated blocks are pairwise disjoint and strictly increasing
    #[test]
    fn prop_allocations_are_ordered_and_disjoint(
        (parent, exclusions, prefix_len, count) in scenario()
    ) {
        if let Ok(blocks) = allocate(&parent, &exclusions, prefix_len, count) {
            for pair in blocks.windows(2) {
                prop_assert!(pair[0].last() < pair[1].first());
            }
        }
    }

    /// Allocation takes the first free blocks: every skipped block of the
    /// partition below the last allocated one is excluded
    #[test]
    fn prop_allocation_is_first_fit(
        (parent, exclusions, prefix_len, count) in scenario()
    ) {
        if let Ok(blocks) = allocate(&parent, &exclusions, prefix_len, count) {
            let last = blocks[blocks.len() - 1];
            let size = 1u64 << (32 - u32::from(prefix_len));
            let mut start = u64::from(parent.first());
            while start < u64::from(last.first()) {
                let block = CidrBlock::from_parts(Ipv4Addr::from(start as u32), prefix_len)
                    .expect("valid prefix length");
                prop_assert!(
                    blocks.contains(&block) || exclusions.iter().any(|e| e.overlaps(&block))
                );
                start += size;
            }
        }
    }

    /// Feeding allocations back as exclusions never hands them out again
    #[test]
    fn prop_repeated_allocation_never_reuses_blocks(
        (parent, exclusions, prefix_len, _count) in scenario()
    ) {
        let mut taken = exclusions.clone();
        let mut handed_out: Vec<CidrBlock> = Vec::new();
        for _ in 0..4 {
            match allocate(&parent, &taken, prefix_len, 1) {
                Ok(blocks) => {
                    prop_assert!(!handed_out.contains(&blocks[0]));
                    handed_out.push(blocks[0]);
                    taken.push(blocks[0]);
                }
                Err(_) => break,
            }
        }
    }

    /// Candidates and allocate agree on the free blocks
    #[test]
    fn prop_candidates_prefix_allocate(
        (parent, exclusions, prefix_len, count) in scenario()
    ) {
        let listed: Vec<CidrBlock> = candidates(&parent, &exclusions, prefix_len)
            .expect("valid prefix length")
            .take(count)
            .collect();
        match allocate(&parent, &exclusions, prefix_len, count) {
            Ok(blocks) => prop_assert_eq!(blocks, listed),
            Err(_) => prop_assert!(listed.len() < count),
        }
    }
}
