// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Block Exclusion
//!
//! Exclusion partitions a block: every address of the block lands in exactly
//! one fragment or in an excluded range, never both.

use std::net::Ipv4Addr;

use cim_topology::cidr::{exclude_all, non_routable_ranges, public_fragments};
use cim_topology::domain::CidrBlock;
use proptest::prelude::*;

fn block(addr: u32, len: u8) -> CidrBlock {
    CidrBlock::from_parts(Ipv4Addr::from(addr), len).expect("valid prefix length")
}

fn host(addr: u32) -> CidrBlock {
    block(addr, 32)
}

fn arbitrary_block(min_len: u8) -> impl Strategy<Value = CidrBlock> {
    (any::<u32>(), min_len..=32u8).prop_map(|(addr, len)| block(addr, len))
}

proptest! {
    /// Fragments and exclusions cover the block exactly once
    #[test]
    fn prop_fragments_partition_the_block(
        base in arbitrary_block(8),
        excluded in prop::collection::vec(arbitrary_block(8), 0..4),
        samples in prop::collection::vec(any::<u32>(), 32),
    ) {
        let fragments = exclude_all(base, &excluded);

        for sample in samples {
            let address = host(base.first() + sample % (base.size() as u32).max(1));
            let in_fragments = fragments.iter().filter(|f| f.contains(&address)).count();
            let in_excluded = excluded.iter().any(|e| e.contains(&address));

            prop_assert!(in_fragments <= 1);
            prop_assert_eq!(in_fragments == 1, !in_excluded);
        }
    }

    /// Fragments stay inside the block, in address order
    #[test]
    fn prop_fragments_are_ordered_and_contained(
        base in arbitrary_block(4),
        excluded in prop::collection::vec(arbitrary_block(4), 0..4),
    ) {
        let fragments = exclude_all(base, &excluded);

        for fragment in &fragments {
            prop_assert!(base.contains(fragment));
            prop_assert!(excluded.iter().all(|e| !e.overlaps(fragment)));
        }
        for pair in fragments.windows(2) {
            prop_assert!(pair[0].last() < pair[1].first());
        }
    }

    /// An address is public iff no non-routable range holds it
    #[test]
    fn prop_public_fragments_match_routability(addr in any::<u32>()) {
        let address = host(addr);
        let public = public_fragments().iter().any(|f| f.contains(&address));
        let private = non_routable_ranges().iter().any(|r| r.contains(&address));
        prop_assert_eq!(public, !private);
    }
}
