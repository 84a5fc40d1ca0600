// Copyright (c) 2025 - Cowboy AI, Inc.
//! Recursive block exclusion and the public address space

use std::net::Ipv4Addr;

use crate::domain::CidrBlock;

/// Private and loopback ranges that are never reachable from the internet
const NON_ROUTABLE: [(Ipv4Addr, u8); 4] = [
    (Ipv4Addr::new(10, 0, 0, 0), 8),
    (Ipv4Addr::new(172, 16, 0, 0), 12),
    (Ipv4Addr::new(192, 168, 0, 0), 16),
    (Ipv4Addr::new(127, 0, 0, 0), 8),
];

/// `10.0.0.0/8`, `172.16.0.0/12`, `192.168.0.0/16` and `127.0.0.0/8`
pub fn non_routable_ranges() -> Vec<CidrBlock> {
    NON_ROUTABLE
        .iter()
        .filter_map(|(addr, prefix_len)| CidrBlock::from_parts(*addr, *prefix_len).ok())
        .collect()
}

/// Fragments of `block` not covered by `excluded`, in address order
///
/// Splits `block` in half around the excluded sub-block until every piece is
/// either disjoint from it or swallowed by it.
pub fn exclude(block: CidrBlock, excluded: &CidrBlock) -> Vec<CidrBlock> {
    if !block.overlaps(excluded) {
        return vec![block];
    }
    if excluded.contains(&block) {
        return Vec::new();
    }

    match block.halves() {
        Some((lower, upper)) => {
            let mut fragments = exclude(lower, excluded);
            fragments.extend(exclude(upper, excluded));
            fragments
        }
        None => Vec::new(),
    }
}

/// Fragments of `block` not covered by any of `excluded`
pub fn exclude_all(block: CidrBlock, excluded: &[CidrBlock]) -> Vec<CidrBlock> {
    excluded.iter().fold(vec![block], |fragments, excluded| {
        fragments
            .into_iter()
            .flat_map(|fragment| exclude(fragment, excluded))
            .collect()
    })
}

/// Externally routable address space: `0.0.0.0/0` minus [`non_routable_ranges`]
pub fn public_fragments() -> Vec<CidrBlock> {
    exclude_all(CidrBlock::any(), &non_routable_ranges())
}
