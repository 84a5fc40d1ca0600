// Copyright (c) 2025 - Cowboy AI, Inc.
//! CIDR Block Arithmetic
//!
//! Carving non-overlapping blocks out of a parent address space, and cutting
//! excluded ranges out of a block.
//!
//! # Allocation
//!
//! ```text
//! parent 10.0.0.0/16, exclusions {10.0.0.0/24, 10.0.2.0/24}, prefix /24
//!
//!   10.0.0.0/24  excluded
//!   10.0.1.0/24  → yielded
//!   10.0.2.0/24  excluded
//!   10.0.3.0/24  → yielded
//!   ...
//! ```
//!
//! The allocator keeps no record of what it handed out. Two callers working
//! from the same snapshot of existing blocks are given the same answer.

pub mod allocator;
pub mod exclusion;

pub use allocator::{allocate, candidates, Candidates};
pub use exclusion::{exclude, exclude_all, non_routable_ranges, public_fragments};
