// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_octree --heading-base-level=0

//! Understory Octree: a sparse, self-merging octree over a cube of cells.
//!
//! Understory Octree stores one optional value per unit cell of a `dimension³` cube,
//! where `dimension` is a power of two.
//!
//! - Equal neighbours collapse into a single uniform node covering the largest aligned
//!   block that holds them, so empty or repeated space costs one node.
//! - A write that makes a block non-uniform splits it into eight octants; a write that
//!   makes eight siblings equal merges them back, transitively up to the root.
//! - Point reads stop at the first uniform node on the path.
//!
//! The value type only needs `Clone + PartialEq` for writes. "No value" is expressed as
//! `None` and participates in merging like any other value.
//!
//! # Example
//!
//! ```rust
//! use understory_octree::{Octree, OctreeError};
//!
//! let mut tree: Octree<u32> = Octree::new(4)?;
//! tree.insert(0, 0, 0, Some(23))?;
//! tree.insert(3, 3, 3, Some(29))?;
//! assert_eq!(tree.get(0, 0, 0)?, Some(&23));
//! assert_eq!(tree.get(1, 2, 1)?, None);
//!
//! // Coordinates are checked against the cube.
//! assert!(matches!(
//!     tree.get(4, 0, 0),
//!     Err(OctreeError::IndexOutOfBounds { .. })
//! ));
//!
//! // Visit every maximal homogeneous block.
//! let mut blocks = 0;
//! tree.for_each(|_depth, _octant, _value| blocks += 1);
//! assert_eq!(blocks, tree.leaf_count());
//! # Ok::<(), OctreeError>(())
//! ```
//!
//! ## Octant numbering
//!
//! Children are numbered with bit 0 for the upper x half, bit 1 for the upper z half,
//! and bit 2 for the upper y half: octants 0–3 form the bottom layer and 4–7 the top.
//! [`Region::origin`] reports where each block sits in root coordinates.
//!
//! ## Features
//!
//! - `tracing`: emit `tracing` events when nodes split or merge.
//!
//! This crate is `no_std` and uses `alloc`. It is not synchronized; callers sharing a
//! tree between threads must serialize access.

#![no_std]

extern crate alloc;

mod error;
mod tree;
mod types;

pub use error::OctreeError;
pub use tree::{Octree, Regions};
pub use types::Region;
