// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Errors reported by [`Octree`](crate::Octree) operations.

/// Contract violations reported by the octree.
///
/// Both kinds are deterministic functions of their inputs; retrying the same
/// call yields the same error. The tree is never modified by a failing call.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, thiserror::Error)]
pub enum OctreeError {
    /// The requested dimension is not a strictly positive power of two.
    #[error("octree dimension must be a positive power of two, got {0}")]
    InvalidDimension(i32),
    /// A coordinate lies outside `[0, dimension)` on at least one axis.
    #[error("coordinate ({x}, {y}, {z}) is outside the octree of dimension {dimension}")]
    IndexOutOfBounds {
        /// Requested x coordinate.
        x: i32,
        /// Requested y coordinate.
        y: i32,
        /// Requested z coordinate.
        z: i32,
        /// Side length of the tree that rejected the coordinate.
        dimension: u32,
    },
}
