// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Node identifiers, octant arithmetic, and the public [`Region`] view.
//!
//! Octants are numbered with bit 0 selecting the upper x half, bit 1 the upper
//! z half, and bit 2 the upper y half:
//!
//! ```text
//! bottom layer (y < half)    top layer (y >= half)
//! +---+---+                  +---+---+
//! | 2 | 3 |                  | 6 | 7 |
//! +---+---+                  +---+---+
//! | 0 | 1 |                  | 4 | 5 |
//! +---+---+                  +---+---+
//! ```

/// Number of children of a subdivided node.
pub(crate) const OCTANTS: usize = 8;

/// Index of a node slot in the octree arena.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) struct NodeId(u32);

impl NodeId {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "A tree of depth 30 cannot address more than u32::MAX live nodes in practice."
    )]
    pub(crate) const fn new(idx: usize) -> Self {
        Self(idx as u32)
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }
}

/// Select the child octant of a node with half side `half` containing the
/// local cell `[x, y, z]`, and re-base the cell into that child's frame.
///
/// The vertical axis is tested first. The returned coordinates are each in
/// `[0, half)` whenever the inputs were in `[0, 2 * half)`.
#[inline]
pub(crate) const fn locate(half: u32, cell: [u32; 3]) -> (u8, [u32; 3]) {
    let [mut x, mut y, mut z] = cell;
    let mut octant = 7_u8;
    if y < half {
        octant -= 4;
    } else {
        y -= half;
    }
    if x < half {
        octant -= 1;
    } else {
        x -= half;
    }
    if z < half {
        octant -= 2;
    } else {
        z -= half;
    }
    (octant, [x, y, z])
}

/// Origin of child `octant` of a node at `origin` with half side `half`.
///
/// Inverse of [`locate`] for the child's corner cell.
#[inline]
pub(crate) const fn child_origin(origin: [u32; 3], half: u32, octant: u8) -> [u32; 3] {
    let [mut x, mut y, mut z] = origin;
    if octant & 0b001 != 0 {
        x += half;
    }
    if octant & 0b010 != 0 {
        z += half;
    }
    if octant & 0b100 != 0 {
        y += half;
    }
    [x, y, z]
}

/// A maximal homogeneous block of the tree: one uniform node.
///
/// Produced by [`Octree::regions`](crate::Octree::regions).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Region<'a, T> {
    /// Minimum corner `[x, y, z]` in root coordinates.
    pub origin: [u32; 3],
    /// Edge length of the block, a power of two.
    pub side_length: u32,
    /// Distance from the root (the root is depth 0).
    pub depth: u32,
    /// Index of this node among its parent's children; `0` for the root.
    pub octant: u8,
    /// Value shared by every cell of the block, if any.
    pub value: Option<&'a T>,
}

impl<T> Region<'_, T> {
    /// Number of unit cells covered by this block.
    pub fn volume(&self) -> u64 {
        let side = u64::from(self.side_length);
        side * side * side
    }

    /// Whether the cell `[x, y, z]` (root coordinates) lies inside this block.
    pub fn contains(&self, cell: [u32; 3]) -> bool {
        self.origin
            .iter()
            .zip(cell)
            .all(|(&lo, c)| lo <= c && c - lo < self.side_length)
    }
}
