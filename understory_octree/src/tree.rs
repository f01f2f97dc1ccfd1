// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core octree implementation: arena, split/merge, point access, traversal.

use alloc::vec::Vec;
use core::fmt;

use smallvec::SmallVec;

use crate::error::OctreeError;
use crate::types::{NodeId, OCTANTS, Region, child_origin, locate};

#[derive(Clone, Debug)]
enum NodeState<T> {
    /// One value (or none) for the whole cube.
    Uniform(Option<T>),
    /// Exactly eight children, indexed by octant.
    Subdivided([NodeId; OCTANTS]),
}

#[derive(Clone, Debug)]
struct Node<T> {
    parent: Option<NodeId>,
    side_length: u32,
    depth: u32,
    octant: u8,
    state: NodeState<T>,
}

impl<T> Node<T> {
    const fn root(side_length: u32) -> Self {
        Self {
            parent: None,
            side_length,
            depth: 0,
            octant: 0,
            state: NodeState::Uniform(None),
        }
    }

    const fn half_side(&self) -> u32 {
        self.side_length / 2
    }
}

/// A cube of `dimension³` cells that stores one optional value per cell.
///
/// Runs of equal values collapse into a single uniform node covering the
/// largest aligned power-of-two block that holds them, and a block is split
/// back into eight octants as soon as a write makes it non-uniform. Large
/// empty or repeated regions therefore cost a single node.
///
/// Nodes live in an arena and refer to their parent and children by index;
/// freed slots are recycled by later splits.
///
/// The tree is not synchronized. Callers that share a tree across threads must
/// serialize access themselves.
///
/// ## Example
///
/// ```rust
/// use understory_octree::Octree;
///
/// let mut tree = Octree::new(2).unwrap();
/// for x in 0..2 {
///     for y in 0..2 {
///         for z in 0..2 {
///             tree.insert(x, y, z, Some('a')).unwrap();
///         }
///     }
/// }
/// // Eight equal cells merge into one uniform root.
/// assert!(tree.is_uniform());
///
/// tree.insert(1, 0, 0, Some('b')).unwrap();
/// assert_eq!(tree.get(1, 0, 0), Ok(Some(&'b')));
/// assert_eq!(tree.leaf_count(), 8);
/// ```
#[derive(Clone)]
pub struct Octree<T> {
    /// slots
    nodes: Vec<Option<Node<T>>>,
    free_list: Vec<usize>,
    root: NodeId,
    dimension: u32,
}

impl<T> fmt::Debug for Octree<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.nodes.len();
        let alive = self.nodes.iter().filter(|n| n.is_some()).count();
        let free = self.free_list.len();
        f.debug_struct("Octree")
            .field("dimension", &self.dimension)
            .field("nodes_total", &total)
            .field("nodes_alive", &alive)
            .field("free_list", &free)
            .finish_non_exhaustive()
    }
}

impl<T> Octree<T> {
    /// Create an empty tree covering `dimension³` cells.
    ///
    /// Every cell starts out without a value. Fails with
    /// [`OctreeError::InvalidDimension`] unless `dimension` is a strictly
    /// positive power of two.
    pub fn new(dimension: i32) -> Result<Self, OctreeError> {
        let side_length = u32::try_from(dimension)
            .ok()
            .filter(|d| d.is_power_of_two())
            .ok_or(OctreeError::InvalidDimension(dimension))?;
        let mut tree = Self {
            nodes: Vec::new(),
            free_list: Vec::new(),
            root: NodeId::new(0),
            dimension: side_length,
        };
        tree.root = tree.alloc(Node::root(side_length));
        #[cfg(feature = "tracing")]
        tracing::debug!(dimension = side_length, "created octree");
        Ok(tree)
    }

    /// Edge length of the cube, as passed to [`Octree::new`].
    pub fn dimension(&self) -> u32 {
        self.dimension
    }

    /// Whether the whole cube holds a single value (the root is undivided).
    pub fn is_uniform(&self) -> bool {
        matches!(self.node(self.root).state, NodeState::Uniform(_))
    }

    /// Return the value stored at cell `(x, y, z)`.
    ///
    /// Resolves in constant time once the descent reaches a uniform node.
    pub fn get(&self, x: i32, y: i32, z: i32) -> Result<Option<&T>, OctreeError> {
        let mut cell = self.check_bounds(x, y, z)?;
        let mut id = self.root;
        loop {
            let node = self.node(id);
            match &node.state {
                NodeState::Uniform(value) => return Ok(value.as_ref()),
                NodeState::Subdivided(children) => {
                    let (octant, local) = locate(node.half_side(), cell);
                    id = children[usize::from(octant)];
                    cell = local;
                }
            }
        }
    }

    /// Call `visitor(depth, octant, value)` once for every uniform node.
    ///
    /// Nodes are visited depth first with children in ascending octant order.
    /// The root reports depth `0` and octant `0`.
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(u32, u8, Option<&T>),
    {
        for region in self.regions() {
            visitor(region.depth, region.octant, region.value);
        }
    }

    /// Iterate over every uniform node as a [`Region`], in [`Octree::for_each`] order.
    ///
    /// The regions tile the cube exactly: every cell belongs to one region.
    pub fn regions(&self) -> Regions<'_, T> {
        let mut stack = SmallVec::new();
        stack.push((self.root, [0, 0, 0]));
        Regions { tree: self, stack }
    }

    /// Number of uniform nodes, i.e. maximal homogeneous blocks.
    pub fn leaf_count(&self) -> usize {
        self.regions().count()
    }

    /// Number of live nodes, uniform and subdivided.
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free_list.len()
    }

    /// Depth of the deepest uniform node; `0` for an undivided tree.
    pub fn max_depth(&self) -> u32 {
        self.regions().map(|r| r.depth).max().unwrap_or(0)
    }

    /// Drop every value and collapse the tree back to a single empty root.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free_list.clear();
        self.root = self.alloc(Node::root(self.dimension));
        #[cfg(feature = "tracing")]
        tracing::debug!(dimension = self.dimension, "cleared octree");
    }

    fn check_bounds(&self, x: i32, y: i32, z: i32) -> Result<[u32; 3], OctreeError> {
        let local = |c: i32| u32::try_from(c).ok().filter(|&c| c < self.dimension);
        match (local(x), local(y), local(z)) {
            (Some(x), Some(y), Some(z)) => Ok([x, y, z]),
            _ => Err(OctreeError::IndexOutOfBounds {
                x,
                y,
                z,
                dimension: self.dimension,
            }),
        }
    }

    fn alloc(&mut self, node: Node<T>) -> NodeId {
        if let Some(idx) = self.free_list.pop() {
            self.nodes[idx] = Some(node);
            NodeId::new(idx)
        } else {
            self.nodes.push(Some(node));
            NodeId::new(self.nodes.len() - 1)
        }
    }

    /// Release `id` and all of its descendants.
    fn free_subtree(&mut self, id: NodeId) {
        let node = self.nodes[id.idx()]
            .take()
            .expect("octree invariant violated: freeing a vacant slot");
        if let NodeState::Subdivided(children) = node.state {
            for child in children {
                self.free_subtree(child);
            }
        }
        self.free_list.push(id.idx());
    }

    fn node(&self, id: NodeId) -> &Node<T> {
        self.nodes[id.idx()]
            .as_ref()
            .expect("octree invariant violated: dangling NodeId")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node<T> {
        self.nodes[id.idx()]
            .as_mut()
            .expect("octree invariant violated: dangling NodeId")
    }
}

impl<T: Clone + PartialEq> Octree<T> {
    /// Write `value` at cell `(x, y, z)`; `None` clears the cell.
    ///
    /// Writing the value a uniform block already holds is a no-op and never
    /// splits. Otherwise blocks on the path are split as needed, and after the
    /// write every ancestor whose eight children became equal is merged, as far
    /// up as homogeneity holds.
    ///
    /// On error the tree is left untouched.
    pub fn insert(&mut self, x: i32, y: i32, z: i32, value: Option<T>) -> Result<(), OctreeError> {
        let mut cell = self.check_bounds(x, y, z)?;
        let mut id = self.root;
        loop {
            let node = self.node(id);
            if node.side_length == 1 {
                break;
            }
            let half = node.half_side();
            let children = match &node.state {
                NodeState::Subdivided(children) => Some(*children),
                NodeState::Uniform(current) if *current == value => return Ok(()),
                NodeState::Uniform(_) => None,
            };
            let children = children.unwrap_or_else(|| self.split(id));
            let (octant, local) = locate(half, cell);
            id = children[usize::from(octant)];
            cell = local;
        }
        self.node_mut(id).state = NodeState::Uniform(value);
        self.merge_upward(id);
        Ok(())
    }

    /// Replace uniform node `id` with eight children seeded with its value.
    fn split(&mut self, id: NodeId) -> [NodeId; OCTANTS] {
        let node = self.node_mut(id);
        debug_assert!(node.side_length > 1, "unit cells never subdivide");
        let value = match core::mem::replace(&mut node.state, NodeState::Uniform(None)) {
            NodeState::Uniform(value) => value,
            NodeState::Subdivided(_) => {
                unreachable!("octree invariant violated: splitting a subdivided node")
            }
        };
        let side_length = node.half_side();
        let depth = node.depth + 1;

        let mut children = [id; OCTANTS];
        for (octant, slot) in (0_u8..).zip(children.iter_mut()) {
            *slot = self.alloc(Node {
                parent: Some(id),
                side_length,
                depth,
                octant,
                state: NodeState::Uniform(value.clone()),
            });
        }
        self.node_mut(id).state = NodeState::Subdivided(children);
        #[cfg(feature = "tracing")]
        tracing::trace!(node = id.idx(), depth = depth - 1, side_length, "split octree node");
        children
    }

    /// Merge ancestors of `id` bottom-up while their subtrees are homogeneous.
    fn merge_upward(&mut self, id: NodeId) {
        let mut next = self.node(id).parent;
        while let Some(parent) = next {
            let Some(value) = self.resolve(parent).cloned() else {
                break;
            };
            self.merge(parent, value);
            next = self.node(parent).parent;
        }
    }

    /// Collapse `id` into a uniform node holding `value`, freeing its subtree.
    fn merge(&mut self, id: NodeId, value: Option<T>) {
        let state = core::mem::replace(&mut self.node_mut(id).state, NodeState::Uniform(value));
        if let NodeState::Subdivided(children) = state {
            for child in children {
                self.free_subtree(child);
            }
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(
            node = id.idx(),
            depth = self.node(id).depth,
            "merged octree node"
        );
    }

    /// The single value held by every cell under `id`, if there is one.
    ///
    /// Subdivided children are resolved recursively before comparing, so two
    /// homogeneous subtrees compare equal regardless of how deep they are.
    fn resolve(&self, id: NodeId) -> Option<&Option<T>> {
        match &self.node(id).state {
            NodeState::Uniform(value) => Some(value),
            NodeState::Subdivided(children) => {
                let (first, rest) = children.split_first()?;
                let value = self.resolve(*first)?;
                rest.iter()
                    .all(|&child| self.resolve(child) == Some(value))
                    .then_some(value)
            }
        }
    }
}

impl<T: fmt::Display> Octree<T> {
    fn write_node(&self, f: &mut fmt::Formatter<'_>, id: NodeId) -> fmt::Result {
        let node = self.node(id);
        let indent = 2 * node.depth as usize;
        match &node.state {
            NodeState::Subdivided(children) => {
                writeln!(f, "{:indent$}octant {}:", "", node.octant)?;
                for &child in children {
                    self.write_node(f, child)?;
                }
                Ok(())
            }
            NodeState::Uniform(Some(value)) => {
                writeln!(f, "{:indent$}octant {}: {}", "", node.octant, value)
            }
            NodeState::Uniform(None) => Ok(()),
        }
    }
}

/// Indented outline of the tree, one line per node.
///
/// Subdivided nodes print as `octant N:` headers, uniform nodes as
/// `octant N: value`. Uniform nodes without a value are omitted.
impl<T: fmt::Display> fmt::Display for Octree<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_node(f, self.root)
    }
}

/// Iterator over the uniform nodes of an [`Octree`].
///
/// Created by [`Octree::regions`].
pub struct Regions<'a, T> {
    tree: &'a Octree<T>,
    // Pending nodes with their origin in root coordinates.
    stack: SmallVec<[(NodeId, [u32; 3]); 32]>,
}

impl<T> fmt::Debug for Regions<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Regions")
            .field("pending", &self.stack.len())
            .finish_non_exhaustive()
    }
}

impl<'a, T> Iterator for Regions<'a, T> {
    type Item = Region<'a, T>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((id, origin)) = self.stack.pop() {
            let node = self.tree.node(id);
            match &node.state {
                NodeState::Uniform(value) => {
                    return Some(Region {
                        origin,
                        side_length: node.side_length,
                        depth: node.depth,
                        octant: node.octant,
                        value: value.as_ref(),
                    });
                }
                NodeState::Subdivided(children) => {
                    let half = node.half_side();
                    // Reversed so that octant 0 is popped first.
                    for &child in children.iter().rev() {
                        let octant = self.tree.node(child).octant;
                        self.stack.push((child, child_origin(origin, half, octant)));
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec;
    use alloc::vec::Vec;

    fn fill<T: Clone + PartialEq>(tree: &mut Octree<T>, value: Option<T>) {
        let d = i32::try_from(tree.dimension()).unwrap();
        for x in 0..d {
            for y in 0..d {
                for z in 0..d {
                    tree.insert(x, y, z, value.clone()).unwrap();
                }
            }
        }
    }

    fn visits<T: Clone>(tree: &Octree<T>) -> Vec<(u32, u8, Option<T>)> {
        let mut out = Vec::new();
        tree.for_each(|depth, octant, value| out.push((depth, octant, value.cloned())));
        out
    }

    #[test]
    fn dimension_must_be_positive_power_of_two() {
        for bad in [0, -1, -8, 3, 6, 100, i32::MAX] {
            assert_eq!(
                Octree::<u8>::new(bad).unwrap_err(),
                OctreeError::InvalidDimension(bad)
            );
        }
        for good in [1, 2, 4, 8, 16, 1 << 20, 1 << 30] {
            let tree = Octree::<u8>::new(good).unwrap();
            assert_eq!(tree.dimension(), u32::try_from(good).unwrap());
            assert!(tree.is_uniform());
        }
    }

    #[test]
    fn insert_then_get_every_cell() {
        let mut tree = Octree::new(4).unwrap();
        for x in 0..4 {
            for y in 0..4 {
                for z in 0..4 {
                    tree.insert(x, y, z, Some(x * 100 + y * 10 + z)).unwrap();
                }
            }
        }
        for x in 0..4 {
            for y in 0..4 {
                for z in 0..4 {
                    assert_eq!(tree.get(x, y, z), Ok(Some(&(x * 100 + y * 10 + z))));
                }
            }
        }
        assert_eq!(tree.leaf_count(), 64);

        // Overwrite twice.
        tree.insert(2, 1, 3, Some(-7)).unwrap();
        tree.insert(2, 1, 3, Some(-9)).unwrap();
        assert_eq!(tree.get(2, 1, 3), Ok(Some(&-9)));
        assert_eq!(tree.get(2, 1, 2), Ok(Some(&212)));
    }

    #[test]
    fn scattered_values_read_back() {
        let mut tree = Octree::new(4).unwrap();
        let cells = [
            ((0, 0, 0), 23),
            ((1, 0, 0), 17),
            ((0, 1, 1), 14),
            ((1, 3, 0), 7),
            ((2, 0, 0), 3),
            ((3, 3, 3), 29),
            ((3, 1, 3), 37),
            ((0, 3, 1), -5),
        ];
        for ((x, y, z), v) in cells {
            tree.insert(x, y, z, Some(v)).unwrap();
        }
        for ((x, y, z), v) in cells {
            assert_eq!(tree.get(x, y, z), Ok(Some(&v)));
        }
        assert_eq!(tree.get(2, 2, 2), Ok(None));
    }

    #[test]
    fn out_of_bounds_is_rejected_without_mutation() {
        let mut tree = Octree::new(4).unwrap();
        for (x, y, z) in [(-1, 0, 0), (4, 0, 0), (0, 0, 4), (0, -3, 0), (0, 4, 0)] {
            assert_eq!(
                tree.get(x, y, z),
                Err(OctreeError::IndexOutOfBounds {
                    x,
                    y,
                    z,
                    dimension: 4
                })
            );
            assert!(tree.insert(x, y, z, Some(1_u8)).is_err());
        }
        assert_eq!(tree.get(3, 3, 3), Ok(None));
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn full_volume_collapses_to_root() {
        let mut tree = Octree::new(4).unwrap();
        fill(&mut tree, Some(17));
        assert_eq!(visits(&tree), vec![(0, 0, Some(17))]);
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.max_depth(), 0);
    }

    #[test]
    fn split_diverge_and_remerge() {
        let mut tree = Octree::new(2).unwrap();
        fill(&mut tree, Some('a'));
        assert_eq!(visits(&tree), vec![(0, 0, Some('a'))]);

        tree.insert(1, 1, 0, Some('b')).unwrap();
        let seen = visits(&tree);
        assert_eq!(seen.len(), 8);
        for (i, (depth, octant, value)) in seen.into_iter().enumerate() {
            assert_eq!(depth, 1);
            assert_eq!(usize::from(octant), i);
            let expected = if octant == 5 { 'b' } else { 'a' };
            assert_eq!(value, Some(expected));
        }

        tree.insert(1, 1, 0, Some('a')).unwrap();
        assert_eq!(visits(&tree), vec![(0, 0, Some('a'))]);
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn writing_the_held_value_never_splits() {
        let mut tree = Octree::new(8).unwrap();
        tree.insert(0, 0, 0, None::<u8>).unwrap();
        assert_eq!(tree.node_count(), 1);

        fill(&mut tree, Some(3));
        tree.insert(5, 0, 0, Some(4)).unwrap();
        let before = visits(&tree);
        let nodes = tree.node_count();
        tree.insert(1, 6, 2, Some(3)).unwrap();
        tree.insert(5, 0, 0, Some(4)).unwrap();
        assert_eq!(visits(&tree), before);
        assert_eq!(tree.node_count(), nodes);
    }

    #[test]
    fn differing_siblings_stay_split() {
        let mut tree = Octree::new(4).unwrap();
        tree.insert(0, 0, 0, Some(1_u8)).unwrap();
        // Octant 0 holds eight unit cells; the other seven root octants stay whole.
        assert_eq!(tree.leaf_count(), 15);
        assert_eq!(tree.max_depth(), 2);

        let regions: Vec<_> = tree.regions().collect();
        assert_eq!(regions[0].origin, [0, 0, 0]);
        assert_eq!(regions[0].side_length, 1);
        assert_eq!(regions[0].value, Some(&1));
        let covered: u64 = regions.iter().map(Region::volume).sum();
        assert_eq!(covered, 64);
    }

    #[test]
    fn merge_propagates_through_every_level() {
        let mut tree = Octree::new(8).unwrap();
        tree.insert(7, 7, 7, Some(9_u16)).unwrap();
        assert_eq!(tree.max_depth(), 3);
        assert_eq!(tree.node_count(), 1 + 3 * 8);

        tree.insert(7, 7, 7, None).unwrap();
        assert!(tree.is_uniform());
        assert_eq!(tree.node_count(), 1);
        assert_eq!(visits(&tree), vec![(0, 0, None)]);
    }

    #[test]
    fn homogeneous_subtrees_resolve_at_any_depth() {
        let mut tree = Octree::<u8>::new(8).unwrap();
        // Built by hand so that no merge check runs in between.
        let children = tree.split(tree.root);
        let grandchildren = tree.split(children[0]);
        let cells = tree.split(grandchildren[3]);
        assert_eq!(tree.resolve(children[1]), Some(&None));
        assert_eq!(tree.resolve(children[0]), Some(&None));
        assert_eq!(tree.resolve(tree.root), Some(&None));

        tree.merge_upward(cells[0]);
        assert!(tree.is_uniform());
        assert_eq!(tree.node_count(), 1);

        tree.insert(0, 0, 0, Some(1)).unwrap();
        assert_eq!(tree.resolve(tree.root), None);
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut tree = Octree::new(4).unwrap();
        tree.insert(0, 0, 0, Some(1_u8)).unwrap();
        let total = tree.nodes.len();
        tree.insert(0, 0, 0, None).unwrap();
        assert_eq!(tree.free_list.len(), total - 1);
        tree.insert(3, 3, 3, Some(1)).unwrap();
        assert_eq!(tree.nodes.len(), total);
        assert_eq!(tree.get(3, 3, 3), Ok(Some(&1)));
    }

    #[test]
    fn unit_tree_overwrites_in_place() {
        let mut tree = Octree::new(1).unwrap();
        tree.insert(0, 0, 0, Some(5_u8)).unwrap();
        assert_eq!(tree.get(0, 0, 0), Ok(Some(&5)));
        tree.insert(0, 0, 0, None).unwrap();
        assert_eq!(visits(&tree), vec![(0, 0, None)]);
        assert!(tree.get(1, 0, 0).is_err());
    }

    #[test]
    fn clear_resets_to_empty_root() {
        let mut tree = Octree::new(4).unwrap();
        tree.insert(1, 2, 3, Some(1_u8)).unwrap();
        tree.clear();
        assert!(tree.is_uniform());
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.get(1, 2, 3), Ok(None));
    }

    #[test]
    fn display_outlines_present_values() {
        let mut tree = Octree::<u8>::new(2).unwrap();
        assert_eq!(tree.to_string(), "");
        tree.insert(0, 0, 0, Some(5)).unwrap();
        tree.insert(1, 1, 1, Some(6)).unwrap();
        assert_eq!(tree.to_string(), "octant 0:\n  octant 0: 5\n  octant 7: 6\n");
        fill(&mut tree, Some(1));
        assert_eq!(tree.to_string(), "octant 0: 1\n");
    }

    #[test]
    fn debug_reports_arena_usage() {
        let mut tree = Octree::new(2).unwrap();
        tree.insert(0, 0, 0, Some(1_u8)).unwrap();
        let text = alloc::format!("{tree:?}");
        assert!(text.contains("nodes_alive: 9"), "{text}");
    }
}
