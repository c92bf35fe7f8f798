//! Arena-backed bounding volume hierarchy with per-node reachability bits
//!
//! Nodes live in a flat `Vec` and refer to each other by index. Culling never
//! restructures the tree: each pass clears the reachability bitset and
//! recomputes it, so the same tree is reused frame after frame.

use std::collections::VecDeque;

use crate::math::Aabb;

/// Index of a node in the arena
pub type NodeId = u32;

const NULL_NODE: NodeId = u32::MAX;

/// Stable handle to a leaf payload
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LeafId(pub u32);

#[derive(Clone, Copy, Debug)]
enum NodeKind {
    Leaf { item: u32 },
    Internal { left: NodeId, right: NodeId },
}

#[derive(Clone, Copy, Debug)]
struct BvhNode {
    aabb: Aabb,
    parent: NodeId,
    kind: NodeKind,
}

/// Growable bitset, one bit per arena node
#[derive(Clone, Debug, Default)]
pub struct NodeBits {
    words: Vec<u64>,
}

impl NodeBits {
    pub fn resize(&mut self, bits: usize) {
        self.words.resize(bits.div_ceil(64), 0);
    }

    pub fn clear(&mut self) {
        self.words.fill(0);
    }

    pub fn set(&mut self, index: usize, value: bool) {
        let (word, bit) = (index / 64, index % 64);
        if value {
            self.words[word] |= 1 << bit;
        } else {
            self.words[word] &= !(1 << bit);
        }
    }

    pub fn get(&self, index: usize) -> bool {
        self.words
            .get(index / 64)
            .is_some_and(|w| w & (1 << (index % 64)) != 0)
    }

    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}

/// Bounding volume hierarchy over `T` payloads.
pub struct Bvh<T> {
    nodes: Vec<BvhNode>,
    root: NodeId,
    items: Vec<T>,
    /// Leaf node of each item, indexed by `LeafId`
    item_nodes: Vec<NodeId>,
    reachable: NodeBits,
}

impl<T> Default for Bvh<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Bvh<T> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            root: NULL_NODE,
            items: Vec::new(),
            item_nodes: Vec::new(),
            reachable: NodeBits::default(),
        }
    }

    /// Build a balanced tree from scratch by median splits along the longest axis.
    pub fn build(entries: Vec<(Aabb, T)>) -> Self {
        let mut bvh = Self::new();
        if entries.is_empty() {
            return bvh;
        }

        let mut leaves: Vec<(Aabb, u32)> = Vec::with_capacity(entries.len());
        for (aabb, item) in entries {
            leaves.push((aabb, bvh.items.len() as u32));
            bvh.items.push(item);
        }
        bvh.item_nodes = vec![NULL_NODE; bvh.items.len()];
        bvh.nodes.reserve(leaves.len() * 2);
        bvh.root = bvh.build_recursive(&mut leaves, NULL_NODE);
        bvh.reachable.resize(bvh.nodes.len());
        bvh
    }

    fn build_recursive(&mut self, leaves: &mut [(Aabb, u32)], parent: NodeId) -> NodeId {
        let bounds = leaves
            .iter()
            .fold(Aabb::INVALID, |acc, (aabb, _)| acc.merged(aabb));

        if leaves.len() == 1 {
            let (aabb, item) = leaves[0];
            let id = self.push_node(BvhNode { aabb, parent, kind: NodeKind::Leaf { item } });
            self.item_nodes[item as usize] = id;
            return id;
        }

        let size = bounds.size();
        let axis = if size.x >= size.y && size.x >= size.z {
            0
        } else if size.y >= size.z {
            1
        } else {
            2
        };
        leaves.sort_by(|a, b| {
            a.0.center()[axis]
                .partial_cmp(&b.0.center()[axis])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let id = self.push_node(BvhNode {
            aabb: bounds,
            parent,
            kind: NodeKind::Internal { left: NULL_NODE, right: NULL_NODE },
        });
        let mid = leaves.len() / 2;
        let (lo, hi) = leaves.split_at_mut(mid);
        let left = self.build_recursive(lo, id);
        let right = self.build_recursive(hi, id);
        self.nodes[id as usize].kind = NodeKind::Internal { left, right };
        id
    }

    fn push_node(&mut self, node: BvhNode) -> NodeId {
        self.nodes.push(node);
        (self.nodes.len() - 1) as NodeId
    }

    /// Insert one leaf, descending towards the child whose surface area grows least.
    pub fn insert(&mut self, aabb: Aabb, item: T) -> LeafId {
        let leaf_id = LeafId(self.items.len() as u32);
        self.items.push(item);

        let leaf = self.push_node(BvhNode {
            aabb,
            parent: NULL_NODE,
            kind: NodeKind::Leaf { item: leaf_id.0 },
        });
        self.item_nodes.push(leaf);

        if self.root == NULL_NODE {
            self.root = leaf;
            self.reachable.resize(self.nodes.len());
            return leaf_id;
        }

        let mut sibling = self.root;
        while let NodeKind::Internal { left, right } = self.nodes[sibling as usize].kind {
            let left_cost = self.nodes[left as usize].aabb.merged(&aabb).surface_area()
                - self.nodes[left as usize].aabb.surface_area();
            let right_cost = self.nodes[right as usize].aabb.merged(&aabb).surface_area()
                - self.nodes[right as usize].aabb.surface_area();
            sibling = if left_cost <= right_cost { left } else { right };
        }

        let old_parent = self.nodes[sibling as usize].parent;
        let merged = self.nodes[sibling as usize].aabb.merged(&aabb);
        let new_parent = self.push_node(BvhNode {
            aabb: merged,
            parent: old_parent,
            kind: NodeKind::Internal { left: sibling, right: leaf },
        });
        self.nodes[sibling as usize].parent = new_parent;
        self.nodes[leaf as usize].parent = new_parent;

        if old_parent == NULL_NODE {
            self.root = new_parent;
        } else if let NodeKind::Internal { left, right } = &mut self.nodes[old_parent as usize].kind {
            if *left == sibling {
                *left = new_parent;
            } else {
                *right = new_parent;
            }
        }

        // Refit ancestors
        let mut node = old_parent;
        while node != NULL_NODE {
            if let NodeKind::Internal { left, right } = self.nodes[node as usize].kind {
                let refit = self.nodes[left as usize].aabb.merged(&self.nodes[right as usize].aabb);
                self.nodes[node as usize].aabb = refit;
            }
            node = self.nodes[node as usize].parent;
        }

        self.reachable.resize(self.nodes.len());
        leaf_id
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Bounds of the whole tree
    pub fn bounds(&self) -> Option<Aabb> {
        (self.root != NULL_NODE).then(|| self.nodes[self.root as usize].aabb)
    }

    pub fn item(&self, leaf: LeafId) -> Option<&T> {
        self.items.get(leaf.0 as usize)
    }

    pub fn leaf_aabb(&self, leaf: LeafId) -> Option<Aabb> {
        let node = *self.item_nodes.get(leaf.0 as usize)?;
        Some(self.nodes[node as usize].aabb)
    }

    pub fn items(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Depth of the deepest leaf (root = 1)
    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = Vec::new();
        if self.root != NULL_NODE {
            stack.push((self.root, 1));
        }
        while let Some((node, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            if let NodeKind::Internal { left, right } = self.nodes[node as usize].kind {
                stack.push((left, depth + 1));
                stack.push((right, depth + 1));
            }
        }
        max_depth
    }

    /// Clear every reachability bit.
    pub fn reset_reachability(&mut self) {
        self.reachable.clear();
    }

    pub fn is_reachable(&self, leaf: LeafId) -> bool {
        self.item_nodes
            .get(leaf.0 as usize)
            .is_some_and(|&node| self.reachable.get(node as usize))
    }

    pub fn reachable_node_count(&self) -> usize {
        self.reachable.count_ones()
    }

    /// Frustum-style pass: clear all bits, then walk breadth-first from the
    /// root, marking nodes that pass `predicate` and descending only into them.
    ///
    /// Returns the number of predicate evaluations.
    pub fn mark_reachable<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&Aabb) -> bool,
    {
        self.reachable.clear();
        if self.root == NULL_NODE {
            return 0;
        }

        let mut tested = 0;
        let mut queue = VecDeque::from([self.root]);
        while let Some(node) = queue.pop_front() {
            let n = self.nodes[node as usize];
            tested += 1;
            if !predicate(&n.aabb) {
                continue;
            }
            self.reachable.set(node as usize, true);
            if let NodeKind::Internal { left, right } = n.kind {
                queue.push_back(left);
                queue.push_back(right);
            }
        }
        tested
    }

    /// Refinement pass: walk breadth-first through currently reachable nodes
    /// only; a node failing `predicate` is unlinked along with its subtree.
    ///
    /// Returns the number of predicate evaluations.
    pub fn refine_reachable<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&Aabb) -> bool,
    {
        if self.root == NULL_NODE || !self.reachable.get(self.root as usize) {
            return 0;
        }

        let mut tested = 0;
        let mut queue = VecDeque::from([self.root]);
        while let Some(node) = queue.pop_front() {
            let n = self.nodes[node as usize];
            tested += 1;
            if !predicate(&n.aabb) {
                self.unlink_subtree(node);
                continue;
            }
            if let NodeKind::Internal { left, right } = n.kind {
                for child in [left, right] {
                    if self.reachable.get(child as usize) {
                        queue.push_back(child);
                    }
                }
            }
        }
        tested
    }

    fn unlink_subtree(&mut self, node: NodeId) {
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            if !self.reachable.get(n as usize) {
                continue;
            }
            self.reachable.set(n as usize, false);
            if let NodeKind::Internal { left, right } = self.nodes[n as usize].kind {
                stack.push(left);
                stack.push(right);
            }
        }
    }

    /// Visit every reachable leaf, descending only through reachable nodes.
    pub fn for_each_reachable_leaf<F>(&self, mut visit: F)
    where
        F: FnMut(LeafId, &Aabb, &T),
    {
        if self.root == NULL_NODE || !self.reachable.get(self.root as usize) {
            return;
        }
        let mut queue = VecDeque::from([self.root]);
        while let Some(node) = queue.pop_front() {
            let n = &self.nodes[node as usize];
            match n.kind {
                NodeKind::Leaf { item } => visit(LeafId(item), &n.aabb, &self.items[item as usize]),
                NodeKind::Internal { left, right } => {
                    for child in [left, right] {
                        if self.reachable.get(child as usize) {
                            queue.push_back(child);
                        }
                    }
                }
            }
        }
    }

    /// Remove every node and item
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.items.clear();
        self.item_nodes.clear();
        self.reachable = NodeBits::default();
        self.root = NULL_NODE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Vec3;

    fn grid_boxes(side: u32) -> Vec<(Aabb, u32)> {
        let mut out = Vec::new();
        for y in 0..side {
            for x in 0..side {
                let min = Vec3::new(x as f32 * 10.0, y as f32 * 10.0, 0.0);
                out.push((Aabb::new(min, min + Vec3::new(10.0, 10.0, 5.0)), y * side + x));
            }
        }
        out
    }

    fn all_bounds_contain_children<T>(bvh: &Bvh<T>) -> bool {
        bvh.nodes.iter().all(|n| match n.kind {
            NodeKind::Leaf { .. } => true,
            NodeKind::Internal { left, right } => {
                n.aabb.contains(&bvh.nodes[left as usize].aabb)
                    && n.aabb.contains(&bvh.nodes[right as usize].aabb)
            }
        })
    }

    #[test]
    fn test_build_balanced() {
        let bvh = Bvh::build(grid_boxes(8));
        assert_eq!(bvh.len(), 64);
        assert_eq!(bvh.node_count(), 127);
        assert_eq!(bvh.depth(), 7);
        assert!(all_bounds_contain_children(&bvh));
        assert_eq!(bvh.bounds().unwrap().max, Vec3::new(80.0, 80.0, 5.0));
    }

    #[test]
    fn test_incremental_insert_keeps_bounds() {
        let mut bvh = Bvh::new();
        for (aabb, item) in grid_boxes(5) {
            bvh.insert(aabb, item);
        }
        assert_eq!(bvh.len(), 25);
        assert_eq!(bvh.node_count(), 49);
        assert!(all_bounds_contain_children(&bvh));
        assert_eq!(bvh.item(LeafId(7)), Some(&7));
    }

    #[test]
    fn test_mark_and_extract() {
        let mut bvh = Bvh::build(grid_boxes(4));
        let query = Aabb::new(Vec3::ZERO, Vec3::new(15.0, 15.0, 1.0));
        bvh.mark_reachable(|aabb| aabb.intersects(&query));

        let mut found = Vec::new();
        bvh.for_each_reachable_leaf(|_, _, item| found.push(*item));
        found.sort();
        assert_eq!(found, vec![0, 1, 4, 5]);
    }

    #[test]
    fn test_refine_unlinks_subtrees() {
        let mut bvh = Bvh::build(grid_boxes(4));
        bvh.mark_reachable(|_| true);
        assert_eq!(bvh.reachable_node_count(), bvh.node_count());

        // Drop everything right of x = 20
        bvh.refine_reachable(|aabb| aabb.min.x < 20.0);
        let mut found = Vec::new();
        bvh.for_each_reachable_leaf(|leaf, _, item| {
            assert!(bvh.is_reachable(leaf));
            found.push(*item);
        });
        assert_eq!(found.len(), 8);
        assert!(found.iter().all(|i| i % 4 < 2));
        assert!(!bvh.is_reachable(LeafId(3)));
    }

    #[test]
    fn test_passes_reuse_tree() {
        let mut bvh = Bvh::build(grid_boxes(4));
        let nodes_before = bvh.node_count();
        bvh.mark_reachable(|_| false);
        assert_eq!(bvh.reachable_node_count(), 0);
        bvh.mark_reachable(|_| true);
        assert_eq!(bvh.reachable_node_count(), nodes_before);
        assert_eq!(bvh.node_count(), nodes_before);
    }

    #[test]
    fn test_empty_tree() {
        let mut bvh: Bvh<u32> = Bvh::new();
        assert_eq!(bvh.mark_reachable(|_| true), 0);
        assert_eq!(bvh.refine_reachable(|_| true), 0);
        assert!(bvh.bounds().is_none());
        let mut count = 0;
        bvh.for_each_reachable_leaf(|_, _, _| count += 1);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_node_bits() {
        let mut bits = NodeBits::default();
        bits.resize(130);
        bits.set(0, true);
        bits.set(129, true);
        assert!(bits.get(129) && bits.get(0) && !bits.get(64));
        assert_eq!(bits.count_ones(), 2);
        bits.set(129, false);
        assert!(!bits.get(129));
        assert!(!bits.get(10_000));
        bits.clear();
        assert_eq!(bits.count_ones(), 0);
    }
}
