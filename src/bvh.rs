// Copyright 2017 Matthew Plant. This file is part of PDFEM.
//
// PDFEM is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// PDFEM is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with PDFEM. If not, see <http://www.gnu.org/licenses/>.

use std::cmp;

use smallvec::SmallVec;

use crate::bounds::{Bound, BoundedBy};
use crate::geom::Real;

/// A Bounding Volume Hierarchy.
///
/// Leaves are inserted one at a time with a surface area heuristic and the
/// tree is kept height balanced with rotations. Nodes live in a flat vector;
/// the tree only grows.
#[derive(Clone)]
pub struct BVH<B: Bound, V> {
    root: usize,
    num_leaves: usize,
    nodes: Vec<BVHNode<B, V>>,
}

#[derive(Clone)]
struct BVHNode<B: Bound, V> {
    height: i32,
    parent: usize,
    bounds: B,
    node_type: BVHNodeType<V>,
}

#[derive(Clone)]
enum BVHNodeType<V> {
    Leaf(V),
    Parent(usize, usize),
}

impl<B: Bound, V> Default for BVH<B, V> {
    fn default() -> Self {
        BVH::new()
    }
}

impl<B: Bound, V> BVH<B, V> {
    pub fn new() -> Self {
        BVH {
            root: 0,
            num_leaves: 0,
            nodes: Vec::new(),
        }
    }

    pub fn with_capacity(cap: usize) -> Self {
        BVH {
            root: 0,
            num_leaves: 0,
            nodes: Vec::with_capacity(cap * 2),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.num_leaves == 0
    }

    /// Returns the number of bounds inserted into the BVH.
    pub fn len(&self) -> usize {
        self.num_leaves
    }

    /// Bounds of the whole tree.
    pub fn root_bounds(&self) -> Option<B> {
        if self.is_empty() {
            None
        } else {
            Some(self.nodes[self.root].bounds)
        }
    }

    /// Height of the tree, with a single leaf at height 0.
    pub fn height(&self) -> i32 {
        if self.is_empty() {
            -1
        } else {
            self.nodes[self.root].height
        }
    }

    fn push_node(&mut self, bounds: B, node_type: BVHNodeType<V>) -> usize {
        let id = self.nodes.len();
        self.nodes.push(BVHNode {
            bounds,
            node_type,
            height: 0,
            parent: 0,
        });
        id
    }

    /// Inserts an item into the BVH, rebalancing if necessary. All IDs
    /// returned prior to insert remain valid afterward.
    pub fn insert<K: BoundedBy<B>>(&mut self, key: &K, val: V) -> usize {
        self.num_leaves += 1;
        let bounds = key.bounds();
        let leaf = self.push_node(bounds, BVHNodeType::Leaf(val));
        if self.num_leaves == 1 {
            self.root = leaf;
            return leaf;
        }
        let mut best = self.root;
        while let BVHNodeType::Parent(child1, child2) = self.nodes[best].node_type {
            let curr_bounds = self.nodes[best].bounds;
            let area = curr_bounds.surface_area();
            let combined_area = B::combine(&curr_bounds, &bounds).surface_area();
            let no_descent_cost = combined_area * 2.0;
            let inheritance_cost = (combined_area - area) * 2.0;

            let child_cost = |child: usize| -> Real {
                let child_bounds = &self.nodes[child].bounds;
                let new_area = B::combine(&bounds, child_bounds).surface_area();
                match self.nodes[child].node_type {
                    BVHNodeType::Parent(_, _) => {
                        new_area - child_bounds.surface_area() + inheritance_cost
                    }
                    BVHNodeType::Leaf(_) => new_area + inheritance_cost,
                }
            };

            let child1_cost = child_cost(child1);
            let child2_cost = child_cost(child2);

            if no_descent_cost < child1_cost && no_descent_cost < child2_cost {
                break;
            }
            best = if child1_cost < child2_cost { child1 } else { child2 };
        }

        // Splice a new parent in above `best`.
        let old_parent = self.nodes[best].parent;
        let best_bounds = self.nodes[best].bounds;
        let new_parent = self.push_node(
            B::combine(&bounds, &best_bounds),
            BVHNodeType::Parent(best, leaf),
        );
        self.nodes[new_parent].parent = old_parent;
        self.nodes[new_parent].height = self.nodes[best].height + 1;
        if best == self.root {
            self.root = new_parent;
        } else {
            self.replace_child(old_parent, best, new_parent);
        }
        self.nodes[best].parent = new_parent;
        self.nodes[leaf].parent = new_parent;

        // Walk up the tree fixing the heights and bounds.
        let mut i = new_parent;
        loop {
            i = self.balance(i);
            self.fix(i);
            if i == self.root {
                break;
            }
            i = self.nodes[i].parent;
        }

        leaf
    }

    fn replace_child(&mut self, parent: usize, old: usize, new: usize) {
        if let BVHNodeType::Parent(c1, c2) = self.nodes[parent].node_type {
            self.nodes[parent].node_type = if c1 == old {
                BVHNodeType::Parent(new, c2)
            } else {
                BVHNodeType::Parent(c1, new)
            };
        }
    }

    /// Recomputes the height and bounds of a parent from its children.
    fn fix(&mut self, i: usize) {
        if let BVHNodeType::Parent(c1, c2) = self.nodes[i].node_type {
            self.nodes[i].height = 1 + cmp::max(self.nodes[c1].height, self.nodes[c2].height);
            self.nodes[i].bounds = B::combine(&self.nodes[c1].bounds, &self.nodes[c2].bounds);
        }
    }

    fn balance(&mut self, a: usize) -> usize {
        if self.nodes[a].height < 2 {
            return a;
        }
        let (b, c) = match self.nodes[a].node_type {
            BVHNodeType::Parent(b, c) => (b, c),
            BVHNodeType::Leaf(_) => return a,
        };
        let skew = self.nodes[c].height - self.nodes[b].height;
        if skew > 1 {
            self.rotate_up(a, c, b)
        } else if skew < -1 {
            self.rotate_up(a, b, c)
        } else {
            a
        }
    }

    /// Moves `tall`, the taller child of `a`, into `a`'s place. The shorter
    /// grandchild under `tall` is handed down to `a` next to `short`.
    fn rotate_up(&mut self, a: usize, tall: usize, short: usize) -> usize {
        let (f, g) = match self.nodes[tall].node_type {
            BVHNodeType::Parent(f, g) => (f, g),
            BVHNodeType::Leaf(_) => return a,
        };
        let grand = self.nodes[a].parent;
        self.nodes[tall].parent = grand;
        self.nodes[a].parent = tall;
        if self.root == a {
            self.root = tall;
        } else {
            self.replace_child(grand, a, tall);
        }

        let (keep, give) = if self.nodes[f].height > self.nodes[g].height {
            (f, g)
        } else {
            (g, f)
        };
        self.nodes[tall].node_type = BVHNodeType::Parent(a, keep);
        self.nodes[a].node_type = BVHNodeType::Parent(short, give);
        self.nodes[give].parent = a;
        self.fix(a);
        self.fix(tall);
        tall
    }

    /// Recomputes every bound in place after leaves have moved. The topology
    /// is untouched, so tree quality degrades as geometry drifts.
    pub fn refit<F: FnMut(&V) -> B>(&mut self, mut leaf_bounds: F) {
        if self.is_empty() {
            return;
        }
        let mut stack: SmallVec<[(usize, bool); 64]> = SmallVec::new();
        stack.push((self.root, false));
        while let Some((i, children_done)) = stack.pop() {
            let bounds = match self.nodes[i].node_type {
                BVHNodeType::Leaf(ref v) => leaf_bounds(v),
                BVHNodeType::Parent(l, r) => {
                    if !children_done {
                        stack.push((i, true));
                        stack.push((l, false));
                        stack.push((r, false));
                        continue;
                    }
                    B::combine(&self.nodes[l].bounds, &self.nodes[r].bounds)
                }
            };
            self.nodes[i].bounds = bounds;
        }
    }

    /// Simultaneous descent of two trees. Every pair of overlapping leaves is
    /// passed to `callback`, or only the first one when `first_only` is set.
    /// The larger of two internal nodes is split first.
    pub fn overlaps_with<F>(&self, other: &BVH<B, V>, first_only: bool, mut callback: F) -> bool
    where
        F: FnMut(&V, &V),
    {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        let mut stack = SmallVec::<[(usize, usize); 64]>::new();
        stack.push((self.root, other.root));
        let mut collided = false;
        while let Some((a, b)) = stack.pop() {
            let (na, nb) = (&self.nodes[a], &other.nodes[b]);
            if !na.bounds.overlaps(&nb.bounds) {
                continue;
            }
            match (&na.node_type, &nb.node_type) {
                (BVHNodeType::Leaf(va), BVHNodeType::Leaf(vb)) => {
                    collided = true;
                    callback(va, vb);
                    if first_only {
                        return true;
                    }
                }
                (BVHNodeType::Leaf(_), &BVHNodeType::Parent(l, r)) => {
                    stack.push((a, l));
                    stack.push((a, r));
                }
                (&BVHNodeType::Parent(l, r), BVHNodeType::Leaf(_)) => {
                    stack.push((l, b));
                    stack.push((r, b));
                }
                (&BVHNodeType::Parent(al, ar), &BVHNodeType::Parent(bl, br)) => {
                    if na.bounds.surface_area() >= nb.bounds.surface_area() {
                        stack.push((al, b));
                        stack.push((ar, b));
                    } else {
                        stack.push((a, bl));
                        stack.push((a, br));
                    }
                }
            }
        }
        collided
    }
}
