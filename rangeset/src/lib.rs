//! Fixed-capacity red-black tree of disjoint, non-adjacent `u32` ranges.
//!
//! This is the custody accumulator's core data structure (spec §4.3):
//! inserting a value either creates a new singleton range, extends an
//! existing range by one, or merges two ranges and the value between them
//! into one. The tree never stores more individual values than are present;
//! it stores at most one node per maximal run of consecutive gaps, which
//! bounds node count at `(u32::MAX / 2) + 1` in the worst case (every other
//! integer present).
//!
//! Node storage is an arena (grounded on bplib's `rb_tree.c` free-list
//! design, see [`node`]); rebalancing is the standard CLRS red-black
//! insert/delete fixup (see [`rebalance`]).

mod node;
mod rebalance;


use node::{Color, Index, Node, NIL};
use thiserror::Error;

/// Errors produced by tree operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// No free node slots remain and the capacity limit has been reached.
    #[error("range-set is at capacity")]
    Full,
}

/// The maximum tree capacity: worst case, every other `u32` value is
/// inserted, producing one node per two values.
pub const MAX_CAPACITY: usize = (u32::MAX as usize / 2) + 1;

/// A single contiguous range `[value, value + offset]` in the set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub value: u32,
    pub offset: u32,
}

impl Range {
    /// Inclusive end of the range.
    pub fn end(&self) -> u32 {
        self.value + self.offset
    }
}

/// Outcome of [`Tree::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inserted {
    /// A new value was added (possibly extending or merging ranges).
    New,
    /// The value was already present; the tree is unchanged.
    Duplicate,
}

/// Outcome of [`Tree::delete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deleted {
    /// The value was present and has been removed.
    Removed,
    /// The value was not present; the tree is unchanged.
    NotFound,
}

pub struct Tree {
    nodes: Vec<Node>,
    free: Vec<Index>,
    root: Index,
    capacity: usize,
    len: usize,
}

impl Tree {
    /// Creates an empty tree that will hold at most `capacity` distinct
    /// ranges (not values) at once.
    pub fn new(capacity: usize) -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: NIL,
            capacity,
            len: 0,
        }
    }

    /// Removes every range, resetting the tree to empty. Node slots are
    /// returned to the free list rather than the arena being reallocated.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.root = NIL;
        self.len = 0;
    }

    /// Number of ranges (nodes) currently stored. Not the count of
    /// individual values represented.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len >= self.capacity
    }

    /// Whether `v` falls within some stored range.
    pub fn contains(&self, v: u32) -> bool {
        let mut cur = self.root;
        while cur != NIL {
            let n = self.n(cur);
            if v < n.value {
                cur = n.left;
            } else if v > n.end() {
                cur = n.right;
            } else {
                return true;
            }
        }
        false
    }

    /// Ascending in-order iterator over the stored ranges. Does not mutate
    /// the tree.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            tree: self,
            current: self.leftmost(self.root),
        }
    }

    /// Consumes the tree, yielding ranges in ascending order via cheap
    /// single-parent-rewire unlinking with **no** rebalancing. Valid only
    /// because the tree is discarded afterwards; never reuse a partially
    /// drained tree.
    pub fn drain(self) -> Drain {
        Drain { tree: self }
    }

    /// Inserts `v`, merging with or extending adjacent ranges as needed.
    pub fn insert(&mut self, v: u32) -> Result<Inserted, Error> {
        if self.root == NIL {
            let idx = self.alloc(Node::leaf(v, Color::Black))?;
            self.root = idx;
            return Ok(Inserted::New);
        }

        let mut cur = self.root;
        loop {
            let n = self.n(cur);
            if n.contains(v) {
                return Ok(Inserted::Duplicate);
            }
            if v.checked_add(1) == Some(n.value) {
                self.merge_or_extend_below(cur, v)?;
                return Ok(Inserted::New);
            }
            if n.end().checked_add(1) == Some(v) {
                self.merge_or_extend_above(cur, v)?;
                return Ok(Inserted::New);
            }
            if v < n.value {
                if n.left != NIL {
                    cur = n.left;
                } else {
                    self.attach_child(cur, v, Side::Left)?;
                    return Ok(Inserted::New);
                }
            } else {
                if n.right != NIL {
                    cur = n.right;
                } else {
                    self.attach_child(cur, v, Side::Right)?;
                    return Ok(Inserted::New);
                }
            }
        }
    }

    /// Removes `v`, splitting the containing range if `v` is interior to it.
    pub fn delete(&mut self, v: u32) -> Result<Deleted, Error> {
        let mut cur = self.root;
        while cur != NIL {
            let n = self.n(cur);
            if v < n.value {
                cur = n.left;
            } else if v > n.end() {
                cur = n.right;
            } else {
                break;
            }
        }
        if cur == NIL {
            return Ok(Deleted::NotFound);
        }

        let n = self.n(cur);
        if n.offset == 0 {
            self.delete_node(cur);
        } else if v == n.value {
            self.nodes[cur].value += 1;
            self.nodes[cur].offset -= 1;
        } else if v == n.end() {
            self.nodes[cur].offset -= 1;
        } else {
            // Interior split: allocate the upper half *before* mutating the
            // current node, so a TREE_FULL leaves the tree unchanged.
            let upper_value = v + 1;
            let upper_end = n.end();
            let new_idx = self.alloc(Node::leaf(upper_value, Color::Red))?;
            self.nodes[new_idx].offset = upper_end - upper_value;
            self.nodes[cur].offset = v - 1 - self.nodes[cur].value;
            self.attach_after_node(cur, new_idx);
        }
        Ok(Deleted::Removed)
    }

    fn merge_or_extend_below(&mut self, cur: Index, v: u32) -> Result<(), Error> {
        let pred = self.predecessor(cur);
        if pred != NIL && self.n(pred).end().checked_add(1) == Some(v) {
            let new_end = self.n(cur).end();
            self.nodes[pred].offset = new_end - self.n(pred).value;
            self.delete_node(cur);
        } else {
            self.nodes[cur].value = v;
            self.nodes[cur].offset += 1;
        }
        Ok(())
    }

    fn merge_or_extend_above(&mut self, cur: Index, v: u32) -> Result<(), Error> {
        let succ = self.successor(cur);
        if succ != NIL && v.checked_add(1) == Some(self.n(succ).value) {
            let new_end = self.n(succ).end();
            self.nodes[cur].offset = new_end - self.n(cur).value;
            self.delete_node(succ);
        } else {
            self.nodes[cur].offset += 1;
        }
        Ok(())
    }

    fn attach_child(&mut self, parent: Index, v: u32, side: Side) -> Result<Index, Error> {
        let idx = self.alloc(Node::leaf(v, Color::Red))?;
        self.nodes[idx].parent = parent;
        match side {
            Side::Left => self.nodes[parent].left = idx,
            Side::Right => self.nodes[parent].right = idx,
        }
        self.insert_fixup(idx);
        Ok(idx)
    }

    /// Attaches `new_idx` as the in-order successor of `node`, i.e. the
    /// immediate next position, used when splitting a range on delete.
    fn attach_after_node(&mut self, node: Index, new_idx: Index) {
        if self.n(node).right == NIL {
            self.nodes[node].right = new_idx;
            self.nodes[new_idx].parent = node;
        } else {
            let mut n = self.n(node).right;
            while self.n(n).left != NIL {
                n = self.n(n).left;
            }
            self.nodes[n].left = new_idx;
            self.nodes[new_idx].parent = n;
        }
        self.insert_fixup(new_idx);
    }

    fn predecessor(&self, idx: Index) -> Index {
        if self.n(idx).left != NIL {
            let mut n = self.n(idx).left;
            while self.n(n).right != NIL {
                n = self.n(n).right;
            }
            return n;
        }
        let mut n = idx;
        let mut p = self.n(n).parent;
        while p != NIL && self.n(p).left == n {
            n = p;
            p = self.n(p).parent;
        }
        p
    }

    fn successor(&self, idx: Index) -> Index {
        if self.n(idx).right != NIL {
            let mut n = self.n(idx).right;
            while self.n(n).left != NIL {
                n = self.n(n).left;
            }
            return n;
        }
        let mut n = idx;
        let mut p = self.n(n).parent;
        while p != NIL && self.n(p).right == n {
            n = p;
            p = self.n(p).parent;
        }
        p
    }

    fn leftmost(&self, mut idx: Index) -> Index {
        if idx == NIL {
            return NIL;
        }
        while self.n(idx).left != NIL {
            idx = self.n(idx).left;
        }
        idx
    }

    fn alloc(&mut self, node: Node) -> Result<Index, Error> {
        if let Some(idx) = self.free.pop() {
            self.nodes[idx] = node;
            self.len += 1;
            return Ok(idx);
        }
        if self.nodes.len() >= self.capacity {
            return Err(Error::Full);
        }
        self.nodes.push(node);
        self.len += 1;
        Ok(self.nodes.len() - 1)
    }

    fn free_node(&mut self, idx: Index) {
        self.free.push(idx);
        self.len -= 1;
    }

    fn n(&self, idx: Index) -> &Node {
        &self.nodes[idx]
    }

    fn left(&self, idx: Index) -> Index {
        if idx == NIL { NIL } else { self.nodes[idx].left }
    }
    fn right(&self, idx: Index) -> Index {
        if idx == NIL { NIL } else { self.nodes[idx].right }
    }
    fn parent(&self, idx: Index) -> Index {
        if idx == NIL { NIL } else { self.nodes[idx].parent }
    }
    fn set_left(&mut self, idx: Index, v: Index) {
        self.nodes[idx].left = v;
    }
    fn set_right(&mut self, idx: Index, v: Index) {
        self.nodes[idx].right = v;
    }
    fn set_parent(&mut self, idx: Index, v: Index) {
        self.nodes[idx].parent = v;
    }
    fn color(&self, idx: Index) -> Color {
        if idx == NIL { Color::Black } else { self.nodes[idx].color }
    }
    fn set_color(&mut self, idx: Index, c: Color) {
        if idx != NIL {
            self.nodes[idx].color = c;
        }
    }

    /// Debug-only validation of the red-black invariants, used by tests.
    #[cfg(test)]
    fn check_invariants(&self) {
        assert_eq!(self.color(self.root), Color::Black, "root must be black");
        fn walk(tree: &Tree, idx: Index, min: Option<u32>, max: Option<u32>) -> usize {
            if idx == NIL {
                return 1;
            }
            let n = tree.n(idx);
            if let Some(min) = min {
                assert!(n.value > min, "BST order violated");
            }
            if let Some(max) = max {
                assert!(n.end() < max, "BST order violated");
            }
            if n.color == Color::Red {
                assert_eq!(tree.color(n.left), Color::Black, "red-red violation");
                assert_eq!(tree.color(n.right), Color::Black, "red-red violation");
            }
            let left_bh = walk(tree, n.left, min, Some(n.value));
            let right_bh = walk(tree, n.right, Some(n.end()), max);
            assert_eq!(left_bh, right_bh, "black-height mismatch");
            left_bh + if n.color == Color::Black { 1 } else { 0 }
        }
        walk(self, self.root, None, None);
    }
}

enum Side {
    Left,
    Right,
}

/// Ascending in-order iterator, see [`Tree::iter`].
pub struct Iter<'a> {
    tree: &'a Tree,
    current: Index,
}

impl Iterator for Iter<'_> {
    type Item = Range;

    fn next(&mut self) -> Option<Range> {
        if self.current == NIL {
            return None;
        }
        let n = self.tree.n(self.current);
        let range = Range {
            value: n.value,
            offset: n.offset,
        };
        self.current = self.tree.successor(self.current);
        Some(range)
    }
}

/// Destructive ascending drain, see [`Tree::drain`].
pub struct Drain {
    tree: Tree,
}

impl Iterator for Drain {
    type Item = Range;

    fn next(&mut self) -> Option<Range> {
        if self.tree.root == NIL {
            return None;
        }
        let n = self.tree.leftmost(self.tree.root);
        let node = self.tree.n(n);
        let range = Range {
            value: node.value,
            offset: node.offset,
        };

        // `n` is leftmost, so it has no left child and is always its
        // parent's left child (or the root). A single parent-rewire
        // suffices; the rest of the tree's shape is never touched.
        let parent = self.tree.parent(n);
        let right = self.tree.right(n);
        if right != NIL {
            self.tree.set_parent(right, parent);
        }
        if parent == NIL {
            self.tree.root = right;
        } else {
            self.tree.set_left(parent, right);
        }
        self.tree.len -= 1;

        Some(range)
    }
}
