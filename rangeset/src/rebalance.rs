//! Red-black rebalancing: the classic insert-fixup / delete-fixup case
//! analysis (recolour on red uncle, rotate-and-recolour on black uncle for
//! insertion; the six-case black-leaf family for deletion), rewritten over
//! the arena's index "pointers" instead of `rb_tree.c`'s `rb_node_t*`.

use crate::node::{Color, Index, NIL};
use crate::Tree;

impl Tree {
    pub(crate) fn rotate_left(&mut self, x: Index) {
        let y = self.right(x);
        debug_assert_ne!(y, NIL);

        let y_left = self.left(y);
        self.set_right(x, y_left);
        if y_left != NIL {
            self.set_parent(y_left, x);
        }

        let x_parent = self.parent(x);
        self.set_parent(y, x_parent);
        if x_parent == NIL {
            self.root = y;
        } else if self.left(x_parent) == x {
            self.set_left(x_parent, y);
        } else {
            self.set_right(x_parent, y);
        }

        self.set_left(y, x);
        self.set_parent(x, y);
    }

    pub(crate) fn rotate_right(&mut self, x: Index) {
        let y = self.left(x);
        debug_assert_ne!(y, NIL);

        let y_right = self.right(y);
        self.set_left(x, y_right);
        if y_right != NIL {
            self.set_parent(y_right, x);
        }

        let x_parent = self.parent(x);
        self.set_parent(y, x_parent);
        if x_parent == NIL {
            self.root = y;
        } else if self.right(x_parent) == x {
            self.set_right(x_parent, y);
        } else {
            self.set_left(x_parent, y);
        }

        self.set_right(y, x);
        self.set_parent(x, y);
    }

    /// Standard CLRS `RB-INSERT-FIXUP`, applied after a fresh red leaf has
    /// been linked into the tree.
    pub(crate) fn insert_fixup(&mut self, mut z: Index) {
        while self.parent(z) != NIL && self.color(self.parent(z)) == Color::Red {
            let parent = self.parent(z);
            let grandparent = self.parent(parent);
            debug_assert_ne!(grandparent, NIL, "a red node always has a black parent unless root");

            if parent == self.left(grandparent) {
                let uncle = self.right(grandparent);
                if self.color(uncle) == Color::Red {
                    self.set_color(parent, Color::Black);
                    self.set_color(uncle, Color::Black);
                    self.set_color(grandparent, Color::Red);
                    z = grandparent;
                } else {
                    if z == self.right(parent) {
                        z = parent;
                        self.rotate_left(z);
                    }
                    let parent = self.parent(z);
                    let grandparent = self.parent(parent);
                    self.set_color(parent, Color::Black);
                    self.set_color(grandparent, Color::Red);
                    self.rotate_right(grandparent);
                }
            } else {
                let uncle = self.left(grandparent);
                if self.color(uncle) == Color::Red {
                    self.set_color(parent, Color::Black);
                    self.set_color(uncle, Color::Black);
                    self.set_color(grandparent, Color::Red);
                    z = grandparent;
                } else {
                    if z == self.left(parent) {
                        z = parent;
                        self.rotate_right(z);
                    }
                    let parent = self.parent(z);
                    let grandparent = self.parent(parent);
                    self.set_color(parent, Color::Black);
                    self.set_color(grandparent, Color::Red);
                    self.rotate_left(grandparent);
                }
            }
        }
        self.set_color(self.root, Color::Black);
    }

    /// Replaces the subtree rooted at `u` with the subtree rooted at `v` in
    /// `u`'s parent (CLRS `RB-TRANSPLANT`).
    fn transplant(&mut self, u: Index, v: Index) {
        let parent = self.parent(u);
        if parent == NIL {
            self.root = v;
        } else if self.left(parent) == u {
            self.set_left(parent, v);
        } else {
            self.set_right(parent, v);
        }
        if v != NIL {
            self.set_parent(v, parent);
        }
    }

    /// Removes node `z` from the tree entirely, rebalancing afterwards.
    /// This is the structural deletion used both by explicit `delete` and
    /// by the insert-time three-way merge that absorbs a neighbour node.
    pub(crate) fn delete_node(&mut self, z: Index) {
        let mut y = z;
        let mut y_original_color = self.color(y);
        let x;
        let x_parent;

        if self.left(z) == NIL {
            x = self.right(z);
            x_parent = self.parent(z);
            self.transplant(z, x);
        } else if self.right(z) == NIL {
            x = self.left(z);
            x_parent = self.parent(z);
            self.transplant(z, x);
        } else {
            y = self.right(z);
            while self.left(y) != NIL {
                y = self.left(y);
            }
            y_original_color = self.color(y);
            x = self.right(y);
            if self.parent(y) == z {
                x_parent = y;
            } else {
                x_parent = self.parent(y);
                self.transplant(y, x);
                self.set_right(y, self.right(z));
                self.set_parent(self.right(y), y);
            }
            self.transplant(z, y);
            self.set_left(y, self.left(z));
            self.set_parent(self.left(y), y);
            self.set_color(y, self.color(z));
        }

        if y_original_color == Color::Black {
            self.delete_fixup(x, x_parent);
        }

        self.free_node(z);
    }

    /// CLRS `RB-DELETE-FIXUP`, parameterised on `x`'s parent since `x` may
    /// be the sentinel `NIL` (a "phantom" doubly-black leaf).
    fn delete_fixup(&mut self, mut x: Index, mut x_parent: Index) {
        while x != self.root && self.color(x) == Color::Black {
            if x == self.left(x_parent) {
                let mut w = self.right(x_parent);
                if self.color(w) == Color::Red {
                    self.set_color(w, Color::Black);
                    self.set_color(x_parent, Color::Red);
                    self.rotate_left(x_parent);
                    w = self.right(x_parent);
                }
                if self.color(self.left(w)) == Color::Black && self.color(self.right(w)) == Color::Black {
                    self.set_color(w, Color::Red);
                    x = x_parent;
                    x_parent = self.parent(x);
                } else {
                    if self.color(self.right(w)) == Color::Black {
                        self.set_color(self.left(w), Color::Black);
                        self.set_color(w, Color::Red);
                        self.rotate_right(w);
                        w = self.right(x_parent);
                    }
                    self.set_color(w, self.color(x_parent));
                    self.set_color(x_parent, Color::Black);
                    self.set_color(self.right(w), Color::Black);
                    self.rotate_left(x_parent);
                    x = self.root;
                }
            } else {
                let mut w = self.left(x_parent);
                if self.color(w) == Color::Red {
                    self.set_color(w, Color::Black);
                    self.set_color(x_parent, Color::Red);
                    self.rotate_right(x_parent);
                    w = self.left(x_parent);
                }
                if self.color(self.right(w)) == Color::Black && self.color(self.left(w)) == Color::Black {
                    self.set_color(w, Color::Red);
                    x = x_parent;
                    x_parent = self.parent(x);
                } else {
                    if self.color(self.left(w)) == Color::Black {
                        self.set_color(self.right(w), Color::Black);
                        self.set_color(w, Color::Red);
                        self.rotate_left(w);
                        w = self.left(x_parent);
                    }
                    self.set_color(w, self.color(x_parent));
                    self.set_color(x_parent, Color::Black);
                    self.set_color(self.left(w), Color::Black);
                    self.rotate_right(x_parent);
                    x = self.root;
                }
            }
        }
        self.set_color(x, Color::Black);
    }
}
