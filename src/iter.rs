//! Stateful cursor over the tree.
//!
//! The tree stores no parent pointers, so the cursor carries its own
//! ancestry: a stack of (node, child index) frames for the path from the
//! root, plus a byte buffer holding the key of the current position.
//! Moving down pushes a frame and appends that hop's edge bytes; moving
//! up pops and truncates. Every advance is plain stack arithmetic, with
//! no allocation beyond growing the two buffers.
//!
//! A seek positions the cursor either on an exact node boundary or on a
//! synthetic spot inside the tree (a mismatch point), and then rides the
//! same next/prev stepping the public methods use to reach the first key
//! satisfying the operator.

use std::str::FromStr;

use rand::Rng;
use smallvec::SmallVec;

use crate::node::NodeId;
use crate::tree::RadixTree;
use crate::TreeError;

/// One hop of the cursor's path: the ancestor node and the child index
/// the path continues through. Compressed nodes only have index 0.
#[derive(Clone, Copy)]
struct Frame {
    node: NodeId,
    child: usize,
}

/// Comparison operator for [`Iter::seek`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeekOp {
    /// Position on the smallest key. The seek key is ignored.
    First,
    /// Position on the greatest key. The seek key is ignored.
    Last,
    /// Position on the key itself, or hit end-of-iteration.
    Eq,
    /// Smallest key greater than or equal to the seek key.
    Ge,
    /// Smallest key strictly greater than the seek key.
    Gt,
    /// Greatest key less than or equal to the seek key.
    Le,
    /// Greatest key strictly less than the seek key.
    Lt,
}

impl FromStr for SeekOp {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "^" => Ok(SeekOp::First),
            "$" => Ok(SeekOp::Last),
            "=" | "==" => Ok(SeekOp::Eq),
            ">=" => Ok(SeekOp::Ge),
            ">" => Ok(SeekOp::Gt),
            "<=" => Ok(SeekOp::Le),
            "<" => Ok(SeekOp::Lt),
            _ => Err(TreeError::InvalidSeekOp),
        }
    }
}

/// A cursor over a [`RadixTree`], created by [`RadixTree::cursor`].
///
/// Freshly created cursors are not positioned; call one of the seek
/// methods (or [`random_walk`](Iter::random_walk)) first. After a
/// successful seek the first [`next_key`](Iter::next_key) or
/// [`prev_key`](Iter::prev_key) call reports the seeked key itself and
/// later calls move off it. Hitting either end is sticky until the next
/// seek.
///
/// The cursor borrows the tree immutably, so the borrow checker rules
/// out mutation while one is alive.
pub struct Iter<'a, V> {
    tree: &'a RadixTree<V>,
    node: NodeId,
    key: Vec<u8>,
    stack: SmallVec<[Frame; 32]>,
    eof: bool,
    just_seeked: bool,
}

impl<'a, V> Iter<'a, V> {
    pub(crate) fn new(tree: &'a RadixTree<V>) -> Self {
        Iter {
            tree,
            node: NodeId::ROOT,
            key: Vec::new(),
            stack: SmallVec::new(),
            eof: true,
            just_seeked: false,
        }
    }

    /// The key of the current position. Empty and meaningless before the
    /// first successful seek.
    #[inline]
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// The value at the current position, if the cursor sits on a key.
    #[inline]
    pub fn value(&self) -> Option<&'a V> {
        self.tree.node(self.node).value.as_ref()
    }

    fn reset(&mut self) {
        self.node = NodeId::ROOT;
        self.key.clear();
        self.stack.clear();
        self.eof = false;
        self.just_seeked = false;
    }

    fn hit_end(&mut self) -> bool {
        self.eof = true;
        false
    }

    fn positioned(&mut self) -> bool {
        self.just_seeked = true;
        true
    }

    /// Move into child `idx` of the current node, extending the key
    /// buffer with the bytes that hop contributes.
    fn push_down(&mut self, idx: usize) {
        let n = self.tree.node(self.node);
        self.stack.push(Frame {
            node: self.node,
            child: idx,
        });
        if n.compressed {
            debug_assert_eq!(idx, 0);
            self.key.extend_from_slice(&n.edges);
        } else {
            self.key.push(n.edges[idx]);
        }
        self.node = n.children[idx];
    }

    /// Move back to the parent, trimming that hop's bytes off the key
    /// buffer. Returns the popped frame.
    fn pop_up(&mut self) -> Option<Frame> {
        let frame = self.stack.pop()?;
        let n = self.tree.node(frame.node);
        let hop = if n.compressed { n.edges.len() } else { 1 };
        self.key.truncate(self.key.len() - hop);
        self.node = frame.node;
        Some(frame)
    }

    /// Descend along smallest children until a key node is reached. The
    /// current node itself does not count.
    fn descend_min(&mut self) -> bool {
        while !self.tree.node(self.node).is_leaf() {
            self.push_down(0);
            if self.tree.node(self.node).is_key() {
                return true;
            }
        }
        false
    }

    /// Descend along greatest children to the bottom of the subtree,
    /// which is always a key node.
    fn descend_max(&mut self) -> bool {
        loop {
            let n = self.tree.node(self.node);
            if n.is_leaf() {
                return n.is_key();
            }
            self.push_down(n.children.len() - 1);
        }
    }

    /// Enter child `idx` and stop on the first key at or below it.
    fn enter_min(&mut self, idx: usize) -> bool {
        self.push_down(idx);
        self.tree.node(self.node).is_key() || self.descend_min()
    }

    /// Enter child `idx` and run to the greatest key below it.
    fn enter_max(&mut self, idx: usize) -> bool {
        self.push_down(idx);
        self.descend_max()
    }

    /// Climb until an ancestor offers an unexplored next sibling, then
    /// take it and find the smallest key there.
    fn ascend_next(&mut self) -> bool {
        while let Some(frame) = self.pop_up() {
            let n = self.tree.node(frame.node);
            if !n.compressed && frame.child + 1 < n.children.len() {
                return self.enter_min(frame.child + 1);
            }
        }
        false
    }

    /// Climb looking for a previous sibling subtree or an ancestor that
    /// is itself a key. An ancestor's own key precedes its subtree, so
    /// it is checked after its earlier children are ruled out.
    fn ascend_prev(&mut self) -> bool {
        while let Some(frame) = self.pop_up() {
            let n = self.tree.node(frame.node);
            if !n.compressed && frame.child > 0 {
                return self.enter_max(frame.child - 1);
            }
            if n.is_key() {
                return true;
            }
        }
        false
    }

    /// One forward step from a visited position: the smallest key in the
    /// current subtree, else the next one found by climbing.
    fn step_forward(&mut self) -> bool {
        if !self.tree.node(self.node).is_leaf() {
            self.enter_min(0)
        } else {
            self.ascend_next()
        }
    }

    /// One backward step from a visited position. The predecessor is
    /// never below the current node, so this only climbs.
    fn step_backward(&mut self) -> bool {
        self.ascend_prev()
    }

    /// Advance to the next key in ascending order. Returns `false` at
    /// the end of the iteration.
    pub fn next_key(&mut self) -> bool {
        if self.eof {
            return false;
        }
        if self.just_seeked {
            self.just_seeked = false;
            return true;
        }
        self.step_forward() || self.hit_end()
    }

    /// Step back to the previous key in descending order. Returns
    /// `false` at the end of the iteration.
    pub fn prev_key(&mut self) -> bool {
        if self.eof {
            return false;
        }
        if self.just_seeked {
            self.just_seeked = false;
            return true;
        }
        self.step_backward() || self.hit_end()
    }

    /// Position the cursor relative to `key` according to `op`.
    ///
    /// Returns `true` when a matching key exists; `false` leaves the
    /// cursor at end-of-iteration. For `First` and `Last` the key is
    /// ignored.
    pub fn seek(&mut self, op: SeekOp, key: &[u8]) -> bool {
        self.reset();
        if self.tree.is_empty() {
            return self.hit_end();
        }
        match op {
            SeekOp::First => {
                if self.tree.node(self.node).is_key() || self.descend_min() {
                    self.positioned()
                } else {
                    self.hit_end()
                }
            }
            SeekOp::Last => {
                if self.descend_max() {
                    self.positioned()
                } else {
                    self.hit_end()
                }
            }
            _ => self.seek_relative(op, key),
        }
    }

    /// Seek with a textual operator (`^ $ == >= <= > <`). An operator
    /// that parses to nothing positions at end-of-iteration, like any
    /// other unsatisfiable seek.
    pub fn seek_str(&mut self, op: &str, key: &[u8]) -> bool {
        match op.parse() {
            Ok(op) => self.seek(op, key),
            Err(_) => {
                self.reset();
                self.hit_end()
            }
        }
    }

    fn seek_relative(&mut self, op: SeekOp, key: &[u8]) -> bool {
        let (matched, split) = self.walk_frames(key);
        let n = self.tree.node(self.node);

        let on_boundary = !n.compressed || split == 0;
        if matched == key.len() && on_boundary && n.is_key() {
            // Exact hit. Inclusive operators stop here; the strict ones
            // take one step off it.
            return match op {
                SeekOp::Eq | SeekOp::Ge | SeekOp::Le => self.positioned(),
                SeekOp::Gt => {
                    if self.step_forward() {
                        self.positioned()
                    } else {
                        self.hit_end()
                    }
                }
                SeekOp::Lt => {
                    if self.step_backward() {
                        self.positioned()
                    } else {
                        self.hit_end()
                    }
                }
                SeekOp::First | SeekOp::Last => unreachable!("handled by seek"),
            };
        }
        if op == SeekOp::Eq {
            return self.hit_end();
        }

        let greater = matches!(op, SeekOp::Gt | SeekOp::Ge);
        let found = if matched == key.len() {
            if !on_boundary {
                // The key ran out inside this node's run, so the whole
                // subtree sorts after it and the node's own key (a strict
                // prefix of the seek key) sorts before it.
                if greater {
                    self.enter_min(0)
                } else if n.is_key() {
                    true
                } else {
                    self.ascend_prev()
                }
            } else {
                // On the boundary of a non-key node: its subtree holds
                // everything greater, its surroundings everything less.
                if greater {
                    self.enter_min(0)
                } else {
                    self.ascend_prev()
                }
            }
        } else if n.compressed {
            // Mismatch inside a compressed run decides the order of the
            // whole subtree at once.
            if n.edges[split] > key[matched] {
                if greater {
                    self.enter_min(0)
                } else if n.is_key() {
                    true
                } else {
                    self.ascend_prev()
                }
            } else if greater {
                self.ascend_next()
            } else {
                self.enter_max(0)
            }
        } else {
            // Branch node without a child for the next key byte: pick the
            // nearest edge on the wanted side.
            let c = key[matched];
            if greater {
                let idx = n.edges.partition_point(|&e| e <= c);
                if idx < n.edges.len() {
                    self.enter_min(idx)
                } else {
                    self.ascend_next()
                }
            } else {
                let idx = n.edges.partition_point(|&e| e < c);
                if idx > 0 {
                    self.enter_max(idx - 1)
                } else if n.is_key() {
                    true
                } else {
                    self.ascend_prev()
                }
            }
        };
        if found {
            self.positioned()
        } else {
            self.hit_end()
        }
    }

    /// Walk toward `key` recording frames, leaving the cursor's key
    /// buffer holding the path into the stop node. Returns the matched
    /// byte count and the split offset inside a compressed stop node.
    fn walk_frames(&mut self, key: &[u8]) -> (usize, usize) {
        let mut i = 0usize;
        let mut j = 0usize;
        loop {
            let n = self.tree.node(self.node);
            if n.edges.is_empty() || i == key.len() {
                break;
            }
            let idx;
            if n.compressed {
                j = 0;
                while j < n.edges.len() && i < key.len() && n.edges[j] == key[i] {
                    j += 1;
                    i += 1;
                }
                if j != n.edges.len() {
                    break;
                }
                idx = 0;
            } else {
                match n.find_child(key[i]) {
                    Some(found) => {
                        i += 1;
                        idx = found;
                    }
                    None => {
                        j = 0;
                        break;
                    }
                }
            }
            self.push_down(idx);
            j = 0;
        }
        (i, j)
    }

    /// Wander `steps` random moves from the current position (the root
    /// when unpositioned), going to the parent or a uniformly chosen
    /// child at each move, and stop on the first key node reached once
    /// the budget is spent. With `steps == 0` a budget is derived from
    /// the tree size. Returns `false` on an empty tree.
    pub fn random_walk<R: Rng + ?Sized>(&mut self, rng: &mut R, steps: usize) -> bool {
        if self.tree.is_empty() {
            self.eof = true;
            return false;
        }
        let mut steps = if steps == 0 {
            let spread = (2.0 * (self.tree.len() as f64).ln()).floor() as usize;
            1 + rng.gen_range(0..spread.max(1))
        } else {
            steps
        };
        self.eof = false;
        self.just_seeked = false;

        loop {
            let n = self.tree.node(self.node);
            if steps == 0 && n.is_key() {
                return true;
            }
            let moves = n.children.len() + usize::from(!self.stack.is_empty());
            if moves == 0 {
                // A lone key at the root has no neighbors to wander to.
                return n.is_key();
            }
            let r = rng.gen_range(0..moves);
            if r == n.children.len() {
                let _ = self.pop_up();
            } else {
                let idx = if n.compressed { 0 } else { r };
                self.push_down(idx);
            }
            if self.tree.node(self.node).is_key() {
                steps = steps.saturating_sub(1);
            }
        }
    }
}

/// Forward-order iterator over whole entries, created by
/// [`RadixTree::iter`]. Keys are materialized per step since the cursor
/// reuses one path buffer.
pub struct Entries<'a, V> {
    cursor: Iter<'a, V>,
    started: bool,
}

impl<'a, V> Entries<'a, V> {
    pub(crate) fn new(tree: &'a RadixTree<V>) -> Self {
        Entries {
            cursor: Iter::new(tree),
            started: false,
        }
    }
}

impl<'a, V> Iterator for Entries<'a, V> {
    type Item = (Vec<u8>, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let more = if self.started {
            self.cursor.next_key()
        } else {
            self.started = true;
            self.cursor.seek(SeekOp::First, b"") && self.cursor.next_key()
        };
        if !more {
            return None;
        }
        Some((self.cursor.key().to_vec(), self.cursor.value()?))
    }
}

/// Iterator over the entries of a half-open key range, created by
/// [`RadixTree::range`].
pub struct Range<'a, V> {
    cursor: Iter<'a, V>,
    end: Vec<u8>,
    done: bool,
}

impl<'a, V> Iterator for Range<'a, V> {
    type Item = (Vec<u8>, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if !self.cursor.next_key() || self.cursor.key() >= &self.end[..] {
            self.done = true;
            return None;
        }
        Some((self.cursor.key().to_vec(), self.cursor.value()?))
    }
}

/// Iterator over the entries below one key prefix, created by
/// [`RadixTree::scan_prefix`].
pub struct ScanPrefix<'a, V> {
    cursor: Iter<'a, V>,
    prefix: Vec<u8>,
    done: bool,
}

impl<'a, V> Iterator for ScanPrefix<'a, V> {
    type Item = (Vec<u8>, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if !self.cursor.next_key() || !self.cursor.key().starts_with(&self.prefix) {
            self.done = true;
            return None;
        }
        Some((self.cursor.key().to_vec(), self.cursor.value()?))
    }
}

impl<V> RadixTree<V> {
    /// Start an unpositioned cursor; call [`Iter::seek`] to place it.
    pub fn cursor(&self) -> Iter<'_, V> {
        Iter::new(self)
    }

    /// Iterate every entry in ascending key order.
    pub fn iter(&self) -> Entries<'_, V> {
        Entries::new(self)
    }

    /// Iterate the entries with `start <= key < end`, ascending.
    pub fn range(&self, start: &[u8], end: &[u8]) -> Range<'_, V> {
        let mut cursor = Iter::new(self);
        cursor.seek(SeekOp::Ge, start);
        Range {
            cursor,
            end: end.to_vec(),
            done: false,
        }
    }

    /// Iterate the entries whose keys start with `prefix`, ascending.
    /// A key equal to the prefix is included.
    pub fn scan_prefix(&self, prefix: &[u8]) -> ScanPrefix<'_, V> {
        let mut cursor = Iter::new(self);
        cursor.seek(SeekOp::Ge, prefix);
        ScanPrefix {
            cursor,
            prefix: prefix.to_vec(),
            done: false,
        }
    }

    /// The smallest entry, or `None` on an empty tree.
    pub fn first(&self) -> Option<(Vec<u8>, &V)> {
        let mut cursor = Iter::new(self);
        if cursor.seek(SeekOp::First, b"") && cursor.next_key() {
            Some((cursor.key().to_vec(), cursor.value()?))
        } else {
            None
        }
    }

    /// The greatest entry, or `None` on an empty tree.
    pub fn last(&self) -> Option<(Vec<u8>, &V)> {
        let mut cursor = Iter::new(self);
        if cursor.seek(SeekOp::Last, b"") && cursor.next_key() {
            Some((cursor.key().to_vec(), cursor.value()?))
        } else {
            None
        }
    }
}

impl<'a, V> IntoIterator for &'a RadixTree<V> {
    type Item = (Vec<u8>, &'a V);
    type IntoIter = Entries<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
