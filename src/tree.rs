//! The tree container and its mutation engine.
//!
//! Every mutating operation starts with the same walk: follow the key
//! byte by byte from the root, through branch edges and compressed runs,
//! and report where the walk stopped. Insertion then restructures the
//! stop node locally (splitting a compressed run when the key diverges
//! inside one); deletion prunes orphaned nodes upward and folds any
//! single-child chain it leaves behind back into one compressed run, so
//! the tree is always maximally compressed between operations.
//!
//! Nodes never move: a split or trim rewrites the stop node inside its
//! arena slot, so parent links stay valid without any fixup pass.

use smallvec::SmallVec;

use crate::node::{Node, NodeArena, NodeId};
use crate::TreeError;

/// Longest run of bytes a single compressed node created by insertion
/// will carry. Longer suffixes become a chain of compressed nodes. The
/// exact value only affects how aggressively chains are packed.
pub(crate) const MAX_COMPRESSED_EDGE: usize = 255;

/// Parent nodes remembered while walking down, so deletion can walk back
/// up. Sized to stay inline for any realistically deep walk and to spill
/// to the heap past that.
pub(crate) type ParentStack = SmallVec<[NodeId; 32]>;

/// Where a walk stopped.
///
/// `matched` counts the key bytes consumed. `matched == key.len()` means
/// the whole key was walked, though `stop` is not necessarily a key node.
/// When the walk ended inside a compressed node, `split` is the offset of
/// the first unmatched byte of its run; at a node boundary it is 0.
pub(crate) struct Walk {
    pub(crate) matched: usize,
    pub(crate) stop: NodeId,
    pub(crate) split: usize,
}

/// An ordered map from byte strings to values, stored as a compressed
/// radix tree.
///
/// Keys are ordered bytewise as unsigned integers, with a shorter key
/// sorting before every longer key it prefixes. Runs of single-child
/// nodes are packed into one compressed node, so common prefixes are
/// stored once and the per-key overhead stays small.
///
/// A key may be the empty byte string. Values are owned by the tree;
/// callers that need a "present but empty" payload can use an `Option`
/// value type.
pub struct RadixTree<V> {
    arena: NodeArena<V>,
    num_elements: usize,
}

/// Shape counters for one tree, gathered by [`RadixTree::stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeStats {
    /// Number of keys stored.
    pub elements: usize,
    /// Number of live nodes, root included.
    pub nodes: usize,
    /// How many of those nodes are compressed runs.
    pub compressed_nodes: usize,
    /// Total edge bytes held across all nodes.
    pub edge_bytes: usize,
}

impl<V> RadixTree<V> {
    /// Create an empty tree.
    pub fn new() -> Self {
        RadixTree {
            arena: NodeArena::new(),
            num_elements: 0,
        }
    }

    /// Number of keys in the tree.
    #[inline]
    pub fn len(&self) -> usize {
        self.num_elements
    }

    /// `true` if the tree holds no keys.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_elements == 0
    }

    /// Number of live nodes, root included. Always at least 1.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.arena.live()
    }

    #[inline]
    pub(crate) fn node(&self, id: NodeId) -> &Node<V> {
        self.arena.node(id)
    }

    /// Walk the tree following `key`, pushing each parent onto `stack`
    /// before descending out of it.
    pub(crate) fn walk_state(&self, key: &[u8], mut stack: Option<&mut ParentStack>) -> Walk {
        let mut h = NodeId::ROOT;
        let mut i = 0usize;
        let mut j = 0usize;
        loop {
            let n = self.arena.node(h);
            if n.edges.is_empty() || i == key.len() {
                break;
            }
            let child_idx;
            if n.compressed {
                j = 0;
                while j < n.edges.len() && i < key.len() && n.edges[j] == key[i] {
                    j += 1;
                    i += 1;
                }
                if j != n.edges.len() {
                    break;
                }
                child_idx = 0;
            } else {
                match n.find_child(key[i]) {
                    Some(idx) => {
                        i += 1;
                        child_idx = idx;
                    }
                    None => {
                        j = 0;
                        break;
                    }
                }
            }
            if let Some(s) = stack.as_deref_mut() {
                s.push(h);
            }
            h = n.children[child_idx];
            // Descending resets the split offset: if the loop exits right
            // at the top of a compressed child, the consumed string is the
            // path into it, not part of its run.
            j = 0;
        }
        Walk {
            matched: i,
            stop: h,
            split: j,
        }
    }

    /// Look up `key`. `None` means the key is not present.
    pub fn get(&self, key: &[u8]) -> Option<&V> {
        let walk = self.walk_state(key, None);
        let n = self.arena.node(walk.stop);
        if walk.matched != key.len() || (n.compressed && walk.split != 0) {
            return None;
        }
        n.value.as_ref()
    }

    /// Look up `key` and allow updating its value in place.
    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut V> {
        let walk = self.walk_state(key, None);
        let n = self.arena.node(walk.stop);
        if walk.matched != key.len() || (n.compressed && walk.split != 0) {
            return None;
        }
        self.arena.node_mut(walk.stop).value.as_mut()
    }

    /// `true` if `key` is stored in the tree.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Insert `key` with `value`.
    ///
    /// Returns `Ok(None)` when the key is new and `Ok(Some(old))` when an
    /// existing key was updated. On `Err(TreeError::OutOfMemory)` the
    /// tree is unchanged: all node slots a restructuring could need are
    /// reserved before the first node is touched.
    pub fn insert(&mut self, key: &[u8], value: V) -> Result<Option<V>, TreeError> {
        let walk = self.walk_state(key, None);
        let mut h = walk.stop;
        let mut i = walk.matched;

        // The whole key was consumed and we are at a node boundary: the
        // stop node either already is our key or becomes it.
        {
            let n = self.arena.node(walk.stop);
            if i == key.len() && (!n.compressed || walk.split == 0) {
                let n = self.arena.node_mut(walk.stop);
                if n.is_key() {
                    return Ok(n.value.replace(value));
                }
                n.value = Some(value);
                self.num_elements += 1;
                return Ok(None);
            }
        }

        // The walk stopped short, so nodes will be created. Grab every
        // slot this insert could need before touching the tree.
        let remaining = key.len() - i;
        self.arena.reserve(4 + remaining / MAX_COMPRESSED_EDGE)?;

        let stop_compressed = self.arena.node(walk.stop).compressed;
        if stop_compressed && i < key.len() {
            // Mismatch inside a compressed run. Break the run at the
            // mismatch offset `j`. With the run "border" and a key
            // diverging at offset 2, the result is
            //
            //   "bo" -> [r] -> "der" -> (old child)
            //
            // and the append loop below hangs the key's own suffix off
            // the new [r] branch point.
            let j = walk.split;
            let (edge, next) = {
                let n = self.arena.node(walk.stop);
                (n.edges.clone(), n.children[0])
            };

            let postfix_len = edge.len() - j - 1;
            let postfix = if postfix_len > 0 {
                self.arena.alloc(Node {
                    edges: edge[j + 1..].to_vec(),
                    children: vec![next],
                    compressed: postfix_len > 1,
                    value: None,
                })
            } else {
                next
            };

            if j == 0 {
                // The run diverges at its first byte: the stop node
                // itself becomes the branch point, keeping its key
                // status and value.
                let n = self.arena.node_mut(walk.stop);
                n.edges.clear();
                n.edges.push(edge[0]);
                n.children.clear();
                n.children.push(postfix);
                n.compressed = false;
                h = walk.stop;
            } else {
                let split_node = self.arena.alloc(Node {
                    edges: vec![edge[j]],
                    children: vec![postfix],
                    compressed: false,
                    value: None,
                });
                let n = self.arena.node_mut(walk.stop);
                n.edges.truncate(j);
                n.compressed = j > 1;
                n.children.clear();
                n.children.push(split_node);
                h = split_node;
            }
        } else if stop_compressed {
            // The key ran out inside a compressed run (`i == key.len()`,
            // split > 0): the key is a proper prefix of the run. Cut the
            // run in two. The lower half keeps the old child and carries
            // the new value; the upper half keeps the old key status.
            let j = walk.split;
            let (edge, next) = {
                let n = self.arena.node(walk.stop);
                (n.edges.clone(), n.children[0])
            };

            let postfix_len = edge.len() - j;
            let postfix = self.arena.alloc(Node {
                edges: edge[j..].to_vec(),
                children: vec![next],
                compressed: postfix_len > 1,
                value: Some(value),
            });
            let n = self.arena.node_mut(walk.stop);
            n.edges.truncate(j);
            n.compressed = j > 1;
            n.children.clear();
            n.children.push(postfix);
            self.num_elements += 1;
            return Ok(None);
        }

        // Append the unmatched suffix below `h`: a fresh compressed run
        // whenever more than one byte remains under an empty node, a
        // single branch edge otherwise.
        while i < key.len() {
            if self.arena.node(h).is_leaf() && key.len() - i > 1 {
                let take = (key.len() - i).min(MAX_COMPRESSED_EDGE);
                let child = self.arena.alloc(Node::leaf());
                let n = self.arena.node_mut(h);
                n.edges.extend_from_slice(&key[i..i + take]);
                n.children.push(child);
                n.compressed = true;
                i += take;
                h = child;
            } else {
                let child = self.add_child(h, key[i]);
                i += 1;
                h = child;
            }
        }

        let n = self.arena.node_mut(h);
        if !n.is_key() {
            self.num_elements += 1;
        }
        n.value = Some(value);
        Ok(None)
    }

    /// Hang a fresh leaf off `parent` under edge byte `c`, keeping the
    /// edge bytes ascending.
    fn add_child(&mut self, parent: NodeId, c: u8) -> NodeId {
        let child = self.arena.alloc(Node::leaf());
        let n = self.arena.node_mut(parent);
        debug_assert!(!n.compressed);
        let pos = n.edges.partition_point(|&e| e < c);
        debug_assert!(
            pos == n.edges.len() || n.edges[pos] != c,
            "edge byte already present"
        );
        n.edges.insert(pos, c);
        n.children.insert(pos, child);
        child
    }

    /// Remove `key`, returning its value if it was present.
    pub fn remove(&mut self, key: &[u8]) -> Option<V> {
        let mut stack = ParentStack::new();
        let walk = self.walk_state(key, Some(&mut stack));
        {
            let n = self.arena.node(walk.stop);
            if walk.matched != key.len() || (n.compressed && walk.split != 0) || !n.is_key() {
                return None;
            }
        }
        let old = self.arena.node_mut(walk.stop).value.take();
        self.num_elements -= 1;

        let mut try_compress = false;
        let mut h = walk.stop;

        if self.arena.node(walk.stop).is_leaf() {
            // The key node has no subtree below it, so it and any chain
            // of nodes that existed only to reach it are garbage. Free
            // upward until a node that is a key or a real branch point.
            let mut freed: Option<NodeId> = None;
            let mut cur = walk.stop;
            while cur != NodeId::ROOT {
                freed = Some(cur);
                self.arena.free(cur);
                cur = stack.pop().expect("non-root node missing a parent");
                let n = self.arena.node(cur);
                if n.is_key() || (!n.compressed && n.children.len() != 1) {
                    break;
                }
            }
            if let Some(freed) = freed {
                self.remove_child(cur, freed);
                let n = self.arena.node(cur);
                if n.is_collapsible() {
                    try_compress = true;
                    h = cur;
                }
            }
        } else if self.arena.node(walk.stop).children.len() == 1 {
            // The node just lost its key status and has one child, so it
            // may now fold into the chain around it.
            try_compress = true;
        }

        if try_compress {
            self.recompress(h, &mut stack);
        }
        old
    }

    /// Drop the edge of `parent` pointing at `child`. A compressed
    /// parent degrades to an empty branch node, keeping its key status.
    fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        let n = self.arena.node_mut(parent);
        if n.compressed {
            debug_assert_eq!(n.children, [child]);
            n.edges.clear();
            n.children.clear();
            n.compressed = false;
        } else {
            let idx = n
                .children
                .iter()
                .position(|&c| c == child)
                .expect("child not linked from parent");
            n.edges.remove(idx);
            n.children.remove(idx);
        }
    }

    /// Fold the single-child chain around `h` back into one compressed
    /// node. `stack` holds the ancestors of `h`, deepest last.
    ///
    /// Climbs to the highest non-key single-child node, then scans the
    /// chain downward collecting edge bytes until the first key node,
    /// branch point, or leaf. The collected run is written into the top
    /// node's slot in place and the rest of the chain is freed, so this
    /// never allocates and therefore never fails.
    fn recompress(&mut self, mut h: NodeId, stack: &mut ParentStack) {
        while let Some(p) = stack.pop() {
            let n = self.arena.node(p);
            if n.is_key() || (!n.compressed && n.children.len() != 1) {
                break;
            }
            h = p;
        }

        let start = h;
        let mut run = self.arena.node(start).edges.clone();
        let mut chain: Vec<NodeId> = Vec::new();
        let mut attach = None;
        let mut tail = start;
        loop {
            let n = self.arena.node(tail);
            let Some(&next) = n.children.last() else {
                break;
            };
            let nn = self.arena.node(next);
            if nn.is_key() || (!nn.compressed && nn.children.len() != 1) {
                attach = Some(next);
                break;
            }
            run.extend_from_slice(&nn.edges);
            chain.push(next);
            tail = next;
        }

        // A chain of one node is already as compressed as it gets.
        if chain.is_empty() {
            return;
        }
        let attach = attach.expect("chain ended without a node to attach");
        for id in chain {
            self.arena.free(id);
        }
        let n = self.arena.node_mut(start);
        n.edges = run;
        n.children.clear();
        n.children.push(attach);
        n.compressed = true;
    }

    /// Drop every key and node, leaving a fresh empty tree.
    pub fn clear(&mut self) {
        self.arena = NodeArena::new();
        self.num_elements = 0;
    }

    /// Gather shape counters by scanning every live node.
    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats {
            elements: self.num_elements,
            ..TreeStats::default()
        };
        let mut pending = vec![NodeId::ROOT];
        while let Some(id) = pending.pop() {
            let n = self.arena.node(id);
            stats.nodes += 1;
            stats.edge_bytes += n.edges.len();
            if n.compressed {
                stats.compressed_nodes += 1;
            }
            pending.extend_from_slice(&n.children);
        }
        stats
    }
}

impl<V> Default for RadixTree<V> {
    fn default() -> Self {
        Self::new()
    }
}
