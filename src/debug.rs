//! Diagnostics: an ASCII rendering of the tree and a structural checker.

use std::collections::HashSet;
use std::fmt;
use std::fmt::Write as _;

use crate::node::NodeId;
use crate::tree::{RadixTree, MAX_COMPRESSED_EDGE};

impl<V: fmt::Debug> RadixTree<V> {
    /// Render the tree as ASCII, one cell per node:
    ///
    /// ```text
    /// "foo" -> [bt]
    ///           `-(b) "ar" -> []=1
    ///           `-(t) "er" -> []=2
    /// ```
    ///
    /// Compressed runs print in quotes, branch nodes in brackets, and
    /// `=value` marks a key node. Purely diagnostic; nothing parses this
    /// back.
    pub fn show(&self) -> String {
        let mut out = String::new();
        self.show_node(&mut out, NodeId::ROOT, 0, 0);
        out.push('\n');
        out
    }

    fn show_node(&self, out: &mut String, id: NodeId, level: usize, mut lpad: usize) {
        let n = self.node(id);
        let (open, close) = if n.compressed { ('"', '"') } else { ('[', ']') };
        let mut cell = format!("{}{}{}", open, n.edges.escape_ascii(), close);
        if let Some(v) = &n.value {
            let _ = write!(cell, "={:?}", v);
        }
        out.push_str(&cell);

        let single = n.children.len() == 1;
        if level > 0 {
            // Keep child lines aligned under their branch marker. The 7
            // and 4 are the widths of " `-(x) " and " -> ".
            lpad += if single { 4 + cell.len() } else { 7 };
        }
        for (i, &child) in n.children.iter().enumerate() {
            if single {
                out.push_str(" -> ");
            } else {
                out.push('\n');
                out.push_str(&" ".repeat(lpad));
                let _ = write!(out, " `-({}) ", n.edges[i].escape_ascii());
            }
            self.show_node(out, child, level + 1, lpad);
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for RadixTree<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RadixTree(len={}) {}", self.len(), self.show())
    }
}

impl<V> RadixTree<V> {
    /// Check every structural invariant, returning a description of each
    /// violation found. An empty result means the tree is sound. Meant
    /// for tests and troubleshooting, not hot paths.
    pub fn check_invariants(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut keys = 0usize;
        let mut visited = 0usize;
        self.check_node(NodeId::ROOT, &mut seen, &mut keys, &mut visited, &mut issues);

        if keys != self.len() {
            issues.push(format!(
                "element count is {} but {} key nodes exist",
                self.len(),
                keys
            ));
        }
        if visited != self.node_count() {
            issues.push(format!(
                "node count is {} but {} nodes are reachable",
                self.node_count(),
                visited
            ));
        }
        issues
    }

    fn check_node(
        &self,
        id: NodeId,
        seen: &mut HashSet<NodeId>,
        keys: &mut usize,
        visited: &mut usize,
        issues: &mut Vec<String>,
    ) {
        if !seen.insert(id) {
            issues.push(format!("node {:?} reached through two parents", id));
            return;
        }
        *visited += 1;
        let n = self.node(id);
        if n.is_key() {
            *keys += 1;
        }

        if n.compressed {
            if n.edges.len() < 2 {
                issues.push(format!("compressed node {:?} holds a run of {}", id, n.edges.len()));
            }
            if n.children.len() != 1 {
                issues.push(format!(
                    "compressed node {:?} has {} children",
                    id,
                    n.children.len()
                ));
            }
        } else {
            if n.edges.len() != n.children.len() {
                issues.push(format!(
                    "branch node {:?} has {} edges for {} children",
                    id,
                    n.edges.len(),
                    n.children.len()
                ));
            }
            if !n.edges.windows(2).all(|w| w[0] < w[1]) {
                issues.push(format!("branch node {:?} edges are not ascending", id));
            }
        }

        if n.is_leaf() && !n.is_key() && id != NodeId::ROOT {
            issues.push(format!("leaf {:?} terminates no key", id));
        }

        if n.is_collapsible() {
            let child = self.node(n.children[0]);
            // Two adjacent collapsible nodes are only legal when merging
            // them would overflow the per-node run cap.
            if child.is_collapsible()
                && n.edges.len() + child.edges.len() <= MAX_COMPRESSED_EDGE
            {
                issues.push(format!(
                    "node {:?} and its child form an uncompressed chain",
                    id
                ));
            }
        }

        for &child in &n.children {
            self.check_node(child, seen, keys, visited, issues);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_show_renders_runs_and_branches() {
        let mut tree = RadixTree::new();
        tree.insert(b"foobar", 1u64).unwrap();
        tree.insert(b"footer", 2u64).unwrap();

        let out = tree.show();
        assert!(out.contains("\"foo\""), "missing shared run: {out}");
        assert!(out.contains("`-(b)"), "missing branch marker: {out}");
        assert!(out.contains("=1"), "missing key value: {out}");
    }

    #[test]
    fn test_show_escapes_binary_edges() {
        let mut tree = RadixTree::new();
        tree.insert(&[0x00, 0xff, b'a'], 1u64).unwrap();
        let out = tree.show();
        assert!(out.contains("\\x00"), "unescaped bytes: {out}");
    }

    #[test]
    fn test_checker_accepts_fresh_and_populated_trees() {
        let mut tree = RadixTree::new();
        assert!(tree.check_invariants().is_empty());
        for w in [&b"car"[..], b"cart", b"cargo", b"dog"] {
            tree.insert(w, 0u64).unwrap();
            assert!(tree.check_invariants().is_empty());
        }
    }
}
