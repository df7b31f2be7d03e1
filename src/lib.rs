//! # radixmap
//!
//! A memory-compact ordered map over byte-string keys, backed by a
//! compressed radix tree.
//!
//! Runs of single-child nodes are packed into one node carrying the
//! whole byte run, so shared prefixes are stored once and deep chains
//! collapse to a handful of nodes. Keys order bytewise as unsigned
//! integers, which gives:
//!
//! - **Point ops**: insert, lookup, and remove in O(key length).
//! - **Ordered iteration**: forward and backward, with allocation-free
//!   stepping over a cursor-held key buffer.
//! - **Relative seeks**: position a cursor at the first/last key or
//!   relative to an arbitrary pivot (`== >= <= > <`).
//! - **Random walks**: uniform neighbor steps for sampling keys.
//!
//! Deletion re-compresses any chain it exposes, so the tree stays
//! maximally packed between operations.
//!
//! ## Example
//!
//! ```rust
//! use radixmap::{RadixTree, SeekOp};
//!
//! let mut tree = RadixTree::new();
//! tree.insert(b"user:1001", 41u64).unwrap();
//! tree.insert(b"user:1002", 42u64).unwrap();
//! tree.insert(b"post:9", 7u64).unwrap();
//!
//! assert_eq!(tree.get(b"user:1002"), Some(&42));
//!
//! // Ordered iteration over everything.
//! let keys: Vec<Vec<u8>> = tree.iter().map(|(k, _)| k).collect();
//! assert_eq!(keys[0], b"post:9");
//!
//! // Seek to the first key at or after a pivot.
//! let mut cursor = tree.cursor();
//! assert!(cursor.seek(SeekOp::Ge, b"user:"));
//! assert!(cursor.next_key());
//! assert_eq!(cursor.key(), b"user:1001");
//! ```
//!
//! The tree is single-threaded: it has no interior synchronization, and
//! cursors borrow it immutably so the borrow checker rules out mutation
//! during iteration.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod debug;
mod iter;
mod node;
mod tree;

#[cfg(test)]
mod proptests;

pub use iter::{Entries, Iter, Range, ScanPrefix, SeekOp};
pub use tree::{RadixTree, TreeStats};

use thiserror::Error;

/// Errors reported by tree operations.
///
/// Lookups signal absence with `None` rather than an error, and removing
/// a missing key is an ordinary `None` return as well.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeError {
    /// An internal allocation failed. The tree is left exactly as it was
    /// before the failing call.
    #[error("out of memory while growing the tree")]
    OutOfMemory,
    /// A textual seek operator was not one of `^ $ == >= <= > <`.
    #[error("unknown seek operator")]
    InvalidSeekOp,
}
