//! Single-file disk-backed B+ tree index engine.
//!
//! This crate provides:
//! - Pager for page-level file I/O
//! - Leaf and internal node page codecs
//! - B+ tree with insert/overwrite, point lookup, inclusive range
//!   scans over the leaf chain, and point deletion

mod node;
mod pager;
mod tree;

pub use node::{InternalPage, LeafPage, Node, INTERNAL_MAX_KEYS, LEAF_MAX_KEYS};
pub use pager::Pager;
pub use tree::BPlusTree;
