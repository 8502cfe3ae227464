//! Disk-backed B+ tree over the pager.
//!
//! One tree owns one backing file. Page 0 holds the file header; pages
//! 1 and up hold nodes. The root starts as a single empty leaf and the
//! tree grows by one level whenever the root splits. Leaves form a
//! singly linked list in key order for range scans.

use crate::node::{InternalPage, LeafPage, Node, INTERNAL_MAX_KEYS, LEAF_MAX_KEYS};
use crate::pager::Pager;
use keel_common::page::{FileHeader, PageId, Value, INVALID_PAGE, PAGE_SIZE};
use keel_common::{IndexConfig, KeelError, Result};
use std::path::Path;
use tracing::debug;

/// Page ID of the initial root leaf in a fresh file.
const INITIAL_ROOT_PAGE: PageId = 1;

/// A single-file disk-backed B+ tree indexing 100-byte values by
/// signed 32-bit keys.
pub struct BPlusTree {
    pager: Pager,
    /// Cached copy of the header on page 0. Rewritten on root change
    /// and once on drop.
    header: FileHeader,
}

impl BPlusTree {
    /// Opens an index file with the default configuration, creating
    /// and initializing it if absent or empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, IndexConfig::default())
    }

    /// Opens an index file, creating and initializing it if absent or
    /// empty. An existing file must carry a valid header.
    pub fn open_with_config(path: impl AsRef<Path>, config: IndexConfig) -> Result<Self> {
        let pager = Pager::open(path.as_ref(), &config)?;

        let header = if pager.num_pages() == 0 {
            Self::init_empty_tree(&pager)?
        } else {
            let page0 = pager.read_page(0)?;
            let header = FileHeader::from_bytes(&page0[..FileHeader::SIZE]);
            header.validate()?;
            header
        };

        Ok(Self { pager, header })
    }

    /// Writes the header and an empty root leaf into a fresh file.
    fn init_empty_tree(pager: &Pager) -> Result<FileHeader> {
        let header = FileHeader::new(INITIAL_ROOT_PAGE);
        let mut page0 = [0u8; PAGE_SIZE];
        page0[..FileHeader::SIZE].copy_from_slice(&header.to_bytes());
        pager.write_page(0, &page0)?;

        let root = LeafPage::new();
        pager.write_page(INITIAL_ROOT_PAGE, root.as_bytes())?;

        debug!(path = %pager.path().display(), "initialized empty tree");
        Ok(header)
    }

    /// Returns the page ID of the current root node.
    pub fn root_page(&self) -> PageId {
        self.header.root_page
    }

    /// Returns the number of levels in the tree (1 = the root is a
    /// leaf).
    pub fn height(&self) -> Result<u32> {
        let mut page = self.header.root_page;
        let mut height = 1;
        loop {
            match Node::from_bytes(self.pager.read_page(page)?)? {
                Node::Leaf(_) => return Ok(height),
                Node::Internal(node) => {
                    page = node.child_at(0);
                    height += 1;
                }
            }
        }
    }

    /// Rewrites the header page from the cached copy.
    fn flush_header(&self) -> Result<()> {
        let mut page0 = [0u8; PAGE_SIZE];
        page0[..FileHeader::SIZE].copy_from_slice(&self.header.to_bytes());
        self.pager.write_page(0, &page0)
    }

    /// Descends from the root to the leaf that would contain `key`.
    ///
    /// If `path` is given, every visited page ID is pushed, root to
    /// leaf inclusive.
    fn find_leaf(&self, key: i32, mut path: Option<&mut Vec<PageId>>) -> Result<PageId> {
        let mut page = self.header.root_page;
        loop {
            if let Some(p) = path.as_mut() {
                p.push(page);
            }
            match Node::from_bytes(self.pager.read_page(page)?)? {
                Node::Leaf(_) => return Ok(page),
                Node::Internal(node) => page = node.find_child(key),
            }
        }
    }

    /// Reads the page at `page_id` and requires it to be a leaf.
    fn read_leaf(&self, page_id: PageId) -> Result<LeafPage> {
        match Node::from_bytes(self.pager.read_page(page_id)?)? {
            Node::Leaf(leaf) => Ok(leaf),
            Node::Internal(_) => Err(KeelError::TreeCorrupted(format!(
                "page {page_id} is not a leaf"
            ))),
        }
    }

    /// Reads the page at `page_id` and requires it to be internal.
    fn read_internal(&self, page_id: PageId) -> Result<InternalPage> {
        match Node::from_bytes(self.pager.read_page(page_id)?)? {
            Node::Internal(node) => Ok(node),
            Node::Leaf(_) => Err(KeelError::TreeCorrupted(format!(
                "page {page_id} is not an internal node"
            ))),
        }
    }

    /// Inserts a key/value pair, overwriting the value if the key is
    /// already present.
    pub fn insert(&mut self, key: i32, value: &Value) -> Result<()> {
        let mut path = Vec::new();
        let leaf_page = self.find_leaf(key, Some(&mut path))?;

        if let Some((promoted_key, new_right)) = self.insert_in_leaf(leaf_page, key, value)? {
            self.insert_in_parent(&path, promoted_key, new_right)?;
        }
        Ok(())
    }

    /// Inserts into a leaf. Returns `Some((promoted_key, right_page))`
    /// when the leaf split and the parent must absorb a new separator.
    fn insert_in_leaf(
        &mut self,
        leaf_page: PageId,
        key: i32,
        value: &Value,
    ) -> Result<Option<(i32, PageId)>> {
        let mut leaf = self.read_leaf(leaf_page)?;

        let idx = match leaf.search(key) {
            Ok(idx) => {
                // Overwrite in place; the tree structure is unchanged.
                leaf.overwrite(idx, value);
                self.pager.write_page(leaf_page, leaf.as_bytes())?;
                return Ok(None);
            }
            Err(idx) => idx,
        };

        if leaf.num_keys() < LEAF_MAX_KEYS {
            leaf.insert_at(idx, key, value);
            self.pager.write_page(leaf_page, leaf.as_bytes())?;
            return Ok(None);
        }

        // Split: the 31 entries are distributed 15/16, the right half
        // taking the extra entry.
        let mut entries = leaf.entries();
        entries.insert(idx, (key, *value));
        let split = entries.len() / 2;

        // Capture the old sibling before relinking either leaf.
        let old_next = leaf.next_leaf();
        let right_page = self.pager.allocate_page()?;

        let mut right = LeafPage::new();
        right.write_entries(&entries[split..]);
        right.set_next_leaf(old_next);

        leaf.write_entries(&entries[..split]);
        leaf.set_next_leaf(right_page);

        let promoted_key = entries[split].0;
        self.pager.write_page(leaf_page, leaf.as_bytes())?;
        self.pager.write_page(right_page, right.as_bytes())?;

        debug!(left = leaf_page, right = right_page, promoted_key, "leaf split");
        Ok(Some((promoted_key, right_page)))
    }

    /// Propagates a split upward along the recorded descent path.
    ///
    /// Walks from the split node's parent toward the root carrying
    /// `(key, right_page)`, stopping at the first level that absorbs
    /// the separator. Splitting the root grows the tree by one level.
    fn insert_in_parent(&mut self, path: &[PageId], key: i32, right_page: PageId) -> Result<()> {
        let mut key = key;
        let mut left_page = *path.last().ok_or_else(|| {
            KeelError::TreeCorrupted("empty descent path".to_string())
        })?;
        let mut right_page = right_page;
        let mut level = path.len() - 1;

        loop {
            if level == 0 {
                // The split node was the root.
                return self.grow_root(key, left_page, right_page);
            }
            level -= 1;
            let parent_page = path[level];
            let mut parent = self.read_internal(parent_page)?;

            let child_idx = parent.position_of_child(left_page).ok_or_else(|| {
                KeelError::TreeCorrupted(format!(
                    "child {left_page} missing from parent {parent_page}"
                ))
            })?;

            if parent.num_keys() < INTERNAL_MAX_KEYS {
                parent.insert_at(child_idx, key, right_page);
                self.pager.write_page(parent_page, parent.as_bytes())?;
                return Ok(());
            }

            // Full parent: split around the middle key, which moves up
            // instead of being copied into either half.
            let mut tmp_keys = parent.keys();
            let mut tmp_children = parent.children();
            tmp_keys.insert(child_idx, key);
            tmp_children.insert(child_idx + 1, right_page);

            let mid = tmp_keys.len() / 2;
            let mid_key = tmp_keys[mid];

            let new_page = self.pager.allocate_page()?;

            parent.write_separators(&tmp_keys[..mid], &tmp_children[..=mid]);
            let mut new_internal = InternalPage::new();
            new_internal.write_separators(&tmp_keys[mid + 1..], &tmp_children[mid + 1..]);

            self.pager.write_page(parent_page, parent.as_bytes())?;
            self.pager.write_page(new_page, new_internal.as_bytes())?;

            debug!(left = parent_page, right = new_page, mid_key, "internal split");

            key = mid_key;
            left_page = parent_page;
            right_page = new_page;
        }
    }

    /// Allocates a new root above a split `left`/`right` pair and
    /// flushes the header.
    fn grow_root(&mut self, key: i32, left: PageId, right: PageId) -> Result<()> {
        let new_root = self.pager.allocate_page()?;
        let mut root = InternalPage::new();
        root.write_separators(&[key], &[left, right]);
        self.pager.write_page(new_root, root.as_bytes())?;

        self.header.root_page = new_root;
        self.flush_header()?;

        debug!(root = new_root, "root split, tree grew by one level");
        Ok(())
    }

    /// Looks up the value stored under a key.
    pub fn get(&self, key: i32) -> Result<Option<Value>> {
        let leaf_page = self.find_leaf(key, None)?;
        let leaf = self.read_leaf(leaf_page)?;
        match leaf.search(key) {
            Ok(idx) => Ok(Some(leaf.value_at(idx))),
            Err(_) => Ok(None),
        }
    }

    /// Returns the values for all keys in `[lower, upper]` in
    /// ascending key order.
    pub fn range(&self, lower: i32, upper: i32) -> Result<Vec<Value>> {
        let mut results = Vec::new();
        let mut page = self.find_leaf(lower, None)?;

        while page != INVALID_PAGE {
            let leaf = self.read_leaf(page)?;
            for i in 0..leaf.num_keys() {
                let k = leaf.key_at(i);
                if k < lower {
                    // Only possible in the first leaf visited.
                    continue;
                }
                if k > upper {
                    return Ok(results);
                }
                results.push(leaf.value_at(i));
            }
            page = leaf.next_leaf();
        }

        Ok(results)
    }

    /// Removes a key. Returns false if the key was absent.
    ///
    /// No rebalancing: leaves may underflow, and separators for removed
    /// keys remain in ancestor nodes.
    pub fn delete(&mut self, key: i32) -> Result<bool> {
        let leaf_page = self.find_leaf(key, None)?;
        let mut leaf = self.read_leaf(leaf_page)?;
        match leaf.search(key) {
            Ok(idx) => {
                leaf.remove_at(idx);
                self.pager.write_page(leaf_page, leaf.as_bytes())?;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }
}

impl Drop for BPlusTree {
    fn drop(&mut self) {
        // Best-effort header flush; the pager syncs on its own drop.
        let _ = self.flush_header();
    }
}
