//! B-tree node layout.
//!
//! A node is one page interpreted through a set of byte-offset contracts. All
//! integer fields are little-endian `u32`s (the node type and root flag are
//! single bytes). Two interpretations share a common header:
//!
//! | Property           | Internal node                 | Leaf node           |
//! |--------------------|-------------------------------|---------------------|
//! | Stores             | keys and pointers to children | keys and values     |
//! | Number of keys     | up to `INTERNAL_NODE_MAX_CELLS` | as many as will fit |
//! | Number of pointers | number of keys + 1            | none                |
//! | Stores values?     | no                            | yes                 |
//!
//! The offsets below are part of the on-disk format; `.constants` exposes the
//! interesting ones so layout drift is caught immediately.

use super::pager::PAGE_SIZE;
use super::row::ROW_SIZE;
use crate::errors::Error;

/// Represents the type of a B-tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    /// A leaf node containing key-value pairs.
    Leaf,
    /// An internal node containing keys and child pointers.
    Internal,
}

/// Sentinel stored as the right child of an empty internal node.
///
/// Page 0 is the root, so 0 cannot double as a "no child" marker the way it
/// does for `next_leaf`.
pub const INVALID_PAGE_NUM: u32 = u32::MAX;

// Common node header layout.

const NODE_TYPE_SIZE: usize = std::mem::size_of::<u8>();
const NODE_TYPE_OFFSET: usize = 0;
const IS_ROOT_SIZE: usize = std::mem::size_of::<u8>();
const IS_ROOT_OFFSET: usize = NODE_TYPE_OFFSET + NODE_TYPE_SIZE;
const PARENT_POINTER_SIZE: usize = std::mem::size_of::<u32>();
const PARENT_POINTER_OFFSET: usize = IS_ROOT_OFFSET + IS_ROOT_SIZE;

/// Total size of the header shared by both node types.
pub const COMMON_NODE_HEADER_SIZE: usize = NODE_TYPE_SIZE + IS_ROOT_SIZE + PARENT_POINTER_SIZE;

// Leaf node header layout.

const LEAF_NODE_NUM_CELLS_SIZE: usize = std::mem::size_of::<u32>();
const LEAF_NODE_NUM_CELLS_OFFSET: usize = COMMON_NODE_HEADER_SIZE;
const LEAF_NODE_NEXT_LEAF_SIZE: usize = std::mem::size_of::<u32>();
/// Offset of the forward sibling pointer; 0 marks the rightmost leaf.
const LEAF_NODE_NEXT_LEAF_OFFSET: usize = LEAF_NODE_NUM_CELLS_OFFSET + LEAF_NODE_NUM_CELLS_SIZE;

/// Total size of a leaf node header.
pub const LEAF_NODE_HEADER_SIZE: usize =
    COMMON_NODE_HEADER_SIZE + LEAF_NODE_NUM_CELLS_SIZE + LEAF_NODE_NEXT_LEAF_SIZE;

// Leaf node body layout.

const LEAF_NODE_KEY_SIZE: usize = std::mem::size_of::<u32>();
const LEAF_NODE_KEY_OFFSET: usize = 0;
const LEAF_NODE_VALUE_SIZE: usize = ROW_SIZE;
const LEAF_NODE_VALUE_OFFSET: usize = LEAF_NODE_KEY_OFFSET + LEAF_NODE_KEY_SIZE;

/// Total size of a leaf cell (key + serialized row).
pub const LEAF_NODE_CELL_SIZE: usize = LEAF_NODE_KEY_SIZE + LEAF_NODE_VALUE_SIZE;

/// Space available for cells in a leaf node (page size minus header).
pub const LEAF_NODE_SPACE_FOR_CELLS: usize = PAGE_SIZE - LEAF_NODE_HEADER_SIZE;

/// Maximum number of cells that fit in a leaf node.
pub const LEAF_NODE_MAX_CELLS: usize = LEAF_NODE_SPACE_FOR_CELLS / LEAF_NODE_CELL_SIZE;

/// Number of cells assigned to the right sibling when splitting a leaf node.
pub const LEAF_NODE_RIGHT_SPLIT_COUNT: usize = (LEAF_NODE_MAX_CELLS + 1) / 2;

/// Number of cells kept by the left sibling when splitting a leaf node.
pub const LEAF_NODE_LEFT_SPLIT_COUNT: usize =
    (LEAF_NODE_MAX_CELLS + 1) - LEAF_NODE_RIGHT_SPLIT_COUNT;

// Internal node header layout.

const INTERNAL_NODE_NUM_KEYS_SIZE: usize = std::mem::size_of::<u32>();
const INTERNAL_NODE_NUM_KEYS_OFFSET: usize = COMMON_NODE_HEADER_SIZE;
const INTERNAL_NODE_RIGHT_CHILD_SIZE: usize = std::mem::size_of::<u32>();
const INTERNAL_NODE_RIGHT_CHILD_OFFSET: usize =
    INTERNAL_NODE_NUM_KEYS_OFFSET + INTERNAL_NODE_NUM_KEYS_SIZE;

/// Total size of an internal node header.
pub const INTERNAL_NODE_HEADER_SIZE: usize =
    COMMON_NODE_HEADER_SIZE + INTERNAL_NODE_NUM_KEYS_SIZE + INTERNAL_NODE_RIGHT_CHILD_SIZE;

// Internal node body layout.

const INTERNAL_NODE_KEY_SIZE: usize = std::mem::size_of::<u32>();
const INTERNAL_NODE_CHILD_SIZE: usize = std::mem::size_of::<u32>();

/// Total size of an internal cell (child pointer + separator key).
pub const INTERNAL_NODE_CELL_SIZE: usize = INTERNAL_NODE_CHILD_SIZE + INTERNAL_NODE_KEY_SIZE;

/// Maximum number of separator keys in an internal node.
///
/// Deliberately far below what a page could hold so that multi-level trees
/// appear after a handful of inserts.
pub const INTERNAL_NODE_MAX_CELLS: usize = 3;

/// A B-tree node owning one page worth of bytes.
#[derive(Debug, Clone)]
pub struct Node {
    data: [u8; PAGE_SIZE],
}

impl Node {
    pub fn new_zeroed() -> Self {
        Node {
            data: [0; PAGE_SIZE],
        }
    }

    pub fn from_bytes(buf: &[u8; PAGE_SIZE]) -> Self {
        Node { data: *buf }
    }

    /// Returns the raw page bytes, e.g. for flushing to disk.
    pub fn raw(&self) -> &[u8; PAGE_SIZE] {
        &self.data
    }

    /// Overwrites this page with the full contents of another one.
    pub fn copy_page_from(&mut self, other: &Node) {
        self.data.copy_from_slice(&other.data);
    }

    fn u32_at(&self, offset: usize) -> u32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.data[offset..offset + 4]);
        u32::from_le_bytes(bytes)
    }

    fn put_u32(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    // Common header.

    pub fn node_type(&self) -> Result<NodeType, Error> {
        match self.data[NODE_TYPE_OFFSET] {
            0 => Ok(NodeType::Leaf),
            1 => Ok(NodeType::Internal),
            invalid => Err(err!(Storage, "Invalid node type value: {}", invalid)),
        }
    }

    pub fn set_node_type(&mut self, node_type: NodeType) {
        self.data[NODE_TYPE_OFFSET] = match node_type {
            NodeType::Leaf => 0,
            NodeType::Internal => 1,
        };
    }

    pub fn is_root(&self) -> bool {
        self.data[IS_ROOT_OFFSET] == 1
    }

    pub fn set_root(&mut self, is_root: bool) {
        self.data[IS_ROOT_OFFSET] = is_root as u8;
    }

    /// Page number of this node's parent. Unspecified for the root.
    pub fn parent(&self) -> u32 {
        self.u32_at(PARENT_POINTER_OFFSET)
    }

    pub fn set_parent(&mut self, page_num: u32) {
        self.put_u32(PARENT_POINTER_OFFSET, page_num);
    }

    // Leaf accessors.

    pub fn num_cells(&self) -> u32 {
        self.u32_at(LEAF_NODE_NUM_CELLS_OFFSET)
    }

    pub fn set_num_cells(&mut self, num: u32) {
        self.put_u32(LEAF_NODE_NUM_CELLS_OFFSET, num);
    }

    pub fn next_leaf(&self) -> u32 {
        self.u32_at(LEAF_NODE_NEXT_LEAF_OFFSET)
    }

    pub fn set_next_leaf(&mut self, page_num: u32) {
        self.put_u32(LEAF_NODE_NEXT_LEAF_OFFSET, page_num);
    }

    fn leaf_cell_offset(cell_num: u32) -> Result<usize, Error> {
        if cell_num as usize >= LEAF_NODE_MAX_CELLS {
            return Err(err!(
                Storage,
                "Leaf cell out of bounds (cell_num={}, max_cells={})",
                cell_num,
                LEAF_NODE_MAX_CELLS
            ));
        }
        Ok(LEAF_NODE_HEADER_SIZE + cell_num as usize * LEAF_NODE_CELL_SIZE)
    }

    pub fn leaf_cell(&self, cell_num: u32) -> Result<&[u8], Error> {
        let offset = Self::leaf_cell_offset(cell_num)?;
        Ok(&self.data[offset..offset + LEAF_NODE_CELL_SIZE])
    }

    pub fn leaf_cell_mut(&mut self, cell_num: u32) -> Result<&mut [u8], Error> {
        let offset = Self::leaf_cell_offset(cell_num)?;
        Ok(&mut self.data[offset..offset + LEAF_NODE_CELL_SIZE])
    }

    pub fn leaf_key(&self, cell_num: u32) -> Result<u32, Error> {
        let offset = Self::leaf_cell_offset(cell_num)?;
        Ok(self.u32_at(offset + LEAF_NODE_KEY_OFFSET))
    }

    pub fn set_leaf_key(&mut self, cell_num: u32, key: u32) -> Result<(), Error> {
        let offset = Self::leaf_cell_offset(cell_num)?;
        self.put_u32(offset + LEAF_NODE_KEY_OFFSET, key);
        Ok(())
    }

    pub fn leaf_value(&self, cell_num: u32) -> Result<&[u8], Error> {
        let offset = Self::leaf_cell_offset(cell_num)?;
        let offset = offset + LEAF_NODE_VALUE_OFFSET;
        Ok(&self.data[offset..offset + LEAF_NODE_VALUE_SIZE])
    }

    pub fn set_leaf_value(&mut self, cell_num: u32, buf: &[u8]) -> Result<(), Error> {
        if buf.len() != LEAF_NODE_VALUE_SIZE {
            return Err(err!(
                Storage,
                "Value size mismatch (expected={}, got={})",
                LEAF_NODE_VALUE_SIZE,
                buf.len()
            ));
        }
        let offset = Self::leaf_cell_offset(cell_num)?;
        let offset = offset + LEAF_NODE_VALUE_OFFSET;
        self.data[offset..offset + LEAF_NODE_VALUE_SIZE].copy_from_slice(buf);
        Ok(())
    }

    /// Largest key stored in this leaf.
    pub fn leaf_max_key(&self) -> Result<u32, Error> {
        let num_cells = self.num_cells();
        if num_cells == 0 {
            return Err(err!(Storage, "Empty leaf has no max key"));
        }
        self.leaf_key(num_cells - 1)
    }

    // Internal accessors.

    pub fn num_keys(&self) -> u32 {
        self.u32_at(INTERNAL_NODE_NUM_KEYS_OFFSET)
    }

    pub fn set_num_keys(&mut self, num: u32) {
        self.put_u32(INTERNAL_NODE_NUM_KEYS_OFFSET, num);
    }

    pub fn right_child(&self) -> u32 {
        self.u32_at(INTERNAL_NODE_RIGHT_CHILD_OFFSET)
    }

    pub fn set_right_child(&mut self, page_num: u32) {
        self.put_u32(INTERNAL_NODE_RIGHT_CHILD_OFFSET, page_num);
    }

    fn internal_cell_offset(&self, cell_num: u32) -> Result<usize, Error> {
        if cell_num >= self.num_keys() {
            return Err(err!(
                Storage,
                "Internal cell out of bounds (cell_num={}, num_keys={})",
                cell_num,
                self.num_keys()
            ));
        }
        Ok(INTERNAL_NODE_HEADER_SIZE + cell_num as usize * INTERNAL_NODE_CELL_SIZE)
    }

    pub fn internal_cell(&self, cell_num: u32) -> Result<&[u8], Error> {
        let offset = self.internal_cell_offset(cell_num)?;
        Ok(&self.data[offset..offset + INTERNAL_NODE_CELL_SIZE])
    }

    pub fn internal_cell_mut(&mut self, cell_num: u32) -> Result<&mut [u8], Error> {
        let offset = self.internal_cell_offset(cell_num)?;
        Ok(&mut self.data[offset..offset + INTERNAL_NODE_CELL_SIZE])
    }

    /// Child pointer at `child_num`; `child_num == num_keys` resolves to the
    /// right child.
    pub fn child(&self, child_num: u32) -> Result<u32, Error> {
        let num_keys = self.num_keys();
        if child_num > num_keys {
            return Err(err!(
                Storage,
                "Child index {} exceeds num_keys {}",
                child_num,
                num_keys
            ));
        }
        if child_num == num_keys {
            Ok(self.right_child())
        } else {
            let offset = self.internal_cell_offset(child_num)?;
            Ok(self.u32_at(offset))
        }
    }

    pub fn set_child(&mut self, child_num: u32, page_num: u32) -> Result<(), Error> {
        let num_keys = self.num_keys();
        if child_num > num_keys {
            return Err(err!(
                Storage,
                "Child index {} exceeds num_keys {}",
                child_num,
                num_keys
            ));
        }
        if child_num == num_keys {
            self.set_right_child(page_num);
        } else {
            let offset = self.internal_cell_offset(child_num)?;
            self.put_u32(offset, page_num);
        }
        Ok(())
    }

    pub fn internal_key(&self, key_num: u32) -> Result<u32, Error> {
        let offset = self.internal_cell_offset(key_num)?;
        Ok(self.u32_at(offset + INTERNAL_NODE_CHILD_SIZE))
    }

    pub fn set_internal_key(&mut self, key_num: u32, key: u32) -> Result<(), Error> {
        let offset = self.internal_cell_offset(key_num)?;
        self.put_u32(offset + INTERNAL_NODE_CHILD_SIZE, key);
        Ok(())
    }

    /// Index of the child that should contain `key`.
    ///
    /// Binary-searches the separators for the smallest index whose key is
    /// greater than or equal to `key`; returns `num_keys` (the right child)
    /// when every separator is smaller.
    pub fn find_child(&self, key: u32) -> Result<u32, Error> {
        let num_keys = self.num_keys();
        let mut min_index = 0;
        let mut max_index = num_keys; // there is one more child than key
        while min_index != max_index {
            let index = (min_index + max_index) / 2;
            let key_to_right = self.internal_key(index)?;
            if key_to_right >= key {
                max_index = index;
            } else {
                min_index = index + 1;
            }
        }
        Ok(min_index)
    }

    /// Rewrites the separator that used to be `old_key` after a child's max
    /// key changed.
    ///
    /// The right child carries no separator, so when `old_key` belonged to it
    /// there is nothing to rewrite.
    pub fn update_key(&mut self, old_key: u32, new_key: u32) -> Result<(), Error> {
        let child_index = self.find_child(old_key)?;
        if child_index < self.num_keys() {
            self.set_internal_key(child_index, new_key)?;
        }
        Ok(())
    }

    /// Resets this page to an empty leaf.
    pub fn init_leaf(&mut self) {
        self.set_node_type(NodeType::Leaf);
        self.set_root(false);
        self.set_num_cells(0);
        self.set_next_leaf(0); // 0 represents no sibling
    }

    /// Resets this page to an empty internal node.
    pub fn init_internal(&mut self) {
        self.set_node_type(NodeType::Internal);
        self.set_root(false);
        self.set_num_keys(0);
        self.set_right_child(INVALID_PAGE_NUM);
    }
}
