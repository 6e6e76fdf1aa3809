//! Cursor-based navigation of the table.
//!
//! A cursor is a position inside the B-tree: a leaf page plus a cell index.
//! It is both the landing site of an insert (via [`Cursor::find`]) and the
//! iteration state of a full scan (via [`Cursor::start`] and
//! [`Cursor::advance`], which walks the leaf chain in key order).

use super::btree::NodeType;
use super::table::Table;
use crate::errors::Error;

/// Represents a position within the table.
///
/// The cursor borrows the table mutably for its entire lifetime so it can
/// demand-load pages while it moves.
pub struct Cursor<'a> {
    pub table: &'a mut Table,
    pub page_num: u32,
    pub cell_num: u32,
    /// Indicates a position one past the last element.
    pub end_of_table: bool,
}

impl<'a> Cursor<'a> {
    /// Positions a cursor at the first row of the table.
    pub fn start(table: &'a mut Table) -> Result<Self, Error> {
        // Key 0 is below every valid id, so this lands on the leftmost leaf.
        let mut cursor = Cursor::find(table, 0)?;
        let num_cells = cursor.table.pager.get(cursor.page_num)?.num_cells();
        cursor.end_of_table = num_cells == 0;
        Ok(cursor)
    }

    /// Returns the position of the given key, or the position where it
    /// should be inserted.
    pub fn find(table: &'a mut Table, key: u32) -> Result<Self, Error> {
        let root_page_num = table.root_page_num;
        let node_type = table.pager.fetch(root_page_num)?.node_type()?;

        match node_type {
            NodeType::Internal => Self::internal_find(table, root_page_num, key),
            NodeType::Leaf => Self::leaf_find(table, root_page_num, key),
        }
    }

    fn internal_find(table: &'a mut Table, page_num: u32, key: u32) -> Result<Self, Error> {
        let child_page_num = {
            let node = table.pager.get(page_num)?;
            let child_index = node.find_child(key)?;
            node.child(child_index)?
        };

        let child_type = table.pager.fetch(child_page_num)?.node_type()?;
        match child_type {
            NodeType::Internal => Self::internal_find(table, child_page_num, key),
            NodeType::Leaf => Self::leaf_find(table, child_page_num, key),
        }
    }

    fn leaf_find(table: &'a mut Table, page_num: u32, key: u32) -> Result<Self, Error> {
        let cell_num = {
            let node = table.pager.get(page_num)?;

            let mut min_index = 0;
            let mut one_past_max_index = node.num_cells();

            // Binary search
            loop {
                if one_past_max_index == min_index {
                    break min_index;
                }
                let index = (min_index + one_past_max_index) / 2;
                let key_at_index = node.leaf_key(index)?;
                if key == key_at_index {
                    break index;
                }
                if key < key_at_index {
                    one_past_max_index = index;
                } else {
                    min_index = index + 1;
                }
            }
        };

        Ok(Cursor {
            table,
            page_num,
            cell_num,
            end_of_table: false,
        })
    }

    /// Advances the cursor to the next cell, hopping to the next leaf in the
    /// sibling chain when the current one is exhausted.
    pub fn advance(&mut self) -> Result<(), Error> {
        let (num_cells, next_leaf) = {
            let node = self.table.pager.get(self.page_num)?;
            (node.num_cells(), node.next_leaf())
        };

        self.cell_num += 1;
        if self.cell_num >= num_cells {
            if next_leaf == 0 {
                // This was the rightmost leaf.
                self.end_of_table = true;
            } else {
                self.table.pager.load(next_leaf)?;
                self.page_num = next_leaf;
                self.cell_num = 0;
            }
        }
        Ok(())
    }

    /// Copies the serialized row under the cursor into `buf`.
    pub fn read_value(&mut self, buf: &mut Vec<u8>) -> Result<(), Error> {
        let node = self.table.pager.get(self.page_num)?;
        let value = node.leaf_value(self.cell_num)?;
        buf.clear();
        buf.extend_from_slice(value);
        Ok(())
    }
}
