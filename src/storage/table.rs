//! The table façade and the B-tree write path.
//!
//! A table bundles a [`Pager`] with the root page number, which is always
//! page 0: when the root splits, its old contents move to a freshly
//! allocated page and page 0 is rebuilt as an internal node on top, so the
//! root page number stays stable for the life of the file.
//!
//! The split routines work on page numbers rather than node references and
//! re-acquire page guards between steps, because a single split touches up to
//! four pages (the node, its sibling, its parent and the root) and may
//! recurse up the tree.

use super::btree::{
    Node, NodeType, INTERNAL_NODE_MAX_CELLS, INVALID_PAGE_NUM, LEAF_NODE_LEFT_SPLIT_COUNT,
    LEAF_NODE_MAX_CELLS, LEAF_NODE_RIGHT_SPLIT_COUNT,
};
use super::cursor::Cursor;
use super::pager::{Pager, TABLE_MAX_PAGES};
use super::row::Row;
use crate::errors::Error;
use std::path::PathBuf;
use tracing::{debug, info};

pub struct Table {
    pub path: PathBuf,
    pub root_page_num: u32,
    pub pager: Pager,
}

impl Table {
    /// Opens a table, creating the database file when it does not exist yet.
    /// A brand-new file gets page 0 initialized as an empty root leaf.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let mut pager = Pager::open(&path)?;

        if pager.num_pages() == 0 {
            // New database file. Initialize page 0 as the root leaf.
            let mut root = pager.fetch(0)?;
            root.init_leaf();
            root.set_root(true);
        }

        info!(path = %path.display(), "Opened table");
        Ok(Table {
            path,
            root_page_num: 0,
            pager,
        })
    }

    /// Flushes every resident page and releases the file.
    pub fn close(&mut self) -> Result<(), Error> {
        self.pager.close()?;
        info!(path = %self.path.display(), "Closed table");
        Ok(())
    }
}

/// Inserts a row keyed by its id, keeping the tree sorted and balanced.
///
/// # Errors
/// - `Error::DuplicateKey` when the id already exists; the tree is left
///   untouched.
/// - `Error::TableFull` when the pager cannot cover the insert's worst-case
///   page allocations; checked
///   up front so a rejected insert never leaves a half-finished split behind.
pub fn insert_row(table: &mut Table, row: &Row) -> Result<(), Error> {
    let key = row.id;
    let row_bytes = row.serialize();
    debug!(key, "Inserting a row...");

    let (page_num, cell_num) = {
        let cursor = Cursor::find(table, key)?;
        (cursor.page_num, cursor.cell_num)
    };

    let num_cells = {
        let node = table.pager.get(page_num)?;
        let num_cells = node.num_cells();
        if cell_num < num_cells && node.leaf_key(cell_num)? == key {
            return Err(Error::DuplicateKey);
        }
        num_cells
    };

    if num_cells as usize >= LEAF_NODE_MAX_CELLS {
        debug!(page_num, num_cells, "Leaf node full. Splitting...");
        ensure_split_capacity(table)?;
        return leaf_split_and_insert(table, page_num, cell_num, key, &row_bytes);
    }

    let mut node = table.pager.get(page_num)?;
    if cell_num < num_cells {
        // Make room for the new cell.
        for i in ((cell_num + 1)..=num_cells).rev() {
            let prev = node.leaf_cell(i - 1)?.to_vec();
            node.leaf_cell_mut(i)?.copy_from_slice(&prev);
        }
    }
    node.set_num_cells(num_cells + 1);
    node.set_leaf_key(cell_num, key)?;
    node.set_leaf_value(cell_num, &row_bytes)?;
    Ok(())
}

/// Reads every row in ascending key order by walking the leaf chain.
pub fn select_rows(table: &mut Table) -> Result<Vec<Row>, Error> {
    let mut rows = Vec::new();
    let mut buf = Vec::new();

    let mut cursor = Cursor::start(table)?;
    while !cursor.end_of_table {
        cursor.read_value(&mut buf)?;
        rows.push(Row::deserialize(&buf)?);
        cursor.advance()?;
    }
    Ok(rows)
}

/// Number of levels in the tree; 1 for a tree that is a single leaf.
pub fn tree_height(table: &mut Table) -> Result<u32, Error> {
    let mut height = 1;
    let mut page_num = table.root_page_num;
    loop {
        let next = {
            let node = table.pager.fetch(page_num)?;
            match node.node_type()? {
                NodeType::Leaf => return Ok(height),
                NodeType::Internal => node.child(0)?,
            }
        };
        height += 1;
        page_num = next;
    }
}

/// Rejects an insert whose split chain could run out of page slots halfway
/// through. Worst case an insert allocates one leaf sibling, one internal
/// sibling per level above the leaves and one extra page for a root split.
fn ensure_split_capacity(table: &mut Table) -> Result<(), Error> {
    let needed = tree_height(table)? + 1;
    if table.pager.num_pages() + needed > TABLE_MAX_PAGES as u32 {
        return Err(Error::TableFull);
    }
    Ok(())
}

/// Splits a full leaf and inserts the pending cell into the correct half.
///
/// A new leaf is allocated, the upper half of the cells (with the new cell
/// spliced in at its sorted position) moves there, and the sibling chain is
/// relinked. The split then propagates: a root leaf turns into a new root,
/// any other leaf updates its parent's separator and registers the sibling.
fn leaf_split_and_insert(
    table: &mut Table,
    old_page_num: u32,
    cell_num: u32,
    key: u32,
    row_bytes: &[u8],
) -> Result<(), Error> {
    let old_max = table.pager.get(old_page_num)?.leaf_max_key()?;
    let new_page_num = table.pager.unused_page_num();
    table.pager.load(new_page_num)?;

    let was_root = {
        let mut old_node = table.pager.get(old_page_num)?;
        let mut new_node = table.pager.get(new_page_num)?;

        new_node.init_leaf();
        new_node.set_parent(old_node.parent());

        // The old leaf's sibling becomes the new leaf, and the new leaf
        // takes over whatever used to follow the old leaf.
        new_node.set_next_leaf(old_node.next_leaf());
        old_node.set_next_leaf(new_page_num);

        // All existing cells plus the new one are divided evenly between the
        // old (left) and new (right) nodes, preserving sorted order.
        let snapshot = Node::clone(&old_node);
        for i in (0..=LEAF_NODE_MAX_CELLS).rev() {
            let in_right_half = i >= LEAF_NODE_LEFT_SPLIT_COUNT;
            let dest_node = if in_right_half {
                &mut new_node
            } else {
                &mut old_node
            };
            let dest_index = if in_right_half {
                (i - LEAF_NODE_LEFT_SPLIT_COUNT) as u32
            } else {
                i as u32
            };

            if i == cell_num as usize {
                dest_node.set_leaf_key(dest_index, key)?;
                dest_node.set_leaf_value(dest_index, row_bytes)?;
            } else if i > cell_num as usize {
                dest_node
                    .leaf_cell_mut(dest_index)?
                    .copy_from_slice(snapshot.leaf_cell(i as u32 - 1)?);
            } else {
                dest_node
                    .leaf_cell_mut(dest_index)?
                    .copy_from_slice(snapshot.leaf_cell(i as u32)?);
            }
        }

        old_node.set_num_cells(LEAF_NODE_LEFT_SPLIT_COUNT as u32);
        new_node.set_num_cells(LEAF_NODE_RIGHT_SPLIT_COUNT as u32);

        old_node.is_root()
    };

    if was_root {
        create_new_root(table, new_page_num)
    } else {
        // The old leaf lost its upper cells, so the separator recorded for it
        // in the parent has to drop to its new max key.
        let (parent_page_num, new_max) = {
            let old_node = table.pager.get(old_page_num)?;
            (old_node.parent(), old_node.leaf_max_key()?)
        };
        table.pager.fetch(parent_page_num)?.update_key(old_max, new_max)?;
        internal_insert(table, parent_page_num, new_page_num)
    }
}

/// Registers `child_page_num` in the internal node `parent_page_num` and
/// points the child's parent back-reference at it.
///
/// The rightmost child pointer is stored separately from the cell array, so a
/// child whose keys exceed the current right child's replaces it and the old
/// right child moves into the cell array; any other child shifts the upper
/// cells right and lands at its sorted position. A parent that is already at
/// capacity splits instead, and the split decides the child's placement.
fn internal_insert(
    table: &mut Table,
    parent_page_num: u32,
    child_page_num: u32,
) -> Result<(), Error> {
    let child_max_key = table.pager.max_key(child_page_num)?;
    table.pager.load(parent_page_num)?;

    let (index, original_num_keys, right_child_page_num) = {
        let parent = table.pager.get(parent_page_num)?;
        (
            parent.find_child(child_max_key)?,
            parent.num_keys(),
            parent.right_child(),
        )
    };

    if original_num_keys >= INTERNAL_NODE_MAX_CELLS as u32 {
        return internal_split_and_insert(table, parent_page_num, child_page_num);
    }

    // An internal node whose right child is invalid is empty; the first
    // child claims the right-child slot.
    if right_child_page_num == INVALID_PAGE_NUM {
        table.pager.get(parent_page_num)?.set_right_child(child_page_num);
        table.pager.get(child_page_num)?.set_parent(parent_page_num);
        return Ok(());
    }

    let right_child_max = table.pager.max_key(right_child_page_num)?;
    {
        let mut parent = table.pager.get(parent_page_num)?;
        parent.set_num_keys(original_num_keys + 1);

        if child_max_key > right_child_max {
            // Replace the right child.
            parent.set_child(original_num_keys, right_child_page_num)?;
            parent.set_internal_key(original_num_keys, right_child_max)?;
            parent.set_right_child(child_page_num);
        } else {
            // Make room for the new cell.
            let snapshot = Node::clone(&parent);
            for i in ((index + 1)..=original_num_keys).rev() {
                parent
                    .internal_cell_mut(i)?
                    .copy_from_slice(snapshot.internal_cell(i - 1)?);
            }
            parent.set_child(index, child_page_num)?;
            parent.set_internal_key(index, child_max_key)?;
        }
    }
    table.pager.get(child_page_num)?.set_parent(parent_page_num);
    Ok(())
}

/// Splits a full internal node while inserting a new child into it.
///
/// The sibling takes the former right child plus the cells above the
/// midpoint; the highest child left behind is promoted to the old node's
/// right-child slot. The pending child then lands in whichever half covers
/// its key, the parent's separator for the old node is refreshed, and the
/// sibling is registered with the parent, which may split in turn. Splitting
/// the root goes through [`create_new_root`] first so page 0 stays the root.
fn internal_split_and_insert(
    table: &mut Table,
    split_page_num: u32,
    child_page_num: u32,
) -> Result<(), Error> {
    let mut old_page_num = split_page_num;
    let old_max = table.pager.max_key(old_page_num)?;
    let child_max = table.pager.max_key(child_page_num)?;
    let new_page_num = table.pager.unused_page_num();
    let splitting_root = table.pager.get(old_page_num)?.is_root();
    debug!(
        split_page_num,
        child_page_num, new_page_num, splitting_root, "Splitting internal node..."
    );

    let parent_page_num = if splitting_root {
        create_new_root(table, new_page_num)?;
        // The old contents now live in the fresh root's first child.
        old_page_num = table.pager.get(table.root_page_num)?.child(0)?;
        table.root_page_num
    } else {
        let parent = table.pager.get(old_page_num)?.parent();
        table.pager.load(new_page_num)?;
        table.pager.get(new_page_num)?.init_internal();
        parent
    };

    // Move the right child and the cells above the midpoint into the new
    // sibling. While the old node is in this half-moved state its right
    // child slot is invalid.
    let mut num_keys = table.pager.get(old_page_num)?.num_keys();
    let old_right_child = table.pager.get(old_page_num)?.right_child();

    internal_insert(table, new_page_num, old_right_child)?;
    table.pager.get(old_page_num)?.set_right_child(INVALID_PAGE_NUM);

    for i in ((INTERNAL_NODE_MAX_CELLS / 2 + 1)..INTERNAL_NODE_MAX_CELLS).rev() {
        let moving_page_num = table.pager.get(old_page_num)?.child(i as u32)?;
        internal_insert(table, new_page_num, moving_page_num)?;

        num_keys -= 1;
        table.pager.get(old_page_num)?.set_num_keys(num_keys);
    }

    // The highest child left behind is promoted to the right-child slot.
    {
        let mut old_node = table.pager.get(old_page_num)?;
        let promoted = old_node.child(num_keys - 1)?;
        old_node.set_right_child(promoted);
        num_keys -= 1;
        old_node.set_num_keys(num_keys);
    }

    // Insert the pending child into whichever half covers its key.
    let max_after_split = table.pager.max_key(old_page_num)?;
    let destination_page_num = if child_max < max_after_split {
        old_page_num
    } else {
        new_page_num
    };
    internal_insert(table, destination_page_num, child_page_num)?;

    // The old node's max key dropped; refresh its separator in the parent.
    let old_node_max = table.pager.max_key(old_page_num)?;
    table.pager.fetch(parent_page_num)?.update_key(old_max, old_node_max)?;

    if !splitting_root {
        let parent_of_old = table.pager.get(old_page_num)?.parent();
        internal_insert(table, parent_of_old, new_page_num)?;
    }
    Ok(())
}

/// Grows the tree by one level while keeping the root at page 0.
///
/// The old root is copied into a freshly allocated page (the new left
/// child), then page 0 is rebuilt as an internal node with one separator and
/// two children: the copy and `right_child_page_num`.
pub fn create_new_root(table: &mut Table, right_child_page_num: u32) -> Result<(), Error> {
    debug!(right_child_page_num, "Creating a new root");

    table.pager.load(table.root_page_num)?;
    table.pager.load(right_child_page_num)?;
    let left_child_page_num = table.pager.unused_page_num();
    table.pager.load(left_child_page_num)?;

    let root_was_internal =
        table.pager.get(table.root_page_num)?.node_type()? == NodeType::Internal;
    if root_was_internal {
        table.pager.get(right_child_page_num)?.init_internal();
        table.pager.get(left_child_page_num)?.init_internal();
    }

    // The old root is copied into the left child so the root page can be
    // reused.
    {
        let root = table.pager.get(table.root_page_num)?;
        let mut left_child = table.pager.get(left_child_page_num)?;
        left_child.copy_page_from(&root);
        left_child.set_root(false);
    }

    if root_was_internal {
        // The copied children still point at page 0; reparent them.
        let mut grandchildren = Vec::new();
        {
            let left_child = table.pager.get(left_child_page_num)?;
            for i in 0..=left_child.num_keys() {
                grandchildren.push(left_child.child(i)?);
            }
        }
        for page_num in grandchildren {
            table.pager.fetch(page_num)?.set_parent(left_child_page_num);
        }
    }

    let left_child_max_key = table.pager.max_key(left_child_page_num)?;
    {
        let mut root = table.pager.get(table.root_page_num)?;
        root.init_internal();
        root.set_root(true);
        root.set_num_keys(1);
        root.set_child(0, left_child_page_num)?;
        root.set_internal_key(0, left_child_max_key)?;
        root.set_right_child(right_child_page_num);
    }
    table.pager.get(left_child_page_num)?.set_parent(table.root_page_num);
    table.pager.get(right_child_page_num)?.set_parent(table.root_page_num);
    Ok(())
}

/// Renders the tree depth-first, two spaces of indent per level, for the
/// `.btree` meta-command.
pub fn render_tree(table: &mut Table) -> Result<Vec<String>, Error> {
    let mut lines = Vec::new();
    render_node(&mut table.pager, table.root_page_num, 0, &mut lines)?;
    Ok(lines)
}

fn render_node(
    pager: &mut Pager,
    page_num: u32,
    level: usize,
    lines: &mut Vec<String>,
) -> Result<(), Error> {
    let node_type = pager.fetch(page_num)?.node_type()?;
    let indent = "  ".repeat(level);

    match node_type {
        NodeType::Leaf => {
            let keys = {
                let node = pager.get(page_num)?;
                let mut keys = Vec::new();
                for i in 0..node.num_cells() {
                    keys.push(node.leaf_key(i)?);
                }
                keys
            };
            lines.push(format!("{}- leaf (size {})", indent, keys.len()));
            for key in keys {
                lines.push(format!("{}  - {}", indent, key));
            }
        }
        NodeType::Internal => {
            let (entries, right_child) = {
                let node = pager.get(page_num)?;
                let mut entries = Vec::new();
                for i in 0..node.num_keys() {
                    entries.push((node.child(i)?, node.internal_key(i)?));
                }
                (entries, node.right_child())
            };
            lines.push(format!("{}- internal (size {})", indent, entries.len()));
            for (child, key) in entries {
                render_node(pager, child, level + 1, lines)?;
                lines.push(format!("{}  - key {}", indent, key));
            }
            render_node(pager, right_child, level + 1, lines)?;
        }
    }
    Ok(())
}
