//! The pager mediates every access to the database file.
//!
//! It owns a fixed array of page slots, demand-loads pages from disk, and
//! writes them back on close. There is no eviction and no per-page dirty
//! tracking: every resident page is flushed at shutdown, and the slot count is
//! the hard table-size limit.

use super::btree::{Node, NodeType};
use crate::errors::Error;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Page size 4 kilobytes because it's the same size as a page used in
/// the virtual memory systems of most computer architectures.
pub const PAGE_SIZE: usize = 4096;

/// Hard cap on the number of page slots.
pub const TABLE_MAX_PAGES: usize = 100;

pub struct Pager {
    file: File,
    /// Length of the file at open time; pages past this exist only in memory
    /// until the next flush.
    file_length: u64,
    num_pages: u32,
    pages: heapless::Vec<Option<Arc<Mutex<Node>>>, TABLE_MAX_PAGES>,
}

impl Pager {
    /// Opens (creating if absent) the database file behind the pager.
    ///
    /// # Errors
    /// Returns an `Error::Storage` if the file length is not a whole number
    /// of pages, which means the file is corrupt.
    pub fn open(path: &Path) -> Result<Self, Error> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let file_length = file.metadata()?.len();

        if file_length % PAGE_SIZE as u64 != 0 {
            return Err(err!(
                Storage,
                "Db file is not a whole number of pages. Corrupt file."
            ));
        }

        let mut pages = heapless::Vec::new();
        while pages.push(None).is_ok() {}

        Ok(Pager {
            file,
            file_length,
            num_pages: (file_length / PAGE_SIZE as u64) as u32,
            pages,
        })
    }

    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    /// For now, in a database with N pages, page numbers 0 through N-1 are
    /// allocated, so page number N is always free. Without deletion no page
    /// number is ever recycled.
    pub fn unused_page_num(&self) -> u32 {
        self.num_pages
    }

    /// Ensures the page is resident, reading it from disk when the file
    /// already contains it and zero-filling it otherwise.
    ///
    /// Accessing page `num_pages` extends the table by one page.
    pub fn load(&mut self, page_num: u32) -> Result<(), Error> {
        if page_num as usize >= TABLE_MAX_PAGES {
            return Err(Error::TableFull);
        }

        if self.pages[page_num as usize].is_none() {
            let mut node = Node::new_zeroed();

            let pages_on_disk = (self.file_length / PAGE_SIZE as u64) as u32;
            if page_num < pages_on_disk {
                self.file
                    .seek(SeekFrom::Start(page_num as u64 * PAGE_SIZE as u64))?;
                let mut buf = [0u8; PAGE_SIZE];
                self.file.read_exact(&mut buf)?;
                node = Node::from_bytes(&buf);
                debug!(page_num, "Read page from disk");
            }

            self.pages[page_num as usize] = Some(Arc::new(Mutex::new(node)));
            if page_num >= self.num_pages {
                self.num_pages = page_num + 1;
            }
        }
        Ok(())
    }

    /// Returns a guard over a resident page. Call [`Pager::load`] first for
    /// pages that may not be in memory yet.
    pub fn get(&self, page_num: u32) -> Result<MutexGuard<'_, Node>, Error> {
        let slot = self
            .pages
            .get(page_num as usize)
            .and_then(|slot| slot.as_ref())
            .ok_or_else(|| err!(Storage, "Memory page {} not found.", page_num))?;

        slot.try_lock()
            .map_err(|_| err!(Lock, "Failed to lock page {}", page_num))
    }

    /// Loads and returns a page in one step.
    pub fn fetch(&mut self, page_num: u32) -> Result<MutexGuard<'_, Node>, Error> {
        self.load(page_num)?;
        self.get(page_num)
    }

    /// Writes one resident page back to its file offset.
    pub fn flush(&mut self, page_num: u32) -> Result<(), Error> {
        let buf = {
            let node = self.get(page_num)?;
            *node.raw()
        };
        self.file
            .seek(SeekFrom::Start(page_num as u64 * PAGE_SIZE as u64))?;
        self.file.write_all(&buf)?;
        Ok(())
    }

    /// Flushes every resident page and syncs the file.
    pub fn close(&mut self) -> Result<(), Error> {
        let mut flushed = 0;
        for page_num in 0..self.num_pages {
            if self.pages[page_num as usize].is_some() {
                self.flush(page_num)?;
                flushed += 1;
            }
        }
        self.file.sync_all()?;
        info!(flushed, "Flushed pages.");
        Ok(())
    }

    /// Largest key in the subtree rooted at `page_num`, found by chasing
    /// right children down to a leaf.
    pub fn max_key(&mut self, page_num: u32) -> Result<u32, Error> {
        let mut page_num = page_num;
        loop {
            let next = {
                let node = self.fetch(page_num)?;
                match node.node_type()? {
                    NodeType::Leaf => return node.leaf_max_key(),
                    NodeType::Internal => node.right_child(),
                }
            };
            page_num = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_open_empty_file() {
        let temp_file = NamedTempFile::new().unwrap();
        let pager = Pager::open(temp_file.path()).unwrap();
        assert_eq!(pager.num_pages(), 0);
        assert_eq!(pager.unused_page_num(), 0);
    }

    #[test]
    fn test_open_rejects_partial_pages() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), [0u8; 100]).unwrap();
        assert!(Pager::open(temp_file.path()).is_err());
    }

    #[test]
    fn test_load_extends_the_table() {
        let temp_file = NamedTempFile::new().unwrap();
        let mut pager = Pager::open(temp_file.path()).unwrap();
        pager.load(0).unwrap();
        assert_eq!(pager.num_pages(), 1);
        assert_eq!(pager.unused_page_num(), 1);
    }

    #[test]
    fn test_load_rejects_out_of_bounds_pages() {
        let temp_file = NamedTempFile::new().unwrap();
        let mut pager = Pager::open(temp_file.path()).unwrap();
        assert!(matches!(
            pager.load(TABLE_MAX_PAGES as u32),
            Err(Error::TableFull)
        ));
    }

    #[test]
    fn test_flush_and_reload_roundtrip() {
        let temp_file = NamedTempFile::new().unwrap();

        {
            let mut pager = Pager::open(temp_file.path()).unwrap();
            pager.load(0).unwrap();
            {
                let mut node = pager.get(0).unwrap();
                node.init_leaf();
                node.set_num_cells(3);
                node.set_leaf_key(2, 99).unwrap();
            }
            pager.close().unwrap();
        }

        let mut pager = Pager::open(temp_file.path()).unwrap();
        assert_eq!(pager.num_pages(), 1);
        let node = pager.fetch(0).unwrap();
        assert_eq!(node.num_cells(), 3);
        assert_eq!(node.leaf_key(2).unwrap(), 99);
    }
}
