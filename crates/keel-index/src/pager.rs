//! Pager for page-level file I/O.

use keel_common::page::{page_offset, PageId, PAGE_SIZE};
use keel_common::{IndexConfig, KeelError, Result};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Maps page IDs to byte ranges in one backing file.
///
/// Every call is an OS read or write; the pager keeps no cache of its
/// own. The byte offset of page `p` is exactly `p * 4096`.
pub struct Pager {
    /// Open file handle and cached page count.
    inner: Mutex<Inner>,
    /// Path to the backing file.
    path: PathBuf,
    /// Enable fsync after writes.
    fsync_enabled: bool,
}

struct Inner {
    file: File,
    /// Number of pages in the file.
    num_pages: u32,
}

impl Pager {
    /// Opens or creates the backing file.
    pub fn open(path: &Path, config: &IndexConfig) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|source| KeelError::OpenFailed {
                path: path.to_path_buf(),
                source,
            })?;

        let file_size = file.metadata()?.len();
        let num_pages = (file_size / PAGE_SIZE as u64) as u32;

        Ok(Self {
            inner: Mutex::new(Inner { file, num_pages }),
            path: path.to_path_buf(),
            fsync_enabled: config.fsync_enabled,
        })
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of pages in the file.
    pub fn num_pages(&self) -> u32 {
        self.inner.lock().num_pages
    }

    /// Reads a page from disk.
    pub fn read_page(&self, page_id: PageId) -> Result<[u8; PAGE_SIZE]> {
        let mut inner = self.inner.lock();

        if page_id >= inner.num_pages {
            return Err(KeelError::PageOutOfBounds {
                page_id,
                num_pages: inner.num_pages,
            });
        }

        inner.file.seek(SeekFrom::Start(page_offset(page_id)))?;

        let mut buffer = [0u8; PAGE_SIZE];
        inner.file.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    /// Writes a page to disk.
    pub fn write_page(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
        let mut inner = self.inner.lock();

        inner.file.seek(SeekFrom::Start(page_offset(page_id)))?;
        inner.file.write_all(data)?;

        if self.fsync_enabled {
            inner.file.sync_all()?;
        }

        // Update page count if we extended the file
        if page_id >= inner.num_pages {
            inner.num_pages = page_id + 1;
        }

        Ok(())
    }

    /// Allocates a new page at the end of the file.
    ///
    /// Writes a zero-filled page there and returns its ID.
    pub fn allocate_page(&self) -> Result<PageId> {
        let mut inner = self.inner.lock();

        let page_id = inner.num_pages;
        inner.file.seek(SeekFrom::Start(page_offset(page_id)))?;
        inner.file.write_all(&[0u8; PAGE_SIZE])?;

        if self.fsync_enabled {
            inner.file.sync_all()?;
        }

        inner.num_pages = page_id + 1;

        Ok(page_id)
    }

    /// Flushes pending writes to disk.
    pub fn sync(&self) -> Result<()> {
        self.inner.lock().file.sync_all()?;
        Ok(())
    }
}

impl Drop for Pager {
    fn drop(&mut self) {
        let _ = self.inner.lock().file.sync_all();
    }
}
