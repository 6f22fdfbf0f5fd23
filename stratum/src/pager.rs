use std::fs::{create_dir_all, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::failpoint::{self, Failpoint};
use crate::{Page, PageId, INVALID_PAGE_ID, PAGE_SIZE};

/// The disk manager: fixed-size page I/O against a single database file,
/// plus page id allocation. Ids grow monotonically; ids released through
/// `deallocate_page` may be handed out again.
pub struct Pager {
    file: File,
    pub num_pages: u32,
    free_pages: Vec<PageId>,
}

impl Pager {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path_ref = path.as_ref();
        crate::stratum_debug_log!("[Pager::open] Opening database file at: {path_ref:?}");
        if let Some(parent) = path_ref.parent() {
            create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path_ref)?;

        let file_size = file.metadata()?.len();
        let num_pages = (file_size / PAGE_SIZE as u64) as u32;

        Ok(Self {
            file,
            num_pages,
            free_pages: Vec::new(),
        })
    }

    /// Reads a page from disk. A page that has never been written comes back
    /// zeroed; a short read (file truncated mid-page) is zero-filled.
    pub fn read_page(&mut self, page_id: PageId) -> io::Result<Page> {
        assert_ne!(page_id, INVALID_PAGE_ID);
        failpoint::maybe_fail(Failpoint::ReadPage)?;

        let mut page = Page::new(page_id);
        if page_id >= self.num_pages {
            return Ok(page);
        }

        let offset = page_id as u64 * PAGE_SIZE as u64;
        self.file.seek(SeekFrom::Start(offset))?;

        let bytes_read = self.file.read(&mut page.data)?;
        if bytes_read < PAGE_SIZE {
            crate::stratum_debug_log!(
                "[Pager::read_page] Short read of page {page_id} ({bytes_read} bytes), zeroing rest."
            );
            page.data[bytes_read..].fill(0);
        }

        Ok(page)
    }

    pub fn write_page(&mut self, page: &Page) -> io::Result<()> {
        assert_ne!(page.id, INVALID_PAGE_ID);
        failpoint::maybe_fail(Failpoint::WritePage)?;

        crate::stratum_debug_log!("[Pager::write_page] Writing page_id: {}", page.id);
        let offset = page.id as u64 * PAGE_SIZE as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&page.data)?;
        self.file.sync_all()?;
        if page.id >= self.num_pages {
            self.num_pages = page.id + 1;
        }
        Ok(())
    }

    pub fn allocate_page(&mut self) -> io::Result<PageId> {
        if let Some(page_id) = self.free_pages.pop() {
            crate::stratum_debug_log!("[Pager::allocate_page] Reusing freed page_id: {page_id}");
            return Ok(page_id);
        }
        let page_id = self.num_pages;
        self.num_pages += 1;
        crate::stratum_debug_log!("[Pager::allocate_page] Allocating new page_id: {page_id}");
        Ok(page_id)
    }

    pub fn deallocate_page(&mut self, page_id: PageId) {
        if !self.free_pages.contains(&page_id) {
            self.free_pages.push(page_id);
        }
    }

    /// Number of pages currently sitting in the free set.
    pub fn free_page_count(&self) -> usize {
        self.free_pages.len()
    }

    /// Number of allocated, not-deallocated pages.
    pub fn live_page_count(&self) -> usize {
        self.num_pages as usize - self.free_pages.len()
    }
}
