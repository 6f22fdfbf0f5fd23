//! RAII guards over pinned pages.
//!
//! A guard corresponds to exactly one pin: dropping it unpins the page on
//! every exit path. The basic [`PageGuard`] holds no latch between accesses;
//! [`ReadPageGuard`] and [`WritePageGuard`] keep the frame's latch for their
//! whole lifetime and release it just before the unpin (field order).

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::buffer_pool::BufferPoolManager;
use crate::{FrameId, Page, PageId};

/// A pinned page. Accessing the bytes latches the frame for the duration of
/// the returned lock guard only; `write` marks the guard dirty so the drop
/// path records the mutation.
pub struct PageGuard<'a> {
    bpm: &'a Arc<BufferPoolManager>,
    page_id: PageId,
    frame_id: FrameId,
    is_dirty: bool,
}

impl<'a> PageGuard<'a> {
    pub(crate) fn new(bpm: &'a Arc<BufferPoolManager>, page_id: PageId, frame_id: FrameId) -> Self {
        PageGuard {
            bpm,
            page_id,
            frame_id,
            is_dirty: false,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Latches the frame for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, Page> {
        self.bpm.frame_latch(self.frame_id).read()
    }

    /// Latches the frame for writing and marks the guard dirty.
    pub fn write(&mut self) -> RwLockWriteGuard<'_, Page> {
        self.is_dirty = true;
        self.bpm.frame_latch(self.frame_id).write()
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        self.bpm.unpin_page(self.page_id, self.frame_id, self.is_dirty);
    }
}

/// A pinned page whose frame is latched for reading for the guard's
/// lifetime. Dereferences to the page.
pub struct ReadPageGuard<'a> {
    latch: RwLockReadGuard<'a, Page>,
    guard: PageGuard<'a>,
}

impl<'a> ReadPageGuard<'a> {
    pub(crate) fn new(guard: PageGuard<'a>) -> Self {
        let latch = guard.bpm.frame_latch(guard.frame_id).read();
        ReadPageGuard { latch, guard }
    }

    pub fn page_id(&self) -> PageId {
        self.guard.page_id
    }
}

impl Deref for ReadPageGuard<'_> {
    type Target = Page;

    fn deref(&self) -> &Page {
        &self.latch
    }
}

/// A pinned page whose frame is latched for writing for the guard's
/// lifetime. Dirty from construction.
pub struct WritePageGuard<'a> {
    latch: RwLockWriteGuard<'a, Page>,
    guard: PageGuard<'a>,
}

impl<'a> WritePageGuard<'a> {
    pub(crate) fn new(mut guard: PageGuard<'a>) -> Self {
        guard.is_dirty = true;
        let latch = guard.bpm.frame_latch(guard.frame_id).write();
        WritePageGuard { latch, guard }
    }

    pub fn page_id(&self) -> PageId {
        self.guard.page_id
    }
}

impl Deref for WritePageGuard<'_> {
    type Target = Page;

    fn deref(&self) -> &Page {
        &self.latch
    }
}

impl DerefMut for WritePageGuard<'_> {
    fn deref_mut(&mut self) -> &mut Page {
        &mut self.latch
    }
}
