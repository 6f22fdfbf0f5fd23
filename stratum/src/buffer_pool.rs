//! Manages the buffer pool, a fixed array of in-memory frames that cache
//! disk pages.
//!
//! One mutex (`state`) serializes the page table, the free list, the
//! replacer, per-frame metadata and the frame-selection decisions, including
//! dirty write-back during eviction. The per-frame reader/writer latches are
//! orthogonal: they protect page bytes and are held only by page guards (and
//! briefly by the pool itself while transferring an unreferenced frame to or
//! from disk).

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use parking_lot::RwLock;

use crate::page_guard::{PageGuard, ReadPageGuard, WritePageGuard};
use crate::pager::Pager;
use crate::replacer::{AccessType, LruKReplacer};
use crate::{FrameId, Page, PageId, INVALID_PAGE_ID};

pub(crate) fn lock_mutex_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Bookkeeping for one frame. Lives inside the pool mutex; the page bytes
/// themselves live behind the frame's latch.
#[derive(Debug)]
struct FrameMeta {
    page_id: PageId,
    pin_count: u32,
    is_dirty: bool,
}

impl FrameMeta {
    fn new() -> Self {
        FrameMeta {
            page_id: INVALID_PAGE_ID,
            pin_count: 0,
            is_dirty: false,
        }
    }
}

struct PoolState {
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
    meta: Vec<FrameMeta>,
    replacer: LruKReplacer,
}

/// The buffer pool manager.
pub struct BufferPoolManager {
    pager: Mutex<Pager>,
    frames: Vec<RwLock<Page>>,
    state: Mutex<PoolState>,
}

impl BufferPoolManager {
    pub fn new(pager: Pager, pool_size: usize, replacer_k: usize) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut meta = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            frames.push(RwLock::new(Page::default()));
            meta.push(FrameMeta::new());
        }
        Self {
            pager: Mutex::new(pager),
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::new(),
                free_list: (0..pool_size).collect(),
                meta,
                replacer: LruKReplacer::new(pool_size, replacer_k),
            }),
        }
    }

    /// Allocates a fresh page and pins it into a frame.
    pub fn new_page(self: &Arc<Self>) -> io::Result<PageGuard<'_>> {
        let mut state = lock_mutex_recover(&self.state);
        let frame_id = self.acquire_frame(&mut state)?;
        let page_id = match lock_mutex_recover(&self.pager).allocate_page() {
            Ok(page_id) => page_id,
            Err(e) => {
                state.free_list.push_front(frame_id);
                return Err(e);
            }
        };

        *self.frames[frame_id].write() = Page::new(page_id);
        self.install(&mut state, frame_id, page_id, AccessType::Unknown);
        crate::stratum_debug_log!(
            "[BufferPoolManager::new_page] page {page_id} placed in frame {frame_id}"
        );
        Ok(PageGuard::new(self, page_id, frame_id))
    }

    /// Pins `page_id` into the pool, reading it from disk on a miss.
    pub fn fetch_page(
        self: &Arc<Self>,
        page_id: PageId,
        access_type: AccessType,
    ) -> io::Result<PageGuard<'_>> {
        assert_ne!(page_id, INVALID_PAGE_ID);
        let mut state = lock_mutex_recover(&self.state);

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            state.meta[frame_id].pin_count += 1;
            state.replacer.record_access(frame_id, access_type);
            state.replacer.set_evictable(frame_id, false);
            return Ok(PageGuard::new(self, page_id, frame_id));
        }

        let frame_id = self.acquire_frame(&mut state)?;
        let page = match lock_mutex_recover(&self.pager).read_page(page_id) {
            Ok(page) => page,
            Err(e) => {
                state.free_list.push_front(frame_id);
                return Err(e);
            }
        };

        *self.frames[frame_id].write() = page;
        self.install(&mut state, frame_id, page_id, access_type);
        Ok(PageGuard::new(self, page_id, frame_id))
    }

    /// Like `fetch_page`, holding the frame's read latch for the guard's
    /// lifetime.
    pub fn fetch_page_read(
        self: &Arc<Self>,
        page_id: PageId,
        access_type: AccessType,
    ) -> io::Result<ReadPageGuard<'_>> {
        Ok(ReadPageGuard::new(self.fetch_page(page_id, access_type)?))
    }

    /// Like `fetch_page`, holding the frame's write latch for the guard's
    /// lifetime.
    pub fn fetch_page_write(
        self: &Arc<Self>,
        page_id: PageId,
        access_type: AccessType,
    ) -> io::Result<WritePageGuard<'_>> {
        Ok(WritePageGuard::new(self.fetch_page(page_id, access_type)?))
    }

    /// Frame selection shared by `new_page` and `fetch_page` misses: pop the
    /// free list, otherwise evict. A dirty victim is written back before the
    /// frame is handed out.
    fn acquire_frame(&self, state: &mut PoolState) -> io::Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = state
            .replacer
            .evict()
            .ok_or_else(|| io::Error::other("all frames are pinned"))?;
        debug_assert_eq!(state.meta[frame_id].pin_count, 0);

        let old_page_id = state.meta[frame_id].page_id;
        if state.meta[frame_id].is_dirty {
            crate::stratum_debug_log!(
                "[BufferPoolManager::acquire_frame] writing back dirty page {old_page_id}"
            );
            let frame = self.frames[frame_id].read();
            if let Err(e) = lock_mutex_recover(&self.pager).write_page(&frame) {
                // Put the victim back so the frame is not stranded.
                drop(frame);
                state.replacer.record_access(frame_id, AccessType::Unknown);
                state.replacer.set_evictable(frame_id, true);
                return Err(e);
            }
            state.meta[frame_id].is_dirty = false;
        }
        state.page_table.remove(&old_page_id);
        state.meta[frame_id].page_id = INVALID_PAGE_ID;
        self.frames[frame_id].write().reset();
        Ok(frame_id)
    }

    fn install(
        &self,
        state: &mut PoolState,
        frame_id: FrameId,
        page_id: PageId,
        access_type: AccessType,
    ) {
        let meta = &mut state.meta[frame_id];
        meta.page_id = page_id;
        meta.pin_count = 1;
        meta.is_dirty = false;
        state.page_table.insert(page_id, frame_id);
        state.replacer.record_access(frame_id, access_type);
        state.replacer.set_evictable(frame_id, false);
    }

    /// Called by guard drops. ORs the guard's dirty flag into the frame and
    /// makes the frame evictable once the last pin is gone. Write-back is
    /// deferred to eviction or an explicit flush.
    pub(crate) fn unpin_page(&self, page_id: PageId, frame_id: FrameId, is_dirty: bool) {
        let mut guard = lock_mutex_recover(&self.state);
        let state = &mut *guard;
        let meta = &mut state.meta[frame_id];
        debug_assert_eq!(meta.page_id, page_id);
        if meta.pin_count == 0 {
            return;
        }
        meta.is_dirty |= is_dirty;
        meta.pin_count -= 1;
        if meta.pin_count == 0 {
            state.replacer.set_evictable(frame_id, true);
        }
    }

    /// Writes a resident page to disk regardless of its dirty flag and
    /// clears the flag. Returns `false` when the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> io::Result<bool> {
        let mut state = lock_mutex_recover(&self.state);
        self.flush_frame_locked(&mut state, page_id)
    }

    /// Flushes every resident page under a single acquisition of the pool
    /// mutex.
    pub fn flush_all_pages(&self) -> io::Result<()> {
        let mut state = lock_mutex_recover(&self.state);
        let resident: Vec<PageId> = state.page_table.keys().copied().collect();
        for page_id in resident {
            self.flush_frame_locked(&mut state, page_id)?;
        }
        Ok(())
    }

    fn flush_frame_locked(&self, state: &mut PoolState, page_id: PageId) -> io::Result<bool> {
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Ok(false);
        };
        {
            let frame = self.frames[frame_id].read();
            lock_mutex_recover(&self.pager).write_page(&frame)?;
        }
        state.meta[frame_id].is_dirty = false;
        Ok(true)
    }

    /// Drops a page from the pool and deallocates its id. Returns `false`
    /// when the page is pinned; deleting a non-resident page succeeds
    /// (idempotent). The frame is reset without write-back: the page is
    /// being discarded.
    pub fn delete_page(&self, page_id: PageId) -> io::Result<bool> {
        let mut state = lock_mutex_recover(&self.state);
        if let Some(&frame_id) = state.page_table.get(&page_id) {
            if state.meta[frame_id].pin_count > 0 {
                return Ok(false);
            }
            state.page_table.remove(&page_id);
            state.replacer.remove(frame_id);
            state.meta[frame_id] = FrameMeta::new();
            self.frames[frame_id].write().reset();
            state.free_list.push_back(frame_id);
        }
        lock_mutex_recover(&self.pager).deallocate_page(page_id);
        Ok(true)
    }

    pub(crate) fn frame_latch(&self, frame_id: FrameId) -> &RwLock<Page> {
        &self.frames[frame_id]
    }

    /// Runs `f` against the pager. Exposed for tests and for callers that
    /// need allocation statistics.
    pub fn with_pager<R>(&self, f: impl FnOnce(&mut Pager) -> R) -> R {
        f(&mut lock_mutex_recover(&self.pager))
    }

    /// The pin count of a resident page, `None` otherwise.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = lock_mutex_recover(&self.state);
        let &frame_id = state.page_table.get(&page_id)?;
        Some(state.meta[frame_id].pin_count)
    }

    /// Frames that could service a miss right now: never-used frames plus
    /// evictable ones.
    pub fn free_frame_count(&self) -> usize {
        let state = lock_mutex_recover(&self.state);
        state.free_list.len() + state.replacer.size()
    }

    pub fn pool_size(&self) -> usize {
        self.frames.len()
    }
}
