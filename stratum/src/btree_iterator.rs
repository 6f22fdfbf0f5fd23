//! Forward iteration over the B+ tree's leaf chain.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::btree_page::LeafView;
use crate::buffer_pool::BufferPoolManager;
use crate::page_guard::PageGuard;
use crate::replacer::AccessType;
use crate::INVALID_PAGE_ID;

/// Walks leaf entries in ascending key order, holding exactly one pinned
/// leaf at a time. Stepping past a leaf's last entry releases it and fetches
/// the sibling through `next_page_id`; past the last leaf the iterator is
/// exhausted and holds nothing.
///
/// The tree latch is not held between steps, so concurrent structural
/// changes during a scan are the caller's responsibility.
pub struct TreeIterator<'a, K, V> {
    bpm: &'a Arc<BufferPoolManager>,
    guard: Option<PageGuard<'a>>,
    offset: usize,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<'a, K: Copy + 'static, V: Copy + 'static> TreeIterator<'a, K, V> {
    pub(crate) fn new(bpm: &'a Arc<BufferPoolManager>, guard: PageGuard<'a>, offset: usize) -> Self {
        TreeIterator {
            bpm,
            guard: Some(guard),
            offset,
            _marker: PhantomData,
        }
    }

    pub(crate) fn empty(bpm: &'a Arc<BufferPoolManager>) -> Self {
        TreeIterator {
            bpm,
            guard: None,
            offset: 0,
            _marker: PhantomData,
        }
    }
}

impl<K: Copy + 'static, V: Copy + 'static> Iterator for TreeIterator<'_, K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        loop {
            let guard = self.guard.as_ref()?;
            let next_page_id = {
                let frame = guard.read();
                let leaf = LeafView::<K, V>::new(&frame);
                if self.offset < leaf.size() {
                    let item = (leaf.key_at(self.offset), leaf.value_at(self.offset));
                    self.offset += 1;
                    return Some(item);
                }
                leaf.next_page_id()
            };

            if next_page_id == INVALID_PAGE_ID {
                self.guard = None;
                return None;
            }
            // The chain step is fatal on I/O failure, matching the engine's
            // abort-on-disk-error policy.
            let next_guard = self
                .bpm
                .fetch_page(next_page_id, AccessType::Scan)
                .expect("leaf chain page must be fetchable");
            self.guard = Some(next_guard);
            self.offset = 0;
        }
    }
}
