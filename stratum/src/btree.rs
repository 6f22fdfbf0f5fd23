//! B+ tree index implementation.
//!
//! The tree lives entirely in buffer pool pages: a header page holding the
//! current root id, internal pages of `(separator, child)` entries and leaf
//! pages of `(key, value)` entries chained in key order. Keys are unique and
//! ordered by an injected comparator.
//!
//! Structural operations descend from the root while remembering the taken
//! path as a stack of `(guard, child slot)` pairs, then resolve splits or
//! underflows bottom-up along that stack. Concurrency is coarse: one tree
//! latch shared by readers, exclusive for insert and remove.

use std::cmp::Ordering;
use std::io;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::btree_iterator::TreeIterator;
use crate::btree_page::{
    is_leaf, page_header, HeaderPageData, InternalView, InternalViewMut, LeafView, LeafViewMut,
    PAGE_TYPE_LEAF,
};
use crate::buffer_pool::BufferPoolManager;
use crate::page_guard::PageGuard;
use crate::replacer::AccessType;
use crate::{PageId, INVALID_PAGE_ID};

/// Total order over keys, injected at construction.
pub type KeyComparator<K> = fn(&K, &K) -> Ordering;

/// An ordered unique-key index over fixed-size keys and values.
///
/// `K` and `V` must be plain-old-data: they are stored by reinterpreting
/// their bytes in page frames.
pub struct BPlusTree<K, V> {
    name: String,
    header_page_id: PageId,
    bpm: Arc<BufferPoolManager>,
    comparator: KeyComparator<K>,
    leaf_max_size: u32,
    internal_max_size: u32,
    tree_latch: RwLock<()>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K: Copy + 'static, V: Copy + 'static> BPlusTree<K, V> {
    /// Creates an index rooted at `header_page_id`, which the caller must
    /// have allocated beforehand. The header is reset to an empty tree.
    pub fn new(
        name: impl Into<String>,
        header_page_id: PageId,
        bpm: Arc<BufferPoolManager>,
        comparator: KeyComparator<K>,
        leaf_max_size: u32,
        internal_max_size: u32,
    ) -> io::Result<Self> {
        assert!(leaf_max_size >= 2, "leaf pages need room for two entries");
        assert!(
            internal_max_size >= 3,
            "internal pages need room for three children"
        );
        let tree = BPlusTree {
            name: name.into(),
            header_page_id,
            bpm,
            comparator,
            leaf_max_size,
            internal_max_size,
            tree_latch: RwLock::new(()),
            _marker: PhantomData,
        };

        {
            let mut header_guard = tree.bpm.fetch_page(header_page_id, AccessType::Unknown)?;
            header_guard.write().write_at(
                0,
                HeaderPageData {
                    root_page_id: INVALID_PAGE_ID,
                },
            );
        }
        crate::stratum_debug_log!(
            "[BPlusTree::new] index {} created, header page {header_page_id}",
            tree.name
        );
        Ok(tree)
    }

    pub fn root_page_id(&self) -> io::Result<PageId> {
        let guard = self.bpm.fetch_page(self.header_page_id, AccessType::Lookup)?;
        let root_page_id = guard.read().read_at::<HeaderPageData>(0).root_page_id;
        Ok(root_page_id)
    }

    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.root_page_id()? == INVALID_PAGE_ID)
    }

    /// Point lookup.
    pub fn get(&self, key: &K) -> io::Result<Option<V>> {
        let _latch = self.tree_latch.read();
        let root_id = self.root_page_id()?;
        if root_id == INVALID_PAGE_ID {
            return Ok(None);
        }
        let guard = self.find_leaf(root_id, key, None, AccessType::Lookup)?;
        let frame = guard.read();
        let leaf = LeafView::<K, V>::new(&frame);
        Ok(leaf
            .find(key, self.comparator)
            .map(|index| leaf.value_at(index)))
    }

    /// Inserts `key -> value`. Returns `Ok(false)` without mutating anything
    /// when the key already exists.
    pub fn insert(&self, key: K, value: V) -> io::Result<bool> {
        let _latch = self.tree_latch.write();
        let mut header_guard = self.bpm.fetch_page(self.header_page_id, AccessType::Index)?;
        let root_id = header_guard.read().read_at::<HeaderPageData>(0).root_page_id;

        if root_id == INVALID_PAGE_ID {
            let mut root_guard = self.bpm.new_page()?;
            let root_page_id = root_guard.page_id();
            {
                let mut frame = root_guard.write();
                let mut leaf = LeafViewMut::<K, V>::new(&mut frame);
                leaf.init(self.leaf_max_size);
                leaf.insert_at(0, key, value);
            }
            header_guard.write().write_at(0, HeaderPageData { root_page_id });
            return Ok(true);
        }

        let mut path: Vec<(PageGuard<'_>, usize)> = Vec::new();
        let mut leaf_guard = self.find_leaf(root_id, &key, Some(&mut path), AccessType::Index)?;
        let leaf_page_id = leaf_guard.page_id();

        let (pos, leaf_size) = {
            let frame = leaf_guard.read();
            let leaf = LeafView::<K, V>::new(&frame);
            if leaf.find(&key, self.comparator).is_some() {
                return Ok(false);
            }
            (leaf.lower_bound(&key, self.comparator), leaf.size())
        };

        if (leaf_size as u32) < self.leaf_max_size {
            let mut frame = leaf_guard.write();
            LeafViewMut::<K, V>::new(&mut frame).insert_at(pos, key, value);
            return Ok(true);
        }

        // Leaf is full: split it, then push the separator up the remembered
        // path.
        let mut sibling_guard = self.bpm.new_page()?;
        let sibling_id = sibling_guard.page_id();
        let separator = {
            let mut frame = leaf_guard.write();
            let mut leaf = LeafViewMut::<K, V>::new(&mut frame);
            let mut sibling_frame = sibling_guard.write();
            let mut sibling = LeafViewMut::<K, V>::new(&mut sibling_frame);
            sibling.init(self.leaf_max_size);

            let mut entries: Vec<(K, V)> = Vec::with_capacity(leaf_size + 1);
            for i in 0..leaf_size {
                entries.push((leaf.as_view().key_at(i), leaf.as_view().value_at(i)));
            }
            entries.insert(pos, (key, value));

            let left_count = entries.len() / 2;
            leaf.set_size(0);
            for &(k, v) in &entries[..left_count] {
                leaf.push(k, v);
            }
            for &(k, v) in &entries[left_count..] {
                sibling.push(k, v);
            }
            sibling.set_next_page_id(leaf.as_view().next_page_id());
            leaf.set_next_page_id(sibling_id);
            entries[left_count].0
        };
        drop(sibling_guard);
        drop(leaf_guard);
        crate::stratum_debug_log!(
            "[BPlusTree::insert] index {}: leaf {leaf_page_id} split, new sibling {sibling_id}",
            self.name
        );

        let mut carry = (separator, sibling_id);
        let mut split_child_id = leaf_page_id;
        let mut placed = false;

        while let Some((mut parent_guard, _slot)) = path.pop() {
            let parent_size = page_header(&parent_guard.read()).size;
            if parent_size < self.internal_max_size {
                let mut frame = parent_guard.write();
                let mut parent = InternalViewMut::<K>::new(&mut frame);
                let pos = parent.as_view().child_index(&carry.0, self.comparator) + 1;
                parent.insert_at(pos, carry.0, carry.1);
                placed = true;
                break;
            }

            // Full internal page: mid-split, promoting the middle entry.
            let mut new_guard = self.bpm.new_page()?;
            let new_id = new_guard.page_id();
            {
                let mut frame = parent_guard.write();
                let mut parent = InternalViewMut::<K>::new(&mut frame);
                let mut new_frame = new_guard.write();
                let mut sibling = InternalViewMut::<K>::new(&mut new_frame);
                sibling.init(self.internal_max_size);

                let size = parent.as_view().size();
                let mut entries: Vec<(K, PageId)> = Vec::with_capacity(size + 1);
                for i in 0..size {
                    entries.push((parent.as_view().key_at(i), parent.as_view().value_at(i)));
                }
                let pos = parent.as_view().child_index(&carry.0, self.comparator) + 1;
                entries.insert(pos, carry);

                // The promoted entry's child becomes the sibling's slot 0.
                let promote = entries.len() / 2;
                parent.set_size(0);
                for &(k, v) in &entries[..promote] {
                    parent.push(k, v);
                }
                for &(k, v) in &entries[promote..] {
                    sibling.push(k, v);
                }
                carry = (entries[promote].0, new_id);
            }
            drop(new_guard);
            split_child_id = parent_guard.page_id();
        }

        if !placed {
            // The split reached the top: grow the tree by one level.
            let mut new_root_guard = self.bpm.new_page()?;
            let new_root_id = new_root_guard.page_id();
            {
                let mut frame = new_root_guard.write();
                let mut root = InternalViewMut::<K>::new(&mut frame);
                root.init(self.internal_max_size);
                root.push(carry.0, split_child_id);
                root.push(carry.0, carry.1);
            }
            header_guard.write().write_at(
                0,
                HeaderPageData {
                    root_page_id: new_root_id,
                },
            );
            crate::stratum_debug_log!(
                "[BPlusTree::insert] index {}: new root {new_root_id}",
                self.name
            );
        }
        Ok(true)
    }

    /// Removes `key`. Absent keys are a silent no-op.
    pub fn remove(&self, key: &K) -> io::Result<()> {
        let _latch = self.tree_latch.write();
        let mut header_guard = self.bpm.fetch_page(self.header_page_id, AccessType::Index)?;
        let root_id = header_guard.read().read_at::<HeaderPageData>(0).root_page_id;
        if root_id == INVALID_PAGE_ID {
            return Ok(());
        }

        let mut path: Vec<(PageGuard<'_>, usize)> = Vec::new();
        let mut leaf_guard = self.find_leaf(root_id, key, Some(&mut path), AccessType::Index)?;
        let leaf_page_id = leaf_guard.page_id();

        let index = {
            let frame = leaf_guard.read();
            LeafView::<K, V>::new(&frame).find(key, self.comparator)
        };
        let Some(index) = index else {
            return Ok(());
        };
        let leaf_size = {
            let mut frame = leaf_guard.write();
            let mut leaf = LeafViewMut::<K, V>::new(&mut frame);
            leaf.remove_at(index);
            leaf.as_view().size()
        };

        if path.is_empty() {
            // The root is a leaf; it may underflow freely, but an empty tree
            // resets the header.
            if leaf_size == 0 {
                header_guard.write().write_at(
                    0,
                    HeaderPageData {
                        root_page_id: INVALID_PAGE_ID,
                    },
                );
                drop(leaf_guard);
                let deleted = self.bpm.delete_page(leaf_page_id)?;
                debug_assert!(deleted);
            }
            return Ok(());
        }

        let min_leaf = self.leaf_max_size.div_ceil(2) as usize;
        if leaf_size >= min_leaf {
            return Ok(());
        }

        let (mut parent_guard, child_slot) = path.pop().expect("non-root leaf has a parent");
        let (left_id, right_id) = {
            let frame = parent_guard.read();
            let parent = InternalView::<K>::new(&frame);
            let left = (child_slot > 0).then(|| parent.value_at(child_slot - 1));
            let right =
                (child_slot + 1 < parent.size()).then(|| parent.value_at(child_slot + 1));
            (left, right)
        };

        // Prefer redistribution: a left sibling lends its last entry, a
        // right sibling its first; the parent separator moves to the new
        // boundary key.
        if let Some(left_id) = left_id {
            let mut left_guard = self.bpm.fetch_page(left_id, AccessType::Index)?;
            let left_size = page_header(&left_guard.read()).size as usize;
            if left_size > min_leaf {
                let (moved_key, moved_value) = {
                    let frame = left_guard.read();
                    let left = LeafView::<K, V>::new(&frame);
                    (left.key_at(left_size - 1), left.value_at(left_size - 1))
                };
                {
                    let mut frame = left_guard.write();
                    LeafViewMut::<K, V>::new(&mut frame).remove_at(left_size - 1);
                }
                {
                    let mut frame = leaf_guard.write();
                    LeafViewMut::<K, V>::new(&mut frame).insert_at(0, moved_key, moved_value);
                }
                let mut frame = parent_guard.write();
                InternalViewMut::<K>::new(&mut frame).set_key_at(child_slot, moved_key);
                return Ok(());
            }
        }

        if let Some(right_id) = right_id {
            let mut right_guard = self.bpm.fetch_page(right_id, AccessType::Index)?;
            let right_size = page_header(&right_guard.read()).size as usize;
            if right_size > min_leaf {
                let (moved_key, moved_value, new_boundary) = {
                    let frame = right_guard.read();
                    let right = LeafView::<K, V>::new(&frame);
                    (right.key_at(0), right.value_at(0), right.key_at(1))
                };
                {
                    let mut frame = right_guard.write();
                    LeafViewMut::<K, V>::new(&mut frame).remove_at(0);
                }
                {
                    let mut frame = leaf_guard.write();
                    LeafViewMut::<K, V>::new(&mut frame).push(moved_key, moved_value);
                }
                let mut frame = parent_guard.write();
                InternalViewMut::<K>::new(&mut frame).set_key_at(child_slot + 1, new_boundary);
                return Ok(());
            }
        }

        // Neither sibling can spare an entry: merge, splicing out the
        // obsolete separator and fixing the leaf chain.
        if let Some(left_id) = left_id {
            let mut left_guard = self.bpm.fetch_page(left_id, AccessType::Index)?;
            {
                let frame = leaf_guard.read();
                let leaf = LeafView::<K, V>::new(&frame);
                let mut left_frame = left_guard.write();
                let mut left = LeafViewMut::<K, V>::new(&mut left_frame);
                for i in 0..leaf.size() {
                    left.push(leaf.key_at(i), leaf.value_at(i));
                }
                left.set_next_page_id(leaf.next_page_id());
            }
            {
                let mut frame = parent_guard.write();
                InternalViewMut::<K>::new(&mut frame).remove_at(child_slot);
            }
            drop(leaf_guard);
            let deleted = self.bpm.delete_page(leaf_page_id)?;
            debug_assert!(deleted);
        } else {
            let right_id = right_id.expect("non-root leaf has at least one sibling");
            let right_guard = self.bpm.fetch_page(right_id, AccessType::Index)?;
            {
                let frame = right_guard.read();
                let right = LeafView::<K, V>::new(&frame);
                let mut leaf_frame = leaf_guard.write();
                let mut leaf = LeafViewMut::<K, V>::new(&mut leaf_frame);
                for i in 0..right.size() {
                    leaf.push(right.key_at(i), right.value_at(i));
                }
                leaf.set_next_page_id(right.next_page_id());
            }
            {
                let mut frame = parent_guard.write();
                InternalViewMut::<K>::new(&mut frame).remove_at(child_slot + 1);
            }
            drop(right_guard);
            let deleted = self.bpm.delete_page(right_id)?;
            debug_assert!(deleted);
            drop(leaf_guard);
        }

        self.rebalance_internals(&mut header_guard, parent_guard, path)
    }

    /// Walks the remembered path upward, applying the same
    /// redistribute-then-merge rule at the internal level until a node is
    /// full enough or the root is reached.
    fn rebalance_internals<'a>(
        &'a self,
        header_guard: &mut PageGuard<'a>,
        start: PageGuard<'a>,
        mut path: Vec<(PageGuard<'a>, usize)>,
    ) -> io::Result<()> {
        let min_internal = self.internal_max_size.div_ceil(2) as usize;
        let mut node_guard = start;

        loop {
            let node_size = page_header(&node_guard.read()).size as usize;

            if path.is_empty() {
                // The node is the root. A root with a single child hands its
                // place to that child.
                if node_size == 1 {
                    let only_child = {
                        let frame = node_guard.read();
                        InternalView::<K>::new(&frame).value_at(0)
                    };
                    let node_id = node_guard.page_id();
                    header_guard.write().write_at(
                        0,
                        HeaderPageData {
                            root_page_id: only_child,
                        },
                    );
                    drop(node_guard);
                    let deleted = self.bpm.delete_page(node_id)?;
                    debug_assert!(deleted);
                    crate::stratum_debug_log!(
                        "[BPlusTree::remove] index {}: root collapsed into {only_child}",
                        self.name
                    );
                }
                return Ok(());
            }

            if node_size >= min_internal {
                return Ok(());
            }

            let (mut parent_guard, node_slot) = path.pop().expect("checked non-empty");
            let node_id = node_guard.page_id();
            let (left_id, right_id) = {
                let frame = parent_guard.read();
                let parent = InternalView::<K>::new(&frame);
                let left = (node_slot > 0).then(|| parent.value_at(node_slot - 1));
                let right =
                    (node_slot + 1 < parent.size()).then(|| parent.value_at(node_slot + 1));
                (left, right)
            };

            // Internal redistribution rotates through the parent separator:
            // the separator descends into the deficient node, the sibling's
            // boundary key ascends.
            if let Some(left_id) = left_id {
                let mut left_guard = self.bpm.fetch_page(left_id, AccessType::Index)?;
                let left_size = page_header(&left_guard.read()).size as usize;
                if left_size > min_internal {
                    let (lent_key, lent_child) = {
                        let frame = left_guard.read();
                        let left = InternalView::<K>::new(&frame);
                        (left.key_at(left_size - 1), left.value_at(left_size - 1))
                    };
                    let separator = {
                        let frame = parent_guard.read();
                        InternalView::<K>::new(&frame).key_at(node_slot)
                    };
                    {
                        let mut frame = left_guard.write();
                        InternalViewMut::<K>::new(&mut frame).set_size(left_size as u32 - 1);
                    }
                    {
                        let mut frame = node_guard.write();
                        InternalViewMut::<K>::new(&mut frame).insert_front(separator, lent_child);
                    }
                    let mut frame = parent_guard.write();
                    InternalViewMut::<K>::new(&mut frame).set_key_at(node_slot, lent_key);
                    return Ok(());
                }
            }

            if let Some(right_id) = right_id {
                let mut right_guard = self.bpm.fetch_page(right_id, AccessType::Index)?;
                let right_size = page_header(&right_guard.read()).size as usize;
                if right_size > min_internal {
                    let (separator, lent_child, new_boundary) = {
                        let parent_frame = parent_guard.read();
                        let parent = InternalView::<K>::new(&parent_frame);
                        let right_frame = right_guard.read();
                        let right = InternalView::<K>::new(&right_frame);
                        (
                            parent.key_at(node_slot + 1),
                            right.value_at(0),
                            right.key_at(1),
                        )
                    };
                    {
                        let mut frame = node_guard.write();
                        InternalViewMut::<K>::new(&mut frame).push(separator, lent_child);
                    }
                    {
                        let mut frame = right_guard.write();
                        InternalViewMut::<K>::new(&mut frame).remove_front();
                    }
                    let mut frame = parent_guard.write();
                    InternalViewMut::<K>::new(&mut frame).set_key_at(node_slot + 1, new_boundary);
                    return Ok(());
                }
            }

            // Merge through the separator, then continue with the parent.
            if let Some(left_id) = left_id {
                let mut left_guard = self.bpm.fetch_page(left_id, AccessType::Index)?;
                let separator = {
                    let frame = parent_guard.read();
                    InternalView::<K>::new(&frame).key_at(node_slot)
                };
                {
                    let frame = node_guard.read();
                    let node = InternalView::<K>::new(&frame);
                    let mut left_frame = left_guard.write();
                    let mut left = InternalViewMut::<K>::new(&mut left_frame);
                    left.push(separator, node.value_at(0));
                    for i in 1..node.size() {
                        left.push(node.key_at(i), node.value_at(i));
                    }
                }
                {
                    let mut frame = parent_guard.write();
                    InternalViewMut::<K>::new(&mut frame).remove_at(node_slot);
                }
                drop(node_guard);
                let deleted = self.bpm.delete_page(node_id)?;
                debug_assert!(deleted);
            } else {
                let right_id = right_id.expect("non-root internal has at least one sibling");
                let right_guard = self.bpm.fetch_page(right_id, AccessType::Index)?;
                let separator = {
                    let frame = parent_guard.read();
                    InternalView::<K>::new(&frame).key_at(node_slot + 1)
                };
                {
                    let frame = right_guard.read();
                    let right = InternalView::<K>::new(&frame);
                    let mut node_frame = node_guard.write();
                    let mut node = InternalViewMut::<K>::new(&mut node_frame);
                    node.push(separator, right.value_at(0));
                    for i in 1..right.size() {
                        node.push(right.key_at(i), right.value_at(i));
                    }
                }
                {
                    let mut frame = parent_guard.write();
                    InternalViewMut::<K>::new(&mut frame).remove_at(node_slot + 1);
                }
                drop(right_guard);
                let deleted = self.bpm.delete_page(right_id)?;
                debug_assert!(deleted);
            }

            node_guard = parent_guard;
        }
    }

    /// Forward iterator over the whole key range.
    pub fn iter(&self) -> io::Result<TreeIterator<'_, K, V>> {
        let _latch = self.tree_latch.read();
        let root_id = self.root_page_id()?;
        if root_id == INVALID_PAGE_ID {
            return Ok(TreeIterator::empty(&self.bpm));
        }
        let guard = self.leftmost_leaf(root_id)?;
        Ok(TreeIterator::new(&self.bpm, guard, 0))
    }

    /// Forward iterator starting at the first entry whose key is >= `key`.
    pub fn iter_from(&self, key: &K) -> io::Result<TreeIterator<'_, K, V>> {
        let _latch = self.tree_latch.read();
        let root_id = self.root_page_id()?;
        if root_id == INVALID_PAGE_ID {
            return Ok(TreeIterator::empty(&self.bpm));
        }
        let guard = self.find_leaf(root_id, key, None, AccessType::Scan)?;
        let offset = {
            let frame = guard.read();
            LeafView::<K, V>::new(&frame).lower_bound(key, self.comparator)
        };
        Ok(TreeIterator::new(&self.bpm, guard, offset))
    }

    /// Walks the whole tree and panics on any violated invariant: key order,
    /// separator ranges, minimum fill, uniform leaf depth and leaf-chain
    /// coverage.
    pub fn verify(&self) -> io::Result<()> {
        let _latch = self.tree_latch.read();
        let root_id = self.root_page_id()?;
        if root_id == INVALID_PAGE_ID {
            return Ok(());
        }

        let mut leaf_depth = None;
        let mut key_count = 0usize;
        self.verify_node(root_id, true, None, None, 0, &mut leaf_depth, &mut key_count)?;

        let mut chain_count = 0usize;
        let mut prev: Option<K> = None;
        let mut guard = self.leftmost_leaf(root_id)?;
        loop {
            let next_id = {
                let frame = guard.read();
                let leaf = LeafView::<K, V>::new(&frame);
                for i in 0..leaf.size() {
                    let key = leaf.key_at(i);
                    if let Some(prev_key) = prev {
                        assert_eq!(
                            (self.comparator)(&prev_key, &key),
                            Ordering::Less,
                            "leaf chain out of order"
                        );
                    }
                    prev = Some(key);
                    chain_count += 1;
                }
                leaf.next_page_id()
            };
            if next_id == INVALID_PAGE_ID {
                break;
            }
            guard = self.bpm.fetch_page(next_id, AccessType::Scan)?;
        }
        assert_eq!(chain_count, key_count, "leaf chain must cover the key set");
        Ok(())
    }

    fn verify_node(
        &self,
        page_id: PageId,
        is_root: bool,
        lower: Option<K>,
        upper: Option<K>,
        depth: usize,
        leaf_depth: &mut Option<usize>,
        key_count: &mut usize,
    ) -> io::Result<()> {
        let guard = self.bpm.fetch_page(page_id, AccessType::Lookup)?;
        let frame = guard.read();
        let header = page_header(&frame);
        let in_range = |key: &K| {
            let above = lower
                .as_ref()
                .map_or(true, |low| (self.comparator)(low, key) != Ordering::Greater);
            let below = upper
                .as_ref()
                .map_or(true, |up| (self.comparator)(key, up) == Ordering::Less);
            above && below
        };

        if header.page_type == PAGE_TYPE_LEAF {
            let leaf = LeafView::<K, V>::new(&frame);
            match *leaf_depth {
                None => *leaf_depth = Some(depth),
                Some(expected) => assert_eq!(expected, depth, "all leaves must share a depth"),
            }
            if !is_root {
                assert!(
                    leaf.size() >= self.leaf_max_size.div_ceil(2) as usize,
                    "leaf {page_id} below minimum fill"
                );
            }
            for i in 0..leaf.size() {
                let key = leaf.key_at(i);
                if i > 0 {
                    assert_eq!(
                        (self.comparator)(&leaf.key_at(i - 1), &key),
                        Ordering::Less,
                        "leaf {page_id} keys out of order"
                    );
                }
                assert!(in_range(&key), "leaf {page_id} key outside separator range");
                *key_count += 1;
            }
            return Ok(());
        }

        let internal = InternalView::<K>::new(&frame);
        let size = internal.size();
        if is_root {
            assert!(size >= 2, "internal root must keep two children");
        } else {
            assert!(
                size >= self.internal_max_size.div_ceil(2) as usize,
                "internal {page_id} below minimum fill"
            );
        }
        for i in 1..size {
            let key = internal.key_at(i);
            if i > 1 {
                assert_eq!(
                    (self.comparator)(&internal.key_at(i - 1), &key),
                    Ordering::Less,
                    "internal {page_id} separators out of order"
                );
            }
            assert!(
                in_range(&key),
                "internal {page_id} separator outside parent range"
            );
        }
        for i in 0..size {
            let child_lower = if i == 0 { lower } else { Some(internal.key_at(i)) };
            let child_upper = if i + 1 < size {
                Some(internal.key_at(i + 1))
            } else {
                upper
            };
            self.verify_node(
                internal.value_at(i),
                false,
                child_lower,
                child_upper,
                depth + 1,
                leaf_depth,
                key_count,
            )?;
        }
        Ok(())
    }

    /// Binary-search descent to the leaf owning `key`. When `path` is given,
    /// every traversed internal page is pushed together with the child slot
    /// taken.
    fn find_leaf<'a>(
        &'a self,
        root_id: PageId,
        key: &K,
        mut path: Option<&mut Vec<(PageGuard<'a>, usize)>>,
        access_type: AccessType,
    ) -> io::Result<PageGuard<'a>> {
        let mut page_id = root_id;
        loop {
            let guard = self.bpm.fetch_page(page_id, access_type)?;
            let next = {
                let frame = guard.read();
                if is_leaf(&frame) {
                    None
                } else {
                    let internal = InternalView::<K>::new(&frame);
                    let slot = internal.child_index(key, self.comparator);
                    Some((slot, internal.value_at(slot)))
                }
            };
            match next {
                None => return Ok(guard),
                Some((slot, child)) => {
                    if let Some(p) = path.as_mut() {
                        p.push((guard, slot));
                    }
                    page_id = child;
                }
            }
        }
    }

    fn leftmost_leaf(&self, root_id: PageId) -> io::Result<PageGuard<'_>> {
        let mut page_id = root_id;
        loop {
            let guard = self.bpm.fetch_page(page_id, AccessType::Scan)?;
            let next = {
                let frame = guard.read();
                if is_leaf(&frame) {
                    None
                } else {
                    Some(InternalView::<K>::new(&frame).value_at(0))
                }
            };
            match next {
                None => return Ok(guard),
                Some(child) => page_id = child,
            }
        }
    }
}
