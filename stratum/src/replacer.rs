use std::collections::{HashMap, VecDeque};

use crate::FrameId;

/// How a page access was made. Recorded with every access; the replacer
/// keeps the most recent type per frame for future policy refinements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessType {
    #[default]
    Unknown,
    Lookup,
    Scan,
    Index,
}

/// Per-frame record: the last K access timestamps (oldest first) and the
/// evictability flag.
#[derive(Debug)]
struct LruKNode {
    history: VecDeque<u64>,
    is_evictable: bool,
    last_access_type: AccessType,
}

impl LruKNode {
    fn new(k: usize) -> Self {
        LruKNode {
            history: VecDeque::with_capacity(k),
            is_evictable: false,
            last_access_type: AccessType::Unknown,
        }
    }

    fn record(&mut self, timestamp: u64, k: usize, access_type: AccessType) {
        if self.history.len() == k {
            self.history.pop_front();
        }
        self.history.push_back(timestamp);
        self.last_access_type = access_type;
    }

    /// The oldest retained timestamp. With a full history this is the K-th
    /// most recent access, so the frame with the smallest value has the
    /// largest backward K-distance.
    fn oldest_timestamp(&self) -> u64 {
        *self.history.front().expect("accessed node has history")
    }
}

/// Implements the LRU-K replacement policy over buffer pool frames.
///
/// The victim is the evictable frame with the largest backward K-distance
/// (now minus the K-th most recent access). Frames with fewer than K
/// recorded accesses have an infinite K-distance and are evicted first,
/// ordered by their earliest recorded access.
///
/// The replacer holds no lock of its own: it lives inside the buffer pool's
/// state mutex and every mutating method takes `&mut self`.
#[derive(Debug)]
pub struct LruKReplacer {
    node_store: HashMap<FrameId, LruKNode>,
    current_timestamp: u64,
    curr_size: usize,
    replacer_size: usize,
    k: usize,
}

impl LruKReplacer {
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k >= 1, "LRU-K requires k >= 1");
        LruKReplacer {
            node_store: HashMap::new(),
            current_timestamp: 0,
            curr_size: 0,
            replacer_size: num_frames,
            k,
        }
    }

    fn advance_timestamp(&mut self) -> u64 {
        let timestamp = self.current_timestamp;
        self.current_timestamp += 1;
        timestamp
    }

    /// Records an access to `frame_id` at the current timestamp, creating
    /// the node on first touch. Does not change evictability.
    pub fn record_access(&mut self, frame_id: FrameId, access_type: AccessType) {
        assert!(frame_id < self.replacer_size, "invalid frame id {frame_id}");
        let timestamp = self.advance_timestamp();
        let k = self.k;
        self.node_store
            .entry(frame_id)
            .or_insert_with(|| LruKNode::new(k))
            .record(timestamp, k, access_type);
    }

    /// Flips the evictability of `frame_id`, adjusting the replacer's size
    /// only when the flag actually changes.
    ///
    /// Panics if the frame has never been recorded: that is a bookkeeping
    /// bug in the caller, not a recoverable condition.
    pub fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        assert!(frame_id < self.replacer_size, "invalid frame id {frame_id}");
        let node = self
            .node_store
            .get_mut(&frame_id)
            .unwrap_or_else(|| panic!("set_evictable on untracked frame {frame_id}"));
        if node.is_evictable != evictable {
            node.is_evictable = evictable;
            if evictable {
                self.curr_size += 1;
            } else {
                self.curr_size -= 1;
            }
        }
    }

    /// Evicts the frame with the largest backward K-distance, removing its
    /// access history. Returns `None` when nothing is evictable.
    pub fn evict(&mut self) -> Option<FrameId> {
        if self.curr_size == 0 {
            return None;
        }

        // Order victims by (has full history, oldest timestamp, frame id):
        // infinite K-distance first, then earliest K-th-recent access. The
        // frame id tail keeps the choice independent of hash iteration order.
        let victim = self
            .node_store
            .iter()
            .filter(|(_, node)| node.is_evictable)
            .map(|(&frame_id, node)| {
                (
                    node.history.len() >= self.k,
                    node.oldest_timestamp(),
                    frame_id,
                )
            })
            .min()?;

        let frame_id = victim.2;
        if let Some(node) = self.node_store.remove(&frame_id) {
            crate::stratum_debug_log!(
                "[LruKReplacer::evict] frame {frame_id} evicted (last access {:?})",
                node.last_access_type
            );
        }
        self.curr_size -= 1;
        Some(frame_id)
    }

    /// Removes a frame's history unconditionally. The frame must be tracked
    /// and evictable; anything else is a caller bug and panics.
    pub fn remove(&mut self, frame_id: FrameId) {
        let node = self
            .node_store
            .get(&frame_id)
            .unwrap_or_else(|| panic!("remove on untracked frame {frame_id}"));
        assert!(
            node.is_evictable,
            "remove on non-evictable frame {frame_id}"
        );
        self.node_store.remove(&frame_id);
        self.curr_size -= 1;
    }

    /// Number of currently evictable frames.
    pub fn size(&self) -> usize {
        self.curr_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(replacer: &mut LruKReplacer, frame_id: FrameId) {
        replacer.record_access(frame_id, AccessType::Unknown);
    }

    #[test]
    fn evict_empty_returns_none() {
        let mut replacer = LruKReplacer::new(8, 2);
        assert_eq!(replacer.evict(), None);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn only_evictable_frames_are_victims() {
        let mut replacer = LruKReplacer::new(8, 2);
        touch(&mut replacer, 2);
        assert_eq!(replacer.evict(), None);
        replacer.set_evictable(2, true);
        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.evict(), Some(2));
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn infinite_k_distance_dominates() {
        // Frame 1 has three accesses, frame 2 only one: frame 2 has an
        // infinite backward K-distance and goes first despite being newer.
        let mut replacer = LruKReplacer::new(8, 3);
        touch(&mut replacer, 1);
        touch(&mut replacer, 1);
        touch(&mut replacer, 2);
        touch(&mut replacer, 1);
        replacer.set_evictable(2, true);
        replacer.set_evictable(1, true);

        assert_eq!(replacer.evict(), Some(2));
        assert_eq!(replacer.evict(), Some(1));
    }

    #[test]
    fn largest_backward_k_distance_wins() {
        // Access order: 1 2 3 3 3 2 2 1 1 3 2 1. With k = 3 the retained
        // K-th-most-recent timestamps are frame 3: 3, frame 2: 5, frame 1: 7,
        // so the eviction order is 3, 2, 1.
        let mut replacer = LruKReplacer::new(8, 3);
        for frame_id in [1, 2, 3, 3, 3, 2, 2, 1, 1, 3, 2, 1] {
            touch(&mut replacer, frame_id);
        }
        replacer.set_evictable(2, true);
        replacer.set_evictable(1, true);
        replacer.set_evictable(3, true);

        assert_eq!(replacer.evict(), Some(3));
        assert_eq!(replacer.evict(), Some(2));
        assert_eq!(replacer.evict(), Some(1));
    }

    #[test]
    fn two_frame_scenario_with_k_two() {
        // A@t0, B@t1, A@t2. With K = 2, B has infinite K-distance: B first.
        let mut replacer = LruKReplacer::new(4, 2);
        touch(&mut replacer, 0); // A
        touch(&mut replacer, 1); // B
        touch(&mut replacer, 0); // A again
        replacer.set_evictable(0, true);
        replacer.set_evictable(1, true);

        assert_eq!(replacer.evict(), Some(1));
        assert_eq!(replacer.evict(), Some(0));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn classic_interleaving() {
        let mut replacer = LruKReplacer::new(8, 2);

        // Six frames; frame 6 stays pinned.
        for frame_id in 1..=6 {
            touch(&mut replacer, frame_id);
        }
        for frame_id in 1..=5 {
            replacer.set_evictable(frame_id, true);
        }
        replacer.set_evictable(6, false);
        assert_eq!(replacer.size(), 5);

        // A second access to frame 1 pushes it out of the infinite class.
        touch(&mut replacer, 1);

        assert_eq!(replacer.evict(), Some(2));
        assert_eq!(replacer.evict(), Some(3));
        assert_eq!(replacer.evict(), Some(4));
        assert_eq!(replacer.size(), 2);

        // Reinsert 3 and 4 with fresh history.
        touch(&mut replacer, 3);
        touch(&mut replacer, 4);
        touch(&mut replacer, 5);
        touch(&mut replacer, 4);
        replacer.set_evictable(3, true);
        replacer.set_evictable(4, true);
        assert_eq!(replacer.size(), 4);

        // 3 has a single access and the earliest first touch among the
        // infinite-distance frames.
        assert_eq!(replacer.evict(), Some(3));
        assert_eq!(replacer.size(), 3);

        replacer.set_evictable(6, true);
        assert_eq!(replacer.size(), 4);
        assert_eq!(replacer.evict(), Some(6));
        assert_eq!(replacer.size(), 3);

        replacer.set_evictable(1, false);
        assert_eq!(replacer.size(), 2);
        assert_eq!(replacer.evict(), Some(5));

        touch(&mut replacer, 1);
        touch(&mut replacer, 1);
        replacer.set_evictable(1, true);
        assert_eq!(replacer.size(), 2);

        // Frame 4's K-th recent access is older than frame 1's.
        assert_eq!(replacer.evict(), Some(4));
        assert_eq!(replacer.evict(), Some(1));
        assert_eq!(replacer.evict(), None);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn set_evictable_is_idempotent_on_size() {
        let mut replacer = LruKReplacer::new(4, 2);
        touch(&mut replacer, 1);
        replacer.set_evictable(1, true);
        replacer.set_evictable(1, true);
        assert_eq!(replacer.size(), 1);
        replacer.set_evictable(1, false);
        replacer.set_evictable(1, false);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn remove_adjusts_size() {
        let mut replacer = LruKReplacer::new(4, 2);
        touch(&mut replacer, 1);
        touch(&mut replacer, 2);
        replacer.set_evictable(1, true);
        replacer.set_evictable(2, true);
        replacer.remove(1);
        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.evict(), Some(2));
    }

    #[test]
    #[should_panic(expected = "untracked frame")]
    fn set_evictable_on_unknown_frame_panics() {
        let mut replacer = LruKReplacer::new(4, 2);
        replacer.set_evictable(3, true);
    }

    #[test]
    #[should_panic(expected = "non-evictable frame")]
    fn remove_pinned_frame_panics() {
        let mut replacer = LruKReplacer::new(4, 2);
        touch(&mut replacer, 1);
        replacer.remove(1);
    }

    #[test]
    #[should_panic(expected = "invalid frame id")]
    fn out_of_range_frame_id_panics() {
        let mut replacer = LruKReplacer::new(4, 2);
        touch(&mut replacer, 4);
    }
}
