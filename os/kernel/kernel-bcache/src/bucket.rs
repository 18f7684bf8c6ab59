//! Hash buckets: LRU lists threaded through a fixed node arena.
//!
//! Each buffer slot has a [`Node`] holding its cache identity, reference
//! count and list links. A node belongs to exactly one bucket at a time and is
//! only touched through a [`BucketGuard`] for that bucket, i.e. while holding
//! the bucket's spin lock. A node changes buckets only in
//! [`BucketGuard::adopt`], which holds both the donor's and the target's lock.

use crate::device::BlockId;
use core::cell::UnsafeCell;
use kernel_sync::SpinLockGuard;

/// Cache metadata for one buffer slot.
pub(crate) struct Node {
    /// Block currently assigned to the slot; `None` until first use.
    pub(crate) block: Option<BlockId>,
    /// Holders, waiters and pins.
    pub(crate) refcnt: u32,
    /// Pins (part of `refcnt`).
    pub(crate) pins: u32,
    /// Neighbor toward the MRU end.
    prev: Option<usize>,
    /// Neighbor toward the LRU end.
    next: Option<usize>,
    /// Bucket whose list this node is on.
    bucket: usize,
}

impl Node {
    const fn new(bucket: usize) -> Self {
        Self {
            block: None,
            refcnt: 0,
            pins: 0,
            prev: None,
            next: None,
            bucket,
        }
    }
}

/// Ends of one bucket's list. `mru` is the most recently released node.
pub(crate) struct Bucket {
    mru: Option<usize>,
    lru: Option<usize>,
}

impl Bucket {
    pub(crate) const fn new() -> Self {
        Self {
            mru: None,
            lru: None,
        }
    }
}

/// The node arena. Slot `i` describes buffer `i`.
pub(crate) struct Nodes<const NBUF: usize>([UnsafeCell<Node>; NBUF]);

// Safety: node `i` is only accessed through a `BucketGuard` for the bucket
// recorded in the node, so every access is serialized by that bucket's lock.
unsafe impl<const NBUF: usize> Sync for Nodes<NBUF> {}

impl<const NBUF: usize> Nodes<NBUF> {
    /// Nodes dealt round-robin across `buckets` buckets. Lists are linked
    /// separately via [`BucketGuard::push_front`].
    pub(crate) fn round_robin(buckets: usize) -> Self {
        Self(core::array::from_fn(|slot| {
            UnsafeCell::new(Node::new(slot % buckets))
        }))
    }
}

/// A locked bucket together with access to the nodes on its list.
pub(crate) struct BucketGuard<'a, const NBUF: usize> {
    index: usize,
    list: SpinLockGuard<'a, Bucket>,
    nodes: &'a Nodes<NBUF>,
}

impl<'a, const NBUF: usize> BucketGuard<'a, NBUF> {
    pub(crate) fn new(
        index: usize,
        list: SpinLockGuard<'a, Bucket>,
        nodes: &'a Nodes<NBUF>,
    ) -> Self {
        Self { index, list, nodes }
    }

    pub(crate) const fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn node(&self, slot: usize) -> &Node {
        // Safety: we hold the lock of the bucket `slot` is on.
        let node = unsafe { &*self.nodes.0[slot].get() };
        debug_assert_eq!(node.bucket, self.index, "slot {slot} is on another bucket");
        node
    }

    pub(crate) fn node_mut(&mut self, slot: usize) -> &mut Node {
        // Safety: as above; `&mut self` rules out a second live borrow
        // obtained through this guard.
        let node = unsafe { &mut *self.nodes.0[slot].get() };
        debug_assert_eq!(node.bucket, self.index, "slot {slot} is on another bucket");
        node
    }

    /// Slots from most to least recently used.
    fn iter_mru(&self) -> impl Iterator<Item = usize> + '_ {
        core::iter::successors(self.list.mru, |&slot| self.node(slot).next)
    }

    /// Slots from least to most recently used.
    fn iter_lru(&self) -> impl Iterator<Item = usize> + '_ {
        core::iter::successors(self.list.lru, |&slot| self.node(slot).prev)
    }

    /// Slot caching `block`, if any.
    pub(crate) fn find(&self, block: BlockId) -> Option<usize> {
        self.iter_mru().find(|&slot| self.node(slot).block == Some(block))
    }

    /// Least recently used slot nobody references.
    pub(crate) fn lru_unreferenced(&self) -> Option<usize> {
        self.iter_lru().find(|&slot| self.node(slot).refcnt == 0)
    }

    /// Links `slot` in at the MRU end. The slot must not be on any list.
    pub(crate) fn push_front(&mut self, slot: usize) {
        let old = self.list.mru;
        let node = self.node_mut(slot);
        node.prev = None;
        node.next = old;
        match old {
            Some(o) => self.node_mut(o).prev = Some(slot),
            None => self.list.lru = Some(slot),
        }
        self.list.mru = Some(slot);
    }

    /// Unlinks `slot` from this bucket's list.
    fn unlink(&mut self, slot: usize) {
        let node = self.node_mut(slot);
        let (prev, next) = (node.prev.take(), node.next.take());
        match prev {
            Some(p) => self.node_mut(p).next = next,
            None => self.list.mru = next,
        }
        match next {
            Some(n) => self.node_mut(n).prev = prev,
            None => self.list.lru = prev,
        }
    }

    /// Moves `slot` to the MRU end.
    pub(crate) fn move_to_front(&mut self, slot: usize) {
        if self.list.mru != Some(slot) {
            self.unlink(slot);
            self.push_front(slot);
        }
    }

    /// Moves `slot` from `donor`'s list to the MRU end of this one.
    pub(crate) fn adopt(&mut self, donor: &mut Self, slot: usize) {
        debug_assert_ne!(donor.index, self.index);
        donor.unlink(slot);
        donor.node_mut(slot).bucket = self.index;
        self.push_front(slot);
    }

    /// Hands `slot` to `block` with a single reference.
    pub(crate) fn assign(&mut self, slot: usize, block: BlockId) {
        let node = self.node_mut(slot);
        debug_assert_eq!(node.refcnt, 0, "recycling a referenced buffer");
        node.block = Some(block);
        node.refcnt = 1;
        node.pins = 0;
    }

    #[cfg(test)]
    fn order(&self) -> Vec<usize> {
        self.iter_mru().collect()
    }
}
