//! # Buffer cache
//!
//! A fixed pool of `NBUF` block buffers shared by all cores. Buffers are
//! spread over [`NBUCKET`] hash buckets keyed by block number; each bucket
//! keeps its buffers on an LRU list behind its own [`SpinLock`], so lookups of
//! blocks in different buckets do not contend.
//!
//! ## Lock tiers
//!
//! * Bucket locks guard list order, identity and reference counts. They are
//!   never held across a device transfer or while waiting for a buffer.
//! * Each buffer's payload sits behind a [`SleepLock`] that is held for as long
//!   as the caller holds the [`BufGuard`], device transfers included.
//! * The eviction coordinator serializes cross-bucket recycling. It is only
//!   taken with no bucket lock held; donor buckets are only locked through its
//!   guard, and always after the target bucket.
//!
//! ## Recycling
//!
//! A miss first reuses the least recently used unreferenced buffer of the
//! block's own bucket. If there is none, the bucket lock is dropped, the
//! coordinator taken, and the bucket re-checked, since another core may have
//! cached the block or released a buffer in the meantime. Only then are the
//! other buckets scanned in index order and the first unreferenced buffer moved
//! over. With every buffer referenced the cache is exhausted, which is fatal.

use crate::bucket::{Bucket, BucketGuard, Nodes};
use crate::device::{BlockDevice, BlockId, Transfer};
use crate::stats::{CacheStats, Counters};
use core::hint::spin_loop;
use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};
use kernel_info::params::{self, BSIZE, NBUCKET};
use kernel_sync::{SleepLock, SleepLockGuard, SpinLock, SpinLockGuard};
use log::{debug, trace};

/// Token type of the eviction lock. Holding its guard is what permits locking
/// a donor bucket.
struct Coordinator;

struct Buf {
    /// Payload matches the block on disk.
    valid: AtomicBool,
    data: SleepLock<[u8; BSIZE]>,
}

/// The block buffer cache.
///
/// `NBUF` is the size of the buffer pool.
pub struct BufferCache<D, const NBUF: usize = { params::NBUF }> {
    device: D,
    buckets: [SpinLock<Bucket>; NBUCKET],
    nodes: Nodes<NBUF>,
    evict: SpinLock<Coordinator>,
    bufs: [Buf; NBUF],
    stats: Counters,
}

impl<D: BlockDevice, const NBUF: usize> BufferCache<D, NBUF> {
    /// Creates a cache in front of `device` whose buffer waiters busy-poll.
    #[must_use]
    pub fn new(device: D) -> Self {
        Self::with_relax(device, spin_loop)
    }

    /// Creates a cache in front of `device`. Tasks waiting for a busy buffer
    /// call `relax` between polls, typically the scheduler's yield.
    ///
    /// Buffers start out empty and are dealt round-robin over the buckets.
    #[must_use]
    pub fn with_relax(device: D, relax: fn()) -> Self {
        let cache = Self {
            device,
            buckets: [const { SpinLock::new(Bucket::new()) }; NBUCKET],
            nodes: Nodes::round_robin(NBUCKET),
            evict: SpinLock::new(Coordinator),
            bufs: core::array::from_fn(|_| Buf {
                valid: AtomicBool::new(false),
                data: SleepLock::with_relax("buffer", [0; BSIZE], relax),
            }),
            stats: Counters::default(),
        };
        for slot in 0..NBUF {
            cache.bucket(slot % NBUCKET).push_front(slot);
        }
        debug!("bcache: {NBUF} buffers of {BSIZE} bytes in {NBUCKET} buckets");
        cache
    }

    /// Returns the block `blockno` of device `dev`, locked for exclusive use
    /// and with valid contents.
    ///
    /// Blocks while another task holds the same block. Reads the block from
    /// the device if it is not cached.
    ///
    /// # Panics
    /// If the block is not cached and every buffer is referenced.
    #[must_use]
    pub fn read(&self, dev: u32, blockno: u32) -> BufGuard<'_, D, NBUF> {
        let block = BlockId::new(dev, blockno);
        let slot = self.get(block);
        let buf = &self.bufs[slot];

        let mut data = buf.data.lock();
        if !buf.valid.load(Ordering::Acquire) {
            self.device.transfer(block, &mut data, Transfer::Read);
            self.stats.disk_read();
            buf.valid.store(true, Ordering::Release);
        }

        BufGuard {
            cache: self,
            slot,
            block,
            data: ManuallyDrop::new(data),
        }
    }

    /// Writes the contents of `buf` to disk.
    ///
    /// Exclusive access is proven by the guard; a buffer that was released
    /// can no longer be written:
    ///
    /// ```compile_fail
    /// # use kernel_bcache::{BlockDevice, BlockId, BufferCache, Transfer};
    /// # struct Null;
    /// # impl BlockDevice for Null {
    /// #     fn transfer(&self, _: BlockId, _: &mut [u8; 1024], _: Transfer) {}
    /// # }
    /// let cache: BufferCache<Null> = BufferCache::new(Null);
    /// let mut buf = cache.read(1, 7);
    /// cache.release(buf);
    /// cache.write(&mut buf);
    /// ```
    ///
    /// # Panics
    /// If `buf` came from another cache, or is not locked.
    pub fn write(&self, buf: &mut BufGuard<'_, D, NBUF>) {
        self.assert_owns(buf, "bwrite");
        assert!(
            self.bufs[buf.slot].data.is_locked(),
            "bwrite: buffer not locked"
        );
        self.device.transfer(buf.block, &mut buf.data, Transfer::Write);
        self.stats.disk_write();
    }

    /// Unlocks `buf` and drops its reference. The last reference moves the
    /// buffer to the most recently used end of its bucket.
    ///
    /// Dropping the guard does the same.
    ///
    /// # Panics
    /// If `buf` came from another cache.
    pub fn release(&self, buf: BufGuard<'_, D, NBUF>) {
        self.assert_owns(&buf, "brelse");
        drop(buf);
    }

    /// Takes an extra reference that keeps the buffer cached after `buf` is
    /// released, e.g. while a log transaction still needs the block.
    ///
    /// # Panics
    /// If `buf` came from another cache.
    pub fn pin(&self, buf: &BufGuard<'_, D, NBUF>) {
        self.assert_owns(buf, "bpin");
        let mut bucket = self.bucket(buf.block.bucket());
        let node = bucket.node_mut(buf.slot);
        node.refcnt += 1;
        node.pins += 1;
    }

    /// Drops a reference taken by [`pin`](Self::pin).
    ///
    /// # Panics
    /// If `buf` came from another cache or is not pinned.
    pub fn unpin(&self, buf: &BufGuard<'_, D, NBUF>) {
        self.assert_owns(buf, "bunpin");
        let mut bucket = self.bucket(buf.block.bucket());
        let node = bucket.node_mut(buf.slot);
        assert!(node.pins > 0, "bunpin: buffer {} not pinned", buf.block);
        node.pins -= 1;
        node.refcnt -= 1;
    }

    /// Whether `block` currently has a buffer. Takes no reference, so the
    /// answer may be stale by the time it is used.
    #[must_use]
    pub fn contains(&self, block: BlockId) -> bool {
        self.bucket(block.bucket()).find(block).is_some()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    #[must_use]
    pub const fn device(&self) -> &D {
        &self.device
    }

    fn bucket(&self, index: usize) -> BucketGuard<'_, NBUF> {
        BucketGuard::new(index, self.buckets[index].lock(), &self.nodes)
    }

    /// Locks another bucket for recycling. Requiring the coordinator guard
    /// keeps every donor acquisition behind the eviction lock.
    fn lock_donor(
        &self,
        _coordinator: &SpinLockGuard<'_, Coordinator>,
        index: usize,
    ) -> BucketGuard<'_, NBUF> {
        self.bucket(index)
    }

    /// Finds or recycles a buffer for `block` and returns its slot with one
    /// reference taken. Does not lock the payload.
    fn get(&self, block: BlockId) -> usize {
        let local = self.claim_local(&mut self.bucket(block.bucket()), block);
        local.unwrap_or_else(|| self.evict_into(block))
    }

    /// Hit or in-bucket recycle, under the target bucket's lock.
    fn claim_local(&self, bucket: &mut BucketGuard<'_, NBUF>, block: BlockId) -> Option<usize> {
        if let Some(slot) = bucket.find(block) {
            bucket.node_mut(slot).refcnt += 1;
            self.stats.hit();
            trace!("bcache: hit {block} in slot {slot}");
            return Some(slot);
        }

        let slot = bucket.lru_unreferenced()?;
        bucket.assign(slot, block);
        self.bufs[slot].valid.store(false, Ordering::Release);
        self.stats.miss();
        trace!("bcache: miss {block}, recycled slot {slot}");
        Some(slot)
    }

    fn evict_into(&self, block: BlockId) -> usize {
        let coordinator = self.evict.lock();
        let mut target = self.bucket(block.bucket());
        if let Some(slot) = self.claim_local(&mut target, block) {
            return slot;
        }

        let home = target.index();
        for index in (0..NBUCKET).filter(|&i| i != home) {
            let mut donor = self.lock_donor(&coordinator, index);
            let Some(slot) = donor.lru_unreferenced() else {
                continue;
            };
            target.adopt(&mut donor, slot);
            drop(donor);

            target.assign(slot, block);
            self.bufs[slot].valid.store(false, Ordering::Release);
            self.stats.miss();
            self.stats.steal();
            trace!(
                "bcache: miss {block}, took slot {slot} from bucket {index} into {home}"
            );
            return slot;
        }

        panic!("bget: no buffers");
    }

    /// Drops one reference; runs after the payload lock is released.
    fn unreference(&self, slot: usize, block: BlockId) {
        let mut bucket = self.bucket(block.bucket());
        let node = bucket.node_mut(slot);
        assert!(node.refcnt > 0, "brelse: buffer {block} not referenced");
        node.refcnt -= 1;
        if node.refcnt == 0 {
            bucket.move_to_front(slot);
        }
    }

    fn assert_owns(&self, buf: &BufGuard<'_, D, NBUF>, op: &str) {
        assert!(
            core::ptr::eq(buf.cache, self),
            "{op}: buffer {} belongs to another cache",
            buf.block
        );
    }
}

/// A cached block, locked for exclusive use.
///
/// Dereferences to the block's bytes. Dropping the guard (or passing it to
/// [`BufferCache::release`]) unlocks the buffer and drops its reference.
pub struct BufGuard<'a, D: BlockDevice, const NBUF: usize> {
    cache: &'a BufferCache<D, NBUF>,
    slot: usize,
    block: BlockId,
    data: ManuallyDrop<SleepLockGuard<'a, [u8; BSIZE]>>,
}

impl<D: BlockDevice, const NBUF: usize> BufGuard<'_, D, NBUF> {
    #[must_use]
    pub const fn block(&self) -> BlockId {
        self.block
    }

    /// Index of the buffer in the cache's pool.
    #[must_use]
    pub const fn slot(&self) -> usize {
        self.slot
    }

    /// Writes the buffer to disk; see [`BufferCache::write`].
    pub fn write(&mut self) {
        let cache = self.cache;
        cache.write(self);
    }

    /// Same as dropping the guard.
    pub fn release(self) {
        drop(self);
    }
}

impl<D: BlockDevice, const NBUF: usize> Deref for BufGuard<'_, D, NBUF> {
    type Target = [u8; BSIZE];

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl<D: BlockDevice, const NBUF: usize> DerefMut for BufGuard<'_, D, NBUF> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data
    }
}

impl<D: BlockDevice, const NBUF: usize> Drop for BufGuard<'_, D, NBUF> {
    fn drop(&mut self) {
        // Unlock first: a waiter holds a reference, so the buffer cannot be
        // recycled between the two steps.
        // Safety: `data` is dropped only here and never touched again.
        unsafe { ManuallyDrop::drop(&mut self.data) };
        self.cache.unreference(self.slot, self.block);
    }
}
