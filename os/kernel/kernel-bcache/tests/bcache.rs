use kernel_bcache::{BlockDevice, BlockId, BufferCache, Transfer};
use kernel_info::params::BSIZE;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Barrier, Mutex};
use std::thread;
use std::time::Duration;

const DEV: u32 = 1;

/// A RAM disk. Unwritten blocks read back filled with their block number.
#[derive(Default)]
struct MemDisk {
    blocks: Mutex<HashMap<BlockId, [u8; BSIZE]>>,
    reads: Mutex<HashMap<BlockId, usize>>,
}

impl MemDisk {
    fn stored(&self, block: BlockId) -> Option<[u8; BSIZE]> {
        self.blocks.lock().unwrap().get(&block).copied()
    }

    fn reads_of(&self, block: BlockId) -> usize {
        self.reads.lock().unwrap().get(&block).copied().unwrap_or(0)
    }
}

impl BlockDevice for MemDisk {
    fn transfer(&self, block: BlockId, data: &mut [u8; BSIZE], direction: Transfer) {
        match direction {
            Transfer::Read => {
                *self.reads.lock().unwrap().entry(block).or_default() += 1;
                *data = self
                    .stored(block)
                    .unwrap_or([block.blockno as u8; BSIZE]);
            }
            Transfer::Write => {
                self.blocks.lock().unwrap().insert(block, *data);
            }
        }
    }
}

fn block(blockno: u32) -> BlockId {
    BlockId::new(DEV, blockno)
}

#[test]
fn miss_reads_the_device_once_then_hits() {
    let cache: BufferCache<MemDisk> = BufferCache::new(MemDisk::default());

    let buf = cache.read(DEV, 5);
    assert_eq!(buf.block(), block(5));
    assert!(buf.iter().all(|&b| b == 5));
    drop(buf);

    let again = cache.read(DEV, 5);
    assert_eq!(again[0], 5);
    drop(again);

    assert_eq!(cache.device().reads_of(block(5)), 1);
    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses, stats.disk_reads), (1, 1, 1));
}

#[test]
fn same_block_on_other_device_is_a_different_buffer() {
    let cache: BufferCache<MemDisk> = BufferCache::new(MemDisk::default());
    let a = cache.read(1, 3);
    let b = cache.read(2, 3);
    assert_ne!(a.slot(), b.slot());
}

#[test]
fn write_reaches_the_device() {
    let cache: BufferCache<MemDisk> = BufferCache::new(MemDisk::default());

    let mut buf = cache.read(DEV, 8);
    buf[..4].copy_from_slice(b"xv6!");
    cache.write(&mut buf);
    cache.release(buf);

    let stored = cache.device().stored(block(8)).unwrap();
    assert_eq!(&stored[..4], b"xv6!");
    assert_eq!(stored[4], 8);
    assert_eq!(cache.stats().disk_writes, 1);
}

#[test]
fn release_order_decides_recycling() {
    // Blocks 0, 13, 26, 39 and 52 all hash to bucket 0.
    let cache: BufferCache<MemDisk, 3> = BufferCache::new(MemDisk::default());

    let a = cache.read(DEV, 0);
    let b = cache.read(DEV, 13);
    let c = cache.read(DEV, 26);
    let (slot_a, slot_b) = (a.slot(), b.slot());
    assert_eq!(cache.stats().steals, 2);

    a.release();
    b.release();
    c.release();

    let d = cache.read(DEV, 39);
    assert_eq!(d.slot(), slot_a);
    let e = cache.read(DEV, 52);
    assert_eq!(e.slot(), slot_b);

    assert!(!cache.contains(block(0)));
    assert!(!cache.contains(block(13)));
    assert!(cache.contains(block(26)));
}

#[test]
fn hash_collision_steals_from_another_bucket() {
    // One buffer per bucket.
    let cache: BufferCache<MemDisk, 13> = BufferCache::new(MemDisk::default());

    let first = cache.read(DEV, 0);
    let second = cache.read(DEV, 13);

    assert_ne!(first.slot(), second.slot());
    assert_eq!(first[0], 0);
    assert_eq!(second[0], 13);
    assert_eq!(cache.stats().steals, 1);
}

#[test]
fn racing_misses_on_one_block_share_a_single_buffer() {
    const READERS: usize = 6;

    // Bucket 0 owns one buffer and block 0 holds it, so every reader of
    // block 13 misses locally and goes through the eviction lock.
    let cache: BufferCache<MemDisk, 13> =
        BufferCache::with_relax(MemDisk::default(), thread::yield_now);
    let held = cache.read(DEV, 0);
    let start = Barrier::new(READERS);

    let slots: Vec<usize> = thread::scope(|s| {
        let handles: Vec<_> = (0..READERS)
            .map(|_| {
                let (cache, start) = (&cache, &start);
                s.spawn(move || {
                    start.wait();
                    let buf = cache.read(DEV, 13);
                    assert_eq!(buf[0], 13);
                    buf.slot()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(cache.device().reads_of(block(13)), 1);
    assert!(slots.iter().all(|&slot| slot == slots[0]));
    assert_ne!(slots[0], held.slot());
    assert_eq!(cache.stats().steals, 1);
}

#[test]
#[should_panic(expected = "no buffers")]
fn all_buffers_referenced_is_fatal() {
    let cache: BufferCache<MemDisk, 2> = BufferCache::new(MemDisk::default());
    let _a = cache.read(DEV, 0);
    let _b = cache.read(DEV, 1);
    let _c = cache.read(DEV, 2);
}

#[test]
fn pinned_buffer_survives_recycling() {
    let cache: BufferCache<MemDisk, 2> = BufferCache::new(MemDisk::default());

    let buf = cache.read(DEV, 0);
    cache.pin(&buf);
    buf.release();

    // Bucket 0's own buffer is pinned, so 13 and then 26 recycle the stolen one.
    cache.read(DEV, 13).release();
    cache.read(DEV, 26).release();
    assert!(cache.contains(block(0)));
    assert!(!cache.contains(block(13)));

    let buf = cache.read(DEV, 0);
    assert_eq!(cache.device().reads_of(block(0)), 1);
    cache.unpin(&buf);
    buf.release();

    // Unpinned and released: the next collisions may take it.
    let _x = cache.read(DEV, 39);
    let _y = cache.read(DEV, 52);
    assert!(!cache.contains(block(0)));
}

#[test]
#[should_panic(expected = "not pinned")]
fn unpin_without_pin_is_fatal() {
    let cache: BufferCache<MemDisk> = BufferCache::new(MemDisk::default());
    let buf = cache.read(DEV, 4);
    cache.unpin(&buf);
}

#[test]
#[should_panic(expected = "another cache")]
fn writing_through_the_wrong_cache_is_fatal() {
    let ours: BufferCache<MemDisk> = BufferCache::new(MemDisk::default());
    let theirs: BufferCache<MemDisk> = BufferCache::new(MemDisk::default());
    let mut buf = theirs.read(DEV, 4);
    ours.write(&mut buf);
}

#[test]
fn second_reader_waits_for_the_first_and_sees_its_bytes() {
    let cache: BufferCache<MemDisk, 4> =
        BufferCache::with_relax(MemDisk::default(), thread::yield_now);
    let released = AtomicBool::new(false);
    let holding = Barrier::new(2);

    thread::scope(|s| {
        s.spawn(|| {
            let mut buf = cache.read(DEV, 7);
            holding.wait();
            // Stand-in for a slow caller mutating the block.
            thread::sleep(Duration::from_millis(50));
            buf.fill(0xAB);
            released.store(true, Ordering::SeqCst);
        });

        holding.wait();
        let buf = cache.read(DEV, 7);
        assert!(released.load(Ordering::SeqCst), "read completed while held");
        assert!(buf.iter().all(|&b| b == 0xAB));
    });

    assert_eq!(cache.device().reads_of(block(7)), 1);
}

#[test]
fn concurrent_increments_are_not_lost() {
    const THREADS: u32 = 4;
    const ROUNDS: u32 = 300;
    const BLOCKS: u32 = 40;

    let cache: BufferCache<MemDisk, 8> =
        BufferCache::with_relax(MemDisk::default(), thread::yield_now);

    // Start every counter at zero on disk.
    for n in 0..BLOCKS {
        let mut buf = cache.read(DEV, n);
        buf[..4].copy_from_slice(&0u32.to_le_bytes());
        buf.write();
    }

    thread::scope(|s| {
        for t in 0..THREADS {
            let cache = &cache;
            s.spawn(move || {
                let mut seed = t.wrapping_mul(2_654_435_761).wrapping_add(1);
                for _ in 0..ROUNDS {
                    seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                    let mut buf = cache.read(DEV, (seed >> 8) % BLOCKS);
                    let n = u32::from_le_bytes(buf[..4].try_into().unwrap());
                    buf[..4].copy_from_slice(&(n + 1).to_le_bytes());
                    buf.write();
                }
            });
        }
    });

    let total: u32 = (0..BLOCKS)
        .map(|n| u32::from_le_bytes(cache.read(DEV, n)[..4].try_into().unwrap()))
        .sum();
    assert_eq!(total, THREADS * ROUNDS);
    assert!(cache.stats().steals > 0);
}
