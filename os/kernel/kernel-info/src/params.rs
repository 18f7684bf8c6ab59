//! # Pool Parameters

/// Maximum number of blocks any single filesystem operation writes.
pub const MAXOPBLOCKS: usize = 10;

/// Number of buffers in the block cache.
pub const NBUF: usize = MAXOPBLOCKS * 3;

/// Number of hash buckets in the block cache.
///
/// A block lives in bucket `block_number % NBUCKET`. Prime to spread
/// sequential block numbers.
pub const NBUCKET: usize = 13;

/// Size of a disk block in bytes.
pub const BSIZE: usize = 1024;

/// Maximum number of cores, and therefore of per-core page free lists.
pub const NCPU: usize = 8;

const _: () = {
    assert!(NBUF >= NBUCKET, "every bucket must start with a buffer");
    assert!(BSIZE.is_power_of_two());
    assert!(NCPU > 0);
};
