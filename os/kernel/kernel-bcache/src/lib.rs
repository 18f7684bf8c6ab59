//! # Kernel Block Cache
//!
//! Caches disk blocks in a fixed pool of buffers and hands each cached block
//! to one task at a time.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   BufferCache                       │
//! │    • read / write / release / pin / unpin           │
//! └───────┬──────────────────┬──────────────────┬───────┘
//!         │                  │                  │
//! ┌───────▼───────┐  ┌───────▼───────┐  ┌───────▼───────┐
//! │ bucket 0      │  │ bucket 1      │  │ bucket 12     │
//! │ SpinLock, LRU │  │ SpinLock, LRU │  │ SpinLock, LRU │
//! └───────┬───────┘  └───────┬───────┘  └───────┬───────┘
//!         └──── recycle across buckets under the eviction lock
//!                            │
//! ┌──────────────────────────▼──────────────────────────┐
//! │  buffers: SleepLock<[u8; BSIZE]> each, held by the  │
//! │  BufGuard across device transfers                   │
//! └──────────────────────────┬──────────────────────────┘
//!                            │
//! ┌──────────────────────────▼──────────────────────────┐
//! │                   BlockDevice                       │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use kernel_bcache::{BlockDevice, BlockId, BufferCache, Transfer};
//! use kernel_info::params::BSIZE;
//!
//! /// Every block reads back as its block number.
//! struct Numbered;
//!
//! impl BlockDevice for Numbered {
//!     fn transfer(&self, block: BlockId, data: &mut [u8; BSIZE], direction: Transfer) {
//!         if direction == Transfer::Read {
//!             data.fill(block.blockno as u8);
//!         }
//!     }
//! }
//!
//! let cache: BufferCache<_, 4> = BufferCache::new(Numbered);
//! let mut buf = cache.read(1, 9);
//! assert_eq!(buf[0], 9);
//! buf[0] = 42;
//! buf.write();
//! drop(buf);
//!
//! // Still cached: no second device read.
//! assert_eq!(cache.read(1, 9)[0], 42);
//! assert_eq!(cache.stats().disk_reads, 1);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod bucket;
pub mod cache;
pub mod device;
mod stats;

pub use cache::{BufGuard, BufferCache};
pub use device::{BlockDevice, BlockId, Transfer};
pub use stats::CacheStats;
