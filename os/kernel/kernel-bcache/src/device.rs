//! # Block device boundary

use core::fmt;
use kernel_info::params::{BSIZE, NBUCKET};

/// Identity of a disk block.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BlockId {
    pub dev: u32,
    pub blockno: u32,
}

impl BlockId {
    #[must_use]
    pub const fn new(dev: u32, blockno: u32) -> Self {
        Self { dev, blockno }
    }

    /// Hash bucket holding this block while it is cached.
    #[must_use]
    pub const fn bucket(self) -> usize {
        self.blockno as usize % NBUCKET
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.dev, self.blockno)
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({}:{})", self.dev, self.blockno)
    }
}

/// Direction of a block transfer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Transfer {
    /// Device to buffer.
    Read,
    /// Buffer to device.
    Write,
}

/// A synchronous block device, e.g. the virtio disk driver.
///
/// `transfer` blocks the calling task until exactly one block has moved in
/// the requested direction. Device errors are the driver's business; the
/// cache treats every transfer as successful.
pub trait BlockDevice: Sync {
    fn transfer(&self, block: BlockId, data: &mut [u8; BSIZE], direction: Transfer);
}

impl<D: BlockDevice + ?Sized> BlockDevice for &D {
    fn transfer(&self, block: BlockId, data: &mut [u8; BSIZE], direction: Transfer) {
        (**self).transfer(block, data, direction);
    }
}
