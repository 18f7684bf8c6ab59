use crate::addr::PhysAddr;

/// Errors returned by [`PageAllocator::allocate`](crate::PageAllocator::allocate).
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    #[error("out of physical memory")]
    OutOfMemory,
}

/// Errors returned by [`PageAllocator::init`](crate::PageAllocator::init).
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    #[error("RAM range {start}..{end} is not page aligned")]
    Unaligned { start: PhysAddr, end: PhysAddr },
    #[error("no usable pages between kernel end {kernel_end} and RAM end {ram_end}")]
    Empty {
        kernel_end: PhysAddr,
        ram_end: PhysAddr,
    },
    #[error("{pages} pages of RAM exceed the reference table capacity of {capacity}")]
    TooLarge { pages: usize, capacity: usize },
    #[error("page allocator already initialized")]
    AlreadyInitialized,
}
