//! # Memory Layout

/// Size of a physical page in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Base of physical RAM; the kernel image is loaded here.
pub const KERNBASE: u64 = 0x8000_0000;

/// First address past the end of physical RAM managed by the kernel.
pub const PHYSTOP: u64 = KERNBASE + 128 * 1024 * 1024;

/// Number of pages between [`KERNBASE`] and [`PHYSTOP`].
///
/// Sizes the page reference-count table.
#[allow(clippy::cast_possible_truncation)]
pub const MAX_PAGES: usize = ((PHYSTOP - KERNBASE) / PAGE_SIZE as u64) as usize;

/// A simple Higher Half Direct Map (HHDM) base.
/// Anything mapped at [`HHDM_BASE`] + `pa` lets the kernel
/// access physical memory via a fixed offset.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

/// Byte written over every page handed out by the allocator.
pub const ALLOC_JUNK: u8 = 0x05;

/// Byte written over every page returned to the allocator.
pub const FREE_JUNK: u8 = 0x01;

const _: () = {
    assert!(PAGE_SIZE.is_power_of_two());
    assert!(KERNBASE.is_multiple_of(PAGE_SIZE as u64));
    assert!(PHYSTOP.is_multiple_of(PAGE_SIZE as u64));
    assert!(PHYSTOP > KERNBASE);
    assert!(ALLOC_JUNK != FREE_JUNK);
};
