//! # Physical addresses

use core::fmt;
use kernel_info::memory::PAGE_SIZE;

/// A physical memory address.
///
/// A thin `u64` wrapper that keeps physical addresses from being mixed up
/// with kernel pointers. Only a [`PhysMapper`](crate::phys_mapper::PhysMapper)
/// turns one into something dereferenceable.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct PhysAddr(u64);

impl PhysAddr {
    #[inline]
    #[must_use]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Whether the address sits on a page boundary.
    #[inline]
    #[must_use]
    pub const fn is_page_aligned(self) -> bool {
        self.0.is_multiple_of(PAGE_SIZE as u64)
    }

    /// Aligns down to the containing page.
    #[inline]
    #[must_use]
    pub const fn page_round_down(self) -> Self {
        Self(self.0 & !(PAGE_SIZE as u64 - 1))
    }

    /// Aligns up to the next page boundary (identity if already aligned).
    #[inline]
    #[must_use]
    pub const fn page_round_up(self) -> Self {
        Self((self.0 + (PAGE_SIZE as u64 - 1)) & !(PAGE_SIZE as u64 - 1))
    }

    /// The address `pages` whole pages above this one.
    #[inline]
    #[must_use]
    pub const fn add_pages(self, pages: usize) -> Self {
        Self(self.0 + (pages * PAGE_SIZE) as u64)
    }

    /// Number of whole pages from `base` up to this address.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn pages_since(self, base: Self) -> usize {
        ((self.0 - base.0) / PAGE_SIZE as u64) as usize
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysAddr(0x{:016X})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding() {
        let a = PhysAddr::new(0x8000_1234);
        assert_eq!(a.page_round_down(), PhysAddr::new(0x8000_1000));
        assert_eq!(a.page_round_up(), PhysAddr::new(0x8000_2000));
        let b = PhysAddr::new(0x8000_2000);
        assert_eq!(b.page_round_up(), b);
        assert!(b.is_page_aligned());
        assert!(!a.is_page_aligned());
    }

    #[test]
    fn page_arithmetic() {
        let base = PhysAddr::new(0x8000_0000);
        let p = base.add_pages(3);
        assert_eq!(p, PhysAddr::new(0x8000_3000));
        assert_eq!(p.pages_since(base), 3);
    }
}
