//! # Physical-to-virtual translation for page contents
//!
//! The allocator writes into the pages it manages (junk fills and the free
//! list link), so it needs a way to "see" a physical address from the current
//! address space. The strategy differs between the kernel (a direct map at a
//! fixed offset) and hosted tests (a heap buffer standing in for RAM), so it
//! is abstracted behind [`PhysMapper`].

use crate::addr::PhysAddr;
use kernel_info::memory::HHDM_BASE;

/// Converts physical addresses into pointers usable by the kernel.
pub trait PhysMapper: Sync {
    /// Returns a pointer through which the byte at `pa` can be accessed.
    ///
    /// # Safety
    /// The caller must ensure `pa` lies in memory covered by this mapping and
    /// that no other party accesses the same bytes concurrently.
    unsafe fn phys_to_ptr(&self, pa: PhysAddr) -> *mut u8;
}

/// [`PhysMapper`] for memory mapped at a constant offset from its physical
/// address (`va = pa + offset`).
///
/// # Example
/// ```rust
/// use kernel_alloc::{OffsetPhysMapper, PhysAddr, PhysMapper};
///
/// let mapper = OffsetPhysMapper::new(0x1000);
/// let va = unsafe { mapper.phys_to_ptr(PhysAddr::new(0x2000)) };
/// assert_eq!(va as usize, 0x3000);
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct OffsetPhysMapper {
    offset: u64,
}

impl OffsetPhysMapper {
    /// The kernel's higher half direct map.
    pub const HHDM: Self = Self::new(HHDM_BASE);

    /// Physical memory identity-mapped (`va == pa`).
    pub const IDENTITY: Self = Self::new(0);

    #[must_use]
    pub const fn new(offset: u64) -> Self {
        Self { offset }
    }

    /// A mapping under which `phys_base` is reachable at `virt_base`.
    #[must_use]
    pub fn for_region(phys_base: PhysAddr, virt_base: *mut u8) -> Self {
        Self::new((virt_base as u64).wrapping_sub(phys_base.as_u64()))
    }
}

impl PhysMapper for OffsetPhysMapper {
    #[allow(clippy::cast_possible_truncation)]
    unsafe fn phys_to_ptr(&self, pa: PhysAddr) -> *mut u8 {
        pa.as_u64().wrapping_add(self.offset) as usize as *mut u8
    }
}

#[cfg(test)]
mod tests {
    use super::{OffsetPhysMapper, PhysMapper};
    use crate::addr::PhysAddr;
    use kernel_info::memory::{HHDM_BASE, KERNBASE};

    #[test]
    fn hhdm_places_ram_above_the_direct_map_base() {
        let va = unsafe { OffsetPhysMapper::HHDM.phys_to_ptr(PhysAddr::new(KERNBASE + 0x3000)) };
        assert_eq!(va as u64, HHDM_BASE + KERNBASE + 0x3000);
    }

    #[test]
    fn region_mapping_translates_relative_to_its_base() {
        let mut backing = [0_u8; 64];
        let base = PhysAddr::new(KERNBASE);
        let mapper = OffsetPhysMapper::for_region(base, backing.as_mut_ptr());
        let ptr = unsafe { mapper.phys_to_ptr(PhysAddr::new(KERNBASE + 16)) };
        assert_eq!(ptr, backing[16..].as_mut_ptr());
    }
}
