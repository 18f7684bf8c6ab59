use crate::addr::PhysAddr;
use crate::phys_mapper::PhysMapper;

/// Link terminating a free list. Never page aligned, so never a real page.
const NIL: u64 = u64::MAX;

/// Header stored at the beginning of every **free** page.
///
/// A free page in memory has the following layout:
///
/// ```text
/// +-----------+--------------------------------------+
/// | Run       |  junk (FREE_JUNK)                    |
/// +-----------+--------------------------------------+
/// ^ page      ^ page + size_of::<Run>()              ^ page + PAGE_SIZE
/// ```
///
/// The link is a **physical** address so the list stays valid regardless of
/// which mapping is used to reach it.
#[repr(C)]
struct Run {
    /// Physical address of the next free page, or [`NIL`].
    next: u64,
}

/// Singly linked LIFO list of free pages, threaded through the pages
/// themselves.
///
/// # Invariants
/// - Every page on the list is free: nobody but the list reads or writes it.
/// - `len` equals the number of pages reachable from `head`.
pub(crate) struct FreeList {
    head: Option<PhysAddr>,
    len: usize,
}

impl FreeList {
    pub(crate) const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    /// Pushes `page` onto the list, writing the link into the page.
    ///
    /// # Safety
    /// - `page` must be page aligned and reachable through `mapper`.
    /// - The caller must own `page` exclusively and give up all access to it.
    /// - Must only be called while holding the list's lock.
    pub(crate) unsafe fn push<M: PhysMapper + ?Sized>(&mut self, mapper: &M, page: PhysAddr) {
        let next = self.head.map_or(NIL, PhysAddr::as_u64);
        #[allow(clippy::cast_ptr_alignment)]
        unsafe {
            mapper.phys_to_ptr(page).cast::<Run>().write(Run { next });
        }
        self.head = Some(page);
        self.len += 1;
    }

    /// Pops the most recently pushed page.
    ///
    /// The returned page still carries its `Run` header; the caller owns it
    /// from here on.
    ///
    /// # Safety
    /// - Every page on the list must still be reachable through `mapper`.
    /// - Must only be called while holding the list's lock.
    pub(crate) unsafe fn pop<M: PhysMapper + ?Sized>(&mut self, mapper: &M) -> Option<PhysAddr> {
        let page = self.head?;
        #[allow(clippy::cast_ptr_alignment)]
        let run = unsafe { mapper.phys_to_ptr(page).cast::<Run>().read() };
        self.head = (run.next != NIL).then_some(PhysAddr::new(run.next));
        self.len -= 1;
        Some(page)
    }
}
