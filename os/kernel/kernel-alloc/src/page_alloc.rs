//! # Physical page allocator
//!
//! Hands out whole [`PAGE_SIZE`] pages of physical memory to the rest of the
//! kernel: page tables, process memory, pipe buffers.
//!
//! ## Per-core free lists
//!
//! Every core owns a free list behind its own [`SpinLock`]. `allocate` and
//! `free` only touch the executing core's list, so cores do not contend on the
//! common path. When a core runs dry it steals a single page from the other
//! cores, visiting them in a fixed order starting after itself and taking each
//! victim's lock with a blocking acquire. A core never holds two list locks at
//! once, which keeps stealing deadlock free.
//!
//! ## Copy-on-write sharing
//!
//! A table of per-page share counts backs copy-on-write: a page mapped into
//! several address spaces carries one count per mapping, and
//! [`PageAllocator::free`] only returns it to a free list when the last
//! mapping lets go. The counts are atomics indexed by page number and are
//! shared by all cores, so per-core lists and sharing coexist.
//!
//! ## Junk fills
//!
//! Allocated pages are filled with [`ALLOC_JUNK`] and freed pages with
//! [`FREE_JUNK`], so reads of uninitialized memory and use-after-free show up
//! as recognizable garbage instead of plausible data.
//!
//! ## Error model
//!
//! Running out of pages is an ordinary [`AllocError`]. Freeing an address the
//! allocator does not manage, freeing a free page, or driving a share count
//! negative are kernel bugs and panic.

use crate::addr::PhysAddr;
use crate::cpu::{CpuTopology, current_cpu};
use crate::error::{AllocError, InitError};
use crate::free_list::FreeList;
use crate::phys_mapper::PhysMapper;
use core::sync::atomic::{AtomicU32, Ordering};
use kernel_info::memory::{ALLOC_JUNK, FREE_JUNK, MAX_PAGES, PAGE_SIZE};
use kernel_info::params;
use kernel_sync::{SpinLock, SyncOnceCell};
use log::{debug, trace, warn};

/// The physical memory window handed to [`PageAllocator::init`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemoryLayout {
    /// Start of physical RAM. Share counts are indexed from here.
    pub ram_start: PhysAddr,
    /// First byte after the kernel image; managed pages start at the next
    /// page boundary.
    pub kernel_end: PhysAddr,
    /// First byte past the end of RAM.
    pub ram_end: PhysAddr,
}

impl MemoryLayout {
    #[must_use]
    pub const fn new(ram_start: PhysAddr, kernel_end: PhysAddr, ram_end: PhysAddr) -> Self {
        Self {
            ram_start,
            kernel_end,
            ram_end,
        }
    }

    /// Lowest page the allocator hands out.
    #[must_use]
    pub const fn first_page(&self) -> PhysAddr {
        self.kernel_end.page_round_up()
    }

    /// Slot of `page` in the share-count table.
    #[must_use]
    pub const fn page_index(&self, page: PhysAddr) -> usize {
        page.pages_since(self.ram_start)
    }

    /// Whether `page` is a page this layout manages.
    #[must_use]
    pub fn manages(&self, page: PhysAddr) -> bool {
        page.is_page_aligned() && page >= self.first_page() && page < self.ram_end
    }
}

/// Per-core physical page allocator with copy-on-write share counts.
///
/// * `PAGES` bounds the RAM window (and sizes the share-count table).
/// * `NCPU` is the number of per-core free lists.
pub struct PageAllocator<M, C, const PAGES: usize = MAX_PAGES, const NCPU: usize = { params::NCPU }>
{
    mapper: M,
    cpus: C,
    layout: SyncOnceCell<MemoryLayout>,
    free: [SpinLock<FreeList>; NCPU],
    refs: [AtomicU32; PAGES],
}

impl<M, C, const PAGES: usize, const NCPU: usize> PageAllocator<M, C, PAGES, NCPU>
where
    M: PhysMapper,
    C: CpuTopology,
{
    /// Creates an allocator with empty free lists. Call [`init`](Self::init)
    /// before use.
    pub const fn new(mapper: M, cpus: C) -> Self {
        Self {
            mapper,
            cpus,
            layout: SyncOnceCell::new(),
            free: [const { SpinLock::new(FreeList::new()) }; NCPU],
            refs: [const { AtomicU32::new(0) }; PAGES],
        }
    }

    /// Takes ownership of every page between the end of the kernel image and
    /// the end of RAM and deals them round-robin onto the per-core lists.
    ///
    /// Returns the number of pages now managed.
    ///
    /// # Errors
    /// - [`InitError::Unaligned`] if the RAM bounds are not page aligned.
    /// - [`InitError::Empty`] if no whole page lies above the kernel image.
    /// - [`InitError::TooLarge`] if RAM holds more than `PAGES` pages.
    /// - [`InitError::AlreadyInitialized`] on a second call.
    ///
    /// # Safety
    /// The pages above `layout.kernel_end` must be unused RAM reachable through
    /// the mapper, and stay exclusively owned by this allocator from now on.
    pub unsafe fn init(&self, layout: MemoryLayout) -> Result<usize, InitError> {
        if !layout.ram_start.is_page_aligned() || !layout.ram_end.is_page_aligned() {
            return Err(InitError::Unaligned {
                start: layout.ram_start,
                end: layout.ram_end,
            });
        }
        let first = layout.first_page();
        if layout.kernel_end < layout.ram_start || first >= layout.ram_end {
            return Err(InitError::Empty {
                kernel_end: layout.kernel_end,
                ram_end: layout.ram_end,
            });
        }
        let ram_pages = layout.ram_end.pages_since(layout.ram_start);
        if ram_pages > PAGES {
            return Err(InitError::TooLarge {
                pages: ram_pages,
                capacity: PAGES,
            });
        }
        if self.layout.set(layout).is_err() {
            return Err(InitError::AlreadyInitialized);
        }

        let managed = layout.ram_end.pages_since(first);
        for n in 0..managed {
            let page = first.add_pages(n);
            self.refs[layout.page_index(page)].store(0, Ordering::Relaxed);
            unsafe {
                self.fill(page, FREE_JUNK);
                self.free[n % NCPU].lock().push(&self.mapper, page);
            }
        }

        debug!(
            "kalloc: managing {managed} pages ({} KiB) from {first} across {NCPU} cores",
            managed * PAGE_SIZE / 1024
        );
        Ok(managed)
    }

    /// Allocates one page.
    ///
    /// Tries the executing core's list first and steals from the other cores
    /// when it is empty. The page comes back with a share count of one and
    /// filled with [`ALLOC_JUNK`].
    ///
    /// # Errors
    /// [`AllocError::OutOfMemory`] when every core's list is empty.
    ///
    /// # Panics
    /// If the page taken from a free list still has live references, which
    /// means the share-count table is corrupt.
    pub fn allocate(&self) -> Result<PhysAddr, AllocError> {
        let cpu = self.cpu();

        let page = self.pop_from(cpu).or_else(|| self.steal(cpu)).ok_or_else(|| {
            warn!("kalloc: out of memory on cpu {cpu}");
            AllocError::OutOfMemory
        })?;

        let Some(layout) = self.layout.get() else {
            unreachable!("kalloc: pages on a free list before init");
        };
        let prev = self.refs[layout.page_index(page)].swap(1, Ordering::AcqRel);
        assert!(prev == 0, "kalloc: free page {page} has {prev} references");

        unsafe { self.fill(page, ALLOC_JUNK) };
        Ok(page)
    }

    /// Drops one reference to `page`; on the last one the page is filled with
    /// [`FREE_JUNK`] and returned to the executing core's free list.
    ///
    /// # Panics
    /// - If the allocator is not initialized.
    /// - If `page` is unaligned or outside the managed range.
    /// - If `page` is already free.
    pub fn free(&self, page: PhysAddr) {
        let layout = self.checked_layout(page, "kfree");
        let prev = self.refs[layout.page_index(page)]
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .unwrap_or_else(|_| panic!("kfree: page {page} is already free"));
        if prev > 1 {
            trace!("kfree: {page} still has {} references", prev - 1);
            return;
        }

        self.reclaim(page);
    }

    /// Adjusts the share count of an allocated page by `delta`, e.g. `+1`
    /// when a copy-on-write page gains a second mapping. Returns the new
    /// count.
    ///
    /// A count that reaches zero reclaims the page exactly like the last
    /// [`free`](Self::free).
    ///
    /// # Panics
    /// - If `page` is unaligned, outside the managed range, or free.
    /// - If the count would go negative or overflow.
    pub fn add_reference(&self, page: PhysAddr, delta: i32) -> u32 {
        let layout = self.checked_layout(page, "add_reference");
        let result = self.refs[layout.page_index(page)].fetch_update(
            Ordering::AcqRel,
            Ordering::Acquire,
            |n| if n == 0 { None } else { n.checked_add_signed(delta) },
        );
        let count = match result {
            Ok(prev) => prev.wrapping_add_signed(delta),
            Err(0) => panic!("add_reference: page {page} is free"),
            Err(n) if delta < 0 => {
                panic!("add_reference: share count {n} of {page} would go negative (delta {delta})")
            }
            Err(n) => panic!("add_reference: share count {n} of {page} overflows (delta {delta})"),
        };
        if count == 0 {
            trace!("add_reference: last share of {page} dropped");
            self.reclaim(page);
        }
        count
    }

    /// Current share count of `page`; zero for a free page.
    ///
    /// # Panics
    /// If `page` is unaligned or outside the managed range.
    #[must_use]
    pub fn reference_count(&self, page: PhysAddr) -> u32 {
        let layout = self.checked_layout(page, "reference_count");
        self.refs[layout.page_index(page)].load(Ordering::Acquire)
    }

    /// Number of pages on all free lists.
    ///
    /// Locks each list in turn, so the sum is a snapshot that may be stale
    /// under concurrent allocation.
    #[must_use]
    pub fn free_pages(&self) -> usize {
        self.free.iter().map(|list| list.lock().len()).sum()
    }

    /// Number of pages under management, allocated or not.
    #[must_use]
    pub fn total_pages(&self) -> usize {
        self.layout
            .get()
            .map_or(0, |l| l.ram_end.pages_since(l.first_page()))
    }

    #[must_use]
    pub fn layout(&self) -> Option<&MemoryLayout> {
        self.layout.get()
    }

    #[must_use]
    pub const fn mapper(&self) -> &M {
        &self.mapper
    }

    fn cpu(&self) -> usize {
        let cpu = current_cpu(&self.cpus);
        assert!(cpu < NCPU, "kalloc: cpu id {cpu} exceeds {NCPU} free lists");
        cpu
    }

    fn pop_from(&self, cpu: usize) -> Option<PhysAddr> {
        let mut list = self.free[cpu].lock();
        unsafe { list.pop(&self.mapper) }
    }

    /// Takes the first available page from the other cores' lists.
    fn steal(&self, cpu: usize) -> Option<PhysAddr> {
        (1..NCPU)
            .map(|offset| (cpu + offset) % NCPU)
            .find_map(|victim| {
                let page = self.pop_from(victim)?;
                trace!("kalloc: cpu {cpu} stole {page} from cpu {victim}");
                Some(page)
            })
    }

    fn checked_layout(&self, page: PhysAddr, op: &str) -> &MemoryLayout {
        let Some(layout) = self.layout.get() else {
            panic!("{op}: page allocator not initialized");
        };
        assert!(layout.manages(page), "{op}: invalid page {page}");
        layout
    }

    /// Returns a page whose share count just reached zero to the executing
    /// core's list.
    fn reclaim(&self, page: PhysAddr) {
        let cpu = self.cpu();
        // Safety: the count hit zero here, so nobody else owns the page.
        unsafe {
            self.fill(page, FREE_JUNK);
            self.free[cpu].lock().push(&self.mapper, page);
        }
    }

    /// # Safety
    /// `page` must be managed by this allocator and owned by the caller.
    unsafe fn fill(&self, page: PhysAddr, byte: u8) {
        unsafe { core::ptr::write_bytes(self.mapper.phys_to_ptr(page), byte, PAGE_SIZE) };
    }
}
