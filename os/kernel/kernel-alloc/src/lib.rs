//! # Kernel Physical Page Allocation
//!
//! This crate owns every physical page of RAM above the kernel image and hands
//! them out one [`PAGE_SIZE`](kernel_info::memory::PAGE_SIZE) page at a time.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 PageAllocator                       │
//! │    • allocate / free / add_reference                │
//! │    • copy-on-write share counts (one per page)      │
//! └───────┬──────────────────┬──────────────────┬───────┘
//!         │                  │                  │
//! ┌───────▼───────┐  ┌───────▼───────┐  ┌───────▼───────┐
//! │ cpu 0 list    │  │ cpu 1 list    │  │ cpu N list    │
//! │ SpinLock      │  │ SpinLock      │  │ SpinLock      │
//! └───────┬───────┘  └───────┬───────┘  └───────┬───────┘
//!         └──────── steal on local exhaustion ──┘
//!                            │
//! ┌──────────────────────────▼──────────────────────────┐
//! │                  PhysMapper                         │
//! │    • physical address → pointer (direct map)        │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Components
//!
//! ### Page Allocator ([`page_alloc`])
//! * **Per-core lists**: the common path only takes the executing core's lock
//! * **Stealing**: an empty core takes a page from the next core that has one
//! * **Share counts**: pages freed only when the last copy-on-write mapping goes
//! * **Junk fills**: allocated and freed pages are overwritten with distinct
//!   marker bytes
//!
//! ### Free List
//! The link of each free page is stored in the page itself, as a physical
//! address, so the allocator needs no metadata arena beyond the share counts.
//!
//! ### Physical Mapper ([`phys_mapper`])
//! Converts physical addresses into pointers, either through the kernel's
//! higher half direct map or, in tests, through a heap buffer posing as RAM.
//!
//! ### CPU Topology ([`cpu`])
//! Tells the allocator which core it runs on, reading the id with interrupts
//! masked.
//!
//! ## Usage
//! ```rust
//! use kernel_alloc::{MemoryLayout, OffsetPhysMapper, PageAllocator, PhysAddr, SingleCpu};
//! use kernel_info::memory::PAGE_SIZE;
//!
//! #[repr(C, align(4096))]
//! struct Page([u8; PAGE_SIZE]);
//!
//! let mut ram: Vec<Page> = (0..8).map(|_| Page([0; PAGE_SIZE])).collect();
//! let base = PhysAddr::new(0x8000_0000);
//! let mapper = OffsetPhysMapper::for_region(base, ram.as_mut_ptr().cast());
//!
//! let kalloc: PageAllocator<_, _, 8, 1> = PageAllocator::new(mapper, SingleCpu);
//! let layout = MemoryLayout::new(base, base.add_pages(1), base.add_pages(8));
//! assert_eq!(unsafe { kalloc.init(layout) }, Ok(7));
//!
//! let page = kalloc.allocate().unwrap();
//! assert_eq!(kalloc.free_pages(), 6);
//! kalloc.free(page);
//! assert_eq!(kalloc.free_pages(), 7);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod addr;
pub mod cpu;
mod error;
mod free_list;
pub mod page_alloc;
pub mod phys_mapper;

pub use addr::PhysAddr;
pub use cpu::{CpuTopology, SingleCpu, current_cpu};
pub use error::{AllocError, InitError};
pub use page_alloc::{MemoryLayout, PageAllocator};
pub use phys_mapper::{OffsetPhysMapper, PhysMapper};
