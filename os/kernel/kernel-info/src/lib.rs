//! # Kernel Configuration
//!
//! Compile-time parameters shared by the kernel's resource managers. Every
//! pool in the buffer cache and the physical page allocator is sized from the
//! constants in this crate; nothing is sized at runtime.
//!
//! ## Modules
//!
//! ### Parameters ([`params`])
//! Pool sizes and hash geometry:
//! * **Buffer Cache**: number of buffers, hash buckets and block size
//! * **Processors**: maximum number of cores with their own free list
//!
//! ### Memory Layout ([`memory`])
//! The physical memory window handed to the page allocator:
//!
//! ```text
//! Physical Memory Layout:
//! KERNBASE    ┌─────────────────────────────────┐ 0x8000_0000
//!             │       Kernel Image              │
//!             │   (Text, Data, BSS)             │
//! end         ├─────────────────────────────────┤ (linker symbol)
//!             │    Available RAM                │
//!             │  (Managed by page allocator)    │
//! PHYSTOP     └─────────────────────────────────┘ KERNBASE + 128 MiB
//! ```
//!
//! All values are `const` and checked by compile-time assertions, so an
//! inconsistent configuration fails the build instead of the boot.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
pub mod params;
