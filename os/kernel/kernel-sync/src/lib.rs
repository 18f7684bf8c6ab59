//! # Kernel synchronization primitives
//!
//! Two lock tiers are provided and deliberately kept as distinct types:
//!
//! * [`SpinLock`]: short-duration mutual exclusion. Hold times are bounded;
//!   a holder never blocks on I/O or on a [`SleepLock`].
//! * [`SleepLock`]: long-duration exclusive access that may be held across a
//!   blocking device transfer. Waiters back off through a relax hook instead
//!   of hammering the lock word.
//!
//! [`IrqGuard`] masks interrupts for a scope (e.g. around reading the current
//! core id) and [`SyncOnceCell`] publishes boot-time state exactly once.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod irq;
mod sleep_lock;
mod spin_lock;
mod sync_once_cell;

pub use irq::{InterruptControl, IrqGuard, NoInterrupts};
pub use sleep_lock::{SleepLock, SleepLockGuard};
pub use spin_lock::{SpinLock, SpinLockGuard};
pub use sync_once_cell::SyncOnceCell;
