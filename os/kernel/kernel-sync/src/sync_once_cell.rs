//! One-shot publication of boot-time state.

use core::{
    cell::UnsafeCell,
    hint::spin_loop,
    mem::MaybeUninit,
    sync::atomic::{AtomicU8, Ordering},
};

const EMPTY: u8 = 0;
const WRITING: u8 = 1;
const PUBLISHED: u8 = 2;

/// A cell written at most once and readable from every core afterwards.
///
/// The page allocator keeps its memory layout in one: `init` publishes it and
/// every later `free` reads it without taking a lock.
///
/// The stored value is never dropped; cells are meant for state that lives as
/// long as the kernel.
pub struct SyncOnceCell<T> {
    state: AtomicU8,
    slot: UnsafeCell<MaybeUninit<T>>,
}

// Safety: the slot is written once by the thread that won `claim` and only
// read after `PUBLISHED` is observed with acquire ordering.
unsafe impl<T: Send + Sync> Sync for SyncOnceCell<T> {}
unsafe impl<T: Send> Send for SyncOnceCell<T> {}

impl<T> Default for SyncOnceCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SyncOnceCell<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            slot: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// The value, if it has been published.
    #[inline]
    pub fn get(&self) -> Option<&T> {
        (self.state.load(Ordering::Acquire) == PUBLISHED).then(|| unsafe { self.read() })
    }

    /// Stores `value` if the cell is still empty.
    ///
    /// # Errors
    /// Hands `value` back if the cell is already set or being set.
    pub fn set(&self, value: T) -> Result<(), T> {
        if !self.claim() {
            return Err(value);
        }
        self.publish(value);
        Ok(())
    }

    /// The value, initializing it with `init` first if the cell is empty.
    ///
    /// Concurrent callers that lose the race spin until the winner publishes.
    pub fn get_or_init(&self, init: impl FnOnce() -> T) -> &T {
        if let Some(value) = self.get() {
            return value;
        }
        if self.claim() {
            return self.publish(init());
        }
        while self.state.load(Ordering::Acquire) != PUBLISHED {
            spin_loop();
        }
        unsafe { self.read() }
    }

    /// Moves the cell from empty to writing; `true` for the single winner.
    fn claim(&self) -> bool {
        self.state
            .compare_exchange(EMPTY, WRITING, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Must only be called by the winner of [`claim`](Self::claim).
    fn publish(&self, value: T) -> &T {
        unsafe { (*self.slot.get()).write(value) };
        self.state.store(PUBLISHED, Ordering::Release);
        unsafe { self.read() }
    }

    /// # Safety
    /// The slot must have been written.
    unsafe fn read(&self) -> &T {
        unsafe { (*self.slot.get()).assume_init_ref() }
    }
}

#[cfg(test)]
mod tests {
    use super::SyncOnceCell;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn set_publishes_once() {
        let layout = SyncOnceCell::new();
        assert!(layout.get().is_none());
        assert_eq!(layout.set((0x8000_0000_u64, 0x8800_0000_u64)), Ok(()));
        assert_eq!(layout.set((0, 0)), Err((0, 0)));
        assert_eq!(layout.get(), Some(&(0x8000_0000, 0x8800_0000)));
        assert_eq!(layout.get_or_init(|| (1, 1)), &(0x8000_0000, 0x8800_0000));
    }

    #[test]
    fn racing_initializers_run_once() {
        let cell = SyncOnceCell::new();
        let runs = AtomicUsize::new(0);

        thread::scope(|s| {
            for n in 0..4_u32 {
                let (cell, runs) = (&cell, &runs);
                s.spawn(move || {
                    let v = cell.get_or_init(|| {
                        runs.fetch_add(1, Ordering::SeqCst);
                        n
                    });
                    assert!(*v < 4);
                });
            }
        });

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(cell.get().is_some());
    }
}
