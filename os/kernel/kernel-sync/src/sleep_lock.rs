use core::{
    cell::UnsafeCell,
    hint::spin_loop,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, Ordering},
};

/// Long-duration exclusive lock.
///
/// Unlike [`SpinLock`](crate::SpinLock), a `SleepLock` may be held across a
/// blocking operation such as a disk transfer. A contended waiter calls the
/// lock's relax hook between polls; in the kernel that hook yields the CPU to
/// the scheduler, in hosted tests it is `std::thread::yield_now`.
///
/// Never acquire a `SleepLock` while holding a `SpinLock`: the wait is
/// unbounded.
///
/// # Examples
///
/// ```
/// use kernel_sync::SleepLock;
///
/// let block = SleepLock::new("buffer", [0u8; 16]);
/// {
///     let mut data = block.lock();
///     data[0] = 0xAA;
///     assert!(block.is_locked());
/// }
/// assert!(!block.is_locked());
/// assert_eq!(block.lock()[0], 0xAA);
/// ```
pub struct SleepLock<T> {
    locked: AtomicBool,
    name: &'static str,
    relax: fn(),
    inner: UnsafeCell<T>,
}

// Safety: exclusive access is handed to one guard at a time.
unsafe impl<T: Send> Sync for SleepLock<T> {}

impl<T> SleepLock<T> {
    /// Creates an unlocked lock whose waiters busy-poll with [`spin_loop`].
    pub const fn new(name: &'static str, inner: T) -> Self {
        Self::with_relax(name, inner, spin_loop)
    }

    /// Creates an unlocked lock whose waiters call `relax` between polls.
    pub const fn with_relax(name: &'static str, inner: T, relax: fn()) -> Self {
        Self {
            locked: AtomicBool::new(false),
            name,
            relax,
            inner: UnsafeCell::new(inner),
        }
    }

    /// Blocks until exclusive access is granted.
    #[inline]
    pub fn lock(&self) -> SleepLockGuard<'_, T> {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.locked.load(Ordering::Relaxed) {
                (self.relax)();
            }
        }
        SleepLockGuard { lock: self }
    }

    /// Try once; returns immediately.
    #[inline]
    pub fn try_lock(&self) -> Option<SleepLockGuard<'_, T>> {
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(SleepLockGuard { lock: self })
        } else {
            None
        }
    }

    /// Whether some guard currently holds the lock.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    #[inline]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub const fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }
}

/// Exclusive access to the value behind a [`SleepLock`]; unlocks on drop.
pub struct SleepLockGuard<'a, T> {
    lock: &'a SleepLock<T>,
}

impl<T> Deref for SleepLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // Safety: the guard exists only while `locked` is held, so it is the
        // sole accessor of `inner`.
        unsafe { &*self.lock.inner.get() }
    }
}

impl<T> DerefMut for SleepLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: as above; `&mut self` makes this borrow unique.
        unsafe { &mut *self.lock.inner.get() }
    }
}

impl<T> Drop for SleepLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}
