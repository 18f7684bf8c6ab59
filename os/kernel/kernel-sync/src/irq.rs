//! # Interrupt masking
//!
//! Per-core state (such as "which core am I on") may only be read while the
//! current task cannot be preempted and migrated. [`IrqGuard`] masks
//! interrupts for a scope through an [`InterruptControl`] implementation and
//! restores the previous state on drop.

/// Access to the executing core's interrupt-enable flag.
pub trait InterruptControl {
    /// Whether interrupts are currently enabled on this core.
    fn enabled(&self) -> bool;

    /// Masks interrupts on this core.
    fn disable(&self);

    /// Unmasks interrupts on this core.
    fn enable(&self);
}

/// RAII guard that disables interrupts on creation and restores them on drop.
///
/// `IrqGuard::new()` snapshots the interrupt flag. If interrupts were enabled,
/// it disables them. On drop, it re-enables them **only** if they were
/// previously enabled, so guards nest.
///
/// # Examples
///
/// ```
/// use kernel_sync::{IrqGuard, NoInterrupts};
///
/// let ctl = NoInterrupts;
/// {
///     let _g = IrqGuard::new(&ctl);
///     // read per-core state here
/// }
/// ```
pub struct IrqGuard<'a, I: InterruptControl + ?Sized> {
    ctl: &'a I,
    /// Whether interrupts were enabled when the guard was created.
    were_enabled: bool,
}

impl<'a, I: InterruptControl + ?Sized> IrqGuard<'a, I> {
    #[inline]
    #[must_use]
    pub fn new(ctl: &'a I) -> Self {
        let were_enabled = ctl.enabled();
        if were_enabled {
            ctl.disable();
        }
        Self { ctl, were_enabled }
    }
}

impl<I: InterruptControl + ?Sized> Drop for IrqGuard<'_, I> {
    fn drop(&mut self) {
        if self.were_enabled {
            self.ctl.enable();
        }
    }
}

/// Interrupt control for hosted environments, where nothing can be masked.
///
/// Reports interrupts as disabled so [`IrqGuard`] is a no-op.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoInterrupts;

impl InterruptControl for NoInterrupts {
    fn enabled(&self) -> bool {
        false
    }

    fn disable(&self) {}

    fn enable(&self) {}
}

/// `cli`/`sti` based interrupt control.
///
/// # Safety & Privilege
///
/// Must only be used at CPL0. Executing `cli`/`sti` from user mode faults.
#[cfg(target_arch = "x86_64")]
#[derive(Debug, Default, Copy, Clone)]
pub struct X86Interrupts;

#[cfg(target_arch = "x86_64")]
impl InterruptControl for X86Interrupts {
    /// Bit 9 (`IF`) of `RFLAGS`.
    #[inline]
    fn enabled(&self) -> bool {
        let r: u64;
        unsafe { core::arch::asm!("pushfq; pop {}", out(reg) r, options(nostack, preserves_flags)) }
        (r & (1 << 9)) != 0
    }

    #[inline]
    fn disable(&self) {
        unsafe { core::arch::asm!("cli", options(nomem, nostack, preserves_flags)) }
    }

    #[inline]
    fn enable(&self) {
        unsafe { core::arch::asm!("sti", options(nomem, nostack, preserves_flags)) }
    }
}
