//! # Core identity

use kernel_sync::{InterruptControl, IrqGuard, NoInterrupts};

/// The processor topology the allocator runs on.
pub trait CpuTopology: Sync {
    type Interrupts: InterruptControl;

    /// Interrupt control for the executing core.
    fn interrupts(&self) -> &Self::Interrupts;

    /// Index of the executing core.
    ///
    /// Only meaningful while interrupts are masked; use [`current_cpu`].
    fn raw_cpu_id(&self) -> usize;
}

/// Reads the executing core's index with interrupts masked, so the task
/// cannot migrate between reading the id and acting on it.
///
/// The returned id may go stale as soon as interrupts are restored; callers
/// only use it to pick which free list to try first.
#[inline]
pub fn current_cpu<C: CpuTopology + ?Sized>(cpus: &C) -> usize {
    let _irq = IrqGuard::new(cpus.interrupts());
    cpus.raw_cpu_id()
}

/// A uniprocessor topology: always core 0, nothing to mask.
///
/// Suitable for early boot, before secondary cores are started.
#[derive(Debug, Default, Copy, Clone)]
pub struct SingleCpu;

impl CpuTopology for SingleCpu {
    type Interrupts = NoInterrupts;

    fn interrupts(&self) -> &NoInterrupts {
        &NoInterrupts
    }

    fn raw_cpu_id(&self) -> usize {
        0
    }
}
