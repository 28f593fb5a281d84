//! # Interrupt-Safe Locking
//!
//! [`IrqMutex`] is the critical-section primitive for state shared between
//! task context and interrupt handlers on this single-core kernel: it masks
//! maskable interrupts before taking the spinlock and restores the previous
//! mask state when the guard drops. An interrupt handler can therefore never
//! observe the lock held.

use core::ops::{Deref, DerefMut};

use crate::arch::local_irq;

/// A spinlock that disables interrupts for the duration of the guard
#[derive(Debug)]
pub struct IrqMutex<T> {
    inner: spin::Mutex<T>,
}

impl<T> IrqMutex<T> {
    /// Create a new interrupt-safe mutex
    pub const fn new(value: T) -> Self {
        Self {
            inner: spin::Mutex::new(value),
        }
    }

    /// Mask interrupts and acquire the lock
    pub fn lock(&self) -> IrqMutexGuard<'_, T> {
        let was_enabled = local_irq::disable();
        IrqMutexGuard {
            guard: Some(self.inner.lock()),
            was_enabled,
        }
    }

    /// Get mutable access without locking (requires exclusive ownership)
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }
}

/// Guard for an [`IrqMutex`]; restores the interrupt mask on drop
pub struct IrqMutexGuard<'a, T> {
    guard: Option<spin::MutexGuard<'a, T>>,
    was_enabled: bool,
}

impl<T> Deref for IrqMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.guard.as_ref().expect("guard alive")
    }
}

impl<T> DerefMut for IrqMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.guard.as_mut().expect("guard alive")
    }
}

impl<T> Drop for IrqMutexGuard<'_, T> {
    fn drop(&mut self) {
        // Release the spinlock before re-enabling interrupts.
        self.guard.take();
        local_irq::restore(self.was_enabled);
    }
}

/// Run `f` with interrupts masked, restoring the previous state afterwards
pub fn critical_section<R>(f: impl FnOnce() -> R) -> R {
    let was_enabled = local_irq::disable();
    let result = f();
    local_irq::restore(was_enabled);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_irq_mutex_basic() {
        let m = IrqMutex::new(5u32);
        {
            let mut g = m.lock();
            *g += 1;
        }
        assert_eq!(*m.lock(), 6);
    }

    #[test]
    fn test_critical_section_returns_value() {
        assert_eq!(critical_section(|| 7 * 6), 42);
    }

    #[test]
    fn test_irq_mutex_reentrant_sequential() {
        // Sequential lock/unlock pairs must not wedge the mask state.
        let m = IrqMutex::new(0u32);
        for _ in 0..3 {
            let _g = m.lock();
        }
        assert_eq!(*m.lock(), 0);
    }
}
