//! # Stub Backend
//!
//! The fallback capability set for architectures without a real backend.
//! Port reads return zero, writes are ignored, and the timer counts only
//! when ticked explicitly. Host-side tests run the whole HAL through this
//! backend.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use atlas_core::{KernelError, KernelResult};

use crate::cpu::{CpuOps, TaskContext};
use crate::debug::DebugOps;
use crate::interrupts::InterruptOps;
use crate::io::IoOps;
use crate::memory::{MemoryDetection, MemoryOps};
use crate::timer::TimerOps;
use crate::{Architecture, HalCapabilities, IrqHandler};

/// Stub implementation of every capability table
#[derive(Debug)]
pub struct StubBackend {
    interrupts_enabled: AtomicBool,
    ticks: AtomicU64,
    frequency: AtomicU32,
    context_switches: AtomicU64,
}

impl StubBackend {
    const fn new() -> Self {
        Self {
            interrupts_enabled: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
            frequency: AtomicU32::new(0),
            context_switches: AtomicU64::new(0),
        }
    }

    /// Number of context switches requested so far
    pub fn context_switches(&self) -> u64 {
        self.context_switches.load(Ordering::Relaxed)
    }

    /// Advance the stub timer by one tick (test hook)
    pub fn advance_tick(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::Relaxed) + 1
    }
}

static BACKEND: StubBackend = StubBackend::new();

/// The process-wide stub backend instance
pub fn backend() -> &'static StubBackend {
    &BACKEND
}

/// Build a capability set announcing `arch`, backed entirely by stubs
pub fn capabilities_for(arch: Architecture) -> HalCapabilities {
    HalCapabilities {
        arch,
        cpu: &BACKEND,
        memory: &BACKEND,
        interrupt: &BACKEND,
        timer: &BACKEND,
        io: &BACKEND,
        debug: &BACKEND,
    }
}

impl CpuOps for StubBackend {
    fn init(&self) -> KernelResult<()> {
        Ok(())
    }

    fn interrupts_enabled(&self) -> bool {
        self.interrupts_enabled.load(Ordering::Relaxed)
    }

    fn disable_interrupts(&self) -> bool {
        self.interrupts_enabled.swap(false, Ordering::Relaxed)
    }

    fn enable_interrupts(&self) {
        self.interrupts_enabled.store(true, Ordering::Relaxed);
    }

    fn wait_for_interrupt(&self) {
        core::hint::spin_loop();
    }

    fn context_switch(&self, _prev: &mut TaskContext, _next: &TaskContext) {
        // No machine context to swap; record the request for observers.
        self.context_switches.fetch_add(1, Ordering::Relaxed);
    }

    fn kernel_code_selector(&self) -> u16 {
        0x08
    }

    fn kernel_data_selector(&self) -> u16 {
        0x10
    }
}

impl MemoryOps for StubBackend {
    fn detect(&self) -> KernelResult<MemoryDetection> {
        Err(KernelError::NotSupported)
    }
}

impl InterruptOps for StubBackend {
    fn init(&self) -> KernelResult<()> {
        Ok(())
    }

    fn register_handler(&self, irq: u8, handler: IrqHandler) -> KernelResult<()> {
        crate::interrupts::install_handler(irq, handler)
    }

    fn unregister_handler(&self, irq: u8) -> KernelResult<()> {
        crate::interrupts::remove_handler(irq)
    }

    fn enable_irq(&self, _irq: u8) -> KernelResult<()> {
        Ok(())
    }

    fn disable_irq(&self, _irq: u8) -> KernelResult<()> {
        Ok(())
    }

    fn ack_irq(&self, _irq: u8) {}
}

impl TimerOps for StubBackend {
    fn init(&self, hz: u32) -> KernelResult<u32> {
        self.frequency.store(hz, Ordering::Relaxed);
        Ok(hz)
    }

    fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    fn frequency(&self) -> u32 {
        self.frequency.load(Ordering::Relaxed)
    }
}

impl IoOps for StubBackend {
    fn inb(&self, _port: u16) -> u8 {
        0
    }

    fn inw(&self, _port: u16) -> u16 {
        0
    }

    fn inl(&self, _port: u16) -> u32 {
        0
    }

    fn outb(&self, _port: u16, _value: u8) {}

    fn outw(&self, _port: u16, _value: u16) {}

    fn outl(&self, _port: u16, _value: u32) {}
}

impl DebugOps for StubBackend {
    fn putc(&self, _c: u8) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stub_io_reads_zero() {
        assert_eq!(IoOps::inb(&BACKEND, 0x3F8), 0);
        assert_eq!(IoOps::inw(&BACKEND, 0x3F8), 0);
        assert_eq!(IoOps::inl(&BACKEND, 0x3F8), 0);
        IoOps::outb(&BACKEND, 0x3F8, 0xFF);
    }

    #[test]
    fn test_stub_context_switch_recorded() {
        let before = BACKEND.context_switches();
        let mut prev = TaskContext::zeroed();
        let next = TaskContext::zeroed();
        CpuOps::context_switch(&BACKEND, &mut prev, &next);
        assert_eq!(BACKEND.context_switches(), before + 1);
    }

    #[test]
    fn test_stub_memory_detection_unsupported() {
        assert_eq!(
            MemoryOps::detect(&BACKEND).err(),
            Some(KernelError::NotSupported)
        );
    }
}
