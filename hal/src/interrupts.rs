//! # Interrupt Delivery
//!
//! The architecture backends capture CPU state in assembly stubs and funnel
//! every vector into [`dispatch`]. CPU exceptions (vectors 0-31) halt the
//! system; remapped hardware interrupts (32-47) are routed to the single
//! registered handler for that IRQ line.

use atlas_core::{KernelError, KernelResult};

use crate::sync::IrqMutex;

/// Handler invoked for a hardware interrupt, with the IRQ number (0-15)
pub type IrqHandler = fn(irq: u8);

/// Number of hardware IRQ lines on the legacy controller pair
pub const IRQ_LINES: usize = 16;

/// Vector the first hardware IRQ is remapped to
pub const IRQ_BASE_VECTOR: u32 = 32;

/// Interrupt controller operations
pub trait InterruptOps: Send + Sync {
    /// One-time controller bring-up (PIC remap on x86); all IRQs masked
    fn init(&self) -> KernelResult<()>;

    /// Register `handler` for `irq`
    ///
    /// Only one handler per line; re-registration overwrites with a warning.
    fn register_handler(&self, irq: u8, handler: IrqHandler) -> KernelResult<()>;

    /// Remove the handler for `irq`
    fn unregister_handler(&self, irq: u8) -> KernelResult<()>;

    /// Unmask `irq` at the controller
    fn enable_irq(&self, irq: u8) -> KernelResult<()>;

    /// Mask `irq` at the controller
    fn disable_irq(&self, irq: u8) -> KernelResult<()>;

    /// Signal end-of-interrupt for `irq`
    fn ack_irq(&self, irq: u8);
}

// =============================================================================
// Handler Table
// =============================================================================

static HANDLERS: IrqMutex<[Option<IrqHandler>; IRQ_LINES]> = IrqMutex::new([None; IRQ_LINES]);

/// Install a handler for `irq`, warning on overwrite
pub(crate) fn install_handler(irq: u8, handler: IrqHandler) -> KernelResult<()> {
    let slot = usize::from(irq);
    if slot >= IRQ_LINES {
        return Err(KernelError::InvalidParameter);
    }
    let mut table = HANDLERS.lock();
    if table[slot].is_some() {
        log::warn!("irq: overwriting existing handler for IRQ{}", irq);
    }
    table[slot] = Some(handler);
    Ok(())
}

/// Remove the handler for `irq`
pub(crate) fn remove_handler(irq: u8) -> KernelResult<()> {
    let slot = usize::from(irq);
    if slot >= IRQ_LINES {
        return Err(KernelError::InvalidParameter);
    }
    let mut table = HANDLERS.lock();
    if table[slot].take().is_none() {
        return Err(KernelError::InvalidState);
    }
    Ok(())
}

fn handler_for(irq: u8) -> Option<IrqHandler> {
    *HANDLERS.lock().get(usize::from(irq))?
}

// =============================================================================
// Common Dispatch
// =============================================================================

/// Names for the 32 CPU exception vectors
pub const EXCEPTION_NAMES: [&str; 32] = [
    "divide error",
    "debug",
    "non-maskable interrupt",
    "breakpoint",
    "overflow",
    "bound range exceeded",
    "invalid opcode",
    "device not available",
    "double fault",
    "coprocessor segment overrun",
    "invalid TSS",
    "segment not present",
    "stack-segment fault",
    "general protection fault",
    "page fault",
    "reserved (15)",
    "x87 floating-point",
    "alignment check",
    "machine check",
    "SIMD floating-point",
    "virtualization",
    "control protection",
    "reserved (22)",
    "reserved (23)",
    "reserved (24)",
    "reserved (25)",
    "reserved (26)",
    "reserved (27)",
    "hypervisor injection",
    "VMM communication",
    "security",
    "reserved (31)",
];

/// Deliver a captured interrupt to its consumer
///
/// Called by the architecture trampolines with the vector number. Exception
/// vectors report and halt; IRQ vectors run the registered handler (or log
/// that none exists) and then acknowledge the controller.
pub fn dispatch(vector: u32) {
    if vector < 32 {
        let name = EXCEPTION_NAMES[vector as usize];
        log::error!("cpu exception {}: {}", vector, name);
        crate::emergency_halt(name);
    }

    if (IRQ_BASE_VECTOR..IRQ_BASE_VECTOR + IRQ_LINES as u32).contains(&vector) {
        let irq = (vector - IRQ_BASE_VECTOR) as u8;
        match handler_for(irq) {
            Some(handler) => handler(irq),
            None => log::warn!("irq: unhandled IRQ{} (vector {})", irq, vector),
        }
        if let Ok(ops) = crate::interrupt() {
            ops.ack_irq(irq);
        }
        return;
    }

    log::warn!("irq: spurious vector {}", vector);
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    static FIRED: AtomicU32 = AtomicU32::new(0);

    fn count_handler(_irq: u8) {
        FIRED.fetch_add(1, Ordering::SeqCst);
    }

    fn other_handler(_irq: u8) {
        FIRED.fetch_add(100, Ordering::SeqCst);
    }

    #[test]
    fn test_handler_install_dispatch_remove() {
        install_handler(5, count_handler).unwrap();
        dispatch(IRQ_BASE_VECTOR + 5);
        assert_eq!(FIRED.load(Ordering::SeqCst) % 100, 1);

        // Re-registration overwrites (warning logged).
        install_handler(5, other_handler).unwrap();
        dispatch(IRQ_BASE_VECTOR + 5);
        assert!(FIRED.load(Ordering::SeqCst) >= 101);

        remove_handler(5).unwrap();
        assert_eq!(remove_handler(5).err(), Some(KernelError::InvalidState));
    }

    #[test]
    fn test_handler_rejects_bad_line() {
        assert_eq!(
            install_handler(16, count_handler).err(),
            Some(KernelError::InvalidParameter)
        );
    }

    #[test]
    fn test_dispatch_ignores_spurious_vector() {
        // Vectors past the IRQ window must not panic or halt.
        dispatch(200);
    }
}
