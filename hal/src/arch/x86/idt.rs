//! # Interrupt Descriptor Table (IDT)
//!
//! 256 gates, all ring-0 32-bit interrupt gates. Vectors 0-31 point at the
//! CPU-exception trampolines, 32-47 at the remapped IRQ trampolines; the
//! rest stay non-present.

use core::arch::asm;
use core::mem::size_of;

use static_assertions::const_assert_eq;

use super::gdt::KERNEL_CODE_SELECTOR;
use super::trampolines;

/// Number of gates in the IDT
pub const IDT_ENTRIES: usize = 256;

/// Number of trampoline-backed vectors (32 exceptions + 16 IRQs)
pub const STUB_VECTORS: usize = 48;

/// IDT gate descriptor (8 bytes)
#[derive(Clone, Copy)]
#[repr(C, packed)]
struct IdtEntry {
    offset_low: u16,
    selector: u16,
    zero: u8,
    type_attr: u8,
    offset_high: u16,
}

const_assert_eq!(size_of::<IdtEntry>(), 8);

impl IdtEntry {
    const fn missing() -> Self {
        Self {
            offset_low: 0,
            selector: 0,
            zero: 0,
            type_attr: 0,
            offset_high: 0,
        }
    }

    /// Ring-0 32-bit interrupt gate for `handler`
    fn interrupt_gate(handler: u32) -> Self {
        Self {
            offset_low: handler as u16,
            selector: KERNEL_CODE_SELECTOR,
            zero: 0,
            // Present | DPL 0 | 32-bit interrupt gate
            type_attr: 0x8E,
            offset_high: (handler >> 16) as u16,
        }
    }
}

/// IDT pointer structure for the LIDT instruction
#[repr(C, packed)]
struct IdtPointer {
    limit: u16,
    base: u32,
}

#[repr(C, align(16))]
struct Idt {
    entries: [IdtEntry; IDT_ENTRIES],
}

// =============================================================================
// Global State
// =============================================================================

static mut IDT: Idt = Idt {
    entries: [IdtEntry::missing(); IDT_ENTRIES],
};

// =============================================================================
// Initialization
// =============================================================================

/// Populate the gate array from the trampoline table and load the IDT
///
/// # Safety
/// Must be called only once during early boot, after the GDT is live.
pub unsafe fn init() {
    unsafe {
        let table = trampolines::stub_table();
        for (vector, &stub) in table.iter().enumerate().take(STUB_VECTORS) {
            IDT.entries[vector] = IdtEntry::interrupt_gate(stub);
        }

        let ptr = IdtPointer {
            limit: (size_of::<Idt>() - 1) as u16,
            base: core::ptr::addr_of!(IDT) as u32,
        };
        asm!(
            "lidt [{0}]",
            in(reg) &ptr,
            options(readonly, nostack, preserves_flags)
        );
    }

    log::debug!(
        "idt: {} gates loaded ({} trampoline-backed)",
        IDT_ENTRIES,
        STUB_VECTORS
    );
}
