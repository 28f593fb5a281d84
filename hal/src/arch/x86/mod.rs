//! # x86 (32-bit) Backend
//!
//! The real-hardware capability set: GDT/IDT bring-up, PIC remap, PIT
//! programming, port I/O, serial debug channel, and Multiboot-fed memory
//! detection.

pub mod gdt;
pub mod idt;
pub mod pic;
pub mod pit;
pub mod port;
pub mod trampolines;

use atlas_core::{KernelError, KernelResult};
use atlas_multiboot::{BootInfo, MemorySummary};

use crate::cpu::{CpuOps, TaskContext};
use crate::debug::DebugOps;
use crate::interrupts::InterruptOps;
use crate::io::IoOps;
use crate::memory::{MemoryDetection, MemoryOps};
use crate::timer::TimerOps;
use crate::{Architecture, HalCapabilities, IrqHandler};

/// Interrupt-enable bit in EFLAGS
pub const EFLAGS_IF: u32 = 1 << 9;

/// COM1 data port, used as the debug channel
const DEBUG_PORT: u16 = 0x3F8;
/// COM1 line status register
const DEBUG_LSR: u16 = 0x3F8 + 5;

extern "C" {
    // Provided by the linker script: first address past the kernel image.
    static __kernel_end: u8;
}

/// The x86 backend
#[derive(Debug)]
pub struct X86Backend;

static BACKEND: X86Backend = X86Backend;

/// Memory facts computed once at HAL init
static DETECTION: spin::Once<KernelResult<MemoryDetection>> = spin::Once::new();

/// Build the x86 capability set
///
/// `boot_info` is `None` in recovery mode; memory detection then reports
/// `NotInitialized` and the memory manager stays disabled.
pub(crate) fn capabilities(boot_info: Option<BootInfo<'static>>) -> KernelResult<HalCapabilities> {
    DETECTION.call_once(|| detect_memory(boot_info));

    Ok(HalCapabilities {
        arch: Architecture::X86_32,
        cpu: &BACKEND,
        memory: &BACKEND,
        interrupt: &BACKEND,
        timer: &BACKEND,
        io: &BACKEND,
        debug: &BACKEND,
    })
}

fn detect_memory(boot_info: Option<BootInfo<'static>>) -> KernelResult<MemoryDetection> {
    let info = boot_info.ok_or(KernelError::NotInitialized)?;
    let map = info.memory_map().ok_or(KernelError::InvalidState)?;
    let summary = MemorySummary::analyze(&map);

    Ok(MemoryDetection {
        lower_kb: info.mem_lower_kb().unwrap_or(0),
        upper_kb: info.mem_upper_kb().unwrap_or(0),
        total_available: summary.total_available,
        highest_end: summary.highest_end,
        largest_safe: summary.largest_safe.map(|r| (r.start(), r.length())),
        kernel_end: unsafe { core::ptr::addr_of!(__kernel_end) as usize },
    })
}

/// Timer IRQ handler: bump the tick counter and run the attached callback
fn timer_irq(_irq: u8) {
    let ticks = pit::tick();
    crate::timer::fire_tick(ticks);
}

// =============================================================================
// Capability Implementations
// =============================================================================

impl CpuOps for X86Backend {
    fn init(&self) -> KernelResult<()> {
        unsafe {
            gdt::init();
            idt::init();
        }
        log::info!("x86: GDT and IDT loaded");
        Ok(())
    }

    fn interrupts_enabled(&self) -> bool {
        let flags: u32;
        unsafe {
            core::arch::asm!("pushfd", "pop {0}", out(reg) flags, options(nomem));
        }
        flags & EFLAGS_IF != 0
    }

    fn disable_interrupts(&self) -> bool {
        crate::arch::local_irq::disable()
    }

    fn enable_interrupts(&self) {
        unsafe {
            core::arch::asm!("sti", options(nomem, nostack));
        }
    }

    fn wait_for_interrupt(&self) {
        crate::arch::local_irq::halt();
    }

    fn context_switch(&self, prev: &mut TaskContext, next: &TaskContext) {
        unsafe {
            trampolines::context_switch(prev, next);
        }
    }

    fn kernel_code_selector(&self) -> u16 {
        gdt::KERNEL_CODE_SELECTOR
    }

    fn kernel_data_selector(&self) -> u16 {
        gdt::KERNEL_DATA_SELECTOR
    }
}

impl MemoryOps for X86Backend {
    fn detect(&self) -> KernelResult<MemoryDetection> {
        match DETECTION.get() {
            Some(result) => *result,
            None => Err(KernelError::NotInitialized),
        }
    }
}

impl InterruptOps for X86Backend {
    fn init(&self) -> KernelResult<()> {
        unsafe {
            pic::init();
        }
        Ok(())
    }

    fn register_handler(&self, irq: u8, handler: IrqHandler) -> KernelResult<()> {
        crate::interrupts::install_handler(irq, handler)
    }

    fn unregister_handler(&self, irq: u8) -> KernelResult<()> {
        crate::interrupts::remove_handler(irq)
    }

    fn enable_irq(&self, irq: u8) -> KernelResult<()> {
        if irq >= 16 {
            return Err(KernelError::InvalidParameter);
        }
        pic::enable_irq(irq);
        Ok(())
    }

    fn disable_irq(&self, irq: u8) -> KernelResult<()> {
        if irq >= 16 {
            return Err(KernelError::InvalidParameter);
        }
        pic::disable_irq(irq);
        Ok(())
    }

    fn ack_irq(&self, irq: u8) {
        pic::ack_irq(irq);
    }
}

impl TimerOps for X86Backend {
    fn init(&self, hz: u32) -> KernelResult<u32> {
        let actual = unsafe { pit::init(hz) };
        self.register_handler(0, timer_irq)?;
        self.enable_irq(0)?;
        Ok(actual)
    }

    fn ticks(&self) -> u64 {
        pit::ticks()
    }

    fn frequency(&self) -> u32 {
        pit::frequency()
    }
}

impl IoOps for X86Backend {
    fn inb(&self, port: u16) -> u8 {
        unsafe { port::inb(port) }
    }

    fn inw(&self, port: u16) -> u16 {
        unsafe { port::inw(port) }
    }

    fn inl(&self, port: u16) -> u32 {
        unsafe { port::inl(port) }
    }

    fn outb(&self, port: u16, value: u8) {
        unsafe { port::outb(port, value) }
    }

    fn outw(&self, port: u16, value: u16) {
        unsafe { port::outw(port, value) }
    }

    fn outl(&self, port: u16, value: u32) {
        unsafe { port::outl(port, value) }
    }
}

impl DebugOps for X86Backend {
    fn putc(&self, c: u8) {
        unsafe {
            // Bounded wait on transmit-holding-register empty
            for _ in 0..100_000 {
                if port::inb(DEBUG_LSR) & 0x20 != 0 {
                    break;
                }
            }
            port::outb(DEBUG_PORT, c);
        }
    }

    fn self_test(&self) -> KernelResult<()> {
        // Descriptor arithmetic sanity: the divisor helper must honor its
        // clamp bounds on this backend's own tick rate.
        let (divisor, actual) = crate::timer::pit_divisor(crate::TICK_HZ);
        if divisor == 0 || actual == 0 {
            return Err(KernelError::HardwareFailure);
        }
        Ok(())
    }
}
