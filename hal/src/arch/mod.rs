//! # Architecture Backend Selection
//!
//! One backend per supported architecture. The x86 backend drives real
//! hardware; every other build (including host-side tests) falls back to the
//! stub backend, which reads zeros and ignores writes.

use atlas_core::KernelResult;
use atlas_multiboot::BootInfo;

use crate::{Architecture, HalCapabilities};

#[cfg(target_arch = "x86")]
pub mod x86;

/// Choose and prepare the backend for the detected architecture
pub(crate) fn select_backend(
    detected: Architecture,
    boot_info: Option<BootInfo<'static>>,
) -> KernelResult<HalCapabilities> {
    #[cfg(target_arch = "x86")]
    {
        let _ = detected;
        x86::capabilities(boot_info)
    }
    #[cfg(not(target_arch = "x86"))]
    {
        let _ = boot_info;
        Ok(crate::arch_stubs::capabilities_for(detected))
    }
}

/// Raw local interrupt masking, usable before the capability set exists
pub mod local_irq {
    /// Disable maskable interrupts; returns whether they were enabled
    #[inline]
    pub fn disable() -> bool {
        #[cfg(target_arch = "x86")]
        {
            let flags: u32;
            unsafe {
                core::arch::asm!(
                    "pushfd",
                    "pop {0}",
                    "cli",
                    out(reg) flags,
                    options(nomem)
                );
            }
            flags & super::x86::EFLAGS_IF != 0
        }
        #[cfg(not(target_arch = "x86"))]
        {
            false
        }
    }

    /// Restore a state previously returned by [`disable`]
    #[inline]
    pub fn restore(enabled: bool) {
        #[cfg(target_arch = "x86")]
        {
            if enabled {
                unsafe {
                    core::arch::asm!("sti", options(nomem, nostack));
                }
            }
        }
        #[cfg(not(target_arch = "x86"))]
        {
            let _ = enabled;
        }
    }

    /// Wait for the next interrupt (or spin where halting is unavailable)
    #[inline]
    pub fn halt() {
        #[cfg(target_arch = "x86")]
        unsafe {
            core::arch::asm!("hlt", options(nomem, nostack, preserves_flags));
        }
        #[cfg(not(target_arch = "x86"))]
        core::hint::spin_loop();
    }
}
