//! # Atlas HAL - Hardware Abstraction Layer
//!
//! This crate defines the capability interface through which the rest of the
//! kernel reaches hardware. Each concern (CPU, memory detection, interrupts,
//! timer, port I/O, debug output) is one trait; a backend bundles static
//! implementations of all six into a [`HalCapabilities`] set that is
//! installed exactly once during boot and read-only afterwards.
//!
//! ## Design Philosophy
//!
//! - **Complete**: the kernel proper names no architecture-specific instruction
//! - **Safe**: all unsafe hardware access is encapsulated behind the traits
//! - **Checked**: touching any capability before [`init`] is a usage error
//!   surfaced as [`KernelError::NotInitialized`]

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod cpu;
pub mod debug;
pub mod interrupts;
pub mod io;
pub mod memory;
pub mod sync;
pub mod timer;

// Architecture-specific backends
pub mod arch;

// Stub backend (fallback for every non-x86 build, host tests included)
pub mod arch_stubs;

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use atlas_core::{KernelError, KernelResult};
use atlas_multiboot::BootInfo;

pub use cpu::{CpuOps, TaskContext};
pub use debug::DebugOps;
pub use interrupts::{InterruptOps, IrqHandler};
pub use io::IoOps;
pub use memory::{MemoryDetection, MemoryOps};
pub use sync::IrqMutex;
pub use timer::TimerOps;

/// Timer tick rate the kernel runs at (ticks per second)
pub const TICK_HZ: u32 = 100;

/// CPU architecture identifier, fixed at initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    /// Architecture could not be determined
    Unknown,
    /// 32-bit x86 (the primary target)
    X86_32,
    /// 64-bit x86
    X86_64,
    /// 64-bit ARM
    Arm64,
    /// 64-bit RISC-V
    Riscv64,
}

impl Architecture {
    /// Detect the architecture from compile-time predicates
    #[must_use]
    pub const fn detect() -> Self {
        if cfg!(target_arch = "x86") {
            Self::X86_32
        } else if cfg!(target_arch = "x86_64") {
            Self::X86_64
        } else if cfg!(target_arch = "aarch64") {
            Self::Arm64
        } else if cfg!(target_arch = "riscv64") {
            Self::Riscv64
        } else {
            Self::Unknown
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::X86_32 => "x86 (32-bit)",
            Self::X86_64 => "x86_64",
            Self::Arm64 => "arm64",
            Self::Riscv64 => "riscv64",
        };
        f.write_str(name)
    }
}

/// The grouped capability set a backend registers
#[derive(Clone, Copy)]
pub struct HalCapabilities {
    /// Architecture the backend announces; must match the detected one
    pub arch: Architecture,
    /// CPU control operations
    pub cpu: &'static dyn CpuOps,
    /// Memory detection operations
    pub memory: &'static dyn MemoryOps,
    /// Interrupt controller operations
    pub interrupt: &'static dyn InterruptOps,
    /// Timer operations
    pub timer: &'static dyn TimerOps,
    /// Port I/O operations
    pub io: &'static dyn IoOps,
    /// Debug output operations
    pub debug: &'static dyn DebugOps,
}

impl fmt::Debug for HalCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HalCapabilities")
            .field("arch", &self.arch)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Global State
// =============================================================================

static CAPABILITIES: spin::Mutex<Option<HalCapabilities>> = spin::Mutex::new(None);
static INITIALIZED: AtomicBool = AtomicBool::new(false);

// =============================================================================
// Initialization
// =============================================================================

/// Initialize the HAL
///
/// Detects the architecture, selects a backend, validates and installs its
/// capability set, runs the backend's init for each concern, and runs the
/// backend self-test (non-fatal). `boot_info` is `None` in recovery mode.
///
/// # Errors
///
/// - [`KernelError::AlreadyInitialized`] on a second call
/// - [`KernelError::NotSupported`] if the architecture is unknown or no
///   backend is available for it
/// - registration validation failures are returned and must be treated as
///   fatal by the caller
pub fn init(boot_info: Option<BootInfo<'static>>) -> KernelResult<()> {
    if INITIALIZED.load(Ordering::Acquire) {
        return Err(KernelError::AlreadyInitialized);
    }

    let detected = Architecture::detect();
    if detected == Architecture::Unknown {
        return Err(KernelError::NotSupported);
    }
    log::info!("hal: detected architecture {}", detected);

    let caps = arch::select_backend(detected, boot_info)?;
    register(detected, caps)?;

    // Backend bring-up, one concern at a time. Any failure bubbles up.
    caps.cpu.init()?;
    caps.interrupt.init()?;
    let actual_hz = caps.timer.init(TICK_HZ)?;
    log::info!("hal: timer running at {} Hz", actual_hz);

    // Self-test failure is logged, never fatal.
    if let Err(err) = caps.debug.self_test() {
        log::warn!("hal: backend self-test failed: {}", err);
    }

    INITIALIZED.store(true, Ordering::Release);
    log::info!("hal: initialized for {}", detected);
    Ok(())
}

/// Validate a capability set and install it
///
/// A set is rejected when its announced architecture does not match the
/// detected one. Installation happens with interrupts masked; the set is
/// read-only afterwards.
fn register(detected: Architecture, caps: HalCapabilities) -> KernelResult<()> {
    if caps.arch != detected {
        log::error!(
            "hal: backend announces {} but {} was detected",
            caps.arch,
            detected
        );
        return Err(KernelError::InvalidParameter);
    }

    let was = arch::local_irq::disable();
    *CAPABILITIES.lock() = Some(caps);
    arch::local_irq::restore(was);
    Ok(())
}

/// Shut the HAL down, reversing [`init`]
///
/// # Errors
///
/// [`KernelError::NotInitialized`] when no capability set is installed.
pub fn shutdown() -> KernelResult<()> {
    if !INITIALIZED.swap(false, Ordering::AcqRel) {
        return Err(KernelError::NotInitialized);
    }
    let was = arch::local_irq::disable();
    *CAPABILITIES.lock() = None;
    arch::local_irq::restore(was);
    log::info!("hal: shut down");
    Ok(())
}

/// Check whether the HAL is initialized
pub fn is_initialized() -> bool {
    INITIALIZED.load(Ordering::Acquire)
}

fn capabilities() -> KernelResult<HalCapabilities> {
    if !INITIALIZED.load(Ordering::Acquire) {
        return Err(KernelError::NotInitialized);
    }
    CAPABILITIES.lock().ok_or(KernelError::NotInitialized)
}

// =============================================================================
// Capability Accessors
// =============================================================================

/// Get the installed architecture
pub fn architecture() -> KernelResult<Architecture> {
    Ok(capabilities()?.arch)
}

/// Get the CPU operations table
pub fn cpu() -> KernelResult<&'static dyn CpuOps> {
    Ok(capabilities()?.cpu)
}

/// Get the memory detection operations table
pub fn memory() -> KernelResult<&'static dyn MemoryOps> {
    Ok(capabilities()?.memory)
}

/// Get the interrupt operations table
pub fn interrupt() -> KernelResult<&'static dyn InterruptOps> {
    Ok(capabilities()?.interrupt)
}

/// Get the timer operations table
pub fn timer() -> KernelResult<&'static dyn TimerOps> {
    Ok(capabilities()?.timer)
}

/// Get the port I/O operations table
pub fn io() -> KernelResult<&'static dyn IoOps> {
    Ok(capabilities()?.io)
}

/// Get the debug output operations table
pub fn debug() -> KernelResult<&'static dyn DebugOps> {
    Ok(capabilities()?.debug)
}

// =============================================================================
// Emergency Paths
// =============================================================================

/// Disable interrupts, report `reason` on whatever debug channel exists,
/// and halt forever.
pub fn emergency_halt(reason: &str) -> ! {
    arch::local_irq::disable();

    if let Ok(caps) = capabilities() {
        caps.debug.write_str("\n*** EMERGENCY HALT: ");
        caps.debug.write_str(reason);
        caps.debug.write_str(" ***\n");
    }

    loop {
        arch::local_irq::halt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The global capability set is process-wide; keep ordering-sensitive
    // assertions in one test.
    #[test]
    fn test_init_lifecycle() {
        // Accessors fail before install.
        let _ = shutdown();
        assert_eq!(cpu().err(), Some(KernelError::NotInitialized));
        assert_eq!(timer().err(), Some(KernelError::NotInitialized));

        // Host build installs the stub backend for the detected arch.
        init(None).unwrap();
        assert!(is_initialized());
        assert_eq!(architecture().unwrap(), Architecture::detect());
        assert_eq!(io().unwrap().inb(0x60), 0);

        // Double init is an error.
        assert_eq!(init(None).err(), Some(KernelError::AlreadyInitialized));

        // Shutdown reverses init.
        shutdown().unwrap();
        assert_eq!(shutdown().err(), Some(KernelError::NotInitialized));
        assert_eq!(debug().err(), Some(KernelError::NotInitialized));
    }

    #[test]
    fn test_register_rejects_arch_mismatch() {
        let caps = arch_stubs::capabilities_for(Architecture::Arm64);
        assert_eq!(
            register(Architecture::X86_32, caps).err(),
            Some(KernelError::InvalidParameter)
        );
    }
}
