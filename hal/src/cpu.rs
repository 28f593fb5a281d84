//! # CPU Control Abstraction
//!
//! CPU-level primitives: interrupt masking, halting, and the context-switch
//! leaf the scheduler invokes.

use atlas_core::KernelResult;
use static_assertions::const_assert_eq;

/// Saved execution context for one task
///
/// The switch leaf saves and restores the callee-saved registers plus stack
/// pointer, resume address, and flags; the caller-saved registers are already
/// on the stack at every switch point. Segment selectors are recorded at
/// creation (the kernel runs on flat kernel segments throughout).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskContext {
    /// Callee-saved EBX
    pub ebx: u32,
    /// Callee-saved ESI
    pub esi: u32,
    /// Callee-saved EDI
    pub edi: u32,
    /// Frame pointer
    pub ebp: u32,
    /// Stack pointer
    pub esp: u32,
    /// Resume address
    pub eip: u32,
    /// Flags register (IF set for new tasks)
    pub eflags: u32,
    /// Code segment selector recorded at creation
    pub cs: u32,
    /// Data segment selector recorded at creation
    pub ds: u32,
}

// The switch leaf addresses the first seven fields by fixed offset.
const_assert_eq!(core::mem::size_of::<TaskContext>(), 36);

impl TaskContext {
    /// An all-zero context
    pub const fn zeroed() -> Self {
        Self {
            ebx: 0,
            esi: 0,
            edi: 0,
            ebp: 0,
            esp: 0,
            eip: 0,
            eflags: 0,
            cs: 0,
            ds: 0,
        }
    }
}

/// CPU control operations
pub trait CpuOps: Send + Sync {
    /// One-time CPU bring-up (descriptor tables on x86)
    fn init(&self) -> KernelResult<()>;

    /// Are maskable interrupts currently enabled?
    fn interrupts_enabled(&self) -> bool;

    /// Disable maskable interrupts, returning the previous state
    fn disable_interrupts(&self) -> bool;

    /// Enable maskable interrupts
    fn enable_interrupts(&self);

    /// Restore a state previously returned by `disable_interrupts`
    fn restore_interrupts(&self, enabled: bool) {
        if enabled {
            self.enable_interrupts();
        }
    }

    /// Wait for the next interrupt (single halt)
    fn wait_for_interrupt(&self);

    /// Swap execution from `prev` to `next`
    ///
    /// Saves the current register state into `prev` and resumes from `next`.
    /// Must be called with interrupts disabled.
    fn context_switch(&self, prev: &mut TaskContext, next: &TaskContext);

    /// Kernel code segment selector for new task contexts
    fn kernel_code_selector(&self) -> u16;

    /// Kernel data segment selector for new task contexts
    fn kernel_data_selector(&self) -> u16;
}
