//! # Memory Detection Abstraction
//!
//! The HAL virtualizes boot-time memory discovery so the memory manager
//! consumes one architecture-neutral record instead of the raw boot protocol.

use atlas_core::KernelResult;

/// The facts memory initialization needs, distilled from the boot handoff
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryDetection {
    /// Conventional memory below 1 MiB, in KiB
    pub lower_kb: u32,
    /// Extended memory above 1 MiB, in KiB
    pub upper_kb: u32,
    /// Sum of available-region lengths, in bytes
    pub total_available: u64,
    /// Highest end address among available regions
    pub highest_end: u64,
    /// Largest safe region as (start, length), if any
    pub largest_safe: Option<(u64, u64)>,
    /// First address past the loaded kernel image
    pub kernel_end: usize,
}

/// Memory detection operations
pub trait MemoryOps: Send + Sync {
    /// Detect installed memory
    ///
    /// Fails with `NotInitialized` in recovery mode (no boot info) and
    /// `NotSupported` on backends without memory discovery.
    fn detect(&self) -> KernelResult<MemoryDetection>;
}
