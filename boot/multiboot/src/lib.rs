//! # Atlas Multiboot - Legacy Boot Protocol Parsing
//!
//! This crate provides type-safe, zero-copy access to the Multiboot v1 boot
//! information structure that a compliant loader hands to the kernel entry
//! point.
//!
//! ## Design Philosophy
//!
//! 1. **Unsafe Minimization**: Only ONE unsafe operation at the boundary
//! 2. **Zero-Copy**: Memory-map entries are parsed in-place
//! 3. **Bounds-Checked**: Malformed entry sizes terminate iteration instead
//!    of walking out of the map
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use atlas_multiboot::{BootInfo, BOOTLOADER_MAGIC};
//!
//! fn kernel_entry(magic: u32, info_ptr: *const u8) {
//!     if magic != BOOTLOADER_MAGIC {
//!         panic!("not booted by a Multiboot loader");
//!     }
//!
//!     // Single unsafe boundary
//!     let info = unsafe { BootInfo::from_ptr(info_ptr) }.expect("bad boot info");
//!
//!     if let Some(map) = info.memory_map() {
//!         for region in map.regions() {
//!             // Process typed regions safely...
//!         }
//!     }
//! }
//! ```

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod info;
pub mod memory;

pub use info::{BootInfo, InfoFlags};
pub use memory::{
    MemoryMap, MemoryRegion, MemoryRegionIterator, MemoryRegionKind, MemoryStats, MemorySummary,
};

use atlas_core::{KernelError, KernelResult};

/// Magic value the loader passes in EAX for a Multiboot v1 boot
pub const BOOTLOADER_MAGIC: u32 = 0x2BAD_B002;

/// Validate the loader handoff per the boot ABI
///
/// A kernel booted without the Multiboot magic, or whose info structure lacks
/// a memory map, must fall back to recovery mode (memory management disabled).
///
/// # Errors
///
/// - [`KernelError::ProtocolError`] if the magic does not match
/// - [`KernelError::NullPointer`] if `info` is absent
/// - [`KernelError::InvalidState`] if the memory map is missing or empty
pub fn validate_handoff(magic: u32, info: Option<&BootInfo>) -> KernelResult<()> {
    if magic != BOOTLOADER_MAGIC {
        log::error!(
            "multiboot: bad magic {:#010x} (expected {:#010x})",
            magic,
            BOOTLOADER_MAGIC
        );
        return Err(KernelError::ProtocolError);
    }

    let info = info.ok_or(KernelError::NullPointer)?;

    if !info.flags().contains(InfoFlags::MEMORY_MAP)
        || info.mmap_addr() == 0
        || info.mmap_length() == 0
    {
        log::error!("multiboot: info structure carries no memory map");
        return Err(KernelError::InvalidState);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::test_support::boot_info_with;

    #[test]
    fn test_validate_rejects_bad_magic() {
        let info = boot_info_with(InfoFlags::MEMORY_MAP, 0x1000, 48);
        assert_eq!(
            validate_handoff(0xDEAD_0000, Some(&info)),
            Err(KernelError::ProtocolError)
        );
    }

    #[test]
    fn test_validate_rejects_missing_info() {
        assert_eq!(
            validate_handoff(BOOTLOADER_MAGIC, None),
            Err(KernelError::NullPointer)
        );
    }

    #[test]
    fn test_validate_rejects_absent_memory_map() {
        let info = boot_info_with(InfoFlags::MEMORY, 0, 0);
        assert_eq!(
            validate_handoff(BOOTLOADER_MAGIC, Some(&info)),
            Err(KernelError::InvalidState)
        );
    }

    #[test]
    fn test_validate_accepts_good_handoff() {
        let info = boot_info_with(InfoFlags::MEMORY | InfoFlags::MEMORY_MAP, 0x9000, 72);
        assert!(validate_handoff(BOOTLOADER_MAGIC, Some(&info)).is_ok());
    }
}
