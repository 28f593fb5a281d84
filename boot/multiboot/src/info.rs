//! # Boot Information Structure
//!
//! The packed Multiboot v1 info record. Bit flags announce which optional
//! fields are valid; the kernel consumes the memory counts (bit 0) and the
//! memory map (bit 6).

use core::marker::PhantomData;

use bitflags::bitflags;
use static_assertions::const_assert_eq;

use crate::memory::MemoryMap;

bitflags! {
    /// Validity flags for the optional [`BootInfo`] fields
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InfoFlags: u32 {
        /// `mem_lower` / `mem_upper` are valid
        const MEMORY = 1 << 0;
        /// `boot_device` is valid
        const BOOT_DEVICE = 1 << 1;
        /// `cmdline` is valid
        const CMDLINE = 1 << 2;
        /// `mods_count` / `mods_addr` are valid
        const MODULES = 1 << 3;
        /// a.out symbol table is valid
        const AOUT_SYMS = 1 << 4;
        /// ELF section header table is valid
        const ELF_SHDR = 1 << 5;
        /// `mmap_addr` / `mmap_length` are valid
        const MEMORY_MAP = 1 << 6;
        /// Drive info is valid
        const DRIVES = 1 << 7;
        /// Config table is valid
        const CONFIG_TABLE = 1 << 8;
        /// Boot loader name is valid
        const LOADER_NAME = 1 << 9;
        /// APM table is valid
        const APM_TABLE = 1 << 10;
        /// VBE info is valid
        const VBE = 1 << 11;
    }
}

/// Raw Multiboot v1 information record as laid out by the loader
///
/// Only the fields the kernel consumes get accessors; the rest are kept so
/// the record matches the wire layout exactly.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawBootInfo {
    flags: u32,
    mem_lower: u32,
    mem_upper: u32,
    boot_device: u32,
    cmdline: u32,
    mods_count: u32,
    mods_addr: u32,
    syms: [u32; 4],
    mmap_length: u32,
    mmap_addr: u32,
}

// Fixed prefix of the Multiboot v1 info structure, through mmap_addr.
const_assert_eq!(core::mem::size_of::<RawBootInfo>(), 52);

/// Parsed boot information, lifetime-bound to the loader-provided memory
pub struct BootInfo<'boot> {
    raw: RawBootInfo,
    _marker: PhantomData<&'boot [u8]>,
}

impl<'boot> BootInfo<'boot> {
    /// Create a `BootInfo` from the raw pointer the loader passed in EBX
    ///
    /// # Safety
    ///
    /// The caller must ensure `ptr` points to a Multiboot info structure that
    /// stays valid and unmodified for `'boot`, and that the memory map it
    /// references (if flagged) is equally stable.
    pub unsafe fn from_ptr(ptr: *const u8) -> Option<Self> {
        if ptr.is_null() {
            return None;
        }
        let raw = unsafe { core::ptr::read_unaligned(ptr.cast::<RawBootInfo>()) };
        Some(Self {
            raw,
            _marker: PhantomData,
        })
    }

    /// Build from an already-read raw record (test entry point)
    pub const fn from_raw(raw: RawBootInfo) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// The validity flags
    pub fn flags(&self) -> InfoFlags {
        InfoFlags::from_bits_truncate(self.raw.flags)
    }

    /// Conventional memory below 1 MiB, in KiB (valid with bit 0)
    pub fn mem_lower_kb(&self) -> Option<u32> {
        self.flags()
            .contains(InfoFlags::MEMORY)
            .then_some(self.raw.mem_lower)
    }

    /// Extended memory above 1 MiB, in KiB (valid with bit 0)
    pub fn mem_upper_kb(&self) -> Option<u32> {
        self.flags()
            .contains(InfoFlags::MEMORY)
            .then_some(self.raw.mem_upper)
    }

    /// Physical address of the memory map
    pub fn mmap_addr(&self) -> u32 {
        self.raw.mmap_addr
    }

    /// Byte length of the memory map
    pub fn mmap_length(&self) -> u32 {
        self.raw.mmap_length
    }

    /// Borrow the memory map, if the loader provided one
    ///
    /// Returns `None` when bit 6 is clear or the map fields are zero.
    pub fn memory_map(&self) -> Option<MemoryMap<'boot>> {
        if !self.flags().contains(InfoFlags::MEMORY_MAP) {
            return None;
        }
        if self.raw.mmap_addr == 0 || self.raw.mmap_length == 0 {
            return None;
        }
        // The loader placed the map below the kernel; the 'boot lifetime of
        // self stands in for the stability of that memory.
        let bytes = unsafe {
            core::slice::from_raw_parts(
                self.raw.mmap_addr as usize as *const u8,
                self.raw.mmap_length as usize,
            )
        };
        Some(MemoryMap::new(bytes))
    }
}

impl core::fmt::Debug for BootInfo<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BootInfo")
            .field("flags", &self.flags())
            .field("mem_lower_kb", &self.mem_lower_kb())
            .field("mem_upper_kb", &self.mem_upper_kb())
            .field("mmap_addr", &format_args!("{:#x}", self.raw.mmap_addr))
            .field("mmap_length", &self.raw.mmap_length)
            .finish()
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    //! Builders for synthetic boot records in host tests.

    use super::*;

    /// Build a `BootInfo` with the given flags and memory-map fields.
    pub fn boot_info_with(flags: InfoFlags, mmap_addr: u32, mmap_length: u32) -> BootInfo<'static> {
        BootInfo::from_raw(RawBootInfo {
            flags: flags.bits(),
            mem_lower: 640,
            mem_upper: 31 * 1024,
            boot_device: 0,
            cmdline: 0,
            mods_count: 0,
            mods_addr: 0,
            syms: [0; 4],
            mmap_length,
            mmap_addr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_roundtrip() {
        let info = test_support::boot_info_with(InfoFlags::MEMORY | InfoFlags::MEMORY_MAP, 0, 0);
        assert!(info.flags().contains(InfoFlags::MEMORY));
        assert!(info.flags().contains(InfoFlags::MEMORY_MAP));
        assert!(!info.flags().contains(InfoFlags::VBE));
    }

    #[test]
    fn test_memory_counts_gated_by_flag() {
        let with = test_support::boot_info_with(InfoFlags::MEMORY, 0, 0);
        assert_eq!(with.mem_lower_kb(), Some(640));
        assert_eq!(with.mem_upper_kb(), Some(31 * 1024));

        let without = test_support::boot_info_with(InfoFlags::empty(), 0, 0);
        assert_eq!(without.mem_lower_kb(), None);
    }

    #[test]
    fn test_memory_map_requires_flag_and_fields() {
        let no_flag = test_support::boot_info_with(InfoFlags::MEMORY, 0x9000, 48);
        assert!(no_flag.memory_map().is_none());

        let zero_len = test_support::boot_info_with(InfoFlags::MEMORY_MAP, 0x9000, 0);
        assert!(zero_len.memory_map().is_none());
    }

    #[test]
    fn test_from_ptr_reads_record() {
        let raw = RawBootInfo {
            flags: InfoFlags::MEMORY.bits(),
            mem_lower: 640,
            mem_upper: 65536,
            boot_device: 0,
            cmdline: 0,
            mods_count: 0,
            mods_addr: 0,
            syms: [0; 4],
            mmap_length: 0,
            mmap_addr: 0,
        };
        let info =
            unsafe { BootInfo::from_ptr((&raw as *const RawBootInfo).cast::<u8>()) }.unwrap();
        assert_eq!(info.mem_upper_kb(), Some(65536));
        assert!(unsafe { BootInfo::from_ptr(core::ptr::null()) }.is_none());
    }
}
