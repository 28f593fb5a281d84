//! # Global Descriptor Table (GDT)
//!
//! Five flat segments spanning the full 4 GiB address space: null, kernel
//! code, kernel data, user code, user data. Loaded once during CPU init;
//! the kernel never touches segmentation again.

use core::arch::asm;
use core::mem::size_of;

use static_assertions::const_assert_eq;

/// Kernel code segment selector
pub const KERNEL_CODE_SELECTOR: u16 = 0x08;
/// Kernel data segment selector
pub const KERNEL_DATA_SELECTOR: u16 = 0x10;
/// User code segment selector (with RPL 3)
pub const USER_CODE_SELECTOR: u16 = 0x18 | 3;
/// User data segment selector (with RPL 3)
pub const USER_DATA_SELECTOR: u16 = 0x20 | 3;

/// GDT entry (8 bytes)
#[derive(Clone, Copy)]
#[repr(C, packed)]
pub struct GdtEntry {
    limit_low: u16,
    base_low: u16,
    base_middle: u8,
    access: u8,
    flags_limit_high: u8,
    base_high: u8,
}

const_assert_eq!(size_of::<GdtEntry>(), 8);

impl GdtEntry {
    /// Create a null entry
    pub const fn null() -> Self {
        Self {
            limit_low: 0,
            base_low: 0,
            base_middle: 0,
            access: 0,
            flags_limit_high: 0,
            base_high: 0,
        }
    }

    const fn flat(access: u8) -> Self {
        Self {
            limit_low: 0xFFFF,
            base_low: 0,
            base_middle: 0,
            access,
            // 4 KiB granularity | 32-bit operand | limit high nibble
            flags_limit_high: 0b1100_1111,
            base_high: 0,
        }
    }

    /// Create the kernel code segment
    pub const fn kernel_code_segment() -> Self {
        // Present | DPL 0 | Code | Executable | Readable
        Self::flat(0b1001_1010)
    }

    /// Create the kernel data segment
    pub const fn kernel_data_segment() -> Self {
        // Present | DPL 0 | Data | Writable
        Self::flat(0b1001_0010)
    }

    /// Create the user code segment
    pub const fn user_code_segment() -> Self {
        // Present | DPL 3 | Code | Executable | Readable
        Self::flat(0b1111_1010)
    }

    /// Create the user data segment
    pub const fn user_data_segment() -> Self {
        // Present | DPL 3 | Data | Writable
        Self::flat(0b1111_0010)
    }
}

/// GDT pointer structure for the LGDT instruction
#[repr(C, packed)]
pub struct GdtPointer {
    /// Size of GDT - 1
    pub limit: u16,
    /// Base address of GDT
    pub base: u32,
}

/// The Global Descriptor Table
#[repr(C, align(16))]
pub struct Gdt {
    entries: [GdtEntry; 5],
}

impl Gdt {
    /// Create a new GDT
    pub const fn new() -> Self {
        Self {
            entries: [
                GdtEntry::null(),                // 0x00: Null
                GdtEntry::kernel_code_segment(), // 0x08: Kernel code
                GdtEntry::kernel_data_segment(), // 0x10: Kernel data
                GdtEntry::user_code_segment(),   // 0x18: User code
                GdtEntry::user_data_segment(),   // 0x20: User data
            ],
        }
    }

    /// Get a pointer for the LGDT instruction
    pub fn pointer(&self) -> GdtPointer {
        GdtPointer {
            limit: (size_of::<Self>() - 1) as u16,
            base: self as *const _ as u32,
        }
    }
}

// =============================================================================
// Global State
// =============================================================================

/// Static GDT - must be static because the CPU references it
static GDT: Gdt = Gdt::new();

// =============================================================================
// Initialization
// =============================================================================

/// Load the GDT and reload every segment register
///
/// # Safety
/// Must be called only once during early boot.
pub unsafe fn init() {
    let gdt_ptr = GDT.pointer();
    unsafe {
        asm!(
            "lgdt [{0}]",
            in(reg) &gdt_ptr,
            options(readonly, nostack, preserves_flags)
        );

        // Reload CS via a far return
        asm!(
            "push {sel}",
            "lea {tmp}, [2f]",
            "push {tmp}",
            "retf",
            "2:",
            sel = in(reg) u32::from(KERNEL_CODE_SELECTOR),
            tmp = lateout(reg) _,
            options(preserves_flags),
        );

        // Load the data segment registers
        asm!(
            "mov ds, {0:x}",
            "mov es, {0:x}",
            "mov fs, {0:x}",
            "mov gs, {0:x}",
            "mov ss, {0:x}",
            in(reg) KERNEL_DATA_SELECTOR,
            options(nostack, preserves_flags),
        );
    }

    log::debug!("gdt: loaded 5 flat descriptors at {:p}", &GDT);
}
