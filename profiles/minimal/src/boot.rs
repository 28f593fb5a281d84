//! # Boot Module - Multiboot Header and Entry Trampoline
//!
//! The loader scans the first 8 KiB of the image for the Multiboot header,
//! then jumps to `_start` in 32-bit protected mode with the magic in EAX
//! and the info-structure pointer in EBX. `_start` installs the boot stack
//! and enters `kernel_main(magic, info)`.

use core::arch::global_asm;

/// Multiboot v1 header magic
const MULTIBOOT_MAGIC: u32 = 0x1BAD_B002;
/// Header flags: page-align modules, provide memory info
const MULTIBOOT_FLAGS: u32 = 0x0000_0003;

/// Multiboot header wrapper for alignment
#[repr(C, align(4))]
struct MultibootHeader {
    data: [u32; 3],
}

/// Must land in the first 8 KiB of the image
#[used]
#[link_section = ".multiboot_header"]
static MULTIBOOT_HEADER: MultibootHeader = MultibootHeader {
    data: [
        MULTIBOOT_MAGIC,
        MULTIBOOT_FLAGS,
        0u32.wrapping_sub(MULTIBOOT_MAGIC).wrapping_sub(MULTIBOOT_FLAGS),
    ],
};

// 16 KiB boot stack and the entry trampoline. The loader guarantees
// protected mode with paging off; everything else is ours to set up.
global_asm!(
    r#"
    .section .bss
    .align 16
    boot_stack_bottom:
    .skip 16384
    boot_stack_top:

    .section .text
    .global _start
    _start:
        mov esp, offset boot_stack_top
        push ebx            // multiboot info pointer
        push eax            // multiboot magic
        call kernel_main
        cli
    1:
        hlt
        jmp 1b
    "#
);
