//! # Atlas Minimal OS - Kernel Entry
//!
//! Composes the Atlas crates into a bootable kernel: Multiboot handoff
//! validation, HAL bring-up, memory manager, scheduler, VFS with RAMFS and
//! DevFS, and the keyboard driver. A missing memory map drops the kernel
//! into recovery mode (memory management disabled, halt).

#![cfg_attr(target_arch = "x86", no_std)]
#![cfg_attr(target_arch = "x86", no_main)]

#[cfg(target_arch = "x86")]
mod boot;

mod kernel;
mod logger;

/// Host-side stand-in; the real entry is `kernel_main` via `boot::_start`.
#[cfg(not(target_arch = "x86"))]
fn main() {
    println!("atlas-minimal-os is a bare-metal image; build it for the x86 kernel target");
}
