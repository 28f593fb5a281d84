//! # Atlas Device Drivers
//!
//! The device layer above the HAL: PS/2 keyboard with its bounded event
//! ring, 8250-compatible serial ports, the VGA text console, and the DevFS
//! pseudo-filesystem exposing them as device nodes.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod console;
pub mod devfs;
pub mod keyboard;
pub mod ring;
pub mod serial;

pub use devfs::DevFs;
pub use keyboard::KeyEvent;

/// Current tick count, zero when the HAL timer is not up yet
pub(crate) fn now_ticks() -> u64 {
    atlas_hal::timer().map(|t| t.ticks()).unwrap_or(0)
}
