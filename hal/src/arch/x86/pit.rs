//! # Programmable Interval Timer (PIT)
//!
//! The 8253 PIT drives preemption. Channel 0 is programmed in mode 3
//! (square wave, binary) with divisor = oscillator / requested-Hz, clamped
//! into [1, 65535]; when the clamp bites, the actual frequency is recomputed
//! from the clamped divisor.

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use super::port::outb;

/// PIT I/O ports
mod ports {
    pub const CHANNEL_0: u16 = 0x40;
    pub const COMMAND: u16 = 0x43;
}

/// PIT command byte fields
mod command {
    pub const CHANNEL_0: u8 = 0b00_000000;
    pub const ACCESS_LOHI: u8 = 0b00_110000;
    pub const MODE_SQUARE: u8 = 0b00_000110; // Mode 3: square wave
    pub const BINARY: u8 = 0b00_000000;
}

pub use crate::timer::{pit_divisor, PIT_FREQUENCY};

/// Tick counter, bumped from the IRQ0 path
static TICK_COUNT: AtomicU64 = AtomicU64::new(0);

/// Actual programmed frequency
static ACTUAL_HZ: AtomicU32 = AtomicU32::new(0);

/// Program channel 0 for `hz` interrupts per second
///
/// Returns the frequency actually achieved after divisor clamping.
///
/// # Safety
/// Must be called only once during early boot.
pub unsafe fn init(hz: u32) -> u32 {
    let (divisor, actual) = pit_divisor(hz);
    ACTUAL_HZ.store(actual, Ordering::Relaxed);

    let cmd = command::CHANNEL_0 | command::ACCESS_LOHI | command::MODE_SQUARE | command::BINARY;

    unsafe {
        outb(ports::COMMAND, cmd);
        // Divisor goes low byte first
        outb(ports::CHANNEL_0, divisor as u8);
        outb(ports::CHANNEL_0, (divisor >> 8) as u8);
    }

    log::info!("pit: {} Hz requested, {} Hz actual (divisor={})", hz, actual, divisor);
    actual
}

/// Record one timer interrupt; returns the new tick count
pub fn tick() -> u64 {
    TICK_COUNT.fetch_add(1, Ordering::Relaxed) + 1
}

/// Monotonic tick count since init
pub fn ticks() -> u64 {
    TICK_COUNT.load(Ordering::Relaxed)
}

/// The programmed frequency
pub fn frequency() -> u32 {
    ACTUAL_HZ.load(Ordering::Relaxed)
}
