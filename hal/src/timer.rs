//! # Timer Abstraction
//!
//! The system timer fires at [`crate::TICK_HZ`] and maintains the monotonic
//! tick counter. Exactly one tick callback (the scheduler) may be attached;
//! the backend's timer interrupt handler invokes it after bumping the count.

use core::sync::atomic::{AtomicUsize, Ordering};

use atlas_core::KernelResult;

/// Callback invoked from the timer interrupt with the new tick count
pub type TickCallback = fn(ticks: u64);

/// PIT internal oscillator frequency
pub const PIT_FREQUENCY: u32 = 1_193_180;

/// Compute the clamped PIT divisor and resulting frequency for `hz`
///
/// Divisor = oscillator / hz, clamped into [1, 65535]; the returned
/// frequency is recomputed from the clamped divisor.
pub const fn pit_divisor(hz: u32) -> (u16, u32) {
    let requested = if hz == 0 { 1 } else { hz };
    let raw = PIT_FREQUENCY / requested;
    let divisor = if raw < 1 {
        1
    } else if raw > 65535 {
        65535
    } else {
        raw
    };
    (divisor as u16, PIT_FREQUENCY / divisor)
}

/// Timer operations
pub trait TimerOps: Send + Sync {
    /// Program the timer for `hz` interrupts per second
    ///
    /// Returns the actual frequency achieved (hardware divisors quantize the
    /// request).
    fn init(&self, hz: u32) -> KernelResult<u32>;

    /// Monotonic tick count since timer init
    fn ticks(&self) -> u64;

    /// The programmed frequency in Hz
    fn frequency(&self) -> u32;

    /// Milliseconds since timer init, derived from the tick count
    fn uptime_ms(&self) -> u64 {
        let hz = self.frequency().max(1) as u64;
        self.ticks() * 1000 / hz
    }
}

// =============================================================================
// Tick Callback
// =============================================================================

// Stored as a usize so the interrupt path can read it without locking.
static TICK_CALLBACK: AtomicUsize = AtomicUsize::new(0);

/// Attach the tick callback (the scheduler's tick entry)
pub fn set_tick_callback(callback: TickCallback) {
    TICK_CALLBACK.store(callback as usize, Ordering::Release);
}

/// Detach the tick callback
pub fn clear_tick_callback() {
    TICK_CALLBACK.store(0, Ordering::Release);
}

/// Invoke the attached callback, if any (backend timer-interrupt path)
pub fn fire_tick(ticks: u64) {
    let raw = TICK_CALLBACK.load(Ordering::Acquire);
    if raw != 0 {
        // Stored from a valid fn pointer above; never torn on a word store.
        let callback: TickCallback = unsafe { core::mem::transmute(raw) };
        callback(ticks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicU64;

    static LAST_TICK: AtomicU64 = AtomicU64::new(0);

    fn record(ticks: u64) {
        LAST_TICK.store(ticks, Ordering::SeqCst);
    }

    #[test]
    fn test_pit_divisor_math() {
        // 100 Hz: plain division, no clamping.
        let (div, actual) = pit_divisor(100);
        assert_eq!(div, 11931);
        assert_eq!(actual, PIT_FREQUENCY / 11931);

        // Very low request overflows the 16-bit divisor; clamp to 65535 and
        // recompute the real rate.
        let (div, actual) = pit_divisor(1);
        assert_eq!(div, 65535);
        assert_eq!(actual, PIT_FREQUENCY / 65535);

        // Requests above the oscillator clamp the divisor to 1.
        let (div, actual) = pit_divisor(2_000_000);
        assert_eq!(div, 1);
        assert_eq!(actual, PIT_FREQUENCY);

        // Zero is treated as the slowest request rather than dividing by it.
        assert_eq!(pit_divisor(0).0, 65535);
    }

    #[test]
    fn test_tick_callback_fires_and_clears() {
        set_tick_callback(record);
        fire_tick(41);
        assert_eq!(LAST_TICK.load(Ordering::SeqCst), 41);

        clear_tick_callback();
        fire_tick(99);
        assert_eq!(LAST_TICK.load(Ordering::SeqCst), 41);
    }
}
