//! # Debug Output Abstraction
//!
//! A last-resort character channel for the emergency halt path, plus the
//! optional backend self-test run at HAL init.

use atlas_core::KernelResult;

/// Debug output operations
pub trait DebugOps: Send + Sync {
    /// Emit one character on the debug channel
    fn putc(&self, c: u8);

    /// Emit a string on the debug channel
    fn write_str(&self, s: &str) {
        for byte in s.bytes() {
            self.putc(byte);
        }
    }

    /// Backend self-test; failure is logged by the HAL but never fatal
    fn self_test(&self) -> KernelResult<()> {
        Ok(())
    }
}
