//! # Kernel Logger
//!
//! The `log` facade sink: every record goes to COM1 and, once the console
//! is up, to the VGA text screen. The max level defaults to `Info` and can
//! be raised at runtime.

use core::fmt::Write;

use log::{LevelFilter, Metadata, Record};

use atlas_drivers::{console, serial};

struct KernelLog;

static LOGGER: KernelLog = KernelLog;

/// Bounded line buffer for one formatted record
struct LineBuffer {
    bytes: [u8; 256],
    len: usize,
}

impl LineBuffer {
    const fn new() -> Self {
        Self {
            bytes: [0; 256],
            len: 0,
        }
    }

    fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

impl Write for LineBuffer {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for &byte in s.as_bytes() {
            if self.len >= self.bytes.len() {
                break;
            }
            self.bytes[self.len] = byte;
            self.len += 1;
        }
        Ok(())
    }
}

impl log::Log for KernelLog {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mut line = LineBuffer::new();
        let _ = write!(
            line,
            "[{:5}] {}: {}\n",
            record.level(),
            record.target(),
            record.args()
        );

        // Serial is best-effort; a dead or absent UART must not wedge logging.
        if let Ok(port) = serial::Serial::com(0) {
            let _ = port.write(line.as_bytes());
        }
        console::write(line.as_bytes());
    }

    fn flush(&self) {}
}

/// Install the kernel logger at `Info` level
pub fn init() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Info);
    }
}

/// Adjust the maximum level at runtime
#[allow(dead_code)]
pub fn set_level(level: LevelFilter) {
    log::set_max_level(level);
}
