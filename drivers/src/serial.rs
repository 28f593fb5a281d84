//! # 8250 Serial Driver
//!
//! COM1..COM4 with the standard 8250 register layout. The baud divisor is
//! programmed through the DLAB-switched divisor latch; writes poll the line
//! status register under an explicit timeout counter.

use atlas_core::{KernelError, KernelResult};

/// Reference clock divided by the divisor gives the baud rate
pub const BAUD_CLOCK: u32 = 115_200;

/// Default baud rate
pub const DEFAULT_BAUD: u32 = 38_400;

/// Polls of the line status register before a write times out
pub const WRITE_TIMEOUT: u32 = 100_000;

/// Register offsets from the port base
mod reg {
    /// Data / divisor low (DLAB)
    pub const DATA: u16 = 0;
    /// Interrupt enable / divisor high (DLAB)
    pub const IER: u16 = 1;
    /// FIFO control
    pub const FCR: u16 = 2;
    /// Line control
    pub const LCR: u16 = 3;
    /// Modem control
    pub const MCR: u16 = 4;
    /// Line status
    pub const LSR: u16 = 5;
}

/// Line status bits
mod lsr {
    /// Receive data ready
    pub const DATA_READY: u8 = 0x01;
    /// Transmit holding register empty
    pub const THR_EMPTY: u8 = 0x20;
}

/// LCR bit enabling divisor latch access
const LCR_DLAB: u8 = 0x80;
/// LCR value for 8 data bits, no parity, one stop bit
const LCR_8N1: u8 = 0x03;

/// The four legacy COM port bases
pub const COM_BASES: [u16; 4] = [0x3F8, 0x2F8, 0x3E8, 0x2E8];

/// Compute the DLAB divisor for `baud`
pub const fn divisor_for(baud: u32) -> u16 {
    let baud = if baud == 0 { DEFAULT_BAUD } else { baud };
    let div = BAUD_CLOCK / baud;
    if div == 0 {
        1
    } else if div > u16::MAX as u32 {
        u16::MAX
    } else {
        div as u16
    }
}

/// One serial port
#[derive(Debug, Clone, Copy)]
pub struct Serial {
    base: u16,
}

impl Serial {
    /// Port for COM minor `minor` (0 = COM1)
    pub fn com(minor: usize) -> KernelResult<Self> {
        let base = *COM_BASES.get(minor).ok_or(KernelError::DeviceNotFound)?;
        Ok(Self { base })
    }

    /// Program the line: `baud`, 8N1, FIFO on
    pub fn init(&self, baud: u32) -> KernelResult<()> {
        let io = atlas_hal::io()?;
        let divisor = divisor_for(baud);

        io.outb(self.base + reg::IER, 0x00); // interrupts off, polled mode
        io.outb(self.base + reg::LCR, LCR_DLAB);
        io.outb(self.base + reg::DATA, divisor as u8);
        io.outb(self.base + reg::IER, (divisor >> 8) as u8);
        io.outb(self.base + reg::LCR, LCR_8N1);
        io.outb(self.base + reg::FCR, 0xC7); // FIFO on, cleared, 14-byte trigger
        io.outb(self.base + reg::MCR, 0x0B); // DTR | RTS | OUT2

        log::info!(
            "serial: port {:#x} at {} baud (divisor {})",
            self.base,
            BAUD_CLOCK / u32::from(divisor),
            divisor
        );
        Ok(())
    }

    /// Write one byte, polling under the timeout counter
    pub fn write_byte(&self, byte: u8) -> KernelResult<()> {
        let io = atlas_hal::io()?;
        let mut spins = 0u32;
        while io.inb(self.base + reg::LSR) & lsr::THR_EMPTY == 0 {
            spins += 1;
            if spins >= WRITE_TIMEOUT {
                return Err(KernelError::Timeout);
            }
        }
        io.outb(self.base + reg::DATA, byte);
        Ok(())
    }

    /// Write a whole buffer
    pub fn write(&self, bytes: &[u8]) -> KernelResult<usize> {
        for (index, &byte) in bytes.iter().enumerate() {
            if let Err(err) = self.write_byte(byte) {
                if index > 0 {
                    return Ok(index);
                }
                return Err(err);
            }
        }
        Ok(bytes.len())
    }

    /// Non-blocking read of one byte
    pub fn read_byte(&self) -> KernelResult<Option<u8>> {
        let io = atlas_hal::io()?;
        if io.inb(self.base + reg::LSR) & lsr::DATA_READY == 0 {
            return Ok(None);
        }
        Ok(Some(io.inb(self.base + reg::DATA)))
    }

    /// Drain available bytes into `buf`, returning the count
    pub fn read(&self, buf: &mut [u8]) -> KernelResult<usize> {
        let mut count = 0;
        while count < buf.len() {
            match self.read_byte()? {
                Some(byte) => {
                    buf[count] = byte;
                    count += 1;
                }
                None => break,
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_divisor_math() {
        assert_eq!(divisor_for(115_200), 1);
        assert_eq!(divisor_for(38_400), 3);
        assert_eq!(divisor_for(9_600), 12);
        // Zero falls back to the default baud.
        assert_eq!(divisor_for(0), 3);
        // Absurdly slow rates clamp at the 16-bit latch.
        assert_eq!(divisor_for(1), u16::MAX);
    }

    #[test]
    fn test_com_minor_mapping() {
        assert_eq!(Serial::com(0).unwrap().base, 0x3F8);
        assert_eq!(Serial::com(1).unwrap().base, 0x2F8);
        assert_eq!(Serial::com(2).unwrap().base, 0x3E8);
        assert_eq!(Serial::com(3).unwrap().base, 0x2E8);
        assert_eq!(Serial::com(4).err(), Some(KernelError::DeviceNotFound));
    }

    #[test]
    fn test_ops_require_initialized_hal() {
        // Without an installed capability set, every port touch fails
        // uniformly rather than reaching for hardware.
        if !atlas_hal::is_initialized() {
            let port = Serial::com(0).unwrap();
            assert_eq!(port.write_byte(b'x').err(), Some(KernelError::NotInitialized));
        }
    }
}
