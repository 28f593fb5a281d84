//! # PS/2 Keyboard Driver
//!
//! Owns IRQ 1. The interrupt handler reads one scancode from the
//! controller, tracks modifier state, translates set-1 make codes to ASCII
//! through the two 59-entry tables, and enqueues a [`KeyEvent`] on the
//! bounded ring. Consumers poll with [`get_event`] / [`check_key`] or block
//! with [`wait_for_key`] / [`gets`].

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use atlas_core::KernelResult;

use crate::console;
use crate::ring::EventRing;

/// PS/2 controller data port
pub const DATA_PORT: u16 = 0x60;

/// PS/2 controller status port
pub const STATUS_PORT: u16 = 0x64;

/// Status bit: output buffer full
const STATUS_OUTPUT_FULL: u8 = 0x01;

/// High bit of a scancode marks a key release
const RELEASE_FLAG: u8 = 0x80;

/// Number of translated make codes (0x00..=0x3A)
pub const SCANCODE_TABLE_LEN: usize = 59;

// Modifier make codes
const SC_LSHIFT: u8 = 0x2A;
const SC_RSHIFT: u8 = 0x36;
const SC_CTRL: u8 = 0x1D;
const SC_ALT: u8 = 0x38;

/// Set-1 make code to ASCII, unshifted. Zero means non-printable.
#[rustfmt::skip]
pub const SCANCODE_TO_ASCII: [u8; SCANCODE_TABLE_LEN] = [
    0, 27, b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8',       // 0x00-0x09
    b'9', b'0', b'-', b'=', 8, b'\t', b'q', b'w', b'e', b'r',    // 0x0A-0x13
    b't', b'y', b'u', b'i', b'o', b'p', b'[', b']', b'\n', 0,    // 0x14-0x1D
    b'a', b's', b'd', b'f', b'g', b'h', b'j', b'k', b'l', b';',  // 0x1E-0x27
    b'\'', b'`', 0, b'\\', b'z', b'x', b'c', b'v', b'b', b'n',   // 0x28-0x31
    b'm', b',', b'.', b'/', 0, b'*', 0, b' ', 0,                 // 0x32-0x3A
];

/// Set-1 make code to ASCII with shift held. Zero means non-printable.
#[rustfmt::skip]
pub const SCANCODE_TO_ASCII_SHIFT: [u8; SCANCODE_TABLE_LEN] = [
    0, 27, b'!', b'@', b'#', b'$', b'%', b'^', b'&', b'*',       // 0x00-0x09
    b'(', b')', b'_', b'+', 8, b'\t', b'Q', b'W', b'E', b'R',    // 0x0A-0x13
    b'T', b'Y', b'U', b'I', b'O', b'P', b'{', b'}', b'\n', 0,    // 0x14-0x1D
    b'A', b'S', b'D', b'F', b'G', b'H', b'J', b'K', b'L', b':',  // 0x1E-0x27
    b'"', b'~', 0, b'|', b'Z', b'X', b'C', b'V', b'B', b'N',     // 0x28-0x31
    b'M', b'<', b'>', b'?', 0, b'*', 0, b' ', 0,                 // 0x32-0x3A
];

/// One decoded keyboard event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// Raw make code (release flag stripped)
    pub scancode: u8,
    /// Decoded ASCII, zero when non-printable
    pub ch: u8,
    /// Press (true) or release (false)
    pub pressed: bool,
    /// Shift held when the event fired
    pub shift: bool,
    /// Ctrl held when the event fired
    pub ctrl: bool,
    /// Alt held when the event fired
    pub alt: bool,
}

impl KeyEvent {
    const FLAG_PRESSED: u64 = 1 << 16;
    const FLAG_SHIFT: u64 = 1 << 17;
    const FLAG_CTRL: u64 = 1 << 18;
    const FLAG_ALT: u64 = 1 << 19;

    /// Pack into one word for an atomic ring slot
    pub(crate) fn pack(self) -> u64 {
        let mut word = u64::from(self.scancode) | (u64::from(self.ch) << 8);
        if self.pressed {
            word |= Self::FLAG_PRESSED;
        }
        if self.shift {
            word |= Self::FLAG_SHIFT;
        }
        if self.ctrl {
            word |= Self::FLAG_CTRL;
        }
        if self.alt {
            word |= Self::FLAG_ALT;
        }
        word
    }

    /// Unpack a word stored by [`pack`](Self::pack)
    pub(crate) fn unpack(word: u64) -> Self {
        Self {
            scancode: (word & 0xFF) as u8,
            ch: ((word >> 8) & 0xFF) as u8,
            pressed: word & Self::FLAG_PRESSED != 0,
            shift: word & Self::FLAG_SHIFT != 0,
            ctrl: word & Self::FLAG_CTRL != 0,
            alt: word & Self::FLAG_ALT != 0,
        }
    }

    /// Whether this event carries a printable ASCII character
    pub fn is_printable(&self) -> bool {
        (0x20..=0x7E).contains(&self.ch) || self.ch == b'\n' || self.ch == b'\t'
    }
}

/// Driver statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyboardStats {
    /// Key-press events seen
    pub presses: u64,
    /// Key-release events seen
    pub releases: u64,
    /// Events dropped on ring overflow
    pub dropped: u64,
}

/// Keyboard driver state: modifier flags, counters, and the event ring
///
/// Modifier flags are only written from the IRQ path, so plain atomics
/// suffice; the ring is SPSC by construction.
#[derive(Debug)]
pub struct Keyboard {
    ring: EventRing,
    shift_left: AtomicBool,
    shift_right: AtomicBool,
    ctrl: AtomicBool,
    alt: AtomicBool,
    presses: AtomicU64,
    releases: AtomicU64,
}

impl Keyboard {
    /// A fresh driver instance
    pub const fn new() -> Self {
        Self {
            ring: EventRing::new(),
            shift_left: AtomicBool::new(false),
            shift_right: AtomicBool::new(false),
            ctrl: AtomicBool::new(false),
            alt: AtomicBool::new(false),
            presses: AtomicU64::new(0),
            releases: AtomicU64::new(0),
        }
    }

    fn shift_held(&self) -> bool {
        self.shift_left.load(Ordering::Relaxed) || self.shift_right.load(Ordering::Relaxed)
    }

    /// Process one raw scancode byte (IRQ path and test entry)
    pub fn handle_scancode(&self, byte: u8) {
        let released = byte & RELEASE_FLAG != 0;
        let code = byte & !RELEASE_FLAG;

        match code {
            SC_LSHIFT => self.shift_left.store(!released, Ordering::Relaxed),
            SC_RSHIFT => self.shift_right.store(!released, Ordering::Relaxed),
            SC_CTRL => self.ctrl.store(!released, Ordering::Relaxed),
            SC_ALT => self.alt.store(!released, Ordering::Relaxed),
            _ => {}
        }

        let shift = self.shift_held();
        let ch = if (code as usize) < SCANCODE_TABLE_LEN {
            if shift {
                SCANCODE_TO_ASCII_SHIFT[code as usize]
            } else {
                SCANCODE_TO_ASCII[code as usize]
            }
        } else {
            0
        };

        if released {
            self.releases.fetch_add(1, Ordering::Relaxed);
        } else {
            self.presses.fetch_add(1, Ordering::Relaxed);
        }

        let event = KeyEvent {
            scancode: code,
            ch,
            pressed: !released,
            shift,
            ctrl: self.ctrl.load(Ordering::Relaxed),
            alt: self.alt.load(Ordering::Relaxed),
        };
        // Full ring: the new event is dropped and counted by the ring.
        let _ = self.ring.push(event);
    }

    /// Non-blocking dequeue
    pub fn get_event(&self) -> Option<KeyEvent> {
        self.ring.pop()
    }

    /// Whether an event is waiting
    pub fn check_key(&self) -> bool {
        !self.ring.is_empty()
    }

    /// Statistics snapshot
    pub fn stats(&self) -> KeyboardStats {
        KeyboardStats {
            presses: self.presses.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            dropped: self.ring.dropped(),
        }
    }
}

impl Default for Keyboard {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Global Driver
// =============================================================================

static KEYBOARD: Keyboard = Keyboard::new();

/// IRQ 1 handler: pull one scancode if the output buffer has one
fn keyboard_irq(_irq: u8) {
    let Ok(io) = atlas_hal::io() else { return };
    if io.inb(STATUS_PORT) & STATUS_OUTPUT_FULL == 0 {
        return;
    }
    KEYBOARD.handle_scancode(io.inb(DATA_PORT));
}

/// Register the IRQ 1 handler, unmask the line, and drain stale bytes
pub fn init() -> KernelResult<()> {
    let interrupt = atlas_hal::interrupt()?;
    let io = atlas_hal::io()?;

    // Drain anything the controller buffered before we were listening.
    let mut drained = 0;
    while io.inb(STATUS_PORT) & STATUS_OUTPUT_FULL != 0 && drained < 16 {
        let _ = io.inb(DATA_PORT);
        drained += 1;
    }

    interrupt.register_handler(1, keyboard_irq)?;
    interrupt.enable_irq(1)?;
    log::info!("keyboard: IRQ 1 armed ({} stale bytes drained)", drained);
    Ok(())
}

/// Non-blocking dequeue from the global driver
pub fn get_event() -> Option<KeyEvent> {
    KEYBOARD.get_event()
}

/// Whether the global driver has an event waiting
pub fn check_key() -> bool {
    KEYBOARD.check_key()
}

/// Global driver statistics
pub fn stats() -> KeyboardStats {
    KEYBOARD.stats()
}

/// Block (halting between polls) until a printable key is pressed
pub fn wait_for_key() -> u8 {
    loop {
        if let Some(event) = KEYBOARD.get_event() {
            if event.pressed && event.is_printable() {
                return event.ch;
            }
            continue;
        }
        if let Ok(cpu) = atlas_hal::cpu() {
            cpu.wait_for_interrupt();
        }
    }
}

/// Echoed line editor: reads printable characters until CR/LF
///
/// Backspace removes the last character. The line is NUL-terminated when
/// the buffer has room; the returned length excludes the terminator.
pub fn gets(buf: &mut [u8]) -> usize {
    if buf.is_empty() {
        return 0;
    }

    let mut len = 0;
    loop {
        let ch = wait_for_key();
        match ch {
            b'\n' => {
                console::write(b"\n");
                break;
            }
            8 => {
                if len > 0 {
                    len -= 1;
                    console::write(&[8]);
                }
            }
            ch if (0x20..=0x7E).contains(&ch) => {
                if len < buf.len() - 1 {
                    buf[len] = ch;
                    len += 1;
                    console::write(&[ch]);
                }
            }
            _ => {}
        }
    }

    if len < buf.len() {
        buf[len] = 0;
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_break_sequence_end_to_end() {
        let kbd = Keyboard::new();
        // make 'a', break 'a', make 'b', break 'b'
        for byte in [0x1Eu8, 0x9E, 0x30, 0xB0] {
            kbd.handle_scancode(byte);
        }

        let e1 = kbd.get_event().unwrap();
        assert!(e1.pressed);
        assert_eq!(e1.ch, b'a');

        let e2 = kbd.get_event().unwrap();
        assert!(!e2.pressed);
        assert_eq!(e2.ch, b'a');

        let e3 = kbd.get_event().unwrap();
        assert!(e3.pressed);
        assert_eq!(e3.ch, b'b');

        let e4 = kbd.get_event().unwrap();
        assert!(!e4.pressed);
        assert_eq!(e4.ch, b'b');

        assert!(kbd.get_event().is_none());
        let stats = kbd.stats();
        assert_eq!(stats.presses, 2);
        assert_eq!(stats.releases, 2);
    }

    #[test]
    fn test_shift_changes_translation() {
        let kbd = Keyboard::new();
        kbd.handle_scancode(0x1E); // 'a'
        kbd.handle_scancode(0x2A); // shift down
        kbd.handle_scancode(0x1E); // 'A'
        kbd.handle_scancode(0x02); // '!'
        kbd.handle_scancode(0xAA); // shift up
        kbd.handle_scancode(0x02); // '1'

        assert_eq!(kbd.get_event().unwrap().ch, b'a');
        let shift_press = kbd.get_event().unwrap();
        assert_eq!(shift_press.scancode, 0x2A);
        assert_eq!(shift_press.ch, 0);
        assert!(shift_press.shift);

        let upper = kbd.get_event().unwrap();
        assert_eq!(upper.ch, b'A');
        assert!(upper.shift);
        assert_eq!(kbd.get_event().unwrap().ch, b'!');

        let shift_release = kbd.get_event().unwrap();
        assert!(!shift_release.pressed);
        assert_eq!(kbd.get_event().unwrap().ch, b'1');
    }

    #[test]
    fn test_ctrl_alt_flags() {
        let kbd = Keyboard::new();
        kbd.handle_scancode(0x1D); // ctrl down
        kbd.handle_scancode(0x2E); // 'c'
        kbd.handle_scancode(0x9D); // ctrl up
        kbd.handle_scancode(0x38); // alt down
        kbd.handle_scancode(0x2E); // 'c'

        let _ctrl = kbd.get_event().unwrap();
        let ctrl_c = kbd.get_event().unwrap();
        assert_eq!(ctrl_c.ch, b'c');
        assert!(ctrl_c.ctrl);
        assert!(!ctrl_c.alt);

        let _up = kbd.get_event().unwrap();
        let _alt = kbd.get_event().unwrap();
        let alt_c = kbd.get_event().unwrap();
        assert!(alt_c.alt);
        assert!(!alt_c.ctrl);
    }

    #[test]
    fn test_non_printable_codes_translate_to_zero() {
        let kbd = Keyboard::new();
        kbd.handle_scancode(0x3B); // F1: past the table
        let event = kbd.get_event().unwrap();
        assert_eq!(event.scancode, 0x3B);
        assert_eq!(event.ch, 0);
        assert!(!event.is_printable());
    }

    #[test]
    fn test_overflow_counts_drops() {
        let kbd = Keyboard::new();
        for _ in 0..crate::ring::RING_CAPACITY {
            kbd.handle_scancode(0x1E);
        }
        // Ring full: the next event is dropped but still counted a press.
        kbd.handle_scancode(0x30);
        let stats = kbd.stats();
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.presses, crate::ring::RING_CAPACITY as u64 + 1);

        // Every surviving event is the earlier 'a', in order.
        let mut count = 0;
        while let Some(event) = kbd.get_event() {
            assert_eq!(event.ch, b'a');
            count += 1;
        }
        assert_eq!(count, crate::ring::RING_CAPACITY);
    }

    #[test]
    fn test_tables_are_59_entries() {
        assert_eq!(SCANCODE_TO_ASCII.len(), SCANCODE_TABLE_LEN);
        assert_eq!(SCANCODE_TO_ASCII_SHIFT.len(), SCANCODE_TABLE_LEN);
        // Spot checks at the table edges.
        assert_eq!(SCANCODE_TO_ASCII[0x39], b' ');
        assert_eq!(SCANCODE_TO_ASCII[0x1C], b'\n');
        assert_eq!(SCANCODE_TO_ASCII_SHIFT[0x35], b'?');
        assert_eq!(SCANCODE_TO_ASCII[0x3A], 0); // caps lock
    }
}
