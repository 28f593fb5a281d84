//! # VGA Text Console
//!
//! The 80x25 text-mode framebuffer at 0xB8000. Each cell is a character
//! byte plus an attribute byte: foreground color in the low nibble,
//! background in the high nibble.
//!
//! The writer targets an injectable cell buffer so the rendering logic
//! (cursor advance, newline, scroll) runs against plain memory in host
//! tests.

use atlas_hal::IrqMutex;

/// Console width in cells
pub const WIDTH: usize = 80;

/// Console height in cells
pub const HEIGHT: usize = 25;

/// Physical address of the VGA text framebuffer
pub const VGA_BUFFER_ADDR: usize = 0xB8000;

/// The 16 VGA colors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Color {
    Black = 0,
    Blue = 1,
    Green = 2,
    Cyan = 3,
    Red = 4,
    Magenta = 5,
    Brown = 6,
    LightGrey = 7,
    DarkGrey = 8,
    LightBlue = 9,
    LightGreen = 10,
    LightCyan = 11,
    LightRed = 12,
    Pink = 13,
    Yellow = 14,
    White = 15,
}

/// Pack foreground and background into one attribute byte
pub const fn attribute(fg: Color, bg: Color) -> u8 {
    (fg as u8) | ((bg as u8) << 4)
}

/// A text console over a cell buffer
pub struct TextConsole {
    buf: *mut u16,
    col: usize,
    row: usize,
    attr: u8,
}

// The buffer pointer is only touched under the console lock.
unsafe impl Send for TextConsole {}

impl TextConsole {
    /// Create a console over `buf`, which must hold WIDTH*HEIGHT cells
    ///
    /// # Safety
    ///
    /// `buf` must stay valid and exclusively owned by this console.
    pub const unsafe fn with_buffer(buf: *mut u16) -> Self {
        Self {
            buf,
            col: 0,
            row: 0,
            attr: attribute(Color::LightGrey, Color::Black),
        }
    }

    /// Set the attribute used for subsequent output
    pub fn set_color(&mut self, fg: Color, bg: Color) {
        self.attr = attribute(fg, bg);
    }

    fn put_cell(&mut self, col: usize, row: usize, ch: u8) {
        let value = u16::from(ch) | (u16::from(self.attr) << 8);
        unsafe {
            self.buf.add(row * WIDTH + col).write_volatile(value);
        }
    }

    fn read_cell(&self, col: usize, row: usize) -> u16 {
        unsafe { self.buf.add(row * WIDTH + col).read_volatile() }
    }

    /// Blank the screen and home the cursor
    pub fn clear(&mut self) {
        for row in 0..HEIGHT {
            for col in 0..WIDTH {
                self.put_cell(col, row, b' ');
            }
        }
        self.col = 0;
        self.row = 0;
    }

    /// Write one character, interpreting newline, carriage return, and
    /// backspace
    pub fn put_char(&mut self, ch: u8) {
        match ch {
            b'\n' => {
                self.col = 0;
                self.advance_row();
            }
            b'\r' => self.col = 0,
            0x08 => {
                if self.col > 0 {
                    self.col -= 1;
                    self.put_cell(self.col, self.row, b' ');
                }
            }
            ch => {
                self.put_cell(self.col, self.row, ch);
                self.col += 1;
                if self.col >= WIDTH {
                    self.col = 0;
                    self.advance_row();
                }
            }
        }
    }

    fn advance_row(&mut self) {
        self.row += 1;
        if self.row >= HEIGHT {
            self.scroll_up();
            self.row = HEIGHT - 1;
        }
    }

    /// Scroll everything up one line, blanking the last row
    fn scroll_up(&mut self) {
        for row in 1..HEIGHT {
            for col in 0..WIDTH {
                let cell = self.read_cell(col, row);
                unsafe {
                    self.buf.add((row - 1) * WIDTH + col).write_volatile(cell);
                }
            }
        }
        for col in 0..WIDTH {
            self.put_cell(col, HEIGHT - 1, b' ');
        }
    }

    /// Write a string
    pub fn write_str(&mut self, s: &str) {
        for byte in s.bytes() {
            self.put_char(byte);
        }
    }

    /// Write raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.put_char(byte);
        }
    }

    /// Current cursor position (column, row)
    pub fn cursor(&self) -> (usize, usize) {
        (self.col, self.row)
    }
}

// =============================================================================
// Global Console
// =============================================================================

static CONSOLE: IrqMutex<Option<TextConsole>> = IrqMutex::new(None);

/// Install the global console over the VGA framebuffer and clear it
#[cfg(target_arch = "x86")]
pub fn init() {
    let mut console = unsafe { TextConsole::with_buffer(VGA_BUFFER_ADDR as *mut u16) };
    console.clear();
    *CONSOLE.lock() = Some(console);
    log::info!("console: VGA text mode {}x{}", WIDTH, HEIGHT);
}

/// Install the global console over a caller-provided buffer
///
/// # Safety
///
/// Same contract as [`TextConsole::with_buffer`].
pub unsafe fn init_with_buffer(buf: *mut u16) {
    let mut console = unsafe { TextConsole::with_buffer(buf) };
    console.clear();
    *CONSOLE.lock() = Some(console);
}

/// Write bytes to the global console, if installed
pub fn write(bytes: &[u8]) {
    if let Some(console) = CONSOLE.lock().as_mut() {
        console.write_bytes(bytes);
    }
}

/// Write a string to the global console, if installed
pub fn write_text(s: &str) {
    write(s.as_bytes());
}
