//! # Atlas Filesystem Layer
//!
//! The virtual filesystem switch and the RAM-backed filesystem.
//!
//! Backends implement the [`FileSystem`] trait and register by name; the
//! VFS owns the mount table, the file-descriptor table, and path routing
//! (longest matching mount prefix). Per-open state on the backend side is
//! an opaque [`Handle`] index, never a pointer.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod ramfs;
pub mod vfs;

pub use ramfs::RamFs;
pub use vfs::{Vfs, VfsStats};

use atlas_core::{KernelError, KernelResult};
use bitflags::bitflags;

/// Maximum registered filesystem types
pub const MAX_FILESYSTEMS: usize = 8;

/// Maximum simultaneous mounts
pub const MAX_MOUNTS: usize = 16;

/// Maximum simultaneously open files
pub const MAX_OPEN_FILES: usize = 32;

/// First file descriptor handed to callers (0/1/2 are stdio)
pub const FIRST_USER_FD: i32 = 3;

/// Maximum mount-point path length
pub const MAX_PATH_LEN: usize = 64;

/// Per-open backend handle (an index, never a pointer)
pub type Handle = u32;

bitflags! {
    /// Open flags (POSIX-shaped)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        /// Open for writing only
        const WRONLY = 0x01;
        /// Open for reading and writing
        const RDWR = 0x02;
        /// Create the file if it does not exist
        const CREAT = 0x04;
        /// Start writing at end of file
        const APPEND = 0x08;
        /// Truncate to zero length on open
        const TRUNC = 0x10;
    }
}

impl OpenFlags {
    /// Read-only open (the zero flag word)
    pub const RDONLY: Self = Self::empty();

    /// Whether reads are permitted
    pub fn readable(self) -> bool {
        !self.contains(Self::WRONLY)
    }

    /// Whether writes are permitted
    pub fn writable(self) -> bool {
        self.intersects(Self::WRONLY | Self::RDWR)
    }
}

/// Seek origins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SeekWhence {
    /// From the start of the file
    Set = 0,
    /// From the current offset
    Cur = 1,
    /// From the end of the file
    End = 2,
}

/// File types the kernel distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// Regular data file
    Regular,
    /// Directory (type tag only in RAMFS)
    Directory,
    /// Device node
    Device,
}

/// Result of a `stat` call
#[derive(Debug, Clone, Copy)]
pub struct FileStat {
    /// File size in bytes
    pub size: u64,
    /// File type
    pub ftype: FileType,
    /// Tick the file was created at
    pub created_at: u64,
    /// Tick the file was last modified at
    pub modified_at: u64,
}

/// Operations a backing filesystem provides to the VFS
///
/// Backends keep their own state behind interior mutability; every method
/// takes `&self` so registered descriptors can be shared statics.
pub trait FileSystem: Send + Sync {
    /// Unique filesystem type name
    fn name(&self) -> &'static str;

    /// Mount hook; `device` is backend-specific and may be absent
    fn mount(&self, device: Option<&str>, flags: u32) -> KernelResult<()>;

    /// Unmount hook
    fn unmount(&self) -> KernelResult<()>;

    /// Open `path` (relative to the mount point), yielding a handle
    fn open(&self, path: &str, flags: OpenFlags) -> KernelResult<Handle>;

    /// Release a handle
    fn close(&self, handle: Handle) -> KernelResult<()>;

    /// Read at `offset` into `buf`, returning the byte count
    fn read(&self, handle: Handle, offset: u64, buf: &mut [u8]) -> KernelResult<usize>;

    /// Write `buf` at `offset`, returning the byte count
    fn write(&self, handle: Handle, offset: u64, buf: &[u8]) -> KernelResult<usize>;

    /// Backend seek; the VFS falls back to a generic SET/CUR update on
    /// `NotSupported`
    fn lseek(
        &self,
        _handle: Handle,
        _offset: i64,
        _whence: SeekWhence,
        _current: u64,
    ) -> KernelResult<u64> {
        Err(KernelError::NotSupported)
    }

    /// Create a directory
    fn mkdir(&self, _path: &str) -> KernelResult<()> {
        Err(KernelError::NotSupported)
    }

    /// Remove a directory
    fn rmdir(&self, _path: &str) -> KernelResult<()> {
        Err(KernelError::NotSupported)
    }

    /// Remove a file
    fn unlink(&self, _path: &str) -> KernelResult<()> {
        Err(KernelError::NotSupported)
    }

    /// Query file metadata
    fn stat(&self, path: &str) -> KernelResult<FileStat>;
}

/// Current tick count, zero when the HAL timer is not up yet
pub(crate) fn now_ticks() -> u64 {
    atlas_hal::timer().map(|t| t.ticks()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_flags_accessors() {
        assert!(OpenFlags::RDONLY.readable());
        assert!(!OpenFlags::RDONLY.writable());
        assert!(!OpenFlags::WRONLY.readable());
        assert!(OpenFlags::WRONLY.writable());
        assert!(OpenFlags::RDWR.readable());
        assert!(OpenFlags::RDWR.writable());
        assert!((OpenFlags::RDWR | OpenFlags::CREAT).writable());
    }

    #[test]
    fn test_flag_values_match_abi() {
        assert_eq!(OpenFlags::RDONLY.bits(), 0x00);
        assert_eq!(OpenFlags::WRONLY.bits(), 0x01);
        assert_eq!(OpenFlags::RDWR.bits(), 0x02);
        assert_eq!(OpenFlags::CREAT.bits(), 0x04);
        assert_eq!(OpenFlags::APPEND.bits(), 0x08);
        assert_eq!(OpenFlags::TRUNC.bits(), 0x10);
        assert_eq!(SeekWhence::Set as u32, 0);
        assert_eq!(SeekWhence::Cur as u32, 1);
        assert_eq!(SeekWhence::End as u32, 2);
    }
}
