//! # Virtual Filesystem Switch
//!
//! Routes path-keyed operations to the backing filesystem whose mount point
//! is the longest prefix of the target path, and manages the single-process
//! file-descriptor table. Descriptors 0/1/2 are wired to the console and
//! keyboard through installable hooks; user descriptors start at 3 and are
//! allocated monotonically.

use arrayvec::ArrayVec;

use atlas_core::{KernelError, KernelResult};

use crate::{
    FileStat, FileSystem, Handle, OpenFlags, SeekWhence, FIRST_USER_FD, MAX_FILESYSTEMS,
    MAX_MOUNTS, MAX_OPEN_FILES, MAX_PATH_LEN,
};

/// Hook reading one line from the interactive input (fd 0)
pub type StdinRead = fn(&mut [u8]) -> usize;

/// Hook writing console text (fds 1 and 2)
pub type StdoutWrite = fn(&[u8]);

/// One mount-table entry
struct Mount {
    path: heapless::String<MAX_PATH_LEN>,
    fs_index: usize,
    flags: u32,
}

/// One open file
#[derive(Clone, Copy)]
struct OpenFile {
    fd: i32,
    fs_index: usize,
    handle: Handle,
    offset: u64,
    flags: OpenFlags,
}

/// Table counters for diagnostics
#[derive(Debug, Clone, Copy, Default)]
pub struct VfsStats {
    /// Registered filesystem types
    pub filesystems: usize,
    /// Active mounts
    pub mounts: usize,
    /// Open files
    pub open_files: usize,
}

/// The VFS state: registration, mount, and descriptor tables
pub struct Vfs {
    filesystems: ArrayVec<&'static dyn FileSystem, MAX_FILESYSTEMS>,
    mounts: ArrayVec<Mount, MAX_MOUNTS>,
    files: [Option<OpenFile>; MAX_OPEN_FILES],
    next_fd: i32,
    stdin_read: Option<StdinRead>,
    stdout_write: Option<StdoutWrite>,
}

impl Vfs {
    /// Create an empty VFS
    pub const fn new() -> Self {
        Self {
            filesystems: ArrayVec::new_const(),
            mounts: ArrayVec::new_const(),
            files: [None; MAX_OPEN_FILES],
            next_fd: FIRST_USER_FD,
            stdin_read: None,
            stdout_write: None,
        }
    }

    /// Install the stdio hooks used by descriptors 0/1/2
    pub fn set_stdio(&mut self, stdin: StdinRead, stdout: StdoutWrite) {
        self.stdin_read = Some(stdin);
        self.stdout_write = Some(stdout);
    }

    // -------------------------------------------------------------------------
    // Registration and mounting
    // -------------------------------------------------------------------------

    /// Register a filesystem type
    ///
    /// Names are unique; the table holds at most [`MAX_FILESYSTEMS`] entries.
    pub fn register(&mut self, fs: &'static dyn FileSystem) -> KernelResult<()> {
        if self.filesystems.iter().any(|f| f.name() == fs.name()) {
            return Err(KernelError::InvalidParameter);
        }
        self.filesystems
            .try_push(fs)
            .map_err(|_| KernelError::ResourceExhausted)?;
        log::info!("vfs: registered filesystem '{}'", fs.name());
        Ok(())
    }

    fn find_fstype(&self, name: &str) -> Option<usize> {
        self.filesystems.iter().position(|f| f.name() == name)
    }

    /// Mount `fstype` at `mount_point`
    pub fn mount(
        &mut self,
        device: Option<&str>,
        mount_point: &str,
        fstype: &str,
        flags: u32,
    ) -> KernelResult<()> {
        if !mount_point.starts_with('/') || mount_point.len() > MAX_PATH_LEN {
            return Err(KernelError::InvalidParameter);
        }
        if self.mounts.iter().any(|m| m.path.as_str() == mount_point) {
            return Err(KernelError::InvalidState);
        }
        let fs_index = self.find_fstype(fstype).ok_or(KernelError::DeviceNotFound)?;
        if self.mounts.is_full() {
            return Err(KernelError::ResourceExhausted);
        }

        self.filesystems[fs_index].mount(device, flags)?;

        let mut path = heapless::String::new();
        let _ = path.push_str(mount_point);
        self.mounts.push(Mount {
            path,
            fs_index,
            flags,
        });

        if mount_point == "/" {
            log::info!("vfs: '{}' mounted as root", fstype);
        } else {
            log::info!("vfs: '{}' mounted at {}", fstype, mount_point);
        }
        Ok(())
    }

    /// Unmount the filesystem at `mount_point`
    pub fn unmount(&mut self, mount_point: &str) -> KernelResult<()> {
        let index = self
            .mounts
            .iter()
            .position(|m| m.path.as_str() == mount_point)
            .ok_or(KernelError::DeviceNotFound)?;
        let fs_index = self.mounts[index].fs_index;
        self.filesystems[fs_index].unmount()?;
        self.mounts.remove(index);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Path resolution
    // -------------------------------------------------------------------------

    /// Resolve `path` to its mount: longest matching prefix wins
    ///
    /// Returns the filesystem index and the path relative to the mount
    /// point (always starting with '/').
    pub fn resolve<'p>(&self, path: &'p str) -> KernelResult<(usize, &'p str)> {
        if !path.starts_with('/') {
            return Err(KernelError::InvalidParameter);
        }

        let mut best: Option<(usize, usize)> = None; // (mount idx, prefix len)
        for (index, mount) in self.mounts.iter().enumerate() {
            let mp = mount.path.as_str();
            let matches = if mp == "/" {
                true
            } else {
                path == mp || (path.starts_with(mp) && path.as_bytes()[mp.len()] == b'/')
            };
            if matches && best.map_or(true, |(_, len)| mp.len() > len) {
                best = Some((index, mp.len()));
            }
        }

        let (index, len) = best.ok_or(KernelError::DeviceNotFound)?;
        let rel = match &path[if len == 1 { 0 } else { len }..] {
            "" => "/",
            rel => rel,
        };
        Ok((self.mounts[index].fs_index, rel))
    }

    fn fs(&self, fs_index: usize) -> &'static dyn FileSystem {
        self.filesystems[fs_index]
    }

    // -------------------------------------------------------------------------
    // Descriptor operations
    // -------------------------------------------------------------------------

    fn slot_of(&self, fd: i32) -> KernelResult<usize> {
        self.files
            .iter()
            .position(|f| f.map_or(false, |f| f.fd == fd))
            .ok_or(KernelError::InvalidHandle)
    }

    /// Open `path`, returning a new descriptor
    pub fn open(&mut self, path: &str, flags: OpenFlags) -> KernelResult<i32> {
        let (fs_index, rel) = self.resolve(path)?;
        let slot = self
            .files
            .iter()
            .position(Option::is_none)
            .ok_or(KernelError::ResourceExhausted)?;

        // The fd is released (never committed) if the backend open fails.
        let fd = self.next_fd;
        let handle = self.fs(fs_index).open(rel, flags)?;

        let offset = if flags.contains(OpenFlags::APPEND) {
            self.fs(fs_index).stat(rel).map(|s| s.size).unwrap_or(0)
        } else {
            0
        };

        self.files[slot] = Some(OpenFile {
            fd,
            fs_index,
            handle,
            offset,
            flags,
        });
        self.next_fd += 1;
        Ok(fd)
    }

    /// Read from `fd` at the current offset
    ///
    /// Descriptor 0 reads a line through the stdin hook; 1 and 2 are not
    /// readable.
    pub fn read(&mut self, fd: i32, buf: &mut [u8]) -> KernelResult<usize> {
        match fd {
            0 => {
                let hook = self.stdin_read.ok_or(KernelError::NotInitialized)?;
                return Ok(hook(buf));
            }
            1 | 2 => return Err(KernelError::AccessDenied),
            _ => {}
        }

        let slot = self.slot_of(fd)?;
        let mut file = self.files[slot].ok_or(KernelError::InvalidHandle)?;
        if !file.flags.readable() {
            return Err(KernelError::AccessDenied);
        }
        let count = self.fs(file.fs_index).read(file.handle, file.offset, buf)?;
        file.offset += count as u64;
        self.files[slot] = Some(file);
        Ok(count)
    }

    /// Write to `fd` at the current offset
    ///
    /// Descriptors 1 and 2 write console text through the stdout hook.
    pub fn write(&mut self, fd: i32, buf: &[u8]) -> KernelResult<usize> {
        match fd {
            0 => return Err(KernelError::AccessDenied),
            1 | 2 => {
                let hook = self.stdout_write.ok_or(KernelError::NotInitialized)?;
                hook(buf);
                return Ok(buf.len());
            }
            _ => {}
        }

        let slot = self.slot_of(fd)?;
        let mut file = self.files[slot].ok_or(KernelError::InvalidHandle)?;
        if !file.flags.writable() {
            return Err(KernelError::AccessDenied);
        }
        let count = self.fs(file.fs_index).write(file.handle, file.offset, buf)?;
        file.offset += count as u64;
        self.files[slot] = Some(file);
        Ok(count)
    }

    /// Reposition the offset of `fd`
    pub fn lseek(&mut self, fd: i32, offset: i64, whence: SeekWhence) -> KernelResult<u64> {
        if fd < FIRST_USER_FD {
            return Err(KernelError::InvalidHandle);
        }
        let slot = self.slot_of(fd)?;
        let mut file = self.files[slot].ok_or(KernelError::InvalidHandle)?;

        let new_offset = match self
            .fs(file.fs_index)
            .lseek(file.handle, offset, whence, file.offset)
        {
            Err(KernelError::NotSupported) => match whence {
                SeekWhence::Set if offset >= 0 => offset as u64,
                SeekWhence::Cur => {
                    let target = file.offset as i64 + offset;
                    if target < 0 {
                        return Err(KernelError::SeekFailure);
                    }
                    target as u64
                }
                // END needs the backend's size knowledge.
                SeekWhence::End => return Err(KernelError::NotSupported),
                _ => return Err(KernelError::SeekFailure),
            },
            other => other?,
        };

        file.offset = new_offset;
        self.files[slot] = Some(file);
        Ok(new_offset)
    }

    /// Close `fd`
    pub fn close(&mut self, fd: i32) -> KernelResult<()> {
        if fd < FIRST_USER_FD {
            return Err(KernelError::InvalidHandle);
        }
        let slot = self.slot_of(fd)?;
        let file = self.files[slot].ok_or(KernelError::InvalidHandle)?;
        self.fs(file.fs_index).close(file.handle)?;
        self.files[slot] = None;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Path operations
    // -------------------------------------------------------------------------

    /// Create a directory
    pub fn mkdir(&mut self, path: &str) -> KernelResult<()> {
        let (fs_index, rel) = self.resolve(path)?;
        self.fs(fs_index).mkdir(rel)
    }

    /// Remove a directory
    pub fn rmdir(&mut self, path: &str) -> KernelResult<()> {
        let (fs_index, rel) = self.resolve(path)?;
        self.fs(fs_index).rmdir(rel)
    }

    /// Remove a file
    pub fn unlink(&mut self, path: &str) -> KernelResult<()> {
        let (fs_index, rel) = self.resolve(path)?;
        self.fs(fs_index).unlink(rel)
    }

    /// Query file metadata
    pub fn stat(&self, path: &str) -> KernelResult<FileStat> {
        let (fs_index, rel) = self.resolve(path)?;
        self.fs(fs_index).stat(rel)
    }

    /// Table counters
    pub fn stats(&self) -> VfsStats {
        VfsStats {
            filesystems: self.filesystems.len(),
            mounts: self.mounts.len(),
            open_files: self.files.iter().filter(|f| f.is_some()).count(),
        }
    }
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Global VFS
// =============================================================================

static VFS: spin::Mutex<Vfs> = spin::Mutex::new(Vfs::new());

/// Run `f` against the global VFS
pub fn with_vfs<R>(f: impl FnOnce(&mut Vfs) -> R) -> R {
    f(&mut VFS.lock())
}

/// Register a filesystem with the global VFS
pub fn register(fs: &'static dyn FileSystem) -> KernelResult<()> {
    VFS.lock().register(fs)
}

/// Mount on the global VFS
pub fn mount(
    device: Option<&str>,
    mount_point: &str,
    fstype: &str,
    flags: u32,
) -> KernelResult<()> {
    VFS.lock().mount(device, mount_point, fstype, flags)
}

/// Install the global stdio hooks
pub fn set_stdio(stdin: StdinRead, stdout: StdoutWrite) {
    VFS.lock().set_stdio(stdin, stdout);
}

/// Open a file on the global VFS
pub fn open(path: &str, flags: OpenFlags) -> KernelResult<i32> {
    VFS.lock().open(path, flags)
}

/// Read from a global-VFS descriptor
pub fn read(fd: i32, buf: &mut [u8]) -> KernelResult<usize> {
    VFS.lock().read(fd, buf)
}

/// Write to a global-VFS descriptor
pub fn write(fd: i32, buf: &[u8]) -> KernelResult<usize> {
    VFS.lock().write(fd, buf)
}

/// Seek a global-VFS descriptor
pub fn lseek(fd: i32, offset: i64, whence: SeekWhence) -> KernelResult<u64> {
    VFS.lock().lseek(fd, offset, whence)
}

/// Close a global-VFS descriptor
pub fn close(fd: i32) -> KernelResult<()> {
    VFS.lock().close(fd)
}
