//! # RAM Filesystem
//!
//! A fixed table of in-memory files. Each file owns at most one 64 KiB
//! buffer, allocated lazily from the kernel heap on first write and
//! returned on unlink. Directories are a type tag only; RAMFS keeps no
//! hierarchy beyond full path names.

use atlas_core::{KernelError, KernelResult};

use crate::{now_ticks, FileStat, FileSystem, FileType, Handle, OpenFlags, SeekWhence};

/// Maximum files in one RAMFS instance
pub const MAX_FILES: usize = 64;

/// Maximum bytes one file can hold
pub const MAX_FILE_SIZE: usize = 64 * 1024;

/// Maximum stored path length
pub const MAX_NAME_LEN: usize = 32;

#[derive(Debug, Clone)]
struct RamFile {
    in_use: bool,
    name: heapless::String<MAX_NAME_LEN>,
    ftype: FileType,
    size: usize,
    /// Heap address of the lazily allocated buffer; 0 = none yet
    buffer: usize,
    created_at: u64,
    modified_at: u64,
}

impl RamFile {
    const fn empty() -> Self {
        Self {
            in_use: false,
            name: heapless::String::new(),
            ftype: FileType::Regular,
            size: 0,
            buffer: 0,
            created_at: 0,
            modified_at: 0,
        }
    }
}

struct RamFsState {
    files: [RamFile; MAX_FILES],
    mounted: bool,
}

/// RAM-backed filesystem
pub struct RamFs {
    fs_name: &'static str,
    state: spin::Mutex<RamFsState>,
}

impl RamFs {
    /// Create an empty RAMFS registering as "ramfs"
    pub const fn new() -> Self {
        Self::named("ramfs")
    }

    /// Create an empty RAMFS with a custom type name
    pub const fn named(fs_name: &'static str) -> Self {
        const EMPTY: RamFile = RamFile::empty();
        Self {
            fs_name,
            state: spin::Mutex::new(RamFsState {
                files: [EMPTY; MAX_FILES],
                mounted: false,
            }),
        }
    }
}

impl Default for RamFs {
    fn default() -> Self {
        Self::new()
    }
}

impl RamFsState {
    fn find(&self, path: &str) -> Option<usize> {
        self.files
            .iter()
            .position(|f| f.in_use && f.name.as_str() == path)
    }

    fn create(&mut self, path: &str, ftype: FileType) -> KernelResult<usize> {
        if path.len() > MAX_NAME_LEN {
            return Err(KernelError::InvalidParameter);
        }
        let slot = self
            .files
            .iter()
            .position(|f| !f.in_use)
            .ok_or(KernelError::ResourceExhausted)?;

        let file = &mut self.files[slot];
        file.in_use = true;
        file.name.clear();
        let _ = file.name.push_str(path);
        file.ftype = ftype;
        file.size = 0;
        file.buffer = 0;
        file.created_at = now_ticks();
        file.modified_at = file.created_at;
        Ok(slot)
    }

    fn file(&self, handle: Handle) -> KernelResult<&RamFile> {
        let file = self
            .files
            .get(handle as usize)
            .ok_or(KernelError::InvalidHandle)?;
        if !file.in_use {
            return Err(KernelError::InvalidHandle);
        }
        Ok(file)
    }

    fn file_mut(&mut self, handle: Handle) -> KernelResult<&mut RamFile> {
        let file = self
            .files
            .get_mut(handle as usize)
            .ok_or(KernelError::InvalidHandle)?;
        if !file.in_use {
            return Err(KernelError::InvalidHandle);
        }
        Ok(file)
    }
}

impl FileSystem for RamFs {
    fn name(&self) -> &'static str {
        self.fs_name
    }

    fn mount(&self, _device: Option<&str>, _flags: u32) -> KernelResult<()> {
        let mut state = self.state.lock();
        if state.mounted {
            return Err(KernelError::AlreadyInitialized);
        }
        state.mounted = true;
        Ok(())
    }

    fn unmount(&self) -> KernelResult<()> {
        let mut state = self.state.lock();
        if !state.mounted {
            return Err(KernelError::NotInitialized);
        }
        state.mounted = false;
        Ok(())
    }

    fn open(&self, path: &str, flags: OpenFlags) -> KernelResult<Handle> {
        let mut state = self.state.lock();
        let slot = match state.find(path) {
            Some(slot) => slot,
            None if flags.contains(OpenFlags::CREAT) => state.create(path, FileType::Regular)?,
            None => return Err(KernelError::DeviceNotFound),
        };

        let file = &mut state.files[slot];
        if file.ftype == FileType::Directory && flags.writable() {
            return Err(KernelError::AccessDenied);
        }
        if flags.contains(OpenFlags::TRUNC) && flags.writable() {
            file.size = 0;
            file.modified_at = now_ticks();
        }
        Ok(slot as Handle)
    }

    fn close(&self, handle: Handle) -> KernelResult<()> {
        // No per-open state beyond the handle; just validate it.
        self.state.lock().file(handle).map(|_| ())
    }

    fn read(&self, handle: Handle, offset: u64, buf: &mut [u8]) -> KernelResult<usize> {
        let state = self.state.lock();
        let file = state.file(handle)?;
        if file.ftype == FileType::Directory {
            return Err(KernelError::NotSupported);
        }

        let offset = offset as usize;
        if file.buffer == 0 || offset >= file.size {
            return Ok(0);
        }
        let count = buf.len().min(file.size - offset);
        unsafe {
            core::ptr::copy_nonoverlapping(
                (file.buffer + offset) as *const u8,
                buf.as_mut_ptr(),
                count,
            );
        }
        Ok(count)
    }

    fn write(&self, handle: Handle, offset: u64, buf: &[u8]) -> KernelResult<usize> {
        let mut state = self.state.lock();
        let file = state.file_mut(handle)?;
        if file.ftype == FileType::Directory {
            return Err(KernelError::NotSupported);
        }

        let offset = offset as usize;
        if offset >= MAX_FILE_SIZE {
            return Err(KernelError::InvalidSize);
        }
        if file.buffer == 0 {
            // Lazy buffer: one fixed-size zeroed allocation per file.
            file.buffer = atlas_memory::heap::kcalloc(1, MAX_FILE_SIZE)?;
        }

        let count = buf.len().min(MAX_FILE_SIZE - offset);
        unsafe {
            core::ptr::copy_nonoverlapping(
                buf.as_ptr(),
                (file.buffer + offset) as *mut u8,
                count,
            );
        }
        file.size = file.size.max(offset + count);
        file.modified_at = now_ticks();
        Ok(count)
    }

    fn lseek(
        &self,
        handle: Handle,
        offset: i64,
        whence: SeekWhence,
        current: u64,
    ) -> KernelResult<u64> {
        let state = self.state.lock();
        let file = state.file(handle)?;

        let base = match whence {
            SeekWhence::Set => 0,
            SeekWhence::Cur => current as i64,
            SeekWhence::End => file.size as i64,
        };
        let target = base + offset;
        if target < 0 {
            return Err(KernelError::SeekFailure);
        }
        Ok(target as u64)
    }

    fn mkdir(&self, path: &str) -> KernelResult<()> {
        let mut state = self.state.lock();
        if state.find(path).is_some() {
            return Err(KernelError::InvalidState);
        }
        state.create(path, FileType::Directory).map(|_| ())
    }

    fn rmdir(&self, path: &str) -> KernelResult<()> {
        let mut state = self.state.lock();
        let slot = state.find(path).ok_or(KernelError::DeviceNotFound)?;
        if state.files[slot].ftype != FileType::Directory {
            return Err(KernelError::InvalidParameter);
        }
        state.files[slot] = RamFile::empty();
        Ok(())
    }

    fn unlink(&self, path: &str) -> KernelResult<()> {
        let mut state = self.state.lock();
        let slot = state.find(path).ok_or(KernelError::DeviceNotFound)?;
        if state.files[slot].ftype == FileType::Directory {
            return Err(KernelError::InvalidParameter);
        }

        let buffer = state.files[slot].buffer;
        if buffer != 0 {
            if let Err(err) = atlas_memory::heap::kfree(buffer) {
                log::warn!("ramfs: could not free buffer for '{}': {}", path, err);
            }
        }
        state.files[slot] = RamFile::empty();
        Ok(())
    }

    fn stat(&self, path: &str) -> KernelResult<FileStat> {
        let state = self.state.lock();
        let slot = state.find(path).ok_or(KernelError::DeviceNotFound)?;
        let file = &state.files[slot];
        Ok(FileStat {
            size: file.size as u64,
            ftype: file.ftype,
            created_at: file.created_at,
            modified_at: file.modified_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Once;

    fn setup_memory() {
        static ONCE: Once = Once::new();
        ONCE.call_once(|| {
            let arena =
                Box::leak(vec![0u64; atlas_memory::HEAP_SIZE / 8].into_boxed_slice());
            unsafe {
                match atlas_memory::heap::init(arena.as_mut_ptr() as *mut u8, atlas_memory::HEAP_SIZE) {
                    Ok(()) | Err(atlas_core::KernelError::AlreadyInitialized) => {}
                    Err(e) => panic!("heap init failed: {e:?}"),
                }
            }
        });
    }

    fn mounted() -> RamFs {
        setup_memory();
        let fs = RamFs::new();
        fs.mount(None, 0).unwrap();
        fs
    }

    #[test]
    fn test_create_requires_flag() {
        let fs = mounted();
        assert_eq!(
            fs.open("/a", OpenFlags::RDONLY).err(),
            Some(KernelError::DeviceNotFound)
        );
        let h = fs.open("/a", OpenFlags::CREAT | OpenFlags::RDWR).unwrap();
        fs.close(h).unwrap();
        // Now it exists without CREAT.
        fs.open("/a", OpenFlags::RDONLY).unwrap();
    }

    #[test]
    fn test_write_read_bounded_by_file_size() {
        let fs = mounted();
        let h = fs.open("/f", OpenFlags::CREAT | OpenFlags::RDWR).unwrap();
        assert_eq!(fs.write(h, 0, b"abcdef").unwrap(), 6);

        let mut buf = [0u8; 16];
        assert_eq!(fs.read(h, 0, &mut buf).unwrap(), 6);
        assert_eq!(&buf[..6], b"abcdef");

        // Reads past EOF return zero bytes, not an error.
        assert_eq!(fs.read(h, 6, &mut buf).unwrap(), 0);
        assert_eq!(fs.read(h, 100, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_write_capped_at_max_file_size() {
        let fs = mounted();
        let h = fs.open("/big", OpenFlags::CREAT | OpenFlags::RDWR).unwrap();

        let chunk = vec![0x55u8; 1024];
        let near_end = (MAX_FILE_SIZE - 100) as u64;
        assert_eq!(fs.write(h, near_end, &chunk).unwrap(), 100);
        assert_eq!(fs.stat("/big").unwrap().size, MAX_FILE_SIZE as u64);

        assert_eq!(
            fs.write(h, MAX_FILE_SIZE as u64, &chunk).err(),
            Some(KernelError::InvalidSize)
        );

        fs.unlink("/big").unwrap();
    }

    #[test]
    fn test_trunc_resets_size() {
        let fs = mounted();
        let h = fs.open("/t", OpenFlags::CREAT | OpenFlags::RDWR).unwrap();
        fs.write(h, 0, b"some data").unwrap();
        fs.close(h).unwrap();

        let h = fs
            .open("/t", OpenFlags::RDWR | OpenFlags::TRUNC)
            .unwrap();
        assert_eq!(fs.stat("/t").unwrap().size, 0);
        let mut buf = [0u8; 4];
        assert_eq!(fs.read(h, 0, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_directories_are_type_tags() {
        let fs = mounted();
        fs.mkdir("/docs").unwrap();
        assert_eq!(fs.stat("/docs").unwrap().ftype, FileType::Directory);
        assert_eq!(fs.mkdir("/docs").err(), Some(KernelError::InvalidState));

        // Directory handles reject data I/O.
        let h = fs.open("/docs", OpenFlags::RDONLY).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(fs.read(h, 0, &mut buf).err(), Some(KernelError::NotSupported));

        // rmdir only removes directories; unlink only files.
        assert_eq!(fs.unlink("/docs").err(), Some(KernelError::InvalidParameter));
        fs.rmdir("/docs").unwrap();
        assert_eq!(fs.rmdir("/docs").err(), Some(KernelError::DeviceNotFound));
    }

    #[test]
    fn test_unlink_releases_buffer() {
        let fs = mounted();
        let before = atlas_memory::heap::kernel_heap_stats().unwrap();

        let h = fs.open("/u", OpenFlags::CREAT | OpenFlags::RDWR).unwrap();
        fs.write(h, 0, b"payload").unwrap();
        let during = atlas_memory::heap::kernel_heap_stats().unwrap();
        // Counters are monotonic, so these hold even with other tests
        // touching the shared heap concurrently.
        assert!(during.allocations > before.allocations);

        fs.unlink("/u").unwrap();
        let after = atlas_memory::heap::kernel_heap_stats().unwrap();
        assert!(after.deallocations >= during.deallocations + 1);
        assert!(fs.stat("/u").is_err());

        // The slot and name are reusable immediately.
        fs.open("/u", OpenFlags::CREAT | OpenFlags::RDWR).unwrap();
    }

    #[test]
    fn test_table_capacity() {
        let fs = mounted();
        for i in 0..MAX_FILES {
            let mut name = std::string::String::from("/f");
            name.push_str(&i.to_string());
            fs.open(&name, OpenFlags::CREAT | OpenFlags::RDWR).unwrap();
        }
        assert_eq!(
            fs.open("/overflow", OpenFlags::CREAT | OpenFlags::RDWR).err(),
            Some(KernelError::ResourceExhausted)
        );
    }
}
