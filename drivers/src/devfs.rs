//! # Device Filesystem
//!
//! Pseudo-filesystem exposing the driver layer as device nodes. The node
//! table is static; DevFS is structurally read-only (no mkdir/rmdir/unlink),
//! only the nodes' contents can be touched, subject to per-node permission
//! bits.

use bitflags::bitflags;

use atlas_core::{KernelError, KernelResult};
use atlas_fs::{FileStat, FileSystem, FileType, Handle, OpenFlags};

use crate::{keyboard, serial};

/// Window `/dev/mem` may touch: [1 MiB, 2 MiB)
pub const MEM_WINDOW_START: usize = 0x10_0000;
/// Exclusive end of the `/dev/mem` window
pub const MEM_WINDOW_END: usize = 0x20_0000;

bitflags! {
    /// Per-node access permissions
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NodePerms: u8 {
        /// Reads permitted
        const READ = 0x01;
        /// Writes permitted
        const WRITE = 0x02;
    }
}

/// What a node is backed by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    /// Reads return nothing, writes vanish
    Null,
    /// Reads return zero bytes, writes vanish
    Zero,
    /// Linear congruential generator
    Random,
    /// Console write / keyboard line read
    Console,
    /// Keyboard line read
    Keyboard,
    /// Serial port by minor number
    Serial(usize),
    /// Physical memory window
    Mem,
}

struct DeviceNode {
    name: &'static str,
    kind: NodeKind,
    perms: NodePerms,
}

const DEVICES: [DeviceNode; 8] = [
    DeviceNode {
        name: "null",
        kind: NodeKind::Null,
        perms: NodePerms::READ.union(NodePerms::WRITE),
    },
    DeviceNode {
        name: "zero",
        kind: NodeKind::Zero,
        perms: NodePerms::READ.union(NodePerms::WRITE),
    },
    DeviceNode {
        name: "random",
        kind: NodeKind::Random,
        perms: NodePerms::READ,
    },
    DeviceNode {
        name: "console",
        kind: NodeKind::Console,
        perms: NodePerms::READ.union(NodePerms::WRITE),
    },
    DeviceNode {
        name: "keyboard",
        kind: NodeKind::Keyboard,
        perms: NodePerms::READ,
    },
    DeviceNode {
        name: "ttyS0",
        kind: NodeKind::Serial(0),
        perms: NodePerms::READ.union(NodePerms::WRITE),
    },
    DeviceNode {
        name: "ttyS1",
        kind: NodeKind::Serial(1),
        perms: NodePerms::READ.union(NodePerms::WRITE),
    },
    DeviceNode {
        name: "mem",
        kind: NodeKind::Mem,
        perms: NodePerms::READ.union(NodePerms::WRITE),
    },
];

struct DevState {
    mounted: bool,
    lcg: u32,
}

/// The device filesystem
pub struct DevFs {
    state: spin::Mutex<DevState>,
}

impl DevFs {
    /// Create an unmounted DevFS
    pub const fn new() -> Self {
        Self {
            state: spin::Mutex::new(DevState {
                mounted: false,
                lcg: 0,
            }),
        }
    }

    fn node(handle: Handle) -> KernelResult<&'static DeviceNode> {
        DEVICES
            .get(handle as usize)
            .ok_or(KernelError::InvalidHandle)
    }

    fn next_random(&self) -> u8 {
        let mut state = self.state.lock();
        state.lcg = state.lcg.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        (state.lcg >> 16) as u8
    }
}

impl Default for DevFs {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for DevFs {
    fn name(&self) -> &'static str {
        "devfs"
    }

    fn mount(&self, _device: Option<&str>, _flags: u32) -> KernelResult<()> {
        let mut state = self.state.lock();
        if state.mounted {
            return Err(KernelError::AlreadyInitialized);
        }
        state.mounted = true;
        // Seed the generator from whatever the clock has counted so far.
        state.lcg = (crate::now_ticks() as u32) | 1;
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
        let name = path.strip_prefix('/').unwrap_or(path);
        let index = DEVICES
            .iter()
            .position(|d| d.name == name)
            .ok_or(KernelError::DeviceNotFound)?;

        let node = &DEVICES[index];
        if flags.readable() && !node.perms.contains(NodePerms::READ)
            || flags.writable() && !node.perms.contains(NodePerms::WRITE)
        {
            return Err(KernelError::AccessDenied);
        }
        Ok(index as Handle)
    }

    fn close(&self, handle: Handle) -> KernelResult<()> {
        Self::node(handle).map(|_| ())
    }

    fn read(&self, handle: Handle, offset: u64, buf: &mut [u8]) -> KernelResult<usize> {
        let node = Self::node(handle)?;
        if !node.perms.contains(NodePerms::READ) {
            return Err(KernelError::AccessDenied);
        }

        match node.kind {
            NodeKind::Null => Ok(0),
            NodeKind::Zero => {
                buf.fill(0);
                Ok(buf.len())
            }
            NodeKind::Random => {
                for byte in buf.iter_mut() {
                    *byte = self.next_random();
                }
                Ok(buf.len())
            }
            NodeKind::Console | NodeKind::Keyboard => Ok(keyboard::gets(buf)),
            NodeKind::Serial(minor) => serial::Serial::com(minor)?.read(buf),
            NodeKind::Mem => {
                let start = MEM_WINDOW_START
                    .checked_add(offset as usize)
                    .ok_or(KernelError::InvalidParameter)?;
                if start >= MEM_WINDOW_END {
                    return Ok(0);
                }
                let count = buf.len().min(MEM_WINDOW_END - start);
                read_phys(start, &mut buf[..count]);
                Ok(count)
            }
        }
    }

    fn write(&self, handle: Handle, offset: u64, buf: &[u8]) -> KernelResult<usize> {
        let node = Self::node(handle)?;
        if !node.perms.contains(NodePerms::WRITE) {
            return Err(KernelError::AccessDenied);
        }

        match node.kind {
            // Bit bucket semantics: accept and discard.
            NodeKind::Null | NodeKind::Zero => Ok(buf.len()),
            NodeKind::Random | NodeKind::Keyboard => Err(KernelError::NotSupported),
            NodeKind::Console => {
                crate::console::write(buf);
                Ok(buf.len())
            }
            NodeKind::Serial(minor) => serial::Serial::com(minor)?.write(buf),
            NodeKind::Mem => {
                let start = MEM_WINDOW_START
                    .checked_add(offset as usize)
                    .ok_or(KernelError::InvalidParameter)?;
                if start >= MEM_WINDOW_END {
                    return Err(KernelError::InvalidParameter);
                }
                let count = buf.len().min(MEM_WINDOW_END - start);
                write_phys(start, &buf[..count]);
                Ok(count)
            }
        }
    }

    fn mkdir(&self, _path: &str) -> KernelResult<()> {
        Err(KernelError::AccessDenied)
    }

    fn rmdir(&self, _path: &str) -> KernelResult<()> {
        Err(KernelError::AccessDenied)
    }

    fn unlink(&self, _path: &str) -> KernelResult<()> {
        Err(KernelError::AccessDenied)
    }

    fn stat(&self, path: &str) -> KernelResult<FileStat> {
        let name = path.strip_prefix('/').unwrap_or(path);
        if name.is_empty() {
            return Ok(FileStat {
                size: 0,
                ftype: FileType::Directory,
                created_at: 0,
                modified_at: 0,
            });
        }
        DEVICES
            .iter()
            .find(|d| d.name == name)
            .map(|_| FileStat {
                size: 0,
                ftype: FileType::Device,
                created_at: 0,
                modified_at: 0,
            })
            .ok_or(KernelError::DeviceNotFound)
    }
}

/// Read from the physical window (identity-mapped on the real machine)
#[cfg(target_arch = "x86")]
fn read_phys(addr: usize, buf: &mut [u8]) {
    unsafe {
        core::ptr::copy_nonoverlapping(addr as *const u8, buf.as_mut_ptr(), buf.len());
    }
}

/// Write into the physical window (identity-mapped on the real machine)
#[cfg(target_arch = "x86")]
fn write_phys(addr: usize, buf: &[u8]) {
    unsafe {
        core::ptr::copy_nonoverlapping(buf.as_ptr(), addr as *mut u8, buf.len());
    }
}

#[cfg(not(target_arch = "x86"))]
fn read_phys(_addr: usize, buf: &mut [u8]) {
    // No identity-mapped window off-target; behave like /dev/zero.
    buf.fill(0);
}

#[cfg(not(target_arch = "x86"))]
fn write_phys(_addr: usize, _buf: &[u8]) {}

#[cfg(test)]
mod tests {
    use super::*;

    fn mounted() -> DevFs {
        let fs = DevFs::new();
        fs.mount(None, 0).unwrap();
        fs
    }

    #[test]
    fn test_mount_is_single() {
        let fs = mounted();
        assert_eq!(fs.mount(None, 0).err(), Some(KernelError::AlreadyInitialized));
        fs.unmount().unwrap();
        assert_eq!(fs.unmount().err(), Some(KernelError::NotInitialized));
    }

    #[test]
    fn test_null_semantics() {
        let fs = mounted();
        let h = fs.open("/null", OpenFlags::RDWR).unwrap();
        let mut buf = [0xAAu8; 16];
        assert_eq!(fs.read(h, 0, &mut buf).unwrap(), 0);
        assert_eq!(fs.write(h, 0, b"discarded").unwrap(), 9);
    }

    #[test]
    fn test_zero_fills_buffer() {
        let fs = mounted();
        let h = fs.open("/zero", OpenFlags::RDONLY).unwrap();
        let mut buf = [0xFFu8; 32];
        assert_eq!(fs.read(h, 0, &mut buf).unwrap(), 32);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_random_produces_varied_bytes() {
        let fs = mounted();
        let h = fs.open("/random", OpenFlags::RDONLY).unwrap();
        let mut a = [0u8; 64];
        let mut b = [0u8; 64];
        fs.read(h, 0, &mut a).unwrap();
        fs.read(h, 0, &mut b).unwrap();
        // The stream advances between reads and is not constant.
        assert_ne!(a, b);
        assert!(a.iter().any(|&x| x != a[0]));

        // Writes are rejected at open time by the permission bits.
        assert_eq!(
            fs.open("/random", OpenFlags::WRONLY).err(),
            Some(KernelError::AccessDenied)
        );
    }

    #[test]
    fn test_keyboard_node_is_read_only() {
        let fs = mounted();
        assert_eq!(
            fs.open("/keyboard", OpenFlags::RDWR).err(),
            Some(KernelError::AccessDenied)
        );
        fs.open("/keyboard", OpenFlags::RDONLY).unwrap();
    }

    #[test]
    fn test_structurally_read_only() {
        let fs = mounted();
        assert_eq!(fs.mkdir("/sub").err(), Some(KernelError::AccessDenied));
        assert_eq!(fs.rmdir("/sub").err(), Some(KernelError::AccessDenied));
        assert_eq!(fs.unlink("/null").err(), Some(KernelError::AccessDenied));
    }

    #[test]
    fn test_unknown_node() {
        let fs = mounted();
        assert_eq!(
            fs.open("/missing", OpenFlags::RDONLY).err(),
            Some(KernelError::DeviceNotFound)
        );
        assert_eq!(fs.stat("/missing").err(), Some(KernelError::DeviceNotFound));
    }

    #[test]
    fn test_stat_kinds() {
        let fs = mounted();
        assert_eq!(fs.stat("/").unwrap().ftype, FileType::Directory);
        assert_eq!(fs.stat("/zero").unwrap().ftype, FileType::Device);
    }

    #[test]
    fn test_mount_resolution_against_ramfs_root() {
        use atlas_fs::{RamFs, Vfs};

        let root: &'static RamFs = Box::leak(Box::new(RamFs::new()));
        let dev: &'static DevFs = Box::leak(Box::new(DevFs::new()));
        let mut vfs = Vfs::new();
        vfs.register(root).unwrap();
        vfs.register(dev).unwrap();
        vfs.mount(None, "/", "ramfs", 0).unwrap();
        vfs.mount(None, "/dev", "devfs", 0).unwrap();

        // "/dev/null" goes to DevFS: a fresh descriptor that reads nothing.
        let null_fd = vfs.open("/dev/null", OpenFlags::RDONLY).unwrap();
        let mut buf = [0xAAu8; 8];
        assert_eq!(vfs.read(null_fd, &mut buf).unwrap(), 0);

        // "/tmp/x" falls through to the RAMFS root mount.
        let tmp_fd = vfs.open("/tmp/x", OpenFlags::CREAT | OpenFlags::RDWR).unwrap();
        assert!(root.stat("/tmp/x").is_ok());
        assert!(dev.stat("/tmp/x").is_err());

        // "/dev/zero" keeps its DevFS semantics through the VFS path.
        let zero_fd = vfs.open("/dev/zero", OpenFlags::RDONLY).unwrap();
        let mut buf = [0xFFu8; 16];
        assert_eq!(vfs.read(zero_fd, &mut buf).unwrap(), 16);
        assert!(buf.iter().all(|&b| b == 0));

        vfs.close(null_fd).unwrap();
        vfs.close(tmp_fd).unwrap();
        vfs.close(zero_fd).unwrap();
    }

    #[test]
    fn test_mem_window_bounds() {
        let fs = mounted();
        let h = fs.open("/mem", OpenFlags::RDWR).unwrap();
        let window = (MEM_WINDOW_END - MEM_WINDOW_START) as u64;

        // Reads stop at the window end.
        let mut buf = [0u8; 16];
        assert_eq!(fs.read(h, window, &mut buf).unwrap(), 0);
        assert_eq!(fs.read(h, window - 8, &mut buf).unwrap(), 8);

        // Writes past the window are refused outright.
        assert_eq!(
            fs.write(h, window, &buf).err(),
            Some(KernelError::InvalidParameter)
        );
    }
}
