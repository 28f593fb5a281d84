//! # Territory Map
//!
//! The physical frame allocator. Every 4 KiB frame of RAM is one territory,
//! tracked by one bit: set = allocated, clear = free.
//!
//! The bitmap's storage is statically sized for the largest supported
//! memory, but the original address accounting is preserved: the bitmap is
//! considered to live at `align4k(kernel_end) + 64 KiB`, and every frame
//! below the end of that footprint stays reserved for the kernel image, the
//! bitmap, and the safety margin.

use atlas_core::{align_up, KernelError, KernelResult, PhysAddr};

/// Size of one territory (physical frame)
pub const TERRITORY_SIZE: usize = 4096;

/// Hard cap on tracked frames (512 MiB of RAM)
pub const MAX_TERRITORIES: usize = 131_072;

/// Gap kept between the kernel image and the bitmap
pub const BITMAP_SAFETY_MARGIN: usize = 64 * 1024;

const BITMAP_WORDS: usize = MAX_TERRITORIES / 64;

/// Allocation statistics for the territory map
#[derive(Debug, Clone, Copy, Default)]
pub struct TerritoryStats {
    /// Frames under management
    pub total: usize,
    /// Frames currently free
    pub free: usize,
    /// Frames below the reserved boundary
    pub reserved: usize,
    /// Successful allocations
    pub allocations: u64,
    /// Successful frees
    pub deallocations: u64,
    /// Failed allocations (exhaustion)
    pub failures: u64,
}

/// Bitmap allocator over physical frames
pub struct TerritoryMap {
    /// One bit per frame: set = allocated
    bitmap: [u64; BITMAP_WORDS],
    /// Frames under management
    total: usize,
    /// First frame index the allocator may hand out
    first_free_index: usize,
    /// End of the bitmap footprint in the address accounting
    bitmap_end: u64,
    /// Free frame count
    free_count: usize,
    allocations: u64,
    deallocations: u64,
    failures: u64,
    initialized: bool,
}

impl TerritoryMap {
    /// Create an uninitialized map (every frame reserved)
    pub const fn new() -> Self {
        Self {
            bitmap: [u64::MAX; BITMAP_WORDS],
            total: 0,
            first_free_index: 0,
            bitmap_end: 0,
            free_count: 0,
            allocations: 0,
            deallocations: 0,
            failures: 0,
            initialized: false,
        }
    }

    /// Initialize for `total_memory` bytes of RAM with the kernel image
    /// ending at `kernel_end`
    ///
    /// All frames start allocated; frames whose start address lies at or
    /// past the bitmap footprint are then freed. The caller must treat a
    /// failure here as fatal: there is no RAM left to manage.
    ///
    /// # Errors
    ///
    /// - [`KernelError::AlreadyInitialized`] on a second call
    /// - [`KernelError::InvalidSize`] when `total_memory` is below one frame
    /// - [`KernelError::InitializationFailed`] when the bitmap footprint
    ///   would extend past the end of RAM
    pub fn init(&mut self, total_memory: u64, kernel_end: usize) -> KernelResult<()> {
        if self.initialized {
            return Err(KernelError::AlreadyInitialized);
        }

        let mut frames = (total_memory / TERRITORY_SIZE as u64) as usize;
        if frames == 0 {
            return Err(KernelError::InvalidSize);
        }
        if frames > MAX_TERRITORIES {
            log::warn!(
                "territory: capping {} frames at {} ({} MiB)",
                frames,
                MAX_TERRITORIES,
                MAX_TERRITORIES * TERRITORY_SIZE / (1024 * 1024)
            );
            frames = MAX_TERRITORIES;
        }

        let bitmap_base = align_up(kernel_end, TERRITORY_SIZE) + BITMAP_SAFETY_MARGIN;
        let bitmap_bytes = (frames + 7) / 8;
        let bitmap_end = (bitmap_base + bitmap_bytes) as u64;
        if bitmap_end > frames as u64 * TERRITORY_SIZE as u64 {
            log::error!(
                "territory: bitmap [{:#x}..{:#x}) extends past RAM",
                bitmap_base,
                bitmap_end
            );
            return Err(KernelError::InitializationFailed);
        }

        // Everything starts reserved; free the frames past the bitmap.
        self.bitmap = [u64::MAX; BITMAP_WORDS];
        let first_free = align_up(bitmap_end as usize, TERRITORY_SIZE) / TERRITORY_SIZE;
        for index in first_free..frames {
            self.clear_bit(index);
        }

        self.total = frames;
        self.first_free_index = first_free;
        self.bitmap_end = bitmap_end;
        self.free_count = frames - first_free;
        self.initialized = true;

        log::info!(
            "territory: {} frames, {} reserved (kernel+bitmap), {} free",
            frames,
            first_free,
            self.free_count
        );
        Ok(())
    }

    /// Allocate one frame, returning its physical address
    ///
    /// First-fit scan from the first non-reserved frame.
    pub fn alloc_frame(&mut self) -> KernelResult<PhysAddr> {
        if !self.initialized {
            return Err(KernelError::NotInitialized);
        }

        let mut index = self.first_free_index;
        while index < self.total {
            let word = self.bitmap[index / 64];
            if word == u64::MAX {
                // Whole word allocated; skip to the next word boundary.
                index = (index / 64 + 1) * 64;
                continue;
            }
            if !self.test_bit(index) {
                self.set_bit(index);
                self.free_count -= 1;
                self.allocations += 1;
                return Ok(PhysAddr::new(index as u64 * TERRITORY_SIZE as u64));
            }
            index += 1;
        }

        self.failures += 1;
        Err(KernelError::OutOfMemory)
    }

    /// Free the frame starting at `addr`
    ///
    /// Out-of-range and double-free are soft errors: logged, returned, no
    /// state change.
    pub fn free_frame(&mut self, addr: PhysAddr) -> KernelResult<()> {
        if !self.initialized {
            return Err(KernelError::NotInitialized);
        }

        let index = (addr.as_u64() / TERRITORY_SIZE as u64) as usize;
        if index >= self.total || addr.as_u64() % TERRITORY_SIZE as u64 != 0 {
            log::warn!("territory: free of invalid address {}", addr);
            return Err(KernelError::InvalidParameter);
        }
        if !self.test_bit(index) {
            log::warn!("territory: double free of frame {}", index);
            return Err(KernelError::DoubleFree);
        }
        if index < self.first_free_index {
            log::warn!("territory: refusing to free reserved frame {}", index);
            return Err(KernelError::AccessDenied);
        }

        self.clear_bit(index);
        self.free_count += 1;
        self.deallocations += 1;
        Ok(())
    }

    /// End of the bitmap footprint in the address accounting
    pub fn bitmap_end(&self) -> u64 {
        self.bitmap_end
    }

    /// Whether the frame at `index` is currently allocated
    pub fn is_allocated(&self, index: usize) -> bool {
        self.test_bit(index)
    }

    /// Current statistics
    pub fn stats(&self) -> TerritoryStats {
        TerritoryStats {
            total: self.total,
            free: self.free_count,
            reserved: self.first_free_index,
            allocations: self.allocations,
            deallocations: self.deallocations,
            failures: self.failures,
        }
    }

    fn test_bit(&self, index: usize) -> bool {
        self.bitmap[index / 64] & (1 << (index % 64)) != 0
    }

    fn set_bit(&mut self, index: usize) {
        self.bitmap[index / 64] |= 1 << (index % 64);
    }

    fn clear_bit(&mut self, index: usize) {
        self.bitmap[index / 64] &= !(1 << (index % 64));
    }
}

impl Default for TerritoryMap {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Global Territory Map
// =============================================================================

static TERRITORIES: spin::Mutex<TerritoryMap> = spin::Mutex::new(TerritoryMap::new());

/// Initialize the global territory map
pub fn init(total_memory: u64, kernel_end: usize) -> KernelResult<()> {
    TERRITORIES.lock().init(total_memory, kernel_end)
}

/// Allocate a frame from the global territory map
pub fn alloc_frame() -> KernelResult<PhysAddr> {
    TERRITORIES.lock().alloc_frame()
}

/// Free a frame in the global territory map
pub fn free_frame(addr: PhysAddr) -> KernelResult<()> {
    TERRITORIES.lock().free_frame(addr)
}

/// Statistics of the global territory map
pub fn stats() -> TerritoryStats {
    TERRITORIES.lock().stats()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    fn map_32mib() -> TerritoryMap {
        let mut map = TerritoryMap::new();
        map.init(32 * MIB, 0x15_0000).unwrap();
        map
    }

    #[test]
    fn test_init_reserves_kernel_and_bitmap() {
        let map = map_32mib();
        // bitmap base = align4k(0x150000) + 64 KiB = 0x160000; 8192 frames
        // need 1024 bitmap bytes, so the footprint ends at 0x160400.
        assert_eq!(map.bitmap_end(), 0x16_0400);
        let stats = map.stats();
        assert_eq!(stats.total, 8192);
        assert_eq!(stats.reserved, 0x161);
        assert_eq!(stats.free, 8192 - 0x161);
    }

    #[test]
    fn test_first_alloc_past_bitmap() {
        let mut map = map_32mib();
        let frame = map.alloc_frame().unwrap();
        let boundary = atlas_core::align_up(map.bitmap_end() as usize, TERRITORY_SIZE) as u64;
        assert!(frame.as_u64() >= boundary);
        assert!(frame.is_aligned(TERRITORY_SIZE as u64));
    }

    #[test]
    fn test_exhaustion_then_reuse() {
        let mut map = map_32mib();
        let mut last = PhysAddr::new(0);
        loop {
            match map.alloc_frame() {
                Ok(frame) => last = frame,
                Err(err) => {
                    assert_eq!(err, KernelError::OutOfMemory);
                    break;
                }
            }
        }
        assert_ne!(last.as_u64(), 0);
        assert_eq!(map.stats().free, 0);

        // Freeing the last frame makes exactly that frame available again.
        map.free_frame(last).unwrap();
        assert_eq!(map.alloc_frame().unwrap(), last);
    }

    #[test]
    fn test_no_frame_handed_out_twice() {
        let mut map = map_32mib();
        let a = map.alloc_frame().unwrap();
        let b = map.alloc_frame().unwrap();
        let c = map.alloc_frame().unwrap();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);

        // Allocated bits are set; freed bits are clear.
        let index = |p: PhysAddr| (p.as_u64() as usize) / TERRITORY_SIZE;
        assert!(map.is_allocated(index(a)));
        map.free_frame(b).unwrap();
        assert!(!map.is_allocated(index(b)));

        // First-fit returns the freed frame before anything new.
        assert_eq!(map.alloc_frame().unwrap(), b);
    }

    #[test]
    fn test_soft_errors() {
        let mut map = map_32mib();
        let frame = map.alloc_frame().unwrap();
        map.free_frame(frame).unwrap();

        // Double free: soft error, no state change.
        assert_eq!(map.free_frame(frame).err(), Some(KernelError::DoubleFree));
        // Out of range.
        assert_eq!(
            map.free_frame(PhysAddr::new(64 * MIB)).err(),
            Some(KernelError::InvalidParameter)
        );
        // Misaligned.
        assert_eq!(
            map.free_frame(PhysAddr::new(frame.as_u64() + 5)).err(),
            Some(KernelError::InvalidParameter)
        );
        // Reserved prefix stays reserved.
        assert_eq!(
            map.free_frame(PhysAddr::new(0x1000)).err(),
            Some(KernelError::AccessDenied)
        );
    }

    #[test]
    fn test_init_failure_when_bitmap_past_ram() {
        let mut map = TerritoryMap::new();
        // 1 MiB of RAM with the kernel ending at 1 MiB: nothing left.
        assert_eq!(
            map.init(MIB, MIB as usize).err(),
            Some(KernelError::InitializationFailed)
        );
    }

    #[test]
    fn test_double_init_rejected() {
        let mut map = map_32mib();
        assert_eq!(
            map.init(32 * MIB, 0x15_0000).err(),
            Some(KernelError::AlreadyInitialized)
        );
    }

    #[test]
    fn test_frame_cap_applies() {
        let mut map = TerritoryMap::new();
        map.init(1024 * MIB, 0x15_0000).unwrap();
        assert_eq!(map.stats().total, MAX_TERRITORIES);
    }
}
