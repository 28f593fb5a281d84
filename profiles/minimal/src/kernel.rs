//! # Kernel Bring-Up
//!
//! The staged initialization path: logging, HAL, memory manager, scheduler,
//! filesystems, drivers, demo tasks, then the idle loop. Order follows the
//! dependency chain; each stage logs what it brought up.

use atlas_core::KernelResult;
use atlas_drivers::{console, keyboard, serial, DevFs};
use atlas_execution::{task_create, task_sleep, Priority};
use atlas_fs::{vfs, OpenFlags, RamFs};
use atlas_multiboot::BootInfo;

use crate::logger;

/// Kernel heap arena
#[repr(align(4096))]
struct HeapArena([u8; atlas_memory::HEAP_SIZE]);

static mut HEAP_ARENA: HeapArena = HeapArena([0; atlas_memory::HEAP_SIZE]);

/// The two bundled filesystems
static RAMFS: RamFs = RamFs::new();
static DEVFS: DevFs = DevFs::new();

/// Kernel entry: magic in EAX, info pointer in EBX (via the boot trampoline)
#[no_mangle]
pub extern "C" fn kernel_main(magic: u32, info_ptr: *const u8) -> ! {
    let boot_info = unsafe { BootInfo::from_ptr(info_ptr) };
    let handoff = atlas_multiboot::validate_handoff(magic, boot_info.as_ref());

    // HAL first: with no usable handoff it still brings the CPU side up so
    // recovery mode has a working debug channel.
    let hal_info = if handoff.is_ok() { boot_info } else { None };
    if let Err(err) = atlas_hal::init(hal_info) {
        atlas_hal::emergency_halt(err.as_str());
    }

    // Output channels, then the logger that uses them.
    let _ = serial::Serial::com(0).and_then(|port| port.init(serial::DEFAULT_BAUD));
    #[cfg(target_arch = "x86")]
    console::init();
    logger::init();

    log::info!("atlas: kernel starting");

    if let Err(err) = handoff {
        // Recovery mode: no memory map means no memory management; report
        // and stop rather than guess at RAM.
        log::error!("atlas: boot handoff unusable ({}), entering recovery mode", err);
        atlas_hal::emergency_halt("no memory map from loader");
    }

    if let Err(err) = init_memory() {
        atlas_hal::emergency_halt(err.as_str());
    }

    if let Err(err) = atlas_execution::init() {
        atlas_hal::emergency_halt(err.as_str());
    }
    log::info!("atlas: scheduler online");

    if let Err(err) = init_filesystems() {
        atlas_hal::emergency_halt(err.as_str());
    }

    if let Err(err) = keyboard::init() {
        log::warn!("atlas: keyboard unavailable: {}", err);
    }

    if let Err(err) = spawn_initial_tasks() {
        log::warn!("atlas: could not start demo tasks: {}", err);
    }

    log::info!("atlas: entering idle loop");
    if let Ok(cpu) = atlas_hal::cpu() {
        cpu.enable_interrupts();
    }
    idle_loop()
}

/// Territory map and kernel heap, fed by the HAL's memory detection
fn init_memory() -> KernelResult<()> {
    let detection = atlas_hal::memory()?.detect()?;
    log::info!(
        "atlas: {} KiB lower, {} KiB upper, {} MiB available",
        detection.lower_kb,
        detection.upper_kb,
        detection.total_available / (1024 * 1024)
    );

    atlas_memory::territory::init(detection.total_available, detection.kernel_end)?;

    let arena = core::ptr::addr_of_mut!(HEAP_ARENA);
    unsafe { atlas_memory::heap::init(arena.cast::<u8>(), atlas_memory::HEAP_SIZE) }?;
    Ok(())
}

/// Register and mount RAMFS at "/" and DevFS at "/dev", wire stdio
fn init_filesystems() -> KernelResult<()> {
    vfs::register(&RAMFS)?;
    vfs::register(&DEVFS)?;
    vfs::mount(None, "/", "ramfs", 0)?;
    vfs::mount(None, "/dev", "devfs", 0)?;
    vfs::set_stdio(keyboard::gets, console::write);

    let stats = vfs::with_vfs(|v| v.stats());
    log::info!(
        "atlas: vfs up with {} filesystems, {} mounts",
        stats.filesystems,
        stats.mounts
    );
    Ok(())
}

/// A slow heartbeat and an echo loop over the VFS stdio descriptors
fn spawn_initial_tasks() -> KernelResult<()> {
    task_create("heartbeat", heartbeat_task, 0, Priority::Low, 0)?;
    task_create("echo", echo_task, 0, Priority::Normal, 0)?;
    Ok(())
}

extern "C" fn heartbeat_task(_arg: usize) {
    let mut beats: u64 = 0;
    loop {
        let _ = task_sleep(1000);
        beats += 1;
        log::debug!("heartbeat: {} ({} ticks up)", beats, now());
    }
}

extern "C" fn echo_task(_arg: usize) {
    let _ = vfs::write(1, b"atlas> type a line, get it back\n");
    let mut line = [0u8; 128];
    loop {
        let len = match vfs::read(0, &mut line) {
            Ok(len) => len,
            Err(_) => {
                let _ = task_sleep(100);
                continue;
            }
        };
        let _ = vfs::write(1, &line[..len]);
        let _ = vfs::write(1, b"\n");

        // Keep a transcript on the RAM filesystem.
        if let Ok(fd) = vfs::open(
            "/echo.log",
            OpenFlags::CREAT | OpenFlags::WRONLY | OpenFlags::APPEND,
        ) {
            let _ = vfs::write(fd, &line[..len]);
            let _ = vfs::write(fd, b"\n");
            let _ = vfs::close(fd);
        }
    }
}

fn now() -> u64 {
    atlas_hal::timer().map(|t| t.ticks()).unwrap_or(0)
}

/// Idle duty: reclaim terminated tasks, then wait for the next interrupt
fn idle_loop() -> ! {
    loop {
        atlas_execution::reap();
        if let Ok(cpu) = atlas_hal::cpu() {
            cpu.wait_for_interrupt();
        }
    }
}

/// Panic path: report once, then halt hard
#[cfg(target_arch = "x86")]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo<'_>) -> ! {
    log::error!("kernel panic: {}", info);
    atlas_hal::emergency_halt("kernel panic")
}
