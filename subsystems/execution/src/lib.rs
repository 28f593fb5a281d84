//! # Atlas Execution Subsystem
//!
//! Preemptive priority round-robin scheduling over a fixed task table.
//!
//! Tasks live in an arena of [`task::Tcb`] slots linked into the ready queue
//! by index (no owning pointers). The timer interrupt drives time-slice
//! preemption; `task_yield` and `task_sleep` are the voluntary suspension
//! points. Context switching itself is delegated to the HAL.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod queue;
pub mod scheduler;
pub mod task;

pub use scheduler::{
    current_pid, init, reap, scheduler_stats, task_create, task_exit, task_sleep, task_yield,
    Scheduler, SchedulerStats,
};
pub use task::{Pid, Priority, TaskEntry, TaskState, Tcb};

/// Maximum number of tasks, idle included
pub const MAX_TASKS: usize = 32;

/// Default time slice in timer ticks
pub const DEFAULT_TIME_SLICE: u32 = 10;

/// Default stack size for new tasks
pub const DEFAULT_STACK_SIZE: usize = 4096;

/// Milliseconds per timer tick at the configured 100 Hz tick rate
pub const MS_PER_TICK: u64 = 1000 / atlas_hal::TICK_HZ as u64;
