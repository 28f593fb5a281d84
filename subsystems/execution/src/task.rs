//! # Task Control Blocks
//!
//! One [`Tcb`] per task, kept in a fixed arena. Queue membership is by
//! index links inside the block itself.

use atlas_core::PhysAddr;
use atlas_hal::TaskContext;

/// Process identifier; allocated monotonically, never reused
pub type Pid = u32;

/// Task entry function
pub type TaskEntry = extern "C" fn(arg: usize);

/// Maximum stored name length
pub const NAME_LEN: usize = 24;

/// Scheduling priority, lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Priority {
    /// Only runs when nothing else is ready
    Idle = 0,
    /// Background work
    Low = 1,
    /// Default for new tasks
    Normal = 2,
    /// Latency-sensitive work
    High = 3,
    /// Preempts everything else
    Realtime = 4,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

/// Task lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Slot is empty
    Unused,
    /// Runnable, waiting in the ready queue
    Ready,
    /// Currently executing
    Running,
    /// Waiting for a wake condition (sleep deadline)
    Blocked,
    /// Finished, awaiting cleanup
    Terminated,
}

impl TaskState {
    /// Whether the scheduler may pick this task
    pub fn is_runnable(self) -> bool {
        matches!(self, Self::Ready | Self::Running)
    }
}

/// Task control block
#[derive(Debug, Clone)]
pub struct Tcb {
    /// Process id
    pub pid: Pid,
    /// Printable name, truncated to [`NAME_LEN`]
    pub name: heapless::String<NAME_LEN>,
    /// Lifecycle state
    pub state: TaskState,
    /// Scheduling priority
    pub priority: Priority,
    /// Remaining ticks in the current slice
    pub time_slice: u32,
    /// Cumulative ticks spent running
    pub runtime_ticks: u64,
    /// Times this task has been dispatched
    pub scheduled_count: u64,
    /// Saved execution context
    pub context: TaskContext,
    /// Owning frame (isolation identity)
    pub frame: Option<PhysAddr>,
    /// Stack allocation base address
    pub stack_base: usize,
    /// Stack top (initial ESP reference)
    pub stack_top: usize,
    /// Stack size in bytes
    pub stack_size: usize,
    /// Parent pid (0 for the idle task's children at boot)
    pub parent: Pid,
    /// Tick the task was created at
    pub created_at: u64,
    /// Tick the task was last dispatched at
    pub last_scheduled: u64,
    /// Tick a blocked task wakes at
    pub wake_at: u64,
    /// Entry function
    pub entry: Option<TaskEntry>,
    /// Entry argument
    pub arg: usize,
    /// Exit code set at termination
    pub exit_code: i32,
    /// Ready-queue link: next slot index
    pub queue_next: Option<usize>,
    /// Ready-queue link: previous slot index
    pub queue_prev: Option<usize>,
}

impl Tcb {
    /// An empty slot
    pub const fn unused() -> Self {
        Self {
            pid: 0,
            name: heapless::String::new(),
            state: TaskState::Unused,
            priority: Priority::Idle,
            time_slice: 0,
            runtime_ticks: 0,
            scheduled_count: 0,
            context: TaskContext::zeroed(),
            frame: None,
            stack_base: 0,
            stack_top: 0,
            stack_size: 0,
            parent: 0,
            created_at: 0,
            last_scheduled: 0,
            wake_at: 0,
            entry: None,
            arg: 0,
            exit_code: 0,
            queue_next: None,
            queue_prev: None,
        }
    }

    /// Reset the slot to unused, dropping all bookkeeping
    pub fn clear(&mut self) {
        *self = Self::unused();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Idle < Priority::Low);
        assert!(Priority::Low < Priority::Normal);
        assert!(Priority::Normal < Priority::High);
        assert!(Priority::High < Priority::Realtime);
    }

    #[test]
    fn test_state_runnable() {
        assert!(TaskState::Ready.is_runnable());
        assert!(TaskState::Running.is_runnable());
        assert!(!TaskState::Blocked.is_runnable());
        assert!(!TaskState::Unused.is_runnable());
        assert!(!TaskState::Terminated.is_runnable());
    }
}
