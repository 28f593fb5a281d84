//! # Kernel Error Taxonomy
//!
//! One flat error enum shared by every subsystem. Recoverable errors are
//! returned to the caller; a few init-time failures are fatal and route
//! through the HAL emergency halt instead.

use core::fmt;

/// Result type used by every fallible kernel operation
pub type KernelResult<T> = Result<T, KernelError>;

/// Errors that can occur in kernel operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    // Parameter errors
    /// A required pointer/reference argument was absent
    NullPointer,
    /// An argument was outside its accepted domain
    InvalidParameter,
    /// A size argument was zero, too large, or inconsistent
    InvalidSize,
    /// An address or size violated an alignment requirement
    InvalidAlignment,
    /// The supplied buffer is too small for the result
    BufferTooSmall,
    /// The operation is not valid in the current state
    InvalidState,
    /// A handle does not refer to a live object
    InvalidHandle,

    // Memory errors
    /// No memory of the requested kind is available
    OutOfMemory,
    /// Allocator metadata failed an integrity check
    MemoryCorruption,
    /// An already-free block was freed again
    DoubleFree,
    /// The heap has no block large enough for the request
    HeapExhausted,
    /// The allocator returned an unusable block
    BadAllocation,

    // Hardware / initialization errors
    /// The hardware reported a failure
    HardwareFailure,
    /// The subsystem has not been initialized yet
    NotInitialized,
    /// The subsystem was already initialized
    AlreadyInitialized,
    /// Subsystem initialization failed
    InitializationFailed,
    /// No such device exists
    DeviceNotFound,
    /// The device is busy
    DeviceBusy,

    // System errors
    /// A bounded wait expired
    Timeout,
    /// The operation is not supported here
    NotSupported,
    /// The caller lacks permission for the operation
    AccessDenied,
    /// A fixed-capacity resource table is full
    ResourceExhausted,
    /// A hard system limit was reached
    SystemLimit,

    // I/O errors
    /// Generic I/O failure
    IoFailure,
    /// A read operation failed
    ReadFailure,
    /// A write operation failed
    WriteFailure,
    /// A seek operation failed
    SeekFailure,
    /// The peer or device connection was lost
    ConnectionLost,
    /// A protocol-level exchange was malformed
    ProtocolError,
}

/// Coarse grouping of [`KernelError`] variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Caller-supplied argument problems
    Parameter,
    /// Allocator and memory-integrity problems
    Memory,
    /// Hardware and initialization problems
    Hardware,
    /// System-level limits and policy
    System,
    /// Input/output failures
    Io,
}

impl KernelError {
    /// Get the category this error belongs to
    pub const fn category(self) -> ErrorCategory {
        match self {
            Self::NullPointer
            | Self::InvalidParameter
            | Self::InvalidSize
            | Self::InvalidAlignment
            | Self::BufferTooSmall
            | Self::InvalidState
            | Self::InvalidHandle => ErrorCategory::Parameter,

            Self::OutOfMemory
            | Self::MemoryCorruption
            | Self::DoubleFree
            | Self::HeapExhausted
            | Self::BadAllocation => ErrorCategory::Memory,

            Self::HardwareFailure
            | Self::NotInitialized
            | Self::AlreadyInitialized
            | Self::InitializationFailed
            | Self::DeviceNotFound
            | Self::DeviceBusy => ErrorCategory::Hardware,

            Self::Timeout
            | Self::NotSupported
            | Self::AccessDenied
            | Self::ResourceExhausted
            | Self::SystemLimit => ErrorCategory::System,

            Self::IoFailure
            | Self::ReadFailure
            | Self::WriteFailure
            | Self::SeekFailure
            | Self::ConnectionLost
            | Self::ProtocolError => ErrorCategory::Io,
        }
    }

    /// Short static name for logging
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NullPointer => "null pointer",
            Self::InvalidParameter => "invalid parameter",
            Self::InvalidSize => "invalid size",
            Self::InvalidAlignment => "invalid alignment",
            Self::BufferTooSmall => "buffer too small",
            Self::InvalidState => "invalid state",
            Self::InvalidHandle => "invalid handle",
            Self::OutOfMemory => "out of memory",
            Self::MemoryCorruption => "memory corruption",
            Self::DoubleFree => "double free",
            Self::HeapExhausted => "heap exhausted",
            Self::BadAllocation => "bad allocation",
            Self::HardwareFailure => "hardware failure",
            Self::NotInitialized => "not initialized",
            Self::AlreadyInitialized => "already initialized",
            Self::InitializationFailed => "initialization failed",
            Self::DeviceNotFound => "device not found",
            Self::DeviceBusy => "device busy",
            Self::Timeout => "timeout",
            Self::NotSupported => "not supported",
            Self::AccessDenied => "access denied",
            Self::ResourceExhausted => "resource exhausted",
            Self::SystemLimit => "system limit",
            Self::IoFailure => "I/O failure",
            Self::ReadFailure => "read failure",
            Self::WriteFailure => "write failure",
            Self::SeekFailure => "seek failure",
            Self::ConnectionLost => "connection lost",
            Self::ProtocolError => "protocol error",
        }
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(KernelError::NullPointer.category(), ErrorCategory::Parameter);
        assert_eq!(KernelError::DoubleFree.category(), ErrorCategory::Memory);
        assert_eq!(KernelError::NotInitialized.category(), ErrorCategory::Hardware);
        assert_eq!(KernelError::Timeout.category(), ErrorCategory::System);
        assert_eq!(KernelError::SeekFailure.category(), ErrorCategory::Io);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(format!("{}", KernelError::OutOfMemory), "out of memory");
    }
}
