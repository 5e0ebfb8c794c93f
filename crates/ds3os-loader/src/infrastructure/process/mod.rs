//! Process infrastructure: creating, patching, and watching the game process.
//!
//! Launching the game pointed at a community server needs a handful of OS
//! primitives that only exist on Windows:
//!
//! 1. Create the game process with its primary thread suspended, so none of
//!    the game's own code runs before we patch it.
//! 2. Write the connection descriptor into the process at a fixed address.
//! 3. Resume the primary thread.
//! 4. Ask whether the process is still running.
//! 5. Close the game's single-instance mutex so another copy may start.
//!
//! # Testability
//!
//! The [`ProcessLauncher`] trait lets the launch pipeline run against
//! [`mock::MockProcessLauncher`] in unit tests.  [`NativeProcessLauncher`] is
//! the Windows implementation on Windows and an always-failing stub
//! elsewhere.
//!
//! # Handle ownership
//!
//! `create_suspended` returns an owned `Handle`.  Implementations release OS
//! resources when the handle is dropped, so whoever holds the handle owns the
//! process for tracking purposes.

use std::path::{Path, PathBuf};

pub mod mock;
pub mod unsupported;

#[cfg(target_os = "windows")]
pub mod windows;

/// Re-export the Windows launcher as `NativeProcessLauncher` on Windows.
#[cfg(target_os = "windows")]
pub use self::windows::WindowsProcessLauncher as NativeProcessLauncher;

/// On every other platform the game cannot be launched; the stub reports
/// [`ProcessError::UnsupportedPlatform`].
#[cfg(not(target_os = "windows"))]
pub use self::unsupported::UnsupportedProcessLauncher as NativeProcessLauncher;

/// Error type for process operations.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to create process {path}: {reason}")]
    CreateFailed { path: PathBuf, reason: String },

    #[error("failed to write {len} bytes at {address:#x}: {reason}")]
    WriteFailed {
        address: u64,
        len: usize,
        reason: String,
    },

    #[error("failed to resume process {process_id}: {reason}")]
    ResumeFailed { process_id: u32, reason: String },

    #[error("failed to terminate process {process_id}: {reason}")]
    TerminateFailed { process_id: u32, reason: String },

    #[error("failed to close single-instance guard in process {process_id}: {reason}")]
    GuardFailed { process_id: u32, reason: String },

    #[error("platform not supported: {0}")]
    UnsupportedPlatform(String),
}

/// OS seam for everything the launch pipeline does to the game process.
pub trait ProcessLauncher: Send + Sync {
    /// Owned reference to a created process.  Dropping it releases the OS
    /// handles but does not terminate the process.
    type Handle: Send;

    /// Creates `executable` with its primary thread suspended, using
    /// `working_dir` as the current directory.
    fn create_suspended(
        &self,
        executable: &Path,
        working_dir: &Path,
    ) -> Result<Self::Handle, ProcessError>;

    /// Writes `bytes` at `address` in the process and returns how many bytes
    /// were actually written.
    fn write_memory(
        &self,
        handle: &Self::Handle,
        address: u64,
        bytes: &[u8],
    ) -> Result<usize, ProcessError>;

    /// Resumes the primary thread of a suspended process.
    fn resume(&self, handle: &Self::Handle) -> Result<(), ProcessError>;

    /// Kills a process that will not be resumed.
    fn terminate(&self, handle: &Self::Handle) -> Result<(), ProcessError>;

    /// Returns `true` while the process has not exited.
    fn is_alive(&self, handle: &Self::Handle) -> bool;

    fn process_id(&self, handle: &Self::Handle) -> u32;

    /// Closes the named single-instance guard inside `process_id`.
    ///
    /// Returns `Ok(true)` if a handle to the guard was found and closed.
    fn kill_single_instance_guard(
        &self,
        process_id: u32,
        guard_name: &str,
    ) -> Result<bool, ProcessError>;
}
