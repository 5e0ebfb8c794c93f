//! Process launcher for platforms the game does not run on.
//!
//! `create_suspended` always fails, so no handle can ever exist and the
//! handle-taking methods are statically unreachable.

use std::convert::Infallible;
use std::path::Path;

use super::{ProcessError, ProcessLauncher};

#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedProcessLauncher;

impl UnsupportedProcessLauncher {
    pub fn new() -> Self {
        Self
    }
}

fn unsupported() -> ProcessError {
    ProcessError::UnsupportedPlatform(format!(
        "the game can only be launched on Windows, not {}",
        std::env::consts::OS
    ))
}

impl ProcessLauncher for UnsupportedProcessLauncher {
    type Handle = Infallible;

    fn create_suspended(
        &self,
        _executable: &Path,
        _working_dir: &Path,
    ) -> Result<Self::Handle, ProcessError> {
        Err(unsupported())
    }

    fn write_memory(
        &self,
        handle: &Self::Handle,
        _address: u64,
        _bytes: &[u8],
    ) -> Result<usize, ProcessError> {
        match *handle {}
    }

    fn resume(&self, handle: &Self::Handle) -> Result<(), ProcessError> {
        match *handle {}
    }

    fn terminate(&self, handle: &Self::Handle) -> Result<(), ProcessError> {
        match *handle {}
    }

    fn is_alive(&self, handle: &Self::Handle) -> bool {
        match *handle {}
    }

    fn process_id(&self, handle: &Self::Handle) -> u32 {
        match *handle {}
    }

    fn kill_single_instance_guard(
        &self,
        _process_id: u32,
        _guard_name: &str,
    ) -> Result<bool, ProcessError> {
        Err(unsupported())
    }
}
