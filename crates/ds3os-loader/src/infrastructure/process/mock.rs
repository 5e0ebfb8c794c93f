//! Mock process launcher for unit testing.
//!
//! Records every call instead of touching the OS.  Clones share state, so a
//! test can hand one clone to the pipeline and inspect the other.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::{ProcessError, ProcessLauncher};

/// Handle returned by [`MockProcessLauncher::create_suspended`].
#[derive(Debug, PartialEq, Eq)]
pub struct MockProcessHandle {
    pub process_id: u32,
}

/// Everything the mock has been asked to do.
#[derive(Debug, Default)]
pub struct MockProcessState {
    /// `(executable, working_dir)` per created process.
    pub created: Vec<(PathBuf, PathBuf)>,
    /// `(process_id, address, bytes)` per memory write.
    pub writes: Vec<(u32, u64, Vec<u8>)>,
    pub resumed: Vec<u32>,
    pub terminated: Vec<u32>,
    /// `(process_id, guard_name)` per guard kill.
    pub guard_kills: Vec<(u32, String)>,
    /// Processes that have not exited yet.
    pub alive: Vec<u32>,
    next_process_id: u32,
    fail_create: bool,
    fail_resume: bool,
    short_write: Option<usize>,
}

/// A mock implementation of [`ProcessLauncher`].
#[derive(Debug, Clone, Default)]
pub struct MockProcessLauncher {
    state: Arc<Mutex<MockProcessState>>,
}

impl MockProcessLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `create_suspended` fail.
    pub fn fail_create(&self) {
        self.lock().fail_create = true;
    }

    /// Makes every subsequent `resume` fail, leaving the process suspended.
    pub fn fail_resume(&self) {
        self.lock().fail_resume = true;
    }

    /// Makes every subsequent `write_memory` report only `written` bytes.
    pub fn short_write(&self, written: usize) {
        self.lock().short_write = Some(written);
    }

    /// Simulates the game exiting.
    pub fn exit(&self, process_id: u32) {
        self.lock().alive.retain(|&pid| pid != process_id);
    }

    /// Runs `f` with read access to the recorded calls.
    pub fn inspect<R>(&self, f: impl FnOnce(&MockProcessState) -> R) -> R {
        f(&self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockProcessState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ProcessLauncher for MockProcessLauncher {
    type Handle = MockProcessHandle;

    fn create_suspended(
        &self,
        executable: &Path,
        working_dir: &Path,
    ) -> Result<Self::Handle, ProcessError> {
        let mut state = self.lock();
        if state.fail_create {
            return Err(ProcessError::CreateFailed {
                path: executable.to_path_buf(),
                reason: "injected failure".to_string(),
            });
        }
        state.next_process_id += 1;
        let process_id = 1000 + state.next_process_id;
        state
            .created
            .push((executable.to_path_buf(), working_dir.to_path_buf()));
        state.alive.push(process_id);
        Ok(MockProcessHandle { process_id })
    }

    fn write_memory(
        &self,
        handle: &Self::Handle,
        address: u64,
        bytes: &[u8],
    ) -> Result<usize, ProcessError> {
        let mut state = self.lock();
        state.writes.push((handle.process_id, address, bytes.to_vec()));
        Ok(state.short_write.map_or(bytes.len(), |n| n.min(bytes.len())))
    }

    fn resume(&self, handle: &Self::Handle) -> Result<(), ProcessError> {
        let mut state = self.lock();
        if state.fail_resume {
            return Err(ProcessError::ResumeFailed {
                process_id: handle.process_id,
                reason: "injected failure".to_string(),
            });
        }
        state.resumed.push(handle.process_id);
        Ok(())
    }

    fn terminate(&self, handle: &Self::Handle) -> Result<(), ProcessError> {
        let mut state = self.lock();
        state.terminated.push(handle.process_id);
        state.alive.retain(|&pid| pid != handle.process_id);
        Ok(())
    }

    fn is_alive(&self, handle: &Self::Handle) -> bool {
        self.lock().alive.contains(&handle.process_id)
    }

    fn process_id(&self, handle: &Self::Handle) -> u32 {
        handle.process_id
    }

    fn kill_single_instance_guard(
        &self,
        process_id: u32,
        guard_name: &str,
    ) -> Result<bool, ProcessError> {
        let mut state = self.lock();
        state.guard_kills.push((process_id, guard_name.to_string()));
        Ok(state.alive.contains(&process_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_launcher_records_create_and_tracks_liveness() {
        // Arrange
        let launcher = MockProcessLauncher::new();

        // Act
        let handle = launcher
            .create_suspended(Path::new("C:/Game/DarkSoulsIII.exe"), Path::new("C:/Game"))
            .expect("create");

        // Assert
        assert!(launcher.is_alive(&handle));
        launcher.exit(handle.process_id);
        assert!(!launcher.is_alive(&handle));
        assert_eq!(launcher.inspect(|s| s.created.len()), 1);
    }

    #[test]
    fn test_mock_launcher_injected_create_failure() {
        let launcher = MockProcessLauncher::new();
        launcher.fail_create();

        let result = launcher.create_suspended(Path::new("game.exe"), Path::new("."));

        assert!(matches!(result, Err(ProcessError::CreateFailed { .. })));
        assert!(launcher.inspect(|s| s.created.is_empty()));
    }

    #[test]
    fn test_mock_launcher_injected_resume_failure() {
        let launcher = MockProcessLauncher::new();
        let handle = launcher
            .create_suspended(Path::new("game.exe"), Path::new("."))
            .unwrap();
        launcher.fail_resume();

        let result = launcher.resume(&handle);

        assert!(matches!(result, Err(ProcessError::ResumeFailed { process_id: 1001, .. })));
        assert!(launcher.inspect(|s| s.resumed.is_empty()));
    }

    #[test]
    fn test_mock_launcher_short_write_is_capped_at_length() {
        let launcher = MockProcessLauncher::new();
        let handle = launcher
            .create_suspended(Path::new("game.exe"), Path::new("."))
            .unwrap();

        launcher.short_write(3);
        assert_eq!(launcher.write_memory(&handle, 0x10, &[1, 2, 3, 4]).unwrap(), 3);

        launcher.short_write(100);
        assert_eq!(launcher.write_memory(&handle, 0x10, &[1, 2]).unwrap(), 2);
    }

    #[test]
    fn test_mock_launcher_clones_share_state() {
        let launcher = MockProcessLauncher::new();
        let observer = launcher.clone();

        let handle = launcher
            .create_suspended(Path::new("game.exe"), Path::new("."))
            .unwrap();
        launcher.resume(&handle).unwrap();

        assert_eq!(observer.inspect(|s| s.resumed.clone()), vec![handle.process_id]);
    }
}
