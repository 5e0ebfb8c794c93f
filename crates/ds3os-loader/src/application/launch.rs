//! LaunchPipeline: starts the game pointed at a chosen server.
//!
//! The pipeline is a small state machine:
//!
//! ```text
//! Idle → ResolvingKey → Resolved → Encoding → ProcessCreated → Patched → Running
//!   └──────────────────────────── Failed(reason) ────────────────────────────┘
//! ```
//!
//! Before any of that, the executable is checked: it must exist and be a
//! build the [`ExecutableRecognizer`] knows, because the patch address and
//! descriptor capacity are build-specific.
//!
//! Once a process has been created, a failure to resume it terminates the
//! process again; a suspended game would otherwise linger forever.  An
//! incomplete memory write is only a warning: the game may still work.
//!
//! # Architecture
//!
//! Every collaborator is injected: the [`ProcessLauncher`] as a type
//! parameter (its handle type is platform-specific), the directory, the
//! recognizer and name resolution as shared trait objects.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use ds3os_core::{
    resolve_connection_hostname, DescriptorCodec, DescriptorError, HostLookup, MachineAddresses,
    ServerEntry,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::ErrorCategory;
use crate::infrastructure::master_server::MasterServerClient;
use crate::infrastructure::process::{ProcessError, ProcessLauncher};
use crate::infrastructure::recognizer::{ExecutableBuild, ExecutableRecognizer};

/// File Steam reads to learn which app a directly started executable is.
pub const STEAM_APP_ID_FILE: &str = "steam_appid.txt";

// ── Types ─────────────────────────────────────────────────────────────────────

/// Where the pipeline currently is.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LaunchStage {
    #[default]
    Idle,
    ResolvingKey,
    Resolved,
    Encoding,
    ProcessCreated,
    Patched,
    Running,
    Failed(String),
}

/// Error type for the launch use case.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("no game executable is configured")]
    NoExecutableConfigured,

    #[error("game executable {0} does not exist")]
    ExecutableMissing(PathBuf),

    #[error("executable {0} is not a recognised version")]
    ExecutableUnrecognized(PathBuf),

    #[error("password entry for {hostname} was cancelled")]
    KeyEntryCancelled { hostname: String },

    #[error("could not retrieve the public key for {hostname}")]
    KeyUnavailable { hostname: String },

    #[error("address resolution task failed: {0}")]
    ResolutionFailed(String),

    #[error(
        "server information needs {needed} bytes but only {capacity} fit into the executable"
    )]
    DescriptorTooLarge { needed: usize, capacity: usize },

    #[error("failed to encode server information: {0}")]
    Encoding(#[source] DescriptorError),

    #[error("failed to launch the game: {0}")]
    ProcessCreateFailed(#[source] ProcessError),

    #[error("failed to start the game after patching: {0}")]
    ResumeFailed(#[source] ProcessError),
}

impl LaunchError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            LaunchError::NoExecutableConfigured
            | LaunchError::ExecutableMissing(_)
            | LaunchError::ExecutableUnrecognized(_) => ErrorCategory::Configuration,
            LaunchError::KeyEntryCancelled { .. }
            | LaunchError::KeyUnavailable { .. }
            | LaunchError::ResolutionFailed(_) => ErrorCategory::Network,
            LaunchError::DescriptorTooLarge { .. } | LaunchError::Encoding(_) => {
                ErrorCategory::Encoding
            }
            LaunchError::ProcessCreateFailed(_) | LaunchError::ResumeFailed(_) => {
                ErrorCategory::Process
            }
        }
    }
}

/// Problems that did not stop the launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchWarning {
    /// Fewer descriptor bytes reached the process than were sent.  The game
    /// may or may not connect.
    PatchIncomplete { written: usize, expected: usize },
}

/// Result of a successful launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOutcome {
    pub process_id: u32,
    pub connection_hostname: String,
    pub version_name: String,
    pub warnings: Vec<LaunchWarning>,
}

/// Launch settings taken from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSettings {
    pub steam_app_id: u32,
    /// Kernel object name of the game's single-instance mutex.
    pub single_instance_guard: String,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            steam_app_id: 374_320,
            single_instance_guard: r"\BaseNamedObjects\DarkSoulsIIIMutex".to_string(),
        }
    }
}

/// Asks the user for a server password.
///
/// Implementations return `None` when the user cancels.
#[async_trait]
pub trait PasswordPrompt: Send + Sync {
    async fn request_password(&self, entry: &ServerEntry) -> Option<String>;
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// Orchestrates a single launch and tracks the running game.
pub struct LaunchPipeline<L: ProcessLauncher> {
    launcher: L,
    master: Arc<dyn MasterServerClient>,
    recognizer: Arc<dyn ExecutableRecognizer>,
    lookup: Arc<dyn HostLookup>,
    codec: DescriptorCodec,
    machine: MachineAddresses,
    settings: LaunchSettings,
    stage: LaunchStage,
    running: Option<L::Handle>,
}

impl<L: ProcessLauncher> LaunchPipeline<L> {
    pub fn new(
        launcher: L,
        master: Arc<dyn MasterServerClient>,
        recognizer: Arc<dyn ExecutableRecognizer>,
        lookup: Arc<dyn HostLookup>,
    ) -> Self {
        Self {
            launcher,
            master,
            recognizer,
            lookup,
            codec: DescriptorCodec::default(),
            machine: MachineAddresses::default(),
            settings: LaunchSettings::default(),
            stage: LaunchStage::Idle,
            running: None,
        }
    }

    /// Sets this machine's addresses, computed once at startup.
    pub fn with_machine_addresses(mut self, machine: MachineAddresses) -> Self {
        self.machine = machine;
        self
    }

    pub fn with_settings(mut self, settings: LaunchSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn stage(&self) -> &LaunchStage {
        &self.stage
    }

    pub fn machine_addresses(&self) -> MachineAddresses {
        self.machine
    }

    /// Process id of the tracked game, if one is running.
    pub fn running_process_id(&self) -> Option<u32> {
        self.running.as_ref().map(|h| self.launcher.process_id(h))
    }

    /// Checks that `executable` exists and is a recognised build.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::ExecutableMissing`] or
    /// [`LaunchError::ExecutableUnrecognized`].
    pub fn identify_executable(&self, executable: &Path) -> Result<ExecutableBuild, LaunchError> {
        if !executable.is_file() {
            return Err(LaunchError::ExecutableMissing(executable.to_path_buf()));
        }
        self.recognizer
            .identify(executable)
            .ok_or_else(|| LaunchError::ExecutableUnrecognized(executable.to_path_buf()))
    }

    /// Launches `executable` connected to `entry`.
    ///
    /// A key fetched from the directory is cached on `entry` even if a later
    /// stage fails.
    ///
    /// # Errors
    ///
    /// Returns the [`LaunchError`] of the first failing stage; the stage is
    /// then [`LaunchStage::Failed`].  No process exists after a failure.
    pub async fn launch(
        &mut self,
        executable: &Path,
        entry: &mut ServerEntry,
        prompt: &dyn PasswordPrompt,
    ) -> Result<LaunchOutcome, LaunchError> {
        info!(hostname = %entry.hostname, exe = %executable.display(), "launching");
        match self.run(executable, entry, prompt).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(hostname = %entry.hostname, "launch failed: {e}");
                self.stage = LaunchStage::Failed(e.to_string());
                Err(e)
            }
        }
    }

    async fn run(
        &mut self,
        executable: &Path,
        entry: &mut ServerEntry,
        prompt: &dyn PasswordPrompt,
    ) -> Result<LaunchOutcome, LaunchError> {
        let build = self.identify_executable(executable)?;
        debug!(version = %build.version_name, "executable recognised");

        self.stage = LaunchStage::ResolvingKey;
        let public_key = self.resolve_key(entry, prompt).await?;

        let connection_hostname = self.resolve_hostname(entry).await?;
        self.stage = LaunchStage::Resolved;
        debug!(%connection_hostname, "connection hostname resolved");

        self.stage = LaunchStage::Encoding;
        let descriptor = self
            .codec
            .encode(&connection_hostname, &public_key, build.descriptor_capacity)
            .map_err(|e| match e {
                DescriptorError::TooLarge { needed, capacity } => {
                    LaunchError::DescriptorTooLarge { needed, capacity }
                }
                other => LaunchError::Encoding(other),
            })?;

        self.close_running_guard();

        let working_dir = executable.parent().unwrap_or_else(|| Path::new("."));
        ensure_steam_app_id(working_dir, self.settings.steam_app_id);

        let handle = self
            .launcher
            .create_suspended(executable, working_dir)
            .map_err(LaunchError::ProcessCreateFailed)?;
        let process_id = self.launcher.process_id(&handle);
        self.stage = LaunchStage::ProcessCreated;

        let mut warnings = Vec::new();
        let written = match self
            .launcher
            .write_memory(&handle, build.patch_address, &descriptor)
        {
            Ok(n) => n,
            Err(e) => {
                warn!(process_id, "descriptor write failed: {e}");
                0
            }
        };
        if written != descriptor.len() {
            warn!(process_id, written, expected = descriptor.len(), "patch incomplete");
            warnings.push(LaunchWarning::PatchIncomplete {
                written,
                expected: descriptor.len(),
            });
        }
        self.stage = LaunchStage::Patched;

        if let Err(e) = self.launcher.resume(&handle) {
            if let Err(term) = self.launcher.terminate(&handle) {
                warn!(process_id, "could not terminate suspended process: {term}");
            }
            return Err(LaunchError::ResumeFailed(e));
        }

        // Replacing the handle drops any previous one.
        self.running = Some(handle);
        self.stage = LaunchStage::Running;
        info!(process_id, %connection_hostname, "game running");

        Ok(LaunchOutcome {
            process_id,
            connection_hostname,
            version_name: build.version_name,
            warnings,
        })
    }

    async fn resolve_key(
        &self,
        entry: &mut ServerEntry,
        prompt: &dyn PasswordPrompt,
    ) -> Result<Vec<u8>, LaunchError> {
        if let Some(key) = entry.cached_public_key() {
            return Ok(key.to_vec());
        }

        let password = if entry.password_required {
            prompt
                .request_password(entry)
                .await
                .ok_or_else(|| LaunchError::KeyEntryCancelled {
                    hostname: entry.hostname.clone(),
                })?
        } else {
            String::new()
        };

        let key = self
            .master
            .get_public_key(entry.public_address(), &password)
            .await
            .filter(|k| !k.is_empty())
            .ok_or_else(|| LaunchError::KeyUnavailable {
                hostname: entry.hostname.clone(),
            })?;

        entry.public_key = Some(key.clone());
        Ok(key)
    }

    async fn resolve_hostname(&self, entry: &ServerEntry) -> Result<String, LaunchError> {
        let lookup = Arc::clone(&self.lookup);
        let machine = self.machine;
        let snapshot = entry.clone();
        tokio::task::spawn_blocking(move || {
            resolve_connection_hostname(&snapshot, &machine, lookup.as_ref())
        })
        .await
        .map_err(|e| LaunchError::ResolutionFailed(e.to_string()))
    }

    /// Best-effort: a game started by us that is still running holds the
    /// single-instance mutex and would make the new copy exit immediately.
    fn close_running_guard(&self) {
        let Some(handle) = self.running.as_ref() else {
            return;
        };
        if !self.launcher.is_alive(handle) {
            return;
        }
        let process_id = self.launcher.process_id(handle);
        match self
            .launcher
            .kill_single_instance_guard(process_id, &self.settings.single_instance_guard)
        {
            Ok(true) => info!(process_id, "closed single-instance guard of running game"),
            Ok(false) => debug!(process_id, "running game holds no single-instance guard"),
            Err(e) => warn!(process_id, "could not close single-instance guard: {e}"),
        }
    }

    /// Releases the tracked process once it has exited.
    ///
    /// Returns `true` while the game is still running.
    pub fn poll_liveness(&mut self) -> bool {
        let Some(handle) = self.running.as_ref() else {
            return false;
        };
        if self.launcher.is_alive(handle) {
            return true;
        }
        let process_id = self.launcher.process_id(handle);
        self.running = None;
        self.stage = LaunchStage::Idle;
        info!(process_id, "game exited");
        false
    }
}

fn ensure_steam_app_id(dir: &Path, app_id: u32) {
    let path = dir.join(STEAM_APP_ID_FILE);
    if path.exists() {
        return;
    }
    match std::fs::write(&path, app_id.to_string()) {
        Ok(()) => debug!(path = %path.display(), "wrote steam app id"),
        Err(e) => warn!(path = %path.display(), "could not write steam app id: {e}"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
