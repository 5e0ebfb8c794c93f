//! LoaderSession: the foreground owner of the server list and the pipeline.
//!
//! Only the session mutates the [`ServerRegistry`].  Slow work (directory
//! refreshes and resolving the selected server's connection hostname) runs
//! on tokio tasks that post a [`BackgroundEvent`] back over a channel; the
//! owner drains the channel and calls [`LoaderSession::apply`].
//!
//! # Tickets
//!
//! Every background request of a kind gets the next ticket number.  Only a
//! completion carrying the latest ticket is applied; anything older was
//! superseded while in flight and is dropped.  A resolution is also dropped
//! if the user has since selected another server.  Superseded tasks are not
//! cancelled, their results are just ignored.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ds3os_core::{
    resolve_connection_hostname, HostLookup, RegistryError, ServerEntry, ServerFilter,
    ServerRegistry, ServerSorter, SortColumn,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::launch::{LaunchError, LaunchOutcome, LaunchPipeline, PasswordPrompt};
use super::ErrorCategory;
use crate::infrastructure::master_server::MasterServerClient;
use crate::infrastructure::process::ProcessLauncher;
use crate::infrastructure::storage::config::{FilterSection, LoaderConfig};
use crate::infrastructure::storage::import::{load_import_file, save_import_file, ImportFileError};

/// Completion of a background request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackgroundEvent {
    DirectoryListed {
        ticket: u64,
        servers: Vec<ServerEntry>,
    },
    AddressResolved {
        ticket: u64,
        hostname: String,
        connection_hostname: String,
    },
}

/// Error type for session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Import(#[from] ImportFileError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error("no server is selected")]
    NoSelection,
}

impl SessionError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SessionError::Launch(e) => e.category(),
            SessionError::Registry(_) | SessionError::Import(_) | SessionError::NoSelection => {
                ErrorCategory::Data
            }
        }
    }
}

pub struct LoaderSession<L: ProcessLauncher> {
    registry: ServerRegistry,
    filter: ServerFilter,
    pipeline: LaunchPipeline<L>,
    master: Arc<dyn MasterServerClient>,
    lookup: Arc<dyn HostLookup>,
    exe_location: Option<PathBuf>,
    selected: Option<String>,
    /// `(hostname, connection hostname)` of the latest applied resolution.
    resolved: Option<(String, String)>,
    refresh_ticket: u64,
    resolve_ticket: u64,
    events_tx: mpsc::UnboundedSender<BackgroundEvent>,
    events_rx: mpsc::UnboundedReceiver<BackgroundEvent>,
}

impl<L: ProcessLauncher> LoaderSession<L> {
    pub fn new(
        registry: ServerRegistry,
        pipeline: LaunchPipeline<L>,
        master: Arc<dyn MasterServerClient>,
        lookup: Arc<dyn HostLookup>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            registry,
            filter: ServerFilter::default(),
            pipeline,
            master,
            lookup,
            exe_location: None,
            selected: None,
            resolved: None,
            refresh_ticket: 0,
            resolve_ticket: 0,
            events_tx,
            events_rx,
        }
    }

    /// Restores a session from persisted configuration.
    ///
    /// Only manual imports are restored; directory entries in the file are
    /// stale by definition and reappear with the next refresh.
    pub fn from_config(
        config: &LoaderConfig,
        pipeline: LaunchPipeline<L>,
        master: Arc<dyn MasterServerClient>,
        lookup: Arc<dyn HostLookup>,
    ) -> Self {
        let sorter = ServerSorter::new(Some(config.loader.official_hostname.clone()));
        let mut registry = ServerRegistry::from_entries(sorter, config.servers.iter().cloned());
        registry.retain_manual();
        info!(servers = registry.len(), "restored manual imports");

        let mut session = Self::new(registry, pipeline, master, lookup);
        session.exe_location = config.loader.exe_location.clone();
        session.filter = ServerFilter {
            search: String::new(),
            hide_passworded: config.filter.hide_passworded,
            minimum_players: config.filter.minimum_players,
        };
        session
    }

    /// Writes the session's persistent state into a copy of `base`.
    pub fn to_config(&self, base: &LoaderConfig) -> LoaderConfig {
        let mut config = base.clone();
        config.loader.exe_location = self.exe_location.clone();
        config.filter = FilterSection {
            hide_passworded: self.filter.hide_passworded,
            minimum_players: self.filter.minimum_players,
        };
        config.servers = self.registry.manual_entries();
        config
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn registry(&self) -> &ServerRegistry {
        &self.registry
    }

    pub fn pipeline(&self) -> &LaunchPipeline<L> {
        &self.pipeline
    }

    pub fn filter(&self) -> &ServerFilter {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: ServerFilter) {
        self.filter = filter;
    }

    pub fn exe_location(&self) -> Option<&Path> {
        self.exe_location.as_deref()
    }

    pub fn set_exe_location(&mut self, path: impl Into<PathBuf>) {
        self.exe_location = Some(path.into());
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Connection hostname of the selected server, once resolved.
    pub fn resolved_connection_hostname(&self) -> Option<&str> {
        match (&self.selected, &self.resolved) {
            (Some(selected), Some((hostname, connection))) if selected == hostname => {
                Some(connection.as_str())
            }
            _ => None,
        }
    }

    /// Entries passing the current filter in the active sort order.
    pub fn visible_servers(&self) -> Vec<&ServerEntry> {
        self.registry.list(|entry| self.filter.matches(entry))
    }

    pub fn cycle_sort(&mut self, column: SortColumn) {
        self.registry.cycle_sort(column);
    }

    // ── Background requests ───────────────────────────────────────────────────

    /// Starts a directory refresh and returns its ticket.
    pub fn request_refresh(&mut self) -> u64 {
        self.refresh_ticket += 1;
        let ticket = self.refresh_ticket;
        let master = Arc::clone(&self.master);
        let tx = self.events_tx.clone();
        debug!(ticket, "requesting directory refresh");

        tokio::spawn(async move {
            match master.list_servers().await {
                Some(servers) => {
                    // The session may already be gone.
                    let _ = tx.send(BackgroundEvent::DirectoryListed { ticket, servers });
                }
                None => warn!(ticket, "master directory did not answer"),
            }
        });
        ticket
    }

    /// Refreshes in the foreground: waits for the directory and applies the
    /// listing immediately.  Supersedes any background refresh in flight.
    ///
    /// Returns `false` if the directory did not answer.
    pub async fn refresh(&mut self) -> bool {
        self.refresh_ticket += 1;
        let ticket = self.refresh_ticket;
        match self.master.list_servers().await {
            Some(servers) => self.apply(BackgroundEvent::DirectoryListed { ticket, servers }),
            None => {
                warn!(ticket, "master directory did not answer");
                false
            }
        }
    }

    /// Selects `hostname` (or clears the selection) and starts resolving its
    /// connection hostname.  Returns the resolution ticket.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownHostname`] if no such entry exists.
    pub fn select(&mut self, hostname: Option<&str>) -> Result<Option<u64>, SessionError> {
        let Some(hostname) = hostname else {
            self.selected = None;
            self.resolve_ticket += 1;
            return Ok(None);
        };
        let entry = self
            .registry
            .get(hostname)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownHostname(hostname.to_string()))?;

        self.selected = Some(entry.hostname.clone());
        self.resolve_ticket += 1;
        let ticket = self.resolve_ticket;
        let lookup = Arc::clone(&self.lookup);
        let machine = self.pipeline.machine_addresses();
        let tx = self.events_tx.clone();

        tokio::spawn(async move {
            let hostname = entry.hostname.clone();
            let resolved = tokio::task::spawn_blocking(move || {
                resolve_connection_hostname(&entry, &machine, lookup.as_ref())
            })
            .await;
            match resolved {
                Ok(connection_hostname) => {
                    let _ = tx.send(BackgroundEvent::AddressResolved {
                        ticket,
                        hostname,
                        connection_hostname,
                    });
                }
                Err(e) => warn!(ticket, %hostname, "address resolution task failed: {e}"),
            }
        });
        Ok(Some(ticket))
    }

    /// Waits for the next background completion.
    pub async fn next_event(&mut self) -> Option<BackgroundEvent> {
        self.events_rx.recv().await
    }

    /// Applies a background completion.  Returns `false` if it was stale.
    pub fn apply(&mut self, event: BackgroundEvent) -> bool {
        match event {
            BackgroundEvent::DirectoryListed { ticket, servers } => {
                if ticket != self.refresh_ticket {
                    debug!(ticket, latest = self.refresh_ticket, "discarding stale directory listing");
                    return false;
                }
                let summary = self.registry.merge(&servers);
                info!(
                    added = summary.added,
                    updated = summary.updated,
                    removed = summary.removed,
                    "server list refreshed"
                );
                if let Some(selected) = &self.selected {
                    if self.registry.get(selected).is_none() {
                        debug!(hostname = %selected, "selected server left the directory");
                        self.selected = None;
                        self.resolved = None;
                    }
                }
                true
            }
            BackgroundEvent::AddressResolved {
                ticket,
                hostname,
                connection_hostname,
            } => {
                if ticket != self.resolve_ticket || self.selected.as_deref() != Some(&hostname) {
                    debug!(ticket, %hostname, "discarding stale address resolution");
                    return false;
                }
                debug!(%hostname, %connection_hostname, "connection hostname resolved");
                self.resolved = Some((hostname, connection_hostname));
                true
            }
        }
    }

    // ── User operations ───────────────────────────────────────────────────────

    /// Imports the server described by the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Import`] if the file cannot be loaded and
    /// [`SessionError::Registry`] if the hostname is already listed.
    pub fn import(&mut self, path: &Path) -> Result<&ServerEntry, SessionError> {
        let entry = load_import_file(path)?;
        let hostname = entry.hostname.clone();
        self.registry.add(entry)?;
        info!(%hostname, "imported server");
        self.registry
            .get(&hostname)
            .ok_or(SessionError::Registry(RegistryError::UnknownHostname(hostname)))
    }

    /// Writes the entry for `hostname` to `path` as an import file.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Registry`] for an unknown hostname and
    /// [`SessionError::Import`] if the file cannot be written.
    pub fn export(&self, hostname: &str, path: &Path) -> Result<(), SessionError> {
        let entry = self
            .registry
            .get(hostname)
            .ok_or_else(|| RegistryError::UnknownHostname(hostname.to_string()))?;
        save_import_file(path, entry)?;
        info!(%hostname, path = %path.display(), "exported server");
        Ok(())
    }

    /// Removes a manually imported server.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Registry`] for unknown or directory entries.
    pub fn remove(&mut self, hostname: &str) -> Result<ServerEntry, SessionError> {
        let removed = self.registry.remove(hostname)?;
        if self.selected.as_deref() == Some(hostname) {
            self.selected = None;
            self.resolved = None;
        }
        info!(%hostname, "removed server");
        Ok(removed)
    }

    /// Launches the game connected to the selected server.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoSelection`] without a selection, otherwise
    /// as [`LoaderSession::launch`].
    pub async fn launch_selected(
        &mut self,
        prompt: &dyn PasswordPrompt,
    ) -> Result<LaunchOutcome, SessionError> {
        let hostname = self.selected.clone().ok_or(SessionError::NoSelection)?;
        self.launch(&hostname, prompt).await
    }

    /// Launches the game connected to `hostname`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Registry`] for an unknown hostname and
    /// [`SessionError::Launch`] for any pipeline failure.
    pub async fn launch(
        &mut self,
        hostname: &str,
        prompt: &dyn PasswordPrompt,
    ) -> Result<LaunchOutcome, SessionError> {
        let executable = self
            .exe_location
            .clone()
            .ok_or(LaunchError::NoExecutableConfigured)?;
        let entry = self
            .registry
            .get_mut(hostname)
            .ok_or_else(|| RegistryError::UnknownHostname(hostname.to_string()))?;
        Ok(self.pipeline.launch(&executable, entry, prompt).await?)
    }

    /// See [`LaunchPipeline::poll_liveness`].
    pub fn poll_liveness(&mut self) -> bool {
        self.pipeline.poll_liveness()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
