//! `ServerRegistry`: the deduplicated, ordered set of known servers.
//!
//! The registry is the single owner of every [`ServerEntry`] the loader
//! knows about.  It is mutated in exactly three ways:
//!
//! - [`ServerRegistry::merge`] applies a master directory response.
//! - [`ServerRegistry::add`] applies a manual import.
//! - [`ServerRegistry::remove`] applies a user's request to forget a manual
//!   import.
//!
//! The registry is a plain value with no interior locking.  The owner (the
//! loader session) applies background results itself, so there is only ever
//! one writer.
//!
//! # Storage choice
//!
//! Entries live in a `Vec` rather than a `HashMap`: directory responses
//! rarely exceed a few hundred servers, and insertion order is what "keep
//! the first occurrence" refers to when deduplicating.

use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, warn};

use super::server::ServerEntry;
use super::sort::{ServerSorter, SortColumn};

/// Error type for registry mutations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A manual import named a hostname that is already known.
    #[error("a server with hostname {0} is already in the list")]
    DuplicateHostname(String),

    /// No entry has the given hostname.
    #[error("no server with hostname {0} is in the list")]
    UnknownHostname(String),

    /// Directory entries can only be removed by a refresh.
    #[error("server {0} comes from the master directory and cannot be removed manually")]
    NotManuallyImported(String),
}

/// What a single [`ServerRegistry::merge`] call changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

/// In-memory registry of known servers.
#[derive(Debug, Clone, Default)]
pub struct ServerRegistry {
    servers: Vec<ServerEntry>,
    sorter: ServerSorter,
}

impl ServerRegistry {
    pub fn new(sorter: ServerSorter) -> Self {
        Self {
            servers: Vec::new(),
            sorter,
        }
    }

    /// Builds a registry from previously persisted entries.
    ///
    /// Later duplicates of a hostname are dropped.
    pub fn from_entries(sorter: ServerSorter, entries: impl IntoIterator<Item = ServerEntry>) -> Self {
        let mut registry = Self::new(sorter);
        registry.servers.extend(entries);
        registry.remove_duplicates();
        registry
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Iterates over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ServerEntry> {
        self.servers.iter()
    }

    pub fn get(&self, hostname: &str) -> Option<&ServerEntry> {
        self.servers.iter().find(|s| s.hostname == hostname)
    }

    pub fn get_mut(&mut self, hostname: &str) -> Option<&mut ServerEntry> {
        self.servers.iter_mut().find(|s| s.hostname == hostname)
    }

    pub fn sorter(&self) -> &ServerSorter {
        &self.sorter
    }

    /// Advances the sort mode as if `column`'s header had been clicked.
    pub fn cycle_sort(&mut self, column: SortColumn) {
        self.sorter.cycle(column);
    }

    /// Applies a master directory response.
    ///
    /// 1. Entries whose hostname is already known get their transient fields
    ///    overwritten; new hostnames are appended.
    /// 2. Duplicate hostnames are collapsed to their first occurrence.
    /// 3. Directory entries missing from `directory_results` are dropped.
    ///    Manual imports are always kept.
    pub fn merge(&mut self, directory_results: &[ServerEntry]) -> MergeSummary {
        let mut summary = MergeSummary::default();

        for incoming in directory_results {
            match self.get_mut(&incoming.hostname) {
                Some(existing) => {
                    existing.copy_transient_from(incoming);
                    summary.updated += 1;
                }
                None => {
                    self.servers.push(incoming.clone());
                    summary.added += 1;
                }
            }
        }

        let before = self.servers.len();
        self.remove_duplicates();

        let listed: HashSet<&str> = directory_results.iter().map(|s| s.hostname.as_str()).collect();
        self.servers
            .retain(|s| s.manually_imported() || listed.contains(s.hostname.as_str()));
        summary.removed = before - self.servers.len();

        debug!(
            added = summary.added,
            updated = summary.updated,
            removed = summary.removed,
            "merged directory response"
        );
        summary
    }

    /// Adds a manually imported entry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateHostname`] if the hostname is
    /// already present; the registry is left unchanged.
    pub fn add(&mut self, entry: ServerEntry) -> Result<(), RegistryError> {
        if self.get(&entry.hostname).is_some() {
            return Err(RegistryError::DuplicateHostname(entry.hostname));
        }
        self.servers.push(entry);
        Ok(())
    }

    /// Removes a manually imported entry and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownHostname`] if nothing matches and
    /// [`RegistryError::NotManuallyImported`] for directory entries.  In both
    /// cases the registry is left unchanged.
    pub fn remove(&mut self, hostname: &str) -> Result<ServerEntry, RegistryError> {
        let Some(index) = self.servers.iter().position(|s| s.hostname == hostname) else {
            warn!(hostname, "remove requested for unknown server");
            return Err(RegistryError::UnknownHostname(hostname.to_string()));
        };
        if !self.servers[index].manually_imported() {
            return Err(RegistryError::NotManuallyImported(hostname.to_string()));
        }
        Ok(self.servers.remove(index))
    }

    /// Stores a freshly fetched public key on the entry.
    ///
    /// Returns `false` when the hostname is unknown.
    pub fn cache_public_key(&mut self, hostname: &str, key: Vec<u8>) -> bool {
        match self.get_mut(hostname) {
            Some(entry) => {
                entry.public_key = Some(key);
                true
            }
            None => false,
        }
    }

    /// Drops every directory entry, keeping only manual imports.
    ///
    /// Used at startup: directory entries restored from settings are stale
    /// until the first refresh completes anyway.
    pub fn retain_manual(&mut self) {
        self.servers.retain(ServerEntry::manually_imported);
    }

    /// Manual imports, in insertion order, for persistence.
    pub fn manual_entries(&self) -> Vec<ServerEntry> {
        self.servers
            .iter()
            .filter(|s| s.manually_imported())
            .cloned()
            .collect()
    }

    /// Returns the entries accepted by `filter`, ordered by the active sort mode.
    pub fn list<F>(&self, filter: F) -> Vec<&ServerEntry>
    where
        F: Fn(&ServerEntry) -> bool,
    {
        let mut visible: Vec<&ServerEntry> = self.servers.iter().filter(|s| filter(s)).collect();
        visible.sort_by(|a, b| self.sorter.compare(a, b));
        visible
    }

    fn remove_duplicates(&mut self) {
        let mut seen = HashSet::new();
        self.servers.retain(|s| seen.insert(s.hostname.clone()));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn listed(host: &str, players: u32) -> ServerEntry {
        let mut e = ServerEntry::discovered(host).named(host);
        e.player_count = players;
        e
    }

    fn hostnames(registry: &ServerRegistry) -> Vec<&str> {
        registry.iter().map(|s| s.hostname.as_str()).collect()
    }

    #[test]
    fn test_registry_starts_empty() {
        let registry = ServerRegistry::default();
        assert!(registry.is_empty());
        assert!(registry.list(|_| true).is_empty());
    }

    #[test]
    fn test_merge_inserts_new_entries_in_order() {
        // Arrange
        let mut registry = ServerRegistry::default();

        // Act
        let summary = registry.merge(&[listed("a", 1), listed("b", 2)]);

        // Assert
        assert_eq!(hostnames(&registry), vec!["a", "b"]);
        assert_eq!(summary, MergeSummary { added: 2, updated: 0, removed: 0 });
    }

    #[test]
    fn test_merge_updates_transient_fields_and_keeps_identity() {
        // Arrange
        let mut registry = ServerRegistry::default();
        registry.add(ServerEntry::imported("a")).unwrap();

        // Act
        let summary = registry.merge(&[listed("a", 33)]);

        // Assert
        let entry = registry.get("a").unwrap();
        assert_eq!(entry.player_count, 33);
        assert!(entry.manually_imported());
        assert_eq!(summary.updated, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_merge_keeps_addressing_of_manual_import() {
        // Arrange: the user's import knows the LAN hostname, the directory does not
        let mut registry = ServerRegistry::default();
        let mut mine = ServerEntry::imported("home.example.org").with_private_hostname("nas.lan");
        mine.ip_address = Some("203.0.113.7".to_string());
        registry.add(mine).unwrap();
        let mut listed = listed("home.example.org", 5);
        listed.description = "Fresh description".to_string();

        // Act
        registry.merge(&[listed]);

        // Assert
        let entry = registry.get("home.example.org").unwrap();
        assert_eq!(entry.private_hostname.as_deref(), Some("nas.lan"));
        assert_eq!(entry.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(entry.player_count, 5);
        assert_eq!(entry.description, "Fresh description");
    }

    #[test]
    fn test_merge_collapses_duplicates_in_input() {
        // Arrange
        let mut registry = ServerRegistry::default();

        // Act
        registry.merge(&[listed("a", 1), listed("a", 9), listed("b", 0)]);

        // Assert: one entry per hostname, later duplicate only refreshed counts
        assert_eq!(hostnames(&registry), vec!["a", "b"]);
        assert_eq!(registry.get("a").unwrap().player_count, 9);
    }

    #[test]
    fn test_merge_evicts_absent_directory_entries() {
        // Arrange
        let mut registry = ServerRegistry::default();
        registry.merge(&[listed("a", 1), listed("b", 1)]);

        // Act
        let summary = registry.merge(&[listed("b", 4)]);

        // Assert
        assert_eq!(hostnames(&registry), vec!["b"]);
        assert_eq!(summary.removed, 1);
    }

    #[test]
    fn test_merge_keeps_absent_manual_imports() {
        let mut registry = ServerRegistry::default();
        registry.add(ServerEntry::imported("mine")).unwrap();

        registry.merge(&[listed("a", 1)]);
        registry.merge(&[]);

        assert_eq!(hostnames(&registry), vec!["mine"]);
    }

    #[test]
    fn test_merge_preserves_cached_public_key() {
        let mut registry = ServerRegistry::default();
        registry.merge(&[listed("a", 1)]);
        assert!(registry.cache_public_key("a", b"key".to_vec()));

        registry.merge(&[listed("a", 2)]);

        assert_eq!(registry.get("a").unwrap().cached_public_key(), Some(&b"key"[..]));
    }

    #[test]
    fn test_from_entries_keeps_first_of_duplicates() {
        let registry = ServerRegistry::from_entries(
            ServerSorter::default(),
            vec![listed("a", 1), listed("a", 2)],
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("a").unwrap().player_count, 1);
    }

    #[test]
    fn test_add_rejects_duplicate_hostname() {
        // Arrange
        let mut registry = ServerRegistry::default();
        registry.merge(&[listed("a", 1)]);

        // Act
        let result = registry.add(ServerEntry::imported("a"));

        // Assert
        assert_eq!(result, Err(RegistryError::DuplicateHostname("a".to_string())));
        assert!(!registry.get("a").unwrap().manually_imported());
    }

    #[test]
    fn test_remove_deletes_manual_entry() {
        let mut registry = ServerRegistry::default();
        registry.add(ServerEntry::imported("mine")).unwrap();

        let removed = registry.remove("mine").unwrap();

        assert_eq!(removed.hostname, "mine");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_reports_unknown_and_directory_entries() {
        let mut registry = ServerRegistry::default();
        registry.merge(&[listed("a", 1)]);

        assert_eq!(
            registry.remove("zzz"),
            Err(RegistryError::UnknownHostname("zzz".to_string()))
        );
        assert_eq!(
            registry.remove("a"),
            Err(RegistryError::NotManuallyImported("a".to_string()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_retain_manual_strips_directory_entries() {
        let mut registry = ServerRegistry::from_entries(
            ServerSorter::default(),
            vec![listed("a", 1), ServerEntry::imported("mine")],
        );

        registry.retain_manual();

        assert_eq!(hostnames(&registry), vec!["mine"]);
        assert_eq!(registry.manual_entries().len(), 1);
    }

    #[test]
    fn test_list_applies_filter_and_sort() {
        // Arrange
        let mut registry = ServerRegistry::default();
        registry.merge(&[listed("quiet", 1), listed("busy", 80), listed("mid", 20)]);

        // Act
        let visible = registry.list(|s| s.player_count >= 10);

        // Assert
        let order: Vec<&str> = visible.iter().map(|s| s.hostname.as_str()).collect();
        assert_eq!(order, vec!["busy", "mid"]);
    }

    #[test]
    fn test_cycle_sort_changes_list_order() {
        let mut registry = ServerRegistry::default();
        registry.merge(&[listed("busy", 80), listed("quiet", 1)]);

        registry.cycle_sort(SortColumn::PlayerCount);

        let order: Vec<&str> = registry.list(|_| true).iter().map(|s| s.hostname.as_str()).collect();
        assert_eq!(order, vec!["quiet", "busy"]);
    }
}
