//! Master directory client seam.
//!
//! The master directory is the community service that lists public servers
//! and hands out each server's public key.  The loader only needs two
//! requests from it, captured by [`MasterServerClient`].
//!
//! Failures are not errors at this level: an unreachable directory simply
//! means "no new information", which callers treat as no update.
//!
//! - [`mock::MockMasterServer`] returns canned lists and keys and records
//!   every key request.
//! - [`OfflineMasterServer`] never answers.  The binary uses it until a
//!   directory client is configured, so only manual imports with a cached
//!   key can be launched.

use async_trait::async_trait;
use ds3os_core::ServerEntry;

pub mod mock;

/// Async access to the master directory.
#[async_trait]
pub trait MasterServerClient: Send + Sync {
    /// Returns the current public server list, or `None` if the directory
    /// could not be reached.
    async fn list_servers(&self) -> Option<Vec<ServerEntry>>;

    /// Fetches the public key of the server at `address`.
    ///
    /// `password` is empty for servers that do not require one.  `None` or an
    /// empty key both mean the key is unavailable.
    async fn get_public_key(&self, address: &str, password: &str) -> Option<Vec<u8>>;
}

/// Directory client that is never reachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineMasterServer;

#[async_trait]
impl MasterServerClient for OfflineMasterServer {
    async fn list_servers(&self) -> Option<Vec<ServerEntry>> {
        None
    }

    async fn get_public_key(&self, _address: &str, _password: &str) -> Option<Vec<u8>> {
        None
    }
}
