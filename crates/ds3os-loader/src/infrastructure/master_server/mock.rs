//! Mock master directory for unit and integration tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ds3os_core::ServerEntry;

use super::MasterServerClient;

#[derive(Debug, Default)]
struct MockMasterState {
    servers: Option<Vec<ServerEntry>>,
    /// Key per address; `(address, password)` pairs listed in `passwords`
    /// must match for passworded servers.
    keys: HashMap<String, Vec<u8>>,
    passwords: HashMap<String, String>,
    key_requests: Vec<(String, String)>,
    list_requests: usize,
}

/// Canned directory responses.  Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockMasterServer {
    state: Arc<Mutex<MockMasterState>>,
}

impl MockMasterServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the list returned by `list_servers`.  `None` simulates an
    /// unreachable directory.
    pub fn set_servers(&self, servers: Option<Vec<ServerEntry>>) {
        self.lock().servers = servers;
    }

    /// Registers the key served for `address`.
    pub fn with_key(self, address: &str, key: &[u8]) -> Self {
        self.lock().keys.insert(address.to_string(), key.to_vec());
        self
    }

    /// Requires `password` before the key for `address` is served.
    pub fn with_password(self, address: &str, password: &str) -> Self {
        self.lock()
            .passwords
            .insert(address.to_string(), password.to_string());
        self
    }

    /// Every `(address, password)` pair passed to `get_public_key`.
    pub fn key_requests(&self) -> Vec<(String, String)> {
        self.lock().key_requests.clone()
    }

    pub fn list_requests(&self) -> usize {
        self.lock().list_requests
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockMasterState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl MasterServerClient for MockMasterServer {
    async fn list_servers(&self) -> Option<Vec<ServerEntry>> {
        let mut state = self.lock();
        state.list_requests += 1;
        state.servers.clone()
    }

    async fn get_public_key(&self, address: &str, password: &str) -> Option<Vec<u8>> {
        let mut state = self.lock();
        state
            .key_requests
            .push((address.to_string(), password.to_string()));
        if let Some(expected) = state.passwords.get(address) {
            if expected != password {
                return None;
            }
        }
        state.keys.get(address).cloned()
    }
}
