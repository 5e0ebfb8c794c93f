//! The `ServerEntry` entity and the human-editable import file format.
//!
//! A `ServerEntry` is created in one of two ways:
//!
//! - **Directory refresh** – the master directory returns a list of publicly
//!   advertised servers.  These entries have `manually_imported == false` and
//!   disappear again when a later refresh no longer lists them.
//! - **Manual import** – the user imports a `.ds3osconfig` file handed out by
//!   a server operator.  These entries have `manually_imported == true` and
//!   stay until the user removes them.
//!
//! # Identity vs. transient fields
//!
//! `hostname` is the primary key.  `manually_imported` is fixed at creation
//! and has no setter.  Player count, password flag and display text are
//! *transient* and are overwritten on every refresh via
//! [`ServerEntry::copy_transient_from`].  The addresses an entry was created
//! with (`private_hostname`, `ip_address`) stay as they are.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One known server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    /// Public hostname or IP address.  Unique within a registry.
    pub hostname: String,
    /// Hostname the server is reachable at from inside its own LAN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_hostname: Option<String>,
    /// Public address the master directory knows the server by.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub player_count: u32,
    #[serde(default)]
    pub password_required: bool,
    /// Server public key, cached once fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<Vec<u8>>,
    #[serde(default)]
    manually_imported: bool,
}

impl ServerEntry {
    /// Creates an entry as reported by the master directory.
    pub fn discovered(hostname: impl Into<String>) -> Self {
        Self::with_origin(hostname.into(), false)
    }

    /// Creates an entry imported directly by the user.
    pub fn imported(hostname: impl Into<String>) -> Self {
        Self::with_origin(hostname.into(), true)
    }

    fn with_origin(hostname: String, manually_imported: bool) -> Self {
        Self {
            hostname,
            private_hostname: None,
            ip_address: None,
            display_name: String::new(),
            description: String::new(),
            player_count: 0,
            password_required: false,
            public_key: None,
            manually_imported,
        }
    }

    /// Sets the display name (builder style).
    pub fn named(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Sets the private hostname (builder style).
    pub fn with_private_hostname(mut self, private_hostname: impl Into<String>) -> Self {
        self.private_hostname = Some(private_hostname.into());
        self
    }

    /// Whether this entry was added by the user rather than the directory.
    pub fn manually_imported(&self) -> bool {
        self.manually_imported
    }

    /// Address used when asking the directory for this server's public key.
    pub fn public_address(&self) -> &str {
        self.ip_address.as_deref().unwrap_or(&self.hostname)
    }

    /// Returns the cached public key, treating an empty key as absent.
    pub fn cached_public_key(&self) -> Option<&[u8]> {
        self.public_key.as_deref().filter(|k| !k.is_empty())
    }

    /// Overwrites the transient fields with the values reported in `other`.
    ///
    /// Only display text, player count and the password flag are copied.
    /// Identity and addressing (`hostname`, `private_hostname`, `ip_address`,
    /// `manually_imported`) are never touched.  A cached public key is kept;
    /// `other`'s key is only taken when none is cached yet.
    pub fn copy_transient_from(&mut self, other: &ServerEntry) {
        self.display_name.clone_from(&other.display_name);
        self.description.clone_from(&other.description);
        self.player_count = other.player_count;
        self.password_required = other.password_required;
        if self.cached_public_key().is_none() {
            if let Some(key) = other.cached_public_key() {
                self.public_key = Some(key.to_vec());
            }
        }
    }

    /// Returns the badge the UI shows next to this entry.
    pub fn badge(&self, official_hostname: Option<&str>) -> ServerBadge {
        if official_hostname == Some(self.hostname.as_str()) {
            ServerBadge::Official
        } else if self.password_required {
            ServerBadge::PasswordProtected
        } else if self.manually_imported {
            ServerBadge::ManualImport
        } else {
            ServerBadge::Public
        }
    }
}

/// Icon category for a server in the list view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerBadge {
    Official,
    PasswordProtected,
    ManualImport,
    Public,
}

// ── Import file format ────────────────────────────────────────────────────────

/// Error type for parsing a server import file.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The file content is not valid JSON or has mistyped fields.
    #[error("server config is not in the expected format: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The file parsed but carries no hostname.
    #[error("server config does not specify a hostname")]
    MissingHostname,
}

/// On-disk shape of a `.ds3osconfig` file.
///
/// Keys are PascalCase so files written by server operators' tooling load
/// unchanged.  Unknown keys (e.g. `PlayerCount`) are ignored.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", default)]
struct ImportFile {
    name: String,
    hostname: String,
    private_hostname: String,
    description: String,
    public_key: String,
    ip_address: String,
    password_required: bool,
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parses the JSON content of an import file into a manually imported entry.
///
/// # Errors
///
/// Returns [`ImportError::Malformed`] for invalid JSON and
/// [`ImportError::MissingHostname`] when no hostname is given.
pub fn parse_import(json: &str) -> Result<ServerEntry, ImportError> {
    let file: ImportFile = serde_json::from_str(json)?;
    let hostname = non_empty(file.hostname).ok_or(ImportError::MissingHostname)?;

    let mut entry = ServerEntry::imported(hostname);
    entry.display_name = file.name;
    entry.description = file.description;
    entry.private_hostname = non_empty(file.private_hostname);
    entry.ip_address = non_empty(file.ip_address);
    entry.password_required = file.password_required;
    entry.public_key = non_empty(file.public_key).map(String::into_bytes);
    Ok(entry)
}

/// Serialises an entry back into the import file format.
///
/// # Errors
///
/// Returns [`ImportError::Malformed`] if serialization fails.
pub fn export_import(entry: &ServerEntry) -> Result<String, ImportError> {
    let file = ImportFile {
        name: entry.display_name.clone(),
        hostname: entry.hostname.clone(),
        private_hostname: entry.private_hostname.clone().unwrap_or_default(),
        description: entry.description.clone(),
        public_key: entry
            .cached_public_key()
            .map(|k| String::from_utf8_lossy(k).into_owned())
            .unwrap_or_default(),
        ip_address: entry.ip_address.clone().unwrap_or_default(),
        password_required: entry.password_required,
    };
    Ok(serde_json::to_string_pretty(&file)?)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
