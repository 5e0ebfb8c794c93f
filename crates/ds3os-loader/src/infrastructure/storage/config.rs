//! The loader's settings file.
//!
//! One TOML file holds the game location, network tuning, the list filter,
//! the user's manual imports and the table of recognised game builds.  It
//! lives at `DS3OS\config.toml` under `%APPDATA%` on Windows,
//! `ds3os/config.toml` under `$XDG_CONFIG_HOME` (or `~/.config`) on Linux, and
//! `~/Library/Application Support/DS3OS/config.toml` on macOS.
//!
//! ```toml
//! [loader]
//! exe_location = 'C:\Steam\steamapps\common\DARK SOULS III\Game\DarkSoulsIII.exe'
//! official_hostname = "142.44.247.246"
//!
//! [network]
//! public_ip = "203.0.113.7"        # skips echo lookup when set
//! public_ip_echo_url = ""          # empty turns echo lookup off
//!
//! [filter]
//! hide_passworded = true
//! minimum_players = 1
//!
//! [[builds]]
//! fingerprint = "9e2d...c1"
//! version_name = "1.15.0"
//! patch_address = 5452234752
//! descriptor_capacity = 1024
//! ```
//!
//! A missing file is a first run and yields [`LoaderConfig::default`].  Keys
//! absent from an existing file take the values in [`defaults`].
//!
//! `[[servers]]` holds manual imports only.  The session drops any directory
//! entry it finds there on load.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use ds3os_core::ServerEntry;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::recognizer::ExecutableBuild;

const FILE_NAME: &str = "config.toml";

/// Failure to locate, read or write the settings file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("this platform has no per-user settings directory")]
    NoConfigHome,

    #[error("cannot read loader settings {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write loader settings {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file exists but is not valid loader TOML.
    #[error("loader settings are malformed: {0}")]
    Malformed(#[from] toml::de::Error),

    #[error("loader settings could not be encoded: {0}")]
    Encode(#[from] toml::ser::Error),
}

// ── Schema ────────────────────────────────────────────────────────────────────

/// Everything the loader keeps between runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LoaderConfig {
    #[serde(default)]
    pub loader: LoaderSection,
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub filter: FilterSection,
    #[serde(default)]
    pub servers: Vec<ServerEntry>,
    #[serde(default)]
    pub builds: Vec<BuildEntry>,
}

/// Game and launch settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoaderSection {
    /// Path to `DarkSoulsIII.exe`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exe_location: Option<PathBuf>,
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
    /// Written to `steam_appid.txt` next to the executable.
    #[serde(default = "defaults::steam_app_id")]
    pub steam_app_id: u32,
    /// Kernel object name of the game's single-instance mutex.
    #[serde(default = "defaults::single_instance_guard")]
    pub single_instance_guard: String,
    /// Hostname shown with the official badge and sorted first.
    #[serde(default = "defaults::official_hostname")]
    pub official_hostname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSection {
    /// Public IPv4 address of this machine.  Takes precedence over echo lookup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<Ipv4Addr>,
    /// Plain-text echo service asked for the public address.
    #[serde(default = "defaults::public_ip_echo_url")]
    pub public_ip_echo_url: String,
    #[serde(default = "defaults::public_ip_timeout_secs")]
    pub public_ip_timeout_secs: u64,
    /// Seconds between directory refreshes.
    #[serde(default = "defaults::refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    /// Seconds between checks whether the game is still running.
    #[serde(default = "defaults::liveness_interval_secs")]
    pub liveness_interval_secs: u64,
}

/// Server list filter settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FilterSection {
    #[serde(default)]
    pub hide_passworded: bool,
    #[serde(default)]
    pub minimum_players: u32,
}

/// A recognised executable build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildEntry {
    /// Lowercase hex SHA-256 of the executable.
    pub fingerprint: String,
    pub version_name: String,
    pub patch_address: u64,
    pub descriptor_capacity: usize,
}

impl BuildEntry {
    /// Splits the entry into the recognizer's `(fingerprint, build)` pair.
    pub fn to_recognizer_entry(&self) -> (String, ExecutableBuild) {
        (
            self.fingerprint.clone(),
            ExecutableBuild {
                version_name: self.version_name.clone(),
                patch_address: self.patch_address,
                descriptor_capacity: self.descriptor_capacity,
            },
        )
    }
}

/// Values used for keys missing from the settings file.
pub mod defaults {
    /// Steam app id of Dark Souls III.
    pub const STEAM_APP_ID: u32 = 374_320;
    pub const OFFICIAL_HOSTNAME: &str = "142.44.247.246";
    pub const SINGLE_INSTANCE_GUARD: &str = r"\BaseNamedObjects\DarkSoulsIIIMutex";
    pub const PUBLIC_IP_ECHO_URL: &str = "https://api.ipify.org";

    pub fn log_level() -> String {
        "info".into()
    }
    pub fn steam_app_id() -> u32 {
        STEAM_APP_ID
    }
    pub fn single_instance_guard() -> String {
        SINGLE_INSTANCE_GUARD.into()
    }
    pub fn official_hostname() -> String {
        OFFICIAL_HOSTNAME.into()
    }
    pub fn public_ip_echo_url() -> String {
        PUBLIC_IP_ECHO_URL.into()
    }
    pub fn public_ip_timeout_secs() -> u64 {
        5
    }
    pub fn refresh_interval_secs() -> u64 {
        60
    }
    pub fn liveness_interval_secs() -> u64 {
        1
    }
}

impl Default for LoaderSection {
    fn default() -> Self {
        Self {
            exe_location: None,
            log_level: defaults::log_level(),
            steam_app_id: defaults::steam_app_id(),
            single_instance_guard: defaults::single_instance_guard(),
            official_hostname: defaults::official_hostname(),
        }
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            public_ip: None,
            public_ip_echo_url: defaults::public_ip_echo_url(),
            public_ip_timeout_secs: defaults::public_ip_timeout_secs(),
            refresh_interval_secs: defaults::refresh_interval_secs(),
            liveness_interval_secs: defaults::liveness_interval_secs(),
        }
    }
}

// ── Load and save ─────────────────────────────────────────────────────────────

/// Where the settings file lives for the current user.
///
/// # Errors
///
/// [`ConfigError::NoConfigHome`] when the platform has no settings directory
/// or the environment does not name one.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    config_home()
        .map(|dir| dir.join(FILE_NAME))
        .ok_or(ConfigError::NoConfigHome)
}

/// Reads the settings at `path`.  A file that does not exist yet reads as
/// the defaults.
///
/// # Errors
///
/// [`ConfigError::Read`] when the file exists but cannot be read, and
/// [`ConfigError::Malformed`] when its content is not valid.
pub fn load_config_from(path: &Path) -> Result<LoaderConfig, ConfigError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LoaderConfig::default()),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    Ok(toml::from_str(&text)?)
}

/// Writes `config` to `path`, creating missing parent directories.
///
/// # Errors
///
/// [`ConfigError::Encode`] if the settings cannot be rendered and
/// [`ConfigError::Write`] if the directory or file cannot be written.
pub fn save_config_to(path: &Path, config: &LoaderConfig) -> Result<(), ConfigError> {
    let text = toml::to_string_pretty(config)?;
    let write_error = |at: &Path| {
        let at = at.to_path_buf();
        move |source: std::io::Error| ConfigError::Write { path: at, source }
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(write_error(dir))?;
    }
    std::fs::write(path, text).map_err(write_error(path))
}

fn env_dir(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Per-user directory holding the settings file.
fn config_home() -> Option<PathBuf> {
    if cfg!(target_os = "windows") {
        env_dir("APPDATA").map(|d| d.join("DS3OS"))
    } else if cfg!(target_os = "macos") {
        env_dir("HOME").map(|d| d.join("Library/Application Support/DS3OS"))
    } else if cfg!(unix) {
        env_dir("XDG_CONFIG_HOME")
            .or_else(|| env_dir("HOME").map(|d| d.join(".config")))
            .map(|d| d.join("ds3os"))
    } else {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("ds3os_cfg_{}", Uuid::new_v4()))
            .join("config.toml")
    }

    // ── Defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn test_loader_config_default_values() {
        // Arrange / Act
        let cfg = LoaderConfig::default();

        // Assert
        assert_eq!(cfg.loader.steam_app_id, 374_320);
        assert_eq!(cfg.loader.official_hostname, "142.44.247.246");
        assert_eq!(cfg.loader.single_instance_guard, r"\BaseNamedObjects\DarkSoulsIIIMutex");
        assert_eq!(cfg.loader.log_level, "info");
        assert_eq!(cfg.network.refresh_interval_secs, 60);
        assert_eq!(cfg.network.liveness_interval_secs, 1);
        assert_eq!(cfg.network.public_ip_echo_url, "https://api.ipify.org");
        assert_eq!(cfg.network.public_ip_timeout_secs, 5);
        assert!(cfg.servers.is_empty());
        assert!(cfg.builds.is_empty());
    }

    #[test]
    fn test_deserialize_empty_toml_uses_defaults() {
        let cfg: LoaderConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, LoaderConfig::default());
    }

    #[test]
    fn test_deserialize_partial_section_keeps_other_defaults() {
        // Arrange
        let toml_str = r#"
[network]
public_ip = "203.0.113.7"
[filter]
minimum_players = 3
"#;

        // Act
        let cfg: LoaderConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.network.public_ip, Some(Ipv4Addr::new(203, 0, 113, 7)));
        assert_eq!(cfg.network.refresh_interval_secs, 60);
        assert_eq!(cfg.filter.minimum_players, 3);
        assert!(!cfg.filter.hide_passworded);
    }

    #[test]
    fn test_deserialize_builds_table() {
        let toml_str = r#"
[[builds]]
fingerprint = "abc123"
version_name = "1.15.0"
patch_address = 5452234752
descriptor_capacity = 1024
"#;

        let cfg: LoaderConfig = toml::from_str(toml_str).expect("deserialize builds");

        assert_eq!(cfg.builds.len(), 1);
        assert_eq!(cfg.builds[0].fingerprint, "abc123");
        let (fingerprint, build) = cfg.builds[0].to_recognizer_entry();
        assert_eq!(fingerprint, "abc123");
        assert_eq!(build.patch_address, 5_452_234_752);
        assert_eq!(build.descriptor_capacity, 1024);
    }

    // ── File round-trip ───────────────────────────────────────────────────────

    #[test]
    fn test_load_config_from_missing_file_returns_default() {
        let cfg = load_config_from(&temp_path()).expect("missing file is not an error");
        assert_eq!(cfg, LoaderConfig::default());
    }

    #[test]
    fn test_load_config_from_malformed_file_is_reported_as_malformed() {
        // Arrange
        let path = temp_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[[[ not valid toml").unwrap();

        // Act
        let result = load_config_from(&path);

        // Assert
        assert!(matches!(result, Err(ConfigError::Malformed(_))));
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_save_and_load_config_round_trip() {
        // Arrange
        let path = temp_path();
        let mut cfg = LoaderConfig::default();
        cfg.loader.exe_location = Some(PathBuf::from("C:/Games/DS3/DarkSoulsIII.exe"));
        cfg.filter.hide_passworded = true;
        let mut server = ServerEntry::imported("ds3.example.org").named("Example");
        server.public_key = Some(b"KEY".to_vec());
        cfg.servers.push(server);

        // Act
        save_config_to(&path, &cfg).expect("save");
        let loaded = load_config_from(&path).expect("load");

        // Assert
        assert_eq!(loaded, cfg);
        assert!(loaded.servers[0].manually_imported());
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_empty_echo_url_survives_round_trip() {
        // Arrange
        let path = temp_path();
        let mut cfg = LoaderConfig::default();
        cfg.network.public_ip_echo_url = String::new();

        // Act
        save_config_to(&path, &cfg).expect("save");
        let loaded = load_config_from(&path).expect("load");

        // Assert
        assert!(loaded.network.public_ip_echo_url.is_empty());
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_save_config_to_unwritable_location_is_a_write_error() {
        // Arrange: the parent "directory" is a regular file
        let blocker = std::env::temp_dir().join(format!("ds3os_cfg_file_{}", Uuid::new_v4()));
        std::fs::write(&blocker, b"").unwrap();

        // Act
        let result = save_config_to(&blocker.join("config.toml"), &LoaderConfig::default());

        // Assert
        assert!(matches!(result, Err(ConfigError::Write { .. })));
        std::fs::remove_file(&blocker).ok();
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(path.ends_with("config.toml"), "got {path:?}");
        }
    }
}
