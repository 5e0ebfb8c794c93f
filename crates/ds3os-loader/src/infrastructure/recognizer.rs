//! Executable build recognition.
//!
//! Every supported build of the game reserves the descriptor region at a
//! different address.  Before launching, the loader fingerprints the chosen
//! executable and looks the fingerprint up in a table of known builds; an
//! unknown executable cannot be patched safely and is refused.
//!
//! The fingerprint is the lowercase hex SHA-256 of the whole file.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Where and how much to patch in a recognised executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutableBuild {
    /// Human-readable version shown to the user (e.g. `"1.15.0"`).
    pub version_name: String,
    /// Virtual address of the descriptor region.
    pub patch_address: u64,
    /// Size of the descriptor region in bytes.
    pub descriptor_capacity: usize,
}

/// Identifies the build of a game executable.
#[cfg_attr(test, mockall::automock)]
pub trait ExecutableRecognizer: Send + Sync {
    /// Returns the build of `executable`, or `None` if it is not recognised
    /// or cannot be read.
    fn identify(&self, executable: &Path) -> Option<ExecutableBuild>;
}

/// Recognizer backed by a fingerprint table, usually loaded from config.
#[derive(Debug, Clone, Default)]
pub struct FingerprintRecognizer {
    builds: HashMap<String, ExecutableBuild>,
}

impl FingerprintRecognizer {
    /// Builds a recognizer from `(sha256 hex, build)` pairs.  Fingerprints
    /// are compared case-insensitively.
    pub fn new(builds: impl IntoIterator<Item = (String, ExecutableBuild)>) -> Self {
        Self {
            builds: builds
                .into_iter()
                .map(|(fingerprint, build)| (fingerprint.trim().to_ascii_lowercase(), build))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.builds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builds.is_empty()
    }
}

impl ExecutableRecognizer for FingerprintRecognizer {
    fn identify(&self, executable: &Path) -> Option<ExecutableBuild> {
        let fingerprint = match fingerprint_file(executable) {
            Ok(f) => f,
            Err(e) => {
                warn!(path = %executable.display(), "could not fingerprint executable: {e}");
                return None;
            }
        };
        let build = self.builds.get(&fingerprint).cloned();
        debug!(%fingerprint, recognised = build.is_some(), "fingerprinted executable");
        build
    }
}

/// Lowercase hex SHA-256 of the file at `path`.
///
/// # Errors
///
/// Returns any I/O error from opening or reading the file.
pub fn fingerprint_file(path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
