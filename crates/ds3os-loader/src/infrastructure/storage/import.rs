//! Reading and writing server import files.
//!
//! Parsing lives in `ds3os_core::parse_import` and `export_import`; this
//! adapter only adds the file system and reports a missing file separately
//! from a bad one.

use std::path::{Path, PathBuf};

use ds3os_core::{export_import, parse_import, ImportError, ServerEntry};
use thiserror::Error;

/// Error type for reading an import file.
#[derive(Debug, Error)]
pub enum ImportFileError {
    #[error("import file {0} does not exist")]
    NotFound(PathBuf),

    #[error("I/O error reading import file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not write import file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file was read but its content is not a valid server config.
    #[error("invalid import file {path}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: ImportError,
    },
}

/// Reads and parses the import file at `path` into a manually imported entry.
///
/// # Errors
///
/// Returns [`ImportFileError::NotFound`] when the file is missing,
/// [`ImportFileError::Io`] for other read failures, and
/// [`ImportFileError::Invalid`] for malformed content or a missing hostname.
pub fn load_import_file(path: &Path) -> Result<ServerEntry, ImportFileError> {
    let content = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ImportFileError::NotFound(path.to_path_buf())
        } else {
            ImportFileError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    parse_import(&content).map_err(|source| ImportFileError::Invalid {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes `entry` to `path` in the import file format.
///
/// The cached public key travels with the entry, so the receiving loader
/// does not need to fetch it.
///
/// # Errors
///
/// Returns [`ImportFileError::Write`] if the file cannot be written.
pub fn save_import_file(path: &Path, entry: &ServerEntry) -> Result<(), ImportFileError> {
    let content = export_import(entry).map_err(|source| ImportFileError::Invalid {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, content).map_err(|source| ImportFileError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn write_temp(content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("ds3os_import_{}.ds3osconfig", Uuid::new_v4()));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_import_file_parses_valid_file() {
        // Arrange
        let path = write_temp(
            r#"{"Name":"Example","Hostname":"ds3.example.org","PrivateHostname":"192.168.1.20","PasswordRequired":true}"#,
        );

        // Act
        let entry = load_import_file(&path).expect("valid import");

        // Assert
        assert_eq!(entry.hostname, "ds3.example.org");
        assert_eq!(entry.private_hostname.as_deref(), Some("192.168.1.20"));
        assert!(entry.password_required);
        assert!(entry.manually_imported());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_saved_import_file_loads_back_with_key() {
        // Arrange
        let path = std::env::temp_dir().join(format!("ds3os_export_{}.ds3osconfig", Uuid::new_v4()));
        let mut entry = ServerEntry::imported("ds3.example.org").named("Example");
        entry.private_hostname = Some("nas.lan".to_string());
        entry.public_key = Some(b"-----BEGIN RSA PUBLIC KEY-----".to_vec());

        // Act
        save_import_file(&path, &entry).expect("save");
        let loaded = load_import_file(&path).expect("load");

        // Assert
        assert_eq!(loaded.hostname, "ds3.example.org");
        assert_eq!(loaded.display_name, "Example");
        assert_eq!(loaded.private_hostname.as_deref(), Some("nas.lan"));
        assert_eq!(loaded.cached_public_key(), entry.cached_public_key());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_save_import_file_reports_unwritable_path() {
        let entry = ServerEntry::imported("ds3.example.org");

        let result = save_import_file(Path::new("/no/such/dir/server.ds3osconfig"), &entry);

        assert!(matches!(result, Err(ImportFileError::Write { .. })));
    }

    #[test]
    fn test_load_import_file_reports_missing_file() {
        let result = load_import_file(Path::new("/no/such/server.ds3osconfig"));
        assert!(matches!(result, Err(ImportFileError::NotFound(_))));
    }

    #[test]
    fn test_load_import_file_reports_malformed_content() {
        let path = write_temp("this is not json");

        let result = load_import_file(&path);

        assert!(matches!(
            result,
            Err(ImportFileError::Invalid {
                source: ImportError::Malformed(_),
                ..
            })
        ));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_import_file_reports_missing_hostname() {
        let path = write_temp(r#"{"Name":"No host"}"#);

        let result = load_import_file(&path);

        assert!(matches!(
            result,
            Err(ImportFileError::Invalid {
                source: ImportError::MissingHostname,
                ..
            })
        ));
        std::fs::remove_file(&path).ok();
    }
}
