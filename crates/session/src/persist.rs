// SDB - Session Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Session file persistence
//!
//! The file is a small JSON object:
//!
//! ```json
//! {"exe_params": {"exe_path": "/bin/x", "working_dir": "/tmp"}, "source_file_path": "/src/a.c"}
//! ```

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use sdb_common::ExeParams;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Persisted part of a session
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SavedSession {
    /// Executable and working directory
    pub exe_params: ExeParams,
    /// Source file resident in the view
    pub source_file_path: Option<PathBuf>,
}

/// Errors reading or writing the session file
#[derive(Debug, Error)]
pub enum PersistError {
    /// The file could not be read
    #[error("failed to read session file {path}: {source}")]
    Read {
        /// Session file path
        path: PathBuf,
        /// Underlying I/O error
        source: io::Error,
    },
    /// The file is not a valid session
    #[error("failed to parse session file {path}: {source}")]
    Parse {
        /// Session file path
        path: PathBuf,
        /// Underlying JSON error
        source: serde_json::Error,
    },
    /// The session could not be encoded
    #[error("failed to serialize session: {0}")]
    Serialize(#[source] serde_json::Error),
    /// The file could not be written
    #[error("failed to write session file {path}: {source}")]
    Write {
        /// Session file path
        path: PathBuf,
        /// Underlying I/O error
        source: io::Error,
    },
}

/// Read a session file
pub fn load(path: &Path) -> Result<SavedSession, PersistError> {
    let content = fs::read_to_string(path)
        .map_err(|source| PersistError::Read { path: path.to_path_buf(), source })?;
    serde_json::from_str(&content)
        .map_err(|source| PersistError::Parse { path: path.to_path_buf(), source })
}

/// Read a session file, starting blank on any failure
pub fn load_or_default(path: &Path) -> SavedSession {
    load(path).unwrap_or_else(|e| {
        debug!("starting with a blank session: {e}");
        SavedSession::default()
    })
}

/// Overwrite the session file
pub fn store(path: &Path, session: &SavedSession) -> Result<(), PersistError> {
    let content = serde_json::to_string_pretty(session).map_err(PersistError::Serialize)?;
    fs::write(path, content)
        .map_err(|source| PersistError::Write { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_store_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        let saved = SavedSession {
            exe_params: ExeParams::new("/bin/x", "/tmp"),
            source_file_path: Some(PathBuf::from("/src/a.c")),
        };

        store(&path, &saved).unwrap();
        assert_eq!(load(&path).unwrap(), saved);
    }

    #[test]
    fn test_file_shape() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        store(&path, &SavedSession::default()).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "exe_params": {"exe_path": "", "working_dir": ""},
                "source_file_path": null
            })
        );
    }

    #[test]
    fn test_load_failures_fall_back_to_default() {
        let dir = TempDir::new().unwrap();

        let missing = dir.path().join("missing.json");
        assert!(matches!(load(&missing), Err(PersistError::Read { .. })));
        assert_eq!(load_or_default(&missing), SavedSession::default());

        let garbage = dir.path().join("garbage.json");
        fs::write(&garbage, "{not json").unwrap();
        assert!(matches!(load(&garbage), Err(PersistError::Parse { .. })));
        assert_eq!(load_or_default(&garbage), SavedSession::default());
    }

    #[test]
    fn test_store_into_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("no/such/dir/session.json");
        assert!(matches!(store(&path, &SavedSession::default()), Err(PersistError::Write { .. })));
    }
}
