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

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Parameters used to create a target and launch a process from it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExeParams {
    /// Path to the executable to debug
    pub exe_path: PathBuf,
    /// Working directory of the launched process
    pub working_dir: PathBuf,
}

impl ExeParams {
    /// Create launch parameters from an executable path and working directory.
    pub fn new(exe_path: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self { exe_path: exe_path.into(), working_dir: working_dir.into() }
    }

    /// Whether an executable has been chosen at all.
    pub fn has_exe(&self) -> bool {
        !self.exe_path.as_os_str().is_empty()
    }

    /// The directory the process should start in.
    ///
    /// Falls back to the executable's directory when no working directory was given.
    pub fn effective_working_dir(&self) -> &Path {
        if self.working_dir.as_os_str().is_empty() {
            self.exe_path.parent().unwrap_or_else(|| Path::new(""))
        } else {
            &self.working_dir
        }
    }
}
