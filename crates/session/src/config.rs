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

//! Controller settings
//!
//! Stored as TOML in `~/.sdb.toml`. Missing keys take their defaults.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Main settings structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Milliseconds between two reconciliation passes
    pub tick_interval_ms: u64,
    /// Worker threads used for symbol enumeration
    pub symbol_workers: usize,
    /// Maximum bytes per stdout/stderr read of the output reader
    pub output_chunk_size: usize,
    /// Where the session is persisted
    pub session_file: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        let session_file = std::env::current_dir()
            .map(|dir| dir.join(Self::SESSION_FILE_NAME))
            .unwrap_or_else(|_| PathBuf::from(Self::SESSION_FILE_NAME));

        Self { tick_interval_ms: 16, symbol_workers: 3, output_chunk_size: 1024, session_file }
    }
}

impl Settings {
    /// File name of the session file in the working directory
    pub const SESSION_FILE_NAME: &'static str = "sdb_session.json";

    /// Get the settings file path (~/.sdb.toml)
    pub fn config_path() -> Result<PathBuf> {
        let home =
            dirs::home_dir().ok_or_else(|| eyre::eyre!("Unable to determine home directory"))?;
        Ok(home.join(".sdb.toml"))
    }

    /// Load settings from file, creating the default file if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            info!("Settings file not found, creating default at {:?}", config_path);
            let default_settings = Self::default();
            default_settings.save_to_path(&config_path)?;
            return Ok(default_settings);
        }

        Self::load_from_path(&config_path)
    }

    /// Load settings from an explicit file
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {path:?}"))?;

        let settings: Self =
            toml::from_str(&content).with_context(|| "Failed to parse settings file as TOML")?;

        debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to ~/.sdb.toml
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_path()?)
    }

    /// Save settings to an explicit file
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize settings to TOML")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write settings file: {path:?}"))?;

        debug!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Tick period, never zero
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}
