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

//! Session state aggregate
//!
//! One [`Session`] holds everything the controller knows. It is mutated only
//! by the reconciler (and by the front-end writing [`Intents`]), and read by
//! the view between ticks.

use std::{
    collections::HashSet,
    fs, io,
    path::{Path, PathBuf},
    thread::JoinHandle,
};

use sdb_common::{ExeParams, Loc};
use sdb_engine::{FrameInfo, ProcessId, ProcessStatus, TargetId, VarId};
use tracing::{debug, warn};

use crate::{
    breakpoints::BreakpointRegistry,
    intent::Intents,
    output::OutputBuffer,
    persist::SavedSession,
    symbols::PendingIndex,
    variables::{FrameKey, VarState},
};

/// The source file shown in the view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// File path
    pub path: PathBuf,
    /// Full text
    pub text: String,
    /// Line the view should scroll to once, then forget
    pub scroll_to_line: Option<u32>,
}

impl SourceFile {
    /// Read a file from disk
    pub fn read(path: &Path) -> io::Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(Self { path: path.to_path_buf(), text, scroll_to_line: None })
    }

    /// Consume the pending scroll request
    pub fn take_scroll(&mut self) -> Option<u32> {
        self.scroll_to_line.take()
    }
}

/// The loaded target and its symbol index
#[derive(Debug)]
pub struct TargetState {
    /// Engine handle
    pub id: TargetId,
    /// Symbol index, possibly still loading
    pub index: PendingIndex,
}

/// The live process
#[derive(Debug)]
pub struct ProcessState {
    /// Engine handle
    pub id: ProcessId,
    /// Status seen by the last probe
    pub status: ProcessStatus,
    /// Call stack of the selected thread at the current stop
    pub frames: Vec<FrameInfo>,
    /// Index into `frames` of the frame being inspected
    pub selected_frame: usize,
    /// Current stop location; only set while stopped
    pub highlight_loc: Option<Loc>,
    /// Whether the current stop has been processed
    pub(crate) stop_seen: bool,
    /// Expansion set of the inspected frame while the process runs
    pub(crate) kept_expansion: Option<(FrameKey, HashSet<VarId>)>,
    /// Output reader thread; it exits on its own once the process dies
    pub(crate) reader: Option<JoinHandle<()>>,
}

impl ProcessState {
    /// State of a freshly launched process
    pub fn new(id: ProcessId) -> Self {
        Self {
            id,
            status: ProcessStatus::Running,
            frames: Vec::new(),
            selected_frame: 0,
            highlight_loc: None,
            stop_seen: false,
            kept_expansion: None,
            reader: None,
        }
    }

    /// Whether the last probe saw the process stopped
    pub fn is_stopped(&self) -> bool {
        self.status == ProcessStatus::Stopped
    }

    /// The frame being inspected
    pub fn current_frame(&self) -> Option<&FrameInfo> {
        self.frames.get(self.selected_frame)
    }

    /// Forget the current stop
    pub(crate) fn clear_stop(&mut self) {
        self.frames.clear();
        self.selected_frame = 0;
        self.highlight_loc = None;
        self.stop_seen = false;
    }
}

/// Everything the controller tracks for one debugging session
#[derive(Debug, Default)]
pub struct Session {
    /// Executable of the current (or next) target
    pub exe_params: ExeParams,
    /// Loaded target
    pub target: Option<TargetState>,
    /// Breakpoints by location
    pub breakpoints: BreakpointRegistry,
    /// Live process
    pub process: Option<ProcessState>,
    /// Variables of the inspected frame
    pub vars: Option<VarState>,
    /// Resident source file
    pub source: Option<SourceFile>,
    /// Output of the current (or last) process
    pub output: OutputBuffer,
    /// Requests pending for the next tick
    pub intents: Intents,
    /// Symbol name filter
    pub symbol_search: String,
}

impl Session {
    /// Create a blank session
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a session from its persisted part.
    ///
    /// A source file that can no longer be read is skipped.
    pub fn restore(saved: SavedSession) -> Self {
        let source = saved.source_file_path.and_then(|path| match SourceFile::read(&path) {
            Ok(file) => Some(file),
            Err(e) => {
                debug!(path = %path.display(), "saved source file not restored: {e}");
                None
            }
        });

        Self { exe_params: saved.exe_params, source, ..Self::default() }
    }

    /// The persisted part of this session
    pub fn to_saved(&self) -> SavedSession {
        SavedSession {
            exe_params: self.exe_params.clone(),
            source_file_path: self.source.as_ref().map(|file| file.path.clone()),
        }
    }

    /// Make `loc` visible: load its file if another one is resident, then
    /// request a scroll to its line.
    ///
    /// The resident file is kept when the new one cannot be read.
    pub fn show(&mut self, loc: &Loc) {
        if let Some(file) = self.source.as_mut().filter(|file| file.path == loc.path) {
            file.scroll_to_line = Some(loc.line);
            return;
        }

        match SourceFile::read(&loc.path) {
            Ok(mut file) => {
                debug!(%loc, bytes = file.text.len(), "source file loaded");
                file.scroll_to_line = Some(loc.line);
                self.source = Some(file);
            }
            Err(e) => {
                warn!(path = %loc.path.display(), "failed to read source file: {e}");
            }
        }
    }

    /// Whether a process is resident
    pub fn has_process(&self) -> bool {
        self.process.is_some()
    }
}
