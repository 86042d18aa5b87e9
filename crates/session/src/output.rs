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

//! Process output capture
//!
//! Each launched process gets one reader thread that drains its stdout and
//! stderr into an [`OutputBuffer`]. The reader has no cancellation: it exits
//! when both streams report EOF, which happens when the process dies.

use std::{
    borrow::Cow,
    sync::{Arc, OnceLock},
    thread::JoinHandle,
};

use eyre::{Result, WrapErr};
use parking_lot::Mutex;
use regex::Regex;
use sdb_engine::{ProcessId, ProcessOutput};
use tracing::{debug, trace};

/// CSI sequences (colors, cursor movement) and OSC sequences ended by BEL or ST
static ANSI_PATTERN: OnceLock<Regex> = OnceLock::new();

fn ansi_regex() -> &'static Regex {
    ANSI_PATTERN.get_or_init(|| {
        Regex::new(r"\x1B\[[0-?]*[ -/]*[@-~]|\x1B\][^\x07\x1B]*(?:\x07|\x1B\\)")
            .expect("ANSI pattern is a valid regex")
    })
}

/// Remove terminal control sequences from process output
pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    ansi_regex().replace_all(text, "")
}

/// Shared, append-only byte buffer of one process's output.
///
/// Clones share the same storage. The lock is held only for a single append
/// or snapshot.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl OutputBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk
    pub fn append(&self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }
        self.bytes.lock().extend_from_slice(chunk);
    }

    /// Copy of the raw bytes captured so far
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }

    /// Captured bytes so far
    pub fn len(&self) -> usize {
        self.bytes.lock().len()
    }

    /// Whether nothing has been captured yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Display text: lossy UTF-8 with control sequences stripped
    pub fn text(&self) -> String {
        let raw = self.snapshot();
        strip_ansi(&String::from_utf8_lossy(&raw)).into_owned()
    }
}

/// Start the reader thread for a process.
///
/// Every round reads up to `chunk_size` bytes from stdout, then from stderr,
/// and appends them in that order.
pub fn spawn_reader(
    process: ProcessId,
    source: Arc<dyn ProcessOutput>,
    buffer: OutputBuffer,
    chunk_size: usize,
) -> Result<JoinHandle<()>> {
    let chunk_size = chunk_size.max(1);

    std::thread::Builder::new()
        .name(format!("sdb-output-{}", process.0))
        .spawn(move || {
            debug!(%process, "output reader started");
            loop {
                let out = source.read_stdout(chunk_size);
                buffer.append(&out);
                let err = source.read_stderr(chunk_size);
                buffer.append(&err);

                trace!(%process, stdout = out.len(), stderr = err.len(), "output chunk");
                if out.is_empty() && err.is_empty() {
                    break;
                }
            }
            debug!(%process, total = buffer.len(), "output reader finished");
        })
        .wrap_err("Failed to spawn output reader thread")
}
