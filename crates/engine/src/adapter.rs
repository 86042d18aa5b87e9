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

//! Capability traits implemented by a native debugging engine binding.

use std::{fmt::Display, sync::Arc};

use auto_impl::auto_impl;
use sdb_common::{ExeParams, Loc};

use crate::{BreakpointId, EngineError, FrameId, ProcessId, TargetId, ThreadId};

/// Result type for engine calls
pub type EngineResult<T> = Result<T, EngineError>;

/// Execution state of a process as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessStatus {
    /// Stopped at a breakpoint, after a step, or on a signal
    Stopped,
    /// Running freely
    Running,
    /// Exited with the given status code
    Exited(i32),
    /// Detached from the debugger
    Detached,
    /// The process object no longer refers to anything
    Unloaded,
}

impl ProcessStatus {
    /// Whether the process is gone and its handle must not be used again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exited(_) | Self::Detached | Self::Unloaded)
    }

    /// Short human readable name, used in logs and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Exited(_) => "exited",
            Self::Detached => "detached",
            Self::Unloaded => "unloaded",
        }
    }
}

/// One entry of a module symbol table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSymbol {
    /// Start address in the module's file address space
    pub address: u64,
    /// Symbol name
    pub name: String,
    /// Source location of the start address, if the line table has one
    pub loc: Option<Loc>,
}

impl RawSymbol {
    /// Create a new raw symbol
    pub fn new(address: u64, name: impl Into<String>, loc: Option<Loc>) -> Self {
        Self { address, name: name.into(), loc }
    }
}

/// Scope-qualified identity of a variable within one frame.
///
/// Two variables of the same frame may share a display name when they live in
/// different lexical blocks; `scope` tells them apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId {
    /// Lexical block the variable is declared in (0 = function scope)
    pub scope: u32,
    /// Declared name
    pub name: String,
}

impl VarId {
    /// Create a new variable identity
    pub fn new(scope: u32, name: impl Into<String>) -> Self {
        Self { scope, name: name.into() }
    }
}

impl Display for VarId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.scope)
    }
}

/// Description of a local or argument of a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableDesc {
    /// Stable identity used as the cache key
    pub id: VarId,
    /// Declared type, if known
    pub type_name: Option<String>,
}

impl VariableDesc {
    /// Display name of the variable
    pub fn name(&self) -> &str {
        &self.id.name
    }
}

/// One entry of a thread's call stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    /// Frame handle
    pub id: FrameId,
    /// Function name, if symbolicated
    pub function: Option<String>,
    /// Current line of the frame, if it has line info
    pub loc: Option<Loc>,
}

/// Read-only symbol enumeration for one target.
///
/// This is the only engine capability known to be safe off the controller's
/// thread, which is why it is split out and required to be `Send + Sync`.
pub trait SymbolSource: Send + Sync {
    /// Enumerate the symbols of every module of the target, module by module.
    ///
    /// May take a long time for large executables.
    fn enumerate_symbols(&self) -> EngineResult<Vec<RawSymbol>>;
}

/// Blocking access to a process's standard streams.
pub trait ProcessOutput: Send + Sync {
    /// Block until some stdout bytes are available and return at most `max` of them.
    ///
    /// Returns an empty buffer once the stream is closed.
    fn read_stdout(&self, max: usize) -> Vec<u8>;

    /// Block until some stderr bytes are available and return at most `max` of them.
    ///
    /// Returns an empty buffer once the stream is closed.
    fn read_stderr(&self, max: usize) -> Vec<u8>;
}

/// Control plane of a native debugging engine.
///
/// Calls touching process, thread, frame or breakpoint state are not safe to
/// issue from more than one execution context. Implementations need not be
/// `Send`; the session controller owns its engine and is the only caller.
#[auto_impl(&mut, Box)]
pub trait DebugEngine {
    /// Create a target for the executable. `Ok(None)` if the engine rejects it.
    fn create_target(&mut self, params: &ExeParams) -> EngineResult<Option<TargetId>>;

    /// Symbol enumeration capability for a target, usable from any thread.
    fn symbol_source(&self, target: TargetId) -> EngineResult<Arc<dyn SymbolSource>>;

    /// Create a breakpoint at a source line. `Ok(None)` if the engine reports it invalid.
    fn create_breakpoint(&mut self, target: TargetId, loc: &Loc)
        -> EngineResult<Option<BreakpointId>>;

    /// Delete a breakpoint previously created on the target.
    fn delete_breakpoint(&mut self, target: TargetId, id: BreakpointId) -> EngineResult<()>;

    /// Launch a process from the target. `Ok(None)` if the launch failed.
    fn launch(&mut self, target: TargetId, params: &ExeParams) -> EngineResult<Option<ProcessId>>;

    /// Output capability for a process, usable from any thread.
    fn process_output(&self, process: ProcessId) -> EngineResult<Arc<dyn ProcessOutput>>;

    /// Current execution state of a process. An error means the handle is not live.
    fn process_status(&mut self, process: ProcessId) -> EngineResult<ProcessStatus>;

    /// Step into the next source line of a thread.
    fn step_into(&mut self, thread: ThreadId) -> EngineResult<()>;

    /// Step over the next source line of a thread.
    fn step_over(&mut self, thread: ThreadId) -> EngineResult<()>;

    /// Resume a stopped process.
    fn resume(&mut self, process: ProcessId) -> EngineResult<()>;

    /// Terminate a process. Engines may require it to be running.
    fn kill(&mut self, process: ProcessId) -> EngineResult<()>;

    /// The thread the engine considers current, if any.
    fn selected_thread(&mut self, process: ProcessId) -> EngineResult<Option<ThreadId>>;

    /// The frame the engine considers current for a thread, if any.
    fn selected_frame(&mut self, thread: ThreadId) -> EngineResult<Option<FrameId>>;

    /// Source line a frame is executing, if it has line info.
    fn frame_line_location(&mut self, frame: FrameId) -> EngineResult<Option<Loc>>;

    /// Call stack of a thread, innermost frame first.
    fn list_frames(&mut self, thread: ThreadId) -> EngineResult<Vec<FrameInfo>>;

    /// Locals and arguments of a frame, in declaration order.
    fn list_frame_variables(&mut self, frame: FrameId) -> EngineResult<Vec<VariableDesc>>;

    /// Evaluate a variable of a frame to its display string.
    fn variable_value(&mut self, frame: FrameId, var: &VarId) -> EngineResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!ProcessStatus::Stopped.is_terminal());
        assert!(!ProcessStatus::Running.is_terminal());
        assert!(ProcessStatus::Exited(0).is_terminal());
        assert!(ProcessStatus::Detached.is_terminal());
        assert!(ProcessStatus::Unloaded.is_terminal());
    }

    #[test]
    fn test_var_id_distinguishes_shadowed_names() {
        let outer = VarId::new(0, "i");
        let inner = VarId::new(2, "i");
        assert_ne!(outer, inner);
        assert_eq!(outer.to_string(), "i@0");
    }
}
