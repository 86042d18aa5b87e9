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

//! Errors reported by the debugging engine

use thiserror::Error;

use crate::{BreakpointId, FrameId, ProcessId, TargetId, ThreadId};

/// Errors reported by the debugging engine.
///
/// None of these are fatal for a session: the controller logs them and skips
/// the action for the current tick.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The target handle is unknown to the engine
    #[error("invalid target handle: {0}")]
    InvalidTarget(TargetId),
    /// The process handle is unknown, or the process is gone
    #[error("invalid process handle: {0}")]
    InvalidProcess(ProcessId),
    /// The thread handle is unknown, or the thread is gone
    #[error("invalid thread handle: {0}")]
    InvalidThread(ThreadId),
    /// The frame handle is unknown, or the frame was popped
    #[error("invalid frame handle: {0}")]
    InvalidFrame(FrameId),
    /// The breakpoint handle is unknown
    #[error("invalid breakpoint handle: {0}")]
    InvalidBreakpoint(BreakpointId),
    /// The process is in a state that does not allow the request
    #[error("process {process} cannot {action} while {state}")]
    InvalidState {
        /// Process the request was made against
        process: ProcessId,
        /// What was attempted
        action: &'static str,
        /// The state the process was in
        state: &'static str,
    },
    /// A variable could not be evaluated
    #[error("cannot evaluate variable `{0}`")]
    Unavailable(String),
    /// Any other engine-side failure
    #[error("engine call failed: {0}")]
    Failed(String),
}
