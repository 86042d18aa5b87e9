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

//! SDB Engine - the boundary to the native debugging engine
//!
//! The controller never talks to a debugger library directly. Everything it
//! needs is expressed by the capability traits in this crate:
//!
//! - [`DebugEngine`]: the control plane (targets, processes, breakpoints,
//!   threads, frames, variables). It is owned by exactly one execution context
//!   and is deliberately not required to be `Send` or `Sync`.
//! - [`SymbolSource`]: read-only module/symbol enumeration for one target. This
//!   is the only engine capability that may run on a worker thread.
//! - [`ProcessOutput`]: blocking stdout/stderr reads for one process, drained by
//!   a dedicated reader thread.
//!
//! Engine-owned objects are referred to by the opaque handles in [`handles`].

pub mod adapter;
pub mod error;
pub mod handles;
#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use adapter::*;
pub use error::EngineError;
pub use handles::*;
