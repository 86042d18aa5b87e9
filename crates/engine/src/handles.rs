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

//! Opaque handles to engine-owned objects.
//!
//! The numbers inside carry no meaning for the controller. They are only
//! compared for identity and handed back to the engine.

use derive_more::{Display, From};

/// A loaded executable registered with the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From)]
#[display("target#{_0}")]
pub struct TargetId(pub u64);

/// A live process spawned from a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From)]
#[display("process#{_0}")]
pub struct ProcessId(pub u64);

/// A thread inside a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From)]
#[display("thread#{_0}")]
pub struct ThreadId(pub u64);

/// A stack frame inside a thread
///
/// Two frames compare equal only if the engine considers them the same
/// activation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From)]
#[display("frame#{_0}")]
pub struct FrameId(pub u64);

/// An engine-managed breakpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From)]
#[display("breakpoint#{_0}")]
pub struct BreakpointId(pub u64);
