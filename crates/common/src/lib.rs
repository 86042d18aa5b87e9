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

//! SDB Common - Shared functionality for SDB components
//!
//! This crate provides the value types exchanged between the engine adapter
//! and the session controller, plus the logging setup used by every binary
//! and test in the workspace.

/// Value types used throughout SDB: source locations and launch parameters
pub mod types;

/// Logging setup and utilities for consistent logging across SDB components
pub mod logging;

pub use types::*;
