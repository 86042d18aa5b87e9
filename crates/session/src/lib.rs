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

//! SDB Session - the debugging-session controller
//!
//! A front-end writes [`Intents`] into a [`Session`]; once per tick the
//! [`Reconciler`] turns them into engine calls and refreshes the session's
//! caches; the front-end then draws from a [`SessionView`].
//!
//! Background work is limited to two kinds of jobs:
//!
//! - symbol enumeration on a small worker pool ([`symbols`])
//! - one output reader thread per live process ([`output`])
//!
//! Everything else, including every variable fetch, runs inside the tick.

pub mod breakpoints;
pub mod config;
pub mod driver;
pub mod intent;
pub mod output;
pub mod persist;
pub mod reconcile;
pub mod state;
pub mod symbols;
pub mod variables;
pub mod view;

pub use config::Settings;
pub use driver::{run, Frontend};
pub use intent::{ControlIntent, Intents};
pub use reconcile::Reconciler;
pub use state::Session;
pub use view::SessionView;
