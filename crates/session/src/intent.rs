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

//! User intents collected between two ticks

use std::collections::{BTreeSet, HashSet};

use sdb_common::{ExeParams, Loc};
use sdb_engine::VarId;

/// A request to change the execution state of the process.
///
/// Variant order is precedence order: when several are requested in one tick,
/// the smallest one wins and the others are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ControlIntent {
    /// Terminate the process
    Kill,
    /// Step into the next line
    StepIn,
    /// Step over the next line
    StepOver,
    /// Resume until the next stop
    Continue,
}

/// Everything the front-end asked for since the last tick.
///
/// Each field is consumed at most once by the reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Intents {
    /// Load a new executable
    pub load: Option<ExeParams>,
    /// Show a source location
    pub navigate: Option<Loc>,
    /// Toggle the breakpoint at a location
    pub toggle_breakpoint: Option<Loc>,
    /// Launch a process
    pub start: bool,
    /// Requested control actions
    pub control: BTreeSet<ControlIntent>,
    /// Select a frame of the call stack by index
    pub select_frame: Option<usize>,
    /// New symbol filter text
    pub symbol_search: Option<String>,
    /// New set of expanded variables
    pub expanded: Option<HashSet<VarId>>,
    /// Leave the session after this tick
    pub exit: bool,
}

impl Intents {
    /// Record a control request
    pub fn request(&mut self, control: ControlIntent) {
        self.control.insert(control);
    }

    /// The control action to execute this tick, clearing all requests
    pub fn take_control(&mut self) -> Option<ControlIntent> {
        let chosen = self.control.first().copied();
        self.control.clear();
        chosen
    }

    /// Merge requests that arrived later; later values win
    pub fn merge(&mut self, later: Self) {
        self.load = later.load.or(self.load.take());
        self.navigate = later.navigate.or(self.navigate.take());
        self.toggle_breakpoint = later.toggle_breakpoint.or(self.toggle_breakpoint.take());
        self.start |= later.start;
        self.control.extend(later.control);
        self.select_frame = later.select_frame.or(self.select_frame);
        self.symbol_search = later.symbol_search.or(self.symbol_search.take());
        self.expanded = later.expanded.or(self.expanded.take());
        self.exit |= later.exit;
    }

    /// Whether nothing was requested
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_in_beats_step_over_and_continue() {
        let mut intents = Intents::default();
        intents.request(ControlIntent::Continue);
        intents.request(ControlIntent::StepOver);
        intents.request(ControlIntent::StepIn);

        assert_eq!(intents.take_control(), Some(ControlIntent::StepIn));
        assert_eq!(intents.take_control(), None);
    }

    #[test]
    fn test_step_over_beats_continue() {
        let mut intents = Intents::default();
        intents.request(ControlIntent::Continue);
        intents.request(ControlIntent::StepOver);
        assert_eq!(intents.take_control(), Some(ControlIntent::StepOver));
    }

    #[test]
    fn test_kill_beats_everything() {
        let mut intents = Intents::default();
        intents.request(ControlIntent::StepIn);
        intents.request(ControlIntent::Kill);
        assert_eq!(intents.take_control(), Some(ControlIntent::Kill));
    }

    #[test]
    fn test_merge_keeps_latest_values() {
        let mut intents =
            Intents { navigate: Some(Loc::new("/a.c", 1)), start: true, ..Default::default() };
        intents.merge(Intents {
            navigate: Some(Loc::new("/b.c", 2)),
            control: BTreeSet::from([ControlIntent::Continue]),
            ..Default::default()
        });

        assert_eq!(intents.navigate, Some(Loc::new("/b.c", 2)));
        assert!(intents.start);
        assert_eq!(intents.control.len(), 1);
        assert!(!intents.is_empty());
        assert!(Intents::default().is_empty());
    }
}
