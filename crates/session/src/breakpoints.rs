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

//! Breakpoint registry keyed by source location

use std::{
    collections::{BTreeSet, HashMap},
    path::Path,
};

use sdb_common::Loc;
use sdb_engine::{BreakpointId, DebugEngine, TargetId};
use tracing::{debug, warn};

/// What a toggle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// A new breakpoint was created and recorded
    Added(BreakpointId),
    /// The existing breakpoint was removed
    Removed,
    /// The engine refused the location; nothing was recorded
    Rejected,
}

/// Engine breakpoints by location, at most one per location
#[derive(Debug, Clone, Default)]
pub struct BreakpointRegistry {
    entries: HashMap<Loc, BreakpointId>,
}

impl BreakpointRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a breakpoint at `loc` if there is none, remove it otherwise.
    ///
    /// Removal always drops the entry, even if the engine no longer knows the
    /// handle (e.g. it belonged to a replaced target).
    pub fn toggle<E: DebugEngine>(
        &mut self,
        engine: &mut E,
        target: TargetId,
        loc: &Loc,
    ) -> ToggleOutcome {
        if let Some(id) = self.entries.remove(loc) {
            if let Err(e) = engine.delete_breakpoint(target, id) {
                warn!(%loc, %id, "failed to delete breakpoint: {e}");
            } else {
                debug!(%loc, %id, "breakpoint removed");
            }
            return ToggleOutcome::Removed;
        }

        match engine.create_breakpoint(target, loc) {
            Ok(Some(id)) => {
                debug!(%loc, %id, "breakpoint added");
                self.entries.insert(loc.clone(), id);
                ToggleOutcome::Added(id)
            }
            Ok(None) => {
                warn!(path = %loc.path.display(), line = loc.line, "invalid breakpoint location");
                ToggleOutcome::Rejected
            }
            Err(e) => {
                warn!(%loc, "failed to create breakpoint: {e}");
                ToggleOutcome::Rejected
            }
        }
    }

    /// Check if a breakpoint exists at the given location
    pub fn has(&self, loc: &Loc) -> bool {
        self.entries.contains_key(loc)
    }

    /// Handle of the breakpoint at `loc`
    pub fn get(&self, loc: &Loc) -> Option<BreakpointId> {
        self.entries.get(loc).copied()
    }

    /// Lines carrying a breakpoint in one file
    pub fn lines_in(&self, path: &Path) -> BTreeSet<u32> {
        self.entries.keys().filter(|loc| loc.is_in(path)).map(|loc| loc.line).collect()
    }

    /// Get all breakpoint locations, sorted
    pub fn locations(&self) -> Vec<&Loc> {
        let mut sorted: Vec<&Loc> = self.entries.keys().collect();
        sorted.sort();
        sorted
    }

    /// Get breakpoint count
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no breakpoint is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdb_common::ExeParams;
    use sdb_engine::mock::{EngineCall, MockEngine};

    fn setup() -> (MockEngine, TargetId) {
        let mut engine = MockEngine::new();
        let target = engine.create_target(&ExeParams::new("/bin/x", "")).unwrap().unwrap();
        (engine, target)
    }

    #[test]
    fn test_toggle_twice_restores_key_set() {
        let (mut engine, target) = setup();
        let mut registry = BreakpointRegistry::new();
        let keep = Loc::new("/src/a.c", 3);
        registry.toggle(&mut engine, target, &keep);

        let before: Vec<Loc> = registry.locations().into_iter().cloned().collect();
        let loc = Loc::new("/src/a.c", 10);

        assert!(matches!(registry.toggle(&mut engine, target, &loc), ToggleOutcome::Added(_)));
        assert!(registry.has(&loc));
        assert_eq!(registry.toggle(&mut engine, target, &loc), ToggleOutcome::Removed);

        let after: Vec<Loc> = registry.locations().into_iter().cloned().collect();
        assert_eq!(before, after);
        assert_eq!(engine.breakpoint_count(), 1);
    }

    #[test]
    fn test_invalid_location_is_not_recorded() {
        let (mut engine, target) = setup();
        let bad = Loc::new("/src/a.c", 1);
        engine.mark_invalid(bad.clone());

        let mut registry = BreakpointRegistry::new();
        assert_eq!(registry.toggle(&mut engine, target, &bad), ToggleOutcome::Rejected);
        assert!(registry.is_empty());

        // A later toggle retries creation instead of deleting
        assert_eq!(registry.toggle(&mut engine, target, &bad), ToggleOutcome::Rejected);
        let creates = engine
            .calls()
            .into_iter()
            .filter(|c| matches!(c, EngineCall::CreateBreakpoint(_)))
            .count();
        assert_eq!(creates, 2);
    }

    #[test]
    fn test_stale_handle_is_dropped_on_removal() {
        let (mut engine, old_target) = setup();
        let mut registry = BreakpointRegistry::new();
        let loc = Loc::new("/src/a.c", 7);
        registry.toggle(&mut engine, old_target, &loc);

        let new_target = engine.create_target(&ExeParams::new("/bin/y", "")).unwrap().unwrap();
        assert_eq!(registry.toggle(&mut engine, new_target, &loc), ToggleOutcome::Removed);
        assert!(!registry.has(&loc));
    }

    #[test]
    fn test_lines_in_file() {
        let (mut engine, target) = setup();
        let mut registry = BreakpointRegistry::new();
        for loc in [Loc::new("/src/a.c", 9), Loc::new("/src/a.c", 2), Loc::new("/src/b.c", 4)] {
            registry.toggle(&mut engine, target, &loc);
        }

        assert_eq!(registry.lines_in(Path::new("/src/a.c")).into_iter().collect::<Vec<_>>(), [2, 9]);
        assert_eq!(registry.locations()[0], &Loc::new("/src/a.c", 2));
        assert_eq!(registry.len(), 3);
    }
}
