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

//! Variable/frame cache
//!
//! Level 1 is the variable list of one frame, fetched eagerly when the frame
//! becomes current. Level 2 holds the display values of expanded variables,
//! fetched lazily. Both levels live and die with one `(process, frame)` pair.
//!
//! All fetches go through the caller's engine, on the caller's thread.

use std::{
    collections::{HashMap, HashSet},
    hash::Hash,
    ops::Deref,
};

use sdb_engine::{DebugEngine, FrameId, ProcessId, VarId, VariableDesc};
use tracing::{debug, warn};

/// Cache entries that distinguish "never fetched" from "fetched, no value".
///
/// - absent key: not fetched yet
/// - `Some(v)`: fetched successfully
/// - `None`: fetched, but the engine had no value
#[derive(Debug, Clone)]
pub struct FetchCache<K, V> {
    data: HashMap<K, Option<V>>,
}

impl<K, V> Deref for FetchCache<K, V> {
    type Target = HashMap<K, Option<V>>;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl<K, V> FetchCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create an empty cache
    pub fn new() -> Self {
        Self { data: HashMap::new() }
    }

    /// Check if the cache has an entry for the given key
    pub fn has_cached(&self, key: &K) -> bool {
        self.data.contains_key(key)
    }

    /// Record a fetch result
    pub fn record(&mut self, key: K, value: Option<V>) {
        self.data.insert(key, value);
    }

    /// Forget every entry
    pub fn clear(&mut self) {
        self.data.clear();
    }
}

impl<K, V> Default for FetchCache<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Identity of the frame a [`VarState`] belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameKey {
    /// Owning process
    pub process: ProcessId,
    /// Frame handle
    pub frame: FrameId,
}

/// Value of one variable as seen by the view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueState<'a> {
    /// The user has not expanded it
    NotExpanded,
    /// Expanded but not fetched yet
    Pending,
    /// Fetched
    Ready(&'a str),
    /// Fetched, the engine could not produce a value
    Unavailable,
}

/// Cached variables of the current frame
#[derive(Debug, Clone)]
pub struct VarState {
    key: FrameKey,
    vars: Vec<VariableDesc>,
    expanded: HashSet<VarId>,
    values: FetchCache<VarId, String>,
}

impl VarState {
    /// Build level 1 for a frame
    pub fn build<E: DebugEngine>(engine: &mut E, key: FrameKey) -> Self {
        let vars = Self::list(engine, key.frame);
        Self { key, vars, expanded: HashSet::new(), values: FetchCache::new() }
    }

    fn list<E: DebugEngine>(engine: &mut E, frame: FrameId) -> Vec<VariableDesc> {
        match engine.list_frame_variables(frame) {
            Ok(vars) => {
                debug!(%frame, count = vars.len(), "listed frame variables");
                vars
            }
            Err(e) => {
                warn!(%frame, "failed to list frame variables: {e}");
                Vec::new()
            }
        }
    }

    /// Re-list level 1 and drop every value, keeping the expansion set.
    ///
    /// Used after execution moved but the frame handle stayed the same.
    pub fn rebuild<E: DebugEngine>(&mut self, engine: &mut E) {
        self.vars = Self::list(engine, self.key.frame);
        self.values.clear();
    }

    /// Frame this state belongs to
    pub fn key(&self) -> FrameKey {
        self.key
    }

    /// Variables of the frame, in declaration order
    pub fn vars(&self) -> &[VariableDesc] {
        &self.vars
    }

    /// Drop the cached variables, keeping the frame and its expansion set
    pub fn into_expansion(self) -> (FrameKey, HashSet<VarId>) {
        (self.key, self.expanded)
    }

    /// Currently expanded variables
    pub fn expanded(&self) -> &HashSet<VarId> {
        &self.expanded
    }

    /// Replace the expansion set. Cached values survive collapse and re-expand.
    pub fn set_expanded(&mut self, expanded: HashSet<VarId>) {
        self.expanded = expanded;
    }

    /// Whether a variable is expanded
    pub fn is_expanded(&self, id: &VarId) -> bool {
        self.expanded.contains(id)
    }

    /// Display state of one variable
    pub fn value(&self, id: &VarId) -> ValueState<'_> {
        if !self.expanded.contains(id) {
            return ValueState::NotExpanded;
        }
        match self.values.get(id) {
            None => ValueState::Pending,
            Some(Some(value)) => ValueState::Ready(value),
            Some(None) => ValueState::Unavailable,
        }
    }

    /// Fetch level 2 for expanded variables that have no cached value.
    ///
    /// Returns the number of engine fetches issued.
    pub fn fetch_expanded<E: DebugEngine>(&mut self, engine: &mut E) -> usize {
        let missing: Vec<VarId> = self
            .vars
            .iter()
            .map(|desc| &desc.id)
            .filter(|id| self.expanded.contains(*id) && !self.values.has_cached(id))
            .cloned()
            .collect();

        for id in &missing {
            let value = match engine.variable_value(self.key.frame, id) {
                Ok(value) => Some(value),
                Err(e) => {
                    debug!(frame = %self.key.frame, var = %id, "no value: {e}");
                    None
                }
            };
            self.values.record(id.clone(), value);
        }

        missing.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdb_common::{ExeParams, Loc};
    use sdb_engine::mock::{MockEngine, MockFrame, MockStop};

    fn stopped(engine: &mut MockEngine) -> FrameKey {
        engine.script_stops(vec![MockStop::new(vec![MockFrame::new(
            5,
            "main",
            Some(Loc::new("/src/a.c", 4)),
        )
        .with_var(0, "i", "1")
        .with_var(1, "i", "2")
        .with_var(0, "name", "\"sdb\"")])]);

        let target = engine.create_target(&ExeParams::new("/bin/x", "")).unwrap().unwrap();
        let process = engine.launch(target, &ExeParams::default()).unwrap().unwrap();
        FrameKey { process, frame: FrameId(5) }
    }

    #[test]
    fn test_fetch_cache_distinguishes_missing_from_unavailable() {
        let mut cache: FetchCache<VarId, String> = FetchCache::default();
        let fetched = VarId::new(0, "x");
        let unavailable = VarId::new(0, "y");
        cache.record(fetched.clone(), Some("1".to_string()));
        cache.record(unavailable.clone(), None);

        assert!(cache.has_cached(&fetched));
        assert!(cache.has_cached(&unavailable));
        assert!(!cache.has_cached(&VarId::new(1, "x")));
        assert_eq!(cache.get(&fetched), Some(&Some("1".to_string())));
        assert_eq!(cache.get(&unavailable), Some(&None));

        let copy = cache.clone();
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(copy.len(), 2);
    }

    #[test]
    fn test_values_are_fetched_only_when_expanded() {
        let mut engine = MockEngine::new();
        let key = stopped(&mut engine);

        let mut state = VarState::build(&mut engine, key);
        assert_eq!(state.vars().len(), 3);
        assert_eq!(state.fetch_expanded(&mut engine), 0);
        assert_eq!(engine.value_fetches(), 0);

        let name = VarId::new(0, "name");
        state.set_expanded(HashSet::from([name.clone()]));
        assert_eq!(state.value(&name), ValueState::Pending);
        assert_eq!(state.fetch_expanded(&mut engine), 1);
        assert_eq!(state.value(&name), ValueState::Ready("\"sdb\""));
    }

    #[test]
    fn test_fetched_values_are_not_refetched() {
        let mut engine = MockEngine::new();
        let key = stopped(&mut engine);

        let mut state = VarState::build(&mut engine, key);
        state.set_expanded(HashSet::from([VarId::new(0, "i")]));
        state.fetch_expanded(&mut engine);
        state.fetch_expanded(&mut engine);
        state.fetch_expanded(&mut engine);
        assert_eq!(engine.value_fetches(), 1);
    }

    #[test]
    fn test_shadowed_names_keep_separate_values() {
        let mut engine = MockEngine::new();
        let key = stopped(&mut engine);

        let outer = VarId::new(0, "i");
        let inner = VarId::new(1, "i");
        let mut state = VarState::build(&mut engine, key);
        state.set_expanded(HashSet::from([outer.clone(), inner.clone()]));
        state.fetch_expanded(&mut engine);

        assert_eq!(state.value(&outer), ValueState::Ready("1"));
        assert_eq!(state.value(&inner), ValueState::Ready("2"));
    }

    #[test]
    fn test_rebuild_clears_values_but_keeps_expansion() {
        let mut engine = MockEngine::new();
        let key = stopped(&mut engine);

        let id = VarId::new(0, "i");
        let mut state = VarState::build(&mut engine, key);
        state.set_expanded(HashSet::from([id.clone()]));
        state.fetch_expanded(&mut engine);

        state.rebuild(&mut engine);
        assert!(state.is_expanded(&id));
        assert_eq!(state.value(&id), ValueState::Pending);
        assert_eq!(engine.variable_listings(), 2);
    }

    #[test]
    fn test_failed_fetch_is_cached_as_unavailable() {
        let mut engine = MockEngine::new();
        let key = stopped(&mut engine);

        let ghost = VarId::new(0, "ghost");
        let mut state = VarState::build(&mut engine, key);
        state.vars.push(VariableDesc { id: ghost.clone(), type_name: None });
        state.set_expanded(HashSet::from([ghost.clone()]));

        state.fetch_expanded(&mut engine);
        state.fetch_expanded(&mut engine);
        assert_eq!(state.value(&ghost), ValueState::Unavailable);
        assert_eq!(engine.value_fetches(), 1);
    }
}
