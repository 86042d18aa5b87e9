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

//! The per-tick reconciler
//!
//! [`Reconciler::tick`] consumes the pending [`Intents`](crate::intent::Intents)
//! of a session and issues every engine call of that tick, in this order:
//!
//! 1. load a new target
//! 2. navigate the source view
//! 3. toggle a breakpoint
//! 4. start a process
//! 5. one control action
//! 6. stop bookkeeping (highlight, frames, variables)
//! 7. liveness check
//!
//! The reconciler owns the engine. Nothing else can reach the engine's control
//! plane, so every process, thread, frame, variable and breakpoint call runs on
//! whichever thread drives the ticks.

use std::collections::HashSet;

use eyre::Result;
use sdb_common::{ExeParams, Loc};
use sdb_engine::{
    DebugEngine, EngineError, EngineResult, FrameInfo, ProcessId, ProcessStatus, ThreadId, VarId,
};
use tracing::{debug, info, warn};

use crate::{
    config::Settings,
    intent::ControlIntent,
    output::{spawn_reader, OutputBuffer},
    state::{ProcessState, Session, TargetState},
    symbols::{PendingIndex, SymbolLoader},
    variables::{FrameKey, VarState},
};

/// Applies intents to the engine, one tick at a time
#[derive(Debug)]
pub struct Reconciler<E> {
    engine: E,
    loader: SymbolLoader,
    chunk_size: usize,
}

impl<E: DebugEngine> Reconciler<E> {
    /// Create a reconciler owning `engine`
    pub fn new(engine: E, settings: &Settings) -> Result<Self> {
        Ok(Self {
            engine,
            loader: SymbolLoader::new(settings.symbol_workers)?,
            chunk_size: settings.output_chunk_size,
        })
    }

    /// The owned engine
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Run one reconciliation pass
    pub fn tick(&mut self, session: &mut Session) {
        let mut intents = std::mem::take(&mut session.intents);

        if let Some(text) = intents.symbol_search.take() {
            session.symbol_search = text;
        }

        if let Some(params) = intents.load.take() {
            self.load(session, params);
        }
        if let Some(target) = session.target.as_mut() {
            target.index.poll();
        }

        if let Some(loc) = intents.navigate.take() {
            session.show(&loc);
        }

        if let Some(loc) = intents.toggle_breakpoint.take() {
            self.toggle_breakpoint(session, &loc);
        }

        if intents.start {
            self.start(session);
        }

        let fired = match intents.take_control() {
            Some(control) => self.control(session, control),
            None => false,
        };

        self.refresh_stop(session, fired, intents.select_frame, intents.expanded.take());
        self.check_liveness(session);
    }

    fn load(&mut self, session: &mut Session, mut params: ExeParams) {
        if params.working_dir.as_os_str().is_empty() {
            params.working_dir = params.effective_working_dir().to_path_buf();
        }

        let id = match self.engine.create_target(&params) {
            Ok(Some(id)) => id,
            Ok(None) => {
                warn!(exe = %params.exe_path.display(), "engine rejected executable");
                return;
            }
            Err(e) => {
                warn!(exe = %params.exe_path.display(), "failed to create target: {e}");
                return;
            }
        };

        // Dropping the previous pending index abandons its result
        let index = match self.engine.symbol_source(id) {
            Ok(source) => self.loader.submit(id, source),
            Err(e) => {
                warn!(target_id = %id, "symbol enumeration unavailable: {e}");
                PendingIndex::failed(id, &e)
            }
        };

        info!(target_id = %id, exe = %params.exe_path.display(), "target loaded");
        session.exe_params = params;
        session.target = Some(TargetState { id, index });
    }

    fn toggle_breakpoint(&mut self, session: &mut Session, loc: &Loc) {
        let Some(target) = &session.target else {
            debug!(%loc, "no target, breakpoint toggle ignored");
            return;
        };
        session.breakpoints.toggle(&mut self.engine, target.id, loc);
    }

    fn start(&mut self, session: &mut Session) {
        if let Some(process) = &session.process {
            debug!(process = %process.id, "process already running, start ignored");
            return;
        }
        let Some(target) = &session.target else {
            warn!("no target loaded, cannot start a process");
            return;
        };

        let id = match self.engine.launch(target.id, &session.exe_params) {
            Ok(Some(id)) => id,
            Ok(None) => {
                warn!(exe = %session.exe_params.exe_path.display(), "launch failed");
                return;
            }
            Err(e) => {
                warn!(exe = %session.exe_params.exe_path.display(), "launch failed: {e}");
                return;
            }
        };

        session.output = OutputBuffer::new();
        session.vars = None;

        let mut process = ProcessState::new(id);
        match self.engine.process_output(id) {
            Ok(source) => match spawn_reader(id, source, session.output.clone(), self.chunk_size)
            {
                Ok(handle) => process.reader = Some(handle),
                Err(e) => warn!(%id, "output will not be captured: {e:#}"),
            },
            Err(e) => warn!(%id, "output will not be captured: {e}"),
        }

        info!(process = %id, "process launched");
        session.process = Some(process);
    }

    /// Issue one control action. Returns whether execution state changed.
    fn control(&mut self, session: &mut Session, control: ControlIntent) -> bool {
        let Some(process) = &session.process else {
            debug!(?control, "no process, control ignored");
            return false;
        };
        let id = process.id;

        match self.engine.process_status(id) {
            Ok(ProcessStatus::Stopped) => {}
            Ok(status) => {
                debug!(?control, status = status.as_str(), "process not stopped, control ignored");
                return false;
            }
            Err(e) => {
                warn!(?control, "status probe failed: {e}");
                return false;
            }
        }

        let result = match control {
            ControlIntent::Kill => self.kill(id),
            ControlIntent::StepIn => self.on_thread(id, |engine, thread| engine.step_into(thread)),
            ControlIntent::StepOver => self.on_thread(id, |engine, thread| engine.step_over(thread)),
            ControlIntent::Continue => self.engine.resume(id),
        };

        match result {
            Ok(()) => {
                debug!(process = %id, ?control, "control issued");
                true
            }
            Err(e) => {
                warn!(process = %id, ?control, "control failed: {e}");
                false
            }
        }
    }

    /// The engine only kills running processes, so resume first
    fn kill(&mut self, id: ProcessId) -> EngineResult<()> {
        self.engine.resume(id)?;
        if let Err(e) = self.engine.kill(id) {
            warn!(process = %id, "kill failed after resume: {e}");
        }
        Ok(())
    }

    fn on_thread(
        &mut self,
        id: ProcessId,
        step: impl FnOnce(&mut E, ThreadId) -> EngineResult<()>,
    ) -> EngineResult<()> {
        match self.engine.selected_thread(id)? {
            Some(thread) => step(&mut self.engine, thread),
            None => Err(EngineError::Unavailable(format!("no selected thread in {id}"))),
        }
    }

    /// Bring highlight, frames and variables in line with the process status
    fn refresh_stop(
        &mut self,
        session: &mut Session,
        fired: bool,
        select_frame: Option<usize>,
        expanded: Option<HashSet<VarId>>,
    ) {
        let Some(id) = session.process.as_ref().map(|process| process.id) else {
            session.vars = None;
            return;
        };

        let status = match self.engine.process_status(id) {
            Ok(status) => status,
            Err(e) => {
                warn!(process = %id, "liveness probe failed: {e}");
                Self::teardown(session, "probe failed");
                return;
            }
        };
        let Some(process) = session.process.as_mut() else {
            return;
        };
        process.status = status;

        if !process.is_stopped() {
            process.clear_stop();
            if fired {
                if let Some(vars) = session.vars.take() {
                    process.kept_expansion = Some(vars.into_expansion());
                }
            }
            if let Some(expanded) = expanded {
                match (session.vars.as_mut(), process.kept_expansion.as_mut()) {
                    (Some(vars), _) => vars.set_expanded(expanded),
                    (None, Some((_, kept))) => *kept = expanded,
                    (None, None) => {}
                }
            }
            return;
        }

        let new_stop = fired || !process.stop_seen;
        let mut moved = new_stop;

        if new_stop {
            process.frames = self.list_frames(id);
            process.selected_frame = self.engine_frame_index(id, &process.frames);
            process.stop_seen = true;
        } else if let Some(index) = select_frame {
            if index < process.frames.len() && index != process.selected_frame {
                process.selected_frame = index;
                moved = true;
            }
        }

        let key = process.current_frame().map(|frame| FrameKey { process: id, frame: frame.id });
        let kept = process.kept_expansion.take();

        if moved {
            process.highlight_loc = match process.current_frame() {
                Some(frame) => self.frame_loc(frame),
                None => None,
            };
            if let Some(loc) = process.highlight_loc.clone() {
                debug!(%loc, "stopped");
                session.show(&loc);
            }
        }

        let Some(key) = key else {
            session.vars = None;
            return;
        };

        let same_frame = session.vars.as_ref().is_some_and(|vars| vars.key() == key);
        if !same_frame {
            let mut vars = VarState::build(&mut self.engine, key);
            if let Some((_, expanded)) = kept.filter(|(frame, _)| *frame == key) {
                vars.set_expanded(expanded);
            }
            session.vars = Some(vars);
        } else if fired {
            if let Some(vars) = session.vars.as_mut() {
                vars.rebuild(&mut self.engine);
            }
        }

        if let Some(vars) = session.vars.as_mut() {
            if let Some(expanded) = expanded {
                vars.set_expanded(expanded);
            }
            vars.fetch_expanded(&mut self.engine);
        }
    }

    fn list_frames(&mut self, id: ProcessId) -> Vec<FrameInfo> {
        let thread = match self.engine.selected_thread(id) {
            Ok(Some(thread)) => thread,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(process = %id, "no selected thread: {e}");
                return Vec::new();
            }
        };

        self.engine.list_frames(thread).unwrap_or_else(|e| {
            warn!(%thread, "failed to list frames: {e}");
            Vec::new()
        })
    }

    /// Position of the engine's selected frame in `frames`, innermost if unknown
    fn engine_frame_index(&mut self, id: ProcessId, frames: &[FrameInfo]) -> usize {
        let selected = match self.engine.selected_thread(id) {
            Ok(Some(thread)) => self.engine.selected_frame(thread).ok().flatten(),
            _ => None,
        };
        selected.and_then(|frame| frames.iter().position(|f| f.id == frame)).unwrap_or(0)
    }

    fn frame_loc(&mut self, frame: &FrameInfo) -> Option<Loc> {
        match self.engine.frame_line_location(frame.id) {
            Ok(loc) => loc,
            Err(e) => {
                debug!(frame = %frame.id, "no line location: {e}");
                frame.loc.clone()
            }
        }
    }

    fn check_liveness(&mut self, session: &mut Session) {
        let Some(process) = &session.process else {
            return;
        };
        if process.status.is_terminal() {
            let reason = match process.status {
                ProcessStatus::Exited(code) => format!("exited with status {code}"),
                status => status.as_str().to_string(),
            };
            Self::teardown(session, &reason);
        }
    }

    /// Drop the process without touching the engine again
    fn teardown(session: &mut Session, reason: &str) {
        if let Some(process) = session.process.take() {
            info!(process = %process.id, reason, "process torn down");
        }
        session.vars = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdb_engine::{
        mock::{EngineCall, MockEngine, MockFrame, MockStop},
        FrameId,
    };
    use std::collections::BTreeSet;

    fn frame(id: u64, line: u32) -> MockFrame {
        MockFrame::new(id, "main", Some(Loc::new("/src/main.c", line))).with_var(0, "x", "42")
    }

    fn reconciler(engine: &MockEngine) -> Reconciler<MockEngine> {
        Reconciler::new(engine.clone(), &Settings::default()).unwrap()
    }

    fn launched(engine: &MockEngine, stops: Vec<MockStop>) -> (Reconciler<MockEngine>, Session) {
        engine.script_stops(stops);
        let mut rec = reconciler(engine);
        let mut session = Session::new();
        session.intents.load = Some(ExeParams::new("/bin/prog", ""));
        rec.tick(&mut session);
        session.intents.start = true;
        rec.tick(&mut session);
        (rec, session)
    }

    #[test]
    fn test_load_defaults_working_dir_to_exe_dir() {
        let engine = MockEngine::new();
        let mut rec = reconciler(&engine);
        let mut session = Session::new();

        session.intents.load = Some(ExeParams::new("/opt/app/prog", ""));
        rec.tick(&mut session);

        assert!(session.target.is_some());
        assert_eq!(session.exe_params.working_dir, std::path::Path::new("/opt/app"));
    }

    #[test]
    fn test_rejected_load_keeps_previous_target() {
        let engine = MockEngine::new();
        engine.reject_exe("/bin/bad");
        let mut rec = reconciler(&engine);
        let mut session = Session::new();

        session.intents.load = Some(ExeParams::new("/bin/good", "/tmp"));
        rec.tick(&mut session);
        let first = session.target.as_ref().map(|t| t.id);

        session.intents.load = Some(ExeParams::new("/bin/bad", "/tmp"));
        rec.tick(&mut session);
        assert_eq!(session.target.as_ref().map(|t| t.id), first);
        assert_eq!(session.exe_params.exe_path, std::path::Path::new("/bin/good"));
    }

    #[test]
    fn test_toggle_without_target_is_ignored() {
        let engine = MockEngine::new();
        let mut rec = reconciler(&engine);
        let mut session = Session::new();

        session.intents.toggle_breakpoint = Some(Loc::new("/src/a.c", 1));
        rec.tick(&mut session);
        assert!(session.breakpoints.is_empty());
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn test_launch_to_initial_stop() {
        let engine = MockEngine::new();
        let (_rec, session) = launched(&engine, vec![MockStop::new(vec![frame(1, 7)])]);

        let process = session.process.as_ref().unwrap();
        assert!(process.is_stopped());
        assert_eq!(process.highlight_loc, Some(Loc::new("/src/main.c", 7)));
        assert_eq!(session.vars.as_ref().unwrap().vars().len(), 1);
    }

    #[test]
    fn test_second_start_is_ignored() {
        let engine = MockEngine::new();
        let (mut rec, mut session) = launched(&engine, vec![MockStop::new(vec![frame(1, 7)])]);

        session.intents.start = true;
        rec.tick(&mut session);
        let launches = engine.calls().iter().filter(|c| matches!(c, EngineCall::Launch(_))).count();
        assert_eq!(launches, 1);
    }

    #[test]
    fn test_single_control_call_per_tick() {
        let engine = MockEngine::new();
        let (mut rec, mut session) = launched(
            &engine,
            vec![MockStop::new(vec![frame(1, 7)]), MockStop::new(vec![frame(1, 8)])],
        );

        engine.clear_calls();
        session.intents.control =
            BTreeSet::from([ControlIntent::Continue, ControlIntent::StepOver, ControlIntent::StepIn]);
        rec.tick(&mut session);

        assert_eq!(engine.control_calls(), [EngineCall::StepInto]);
        let process = session.process.as_ref().unwrap();
        assert_eq!(process.highlight_loc, Some(Loc::new("/src/main.c", 8)));
    }

    #[test]
    fn test_kill_resumes_first() {
        let engine = MockEngine::new();
        let (mut rec, mut session) = launched(&engine, vec![MockStop::new(vec![frame(1, 7)])]);

        engine.clear_calls();
        session.intents.request(ControlIntent::Kill);
        session.intents.request(ControlIntent::Continue);
        rec.tick(&mut session);

        assert_eq!(engine.control_calls(), [EngineCall::Resume, EngineCall::Kill]);
        assert!(session.process.is_none());
        assert!(session.vars.is_none());
    }

    #[test]
    fn test_control_ignored_while_running() {
        let engine = MockEngine::new();
        let (mut rec, mut session) = launched(&engine, vec![]);
        assert!(!session.process.as_ref().unwrap().is_stopped());

        engine.clear_calls();
        session.intents.request(ControlIntent::StepOver);
        rec.tick(&mut session);
        assert!(engine.control_calls().is_empty());
        assert!(session.process.as_ref().unwrap().highlight_loc.is_none());
    }

    #[test]
    fn test_frame_selection_rebuilds_variables() {
        let engine = MockEngine::new();
        let caller = MockFrame::new(2, "caller", Some(Loc::new("/src/main.c", 20)))
            .with_var(0, "argc", "1");
        let (mut rec, mut session) =
            launched(&engine, vec![MockStop::new(vec![frame(1, 7), caller])]);

        session.intents.select_frame = Some(1);
        rec.tick(&mut session);

        let process = session.process.as_ref().unwrap();
        assert_eq!(process.current_frame().unwrap().id, FrameId(2));
        assert_eq!(process.highlight_loc, Some(Loc::new("/src/main.c", 20)));
        let vars = session.vars.as_ref().unwrap();
        assert_eq!(vars.key().frame, FrameId(2));
        assert_eq!(vars.vars()[0].name(), "argc");
    }

    #[test]
    fn test_out_of_range_frame_selection_is_ignored() {
        let engine = MockEngine::new();
        let (mut rec, mut session) = launched(&engine, vec![MockStop::new(vec![frame(1, 7)])]);

        session.intents.select_frame = Some(5);
        rec.tick(&mut session);
        assert_eq!(session.process.as_ref().unwrap().selected_frame, 0);
    }

    #[test]
    fn test_failed_probe_tears_down_process() {
        let engine = MockEngine::new();
        let (mut rec, mut session) = launched(&engine, vec![MockStop::new(vec![frame(1, 7)])]);
        session.intents.toggle_breakpoint = Some(Loc::new("/src/main.c", 9));
        rec.tick(&mut session);

        engine.fail_status_probe();
        rec.tick(&mut session);

        assert!(session.process.is_none());
        assert!(session.vars.is_none());
        assert_eq!(session.breakpoints.len(), 1);
    }

    #[test]
    fn test_exit_keeps_output_and_allows_restart() {
        let engine = MockEngine::new();
        let (mut rec, mut session) = launched(&engine, vec![MockStop::new(vec![frame(1, 7)])]);

        session.intents.request(ControlIntent::Continue);
        rec.tick(&mut session);
        assert!(session.process.is_none());

        engine.script_stops(vec![MockStop::new(vec![frame(1, 7)])]);
        session.intents.start = true;
        rec.tick(&mut session);
        assert!(session.process.is_some());
    }

    #[test]
    fn test_kept_expansion_is_dropped_for_another_frame() {
        let engine = MockEngine::new();
        engine.delay_stops(1);
        let stops = vec![MockStop::new(vec![frame(1, 3)]), MockStop::new(vec![frame(2, 9)])];
        let (mut rec, mut session) = launched(&engine, stops);

        let x = VarId::new(0, "x");
        session.intents.expanded = Some(HashSet::from([x.clone()]));
        rec.tick(&mut session);
        assert!(session.vars.as_ref().unwrap().is_expanded(&x));

        session.intents.request(ControlIntent::StepIn);
        rec.tick(&mut session);
        assert!(session.process.as_ref().unwrap().kept_expansion.is_some());

        rec.tick(&mut session);
        let vars = session.vars.as_ref().unwrap();
        assert_eq!(vars.key().frame, FrameId(2));
        assert!(vars.expanded().is_empty());
        assert!(session.process.as_ref().unwrap().kept_expansion.is_none());
    }
}
