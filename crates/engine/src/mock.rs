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

//! Scripted in-memory engine for tests
//!
//! `MockEngine` behaves like an asynchronous native engine: control calls put
//! the process into `Running` and the next status probe lands it on the next
//! scripted stop (or exits it when no stops are left). With
//! [`MockEngine::delay_stops`] the process keeps reporting `Running` for a few
//! status queries first, like an engine that lands the stop a tick later. Clones share state, so
//! a test keeps one clone for scripting and inspection while the controller
//! owns the other.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    path::PathBuf,
    sync::Arc,
};

use parking_lot::{Condvar, Mutex};
use sdb_common::{ExeParams, Loc};
use tracing::debug;

use crate::{
    BreakpointId, DebugEngine, EngineError, EngineResult, FrameId, FrameInfo, ProcessId,
    ProcessOutput, ProcessStatus, RawSymbol, SymbolSource, TargetId, ThreadId, VarId,
    VariableDesc,
};

/// Engine calls recorded by the mock, in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    /// `create_target`
    CreateTarget(PathBuf),
    /// `create_breakpoint`
    CreateBreakpoint(Loc),
    /// `delete_breakpoint`
    DeleteBreakpoint(BreakpointId),
    /// `launch`
    Launch(TargetId),
    /// `step_into`
    StepInto,
    /// `step_over`
    StepOver,
    /// `resume`
    Resume,
    /// `kill`
    Kill,
}

impl EngineCall {
    /// Whether this call changes the execution state of a process
    pub fn is_control(&self) -> bool {
        matches!(self, Self::StepInto | Self::StepOver | Self::Resume | Self::Kill)
    }
}

/// A scripted stack frame
#[derive(Debug, Clone)]
pub struct MockFrame {
    /// Frame handle
    pub id: FrameId,
    /// Function name
    pub function: String,
    /// Current line
    pub loc: Option<Loc>,
    /// Variables with their display values
    pub variables: Vec<(VariableDesc, String)>,
}

impl MockFrame {
    /// Create a frame without variables
    pub fn new(id: u64, function: impl Into<String>, loc: Option<Loc>) -> Self {
        Self { id: FrameId(id), function: function.into(), loc, variables: Vec::new() }
    }

    /// Add a variable declared in `scope`
    pub fn with_var(mut self, scope: u32, name: &str, value: &str) -> Self {
        let desc = VariableDesc { id: VarId::new(scope, name), type_name: None };
        self.variables.push((desc, value.to_string()));
        self
    }
}

/// A scripted stop: the call stack of the selected thread
#[derive(Debug, Clone)]
pub struct MockStop {
    /// Frames, innermost first
    pub frames: Vec<MockFrame>,
    /// Index of the frame the engine selects
    pub selected: usize,
}

impl MockStop {
    /// A stop whose innermost frame is selected
    pub fn new(frames: Vec<MockFrame>) -> Self {
        Self { frames, selected: 0 }
    }

    fn frame(&self, id: FrameId) -> Option<&MockFrame> {
        self.frames.iter().find(|f| f.id == id)
    }
}

/// A gate that blocks a worker until the test opens it
#[derive(Debug, Default)]
pub struct Gate {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    /// Let every waiter through
    pub fn open(&self) {
        *self.open.lock() = true;
        self.cond.notify_all();
    }

    fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.cond.wait(&mut open);
        }
    }
}

#[derive(Debug, Default)]
struct Streams {
    stdout: VecDeque<Vec<u8>>,
    stderr: VecDeque<Vec<u8>>,
    closed: bool,
}

/// In-memory stdout/stderr pipes of a mock process
#[derive(Debug, Default)]
pub struct MockOutput {
    streams: Mutex<Streams>,
    cond: Condvar,
}

impl MockOutput {
    /// Queue a chunk on stdout
    pub fn push_stdout(&self, bytes: &[u8]) {
        self.streams.lock().stdout.push_back(bytes.to_vec());
        self.cond.notify_all();
    }

    /// Queue a chunk on stderr
    pub fn push_stderr(&self, bytes: &[u8]) {
        self.streams.lock().stderr.push_back(bytes.to_vec());
        self.cond.notify_all();
    }

    /// Close both streams; readers drain what is queued, then get EOF
    pub fn close(&self) {
        self.streams.lock().closed = true;
        self.cond.notify_all();
    }

    fn read(&self, max: usize, pick: fn(&mut Streams) -> &mut VecDeque<Vec<u8>>) -> Vec<u8> {
        let mut streams = self.streams.lock();
        loop {
            let closed = streams.closed;
            let queue = pick(&mut streams);
            if let Some(mut chunk) = queue.pop_front() {
                if chunk.len() > max {
                    let rest = chunk.split_off(max);
                    queue.push_front(rest);
                }
                return chunk;
            }
            if closed {
                return Vec::new();
            }
            self.cond.wait(&mut streams);
        }
    }
}

impl ProcessOutput for MockOutput {
    fn read_stdout(&self, max: usize) -> Vec<u8> {
        self.read(max, |s| &mut s.stdout)
    }

    fn read_stderr(&self, max: usize) -> Vec<u8> {
        self.read(max, |s| &mut s.stderr)
    }
}

struct MockSymbols {
    symbols: Vec<RawSymbol>,
    gate: Option<Arc<Gate>>,
}

impl SymbolSource for MockSymbols {
    fn enumerate_symbols(&self) -> EngineResult<Vec<RawSymbol>> {
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        Ok(self.symbols.clone())
    }
}

struct MockProcess {
    id: ProcessId,
    thread: ThreadId,
    status: ProcessStatus,
    advance_on_probe: bool,
    running_polls_left: usize,
    current: Option<MockStop>,
    output: Arc<MockOutput>,
}

#[derive(Default)]
struct MockState {
    next_id: u64,
    symbols: Vec<RawSymbol>,
    symbol_gate: Option<Arc<Gate>>,
    rejected_exes: HashSet<PathBuf>,
    targets: HashSet<TargetId>,
    invalid_locs: HashSet<Loc>,
    breakpoints: HashMap<BreakpointId, (TargetId, Loc)>,
    fail_launch: bool,
    fail_status_probe: bool,
    stop_delay: usize,
    stops: VecDeque<MockStop>,
    process: Option<MockProcess>,
    calls: Vec<EngineCall>,
    value_fetches: usize,
    variable_listings: usize,
}

impl MockState {
    fn fresh_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn process(&mut self, id: ProcessId) -> EngineResult<&mut MockProcess> {
        self.process.as_mut().filter(|p| p.id == id).ok_or(EngineError::InvalidProcess(id))
    }

    fn stopped_process_of_thread(&mut self, thread: ThreadId) -> EngineResult<&mut MockProcess> {
        let process = self
            .process
            .as_mut()
            .filter(|p| p.thread == thread)
            .ok_or(EngineError::InvalidThread(thread))?;
        if process.status != ProcessStatus::Stopped {
            return Err(EngineError::InvalidState {
                process: process.id,
                action: "step",
                state: process.status.as_str(),
            });
        }
        Ok(process)
    }

    fn start_running(&mut self, process: ProcessId) -> EngineResult<()> {
        let delay = self.stop_delay;
        let live = self.process(process)?;
        live.status = ProcessStatus::Running;
        live.advance_on_probe = true;
        live.running_polls_left = delay;
        Ok(())
    }

    fn current_stop(&self) -> Option<&MockStop> {
        self.process.as_ref().filter(|p| p.status == ProcessStatus::Stopped)?.current.as_ref()
    }

    fn frame(&self, id: FrameId) -> EngineResult<&MockFrame> {
        self.current_stop().and_then(|stop| stop.frame(id)).ok_or(EngineError::InvalidFrame(id))
    }
}

/// Scripted engine with shared state; see the module docs
#[derive(Clone, Default)]
pub struct MockEngine {
    state: Arc<Mutex<MockState>>,
}

impl MockEngine {
    /// Create an engine with no symbols and no scripted stops
    pub fn new() -> Self {
        Self::default()
    }

    /// Symbols enumerated for targets created from now on
    pub fn set_symbols(&self, symbols: Vec<RawSymbol>) {
        self.state.lock().symbols = symbols;
    }

    /// Make symbol enumeration of targets created from now on wait for a gate
    pub fn hold_symbol_enumeration(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.state.lock().symbol_gate = Some(gate.clone());
        gate
    }

    /// Make `create_target` return `None` for this executable
    pub fn reject_exe(&self, path: impl Into<PathBuf>) {
        self.state.lock().rejected_exes.insert(path.into());
    }

    /// Make `create_breakpoint` report this location as invalid
    pub fn mark_invalid(&self, loc: Loc) {
        self.state.lock().invalid_locs.insert(loc);
    }

    /// Make the next `launch` return `None`
    pub fn fail_next_launch(&self) {
        self.state.lock().fail_launch = true;
    }

    /// Make every `process_status` probe fail from now on
    pub fn fail_status_probe(&self) {
        self.state.lock().fail_status_probe = true;
    }

    /// Report `Running` for this many status queries after each step or
    /// resume before landing on the next stop
    pub fn delay_stops(&self, polls: usize) {
        self.state.lock().stop_delay = polls;
    }

    /// Stops the next launched process goes through; the first is the initial stop
    pub fn script_stops(&self, stops: Vec<MockStop>) {
        self.state.lock().stops = stops.into();
    }

    /// Force the status of the live process
    pub fn set_status(&self, status: ProcessStatus) {
        if let Some(process) = self.state.lock().process.as_mut() {
            process.status = status;
            process.advance_on_probe = false;
        }
    }

    /// Output pipes of the live process
    pub fn output(&self) -> Option<Arc<MockOutput>> {
        self.state.lock().process.as_ref().map(|p| p.output.clone())
    }

    /// Every recorded call, in order
    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().calls.clone()
    }

    /// Recorded process control calls, in order
    pub fn control_calls(&self) -> Vec<EngineCall> {
        self.state.lock().calls.iter().filter(|c| c.is_control()).cloned().collect()
    }

    /// Forget recorded calls
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Number of `variable_value` calls so far
    pub fn value_fetches(&self) -> usize {
        self.state.lock().value_fetches
    }

    /// Number of `list_frame_variables` calls so far
    pub fn variable_listings(&self) -> usize {
        self.state.lock().variable_listings
    }

    /// Number of breakpoints alive in the engine
    pub fn breakpoint_count(&self) -> usize {
        self.state.lock().breakpoints.len()
    }
}

impl DebugEngine for MockEngine {
    fn create_target(&mut self, params: &ExeParams) -> EngineResult<Option<TargetId>> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::CreateTarget(params.exe_path.clone()));
        if state.rejected_exes.contains(&params.exe_path) {
            return Ok(None);
        }

        let target = TargetId(state.fresh_id());
        state.targets.insert(target);
        Ok(Some(target))
    }

    fn symbol_source(&self, target: TargetId) -> EngineResult<Arc<dyn SymbolSource>> {
        let state = self.state.lock();
        if !state.targets.contains(&target) {
            return Err(EngineError::InvalidTarget(target));
        }
        Ok(Arc::new(MockSymbols {
            symbols: state.symbols.clone(),
            gate: state.symbol_gate.clone(),
        }))
    }

    fn create_breakpoint(
        &mut self,
        target: TargetId,
        loc: &Loc,
    ) -> EngineResult<Option<BreakpointId>> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::CreateBreakpoint(loc.clone()));
        if !state.targets.contains(&target) {
            return Err(EngineError::InvalidTarget(target));
        }
        if state.invalid_locs.contains(loc) {
            return Ok(None);
        }

        let id = BreakpointId(state.fresh_id());
        state.breakpoints.insert(id, (target, loc.clone()));
        Ok(Some(id))
    }

    fn delete_breakpoint(&mut self, target: TargetId, id: BreakpointId) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::DeleteBreakpoint(id));
        match state.breakpoints.get(&id) {
            Some((owner, _)) if *owner == target => {
                state.breakpoints.remove(&id);
                Ok(())
            }
            _ => Err(EngineError::InvalidBreakpoint(id)),
        }
    }

    fn launch(&mut self, target: TargetId, params: &ExeParams) -> EngineResult<Option<ProcessId>> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::Launch(target));
        if !state.targets.contains(&target) {
            return Err(EngineError::InvalidTarget(target));
        }
        if std::mem::take(&mut state.fail_launch) {
            return Ok(None);
        }

        debug!(exe = %params.exe_path.display(), "mock launch");
        let id = ProcessId(state.fresh_id());
        let thread = ThreadId(state.fresh_id());
        let current = state.stops.pop_front();
        let status = if current.is_some() { ProcessStatus::Stopped } else { ProcessStatus::Running };
        state.process = Some(MockProcess {
            id,
            thread,
            status,
            advance_on_probe: false,
            running_polls_left: 0,
            current,
            output: Arc::new(MockOutput::default()),
        });
        Ok(Some(id))
    }

    fn process_output(&self, process: ProcessId) -> EngineResult<Arc<dyn ProcessOutput>> {
        let mut state = self.state.lock();
        let output = state.process(process)?.output.clone();
        Ok(output)
    }

    fn process_status(&mut self, process: ProcessId) -> EngineResult<ProcessStatus> {
        let mut state = self.state.lock();
        if state.fail_status_probe {
            return Err(EngineError::InvalidProcess(process));
        }

        let live = state.process(process)?;
        if !live.advance_on_probe {
            return Ok(live.status);
        }
        if live.running_polls_left > 0 {
            live.running_polls_left -= 1;
            return Ok(ProcessStatus::Running);
        }

        let next = state.stops.pop_front();
        let live = state.process(process)?;
        live.advance_on_probe = false;
        match next {
            Some(stop) => {
                live.current = Some(stop);
                live.status = ProcessStatus::Stopped;
            }
            None => {
                live.current = None;
                live.status = ProcessStatus::Exited(0);
                live.output.close();
            }
        }
        Ok(live.status)
    }

    fn step_into(&mut self, thread: ThreadId) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::StepInto);
        let process = state.stopped_process_of_thread(thread)?.id;
        state.start_running(process)
    }

    fn step_over(&mut self, thread: ThreadId) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::StepOver);
        let process = state.stopped_process_of_thread(thread)?.id;
        state.start_running(process)
    }

    fn resume(&mut self, process: ProcessId) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::Resume);
        let live = state.process(process)?;
        if live.status != ProcessStatus::Stopped {
            return Err(EngineError::InvalidState {
                process,
                action: "resume",
                state: live.status.as_str(),
            });
        }
        state.start_running(process)
    }

    fn kill(&mut self, process: ProcessId) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::Kill);
        let live = state.process(process)?;
        let status = live.status;
        match status {
            ProcessStatus::Stopped => Err(EngineError::InvalidState {
                process,
                action: "kill",
                state: "stopped",
            }),
            _ if status.is_terminal() => Ok(()),
            _ => {
                live.status = ProcessStatus::Exited(9);
                live.advance_on_probe = false;
                live.current = None;
                live.output.close();
                Ok(())
            }
        }
    }

    fn selected_thread(&mut self, process: ProcessId) -> EngineResult<Option<ThreadId>> {
        let mut state = self.state.lock();
        let live = state.process(process)?;
        Ok((!live.status.is_terminal()).then_some(live.thread))
    }

    fn selected_frame(&mut self, thread: ThreadId) -> EngineResult<Option<FrameId>> {
        let state = self.state.lock();
        if state.process.as_ref().map(|p| p.thread) != Some(thread) {
            return Err(EngineError::InvalidThread(thread));
        }
        Ok(state.current_stop().and_then(|stop| stop.frames.get(stop.selected)).map(|f| f.id))
    }

    fn frame_line_location(&mut self, frame: FrameId) -> EngineResult<Option<Loc>> {
        let state = self.state.lock();
        Ok(state.frame(frame)?.loc.clone())
    }

    fn list_frames(&mut self, thread: ThreadId) -> EngineResult<Vec<FrameInfo>> {
        let state = self.state.lock();
        if state.process.as_ref().map(|p| p.thread) != Some(thread) {
            return Err(EngineError::InvalidThread(thread));
        }
        let frames: Vec<FrameInfo> = state
            .current_stop()
            .map(|stop| {
                stop.frames
                    .iter()
                    .map(|f| FrameInfo {
                        id: f.id,
                        function: Some(f.function.clone()),
                        loc: f.loc.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(frames)
    }

    fn list_frame_variables(&mut self, frame: FrameId) -> EngineResult<Vec<VariableDesc>> {
        let mut state = self.state.lock();
        state.variable_listings += 1;
        Ok(state.frame(frame)?.variables.iter().map(|(desc, _)| desc.clone()).collect())
    }

    fn variable_value(&mut self, frame: FrameId, var: &VarId) -> EngineResult<String> {
        let mut state = self.state.lock();
        state.value_fetches += 1;
        state
            .frame(frame)?
            .variables
            .iter()
            .find(|(desc, _)| &desc.id == var)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| EngineError::Unavailable(var.to_string()))
    }
}
