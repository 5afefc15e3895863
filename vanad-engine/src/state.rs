// Copyright (c) The vanad-watch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The run state machine.
//!
//! [`RunState`] is the single authoritative record of the current or most
//! recent test run. It is created once at engine start and mutated only
//! here, one event at a time; the render planner treats it as read-only
//! input. Every child event carries a [`RunId`], and events whose run is no
//! longer live are discarded, so output delivered after a kill can never
//! resurrect a dead run.

use crate::{
    decoder::StreamDecoder,
    errors::{SpawnError, display_chain},
    records::TestResult,
    supervisor::RunHandle,
};
use std::fmt;
use tracing::{debug, trace};

/// Token identifying one run, monotonically increasing per start.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct RunId(u64);

impl RunId {
    /// The id the next run will get.
    pub(crate) fn next(self) -> RunId {
        RunId(self.0 + 1)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Informational outcome of a command that raced with the current phase.
///
/// These are expected races between user intent and run state, surfaced as
/// messages rather than errors; the command itself is a no-op.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Notice {
    /// `run-tests` was invoked while a run is already in flight.
    AlreadyRunning,
    /// `stop-tests` was invoked while nothing is running.
    NotRunning,
}

impl Notice {
    /// The user-visible message for this notice.
    pub fn message(self) -> &'static str {
        match self {
            Notice::AlreadyRunning => "Tests are already running",
            Notice::NotRunning => "No test run in progress",
        }
    }
}

/// Lifecycle phase of the engine.
///
/// The process handle and the stream decoder exist exactly while a run is
/// live, so a populated `Running` state with no process is unrepresentable.
#[derive(Debug, Default)]
pub enum Phase {
    /// No run in flight and no frozen run data on display.
    #[default]
    Idle,
    /// A child process is live and output is accumulating.
    Running {
        /// Handle used to kill the in-flight child.
        handle: RunHandle,
        /// Incremental decoder for the child's stdout stream.
        decoder: StreamDecoder,
    },
    /// The child exited normally. Results and errors are frozen until the
    /// next run or the next document edit.
    Settled,
}

/// The single mutable aggregate describing the current/most recent run.
#[derive(Debug, Default)]
pub struct RunState {
    phase: Phase,
    run_id: RunId,
    results: Vec<TestResult>,
    error_chunks: Vec<String>,
    watching: bool,
}

impl RunState {
    /// Creates the initial state: idle, empty history, watch mode off.
    pub fn new() -> Self {
        Self::default()
    }

    /// Results accumulated by the current/most recent run, in arrival
    /// order.
    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    /// Raw stderr fragments (and crash-shaped decode/spawn failures) of the
    /// current/most recent run, in arrival order.
    pub fn error_chunks(&self) -> &[String] {
        &self.error_chunks
    }

    /// True while a child process is live.
    pub fn is_running(&self) -> bool {
        matches!(self.phase, Phase::Running { .. })
    }

    /// True once a run has exited normally and its data is frozen.
    pub fn is_settled(&self) -> bool {
        matches!(self.phase, Phase::Settled)
    }

    /// Whether document saves auto-trigger runs.
    pub fn watching(&self) -> bool {
        self.watching
    }

    /// The id the next run will be tagged with.
    pub fn next_run_id(&self) -> RunId {
        self.run_id.next()
    }

    /// Starts a new run with a freshly spawned child.
    ///
    /// The caller checks [`is_running`](Self::is_running) first; starting
    /// while a run is live is the caller's informational no-op.
    pub fn begin_run(&mut self, handle: RunHandle) {
        debug_assert!(!self.is_running(), "begin_run while a run is live");
        self.results.clear();
        self.error_chunks.clear();
        self.run_id = handle.run_id();
        debug!(run_id = %self.run_id, "run started");
        self.phase = Phase::Running {
            handle,
            decoder: StreamDecoder::new(),
        };
    }

    /// Records that the child for a new run could not be spawned. The run
    /// is surfaced as a crash report and the phase returns to idle.
    pub fn on_spawn_failed(&mut self, error: &SpawnError) {
        self.results.clear();
        self.error_chunks.clear();
        self.error_chunks.push(display_chain(error));
        self.phase = Phase::Idle;
    }

    /// Folds a chunk of the child's stdout stream into the run. Returns
    /// false if the chunk belonged to a run that is no longer live.
    pub fn on_stdout_chunk(&mut self, run_id: RunId, bytes: &[u8]) -> bool {
        if !self.is_live(run_id) {
            return false;
        }
        let Phase::Running { decoder, .. } = &mut self.phase else {
            return false;
        };
        let decoded = decoder.decode_chunk(bytes);
        self.results.extend(decoded.results);
        if let Some(error) = decoded.error {
            self.error_chunks.push(display_chain(&error));
        }
        true
    }

    /// Appends a chunk of the child's stderr stream to the run's error
    /// chunks. Returns false if the chunk belonged to a dead run.
    pub fn on_stderr_chunk(&mut self, run_id: RunId, text: &str) -> bool {
        if !self.is_live(run_id) {
            return false;
        }
        self.error_chunks.push(text.to_owned());
        true
    }

    /// Settles the run after a normal child exit: the stream tail is
    /// flushed and the results/errors freeze. Returns false if the exit
    /// belonged to a dead run (a killed run never settles).
    pub fn on_process_exit(&mut self, run_id: RunId) -> bool {
        if !self.is_live(run_id) {
            trace!(%run_id, "discarding exit event for dead run");
            return false;
        }
        let Phase::Running { decoder, .. } = &mut self.phase else {
            return false;
        };
        let tail = decoder.finish();
        self.results.extend(tail.results);
        if let Some(error) = tail.error {
            self.error_chunks.push(display_chain(&error));
        }
        debug!(%run_id, results = self.results.len(), "run settled");
        self.phase = Phase::Settled;
        true
    }

    /// Kills the in-flight run and clears its partial data, so a stale
    /// "all passed" can never appear after a deliberate interruption.
    pub fn kill(&mut self) -> Option<Notice> {
        match &mut self.phase {
            Phase::Running { handle, .. } => {
                handle.kill();
                self.results.clear();
                self.error_chunks.clear();
                debug!(run_id = %self.run_id, "run killed");
                self.phase = Phase::Idle;
                None
            }
            _ => Some(Notice::NotRunning),
        }
    }

    /// Flips watch mode. Never starts or stops a run by itself.
    pub fn toggle_watch(&mut self) -> bool {
        self.watching = !self.watching;
        self.watching
    }

    /// Invalidates stale annotations after a document edit: line numbers
    /// have shifted, so prior caller locations are misleading. A live run
    /// is left alone.
    pub fn on_document_changed(&mut self) {
        if self.is_running() {
            return;
        }
        self.results.clear();
        self.error_chunks.clear();
        self.phase = Phase::Idle;
    }

    /// Returns true if this save should auto-trigger a run.
    pub fn on_document_saved(&self) -> bool {
        self.watching && !self.is_running()
    }

    fn is_live(&self, run_id: RunId) -> bool {
        if self.run_id != run_id || !self.is_running() {
            trace!(%run_id, current = %self.run_id, "discarding event for dead run");
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running_state() -> (RunState, RunId) {
        let mut state = RunState::new();
        let run_id = state.next_run_id();
        state.begin_run(RunHandle::disconnected(run_id));
        (state, run_id)
    }

    const RESULT_LINE: &[u8] = br#"{"title":"t1","diff":"x!=y","callers":[{"path":"/a.js","line":5}]}"#;

    #[test]
    fn initial_state_is_idle_and_empty() {
        let state = RunState::new();
        assert!(!state.is_running());
        assert!(!state.is_settled());
        assert!(!state.watching());
        assert!(state.results().is_empty());
        assert!(state.error_chunks().is_empty());
    }

    #[test]
    fn begin_run_clears_previous_history() {
        let (mut state, run_id) = running_state();
        let mut line = RESULT_LINE.to_vec();
        line.push(b'\n');
        assert!(state.on_stdout_chunk(run_id, &line));
        assert!(state.on_process_exit(run_id));
        assert_eq!(state.results().len(), 1);

        let next = state.next_run_id();
        state.begin_run(RunHandle::disconnected(next));
        assert!(state.results().is_empty());
        assert!(state.error_chunks().is_empty());
        assert!(state.is_running());
    }

    #[test]
    fn exit_flushes_unterminated_tail() {
        let (mut state, run_id) = running_state();
        // No trailing newline: the record completes at exit.
        assert!(state.on_stdout_chunk(run_id, RESULT_LINE));
        assert!(state.results().is_empty());
        assert!(state.on_process_exit(run_id));
        assert_eq!(state.results().len(), 1);
        assert!(state.is_settled());
    }

    #[test]
    fn malformed_stdout_becomes_an_error_chunk() {
        let (mut state, run_id) = running_state();
        assert!(state.on_stdout_chunk(run_id, b"garbage\n"));
        assert_eq!(state.error_chunks().len(), 1);
        assert!(state.error_chunks()[0].contains("malformed result line"));
    }

    #[test]
    fn kill_clears_partial_data_and_goes_idle() {
        let (mut state, run_id) = running_state();
        let mut line = RESULT_LINE.to_vec();
        line.push(b'\n');
        state.on_stdout_chunk(run_id, &line);
        state.on_stderr_chunk(run_id, "warning\n");

        assert_eq!(state.kill(), None);
        assert!(!state.is_running());
        assert!(!state.is_settled());
        assert!(state.results().is_empty());
        assert!(state.error_chunks().is_empty());
    }

    #[test]
    fn kill_while_idle_is_an_informational_no_op() {
        let mut state = RunState::new();
        assert_eq!(state.kill(), Some(Notice::NotRunning));
        assert!(!state.is_running());
    }

    #[test]
    fn late_events_after_kill_are_discarded() {
        let (mut state, run_id) = running_state();
        state.kill();

        let mut line = RESULT_LINE.to_vec();
        line.push(b'\n');
        assert!(!state.on_stdout_chunk(run_id, &line));
        assert!(!state.on_stderr_chunk(run_id, "late stderr"));
        assert!(!state.on_process_exit(run_id));
        assert!(state.results().is_empty());
        assert!(state.error_chunks().is_empty());
        // A killed run never settles, so no stale "all passed" render.
        assert!(!state.is_settled());
    }

    #[test]
    fn events_from_a_previous_run_are_discarded() {
        let (mut state, old_run) = running_state();
        state.kill();
        let next = state.next_run_id();
        state.begin_run(RunHandle::disconnected(next));

        assert!(!state.on_stderr_chunk(old_run, "stale"));
        assert!(state.error_chunks().is_empty());
        assert!(!state.on_process_exit(old_run));
        assert!(state.is_running());
    }

    #[test]
    fn spawn_failure_surfaces_as_crash_and_returns_to_idle() {
        let mut state = RunState::new();
        let error = SpawnError {
            program: "vanad".to_owned(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        state.on_spawn_failed(&error);
        assert!(!state.is_running());
        assert!(!state.is_settled());
        assert_eq!(state.error_chunks().len(), 1);
        assert!(state.error_chunks()[0].contains("failed to spawn test process `vanad`"));
    }

    #[test]
    fn document_change_clears_settled_data() {
        let (mut state, run_id) = running_state();
        let mut line = RESULT_LINE.to_vec();
        line.push(b'\n');
        state.on_stdout_chunk(run_id, &line);
        state.on_process_exit(run_id);
        assert!(state.is_settled());

        state.on_document_changed();
        assert!(state.results().is_empty());
        assert!(state.error_chunks().is_empty());
        assert!(!state.is_settled());
    }

    #[test]
    fn document_change_leaves_a_live_run_alone() {
        let (mut state, run_id) = running_state();
        let mut line = RESULT_LINE.to_vec();
        line.push(b'\n');
        state.on_stdout_chunk(run_id, &line);

        state.on_document_changed();
        assert!(state.is_running());
        assert_eq!(state.results().len(), 1);
    }

    #[test]
    fn watch_mode_controls_save_triggering() {
        let mut state = RunState::new();
        assert!(!state.on_document_saved());
        assert!(state.toggle_watch());
        assert!(state.on_document_saved());

        let run_id = state.next_run_id();
        state.begin_run(RunHandle::disconnected(run_id));
        // Already running: a save triggers nothing.
        assert!(!state.on_document_saved());

        // Watch mode persists across runs and kills.
        state.kill();
        assert!(state.watching());
        assert!(state.on_document_saved());
        assert!(!state.toggle_watch());
    }
}
