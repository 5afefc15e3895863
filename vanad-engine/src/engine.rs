// Copyright (c) The vanad-watch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The engine loop.
//!
//! A single task owns the [`RunState`], the active document snapshot, and
//! the editor sinks, and applies every input to completion before the next
//! one: host commands and editor events from one channel, child events from
//! the supervisor on another, and a periodic render tick. No two
//! transitions interleave, which is the only mutual exclusion the
//! at-most-one-run invariant needs.
//!
//! After each input the render planner recomputes the desired UI state; the
//! plan is applied only when it differs from the one already applied, so
//! re-entrant updates never flicker. The tick exists purely to keep the
//! view consistent with the focused editor and never mutates state.

use crate::{
    config::EngineConfig,
    render::{self, DocumentSnapshot, DocumentView, Highlight, RenderPlan},
    state::{Notice, RunState},
    supervisor::{self, ChildEvent},
};
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::debug;

/// Commands exposed to the editor host, each a zero-argument trigger.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Command {
    /// Start a run against the active document.
    RunTests,
    /// Kill the in-flight run.
    StopTests,
    /// Flip watch mode.
    ToggleWatch,
    /// Clear highlights and frozen run data.
    ResetHighlighting,
}

/// Editor-side events consumed by the engine.
#[derive(Clone, Debug)]
pub enum EditorEvent {
    /// The document content changed (an unsaved edit).
    DocumentChanged(DocumentSnapshot),
    /// The document was saved to disk.
    DocumentSaved(DocumentSnapshot),
    /// The focused editor changed; `None` when no editor has focus.
    ActiveEditorChanged(Option<DocumentSnapshot>),
}

/// Any host-side input to the engine loop.
#[derive(Clone, Debug)]
pub enum EngineEvent {
    /// A user command.
    Command(Command),
    /// An editor notification.
    Editor(EditorEvent),
}

/// The editor-side rendering surface the engine drives.
///
/// This is the external collaborator boundary: a status display, a
/// highlight sink keyed to the active document, and a transient message
/// surface.
pub trait EditorSink {
    /// Displays the status text. The empty string hides the status entry.
    fn set_status(&mut self, text: &str);

    /// Replaces the full highlight set for the active document.
    fn set_highlights(&mut self, highlights: &[Highlight]);

    /// Shows a transient informational message.
    fn info(&mut self, message: &str);
}

/// The test run lifecycle engine.
///
/// Constructed once at editor-integration start; torn down at shutdown.
pub struct Engine<S> {
    config: EngineConfig,
    state: RunState,
    sink: S,
    active_document: Option<DocumentSnapshot>,
    last_plan: Option<RenderPlan>,
    child_tx: UnboundedSender<ChildEvent>,
    child_rx: UnboundedReceiver<ChildEvent>,
}

impl<S: EditorSink> Engine<S> {
    /// Creates an engine with an idle state and no active document.
    pub fn new(config: EngineConfig, sink: S) -> Self {
        let (child_tx, child_rx) = unbounded_channel();
        Self {
            config,
            state: RunState::new(),
            sink,
            active_document: None,
            last_plan: None,
            child_tx,
            child_rx,
        }
    }

    /// The authoritative run state, read-only.
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Runs the engine until the host closes the event channel.
    pub async fn run(mut self, mut events: UnboundedReceiver<EngineEvent>) {
        let mut tick = tokio::time::interval(Duration::from_millis(self.config.render_tick_ms));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            // Inputs are drained one at a time; each is handled to
            // completion (below) before the next is received.
            let input = tokio::select! {
                event = events.recv() => match event {
                    Some(event) => Input::Host(event),
                    None => break,
                },
                Some(event) = self.child_rx.recv() => Input::Child(event),
                _ = tick.tick() => Input::Tick,
            };

            match input {
                Input::Host(EngineEvent::Command(command)) => self.handle_command(command),
                Input::Host(EngineEvent::Editor(event)) => self.handle_editor_event(event),
                Input::Child(event) => self.handle_child_event(event),
                Input::Tick => {}
            }
            self.render();
        }
        debug!("engine event channel closed, shutting down");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::RunTests => self.start_run(),
            Command::StopTests => {
                if let Some(notice) = self.state.kill() {
                    self.notify(notice);
                }
            }
            Command::ToggleWatch => {
                let watching = self.state.toggle_watch();
                debug!(watching, "watch mode toggled");
            }
            Command::ResetHighlighting => self.state.on_document_changed(),
        }
    }

    fn handle_editor_event(&mut self, event: EditorEvent) {
        match event {
            EditorEvent::DocumentChanged(document) => {
                self.active_document = Some(document);
                self.state.on_document_changed();
            }
            EditorEvent::DocumentSaved(document) => {
                self.active_document = Some(document);
                if self.state.on_document_saved() {
                    self.start_run();
                }
            }
            EditorEvent::ActiveEditorChanged(document) => {
                // Only the matching step depends on focus; the render pass
                // after this event recomputes it.
                self.active_document = document;
            }
        }
    }

    fn handle_child_event(&mut self, event: ChildEvent) {
        match event {
            ChildEvent::Stdout { run_id, bytes } => {
                self.state.on_stdout_chunk(run_id, &bytes);
            }
            ChildEvent::Stderr { run_id, bytes } => {
                self.state
                    .on_stderr_chunk(run_id, &String::from_utf8_lossy(&bytes));
            }
            ChildEvent::Exited { run_id } => {
                self.state.on_process_exit(run_id);
            }
        }
    }

    fn start_run(&mut self) {
        if self.state.is_running() {
            self.notify(Notice::AlreadyRunning);
            return;
        }
        let Some(document) = &self.active_document else {
            debug!("run requested with no active document");
            return;
        };
        let run_id = self.state.next_run_id();
        match supervisor::spawn(&self.config, document.path(), run_id, self.child_tx.clone()) {
            Ok(handle) => self.state.begin_run(handle),
            Err(error) => self.state.on_spawn_failed(&error),
        }
    }

    fn notify(&mut self, notice: Notice) {
        debug!(?notice, "command raced with run state");
        self.sink.info(notice.message());
    }

    /// Recomputes the plan and applies it if it differs from the one the
    /// UI already reflects.
    fn render(&mut self) {
        let plan = render::plan(&self.state, self.active_document.as_ref());
        if self.last_plan.as_ref() == Some(&plan) {
            return;
        }
        self.sink.set_status(&plan.status.to_string());
        self.sink.set_highlights(&plan.highlights);
        self.last_plan = Some(plan);
    }
}

enum Input {
    Host(EngineEvent),
    Child(ChildEvent),
    Tick,
}
