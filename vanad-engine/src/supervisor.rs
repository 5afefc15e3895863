// Copyright (c) The vanad-watch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Spawning and supervising the external vanad test process.
//!
//! One child process per run. A pump task owns the child, reads both pipes
//! until EOF, and forwards tagged [`ChildEvent`]s to the engine loop. The
//! exit event is only sent after both pipes are fully drained, so output
//! emitted before exit is always folded into the run before the run
//! settles. A kill request stops all forwarding immediately: a killed run
//! produces no further events and can never resurrect downstream state.

use crate::{config::EngineConfig, errors::SpawnError, state::RunId};
use bytes::{Bytes, BytesMut};
use camino::Utf8Path;
use std::process::Stdio;
use tokio::{
    io::AsyncReadExt,
    process::{Child, Command},
    sync::{mpsc::UnboundedSender, oneshot},
};
use tracing::{debug, warn};

/// An event produced by the supervisor for the engine loop.
///
/// Every event carries the [`RunId`] of the run that produced it; the state
/// machine discards events whose run is no longer live.
#[derive(Debug)]
pub enum ChildEvent {
    /// Raw bytes read from the child's stdout.
    Stdout {
        /// The run that produced this chunk.
        run_id: RunId,
        /// The chunk, with arbitrary boundaries.
        bytes: Bytes,
    },
    /// Raw bytes read from the child's stderr.
    Stderr {
        /// The run that produced this chunk.
        run_id: RunId,
        /// The chunk, with arbitrary boundaries.
        bytes: Bytes,
    },
    /// The child exited on its own. Sent after both pipes hit EOF and the
    /// child has been reaped; never sent for a killed run.
    Exited {
        /// The run that exited.
        run_id: RunId,
    },
}

/// Handle to an in-flight child process.
///
/// Held by the run state machine exactly while the run is in the `Running`
/// phase. Dropping the handle without killing it is treated as a kill (the
/// engine is shutting down).
#[derive(Debug)]
pub struct RunHandle {
    run_id: RunId,
    kill_tx: Option<oneshot::Sender<()>>,
}

impl RunHandle {
    /// The run this handle belongs to.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Requests termination of the child. Idempotent: the second and later
    /// calls do nothing, and a request after the child already exited is
    /// harmless.
    pub fn kill(&mut self) {
        if let Some(kill_tx) = self.kill_tx.take() {
            // The pump may already have finished; nothing to do then.
            let _ = kill_tx.send(());
        }
    }

    /// A handle not connected to any process.
    #[cfg(test)]
    pub(crate) fn disconnected(run_id: RunId) -> Self {
        Self {
            run_id,
            kill_tx: None,
        }
    }
}

/// Spawns the child with the fixed argument contract and starts its output
/// pump. Events are forwarded to `events`, tagged with `run_id`.
///
/// The invocation contract is `<program> --verbosity <v> --cwd <dir>
/// <entry>` where `<entry>` is the document the run was requested for.
pub fn spawn(
    config: &EngineConfig,
    entry: &Utf8Path,
    run_id: RunId,
    events: UnboundedSender<ChildEvent>,
) -> Result<RunHandle, SpawnError> {
    let mut command = Command::new(&config.program);
    command
        .arg("--verbosity")
        .arg(config.verbosity.as_str())
        .arg("--cwd")
        .arg(&config.cwd)
        .arg(entry)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn().map_err(|source| SpawnError {
        program: config.program.clone(),
        source,
    })?;
    debug!(%run_id, program = %config.program, "spawned test process");

    let (kill_tx, kill_rx) = oneshot::channel();
    tokio::spawn(pump(child, run_id, events, kill_rx));
    Ok(RunHandle {
        run_id,
        kill_tx: Some(kill_tx),
    })
}

/// Reads both pipes until EOF, then reaps the child and reports the exit.
async fn pump(
    mut child: Child,
    run_id: RunId,
    events: UnboundedSender<ChildEvent>,
    mut kill_rx: oneshot::Receiver<()>,
) {
    let mut stdout = child.stdout.take().expect("child stdout was piped");
    let mut stderr = child.stderr.take().expect("child stderr was piped");
    let mut stdout_buf = BytesMut::with_capacity(4096);
    let mut stderr_buf = BytesMut::with_capacity(4096);
    let mut stdout_done = false;
    let mut stderr_done = false;

    while !(stdout_done && stderr_done) {
        tokio::select! {
            read = stdout.read_buf(&mut stdout_buf), if !stdout_done => match read {
                Ok(0) => stdout_done = true,
                Ok(_) => {
                    let _ = events.send(ChildEvent::Stdout {
                        run_id,
                        bytes: stdout_buf.split().freeze(),
                    });
                }
                Err(error) => {
                    warn!(%run_id, %error, "error reading test process stdout");
                    stdout_done = true;
                }
            },
            read = stderr.read_buf(&mut stderr_buf), if !stderr_done => match read {
                Ok(0) => stderr_done = true,
                Ok(_) => {
                    let _ = events.send(ChildEvent::Stderr {
                        run_id,
                        bytes: stderr_buf.split().freeze(),
                    });
                }
                Err(error) => {
                    warn!(%run_id, %error, "error reading test process stderr");
                    stderr_done = true;
                }
            },
            // A deliberate interruption, or the handle was dropped during
            // engine shutdown. Either way: stop forwarding, reap, and do
            // not report an exit.
            _ = &mut kill_rx => {
                if let Err(error) = child.start_kill() {
                    // The child may have exited in the meantime.
                    debug!(%run_id, %error, "kill requested but child could not be signalled");
                }
                let _ = child.wait().await;
                debug!(%run_id, "test process killed");
                return;
            }
        }
    }

    match child.wait().await {
        Ok(status) => debug!(%run_id, %status, "test process exited"),
        Err(error) => warn!(%run_id, %error, "failed to reap test process"),
    }
    let _ = events.send(ChildEvent::Exited { run_id });
}
