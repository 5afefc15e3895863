// Copyright (c) The vanad-watch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Test run lifecycle and failure attribution engine for vanad-watch.
//!
//! The engine launches the external vanad test process, incrementally
//! decodes its newline-delimited JSON result stream, correlates reported
//! failures (and crash stack traces) back to lines of the active document,
//! and computes idempotent render plans for the editor's status and
//! highlight sinks.
//!
//! Data flow: [`supervisor`] → raw bytes → [`decoder`] → structured
//! records → [`state`] → (state, document) → [`render`] → render plan →
//! [`engine::EditorSink`]. The editor-integration glue (command
//! registration, widget creation, workspace resolution) stays on the host
//! side of [`engine::EditorSink`] and the [`engine::EngineEvent`] channel.

pub mod config;
pub mod decoder;
pub mod engine;
pub mod errors;
pub mod records;
pub mod render;
pub mod stack;
pub mod state;
pub mod supervisor;
