// Copyright (c) The vanad-watch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by the engine.

use thiserror::Error;

/// A line on the child's stdout stream failed to decode as a result record.
///
/// This is a crash-shaped condition for the run, not an engine failure: a
/// malformed line usually means the child process died mid-write. The state
/// machine folds it into the run's error chunks so it surfaces as a crash
/// report instead of being dropped.
#[derive(Debug, Error)]
#[error("malformed result line: {line:?}")]
pub struct StreamDecodeError {
    pub(crate) line: String,
    #[source]
    pub(crate) source: serde_json::Error,
}

impl StreamDecodeError {
    /// The raw line that failed to decode.
    pub fn line(&self) -> &str {
        &self.line
    }
}

/// The child test process could not be started.
#[derive(Debug, Error)]
#[error("failed to spawn test process `{program}`")]
pub struct SpawnError {
    pub(crate) program: String,
    #[source]
    pub(crate) source: std::io::Error,
}

impl SpawnError {
    /// The program that failed to start.
    pub fn program(&self) -> &str {
        &self.program
    }
}

/// An error that occurred while reading engine configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The TOML text failed to parse.
    #[error("failed to parse engine config")]
    Parse(#[from] toml::de::Error),

    /// The configured child program is empty.
    #[error("config field `program` must not be empty")]
    EmptyProgram,
}

/// Renders an error and its source chain on a single line.
pub(crate) fn display_chain(error: &dyn std::error::Error) -> String {
    let mut out = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
