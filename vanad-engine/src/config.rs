// Copyright (c) The vanad-watch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engine configuration.
//!
//! The editor host hands the engine a single TOML blob (typically read from
//! the workspace settings) describing how to invoke the vanad child
//! process.

use crate::errors::ConfigError;
use camino::Utf8PathBuf;
use serde::Deserialize;

/// Verbosity forwarded to the child test process.
#[derive(Copy, Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum Verbosity {
    /// Result records only.
    #[default]
    Basic,
    /// Result records plus per-assertion detail.
    Full,
}

impl Verbosity {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Verbosity::Basic => "basic",
            Verbosity::Full => "full",
        }
    }
}

/// Configuration for launching the vanad child process.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct EngineConfig {
    /// Program to execute.
    pub program: String,
    /// Value of the `--verbosity` flag passed to the child.
    #[serde(default)]
    pub verbosity: Verbosity,
    /// Value of the `--cwd` flag: the directory the child runs tests in.
    pub cwd: Utf8PathBuf,
    /// Period of the render tick, in milliseconds.
    #[serde(default = "default_render_tick_ms")]
    pub render_tick_ms: u64,
}

fn default_render_tick_ms() -> u64 {
    500
}

impl EngineConfig {
    /// Parses engine configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        if config.program.is_empty() {
            return Err(ConfigError::EmptyProgram);
        }
        Ok(config)
    }
}
