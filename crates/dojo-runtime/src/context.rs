//! Per-run context shared by the supervisor and the driver.

use dojo_common::config::Config;

use crate::env::{EnvFiles, EnvSnapshot};

/// Everything a driver needs to know about the current run.
///
/// Built once before any task starts and never modified afterwards.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Docker-name-safe identifier, also the compose project name.
    pub run_id: String,
    /// Merged, validated configuration.
    pub config: Config,
    /// Host environment at startup.
    pub env: EnvSnapshot,
}

impl RunContext {
    /// Creates a context.
    #[must_use]
    pub const fn new(run_id: String, config: Config, env: EnvSnapshot) -> Self {
        Self {
            run_id,
            config,
            env,
        }
    }

    /// Paths of the generated environment files.
    #[must_use]
    pub fn env_files(&self) -> EnvFiles {
        EnvFiles::for_run(&self.run_id, self.config.test)
    }

    /// Whether the X11 socket should be shared.
    #[must_use]
    pub fn wants_x11(&self) -> bool {
        self.env.is_set("DISPLAY")
    }
}
