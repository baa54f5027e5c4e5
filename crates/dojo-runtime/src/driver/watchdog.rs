//! Watches the non-default compose containers while the user command runs.
//!
//! With `exit_behavior = abort`, a dependency that exits on its own stops
//! the default container, which ends the run. With `restart` it is started
//! again. `ignore` does not watch at all.

use std::time::{Duration, Instant};

use dojo_common::config::ExitBehavior;
use dojo_common::error::Result;
use dojo_compose::ps::is_default_container;

use super::compose::ComposeDriver;
use crate::context::RunContext;
use crate::inspect;

const PAUSE_SLICE: Duration = Duration::from_millis(100);

impl ComposeDriver {
    /// Runs until stopping is requested or, with `abort`, until a
    /// dependency has exited and the default container was stopped.
    ///
    /// # Errors
    ///
    /// Propagates unexpected engine failures.
    pub fn watch(&self, ctx: &RunContext, expected: usize) -> Result<()> {
        let behavior = ctx.config.exit_behavior;
        if behavior == ExitBehavior::Ignore {
            tracing::debug!("exit behavior is ignore, not watching containers");
            return Ok(());
        }
        let names = self.wait_for_running(ctx, expected)?;
        tracing::debug!(?names, %behavior, "watching containers");

        while !self.stopping.is_set() {
            for name in &names {
                if self.stopping.is_set() {
                    return Ok(());
                }
                if inspect::is_running(self.shell.as_ref(), name)? {
                    continue;
                }
                match behavior {
                    ExitBehavior::Restart => {
                        tracing::info!(container = %name, "container stopped by itself, restarting it");
                        let output = self
                            .shell
                            .run_captured(&format!("docker start {name}"), true)?;
                        tracing::info!(container = %name, exit_code = output.exit_code, "restart finished");
                    }
                    ExitBehavior::Abort => {
                        if is_default_container(name) {
                            // The run itself is ending, nothing to abort.
                            return Ok(());
                        }
                        tracing::info!(container = %name, "container stopped by itself, stopping the default container");
                        self.stop_default(&names)?;
                        return Ok(());
                    }
                    ExitBehavior::Ignore => {}
                }
            }
            self.pause();
        }
        Ok(())
    }

    /// Polls `ps` until `expected` containers are listed and all of them
    /// run. Returns their names, or nothing once stopping is requested.
    ///
    /// # Errors
    ///
    /// Propagates unexpected engine failures.
    pub fn wait_for_running(&self, ctx: &RunContext, expected: usize) -> Result<Vec<String>> {
        while !self.stopping.is_set() {
            let names = self.list_containers(ctx)?;
            if names.len() == expected && self.all_running(&names)? {
                tracing::debug!(count = expected, "all containers are running");
                return Ok(names);
            }
            self.pause();
        }
        Ok(Vec::new())
    }

    fn all_running(&self, names: &[String]) -> Result<bool> {
        for name in names {
            if !inspect::is_running(self.shell.as_ref(), name)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn stop_default(&self, names: &[String]) -> Result<()> {
        let Some(id) = self.default_container_id(names)? else {
            tracing::debug!("default container is gone already");
            return Ok(());
        };
        let output = self.shell.run_captured(&format!("docker stop {id}"), true)?;
        tracing::info!(id = %id, exit_code = output.exit_code, "default container stopped");
        Ok(())
    }

    /// Sleeps one poll interval, waking early when stopping is requested.
    fn pause(&self) {
        let deadline = Instant::now() + self.poll_interval;
        loop {
            let now = Instant::now();
            if now >= deadline || self.stopping.is_set() {
                return;
            }
            std::thread::sleep(PAUSE_SLICE.min(deadline - now));
        }
    }
}
