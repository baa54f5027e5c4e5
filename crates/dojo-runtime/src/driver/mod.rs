//! Container drivers.
//!
//! A [`Driver`] owns the containers of one run. [`docker::DockerDriver`]
//! runs a single container, [`compose::ComposeDriver`] a docker-compose
//! project whose `default` service runs the user command.

pub mod compose;
pub mod docker;
pub mod watchdog;

use std::path::Path;
use std::sync::Arc;

use dojo_common::config::DriverKind;
use dojo_common::error::Result;

use crate::context::RunContext;
use crate::files::FileService;
use crate::shell::Shell;

/// Run lifecycle of one container set.
///
/// Every method returns the exit code to report. `Err` means the engine
/// misbehaved and the run must be abandoned.
pub trait Driver: Send + Sync {
    /// Starts the containers and blocks until the user command exits.
    ///
    /// # Errors
    ///
    /// Returns an error on unexpected engine failures.
    fn handle_run(&self, ctx: &RunContext) -> Result<i32>;

    /// Pulls the image(s).
    ///
    /// # Errors
    ///
    /// Returns an error on unexpected engine failures.
    fn handle_pull(&self, ctx: &RunContext) -> Result<i32>;

    /// Gracefully stops the containers after the first signal.
    ///
    /// # Errors
    ///
    /// Returns an error on unexpected engine failures.
    fn handle_signal(&self, ctx: &RunContext) -> Result<i32>;

    /// Kills the containers after a second signal.
    ///
    /// # Errors
    ///
    /// Returns an error on unexpected engine failures.
    fn handle_multiple_signal(&self, ctx: &RunContext) -> Result<i32>;

    /// Removes whatever the run left behind.
    ///
    /// # Errors
    ///
    /// Returns an error on unexpected engine failures.
    fn clean_after_run(&self, ctx: &RunContext) -> Result<i32>;
}

/// Creates the driver selected in the configuration.
///
/// # Errors
///
/// Returns an error if the docker-compose version cannot be determined.
pub fn create_driver(
    kind: DriverKind,
    shell: Arc<dyn Shell>,
    files: Arc<dyn FileService>,
) -> Result<Arc<dyn Driver>> {
    tracing::debug!(driver = %kind, "creating driver");
    Ok(match kind {
        DriverKind::Docker => Arc::new(docker::DockerDriver::new(shell, files)),
        DriverKind::DockerCompose => {
            let cli = compose::ComposeCli::detect(shell.as_ref())?;
            tracing::info!(program = %cli.program, version = %cli.version, "using docker-compose");
            Arc::new(compose::ComposeDriver::new(shell, files, cli))
        }
    })
}

/// Setup problems that do not stop the run but are likely to surprise.
#[must_use]
pub fn general_warnings(files: &dyn FileService, ctx: &RunContext) -> Vec<String> {
    let config = &ctx.config;
    let mut warnings = Vec::new();
    match files.owner_uid(Path::new(&config.work_dir_outer)) {
        Some(0) => warnings.push(format!(
            "WorkDirOuter: {} is owned by root, which is not recommended",
            config.work_dir_outer
        )),
        Some(_) => {}
        None => warnings.push(format!("WorkDirOuter: {} does not exist", config.work_dir_outer)),
    }
    if !files.exists(Path::new(&config.identity_dir_outer)) {
        warnings.push(format!("IdentityDirOuter: {} does not exist", config.identity_dir_outer));
    }
    if ctx.env.current_user_is_root {
        warnings.push("current user is root, which is not recommended".to_owned());
    }
    warnings
}

/// Logs [`general_warnings`].
pub fn warn_general(files: &dyn FileService, ctx: &RunContext) {
    for warning in general_warnings(files, ctx) {
        tracing::warn!("{warning}");
    }
}

/// Whether the user command gets a TTY: forced by the configuration, or
/// inherited from dojo's own terminal when unset.
pub(crate) fn use_tty(ctx: &RunContext, shell: &dyn Shell) -> bool {
    ctx.config.interactive.unwrap_or_else(|| shell.is_interactive())
}
