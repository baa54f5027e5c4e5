//! docker-compose driver.
//!
//! The user command runs in the `default` service through
//! `docker-compose run`. The other services are started as its dependencies
//! and watched by the [`watchdog`](super::watchdog) while the command runs.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use dojo_common::config::LogsTarget;
use dojo_common::constants::{DEFAULT_SERVICE, PULL_PROJECT};
use dojo_common::error::{DojoError, Result};
use dojo_common::types::ContainerInfo;
use dojo_compose::file::{self, ComposeFile};
use dojo_compose::overlay::{Mounts, Overlay, override_path};
use dojo_compose::ps;

use super::{Driver, use_tty, warn_general};
use crate::context::RunContext;
use crate::files::FileService;
use crate::inspect;
use crate::latch::StopLatch;
use crate::shell::Shell;

const NO_SUCH_CONTAINER: &str = "No such container";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How docker-compose is invoked and which version it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeCli {
    /// `docker-compose` or `docker compose`.
    pub program: String,
    /// Output of `version --short`.
    pub version: String,
}

impl ComposeCli {
    /// Creates a CLI description without probing.
    #[must_use]
    pub fn new(program: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            version: version.into(),
        }
    }

    /// Prefers a standalone `docker-compose` binary, falls back to the
    /// `docker compose` plugin, and asks it for its version.
    ///
    /// # Errors
    ///
    /// Returns an error if the version command fails or prints nothing.
    pub fn detect(shell: &dyn Shell) -> Result<Self> {
        let program = if which::which("docker-compose").is_ok() {
            "docker-compose"
        } else {
            "docker compose"
        };
        let output = shell.run_captured(&format!("{program} version --short"), true)?;
        let version = output.stdout.trim();
        if !output.success() || version.is_empty() {
            return Err(DojoError::unexpected(output));
        }
        Ok(Self::new(program, version))
    }

    /// Whether `ps` can print JSON.
    #[must_use]
    pub fn supports_json(&self) -> bool {
        ps::supports_json(&self.version)
    }
}

/// Runs the user command in the `default` service of a compose project
/// named after the run ID.
pub struct ComposeDriver {
    pub(super) shell: Arc<dyn Shell>,
    pub(super) files: Arc<dyn FileService>,
    pub(super) cli: ComposeCli,
    pub(super) stopping: StopLatch,
    pub(super) poll_interval: Duration,
}

impl ComposeDriver {
    /// Creates a driver.
    #[must_use]
    pub fn new(shell: Arc<dyn Shell>, files: Arc<dyn FileService>, cli: ComposeCli) -> Self {
        Self {
            shell,
            files,
            cli,
            stopping: StopLatch::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Overrides the watchdog polling interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// `<compose> -f <file> -f <file>.dojo -p <project>`.
    #[must_use]
    pub fn command_prefix(&self, ctx: &RunContext, project: &str) -> String {
        let file = &ctx.config.docker_compose_file;
        format!(
            "{} -f {file} -f {} -p {project}",
            self.cli.program,
            override_path(file)
        )
    }

    /// Builds the `run` command for the `default` service.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when there is no command and no
    /// terminal: `run` would wait for input forever.
    pub fn run_command(&self, ctx: &RunContext) -> Result<String> {
        let config = &ctx.config;
        if !self.shell.is_interactive() && config.run_command.is_empty() {
            return Err(DojoError::config(
                "using driver docker-compose with an empty command when the shell is not interactive is unsupported, it would hang the terminal",
            ));
        }
        let mut cmd = format!("{} run --rm", self.command_prefix(ctx, &ctx.run_id));
        if !use_tty(ctx, self.shell.as_ref()) {
            cmd.push_str(" -T");
        }
        if !config.docker_compose_options.is_empty() {
            cmd.push(' ');
            cmd.push_str(&config.docker_compose_options);
        }
        cmd.push(' ');
        cmd.push_str(DEFAULT_SERVICE);
        if !config.run_command.is_empty() {
            cmd.push(' ');
            cmd.push_str(&config.run_command);
        }
        Ok(cmd)
    }

    /// `ps` for the run's project, JSON when supported.
    #[must_use]
    pub fn ps_command(&self, ctx: &RunContext) -> String {
        let mut cmd = format!("{} ps", self.command_prefix(ctx, &ctx.run_id));
        if self.cli.supports_json() {
            // Without --all, 2.x hides the one-off default container.
            cmd.push_str(" --format json --all");
        }
        cmd
    }

    fn mounts(ctx: &RunContext) -> Mounts {
        let env_files = ctx.env_files();
        Mounts {
            work_dir_outer: ctx.config.work_dir_outer.clone(),
            work_dir_inner: ctx.config.work_dir_inner.clone(),
            identity_dir_outer: ctx.config.identity_dir_outer.clone(),
            env_file: env_files.single_line.display().to_string(),
            multiline_file: env_files.multi_line.display().to_string(),
            bash_functions_file: env_files.bash_functions.display().to_string(),
            x11: ctx.wants_x11(),
        }
    }

    /// Validates the user's file and writes the initial override file.
    /// `None` means the file is invalid; the reason has been logged.
    fn prepare_override(&self, ctx: &RunContext) -> Result<Option<ComposeFile>> {
        let path = &ctx.config.docker_compose_file;
        let contents = self.files.read_file(Path::new(path))?;
        let compose_file = match file::verify(path, &contents) {
            Ok(f) => f,
            Err(e) => {
                tracing::error!(path = %path, "docker-compose file is not correct: {e}");
                return Ok(None);
            }
        };
        let overlay = Overlay::initial(compose_file.version.as_ref(), &ctx.config.docker_image);
        self.files
            .write_file(Path::new(&override_path(path)), &overlay.to_yaml()?)?;
        Ok(Some(compose_file))
    }

    fn expected_services(&self, ctx: &RunContext) -> Result<Vec<String>> {
        let cmd = format!("{} config --services", self.command_prefix(ctx, &ctx.run_id));
        let output = self.shell.run_captured(&cmd, true)?;
        if !output.success() {
            return Err(DojoError::unexpected(output));
        }
        let services: Vec<String> = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect();
        tracing::debug!(?services, "expected services");
        Ok(services)
    }

    /// Names of the project's containers, including the default one.
    ///
    /// # Errors
    ///
    /// Returns an error if `ps` fails for a reason other than a container
    /// vanishing while it ran.
    pub fn list_containers(&self, ctx: &RunContext) -> Result<Vec<String>> {
        let output = self.shell.run_captured(&self.ps_command(ctx), true)?;
        if !output.success() {
            if output.stderr.contains(NO_SUCH_CONTAINER) {
                // docker-compose sometimes trips over containers removed during ps.
                tracing::error!("{}", DojoError::unexpected(output));
                return Ok(Vec::new());
            }
            return Err(DojoError::unexpected(output));
        }
        if !self.cli.supports_json() {
            return Ok(ps::parse_table(&output.stdout));
        }
        match ps::parse_json(&output.stdout) {
            Ok(records) => Ok(records.into_iter().map(|r| r.name).collect()),
            Err(e) => {
                tracing::error!("{e}");
                Ok(Vec::new())
            }
        }
    }

    /// ID of the default container among `names`, `None` if it is gone.
    ///
    /// # Errors
    ///
    /// Propagates inspect failures.
    pub fn default_container_id(&self, names: &[String]) -> Result<Option<String>> {
        let Some(name) = names.iter().find(|n| ps::is_default_container(n)) else {
            tracing::debug!(?names, "default container not listed");
            return Ok(None);
        };
        let info = inspect::container_info(self.shell.as_ref(), name)?;
        if !info.exists {
            return Ok(None);
        }
        tracing::debug!(id = %info.id, "found default container");
        Ok(Some(info.id))
    }

    fn non_default_infos(&self, names: &[String]) -> Result<Vec<ContainerInfo>> {
        let mut infos = Vec::new();
        for name in names.iter().filter(|n| !ps::is_default_container(n)) {
            let info = inspect::container_info(self.shell.as_ref(), name)?;
            if info.exists {
                infos.push(info);
            }
        }
        Ok(infos)
    }

    /// Collects the state (and logs, per policy) of the non-default
    /// containers and folds their failures into the exit code.
    fn report(&self, ctx: &RunContext, exit_code: i32) -> Result<i32> {
        tracing::debug!("collecting information from non default containers");
        let names = self.list_containers(ctx)?;
        let mut infos = self.non_default_infos(&names)?;
        let others_failed = infos.iter().any(|i| i.exit_code != 0);

        if ctx.config.print_logs.wants_logs(others_failed || exit_code != 0) {
            for info in &mut infos {
                match inspect::container_logs(self.shell.as_ref(), &info.name) {
                    Ok(logs) => info.logs = Some(logs),
                    Err(e) => tracing::debug!(container = %info.name, "cannot get logs: {e}"),
                }
            }
            self.publish_logs(ctx, &infos)?;
        }

        if exit_code == 0 && others_failed {
            tracing::warn!("the default container succeeded but another container failed");
            return Ok(1);
        }
        Ok(exit_code)
    }

    fn publish_logs(&self, ctx: &RunContext, infos: &[ContainerInfo]) -> Result<()> {
        for info in infos {
            let logs = info.logs.as_deref().unwrap_or_default();
            match ctx.config.print_logs_target {
                LogsTarget::File => {
                    let path = self
                        .files
                        .current_dir()?
                        .join(format!("dojo-logs-{}-{}.txt", info.name, ctx.run_id));
                    self.files.write_file(&path, logs)?;
                    tracing::info!(
                        "the logs of container: {}, {}, were saved to file: {}",
                        info.name,
                        info.describe(),
                        path.display()
                    );
                }
                LogsTarget::Console => {
                    tracing::info!(
                        "here are logs of container: {}, {}:\n{logs}",
                        info.name,
                        info.describe()
                    );
                }
            }
        }
        Ok(())
    }

    /// Stops the default container (if given) and the rest of the project.
    /// Only the first caller does anything.
    fn stop(&self, ctx: &RunContext, default_id: Option<&str>) -> Result<i32> {
        if !self.stopping.claim() {
            tracing::debug!("containers are already being stopped");
            return Ok(0);
        }
        if let Some(id) = default_id {
            // `docker-compose stop` leaves one-off containers alone.
            let output = self.shell.run_captured(&format!("docker stop {id}"), true)?;
            if !output.success() && !output.mentions(NO_SUCH_CONTAINER) {
                tracing::error!("{}", DojoError::unexpected(output));
            }
        }
        let cmd = format!("{} stop", self.command_prefix(ctx, &ctx.run_id));
        tracing::info!(command = %cmd, "stopping containers");
        let exit = self.shell.run_interactive(&cmd, true)?;
        tracing::debug!(exit_code = exit.code, "stop command finished");
        Ok(exit.code)
    }

    fn kill(&self, ctx: &RunContext, default_id: Option<&str>) -> Result<i32> {
        if let Some(id) = default_id {
            let output = self.shell.run_captured(&format!("docker kill {id}"), true)?;
            if !output.success()
                && !output.mentions(NO_SUCH_CONTAINER)
                && !output.mentions("is not running")
            {
                tracing::error!("{}", DojoError::unexpected(output));
            }
        }
        let cmd = format!("{} kill", self.command_prefix(ctx, &ctx.run_id));
        tracing::info!(command = %cmd, "killing containers");
        let exit = self.shell.run_interactive(&cmd, true)?;
        tracing::debug!(exit_code = exit.code, "kill command finished");
        Ok(exit.code)
    }

    /// Ends the run at once when the watchdog can no longer observe the
    /// containers, instead of letting the user command run unwatched.
    fn stop_after_watch_failure(&self, ctx: &RunContext) {
        let default_id = self
            .list_containers(ctx)
            .and_then(|names| self.default_container_id(&names))
            .unwrap_or_else(|e| {
                tracing::error!("cannot find the default container: {e}");
                None
            });
        if let Err(e) = self.stop(ctx, default_id.as_deref()) {
            tracing::error!("stopping containers failed: {e}");
        }
    }

    /// Runs the foreground command next to the watchdog and stops the
    /// project afterwards.
    fn run_watched(&self, ctx: &RunContext, cmd: &str, expected: usize) -> Result<i32> {
        std::thread::scope(|scope| {
            let watchdog = scope.spawn(|| {
                let watched = self.watch(ctx, expected);
                if let Err(e) = &watched {
                    tracing::error!("watching containers failed: {e}");
                    self.stop_after_watch_failure(ctx);
                }
                watched
            });

            let finished = self.shell.run_interactive(cmd, true).and_then(|exit| {
                tracing::debug!(exit_code = exit.code, "run command finished");
                self.report(ctx, exit.code)
            });
            let stopped = self.stop(ctx, None);
            // Releases the watchdog even if stop() bailed out early.
            let _ = self.stopping.claim();
            let watched = watchdog
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic));

            let code = finished?;
            let _ = stopped?;
            watched?;
            Ok(code)
        })
    }
}

impl Driver for ComposeDriver {
    fn handle_run(&self, ctx: &RunContext) -> Result<i32> {
        warn_general(self.files.as_ref(), ctx);
        ctx.env_files()
            .write(self.files.as_ref(), &ctx.config.blacklist_variables, &ctx.env)?;
        let Some(compose_file) = self.prepare_override(ctx)? else {
            return Ok(1);
        };

        let services = self.expected_services(ctx)?;
        let overlay = Overlay::initial(compose_file.version.as_ref(), &ctx.config.docker_image)
            .with_environment(&services, &Self::mounts(ctx), ctx.config.preserve_env_to_all);
        self.files.write_file(
            Path::new(&override_path(&ctx.config.docker_compose_file)),
            &overlay.to_yaml()?,
        )?;

        let cmd = match self.run_command(ctx) {
            Ok(cmd) => cmd,
            Err(e) if e.is_config() => {
                tracing::error!("{e}");
                return Ok(1);
            }
            Err(e) => return Err(e),
        };
        if self.stopping.is_set() {
            tracing::info!("aborting containers start");
            return Ok(0);
        }
        tracing::info!(command = %cmd, "docker-compose run command will be");
        self.run_watched(ctx, &cmd, services.len())
    }

    fn handle_pull(&self, ctx: &RunContext) -> Result<i32> {
        if self.prepare_override(ctx)?.is_none() {
            return Ok(1);
        }
        // The project name does not matter for pull.
        let cmd = format!("{} pull", self.command_prefix(ctx, PULL_PROJECT));
        tracing::info!(command = %cmd, "docker-compose pull command will be");
        let exit = self.shell.run_interactive(&cmd, false)?;
        tracing::debug!(exit_code = exit.code, "pull command finished");
        if ctx.config.remove_containers {
            self.files
                .remove_file(Path::new(&override_path(&ctx.config.docker_compose_file)))?;
        }
        Ok(exit.code)
    }

    fn handle_signal(&self, ctx: &RunContext) -> Result<i32> {
        tracing::info!(run_id = %ctx.run_id, "stopping on signal");
        if self.stopping.is_set() {
            tracing::info!("containers are already being stopped, ignoring signal");
            return Ok(0);
        }
        let names = self.list_containers(ctx)?;
        if names.is_empty() {
            tracing::info!("stopping not needed, the containers were not created");
            return Ok(0);
        }
        let default_id = self.default_container_id(&names)?;
        let code = self.stop(ctx, default_id.as_deref())?;
        tracing::info!("stopping on signal finished");
        Ok(code)
    }

    fn handle_multiple_signal(&self, ctx: &RunContext) -> Result<i32> {
        tracing::info!(run_id = %ctx.run_id, "stopping on multiple signals");
        let names = self.list_containers(ctx)?;
        if names.is_empty() {
            tracing::info!("killing not needed, the containers were not created");
            return Ok(0);
        }
        let default_id = self.default_container_id(&names)?;
        let code = self.kill(ctx, default_id.as_deref())?;
        tracing::info!("stopping on multiple signals finished");
        Ok(code)
    }

    fn clean_after_run(&self, ctx: &RunContext) -> Result<i32> {
        if !ctx.config.remove_containers {
            tracing::debug!("not cleaning, containers are kept");
            return Ok(0);
        }
        let override_file = override_path(&ctx.config.docker_compose_file);
        let override_file = Path::new(&override_file);
        let mut code = 0;
        if self.files.exists(override_file) {
            // down, unlike rm, also removes the network.
            let cmd = format!("{} down", self.command_prefix(ctx, &ctx.run_id));
            tracing::info!(command = %cmd, "removing containers");
            code = self.shell.run_interactive(&cmd, true)?.code;
        } else {
            tracing::debug!("override file missing, nothing was started");
        }
        ctx.env_files().remove(self.files.as_ref())?;
        self.files.remove_file(override_file)?;
        Ok(code)
    }
}
