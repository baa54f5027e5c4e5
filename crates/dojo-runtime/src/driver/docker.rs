//! Single container driver (`docker run`).

use std::sync::Arc;

use dojo_common::constants::{
    BASH_FUNCTIONS_INNER, IDENTITY_DIR_INNER, MULTILINE_VARS_INNER, RUN_ID_ENV_FILE,
    RUN_ID_TEXT_FILE, X11_SOCKET_DIR,
};
use dojo_common::error::{DojoError, Result};

use super::{Driver, use_tty, warn_general};
use crate::context::RunContext;
use crate::files::FileService;
use crate::inspect;
use crate::shell::Shell;

const NO_SUCH_CONTAINER: &str = "No such container";

/// Runs the user command in one container named after the run ID.
pub struct DockerDriver {
    shell: Arc<dyn Shell>,
    files: Arc<dyn FileService>,
}

impl DockerDriver {
    /// Creates a driver.
    #[must_use]
    pub fn new(shell: Arc<dyn Shell>, files: Arc<dyn FileService>) -> Self {
        Self { shell, files }
    }

    /// Builds the `docker run` command line.
    #[must_use]
    pub fn run_command(&self, ctx: &RunContext) -> String {
        let config = &ctx.config;
        let env_files = ctx.env_files();
        let mut cmd = String::from("docker run");
        if config.remove_containers {
            cmd.push_str(" --rm");
        }
        cmd.push_str(&format!(
            " -v {}:{} -v {}:{IDENTITY_DIR_INNER}:ro -v {}:{MULTILINE_VARS_INNER} -v {}:{BASH_FUNCTIONS_INNER}",
            config.work_dir_outer,
            config.work_dir_inner,
            config.identity_dir_outer,
            env_files.multi_line.display(),
            env_files.bash_functions.display(),
        ));
        cmd.push_str(&format!(" --env-file={}", env_files.single_line.display()));
        if ctx.wants_x11() {
            cmd.push_str(&format!(" -v {X11_SOCKET_DIR}:{X11_SOCKET_DIR}"));
        }
        if !config.docker_options.is_empty() {
            cmd.push(' ');
            cmd.push_str(&config.docker_options);
        }
        if use_tty(ctx, self.shell.as_ref()) {
            cmd.push_str(" -ti");
        }
        cmd.push_str(&format!(" --name={} {}", ctx.run_id, config.docker_image));
        if !config.run_command.is_empty() {
            cmd.push(' ');
            cmd.push_str(&config.run_command);
        }
        cmd
    }

    /// Leaves the run ID in the working directory so that the kept
    /// container can be found later.
    fn write_run_id_files(&self, ctx: &RunContext) -> Result<()> {
        let cwd = self.files.current_dir()?;
        let text = cwd.join(RUN_ID_TEXT_FILE);
        self.files.remove_file(&text)?;
        self.files.write_file(&text, &ctx.run_id)?;
        let env = cwd.join(RUN_ID_ENV_FILE);
        self.files.remove_file(&env)?;
        self.files.write_file(&env, &format!("DOJO_RUN_ID={}", ctx.run_id))?;
        tracing::info!(path = %text.display(), "run ID saved");
        Ok(())
    }
}

impl Driver for DockerDriver {
    fn handle_run(&self, ctx: &RunContext) -> Result<i32> {
        warn_general(self.files.as_ref(), ctx);
        ctx.env_files()
            .write(self.files.as_ref(), &ctx.config.blacklist_variables, &ctx.env)?;

        let cmd = self.run_command(ctx);
        tracing::info!(command = %cmd, "docker command will be");
        if !ctx.config.remove_containers {
            self.write_run_id_files(ctx)?;
        }
        let exit = self.shell.run_interactive(&cmd, true)?;
        tracing::debug!(exit_code = exit.code, "run command finished");
        // Cleanup waits for the supervisor: a signal handler may still be stopping the container.
        Ok(exit.code)
    }

    fn handle_pull(&self, ctx: &RunContext) -> Result<i32> {
        let cmd = format!("docker pull {}", ctx.config.docker_image);
        tracing::info!(command = %cmd, "docker pull command will be");
        let exit = self.shell.run_interactive(&cmd, false)?;
        tracing::debug!(exit_code = exit.code, "pull command finished");
        Ok(exit.code)
    }

    fn handle_signal(&self, ctx: &RunContext) -> Result<i32> {
        tracing::info!(run_id = %ctx.run_id, "stopping on signal");
        let info = inspect::container_info(self.shell.as_ref(), &ctx.run_id)?;
        if !info.exists {
            tracing::info!("container already removed or not created at all");
            let name = format!("--name={}", ctx.run_id);
            if let Some(pid) = self.shell.interrupt_matching(&["docker run", &name])? {
                tracing::info!(pid, "interrupted docker run to stop the image pull");
            }
            return Ok(0);
        }

        let cmd = format!("docker stop {}", ctx.run_id);
        tracing::info!(command = %cmd, "stopping container");
        let output = self.shell.run_captured(&cmd, true)?;
        if output.success() || output.mentions(NO_SUCH_CONTAINER) {
            tracing::info!("stopping on signal finished");
            return Ok(0);
        }
        tracing::error!("{}", DojoError::unexpected(output.clone()));
        Ok(output.exit_code)
    }

    fn handle_multiple_signal(&self, ctx: &RunContext) -> Result<i32> {
        tracing::info!(run_id = %ctx.run_id, "stopping on multiple signals");
        let info = inspect::container_info(self.shell.as_ref(), &ctx.run_id)?;
        if !info.exists {
            tracing::info!("container already removed or not created at all, ignoring signal");
            return Ok(0);
        }

        let cmd = format!("docker kill {}", ctx.run_id);
        tracing::info!(command = %cmd, "killing container");
        let output = self.shell.run_captured(&cmd, true)?;
        if output.success() || output.mentions(NO_SUCH_CONTAINER) || output.mentions("is not running") {
            tracing::info!("stopping on multiple signals finished");
            return Ok(0);
        }
        tracing::debug!(%output, "docker kill failed");
        Ok(output.exit_code)
    }

    fn clean_after_run(&self, ctx: &RunContext) -> Result<i32> {
        if !ctx.config.remove_containers {
            tracing::debug!("not cleaning, containers are kept");
            return Ok(0);
        }
        tracing::debug!("cleaning generated environment files");
        // `docker run --rm` already removed the container itself.
        ctx.env_files().remove(self.files.as_ref())?;
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use dojo_common::config::Config;

    use super::*;
    use crate::env::EnvSnapshot;
    use crate::inspect::inspect_command;
    use crate::testing::{MemoryFiles, ScriptedShell};

    const RUN_ID: &str = "testdojorunid";

    fn context(config: Config) -> RunContext {
        RunContext::new(
            RUN_ID.into(),
            config,
            EnvSnapshot {
                variables: vec!["ABC=123".into()],
                current_user_is_root: false,
            },
        )
    }

    fn config() -> Config {
        Config {
            work_dir_outer: "/tmp/bla".into(),
            identity_dir_outer: "/home/me".into(),
            docker_image: "img:1.2.3".into(),
            run_command: "bash".into(),
            interactive: Some(false),
            test: true,
            ..Config::default()
        }
    }

    fn driver() -> (DockerDriver, Arc<ScriptedShell>, Arc<MemoryFiles>) {
        let shell = Arc::new(ScriptedShell::new());
        let files = Arc::new(MemoryFiles::new("/work"));
        (DockerDriver::new(shell.clone(), files.clone()), shell, files)
    }

    const BASE: &str = "docker run --rm -v /tmp/bla:/dojo/work -v /home/me:/dojo/identity:ro \
-v /tmp/test-dojo-environment-multiline-testdojorunid:/etc/dojo.d/variables/00-multiline-vars.sh \
-v /tmp/test-dojo-environment-bash-functions-testdojorunid:/etc/dojo.d/variables/01-bash-functions.sh \
--env-file=/tmp/test-dojo-environment-testdojorunid";

    #[test]
    fn run_command_without_tty() {
        let (driver, _, _) = driver();
        assert_eq!(
            driver.run_command(&context(config())),
            format!("{BASE} --name=testdojorunid img:1.2.3 bash")
        );
    }

    #[test]
    fn run_command_with_options_and_forced_tty() {
        let (driver, _, _) = driver();
        let ctx = context(Config {
            docker_options: "-p 80:80".into(),
            interactive: Some(true),
            ..config()
        });
        assert_eq!(
            driver.run_command(&ctx),
            format!("{BASE} -p 80:80 -ti --name=testdojorunid img:1.2.3 bash")
        );
    }

    #[test]
    fn unset_interactive_follows_terminal() {
        let shell = Arc::new(ScriptedShell::new().with_terminal(true));
        let driver = DockerDriver::new(shell, Arc::new(MemoryFiles::new("/work")));
        let ctx = context(Config {
            interactive: None,
            run_command: String::new(),
            ..config()
        });
        assert_eq!(
            driver.run_command(&ctx),
            format!("{BASE} -ti --name=testdojorunid img:1.2.3")
        );
    }

    #[test]
    fn display_shares_x11_socket() {
        let (driver, _, _) = driver();
        let mut ctx = context(config());
        ctx.env.variables.push("DISPLAY=:0".into());
        assert!(driver.run_command(&ctx).contains(" -v /tmp/.X11-unix:/tmp/.X11-unix "));
    }

    #[test]
    fn handle_run_returns_docker_exit_code_and_cleans_env_files() {
        let (driver, shell, files) = driver();
        let ctx = context(Config {
            run_command: "whoami".into(),
            ..config()
        });
        let cmd = driver.run_command(&ctx);
        shell.respond(&cmd, "", "", 0);

        assert_eq!(driver.handle_run(&ctx).unwrap(), 0);
        assert_eq!(shell.executed(), vec![cmd]);
        let env_file = PathBuf::from("/tmp/test-dojo-environment-testdojorunid");
        assert_eq!(files.contents(&env_file).as_deref(), Some("ABC=123\n"));
        assert!(files.contents(&PathBuf::from("/work/dojorc.txt")).is_none());

        assert_eq!(driver.clean_after_run(&ctx).unwrap(), 0);
        assert!(files.paths().is_empty(), "{:?}", files.paths());
    }

    #[test]
    fn kept_containers_leave_run_id_files() {
        let (driver, shell, files) = driver();
        let ctx = context(Config {
            remove_containers: false,
            ..config()
        });
        shell.respond(&driver.run_command(&ctx), "", "", 3);

        assert_eq!(driver.handle_run(&ctx).unwrap(), 3);
        assert_eq!(
            files.contents(&PathBuf::from("/work/dojorc.txt")).as_deref(),
            Some(RUN_ID)
        );
        assert_eq!(
            files.contents(&PathBuf::from("/work/dojorc")).as_deref(),
            Some("DOJO_RUN_ID=testdojorunid")
        );

        assert_eq!(driver.clean_after_run(&ctx).unwrap(), 0);
        assert!(files.contents(&PathBuf::from("/tmp/test-dojo-environment-testdojorunid")).is_some());
    }

    #[test]
    fn pull_runs_docker_pull() {
        let (driver, shell, _) = driver();
        shell.respond("docker pull img:1.2.3", "", "", 1);
        assert_eq!(driver.handle_pull(&context(config())).unwrap(), 1);
    }

    #[test]
    fn signal_stops_existing_container() {
        let (driver, shell, _) = driver();
        shell.respond(&inspect_command(RUN_ID), "abc /testdojorunid running 0", "", 0);

        assert_eq!(driver.handle_signal(&context(config())).unwrap(), 0);
        assert_eq!(shell.count("docker stop testdojorunid"), 1);
    }

    #[test]
    fn signal_without_container_interrupts_pending_run() {
        let (driver, shell, _) = driver();
        shell.respond(&inspect_command(RUN_ID), "", "Error: No such object: testdojorunid", 1);

        assert_eq!(driver.handle_signal(&context(config())).unwrap(), 0);
        assert_eq!(shell.count_prefix("docker stop"), 0);
        assert_eq!(shell.interrupted(), vec!["docker run --name=testdojorunid"]);
    }

    #[test]
    fn stop_racing_with_removal_is_success() {
        let (driver, shell, _) = driver();
        shell.respond(&inspect_command(RUN_ID), "abc /testdojorunid running 0", "", 0);
        shell.respond(
            "docker stop testdojorunid",
            "",
            "Error response from daemon: No such container: testdojorunid",
            1,
        );
        assert_eq!(driver.handle_signal(&context(config())).unwrap(), 0);
    }

    #[test]
    fn multiple_signal_kills_existing_container() {
        let (driver, shell, _) = driver();
        shell.respond(&inspect_command(RUN_ID), "abc /testdojorunid running 0", "", 0);
        shell.respond("docker kill testdojorunid", "", "No such container: testdojorunid", 1);

        assert_eq!(driver.handle_multiple_signal(&context(config())).unwrap(), 0);
        assert_eq!(shell.count("docker kill testdojorunid"), 1);
    }

    #[test]
    fn multiple_signal_without_container_does_nothing() {
        let (driver, shell, _) = driver();
        shell.respond(&inspect_command(RUN_ID), "No such object", "", 1);
        assert_eq!(driver.handle_multiple_signal(&context(config())).unwrap(), 0);
        assert_eq!(shell.count_prefix("docker kill"), 0);
    }

    #[test]
    fn inspect_failure_is_fatal() {
        let (driver, shell, _) = driver();
        shell.respond(&inspect_command(RUN_ID), "", "permission denied", 1);
        assert!(driver.handle_signal(&context(config())).is_err());
    }
}
